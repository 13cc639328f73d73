// THEORY:
// The `pipeline` module is the single-palette API of the engine. It strings the
// analytical stages together in the one order that makes sense:
//
//   dominant colors -> palette mapping -> per-region recolor -> blend -> encode
//
// `RecolorPipeline` is synchronous and owns no mutable state, so one instance can
// be shared by every worker of the orchestrator. It is the unit of work each
// concurrent variation task runs. Every region is recolored from the untouched
// source; only the blender layers them over a working copy.

use serde::{Deserialize, Serialize};

use crate::config::RecolorConfig;
use crate::core_modules::blender::Blender;
use crate::core_modules::codec::{self, OutputFormat};
use crate::core_modules::dominant::DominantColorExtractor;
use crate::core_modules::palette_mapper;
use crate::core_modules::pixel_buffer::PixelBuffer;
use crate::core_modules::recolor::RegionRecolorer;
use crate::error::Result;

// Re-export key data structures for the public API.
pub use crate::core_modules::dominant::DominantColor;
pub use crate::core_modules::palette::{Palette, PaletteSpec};
pub use crate::core_modules::palette_mapper::ColorCorrespondence;
pub use crate::error::FailureReason as VariationFailure;

/// One requested variation: a palette and how strongly to apply it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariationSpec {
    pub palette: PaletteSpec,
    /// `None` uses the pipeline's configured `blend_strength`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blend_strength: Option<f32>,
}

impl VariationSpec {
    pub fn new(palette: PaletteSpec) -> Self {
        Self {
            palette,
            blend_strength: None,
        }
    }

    pub fn with_strength(mut self, blend_strength: f32) -> Self {
        self.blend_strength = Some(blend_strength);
        self
    }
}

/// A finished variation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariationOutput {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Encoded image. Left out of JSON summaries.
    #[serde(skip)]
    pub bytes: Vec<u8>,
    pub format: OutputFormat,
    pub dominant_colors: Vec<DominantColor>,
    /// The palette applied, as `#RRGGBB`.
    pub palette: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Outcome of one variation. A batch returns these in submission order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VariationResult {
    Success(VariationOutput),
    Failure(VariationFailure),
}

impl VariationResult {
    pub fn is_success(&self) -> bool {
        matches!(self, VariationResult::Success(_))
    }

    /// Palette name of either arm.
    pub fn name(&self) -> &str {
        match self {
            VariationResult::Success(output) => &output.name,
            VariationResult::Failure(failure) => &failure.palette_name,
        }
    }

    pub fn as_success(&self) -> Option<&VariationOutput> {
        match self {
            VariationResult::Success(output) => Some(output),
            VariationResult::Failure(_) => None,
        }
    }

    pub fn as_failure(&self) -> Option<&VariationFailure> {
        match self {
            VariationResult::Success(_) => None,
            VariationResult::Failure(failure) => Some(failure),
        }
    }
}

/// The recolored buffer plus what was learned producing it.
#[derive(Debug, Clone)]
pub struct Recolored {
    pub buffer: PixelBuffer,
    pub dominant_colors: Vec<DominantColor>,
    pub correspondences: Vec<ColorCorrespondence>,
}

/// Synchronous single-palette recoloring.
#[derive(Debug, Clone)]
pub struct RecolorPipeline {
    extractor: DominantColorExtractor,
    recolorer: RegionRecolorer,
    blender: Blender,
    num_colors: usize,
    blend_strength: f32,
    output_format: OutputFormat,
    jpeg_quality: u8,
}

impl Default for RecolorPipeline {
    fn default() -> Self {
        Self::new(&RecolorConfig::default())
    }
}

impl RecolorPipeline {
    pub fn new(config: &RecolorConfig) -> Self {
        Self {
            extractor: DominantColorExtractor::new(config.kmeans.clone()),
            recolorer: RegionRecolorer::new(config.tolerance, config.morph_kernel_size),
            blender: Blender::new(config.global_blend_weight, config.edge_band_radius),
            num_colors: config.num_colors,
            blend_strength: config.blend_strength,
            output_format: config.output_format,
            jpeg_quality: config.jpeg_quality,
        }
    }

    /// Recolors `source` toward `palette` at `strength`, without encoding.
    pub fn recolor(&self, source: &PixelBuffer, palette: &Palette, strength: f32) -> Result<Recolored> {
        let dominant_colors = self.extractor.extract(source, self.num_colors)?;
        let correspondences = palette_mapper::map(&dominant_colors, &palette.colors())?;

        let regions = correspondences
            .iter()
            .map(|correspondence| self.recolorer.recolor_region(source, correspondence))
            .collect::<Result<Vec<_>>>()?;
        let buffer = self.blender.compose(source, &regions, strength);

        tracing::debug!(
            palette = palette.name(),
            dominant = dominant_colors.len(),
            regions = regions.len(),
            strength,
            "recolored image"
        );
        Ok(Recolored {
            buffer,
            dominant_colors,
            correspondences,
        })
    }

    /// Validates the palette, recolors and encodes one variation.
    pub fn render(&self, source: &PixelBuffer, spec: &VariationSpec) -> Result<VariationOutput> {
        let palette = Palette::try_from(&spec.palette)?;
        let strength = spec.blend_strength.unwrap_or(self.blend_strength);
        let recolored = self.recolor(source, &palette, strength)?;
        let bytes = codec::encode_as(&recolored.buffer, self.output_format, Some(self.jpeg_quality))?;

        Ok(VariationOutput {
            name: spec.palette.name.clone(),
            description: spec.palette.description.clone(),
            bytes,
            format: self.output_format,
            dominant_colors: recolored.dominant_colors,
            palette: palette.to_hex(),
            url: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::color::RgbColor;
    use crate::error::RecolorError;

    fn two_tone() -> PixelBuffer {
        PixelBuffer::from_fn(40, 40, |x, _| {
            if x < 20 { RgbColor::new(200, 30, 30) } else { RgbColor::new(240, 240, 240) }
        })
    }

    #[test]
    fn zero_strength_leaves_the_image_alone() {
        let source = two_tone();
        let palette = Palette::new("Night", vec![RgbColor::new(0, 0, 90), RgbColor::new(20, 20, 20)]).unwrap();
        let recolored = RecolorPipeline::default().recolor(&source, &palette, 0.0).unwrap();
        assert_eq!(recolored.buffer, source);
        assert_eq!(recolored.correspondences.len(), 2);
    }

    #[test]
    fn full_strength_recolors_a_solid_image() {
        let source = PixelBuffer::filled(32, 32, RgbColor::new(200, 30, 30));
        let palette = Palette::new("Ocean", vec![RgbColor::new(20, 90, 200)]).unwrap();
        let recolored = RecolorPipeline::default().recolor(&source, &palette, 1.0).unwrap();

        assert_eq!(recolored.dominant_colors.len(), 1);
        assert_eq!(recolored.dominant_colors[0].fraction, 1.0);
        let center = recolored.buffer.pixel(16, 16).unwrap();
        assert_ne!(center, RgbColor::new(200, 30, 30));
        assert!((center.b as i16 - 200).abs() <= 2, "{center:?}");
    }

    #[test]
    fn render_encodes_and_echoes_the_palette() {
        let spec = VariationSpec::new(
            PaletteSpec::new("Forest", ["#228B22", "0b3d0b"]).with_description("greens"),
        );
        let output = RecolorPipeline::default().render(&two_tone(), &spec).unwrap();

        assert_eq!(output.name, "Forest");
        assert_eq!(output.description.as_deref(), Some("greens"));
        assert_eq!(output.palette, vec!["#228B22".to_string(), "#0B3D0B".to_string()]);
        assert_eq!(output.format, OutputFormat::Png);
        let decoded = codec::decode(&output.bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (40, 40));
    }

    #[test]
    fn unset_strength_falls_back_to_the_configured_one() {
        let source = PixelBuffer::filled(24, 24, RgbColor::new(200, 30, 30));
        let config = RecolorConfig {
            blend_strength: 0.0,
            ..RecolorConfig::default()
        };
        let pipeline = RecolorPipeline::new(&config);
        let palette = PaletteSpec::new("Ocean", ["#1E5AC8"]);

        let inherited = pipeline.render(&source, &VariationSpec::new(palette.clone())).unwrap();
        assert_eq!(codec::decode(&inherited.bytes).unwrap(), source);

        let explicit = pipeline
            .render(&source, &VariationSpec::new(palette).with_strength(1.0))
            .unwrap();
        assert_ne!(codec::decode(&explicit.bytes).unwrap(), source);
    }

    #[test]
    fn strength_is_optional_in_json() {
        let spec: VariationSpec =
            serde_json::from_str(r##"{"palette":{"name":"Dune","colors":["#C2B280"]}}"##).unwrap();
        assert_eq!(spec.blend_strength, None);
        let spec: VariationSpec = serde_json::from_str(
            r##"{"palette":{"name":"Dune","colors":["#C2B280"]},"blend_strength":0.4}"##,
        )
        .unwrap();
        assert_eq!(spec.blend_strength, Some(0.4));
    }

    #[test]
    fn render_rejects_an_empty_palette() {
        let spec = VariationSpec::new(PaletteSpec::new("Empty", Vec::<String>::new()));
        let err = RecolorPipeline::default().render(&two_tone(), &spec).unwrap_err();
        assert!(matches!(err, RecolorError::PaletteValidation { .. }));
    }

    #[test]
    fn result_serializes_with_a_status_tag() {
        let failure = VariationResult::Failure(VariationFailure {
            palette_name: "Broken".into(),
            kind: crate::error::ErrorKind::PaletteValidation,
            message: "bad".into(),
        });
        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["status"], "failure");
        assert_eq!(json["palette_name"], "Broken");
        assert_eq!(failure.name(), "Broken");
        assert!(!failure.is_success());
    }
}
