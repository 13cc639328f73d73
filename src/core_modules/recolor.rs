// THEORY:
// The `RegionRecolorer` is where a correspondence (dominant color -> palette color)
// turns into actual pixels. It works in two phases.
//
// Phase 1, selection. Every pixel is converted to HSV and compared with the source
// color channel by channel: hue, saturation and value must each fall inside their
// own tolerance (an inclusive box, not a sphere). Hue is an angle, so the hue
// distance wraps around at 360 degrees. A source color with almost no saturation has
// no meaningful hue, so hue is ignored for it. The raw selection is then opened and
// closed to drop specks and fill pinholes (see `mask`).
//
// Phase 2, transformation. Inside the mask each pixel takes the target's hue and
// saturation, but keeps its own shading: its brightness relative to the source
// color (`pixel_v / source_v`) is carried over onto the target brightness. That
// relative factor is bounded to [0.4, 2.0] so a nearly black or blown-out pixel
// cannot push the result to an extreme. A flat fill would erase highlights and
// shadows; this keeps them.
//
// The output is a full-size buffer that differs from the input only inside the
// mask, plus the mask itself so the blender knows where to composite.

use crate::config::MaskTolerance;
use crate::core_modules::color::{hsv_to_rgb, rgb_to_hsv};
use crate::core_modules::mask::Mask;
use crate::core_modules::palette_mapper::ColorCorrespondence;
use crate::core_modules::pixel_buffer::{CHANNELS, PixelBuffer};
use crate::error::{RecolorError, Result};

pub const DEFAULT_KERNEL_SIZE: usize = 5;
const MIN_SHADING_FACTOR: f32 = 0.4;
const MAX_SHADING_FACTOR: f32 = 2.0;

/// Builds color-similarity masks and applies the hue/saturation substitution.
#[derive(Debug, Clone)]
pub struct RegionRecolorer {
    tolerance: MaskTolerance,
    kernel_size: usize,
}

impl Default for RegionRecolorer {
    fn default() -> Self {
        Self::new(MaskTolerance::default(), DEFAULT_KERNEL_SIZE)
    }
}

impl RegionRecolorer {
    pub fn new(tolerance: MaskTolerance, kernel_size: usize) -> Self {
        Self {
            tolerance,
            kernel_size,
        }
    }

    /// Recolors the region matching `correspondence.source`.
    ///
    /// # Errors
    ///
    /// `MaskingError` if the buffer's byte length does not match its dimensions.
    pub fn recolor_region(
        &self,
        buffer: &PixelBuffer,
        correspondence: &ColorCorrespondence,
    ) -> Result<(PixelBuffer, Mask)> {
        let mask = self.build_mask(buffer, correspondence)?;
        let recolored = self.apply(buffer, &mask, correspondence);

        tracing::debug!(
            source = %correspondence.source.color,
            target = %correspondence.target,
            coverage = mask.coverage(),
            delta_e = correspondence.perceptual_shift(),
            "recolored region"
        );
        Ok((recolored, mask))
    }

    /// HSV tolerance box around the source color, then open + close.
    pub fn build_mask(&self, buffer: &PixelBuffer, correspondence: &ColorCorrespondence) -> Result<Mask> {
        if !buffer.is_well_formed() {
            return Err(RecolorError::Masking {
                reason: format!(
                    "{}x{} buffer holds {} bytes",
                    buffer.width(),
                    buffer.height(),
                    buffer.as_bytes().len()
                ),
            });
        }

        let source = correspondence.source.color.to_hsv();
        // Tolerances are on the 8-bit HSV scale (hue 0..179 = half degrees).
        let hue_tolerance = self.tolerance.hue * 2.0;
        let saturation_tolerance = self.tolerance.saturation / 255.0;
        let value_tolerance = self.tolerance.value / 255.0;
        let compare_hue = source.s > saturation_tolerance;

        let bits = buffer
            .pixels()
            .map(|pixel| {
                let (h, s, v) = rgb_to_hsv(pixel[0], pixel[1], pixel[2]);
                (!compare_hue || hue_distance(h, source.h) <= hue_tolerance)
                    && (s - source.s).abs() <= saturation_tolerance
                    && (v - source.v).abs() <= value_tolerance
            })
            .collect();

        let raw = Mask::from_bits(buffer.width(), buffer.height(), bits).ok_or_else(|| {
            RecolorError::Masking {
                reason: "mask size does not match image".to_string(),
            }
        })?;
        Ok(raw.open(self.kernel_size).close(self.kernel_size))
    }

    fn apply(&self, buffer: &PixelBuffer, mask: &Mask, correspondence: &ColorCorrespondence) -> PixelBuffer {
        let source_value = correspondence.source.color.to_hsv().v;
        let target = correspondence.target.to_hsv();

        let mut out = buffer.as_bytes().to_vec();
        for (pixel, selected) in out.chunks_exact_mut(CHANNELS).zip(mask.bits()) {
            if !*selected {
                continue;
            }
            let (_, _, value) = rgb_to_hsv(pixel[0], pixel[1], pixel[2]);
            let shading = if source_value > 1e-6 {
                (value / source_value).clamp(MIN_SHADING_FACTOR, MAX_SHADING_FACTOR)
            } else {
                1.0
            };
            let recolored = hsv_to_rgb(target.h, target.s, target.v * shading);
            pixel.copy_from_slice(&recolored);
        }
        buffer.with_data(out)
    }
}

/// Recolors with the given tolerance and the default 5x5 structuring element.
pub fn recolor_region(
    buffer: &PixelBuffer,
    correspondence: &ColorCorrespondence,
    tolerance: MaskTolerance,
) -> Result<(PixelBuffer, Mask)> {
    RegionRecolorer::new(tolerance, DEFAULT_KERNEL_SIZE).recolor_region(buffer, correspondence)
}

#[inline]
fn hue_distance(a: f32, b: f32) -> f32 {
    let difference = (a - b).abs();
    difference.min(360.0 - difference)
}
