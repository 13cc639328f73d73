//! Tunable parameters for the recoloring engine.
//!
//! Everything here has a sensible default, so a config file only needs to name
//! the knobs it changes:
//!
//! ```no_run
//! use chroma_shift::RecolorConfig;
//! use std::path::Path;
//!
//! let config = RecolorConfig::from_json_file(Path::new("recolor.json"))?;
//! config.validate()?;
//! # Ok::<(), chroma_shift::RecolorError>(())
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core_modules::codec::{DEFAULT_JPEG_QUALITY, OutputFormat};
use crate::error::{RecolorError, Result};

const MIN_KMEANS_ITERATIONS: usize = 10;
const MAX_KMEANS_ITERATIONS: usize = 200;

/// Configuration for one batch of variations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecolorConfig {
    /// How many dominant colors to extract from the base image.
    pub num_colors: usize,
    /// Default blend strength for variations that do not set their own.
    pub blend_strength: f32,
    /// Number of variations processed at once.
    pub concurrency_limit: usize,
    pub tolerance: MaskTolerance,
    /// Side of the square structuring element used to clean masks. Odd.
    pub morph_kernel_size: usize,
    pub kmeans: KMeansConfig,
    /// Share of the original mixed back in along mask seams.
    pub global_blend_weight: f32,
    pub edge_band_radius: usize,
    pub output_format: OutputFormat,
    pub jpeg_quality: u8,
    pub task_timeout_secs: u64,
    /// Decoded images kept by the `ImageCache`.
    pub cache_capacity: u64,
}

impl Default for RecolorConfig {
    fn default() -> Self {
        Self {
            num_colors: 5,
            blend_strength: 0.75,
            concurrency_limit: 4,
            tolerance: MaskTolerance::default(),
            morph_kernel_size: 5,
            kmeans: KMeansConfig::default(),
            global_blend_weight: 0.1,
            edge_band_radius: 2,
            output_format: OutputFormat::Png,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            task_timeout_secs: 300,
            cache_capacity: 16,
        }
    }
}

/// HSV tolerance box on the 8-bit scale: hue in half-degrees (0..=179),
/// saturation and value in 0..=255.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaskTolerance {
    pub hue: f32,
    pub saturation: f32,
    pub value: f32,
}

impl Default for MaskTolerance {
    fn default() -> Self {
        Self {
            hue: 15.0,
            saturation: 30.0,
            value: 30.0,
        }
    }
}

/// K-means settings for dominant color extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KMeansConfig {
    pub max_iterations: usize,
    /// Stop once no centroid moves further than this (RGB units).
    pub epsilon: f32,
    /// Images with more pixels than this are fitted on a strided sample.
    pub sample_limit: usize,
}

impl Default for KMeansConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            epsilon: 0.1,
            sample_limit: 65_536,
        }
    }
}

impl RecolorConfig {
    /// Load configuration from JSON file
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| RecolorError::config(path.display().to_string(), e))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| RecolorError::config(path.display().to_string(), e))?;
        Ok(config)
    }

    /// Save configuration to JSON file
    pub fn to_json_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| RecolorError::config(path.display().to_string(), e))?;
        std::fs::write(path, json).map_err(|e| RecolorError::config(path.display().to_string(), e))?;
        Ok(())
    }

    /// Rejects values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.num_colors == 0 {
            return Err(RecolorError::config("num_colors", self.num_colors));
        }
        if !(0.0..=1.0).contains(&self.blend_strength) {
            return Err(RecolorError::config("blend_strength", self.blend_strength));
        }
        if self.morph_kernel_size == 0 || self.morph_kernel_size % 2 == 0 {
            return Err(RecolorError::config("morph_kernel_size", self.morph_kernel_size));
        }
        if !(MIN_KMEANS_ITERATIONS..=MAX_KMEANS_ITERATIONS).contains(&self.kmeans.max_iterations) {
            return Err(RecolorError::config("kmeans.max_iterations", self.kmeans.max_iterations));
        }
        if self.kmeans.epsilon.is_nan() || self.kmeans.epsilon < 0.0 {
            return Err(RecolorError::config("kmeans.epsilon", self.kmeans.epsilon));
        }
        if self.kmeans.sample_limit == 0 {
            return Err(RecolorError::config("kmeans.sample_limit", self.kmeans.sample_limit));
        }
        let MaskTolerance { hue, saturation, value } = self.tolerance;
        if !(0.0..=90.0).contains(&hue) {
            return Err(RecolorError::config("tolerance.hue", hue));
        }
        if !(0.0..=255.0).contains(&saturation) {
            return Err(RecolorError::config("tolerance.saturation", saturation));
        }
        if !(0.0..=255.0).contains(&value) {
            return Err(RecolorError::config("tolerance.value", value));
        }
        if !(0.0..=1.0).contains(&self.global_blend_weight) {
            return Err(RecolorError::config("global_blend_weight", self.global_blend_weight));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(RecolorError::config("jpeg_quality", self.jpeg_quality));
        }
        if self.task_timeout_secs == 0 {
            return Err(RecolorError::config("task_timeout_secs", self.task_timeout_secs));
        }
        if self.cache_capacity == 0 {
            return Err(RecolorError::config("cache_capacity", self.cache_capacity));
        }
        Ok(())
    }
}
