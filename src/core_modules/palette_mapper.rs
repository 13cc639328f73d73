// THEORY:
// The `PaletteMapper` decides which target color replaces which dominant color.
//
// The rule is deliberately simple and deterministic: sort both lists from dark to
// light by perceived brightness (Rec. 601 luma) and pair them position by position.
// Dark regions stay dark and light regions stay light, which keeps the contrast
// structure of a logo intact even when every hue changes. Population and hue play
// no part in the pairing.
//
// If the two lists differ in length, pairing stops at the shorter one. Dominant
// colors left over have no partner and pass through untouched.

use serde::{Deserialize, Serialize};

use crate::core_modules::color::RgbColor;
use crate::core_modules::dominant::DominantColor;
use crate::error::{RecolorError, Result};

/// One source-to-target pairing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColorCorrespondence {
    pub source: DominantColor,
    pub target: RgbColor,
}

impl ColorCorrespondence {
    /// Perceptual distance (CIE76 ΔE) between the source and target colors.
    pub fn perceptual_shift(&self) -> f32 {
        self.source.color.to_lab().delta_e(&self.target.to_lab())
    }
}

/// Pairs dominant colors with palette colors by ascending brightness.
///
/// # Errors
///
/// `PaletteValidationError` when `palette` is empty. An empty `dominant` list is
/// fine and yields no correspondences.
pub fn map(dominant: &[DominantColor], palette: &[RgbColor]) -> Result<Vec<ColorCorrespondence>> {
    if palette.is_empty() {
        return Err(RecolorError::palette("cannot map onto an empty palette"));
    }

    let mut sources = dominant.to_vec();
    sources.sort_by(|a, b| a.color.luma().total_cmp(&b.color.luma()));

    let mut targets = palette.to_vec();
    targets.sort_by(|a, b| a.luma().total_cmp(&b.luma()));

    Ok(sources
        .into_iter()
        .zip(targets)
        .map(|(source, target)| ColorCorrespondence { source, target })
        .collect())
}
