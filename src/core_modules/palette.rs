// THEORY:
// Palettes arrive from outside the engine as loosely shaped records: a name, a list
// of hex strings, maybe a description and maybe a name per color. This module draws
// a hard line between that wire shape (`PaletteSpec`) and the typed value the rest
// of the engine uses (`Palette`).
//
// Validation happens exactly once, in `Palette::try_from(&PaletteSpec)`. A `Palette`
// that exists is guaranteed to be non-empty and to hold only real 8-bit colors, so
// no downstream stage ever re-checks shape.

use serde::{Deserialize, Serialize};

use crate::core_modules::color::RgbColor;
use crate::error::{RecolorError, Result};

/// A palette exactly as the palette-generation service sends it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PaletteSpec {
    pub name: String,
    pub colors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Optional human-readable names, matched to `colors` by position.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub color_names: Vec<String>,
}

impl PaletteSpec {
    pub fn new<S: Into<String>>(name: impl Into<String>, colors: impl IntoIterator<Item = S>) -> Self {
        Self {
            name: name.into(),
            colors: colors.into_iter().map(Into::into).collect(),
            description: None,
            color_names: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// One validated palette entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaletteColor {
    pub color: RgbColor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// An ordered, non-empty list of target colors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Palette {
    name: String,
    entries: Vec<PaletteColor>,
}

impl Palette {
    /// Builds a palette from already-parsed colors.
    pub fn new(name: impl Into<String>, colors: Vec<RgbColor>) -> Result<Self> {
        let name = name.into();
        if colors.is_empty() {
            return Err(RecolorError::palette(format!("palette '{name}' has no colors")));
        }
        Ok(Self {
            name,
            entries: colors
                .into_iter()
                .map(|color| PaletteColor { color, name: None })
                .collect(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entries(&self) -> &[PaletteColor] {
        &self.entries
    }

    pub fn colors(&self) -> Vec<RgbColor> {
        self.entries.iter().map(|entry| entry.color).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_hex(&self) -> Vec<String> {
        self.entries.iter().map(|entry| entry.color.to_hex()).collect()
    }
}

impl TryFrom<&PaletteSpec> for Palette {
    type Error = RecolorError;

    fn try_from(spec: &PaletteSpec) -> Result<Self> {
        if spec.colors.is_empty() {
            return Err(RecolorError::palette(format!(
                "palette '{}' has no colors",
                spec.name
            )));
        }

        let entries = spec
            .colors
            .iter()
            .enumerate()
            .map(|(index, hex)| {
                let color = RgbColor::from_hex(hex).map_err(|e| {
                    RecolorError::palette(format!(
                        "palette '{}' entry {index}: {}",
                        spec.name,
                        match e {
                            RecolorError::PaletteValidation { reason } => reason,
                            other => other.to_string(),
                        }
                    ))
                })?;
                Ok(PaletteColor {
                    color,
                    name: spec.color_names.get(index).cloned(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            name: spec.name.clone(),
            entries,
        })
    }
}
