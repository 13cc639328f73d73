// THEORY:
// The `color` module is the vocabulary every other stage speaks. It holds the three
// color representations the engine needs and the pure conversions between them.
//
// Key architectural principles:
// 1.  **Three lenses on one color**: `RgbColor` is the storage form (what lives in
//     a `PixelBuffer` and a palette), `HsvColor` separates "what color" (hue and
//     saturation) from "how light" (value) and drives masking and recoloring, and
//     `LabColor` is the perceptual form used when we need to report how far a
//     region actually moved.
// 2.  **Total conversions**: every conversion is a pure function defined for the
//     whole valid input range. Grays have hue 0, black has saturation 0.
// 3.  **Hot-path helpers**: `rgb_to_hsv` / `hsv_to_rgb` work on bare `f32` triples
//     so the recolorer can run them over a whole buffer without building structs.

use ::palette::{FromColor, Lab, Srgb};
use serde::{Deserialize, Serialize};

use crate::error::{RecolorError, Result};

pub type Luma = f64;

/// An 8-bit sRGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct RgbColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

/// Hue in degrees [0, 360), saturation and value in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct HsvColor {
    pub h: f32,
    pub s: f32,
    pub v: f32,
}

/// CIE L*a*b* under D65.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LabColor {
    pub l: f32,
    pub a: f32,
    pub b: f32,
}

impl RgbColor {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parses `#RRGGBB` or `RRGGBB` (case-insensitive).
    pub fn from_hex(text: &str) -> Result<Self> {
        let digits = text.trim();
        let digits = digits.strip_prefix('#').unwrap_or(digits);
        let mut channels = [0u8; 3];
        hex::decode_to_slice(digits, &mut channels)
            .map_err(|e| RecolorError::palette(format!("'{text}' is not a #RRGGBB color ({e})")))?;
        Ok(Self::new(channels[0], channels[1], channels[2]))
    }

    pub fn to_hex(&self) -> String {
        format!("#{}", hex::encode_upper([self.r, self.g, self.b]))
    }

    /// Perceived brightness (Rec. 601 luma) on the 0..255 scale.
    pub fn luma(&self) -> Luma {
        0.299_f64 * self.r as f64 + 0.587_f64 * self.g as f64 + 0.114_f64 * self.b as f64
    }

    pub fn to_hsv(&self) -> HsvColor {
        let (h, s, v) = rgb_to_hsv(self.r, self.g, self.b);
        HsvColor { h, s, v }
    }

    pub fn to_lab(&self) -> LabColor {
        let srgb: Srgb<f32> = Srgb::new(
            self.r as f32 / 255.0,
            self.g as f32 / 255.0,
            self.b as f32 / 255.0,
        );
        let lab: Lab = Lab::from_color(srgb);
        LabColor {
            l: lab.l,
            a: lab.a,
            b: lab.b,
        }
    }

    /// Squared Euclidean distance in RGB space.
    pub fn distance_squared(&self, other: &RgbColor) -> f32 {
        let dr = self.r as f32 - other.r as f32;
        let dg = self.g as f32 - other.g as f32;
        let db = self.b as f32 - other.b as f32;
        dr * dr + dg * dg + db * db
    }
}

impl From<[u8; 3]> for RgbColor {
    fn from(channels: [u8; 3]) -> Self {
        Self::new(channels[0], channels[1], channels[2])
    }
}

impl From<RgbColor> for [u8; 3] {
    fn from(color: RgbColor) -> Self {
        [color.r, color.g, color.b]
    }
}

impl std::fmt::Display for RgbColor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl HsvColor {
    pub fn to_rgb(&self) -> RgbColor {
        let [r, g, b] = hsv_to_rgb(self.h, self.s, self.v);
        RgbColor::new(r, g, b)
    }
}

impl LabColor {
    /// CIE76 color difference.
    pub fn delta_e(&self, other: &LabColor) -> f32 {
        let dl = self.l - other.l;
        let da = self.a - other.a;
        let db = self.b - other.b;
        (dl * dl + da * da + db * db).sqrt()
    }
}

impl From<RgbColor> for HsvColor {
    fn from(color: RgbColor) -> Self {
        color.to_hsv()
    }
}

impl From<RgbColor> for LabColor {
    fn from(color: RgbColor) -> Self {
        color.to_lab()
    }
}

/// RGB bytes to (hue degrees [0,360), saturation [0,1], value [0,1]).
#[inline]
pub fn rgb_to_hsv(red: u8, green: u8, blue: u8) -> (f32, f32, f32) {
    let r = red as f32 / 255.0;
    let g = green as f32 / 255.0;
    let b = blue as f32 / 255.0;

    let maximum_channel = r.max(g.max(b));
    let minimum_channel = r.min(g.min(b));
    let chroma = maximum_channel - minimum_channel;

    let saturation = if maximum_channel <= 1e-6 {
        0.0
    } else {
        chroma / maximum_channel
    };

    if chroma <= 1e-6 {
        return (0.0, saturation, maximum_channel);
    }

    let inverse_chroma = 1.0 / chroma;
    let (base_difference, sector_offset) = if maximum_channel == r {
        (g - b, 0.0)
    } else if maximum_channel == g {
        (b - r, 2.0)
    } else {
        (r - g, 4.0)
    };

    let mut hue_degrees = (base_difference * inverse_chroma + sector_offset) * 60.0;
    if hue_degrees < 0.0 {
        hue_degrees += 360.0;
    }
    if hue_degrees >= 360.0 {
        hue_degrees -= 360.0;
    }
    (hue_degrees, saturation, maximum_channel)
}

/// Inverse of [`rgb_to_hsv`]. Out-of-range inputs are wrapped (hue) or clamped.
#[inline]
pub fn hsv_to_rgb(hue: f32, saturation: f32, value: f32) -> [u8; 3] {
    let h = hue.rem_euclid(360.0) / 60.0;
    let s = saturation.clamp(0.0, 1.0);
    let v = value.clamp(0.0, 1.0);

    let chroma = v * s;
    let x = chroma * (1.0 - (h % 2.0 - 1.0).abs());
    let m = v - chroma;

    let (r, g, b) = match h as u32 {
        0 => (chroma, x, 0.0),
        1 => (x, chroma, 0.0),
        2 => (0.0, chroma, x),
        3 => (0.0, x, chroma),
        4 => (x, 0.0, chroma),
        _ => (chroma, 0.0, x),
    };

    [unit_to_byte(r + m), unit_to_byte(g + m), unit_to_byte(b + m)]
}

#[inline]
fn unit_to_byte(channel: f32) -> u8 {
    (channel.clamp(0.0, 1.0) * 255.0).round() as u8
}
