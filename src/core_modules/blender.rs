// THEORY:
// The `Blender` composites region edits back over the original image.
//
// 1.  **Per-region strength**: for every correspondence, masked pixels of the
//     working buffer become `strength * recolored + (1 - strength) * original`.
//     Each region writes only inside its own mask, and regions are applied in
//     order over one working buffer, so if two masks overlap the later one wins.
//     At strength 0 every masked pixel resolves to the original, which makes the
//     whole pass an exact no-op.
// 2.  **Edge softening**: hard-edged masks leave visible seams. After all regions
//     are in, one global pass mixes a small share of the original back in along the
//     band where the union of all masks meets unselected pixels. Region interiors
//     keep their full recolor; the seam gets a trace of the original texture.

use crate::core_modules::mask::Mask;
use crate::core_modules::pixel_buffer::{CHANNELS, PixelBuffer};

pub const DEFAULT_GLOBAL_BLEND_WEIGHT: f32 = 0.1;
pub const DEFAULT_EDGE_BAND_RADIUS: usize = 2;

/// Composites masked recolors and softens seams.
#[derive(Debug, Clone)]
pub struct Blender {
    global_blend_weight: f32,
    edge_band_radius: usize,
}

impl Default for Blender {
    fn default() -> Self {
        Self::new(DEFAULT_GLOBAL_BLEND_WEIGHT, DEFAULT_EDGE_BAND_RADIUS)
    }
}

impl Blender {
    pub fn new(global_blend_weight: f32, edge_band_radius: usize) -> Self {
        Self {
            global_blend_weight: global_blend_weight.clamp(0.0, 1.0),
            edge_band_radius,
        }
    }

    /// Applies every `(recolored, mask)` region over `original` at `strength`,
    /// then the edge-softening pass.
    pub fn compose(&self, original: &PixelBuffer, regions: &[(PixelBuffer, Mask)], strength: f32) -> PixelBuffer {
        let mut working = original.clone();
        let mut union = Mask::empty(original.width(), original.height());
        for (recolored, mask) in regions {
            working = blend_onto(&working, original, recolored, mask, strength);
            union.union_with(mask);
        }
        self.soften(original, &working, &union)
    }

    /// The global pass: inside the union mask's edge band, mix
    /// `global_blend_weight` of the original back in.
    pub fn soften(&self, original: &PixelBuffer, working: &PixelBuffer, union: &Mask) -> PixelBuffer {
        if self.global_blend_weight <= 0.0 || union.count() == 0 {
            return working.clone();
        }
        let band = union.edge_band(self.edge_band_radius);
        let weight = self.global_blend_weight;

        let mut out = working.as_bytes().to_vec();
        for ((pixel, before), in_band) in out
            .chunks_exact_mut(CHANNELS)
            .zip(original.pixels())
            .zip(band.bits())
        {
            if !*in_band || pixel == before {
                continue;
            }
            for channel in 0..CHANNELS {
                pixel[channel] = mix(before[channel], pixel[channel], 1.0 - weight);
            }
        }
        working.with_data(out)
    }
}

/// Blends one region: masked pixels of the result are
/// `strength * recolored + (1 - strength) * original`, unmasked pixels come from
/// `original` untouched.
pub fn blend(original: &PixelBuffer, recolored: &PixelBuffer, mask: &Mask, strength: f32) -> PixelBuffer {
    blend_onto(original, original, recolored, mask, strength)
}

/// Like [`blend`], but writes into a copy of `working` so several regions can be
/// layered over one buffer.
fn blend_onto(
    working: &PixelBuffer,
    original: &PixelBuffer,
    recolored: &PixelBuffer,
    mask: &Mask,
    strength: f32,
) -> PixelBuffer {
    let strength = strength.clamp(0.0, 1.0);
    let mut out = working.as_bytes().to_vec();
    for (((pixel, before), after), selected) in out
        .chunks_exact_mut(CHANNELS)
        .zip(original.pixels())
        .zip(recolored.pixels())
        .zip(mask.bits())
    {
        if !*selected {
            continue;
        }
        for channel in 0..CHANNELS {
            pixel[channel] = mix(before[channel], after[channel], strength);
        }
    }
    working.with_data(out)
}

/// `(1 - t) * from + t * to`, rounded. Exact at both ends.
#[inline]
fn mix(from: u8, to: u8, t: f32) -> u8 {
    if t <= 0.0 {
        return from;
    }
    if t >= 1.0 {
        return to;
    }
    (from as f32 + (to as f32 - from as f32) * t)
        .round()
        .clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::color::RgbColor;

    fn halves() -> (PixelBuffer, PixelBuffer, Mask) {
        let original = PixelBuffer::filled(20, 10, RgbColor::new(100, 100, 100));
        let recolored = PixelBuffer::filled(20, 10, RgbColor::new(200, 0, 50));
        let mask = Mask::from_fn(20, 10, |x, _| x < 10);
        (original, recolored, mask)
    }

    #[test]
    fn zero_strength_is_a_no_op() {
        let (original, recolored, mask) = halves();
        assert_eq!(blend(&original, &recolored, &mask, 0.0), original);
        let composed = Blender::default().compose(&original, &[(recolored, mask)], 0.0);
        assert_eq!(composed, original);
    }

    #[test]
    fn strength_interpolates_inside_the_mask_only() {
        let (original, recolored, mask) = halves();
        let out = blend(&original, &recolored, &mask, 0.75);
        assert_eq!(out.pixel(0, 0), Some(RgbColor::new(175, 25, 63)));
        assert_eq!(out.pixel(15, 5), Some(RgbColor::new(100, 100, 100)));

        let full = blend(&original, &recolored, &mask, 1.0);
        assert_eq!(full.pixel(3, 3), Some(RgbColor::new(200, 0, 50)));
    }

    #[test]
    fn out_of_range_strength_is_clamped() {
        let (original, recolored, mask) = halves();
        assert_eq!(
            blend(&original, &recolored, &mask, 7.0),
            blend(&original, &recolored, &mask, 1.0)
        );
        assert_eq!(blend(&original, &recolored, &mask, -1.0), original);
    }

    #[test]
    fn later_regions_win_on_overlap() {
        let original = PixelBuffer::filled(4, 1, RgbColor::new(0, 0, 0));
        let first = (PixelBuffer::filled(4, 1, RgbColor::new(255, 0, 0)), Mask::from_fn(4, 1, |x, _| x < 3));
        let second = (PixelBuffer::filled(4, 1, RgbColor::new(0, 0, 255)), Mask::from_fn(4, 1, |x, _| x > 0));
        let out = Blender::new(0.0, 0).compose(&original, &[first, second], 1.0);
        assert_eq!(out.pixel(0, 0), Some(RgbColor::new(255, 0, 0)));
        assert_eq!(out.pixel(1, 0), Some(RgbColor::new(0, 0, 255)));
        assert_eq!(out.pixel(3, 0), Some(RgbColor::new(0, 0, 255)));
    }

    #[test]
    fn softening_touches_the_seam_not_the_interior() {
        let (original, recolored, mask) = halves();
        let out = Blender::default().compose(&original, &[(recolored, mask)], 1.0);

        // Deep inside the region: pure recolor.
        assert_eq!(out.pixel(2, 5), Some(RgbColor::new(200, 0, 50)));
        // On the seam: 90% recolor, 10% original.
        assert_eq!(out.pixel(9, 5), Some(RgbColor::new(190, 10, 55)));
        // Outside the region: untouched original.
        assert_eq!(out.pixel(12, 5), Some(RgbColor::new(100, 100, 100)));
    }
}
