// THEORY:
// The `DominantColorExtractor` answers one question about the source image: which
// handful of colors make up most of it, and how much of it does each one cover?
// It is the first analytical stage and everything downstream keys off its output.
//
// Algorithm (k-means in RGB space):
// 1.  **Flatten**: treat every pixel as a point in a 3-D float space. Very large
//     images are fitted on an evenly strided sample so the cost of fitting is
//     bounded; populations are always counted over every pixel afterwards.
// 2.  **Cap K**: you cannot find more clusters than there are distinct colors, so
//     K is reduced to the distinct-color count. This is what makes a single-color
//     or 1x1 image a perfectly ordinary size-1 result rather than an error.
// 3.  **Deterministic seeding**: the most frequent color is the first centroid, and
//     each following centroid is the point farthest from all centroids chosen so
//     far (maximin). Same input, same output, no RNG.
// 4.  **Lloyd iterations**: assign, re-average, repeat until the largest centroid
//     move is within `epsilon` or `max_iterations` is reached.
// 5.  **Report**: centroids are rounded to bytes, paired with their population
//     fraction, emptied clusters are dropped, and the list is sorted largest first.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::config::KMeansConfig;
use crate::core_modules::color::RgbColor;
use crate::core_modules::pixel_buffer::PixelBuffer;
use crate::error::{RecolorError, Result};

type Point = [f32; 3];

/// A representative color and the share of the image it covers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DominantColor {
    pub color: RgbColor,
    /// Population fraction in [0, 1].
    pub fraction: f32,
}

/// K-means based dominant color extraction.
#[derive(Debug, Clone, Default)]
pub struct DominantColorExtractor {
    config: KMeansConfig,
}

impl DominantColorExtractor {
    pub fn new(config: KMeansConfig) -> Self {
        Self { config }
    }

    /// Extracts at most `k` dominant colors, sorted by descending population.
    ///
    /// # Errors
    ///
    /// `ClusteringError` when the image has no pixels or `k` is zero.
    pub fn extract(&self, buffer: &PixelBuffer, k: usize) -> Result<Vec<DominantColor>> {
        if k == 0 {
            return Err(RecolorError::Clustering {
                reason: "requested zero clusters".to_string(),
            });
        }
        let total = buffer.pixel_count();
        if total == 0 || buffer.is_empty() {
            return Err(RecolorError::Clustering {
                reason: "image has no pixels".to_string(),
            });
        }

        let samples = self.sample(buffer);
        let histogram = histogram(&samples);
        let clusters = k.min(histogram.len());

        let mut centroids = seed_centroids(&samples, &histogram, clusters);
        let iterations = self.refine(&samples, &mut centroids);

        // Populations over the full image, not just the fitted sample.
        let mut counts = vec![0usize; centroids.len()];
        for pixel in buffer.pixels() {
            counts[nearest(&to_point(pixel), &centroids)] += 1;
        }

        let mut dominant: Vec<DominantColor> = centroids
            .iter()
            .zip(&counts)
            .filter(|(_, count)| **count > 0)
            .map(|(centroid, count)| DominantColor {
                color: round_point(centroid),
                fraction: *count as f32 / total as f32,
            })
            .collect();
        dominant.sort_by(|a, b| b.fraction.total_cmp(&a.fraction));

        tracing::debug!(
            requested = k,
            found = dominant.len(),
            iterations,
            sampled = samples.len(),
            "extracted dominant colors"
        );
        Ok(dominant)
    }

    fn sample(&self, buffer: &PixelBuffer) -> Vec<Point> {
        let limit = self.config.sample_limit.max(1);
        let step = buffer.pixel_count().div_ceil(limit).max(1);
        buffer.pixels().step_by(step).map(to_point).collect()
    }

    /// Lloyd iterations. Returns how many ran.
    fn refine(&self, samples: &[Point], centroids: &mut [Point]) -> usize {
        let k = centroids.len();
        let max_iterations = self.config.max_iterations.max(1);
        let epsilon = self.config.epsilon.max(0.0);

        for iteration in 1..=max_iterations {
            let mut sums = vec![[0.0f64; 3]; k];
            let mut counts = vec![0usize; k];

            for sample in samples {
                let cluster = nearest(sample, centroids);
                counts[cluster] += 1;
                for channel in 0..3 {
                    sums[cluster][channel] += sample[channel] as f64;
                }
            }

            let mut largest_shift = 0.0f32;
            for cluster in 0..k {
                // An emptied cluster keeps its old centroid; it is dropped at report time
                // if it is still empty over the full image.
                if counts[cluster] == 0 {
                    continue;
                }
                let count = counts[cluster] as f64;
                let updated = [
                    (sums[cluster][0] / count) as f32,
                    (sums[cluster][1] / count) as f32,
                    (sums[cluster][2] / count) as f32,
                ];
                largest_shift = largest_shift.max(distance_squared(&updated, &centroids[cluster]).sqrt());
                centroids[cluster] = updated;
            }

            if largest_shift <= epsilon {
                return iteration;
            }
        }
        max_iterations
    }
}

/// Convenience wrapper using the default k-means settings.
pub fn extract(buffer: &PixelBuffer, k: usize) -> Result<Vec<DominantColor>> {
    DominantColorExtractor::default().extract(buffer, k)
}

fn histogram(samples: &[Point]) -> HashMap<[u8; 3], usize> {
    let mut counts = HashMap::new();
    for sample in samples {
        *counts
            .entry([sample[0] as u8, sample[1] as u8, sample[2] as u8])
            .or_insert(0) += 1;
    }
    counts
}

/// Most frequent color first, then maximin.
fn seed_centroids(samples: &[Point], histogram: &HashMap<[u8; 3], usize>, k: usize) -> Vec<Point> {
    let mut centroids = Vec::with_capacity(k);
    let Some((first, _)) = histogram
        .iter()
        .max_by(|(color_a, count_a), (color_b, count_b)| {
            count_a.cmp(count_b).then_with(|| color_b.cmp(color_a))
        })
    else {
        return centroids;
    };
    centroids.push([first[0] as f32, first[1] as f32, first[2] as f32]);

    let mut closest: Vec<f32> = samples
        .iter()
        .map(|sample| distance_squared(sample, &centroids[0]))
        .collect();

    while centroids.len() < k {
        let (farthest, distance) = closest
            .iter()
            .enumerate()
            .fold((0, -1.0f32), |best, (index, &d)| if d > best.1 { (index, d) } else { best });
        if distance <= 0.0 {
            break;
        }
        let next = samples[farthest];
        for (slot, sample) in closest.iter_mut().zip(samples) {
            *slot = slot.min(distance_squared(sample, &next));
        }
        centroids.push(next);
    }
    centroids
}

#[inline]
fn nearest(point: &Point, centroids: &[Point]) -> usize {
    let mut best = 0;
    let mut best_distance = f32::INFINITY;
    for (index, centroid) in centroids.iter().enumerate() {
        let distance = distance_squared(point, centroid);
        if distance < best_distance {
            best_distance = distance;
            best = index;
        }
    }
    best
}

#[inline]
fn distance_squared(a: &Point, b: &Point) -> f32 {
    let dr = a[0] - b[0];
    let dg = a[1] - b[1];
    let db = a[2] - b[2];
    dr * dr + dg * dg + db * db
}

#[inline]
fn to_point(pixel: &[u8]) -> Point {
    [pixel[0] as f32, pixel[1] as f32, pixel[2] as f32]
}

fn round_point(point: &Point) -> RgbColor {
    let channel = |value: f32| value.round().clamp(0.0, 255.0) as u8;
    RgbColor::new(channel(point[0]), channel(point[1]), channel(point[2]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quadrants() -> PixelBuffer {
        PixelBuffer::from_fn(100, 100, |x, y| match (x < 50, y < 50) {
            (true, true) => RgbColor::new(255, 0, 0),
            (false, true) => RgbColor::new(0, 255, 0),
            (true, false) => RgbColor::new(0, 0, 255),
            (false, false) => RgbColor::new(255, 255, 0),
        })
    }

    #[test]
    fn finds_all_four_quadrant_colors() {
        let dominant = extract(&quadrants(), 4).unwrap();
        assert_eq!(dominant.len(), 4);
        for entry in &dominant {
            assert!((entry.fraction - 0.25).abs() < 1e-6);
        }
        let mut colors: Vec<_> = dominant.iter().map(|d| d.color).collect();
        colors.sort_by_key(|c| (c.r, c.g, c.b));
        assert_eq!(
            colors,
            vec![
                RgbColor::new(0, 0, 255),
                RgbColor::new(0, 255, 0),
                RgbColor::new(255, 0, 0),
                RgbColor::new(255, 255, 0),
            ]
        );
    }

    #[test]
    fn single_pixel_and_single_color_images_yield_one_cluster() {
        let one = PixelBuffer::filled(1, 1, RgbColor::new(3, 4, 5));
        let dominant = extract(&one, 5).unwrap();
        assert_eq!(dominant, vec![DominantColor { color: RgbColor::new(3, 4, 5), fraction: 1.0 }]);

        let flat = PixelBuffer::filled(64, 48, RgbColor::new(200, 10, 10));
        let dominant = extract(&flat, 8).unwrap();
        assert_eq!(dominant.len(), 1);
        assert_eq!(dominant[0].fraction, 1.0);
    }

    #[test]
    fn sorted_by_descending_population() {
        let buffer = PixelBuffer::from_fn(10, 10, |x, _| {
            if x < 7 { RgbColor::new(250, 250, 250) } else { RgbColor::new(10, 10, 10) }
        });
        let dominant = extract(&buffer, 3).unwrap();
        assert_eq!(dominant.len(), 2);
        assert_eq!(dominant[0].color, RgbColor::new(250, 250, 250));
        assert!((dominant[0].fraction - 0.7).abs() < 1e-6);
        assert!((dominant[1].fraction - 0.3).abs() < 1e-6);
    }

    #[test]
    fn never_returns_more_than_k() {
        let buffer = PixelBuffer::from_fn(32, 32, |x, y| RgbColor::new((x * 8) as u8, (y * 8) as u8, 128));
        let dominant = extract(&buffer, 5).unwrap();
        assert!(!dominant.is_empty() && dominant.len() <= 5);
        let total: f32 = dominant.iter().map(|d| d.fraction).sum();
        assert!((total - 1.0).abs() < 1e-4);
    }

    #[test]
    fn sampling_large_images_still_counts_every_pixel() {
        let extractor = DominantColorExtractor::new(KMeansConfig {
            sample_limit: 100,
            ..KMeansConfig::default()
        });
        let buffer = PixelBuffer::from_fn(100, 100, |_, y| {
            if y < 25 { RgbColor::new(0, 0, 0) } else { RgbColor::new(255, 255, 255) }
        });
        let dominant = extractor.extract(&buffer, 2).unwrap();
        assert_eq!(dominant.len(), 2);
        assert!((dominant[0].fraction - 0.75).abs() < 1e-6);
        assert_eq!(dominant[0].color, RgbColor::new(255, 255, 255));
    }

    #[test]
    fn zero_k_and_empty_images_are_clustering_errors() {
        let buffer = PixelBuffer::filled(2, 2, RgbColor::default());
        assert!(matches!(extract(&buffer, 0), Err(RecolorError::Clustering { .. })));

        let empty = PixelBuffer::from_raw(0, 0, Vec::new()).unwrap();
        assert!(matches!(extract(&empty, 3), Err(RecolorError::Clustering { .. })));
    }
}
