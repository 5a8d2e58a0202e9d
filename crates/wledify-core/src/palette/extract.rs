//! Dominant color extraction
//!
//! k-means over a bounded sample of opaque pixels. Distances are measured in
//! CIE Lab so clusters follow perceived color, while each swatch reports the
//! mean sRGB of its members. Clusters closer than `merge_distance` are folded
//! together and the result is ordered by pixel share.

use std::cmp::Ordering;

use image::DynamicImage;
use palette::{FromColor, Lab, Srgb};

use super::Swatch;

/// Tuning for [`extract_swatches`]
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Upper bound on sampled pixels
    pub max_samples: usize,
    /// Initial cluster count
    pub clusters: usize,
    pub max_iterations: usize,
    /// Lab distance below which two clusters are the same color
    pub merge_distance: f32,
    /// Pixels with lower alpha are ignored
    pub min_alpha: u8,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            max_samples: 10_000,
            clusters: 6,
            max_iterations: 12,
            merge_distance: 12.0,
            min_alpha: 16,
        }
    }
}

#[derive(Clone, Copy)]
struct Sample {
    rgb: [f32; 3],
    lab: [f32; 3],
}

#[derive(Clone, Copy, Default)]
struct Cluster {
    centroid: [f32; 3],
    rgb_sum: [f32; 3],
    lab_sum: [f32; 3],
    count: usize,
}

fn to_lab(r: u8, g: u8, b: u8) -> [f32; 3] {
    let lab: Lab = Lab::from_color(Srgb::new(r, g, b).into_format::<f32>().into_linear());
    [lab.l, lab.a, lab.b]
}

fn sample_pixels(image: &DynamicImage, options: &ExtractOptions) -> Vec<Sample> {
    let rgba = image.to_rgba8();
    let total = rgba.width() as usize * rgba.height() as usize;
    if total == 0 || options.max_samples == 0 {
        return Vec::new();
    }

    let step = (total / options.max_samples).max(1);
    rgba.pixels()
        .step_by(step)
        .filter(|p| p.0[3] >= options.min_alpha)
        .take(options.max_samples)
        .map(|p| {
            let [r, g, b, _] = p.0;
            Sample {
                rgb: [f32::from(r), f32::from(g), f32::from(b)],
                lab: to_lab(r, g, b),
            }
        })
        .collect()
}

fn distance_sq(a: &[f32; 3], b: &[f32; 3]) -> f32 {
    let d0 = a[0] - b[0];
    let d1 = a[1] - b[1];
    let d2 = a[2] - b[2];
    d0 * d0 + d1 * d1 + d2 * d2
}

fn kmeans(samples: &[Sample], k: usize, max_iterations: usize) -> Vec<Cluster> {
    if samples.is_empty() || k == 0 {
        return Vec::new();
    }

    // Evenly spaced seeds keep the result deterministic
    let mut centroids: Vec<[f32; 3]> = (0..k)
        .map(|i| samples[((i * samples.len()) / k).min(samples.len() - 1)].lab)
        .collect();
    let mut clusters = vec![Cluster::default(); k];

    for iteration in 0..max_iterations.max(1) {
        clusters = vec![Cluster::default(); k];
        for sample in samples {
            let nearest = centroids
                .iter()
                .enumerate()
                .min_by(|(_, a), (_, b)| {
                    distance_sq(&sample.lab, a)
                        .partial_cmp(&distance_sq(&sample.lab, b))
                        .unwrap_or(Ordering::Equal)
                })
                .map(|(i, _)| i)
                .unwrap_or(0);
            let cluster = &mut clusters[nearest];
            for c in 0..3 {
                cluster.rgb_sum[c] += sample.rgb[c];
                cluster.lab_sum[c] += sample.lab[c];
            }
            cluster.count += 1;
        }

        let mut moved = false;
        for (i, cluster) in clusters.iter_mut().enumerate() {
            let next = if cluster.count == 0 {
                // Reseed empty clusters so they can still pick up a color
                samples[(i + iteration) % samples.len()].lab
            } else {
                let n = cluster.count as f32;
                [
                    cluster.lab_sum[0] / n,
                    cluster.lab_sum[1] / n,
                    cluster.lab_sum[2] / n,
                ]
            };
            if distance_sq(&next, &centroids[i]) > 0.01 {
                moved = true;
            }
            centroids[i] = next;
            cluster.centroid = next;
        }
        if !moved {
            break;
        }
    }

    clusters.retain(|c| c.count > 0);
    clusters
}

/// Fold clusters closer than `merge_distance` into the larger one
fn merge_similar(mut clusters: Vec<Cluster>, merge_distance: f32) -> Vec<Cluster> {
    clusters.sort_by(|a, b| b.count.cmp(&a.count));
    let threshold = merge_distance * merge_distance;

    let mut merged: Vec<Cluster> = Vec::with_capacity(clusters.len());
    for cluster in clusters {
        match merged
            .iter_mut()
            .find(|m| distance_sq(&m.centroid, &cluster.centroid) < threshold)
        {
            Some(target) => {
                for c in 0..3 {
                    target.rgb_sum[c] += cluster.rgb_sum[c];
                    target.lab_sum[c] += cluster.lab_sum[c];
                }
                target.count += cluster.count;
            }
            None => merged.push(cluster),
        }
    }
    merged.sort_by(|a, b| b.count.cmp(&a.count));
    merged
}

fn channel(sum: f32, count: usize) -> u8 {
    (sum / count as f32).round().clamp(0.0, 255.0) as u8
}

/// Ordered swatches, most dominant first. Empty if the image has no opaque pixels.
pub fn extract_swatches(image: &DynamicImage, options: &ExtractOptions) -> Vec<Swatch> {
    let samples = sample_pixels(image, options);
    if samples.is_empty() {
        return Vec::new();
    }

    let k = options.clusters.clamp(1, samples.len());
    let clusters = merge_similar(
        kmeans(&samples, k, options.max_iterations),
        options.merge_distance,
    );
    let total: usize = clusters.iter().map(|c| c.count).sum();

    clusters
        .iter()
        .map(|c| {
            Swatch::new(
                channel(c.rgb_sum[0], c.count),
                channel(c.rgb_sum[1], c.count),
                channel(c.rgb_sum[2], c.count),
                c.count as f32 / total as f32,
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn image(width: u32, height: u32, pixel: impl Fn(u32, u32) -> [u8; 4]) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_fn(width, height, |x, y| Rgba(pixel(x, y))))
    }

    #[test]
    fn test_solid_image_yields_one_swatch() {
        let img = image(32, 32, |_, _| [10, 120, 200, 255]);
        let swatches = extract_swatches(&img, &ExtractOptions::default());
        assert_eq!(swatches.len(), 1);
        assert_eq!(swatches[0].rgb(), [10, 120, 200]);
        assert_eq!(swatches[0].hex, "#0a78c8");
        assert!((swatches[0].area - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_swatches_ordered_by_share() {
        // 3/4 red, 1/4 green
        let img = image(40, 40, |x, _| if x < 30 { [255, 0, 0, 255] } else { [0, 255, 0, 255] });
        let swatches = extract_swatches(&img, &ExtractOptions::default());
        assert_eq!(swatches.len(), 2);
        assert_eq!(swatches[0].rgb(), [255, 0, 0]);
        assert_eq!(swatches[1].rgb(), [0, 255, 0]);
        assert!(swatches[0].area > swatches[1].area);
    }

    #[test]
    fn test_near_duplicates_are_merged() {
        let img = image(20, 20, |x, _| if x % 2 == 0 { [200, 30, 30, 255] } else { [202, 31, 29, 255] });
        let swatches = extract_swatches(&img, &ExtractOptions::default());
        assert_eq!(swatches.len(), 1);
    }

    #[test]
    fn test_transparent_image_yields_nothing() {
        let img = image(16, 16, |_, _| [255, 255, 255, 0]);
        assert!(extract_swatches(&img, &ExtractOptions::default()).is_empty());
    }
}
