//! Joint-histogram construction and the exhaustive 2D threshold search.

use image::GrayImage;
use tracing::{debug, warn};

/// Pair of bin indices splitting the joint histogram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThresholdPair {
    /// Intensity-axis threshold.
    pub t1: u32,
    /// Neighborhood-axis threshold.
    pub t2: u32,
}

/// Square joint histogram over (intensity bin, neighborhood-mean bin).
#[derive(Debug, Clone)]
pub struct Histogram2D {
    bins: u32,
    data: Vec<f64>,
}

impl Histogram2D {
    /// Bins every pixel of `(intensity, neighborhood)` into a `bins x bins`
    /// count matrix. Bin index = `floor(value * (bins-1) / 255)`.
    pub fn build(intensity: &GrayImage, neighborhood: &GrayImage, bins: u32) -> Self {
        let mut data = vec![0.0f64; (bins * bins) as usize];
        for (p, n) in intensity.as_raw().iter().zip(neighborhood.as_raw()) {
            let i = bin_index(*p, bins);
            let j = bin_index(*n, bins);
            data[(i * bins + j) as usize] += 1.0;
        }
        Self { bins, data }
    }

    pub fn bins(&self) -> u32 {
        self.bins
    }

    fn get(&self, i: u32, j: u32) -> f64 {
        self.data[(i * self.bins + j) as usize]
    }

    /// `log1p` on non-zero cells, compressing the dynamic range so dense
    /// background bins do not swamp the search.
    pub fn apply_log_scale(&mut self) {
        for cell in &mut self.data {
            if *cell > 0.0 {
                *cell = cell.ln_1p();
            }
        }
    }

    /// Rescales the histogram to sum 1. A no-op on an empty histogram.
    pub fn normalize(&mut self) {
        let total: f64 = self.data.iter().sum();
        if total > 0.0 {
            for cell in &mut self.data {
                *cell /= total;
            }
        }
    }

    /// 2D Gaussian smoothing with kernel radius `round(3*sigma)`, truncated
    /// at the borders.
    pub fn smooth(&mut self, sigma: f64) {
        if sigma <= 0.0 {
            return;
        }
        let radius = (3.0 * sigma).round() as i64;
        if radius == 0 {
            return;
        }
        let weights: Vec<f64> = (-radius..=radius)
            .map(|d| (-(d * d) as f64 / (2.0 * sigma * sigma)).exp())
            .collect();
        let bins = self.bins as i64;
        let mut smoothed = vec![0.0f64; self.data.len()];
        for i in 0..bins {
            for j in 0..bins {
                let mut sum = 0.0;
                let mut weight = 0.0;
                for (di, wi) in weights.iter().enumerate() {
                    for (dj, wj) in weights.iter().enumerate() {
                        let ni = i + di as i64 - radius;
                        let nj = j + dj as i64 - radius;
                        if (0..bins).contains(&ni) && (0..bins).contains(&nj) {
                            let w = wi * wj;
                            sum += w * self.data[(ni * bins + nj) as usize];
                            weight += w;
                        }
                    }
                }
                smoothed[(i * bins + j) as usize] = sum / weight;
            }
        }
        self.data = smoothed;
    }

    fn total_weight(&self) -> f64 {
        self.data.iter().sum()
    }
}

fn bin_index(value: u8, bins: u32) -> u32 {
    ((value as u32 * (bins - 1)) / 255).min(bins - 1)
}

/// Exhaustive search for the threshold pair maximizing between-class
/// variance.
///
/// Every `(t1, t2)` in `[1, bins-2]^2` is scored as `w0*w1*(m0-m1)^2`, where
/// each class mean is the weighted mean of the flattened bin index. Ties go
/// to the first candidate in scan order. An empty histogram yields the
/// midpoint threshold.
///
/// The scan is `O(bins^4)`; acceptable because bins stay small (32..=256)
/// and the pyramid/region strategies shrink them further at coarse scales.
pub fn find_threshold(histogram: &Histogram2D) -> ThresholdPair {
    let bins = histogram.bins();
    let midpoint = ThresholdPair {
        t1: bins / 2,
        t2: bins / 2,
    };
    if bins < 3 || histogram.total_weight() <= 0.0 {
        debug!(bins, "degenerate histogram, using midpoint threshold");
        return midpoint;
    }

    let mut best = midpoint;
    let mut best_score = -1.0f64;
    let mut score_sum = 0.0f64;
    let mut score_count = 0u64;
    for t1 in 1..bins - 1 {
        for t2 in 1..bins - 1 {
            let mut w0 = 0.0;
            let mut sum0 = 0.0;
            let mut w1 = 0.0;
            let mut sum1 = 0.0;
            for i in 0..bins {
                for j in 0..bins {
                    let weight = histogram.get(i, j);
                    if weight == 0.0 {
                        continue;
                    }
                    let value = (i * bins + j) as f64;
                    if i <= t1 && j <= t2 {
                        w0 += weight;
                        sum0 += weight * value;
                    } else if i > t1 && j > t2 {
                        w1 += weight;
                        sum1 += weight * value;
                    }
                }
            }
            if w0 <= 0.0 || w1 <= 0.0 {
                continue;
            }
            let m0 = sum0 / w0;
            let m1 = sum1 / w1;
            let score = w0 * w1 * (m0 - m1) * (m0 - m1);
            score_sum += score;
            score_count += 1;
            if score > best_score {
                best_score = score;
                best = ThresholdPair { t1, t2 };
            }
        }
    }

    if best_score < 0.0 {
        debug!(bins, "no separable threshold pair, using midpoint");
        return midpoint;
    }
    let avg = score_sum / score_count as f64;
    if avg > 0.0 && best_score / avg < 1.5 {
        warn!(
            ratio = best_score / avg,
            t1 = best.t1,
            t2 = best.t2,
            "weak class separation: best variance close to the search average"
        );
    }
    best
}

/// Applies the threshold pair: foreground (255) iff both the intensity bin
/// and the neighborhood bin strictly exceed `(t1, t2)`.
pub fn apply_threshold(
    intensity: &GrayImage,
    neighborhood: &GrayImage,
    threshold: ThresholdPair,
    bins: u32,
) -> GrayImage {
    let (width, height) = intensity.dimensions();
    let mut out = GrayImage::new(width, height);
    let out_raw: &mut [u8] = &mut out;
    for (i, (p, n)) in intensity
        .as_raw()
        .iter()
        .zip(neighborhood.as_raw())
        .enumerate()
    {
        let fg = bin_index(*p, bins) > threshold.t1 && bin_index(*n, bins) > threshold.t2;
        out_raw[i] = if fg { 255 } else { 0 };
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use image::Luma;

    fn bimodal_pair(bins: u32) -> (GrayImage, GrayImage) {
        let img = GrayImage::from_fn(32, 32, |x, _| Luma([if x < 16 { 40 } else { 210 }]));
        let mean = crate::filter::local_mean(&img, 5, crate::params::NeighborhoodType::Rectangular);
        let _ = bins;
        (img, mean)
    }

    #[test]
    fn bin_index_clamps_and_scales() {
        assert_eq!(bin_index(0, 64), 0);
        assert_eq!(bin_index(255, 64), 63);
        assert_eq!(bin_index(254, 2), 0);
        assert_eq!(bin_index(255, 2), 1);
    }

    #[test]
    fn empty_histogram_yields_midpoint() {
        let hist = Histogram2D {
            bins: 64,
            data: vec![0.0; 64 * 64],
        };
        assert_eq!(find_threshold(&hist), ThresholdPair { t1: 32, t2: 32 });
    }

    #[test]
    fn normalize_sums_to_one() {
        let (img, mean) = bimodal_pair(32);
        let mut hist = Histogram2D::build(&img, &mean, 32);
        hist.normalize();
        assert_relative_eq!(hist.total_weight(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn log_scale_leaves_zero_cells_alone() {
        let (img, mean) = bimodal_pair(32);
        let mut hist = Histogram2D::build(&img, &mean, 32);
        let zero_cells = hist.data.iter().filter(|&&v| v == 0.0).count();
        hist.apply_log_scale();
        assert_eq!(hist.data.iter().filter(|&&v| v == 0.0).count(), zero_cells);
    }

    #[test]
    fn smoothing_preserves_mass_on_the_interior() {
        let mut hist = Histogram2D {
            bins: 16,
            data: vec![0.0; 256],
        };
        hist.data[8 * 16 + 8] = 100.0;
        hist.smooth(1.0);
        // Spread out but not lost (kernel renormalized at borders).
        assert!(hist.get(8, 8) < 100.0);
        assert!(hist.total_weight() > 99.0);
    }

    #[test]
    fn bimodal_image_splits_between_the_modes() {
        let (img, mean) = bimodal_pair(32);
        let hist = Histogram2D::build(&img, &mean, 32);
        let thr = find_threshold(&hist);
        let low = bin_index(40, 32);
        let high = bin_index(210, 32);
        assert!(thr.t1 >= low && thr.t1 < high);

        let binary = apply_threshold(&img, &mean, thr, 32);
        assert_eq!(binary.get_pixel(2, 10).0[0], 0);
        assert_eq!(binary.get_pixel(30, 10).0[0], 255);
    }

    #[test]
    fn threshold_application_requires_both_axes() {
        let img = GrayImage::from_pixel(4, 4, Luma([200]));
        let mut mean = img.clone();
        mean.put_pixel(0, 0, Luma([10]));
        let thr = ThresholdPair { t1: 10, t2: 10 };
        let out = apply_threshold(&img, &mean, thr, 64);
        assert_eq!(out.get_pixel(0, 0).0[0], 0); // neighborhood bin too low
        assert_eq!(out.get_pixel(1, 1).0[0], 255);
    }
}
