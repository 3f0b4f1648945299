use image::GrayImage;

use crate::params::NeighborhoodType;

/// Summed-area table over an intensity image.
///
/// Rectangular local means reduce to four lookups per pixel; the engine
/// precomputes one for the current original so repeated single-scale runs
/// skip the rebuild.
#[derive(Debug, Clone)]
pub struct IntegralImage {
    width: u32,
    height: u32,
    // (width+1) x (height+1), row-major, first row/column zero.
    sums: Vec<u64>,
}

impl IntegralImage {
    pub fn new(image: &GrayImage) -> Self {
        let (width, height) = image.dimensions();
        let stride = width as usize + 1;
        let mut sums = vec![0u64; stride * (height as usize + 1)];
        for y in 0..height as usize {
            let mut row_sum = 0u64;
            for x in 0..width as usize {
                row_sum += image.as_raw()[y * width as usize + x] as u64;
                sums[(y + 1) * stride + (x + 1)] = sums[y * stride + (x + 1)] + row_sum;
            }
        }
        Self {
            width,
            height,
            sums,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Sum over the inclusive pixel rectangle `[x0, x1] x [y0, y1]`.
    fn rect_sum(&self, x0: u32, y0: u32, x1: u32, y1: u32) -> u64 {
        let stride = self.width as usize + 1;
        let (x0, y0) = (x0 as usize, y0 as usize);
        let (x1, y1) = (x1 as usize + 1, y1 as usize + 1);
        self.sums[y1 * stride + x1] + self.sums[y0 * stride + x0]
            - self.sums[y0 * stride + x1]
            - self.sums[y1 * stride + x0]
    }

    /// Mean of the window centered at `(x, y)`, clipped to the image.
    pub fn window_mean(&self, x: u32, y: u32, radius: u32) -> u8 {
        let x0 = x.saturating_sub(radius);
        let y0 = y.saturating_sub(radius);
        let x1 = (x + radius).min(self.width - 1);
        let y1 = (y + radius).min(self.height - 1);
        let count = (x1 - x0 + 1) as u64 * (y1 - y0 + 1) as u64;
        (self.rect_sum(x0, y0, x1, y1) / count.max(1)) as u8
    }
}

/// Per-pixel local mean over a window of the given shape.
///
/// Out-of-bounds neighbors are excluded from the average rather than padded.
pub fn local_mean(image: &GrayImage, window_size: u32, kind: NeighborhoodType) -> GrayImage {
    match kind {
        NeighborhoodType::Rectangular => {
            rectangular_mean(&IntegralImage::new(image), window_size)
        }
        NeighborhoodType::Circular => masked_mean(image, window_size, |dx, dy, r2| {
            (dx * dx + dy * dy) as f64 <= r2
        }),
        NeighborhoodType::DistanceWeighted => weighted_mean(image, window_size),
    }
}

/// Rectangular local mean through a precomputed integral image.
pub fn rectangular_mean(integral: &IntegralImage, window_size: u32) -> GrayImage {
    let (width, height) = integral.dimensions();
    let radius = window_size / 2;
    GrayImage::from_fn(width, height, |x, y| {
        image::Luma([integral.window_mean(x, y, radius)])
    })
}

fn masked_mean(
    image: &GrayImage,
    window_size: u32,
    inside: impl Fn(i64, i64, f64) -> bool,
) -> GrayImage {
    let (width, height) = image.dimensions();
    let radius = (window_size / 2) as i64;
    let r2 = (radius * radius) as f64;
    let offsets: Vec<(i64, i64)> = (-radius..=radius)
        .flat_map(|dy| (-radius..=radius).map(move |dx| (dx, dy)))
        .filter(|&(dx, dy)| inside(dx, dy, r2))
        .collect();
    GrayImage::from_fn(width, height, |x, y| {
        let mut sum = 0u64;
        let mut count = 0u64;
        for &(dx, dy) in &offsets {
            let nx = x as i64 + dx;
            let ny = y as i64 + dy;
            if nx >= 0 && ny >= 0 && nx < width as i64 && ny < height as i64 {
                sum += image.get_pixel(nx as u32, ny as u32).0[0] as u64;
                count += 1;
            }
        }
        image::Luma([(sum / count.max(1)) as u8])
    })
}

/// Disk-limited mean with weight `1 / (1 + euclidean distance)`.
fn weighted_mean(image: &GrayImage, window_size: u32) -> GrayImage {
    let (width, height) = image.dimensions();
    let radius = (window_size / 2) as i64;
    let offsets: Vec<(i64, i64, f64)> = (-radius..=radius)
        .flat_map(|dy| (-radius..=radius).map(move |dx| (dx, dy)))
        .filter_map(|(dx, dy)| {
            let dist = ((dx * dx + dy * dy) as f64).sqrt();
            (dist <= radius as f64).then(|| (dx, dy, 1.0 / (1.0 + dist)))
        })
        .collect();
    GrayImage::from_fn(width, height, |x, y| {
        let mut sum = 0.0f64;
        let mut weight = 0.0f64;
        for &(dx, dy, w) in &offsets {
            let nx = x as i64 + dx;
            let ny = y as i64 + dy;
            if nx >= 0 && ny >= 0 && nx < width as i64 && ny < height as i64 {
                sum += w * image.get_pixel(nx as u32, ny as u32).0[0] as f64;
                weight += w;
            }
        }
        let mean = if weight > 0.0 { sum / weight } else { 0.0 };
        image::Luma([mean.round().clamp(0.0, 255.0) as u8])
    })
}

/// Mean and variance of the whole image.
pub fn image_stats(image: &GrayImage) -> (f64, f64) {
    let n = image.as_raw().len() as f64;
    if n == 0.0 {
        return (0.0, 0.0);
    }
    let mut sum = 0.0;
    let mut sum_sq = 0.0;
    for &v in image.as_raw() {
        let v = v as f64;
        sum += v;
        sum_sq += v * v;
    }
    let mean = sum / n;
    (mean, (sum_sq / n - mean * mean).max(0.0))
}

/// Window size derived from the global intensity variance.
///
/// Busy images get a larger window so the neighborhood axis stays stable;
/// the result is forced odd and clamped to the valid parameter range.
pub fn adaptive_window_size(image: &GrayImage) -> u32 {
    let (_, variance) = image_stats(image);
    let mut size = (7.0 * (1.0 + variance / 1000.0)).round() as u32;
    if size % 2 == 0 {
        size += 1;
    }
    size.clamp(3, 21)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn integral_matches_naive_window_sum() {
        let img = GrayImage::from_fn(9, 7, |x, y| Luma([(x * 13 + y * 29) as u8]));
        let integral = IntegralImage::new(&img);
        for (x, y, radius) in [(0u32, 0u32, 1u32), (4, 3, 2), (8, 6, 3)] {
            let mut sum = 0u64;
            let mut count = 0u64;
            for ny in y.saturating_sub(radius)..=(y + radius).min(6) {
                for nx in x.saturating_sub(radius)..=(x + radius).min(8) {
                    sum += img.get_pixel(nx, ny).0[0] as u64;
                    count += 1;
                }
            }
            assert_eq!(integral.window_mean(x, y, radius), (sum / count) as u8);
        }
    }

    #[test]
    fn rectangular_mean_of_flat_image_is_identity() {
        let img = GrayImage::from_pixel(12, 12, Luma([77]));
        for kind in [
            NeighborhoodType::Rectangular,
            NeighborhoodType::Circular,
            NeighborhoodType::DistanceWeighted,
        ] {
            let mean = local_mean(&img, 5, kind);
            assert!(mean.pixels().all(|p| p.0[0] == 77), "{kind:?}");
        }
    }

    #[test]
    fn corner_mean_excludes_out_of_bounds() {
        // 3x3 window at the corner sees only the 2x2 in-bounds quadrant.
        let mut img = GrayImage::from_pixel(6, 6, Luma([0]));
        img.put_pixel(0, 0, Luma([100]));
        img.put_pixel(1, 0, Luma([100]));
        img.put_pixel(0, 1, Luma([100]));
        img.put_pixel(1, 1, Luma([100]));
        let mean = local_mean(&img, 3, NeighborhoodType::Rectangular);
        assert_eq!(mean.get_pixel(0, 0).0[0], 100);
    }

    #[test]
    fn adaptive_window_grows_with_variance_and_stays_odd() {
        let flat = GrayImage::from_pixel(16, 16, Luma([128]));
        assert_eq!(adaptive_window_size(&flat), 7);

        let busy = GrayImage::from_fn(16, 16, |x, y| {
            Luma([if (x + y) % 2 == 0 { 0 } else { 255 }])
        });
        let size = adaptive_window_size(&busy);
        assert!(size > 7);
        assert_eq!(size % 2, 1);
        assert!(size <= 21);
    }
}
