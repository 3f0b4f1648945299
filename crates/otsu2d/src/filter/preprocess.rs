use image::GrayImage;

fn to_f32(image: &GrayImage) -> Vec<f32> {
    image.as_raw().iter().map(|&v| v as f32).collect()
}

fn from_f32(data: &[f32], width: u32, height: u32) -> GrayImage {
    let raw = data
        .iter()
        .map(|&v| v.round().clamp(0.0, 255.0) as u8)
        .collect();
    // Length is preserved by construction.
    GrayImage::from_raw(width, height, raw).unwrap_or_else(|| GrayImage::new(width, height))
}

fn gaussian_kernel(sigma: f64, size: usize) -> Vec<f64> {
    let center = (size / 2) as f64;
    let mut kernel: Vec<f64> = (0..size)
        .map(|i| {
            let d = i as f64 - center;
            (-d * d / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let sum: f64 = kernel.iter().sum();
    for k in &mut kernel {
        *k /= sum;
    }
    kernel
}

/// Separable Gaussian blur with kernel size `round(6*sigma) + 1`, forced odd.
///
/// Border windows are truncated and the kernel renormalized over the
/// in-bounds taps.
pub fn gaussian_blur(image: &GrayImage, sigma: f64) -> GrayImage {
    if sigma <= 0.0 {
        return image.clone();
    }
    let mut size = (6.0 * sigma).round() as usize + 1;
    if size % 2 == 0 {
        size += 1;
    }
    let kernel = gaussian_kernel(sigma, size);
    let radius = (size / 2) as i64;
    let (width, height) = image.dimensions();
    let (w, h) = (width as i64, height as i64);
    let src = to_f32(image);

    // Horizontal pass.
    let mut tmp = vec![0.0f32; src.len()];
    for y in 0..h {
        for x in 0..w {
            let mut sum = 0.0f64;
            let mut weight = 0.0f64;
            for (i, &k) in kernel.iter().enumerate() {
                let nx = x + i as i64 - radius;
                if (0..w).contains(&nx) {
                    sum += k * src[(y * w + nx) as usize] as f64;
                    weight += k;
                }
            }
            tmp[(y * w + x) as usize] = (sum / weight) as f32;
        }
    }
    // Vertical pass.
    let mut out = vec![0.0f32; src.len()];
    for y in 0..h {
        for x in 0..w {
            let mut sum = 0.0f64;
            let mut weight = 0.0f64;
            for (i, &k) in kernel.iter().enumerate() {
                let ny = y + i as i64 - radius;
                if (0..h).contains(&ny) {
                    sum += k * tmp[(ny * w + x) as usize] as f64;
                    weight += k;
                }
            }
            out[(y * w + x) as usize] = (sum / weight) as f32;
        }
    }
    from_f32(&out, width, height)
}

const CLAHE_TILES: u32 = 8;
const CLAHE_CLIP_LIMIT: f64 = 2.0;

/// Clip-limited tiled histogram equalization (8x8 tiles, clip limit 2.0).
///
/// Per-tile equalization LUTs are blended bilinearly between tile centers so
/// tile seams do not show up in the output.
pub fn adaptive_contrast_enhancement(image: &GrayImage) -> GrayImage {
    let (width, height) = image.dimensions();
    let tiles_x = CLAHE_TILES.min(width).max(1);
    let tiles_y = CLAHE_TILES.min(height).max(1);
    let tile_w = width.div_ceil(tiles_x);
    let tile_h = height.div_ceil(tiles_y);

    // One 256-entry LUT per tile.
    let mut luts = vec![[0u8; 256]; (tiles_x * tiles_y) as usize];
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let x0 = tx * tile_w;
            let y0 = ty * tile_h;
            let x1 = (x0 + tile_w).min(width);
            let y1 = (y0 + tile_h).min(height);
            let mut hist = [0u64; 256];
            for y in y0..y1 {
                for x in x0..x1 {
                    hist[image.get_pixel(x, y).0[0] as usize] += 1;
                }
            }
            let total = ((x1 - x0) * (y1 - y0)) as u64;
            if total == 0 {
                continue;
            }
            let limit = ((CLAHE_CLIP_LIMIT * total as f64 / 256.0).round() as u64).max(1);
            let mut excess = 0u64;
            for h in &mut hist {
                if *h > limit {
                    excess += *h - limit;
                    *h = limit;
                }
            }
            let redistribute = excess / 256;
            for h in &mut hist {
                *h += redistribute;
            }
            let lut = &mut luts[(ty * tiles_x + tx) as usize];
            let mut cdf = 0u64;
            for (v, h) in hist.iter().enumerate() {
                cdf += h;
                lut[v] = ((255 * cdf) / total).min(255) as u8;
            }
        }
    }

    GrayImage::from_fn(width, height, |x, y| {
        // Position in tile-center coordinates.
        let fx = (x as f64 - tile_w as f64 / 2.0) / tile_w as f64;
        let fy = (y as f64 - tile_h as f64 / 2.0) / tile_h as f64;
        let tx0 = fx.floor().max(0.0) as u32;
        let ty0 = fy.floor().max(0.0) as u32;
        let tx0 = tx0.min(tiles_x - 1);
        let ty0 = ty0.min(tiles_y - 1);
        let tx1 = (tx0 + 1).min(tiles_x - 1);
        let ty1 = (ty0 + 1).min(tiles_y - 1);
        // Margins outside the first/last tile center map fully to that tile.
        let wx = if fx < 0.0 { 0.0 } else { fx - fx.floor() };
        let wy = if fy < 0.0 { 0.0 } else { fy - fy.floor() };

        let v = image.get_pixel(x, y).0[0] as usize;
        let v00 = luts[(ty0 * tiles_x + tx0) as usize][v] as f64;
        let v10 = luts[(ty0 * tiles_x + tx1) as usize][v] as f64;
        let v01 = luts[(ty1 * tiles_x + tx0) as usize][v] as f64;
        let v11 = luts[(ty1 * tiles_x + tx1) as usize][v] as f64;
        let top = v00 * (1.0 - wx) + v10 * wx;
        let bottom = v01 * (1.0 - wx) + v11 * wx;
        let blended = top * (1.0 - wy) + bottom * wy;
        image::Luma([blended.round().clamp(0.0, 255.0) as u8])
    })
}

/// Illumination correction: `log1p` transform, 5x5 high-pass (center 24,
/// others -1), exponential transform back.
pub fn homomorphic_filter(image: &GrayImage) -> GrayImage {
    let (width, height) = image.dimensions();
    let (w, h) = (width as i64, height as i64);
    let log: Vec<f64> = image
        .as_raw()
        .iter()
        .map(|&v| (v as f64).ln_1p())
        .collect();
    let mut out = vec![0.0f32; log.len()];
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0f64;
            for dy in -2..=2i64 {
                for dx in -2..=2i64 {
                    let nx = x + dx;
                    let ny = y + dy;
                    if (0..w).contains(&nx) && (0..h).contains(&ny) {
                        let weight = if dx == 0 && dy == 0 { 24.0 } else { -1.0 };
                        acc += weight * log[(ny * w + nx) as usize];
                    }
                }
            }
            out[(y * w + x) as usize] = acc.exp_m1() as f32;
        }
    }
    from_f32(&out, width, height)
}

/// Perona-Malik edge-preserving smoothing.
///
/// Explicit scheme: 4-neighbor gradients weighted by `exp(-(g/kappa)^2)`,
/// accumulated with coefficient 0.25 per step, double-buffered. Border pixels
/// are carried over unchanged.
pub fn anisotropic_diffusion(image: &GrayImage, iterations: u32, kappa: f64) -> GrayImage {
    let (width, height) = image.dimensions();
    let (w, h) = (width as usize, height as usize);
    if w < 3 || h < 3 {
        return image.clone();
    }
    let mut current: Vec<f32> = to_f32(image);
    let mut next = current.clone();
    let kappa = kappa as f32;
    for _ in 0..iterations {
        for y in 1..h - 1 {
            for x in 1..w - 1 {
                let i = y * w + x;
                let v = current[i];
                let grads = [
                    current[i - w] - v,
                    current[i + w] - v,
                    current[i - 1] - v,
                    current[i + 1] - v,
                ];
                let mut flux = 0.0f32;
                for g in grads {
                    let c = (-(g / kappa) * (g / kappa)).exp();
                    flux += c * g;
                }
                next[i] = v + 0.25 * flux;
            }
        }
        std::mem::swap(&mut current, &mut next);
    }
    from_f32(&current, width, height)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn blur_preserves_flat_images() {
        let img = GrayImage::from_pixel(16, 16, Luma([90]));
        let blurred = gaussian_blur(&img, 1.5);
        assert!(blurred.pixels().all(|p| p.0[0] == 90));
    }

    #[test]
    fn blur_softens_a_step_edge() {
        let img = GrayImage::from_fn(32, 8, |x, _| Luma([if x < 16 { 0 } else { 200 }]));
        let blurred = gaussian_blur(&img, 2.0);
        let at_edge = blurred.get_pixel(16, 4).0[0];
        assert!(at_edge > 0 && at_edge < 200);
        // Far from the edge the plateau survives.
        assert_eq!(blurred.get_pixel(0, 4).0[0], 0);
        assert_eq!(blurred.get_pixel(31, 4).0[0], 200);
    }

    #[test]
    fn contrast_enhancement_spreads_a_narrow_range() {
        let img = GrayImage::from_fn(64, 64, |x, y| Luma([100 + ((x + y) % 20) as u8]));
        let enhanced = adaptive_contrast_enhancement(&img);
        let (min, max) = enhanced
            .pixels()
            .fold((255u8, 0u8), |(lo, hi), p| (lo.min(p.0[0]), hi.max(p.0[0])));
        let input_range = 19u8;
        assert!(max - min > input_range);
    }

    #[test]
    fn diffusion_smooths_interior_noise() {
        let mut img = GrayImage::from_pixel(9, 9, Luma([100]));
        img.put_pixel(4, 4, Luma([200]));
        let out = anisotropic_diffusion(&img, 10, 50.0);
        let center = out.get_pixel(4, 4).0[0];
        assert!(center < 200);
        assert!(center >= 100);
    }

    #[test]
    fn diffusion_keeps_borders_unchanged() {
        let img = GrayImage::from_fn(8, 8, |x, y| Luma([(x * 20 + y * 10) as u8]));
        let out = anisotropic_diffusion(&img, 5, 30.0);
        for x in 0..8 {
            assert_eq!(out.get_pixel(x, 0).0[0], img.get_pixel(x, 0).0[0]);
            assert_eq!(out.get_pixel(x, 7).0[0], img.get_pixel(x, 7).0[0]);
        }
    }

    #[test]
    fn homomorphic_output_is_in_range() {
        let img = GrayImage::from_fn(16, 16, |x, _| Luma([(x * 15) as u8]));
        let out = homomorphic_filter(&img);
        assert_eq!(out.dimensions(), (16, 16));
    }
}
