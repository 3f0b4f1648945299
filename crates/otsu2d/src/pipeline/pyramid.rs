use image::imageops;
use image::GrayImage;
use tracing::debug;

use super::single_scale::{self, otsu_pass, PassSettings};
use crate::filter::binarize_at;
use crate::params::OtsuParams;

/// Every pyramid level must keep both dimensions at or above this.
const LEVEL_FLOOR: u32 = 64;
/// Reconstruction blend weight toward the finer level.
const FINER_WEIGHT: f64 = 0.7;
/// Separable binomial taps (1 4 6 4 1) / 16.
const BINOMIAL: [f64; 5] = [1.0 / 16.0, 4.0 / 16.0, 6.0 / 16.0, 4.0 / 16.0, 1.0 / 16.0];

/// Largest level count (base included) such that every level stays at or
/// above the 64px floor, capped by the request.
fn effective_levels(width: u32, height: u32, requested: u32) -> u32 {
    let mut levels = 0;
    while levels < requested {
        let w = width >> levels;
        let h = height >> levels;
        if w < LEVEL_FLOOR || h < LEVEL_FLOOR {
            break;
        }
        levels += 1;
    }
    levels
}

/// Separable binomial blur with truncated, renormalized borders.
fn binomial_blur(image: &GrayImage) -> GrayImage {
    let (width, height) = image.dimensions();
    let (w, h) = (width as i64, height as i64);
    let src = image.as_raw();
    let mut tmp = vec![0.0f64; src.len()];
    for y in 0..h {
        for x in 0..w {
            let mut sum = 0.0;
            let mut weight = 0.0;
            for (i, &k) in BINOMIAL.iter().enumerate() {
                let nx = x + i as i64 - 2;
                if (0..w).contains(&nx) {
                    sum += k * src[(y * w + nx) as usize] as f64;
                    weight += k;
                }
            }
            tmp[(y * w + x) as usize] = sum / weight;
        }
    }
    let mut out = GrayImage::new(width, height);
    let out_raw: &mut [u8] = &mut out;
    for y in 0..h {
        for x in 0..w {
            let mut sum = 0.0;
            let mut weight = 0.0;
            for (i, &k) in BINOMIAL.iter().enumerate() {
                let ny = y + i as i64 - 2;
                if (0..h).contains(&ny) {
                    sum += k * tmp[(ny * w + x) as usize];
                    weight += k;
                }
            }
            out_raw[(y * w + x) as usize] = (sum / weight).round().clamp(0.0, 255.0) as u8;
        }
    }
    out
}

/// Blur + keep even rows/columns.
fn downsample(image: &GrayImage) -> GrayImage {
    let blurred = binomial_blur(image);
    let (width, height) = image.dimensions();
    GrayImage::from_fn(width / 2, height / 2, |x, y| {
        *blurred.get_pixel(x * 2, y * 2)
    })
}

/// Zero-insertion 2x upsample followed by the 4x-gain binomial filter, then
/// an exact-size resize with the configured interpolation.
fn upsample(image: &GrayImage, target_w: u32, target_h: u32, params: &OtsuParams) -> GrayImage {
    let (width, height) = image.dimensions();
    let (w2, h2) = (width * 2, height * 2);
    let src = image.as_raw();
    // With zeros at odd positions, the 4x kernel reduces to two phases per
    // axis: (1 6 1)/8 at even taps, (4 4)/8 at odd taps.
    let mut rows = vec![0.0f64; (w2 * height) as usize];
    for y in 0..height as usize {
        for x in 0..w2 as usize {
            let v = if x % 2 == 0 {
                let c = src[y * width as usize + x / 2] as f64;
                let l = if x >= 2 {
                    src[y * width as usize + x / 2 - 1] as f64
                } else {
                    c
                };
                let r = if x / 2 + 1 < width as usize {
                    src[y * width as usize + x / 2 + 1] as f64
                } else {
                    c
                };
                (l + 6.0 * c + r) / 8.0
            } else {
                let l = src[y * width as usize + x / 2] as f64;
                let r = if x / 2 + 1 < width as usize {
                    src[y * width as usize + x / 2 + 1] as f64
                } else {
                    l
                };
                (4.0 * l + 4.0 * r) / 8.0
            };
            rows[y * w2 as usize + x] = v;
        }
    }
    let mut up = GrayImage::new(w2, h2);
    let up_raw: &mut [u8] = &mut up;
    for y in 0..h2 as usize {
        for x in 0..w2 as usize {
            let v = if y % 2 == 0 {
                let c = rows[(y / 2) * w2 as usize + x];
                let t = if y >= 2 {
                    rows[(y / 2 - 1) * w2 as usize + x]
                } else {
                    c
                };
                let b = if y / 2 + 1 < height as usize {
                    rows[(y / 2 + 1) * w2 as usize + x]
                } else {
                    c
                };
                (t + 6.0 * c + b) / 8.0
            } else {
                let t = rows[(y / 2) * w2 as usize + x];
                let b = if y / 2 + 1 < height as usize {
                    rows[(y / 2 + 1) * w2 as usize + x]
                } else {
                    t
                };
                (4.0 * t + 4.0 * b) / 8.0
            };
            up_raw[y * w2 as usize + x] = v.round().clamp(0.0, 255.0) as u8;
        }
    }
    if (w2, h2) == (target_w, target_h) {
        up
    } else {
        imageops::resize(&up, target_w, target_h, params.interpolation_method.filter())
    }
}

fn level_settings(level_image: &GrayImage, params: &OtsuParams, level: u32) -> PassSettings {
    let mut settings = PassSettings::from_params(level_image, params);
    let (width, height) = level_image.dimensions();
    settings.window_size =
        single_scale::resolve_window((settings.window_size >> level).max(3), width, height);
    if params.histogram_bins != 0 {
        settings.bins = (params.histogram_bins >> level).max(32);
    }
    settings
}

/// Multi-scale pyramid strategy.
///
/// Builds a Gaussian pyramid, thresholds each level with a shrunken window
/// and bin count, then reconstructs coarsest-to-finest, blending each
/// upsampled coarse result into the finer level's own result.
pub fn process(gray: &GrayImage, params: &OtsuParams) -> GrayImage {
    let (width, height) = gray.dimensions();
    let levels = effective_levels(width, height, params.pyramid_levels);
    if levels <= 1 {
        if levels == 0 {
            debug!(width, height, "image below pyramid floor, using single scale");
        }
        return single_scale::process(gray, params, None);
    }

    let mut pyramid = Vec::with_capacity(levels as usize);
    pyramid.push(gray.clone());
    for _ in 1..levels {
        match pyramid.last().map(downsample) {
            Some(next) => pyramid.push(next),
            None => break,
        }
    }
    if pyramid.len() <= 1 {
        return single_scale::process(gray, params, None);
    }

    let results: Vec<GrayImage> = pyramid
        .iter()
        .enumerate()
        .map(|(level, img)| otsu_pass(img, &level_settings(img, params, level as u32)))
        .collect();

    let mut current = match results.last() {
        Some(coarsest) => coarsest.clone(),
        None => return single_scale::process(gray, params, None),
    };
    for level in (0..results.len() - 1).rev() {
        let finer = &results[level];
        let (tw, th) = finer.dimensions();
        let up = upsample(&current, tw, th, params);
        let mut blended = GrayImage::new(tw, th);
        let blended_raw: &mut [u8] = &mut blended;
        for (i, out) in blended_raw.iter_mut().enumerate() {
            let f = finer.as_raw()[i] as f64;
            let c = up.as_raw()[i] as f64;
            *out = (FINER_WEIGHT * f + (1.0 - FINER_WEIGHT) * c)
                .round()
                .clamp(0.0, 255.0) as u8;
        }
        current = blended;
    }
    binarize_at(&current, 127)
}
