//! Range/shape checks shared by the engine and metrics entry points.
//!
//! Everything here runs before heavy pixel work so a bad request fails fast
//! with a field-level error instead of deep inside a strategy.

use image::GrayImage;

use crate::buffer::{MAX_DIMENSION, MIN_DIMENSION};
use crate::error::{OtsuError, Result};
use crate::metrics::BinaryImageMetrics;
use crate::params::OtsuParams;

/// Checks the dimension invariant on an intensity image.
pub fn validate_image(image: &GrayImage, context: &str) -> Result<()> {
    let (width, height) = image.dimensions();
    for (field, value) in [("width", width), ("height", height)] {
        if !(MIN_DIMENSION..=MAX_DIMENSION).contains(&value) {
            return Err(OtsuError::validation(
                context,
                field,
                value,
                format!("must be in [{MIN_DIMENSION}, {MAX_DIMENSION}]"),
            ));
        }
    }
    Ok(())
}

/// Checks every parameter range against the image the run will see.
pub fn validate_params(params: &OtsuParams, width: u32, height: u32) -> Result<()> {
    let context = "validate_params";
    let min_dim = width.min(height);

    if params.window_size % 2 == 0 {
        return Err(OtsuError::validation(
            context,
            "window_size",
            params.window_size,
            "must be odd",
        ));
    }
    if !(3..=21).contains(&params.window_size) {
        return Err(OtsuError::validation(
            context,
            "window_size",
            params.window_size,
            "must be in [3, 21]",
        ));
    }
    if params.window_size >= min_dim {
        return Err(OtsuError::validation(
            context,
            "window_size",
            params.window_size,
            format!("must be smaller than the smaller image side ({min_dim})"),
        ));
    }
    if params.histogram_bins > 256 {
        return Err(OtsuError::validation(
            context,
            "histogram_bins",
            params.histogram_bins,
            "must be 0 (auto) or in [1, 256]",
        ));
    }
    if !(0.0..=10.0).contains(&params.smoothing_strength) {
        return Err(OtsuError::validation(
            context,
            "smoothing_strength",
            params.smoothing_strength,
            "must be in [0, 10]",
        ));
    }
    if !(1..=8).contains(&params.pyramid_levels) {
        return Err(OtsuError::validation(
            context,
            "pyramid_levels",
            params.pyramid_levels,
            "must be in [1, 8]",
        ));
    }
    if !(16..=512).contains(&params.region_grid_size) {
        return Err(OtsuError::validation(
            context,
            "region_grid_size",
            params.region_grid_size,
            "must be in [16, 512]",
        ));
    }
    if params.processing_method == crate::params::ProcessingMethod::RegionAdaptive
        && params.region_grid_size > min_dim
    {
        return Err(OtsuError::validation(
            context,
            "region_grid_size",
            params.region_grid_size,
            format!("must not exceed the smaller image side ({min_dim})"),
        ));
    }
    if params.morphological_kernel_size % 2 == 0 {
        return Err(OtsuError::validation(
            context,
            "morphological_kernel_size",
            params.morphological_kernel_size,
            "must be odd",
        ));
    }
    if !(1..=15).contains(&params.morphological_kernel_size) {
        return Err(OtsuError::validation(
            context,
            "morphological_kernel_size",
            params.morphological_kernel_size,
            "must be in [1, 15]",
        ));
    }
    if !(1..=50).contains(&params.diffusion_iterations) {
        return Err(OtsuError::validation(
            context,
            "diffusion_iterations",
            params.diffusion_iterations,
            "must be in [1, 50]",
        ));
    }
    if !(1.0..=200.0).contains(&params.diffusion_kappa) {
        return Err(OtsuError::validation(
            context,
            "diffusion_kappa",
            params.diffusion_kappa,
            "must be in [1, 200]",
        ));
    }
    Ok(())
}

/// True when every pixel carries the same value.
pub fn is_uniform(image: &GrayImage) -> bool {
    let mut pixels = image.pixels();
    match pixels.next() {
        Some(first) => pixels.all(|p| p.0[0] == first.0[0]),
        None => true,
    }
}

/// Rejects uniform/empty binary input where a meaningful comparison is
/// impossible.
pub fn require_non_uniform(image: &GrayImage, context: &str, role: &str) -> Result<()> {
    if image.is_empty() {
        return Err(OtsuError::image_data(context, "empty image", role));
    }
    if is_uniform(image) {
        return Err(OtsuError::image_data(
            context,
            "uniform binary image",
            format!("{role} has a single pixel value"),
        ));
    }
    Ok(())
}

/// Post-computation sanity checks on a finished metrics record.
pub fn validate_metrics(metrics: &BinaryImageMetrics, total_pixels: u64) -> Result<()> {
    let context = "validate_metrics";
    let sum = metrics.true_positives
        + metrics.true_negatives
        + metrics.false_positives
        + metrics.false_negatives;
    if sum != total_pixels {
        return Err(OtsuError::computation(
            context,
            format!("confusion matrix sum {sum} != total pixels {total_pixels}"),
        ));
    }
    let bounded = [
        ("f_measure", metrics.f_measure),
        ("pseudo_f_measure", metrics.pseudo_f_measure),
        ("nrm", metrics.nrm),
        ("bfc", metrics.bfc),
        ("skeleton_similarity", metrics.skeleton_similarity),
    ];
    for (name, value) in bounded {
        if !value.is_finite() {
            return Err(OtsuError::computation(
                context,
                format!("{name} is not finite: {value}"),
            ));
        }
        if !(0.0..=1.0).contains(&value) {
            return Err(OtsuError::computation(
                context,
                format!("{name} = {value} outside [0, 1]"),
            ));
        }
    }
    // DRD and MPM are unbounded distances; only finiteness and sign apply.
    for (name, value) in [("drd", metrics.drd), ("mpm", metrics.mpm)] {
        if !value.is_finite() {
            return Err(OtsuError::computation(
                context,
                format!("{name} is not finite: {value}"),
            ));
        }
        if value < 0.0 {
            return Err(OtsuError::computation(
                context,
                format!("{name} = {value} is negative"),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn small_gray() -> GrayImage {
        GrayImage::from_fn(20, 20, |x, _| Luma([(x * 12) as u8]))
    }

    #[test]
    fn even_window_size_is_rejected() {
        let params = OtsuParams {
            window_size: 4,
            ..OtsuParams::default()
        };
        let err = validate_params(&params, 20, 20).unwrap_err();
        assert!(matches!(err, OtsuError::Validation { ref field, .. } if field == "window_size"));
    }

    #[test]
    fn oversized_window_is_rejected() {
        let params = OtsuParams {
            window_size: 25,
            ..OtsuParams::default()
        };
        assert!(validate_params(&params, 20, 20).is_err());

        let params = OtsuParams {
            window_size: 21,
            ..OtsuParams::default()
        };
        assert!(validate_params(&params, 20, 20).is_err());
        assert!(validate_params(&params, 64, 64).is_ok());
    }

    #[test]
    fn kappa_range_is_enforced() {
        let params = OtsuParams {
            diffusion_kappa: 250.0,
            ..OtsuParams::default()
        };
        assert!(validate_params(&params, 64, 64).is_err());
        let params = OtsuParams {
            diffusion_kappa: 200.0,
            ..OtsuParams::default()
        };
        assert!(validate_params(&params, 64, 64).is_ok());
    }

    #[test]
    fn uniform_image_is_detected() {
        let flat = GrayImage::from_pixel(8, 8, Luma([200]));
        assert!(is_uniform(&flat));
        assert!(!is_uniform(&small_gray()));
        assert!(require_non_uniform(&flat, "test", "ground truth").is_err());
    }

    #[test]
    fn region_grid_bounded_by_image() {
        let params = OtsuParams {
            region_grid_size: 128,
            processing_method: crate::params::ProcessingMethod::RegionAdaptive,
            ..OtsuParams::default()
        };
        assert!(validate_params(&params, 64, 64).is_err());
        assert!(validate_params(&params, 256, 256).is_ok());
    }
}
