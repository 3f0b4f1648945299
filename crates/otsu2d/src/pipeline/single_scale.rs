use image::GrayImage;

use crate::filter::neighborhood::{self, IntegralImage};
use crate::filter::{adaptive_window_size, local_mean};
use crate::otsu::{apply_threshold, find_threshold, Histogram2D};
use crate::params::{NeighborhoodType, OtsuParams};

/// Inputs of one histogram/search/apply pass; the pyramid and region
/// strategies reuse this with per-level or per-tile overrides.
#[derive(Debug, Clone)]
pub(crate) struct PassSettings {
    pub window_size: u32,
    pub bins: u32,
    pub neighborhood: NeighborhoodType,
    pub log_histogram: bool,
    pub normalize_histogram: bool,
    pub smoothing_sigma: f64,
}

impl PassSettings {
    pub(crate) fn from_params(gray: &GrayImage, params: &OtsuParams) -> Self {
        let (width, height) = gray.dimensions();
        let window = if params.adaptive_window_sizing {
            adaptive_window_size(gray)
        } else {
            params.window_size
        };
        Self {
            window_size: resolve_window(window, width, height),
            bins: params.effective_bins(width, height),
            neighborhood: params.neighborhood_type,
            log_histogram: params.log_histogram,
            normalize_histogram: params.normalize_histogram,
            smoothing_sigma: params.smoothing_strength,
        }
    }
}

/// Forces the window odd and keeps it below the smaller image side,
/// never smaller than 3.
pub(crate) fn resolve_window(requested: u32, width: u32, height: u32) -> u32 {
    let mut window = requested.max(3);
    if window % 2 == 0 {
        window += 1;
    }
    let limit = width.min(height);
    while window >= limit && window > 3 {
        window -= 2;
    }
    window
}

/// One full 2D-Otsu pass: local mean, joint histogram, optional transforms,
/// threshold search, application.
pub(crate) fn otsu_pass(gray: &GrayImage, settings: &PassSettings) -> GrayImage {
    let mean = local_mean(gray, settings.window_size, settings.neighborhood);
    threshold_with_mean(gray, &mean, settings)
}

pub(crate) fn threshold_with_mean(
    gray: &GrayImage,
    mean: &GrayImage,
    settings: &PassSettings,
) -> GrayImage {
    let mut histogram = Histogram2D::build(gray, mean, settings.bins);
    if settings.log_histogram {
        histogram.apply_log_scale();
    }
    if settings.normalize_histogram {
        histogram.normalize();
    }
    if settings.smoothing_sigma > 0.0 {
        histogram.smooth(settings.smoothing_sigma);
    }
    let threshold = find_threshold(&histogram);
    apply_threshold(gray, mean, threshold, settings.bins)
}

/// Direct whole-image 2D Otsu.
///
/// When the caller holds an integral image of this exact input, the
/// rectangular local mean reuses it instead of rebuilding one.
pub fn process(
    gray: &GrayImage,
    params: &OtsuParams,
    integral: Option<&IntegralImage>,
) -> GrayImage {
    let settings = PassSettings::from_params(gray, params);
    match (settings.neighborhood, integral) {
        (NeighborhoodType::Rectangular, Some(ii)) if ii.dimensions() == gray.dimensions() => {
            let mean = neighborhood::rectangular_mean(ii, settings.window_size);
            threshold_with_mean(gray, &mean, &settings)
        }
        _ => otsu_pass(gray, &settings),
    }
}
