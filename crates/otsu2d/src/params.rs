use serde::{Deserialize, Serialize};

/// Shape of the local neighborhood averaged into the histogram's second axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NeighborhoodType {
    /// Full square window mean.
    Rectangular,
    /// Disk-shaped window mean.
    Circular,
    /// Window mean weighted by `1 / (1 + euclidean distance)`.
    DistanceWeighted,
}

/// Top-level thresholding strategy; the variants are mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingMethod {
    /// Direct whole-image 2D Otsu.
    SingleScale,
    /// Gaussian pyramid with per-level thresholding and blended reconstruction.
    MultiScalePyramid,
    /// Per-tile thresholding with a fallback ladder and optional overlap blending.
    RegionAdaptive,
}

/// Interpolation used when resizing pyramid levels to exact target dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterpolationMethod {
    Nearest,
    Bilinear,
    Bicubic,
}

impl InterpolationMethod {
    pub(crate) fn filter(self) -> image::imageops::FilterType {
        match self {
            Self::Nearest => image::imageops::FilterType::Nearest,
            Self::Bilinear => image::imageops::FilterType::Triangle,
            Self::Bicubic => image::imageops::FilterType::CatmullRom,
        }
    }
}

/// Immutable per-run configuration. Created once per processing request and
/// never mutated mid-run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OtsuParams {
    /// Neighborhood window side (odd, 3..=21, below the smaller image side).
    pub window_size: u32,
    /// Joint histogram side length; 0 picks a size from the pixel count
    /// (128 above 1M px, 32 below 100k, 64 between), otherwise 1..=256.
    pub histogram_bins: u32,
    /// Sigma for optional histogram smoothing, 0..=10. 0 disables the step.
    pub smoothing_strength: f64,
    /// Gaussian blur before thresholding (sigma 1.0).
    pub gaussian_preprocessing: bool,
    /// `log1p` the non-zero histogram cells before the search.
    pub log_histogram: bool,
    /// Normalize the histogram to sum 1 before the search.
    pub normalize_histogram: bool,
    /// Tiled clip-limited histogram equalization before thresholding.
    pub contrast_enhancement: bool,
    /// Derive the window size from the global intensity variance instead of
    /// using `window_size` directly.
    pub adaptive_window_sizing: bool,
    /// Elliptical open/close pass on the binary output.
    pub morphological_postprocessing: bool,
    /// Log/high-pass/exp illumination correction before thresholding.
    pub homomorphic_filtering: bool,
    /// Perona-Malik edge-preserving smoothing before thresholding.
    pub anisotropic_diffusion: bool,
    pub neighborhood_type: NeighborhoodType,
    pub processing_method: ProcessingMethod,
    /// Pyramid depth, 1..=8; clamped further by the 64px level floor.
    pub pyramid_levels: u32,
    /// Region tile side, 16..=512; also bounded by the image size.
    pub region_grid_size: u32,
    /// Opening kernel side (odd, 1..=15); the closing kernel adds 2.
    pub morphological_kernel_size: u32,
    /// Diffusion steps, 1..=50.
    pub diffusion_iterations: u32,
    /// Diffusion conductance scale, 1..=200.
    pub diffusion_kappa: f64,
    pub interpolation_method: InterpolationMethod,
}

impl Default for OtsuParams {
    fn default() -> Self {
        Self {
            window_size: 7,
            histogram_bins: 0,
            smoothing_strength: 0.0,
            gaussian_preprocessing: false,
            log_histogram: false,
            normalize_histogram: false,
            contrast_enhancement: false,
            adaptive_window_sizing: false,
            morphological_postprocessing: false,
            homomorphic_filtering: false,
            anisotropic_diffusion: false,
            neighborhood_type: NeighborhoodType::Rectangular,
            processing_method: ProcessingMethod::SingleScale,
            pyramid_levels: 3,
            region_grid_size: 64,
            morphological_kernel_size: 3,
            diffusion_iterations: 10,
            diffusion_kappa: 30.0,
            interpolation_method: InterpolationMethod::Bilinear,
        }
    }
}

impl OtsuParams {
    /// Resolves `histogram_bins == 0` against the image pixel count.
    pub fn effective_bins(&self, width: u32, height: u32) -> u32 {
        if self.histogram_bins != 0 {
            return self.histogram_bins;
        }
        let pixels = width as u64 * height as u64;
        if pixels > 1_000_000 {
            128
        } else if pixels < 100_000 {
            32
        } else {
            64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_params_are_single_scale() {
        let p = OtsuParams::default();
        assert_eq!(p.processing_method, ProcessingMethod::SingleScale);
        assert_eq!(p.window_size, 7);
        assert_eq!(p.histogram_bins, 0);
    }

    #[test]
    fn auto_bins_follow_pixel_count() {
        let p = OtsuParams::default();
        assert_eq!(p.effective_bins(2000, 1000), 128);
        assert_eq!(p.effective_bins(100, 100), 32);
        assert_eq!(p.effective_bins(500, 500), 64);
    }

    #[test]
    fn explicit_bins_win_over_auto() {
        let p = OtsuParams {
            histogram_bins: 48,
            ..OtsuParams::default()
        };
        assert_eq!(p.effective_bins(2000, 2000), 48);
    }

    #[test]
    fn params_round_trip_through_json() {
        let p = OtsuParams {
            processing_method: ProcessingMethod::RegionAdaptive,
            neighborhood_type: NeighborhoodType::DistanceWeighted,
            region_grid_size: 96,
            ..OtsuParams::default()
        };
        let json = serde_json::to_string(&p).unwrap();
        let back: OtsuParams = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);
    }
}
