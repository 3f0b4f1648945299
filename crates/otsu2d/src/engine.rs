use std::sync::{Arc, Mutex};

use image::GrayImage;
use tracing::{info, warn};

use crate::buffer::ImageBuffer;
use crate::cancel::CancellationToken;
use crate::error::{OtsuError, Result};
use crate::filter::neighborhood::IntegralImage;
use crate::filter::{
    adaptive_contrast_enhancement, anisotropic_diffusion, binarize_at, gaussian_blur,
    homomorphic_filter, morphological_postprocess,
};
use crate::metrics::{compute_binary, BinaryImageMetrics, BINARY_MIDPOINT};
use crate::observer::{NoopObserver, ProcessingObserver};
use crate::params::{OtsuParams, ProcessingMethod};
use crate::pipeline::{pyramid, region, single_scale};
use crate::timeout;
use crate::validate::{is_uniform, validate_image, validate_params};

/// Result of one processing request: the binary image, quality metrics
/// against the midpoint-binarized original, and any non-fatal conditions
/// observed along the way.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub image: ImageBuffer,
    /// `None` when either side of the comparison came out uniform; the
    /// condition is then reported through `warnings` instead of an error.
    pub metrics: Option<BinaryImageMetrics>,
    pub warnings: Vec<String>,
}

/// Owns the current original/processed pair and orchestrates
/// preprocessing, strategy dispatch, and postprocessing.
pub struct ProcessingEngine {
    original: Option<GrayImage>,
    processed: Option<ImageBuffer>,
    integral: Option<IntegralImage>,
    observer: Arc<dyn ProcessingObserver>,
    inflight: Mutex<Option<CancellationToken>>,
}

impl Default for ProcessingEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessingEngine {
    pub fn new() -> Self {
        Self::with_observer(Arc::new(NoopObserver))
    }

    pub fn with_observer(observer: Arc<dyn ProcessingObserver>) -> Self {
        Self {
            original: None,
            processed: None,
            integral: None,
            observer,
            inflight: Mutex::new(None),
        }
    }

    /// Stores a new working image, precomputing its integral image.
    ///
    /// Any in-flight run tied to the previous image is cancelled: its token
    /// fires, so a detached worker stops at the next stage boundary.
    pub fn set_original_image(&mut self, buffer: ImageBuffer) -> Result<()> {
        let gray = buffer.to_gray();
        validate_image(&gray, "set_original_image")?;
        self.cancel_inflight();
        self.observer
            .on_parameter_change("original_image", &format!("{}x{}", gray.width(), gray.height()));
        self.integral = Some(IntegralImage::new(&gray));
        self.original = Some(gray);
        self.processed = None;
        Ok(())
    }

    pub fn original_image(&self) -> Option<&GrayImage> {
        self.original.as_ref()
    }

    pub fn processed_image(&self) -> Option<&ImageBuffer> {
        self.processed.as_ref()
    }

    fn cancel_inflight(&self) {
        if let Ok(mut guard) = self.inflight.lock() {
            if let Some(token) = guard.take() {
                token.cancel();
            }
        }
    }

    pub(crate) fn register_inflight(&self, token: CancellationToken) {
        if let Ok(mut guard) = self.inflight.lock() {
            *guard = Some(token);
        }
    }

    pub(crate) fn clear_inflight(&self) {
        if let Ok(mut guard) = self.inflight.lock() {
            guard.take();
        }
    }

    fn current_input(&self, context: &str) -> Result<&GrayImage> {
        self.original.as_ref().ok_or_else(|| {
            OtsuError::image_data(context, "no original image", "call set_original_image first")
        })
    }

    /// Synchronous entry point.
    pub fn process_image(&mut self, params: &OtsuParams) -> Result<ProcessOutput> {
        let token = CancellationToken::new();
        let gray = self.current_input("process_image")?;
        validate_params(params, gray.width(), gray.height())?;
        let output = run_pipeline(
            gray,
            self.integral.as_ref(),
            params,
            &token,
            self.observer.as_ref(),
        )?;
        self.processed = Some(output.image.clone());
        Ok(output)
    }

    /// Cancellable entry point with a strategy-dependent deadline.
    ///
    /// The pipeline runs on a worker thread; a deadline overrun cancels the
    /// token and surfaces a timeout error. Worker panics are converted into
    /// computation errors instead of unwinding into the caller.
    pub fn process_image_with_timeout(
        &mut self,
        token: &CancellationToken,
        params: &OtsuParams,
    ) -> Result<ProcessOutput> {
        // A pre-cancelled token never reaches a pixel loop.
        token.check("process_image_with_timeout")?;
        let gray = self.current_input("process_image_with_timeout")?.clone();
        validate_params(params, gray.width(), gray.height())?;

        let budget = timeout::timeout_budget(params, gray.width(), gray.height());
        self.register_inflight(token.clone());

        let worker_params = params.clone();
        let worker_token = token.clone();
        let integral = self.integral.clone();
        let observer = Arc::clone(&self.observer);
        let operation = operation_name(params.processing_method);
        let result = timeout::run_with_deadline(operation, budget, token, move || {
            run_pipeline(
                &gray,
                integral.as_ref(),
                &worker_params,
                &worker_token,
                observer.as_ref(),
            )
        });
        self.clear_inflight();
        if let Ok(output) = &result {
            self.processed = Some(output.image.clone());
        }
        result
    }
}

pub(crate) fn operation_name(method: ProcessingMethod) -> &'static str {
    match method {
        ProcessingMethod::SingleScale => "single-scale processing",
        ProcessingMethod::MultiScalePyramid => "multi-scale processing",
        ProcessingMethod::RegionAdaptive => "region-adaptive processing",
    }
}

/// Preprocessing, strategy dispatch, postprocessing, and the metrics pass.
///
/// Free-standing so the timeout wrapper can run it on a worker thread with
/// cloned inputs. The precomputed integral image is only usable when no
/// preprocessing stage rewrites the pixels.
pub(crate) fn run_pipeline(
    gray: &GrayImage,
    integral: Option<&IntegralImage>,
    params: &OtsuParams,
    token: &CancellationToken,
    observer: &dyn ProcessingObserver,
) -> Result<ProcessOutput> {
    let operation = operation_name(params.processing_method);
    observer.on_operation_start(operation);
    let binary = (|| {
        token.check(operation)?;
        let mut working = gray.clone();
        let mut preprocessed = false;
        if params.gaussian_preprocessing {
            working = gaussian_blur(&working, 1.0);
            preprocessed = true;
        }
        if params.contrast_enhancement {
            working = adaptive_contrast_enhancement(&working);
            preprocessed = true;
        }
        if params.homomorphic_filtering {
            working = homomorphic_filter(&working);
            preprocessed = true;
        }
        if params.anisotropic_diffusion {
            working = anisotropic_diffusion(
                &working,
                params.diffusion_iterations,
                params.diffusion_kappa,
            );
            preprocessed = true;
        }
        token.check(operation)?;

        let integral = if preprocessed { None } else { integral };
        let binary = match params.processing_method {
            ProcessingMethod::SingleScale => single_scale::process(&working, params, integral),
            ProcessingMethod::MultiScalePyramid => pyramid::process(&working, params),
            ProcessingMethod::RegionAdaptive => region::process(&working, params),
        };
        token.check(operation)?;

        if params.morphological_postprocessing {
            Ok(morphological_postprocess(
                &binary,
                params.morphological_kernel_size,
            ))
        } else {
            Ok(binary)
        }
    })();
    observer.on_operation_end(operation, binary.is_ok());
    let binary = binary?;

    let mut warnings = Vec::new();
    let total = binary.as_raw().len() as f64;
    let foreground = binary.as_raw().iter().filter(|&&v| v != 0).count() as f64;
    let ratio = foreground / total;
    if ratio < 0.01 {
        let message = format!("output foreground ratio {ratio:.4} is below 1%");
        warn!("{message}");
        warnings.push(message);
    } else if ratio > 0.99 {
        let message = format!("output foreground ratio {ratio:.4} is above 99%");
        warn!("{message}");
        warnings.push(message);
    }

    let reference = binarize_at(gray, BINARY_MIDPOINT);
    let metrics = if is_uniform(&reference) || is_uniform(&binary) {
        let message =
            "metrics skipped: midpoint-binarized original or result is uniform".to_string();
        warn!("{message}");
        warnings.push(message);
        None
    } else {
        let metrics = compute_binary(&reference, &binary)?;
        info!(
            f_measure = metrics.f_measure,
            drd = metrics.drd,
            "processing metrics computed"
        );
        Some(metrics)
    };

    Ok(ProcessOutput {
        image: ImageBuffer::from_gray(binary)?,
        metrics,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{flat_buffer, half_split_buffer};

    #[test]
    fn processing_without_an_image_fails() {
        let mut engine = ProcessingEngine::new();
        let err = engine.process_image(&OtsuParams::default()).unwrap_err();
        assert!(matches!(err, OtsuError::ImageData { .. }));
    }

    #[test]
    fn single_scale_end_to_end_scores_high() {
        let mut engine = ProcessingEngine::new();
        engine
            .set_original_image(half_split_buffer(64, 64, 30, 220))
            .unwrap();
        let out = engine.process_image(&OtsuParams::default()).unwrap();
        let metrics = out.metrics.expect("split image should yield metrics");
        assert!(metrics.f_measure >= 0.95, "f = {}", metrics.f_measure);
        assert!(engine.processed_image().is_some());
    }

    #[test]
    fn parameter_validation_runs_before_processing() {
        let mut engine = ProcessingEngine::new();
        engine
            .set_original_image(half_split_buffer(64, 64, 30, 220))
            .unwrap();
        let params = OtsuParams {
            window_size: 4,
            ..OtsuParams::default()
        };
        let err = engine.process_image(&params).unwrap_err();
        assert!(matches!(err, OtsuError::Validation { ref field, .. } if field == "window_size"));
    }

    #[test]
    fn uniform_image_yields_warnings_instead_of_metrics() {
        let mut engine = ProcessingEngine::new();
        engine.set_original_image(flat_buffer(64, 64, 255)).unwrap();
        let out = engine.process_image(&OtsuParams::default()).unwrap();
        assert!(out.metrics.is_none());
        assert!(!out.warnings.is_empty());
    }

    #[test]
    fn new_image_cancels_registered_inflight_token() {
        let mut engine = ProcessingEngine::new();
        engine
            .set_original_image(half_split_buffer(64, 64, 30, 220))
            .unwrap();
        let token = CancellationToken::new();
        engine.register_inflight(token.clone());
        engine
            .set_original_image(half_split_buffer(64, 64, 10, 240))
            .unwrap();
        assert!(token.is_cancelled());
    }
}
