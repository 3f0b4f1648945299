//! otsu2d — 2D-Otsu document binarization with DIBCO-style quality metrics.
//!
//! The engine thresholds grayscale documents using a joint histogram over
//! pixel intensity and a local-neighborhood mean, searching exhaustively for
//! the threshold pair maximizing between-class variance. Around that core:
//!
//! 1. **Preprocess** – Gaussian blur, clip-limited tiled equalization,
//!    homomorphic illumination correction, Perona-Malik diffusion.
//! 2. **Strategies** – single-scale, multi-scale pyramid with blended
//!    reconstruction, region-adaptive tiling with a per-tile fallback ladder.
//! 3. **Postprocess** – elliptical open/close cleanup.
//! 4. **Metrics** – confusion-matrix scores plus DRD, MPM, and skeleton
//!    similarity against a ground-truth image.
//!
//! # Public API
//! - [`ProcessingEngine`] with [`OtsuParams`] as the primary entry point
//! - [`calculate_binary_metrics`] for standalone evaluation
//! - [`CancellationToken`] and `ProcessingEngine::process_image_with_timeout`
//!   for cancellable runs with strategy-dependent deadlines
//!
//! Pixel I/O stays outside the crate: callers decode files themselves and
//! hand in an [`ImageBuffer`].

mod buffer;
mod cancel;
mod engine;
mod error;
pub mod filter;
mod metrics;
mod observer;
mod otsu;
mod params;
mod pipeline;
#[doc(hidden)]
pub mod test_utils;
mod timeout;
mod validate;

pub use buffer::ImageBuffer;
pub use cancel::CancellationToken;
pub use engine::{ProcessOutput, ProcessingEngine};
pub use error::{OtsuError, Result};
pub use metrics::{calculate_binary_metrics, BinaryImageMetrics};
pub use observer::{NoopObserver, ProcessingObserver};
pub use otsu::{apply_threshold, find_threshold, Histogram2D, ThresholdPair};
pub use params::{InterpolationMethod, NeighborhoodType, OtsuParams, ProcessingMethod};
pub use timeout::timeout_budget;
