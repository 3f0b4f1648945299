//! DIBCO-style quality scores for a (ground truth, result) pair.

pub mod drd;
pub mod mpm;
pub mod skeleton;

use image::GrayImage;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::buffer::ImageBuffer;
use crate::error::{OtsuError, Result};
use crate::filter::binarize_at;
use crate::validate::{require_non_uniform, validate_image, validate_metrics};

/// Both inputs are binarized at this midpoint before comparison.
pub(crate) const BINARY_MIDPOINT: u8 = 127;

/// Confusion-matrix counts plus the seven derived quality scores.
///
/// Built once per comparison and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinaryImageMetrics {
    pub true_positives: u64,
    pub true_negatives: u64,
    pub false_positives: u64,
    pub false_negatives: u64,
    pub total_pixels: u64,
    /// Harmonic mean of precision and recall; 0 when either is 0.
    pub f_measure: f64,
    /// Precision-weighted F with beta = 0.5.
    pub pseudo_f_measure: f64,
    /// Negative rate metric `(FN+FP) / (2*(TP+TN))`; 1.0 on zero denominator.
    pub nrm: f64,
    /// Distance-reciprocal distortion; unbounded above.
    pub drd: f64,
    /// Contour-based misclassification penalty; unbounded above.
    pub mpm: f64,
    /// Mean of background false-positive and foreground false-negative rates.
    pub bfc: f64,
    /// Jaccard index of the morphological skeletons.
    pub skeleton_similarity: f64,
}

/// Standalone metrics entry point over engine-boundary buffers.
///
/// Inputs are converted to intensity, binarized at the midpoint, and must be
/// non-uniform afterwards; degenerate input is an error here (unlike the
/// engine path, which reports it as a warning alongside the image).
pub fn calculate_binary_metrics(
    ground_truth: &ImageBuffer,
    result: &ImageBuffer,
) -> Result<BinaryImageMetrics> {
    let context = "calculate_binary_metrics";
    if (ground_truth.width(), ground_truth.height()) != (result.width(), result.height()) {
        return Err(OtsuError::validation(
            context,
            "result",
            format!("{}x{}", result.width(), result.height()),
            format!(
                "dimensions must match ground truth {}x{}",
                ground_truth.width(),
                ground_truth.height()
            ),
        ));
    }
    let gt = binarize_at(&ground_truth.to_gray(), BINARY_MIDPOINT);
    let res = binarize_at(&result.to_gray(), BINARY_MIDPOINT);
    compute_binary(&gt, &res)
}

/// Core comparison over already-binarized images.
pub(crate) fn compute_binary(gt: &GrayImage, res: &GrayImage) -> Result<BinaryImageMetrics> {
    let context = "compute_binary_metrics";
    validate_image(gt, context)?;
    validate_image(res, context)?;
    require_non_uniform(gt, context, "ground truth")?;
    require_non_uniform(res, context, "result")?;

    let mut tp = 0u64;
    let mut tn = 0u64;
    let mut fp = 0u64;
    let mut fn_ = 0u64;
    for (g, r) in gt.as_raw().iter().zip(res.as_raw()) {
        match (*g != 0, *r != 0) {
            (true, true) => tp += 1,
            (false, false) => tn += 1,
            (false, true) => fp += 1,
            (true, false) => fn_ += 1,
        }
    }
    let total = tp + tn + fp + fn_;

    let gt_foreground = tp + fn_;
    let ratio = gt_foreground as f64 / total as f64;
    if ratio < 0.01 || ratio > 0.99 {
        warn!(
            foreground_ratio = ratio,
            "ground-truth foreground ratio is extreme; scores may be unstable"
        );
    }

    let precision = safe_div(tp as f64, (tp + fp) as f64);
    let recall = safe_div(tp as f64, (tp + fn_) as f64);
    let f_measure = if precision > 0.0 && recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };
    let beta_sq = 0.25; // beta = 0.5 favors precision
    let pseudo_f_measure = if precision > 0.0 && recall > 0.0 {
        (1.0 + beta_sq) * precision * recall / (beta_sq * precision + recall)
    } else {
        0.0
    };
    let nrm_denominator = 2 * (tp + tn);
    let nrm = if nrm_denominator == 0 {
        1.0
    } else {
        (fn_ + fp) as f64 / nrm_denominator as f64
    };
    let background = fp + tn;
    let foreground = fn_ + tp;
    let fp_rate = safe_div(fp as f64, background as f64);
    let fn_rate = safe_div(fn_ as f64, foreground as f64);
    let bfc = (fp_rate + fn_rate) / 2.0;

    let metrics = BinaryImageMetrics {
        true_positives: tp,
        true_negatives: tn,
        false_positives: fp,
        false_negatives: fn_,
        total_pixels: total,
        f_measure,
        pseudo_f_measure,
        nrm,
        drd: drd::compute(gt, res),
        mpm: mpm::compute(gt, res),
        bfc,
        skeleton_similarity: skeleton::compute(gt, res),
    };
    validate_metrics(&metrics, total)?;
    Ok(metrics)
}

fn safe_div(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}
