//! Skeleton-overlap similarity.

use image::GrayImage;

use crate::filter::morphology::{jaccard, skeletonize};

/// Jaccard index of the two morphological skeletons.
pub(crate) fn compute(gt: &GrayImage, res: &GrayImage) -> f64 {
    jaccard(&skeletonize(gt), &skeletonize(res))
}
