//! Distance-Reciprocal Distortion.

use image::GrayImage;

/// 5x5 inverse-distance weights; the center carries full weight.
fn weight(dx: i64, dy: i64) -> f64 {
    if dx == 0 && dy == 0 {
        1.0
    } else {
        1.0 / (((dx * dx + dy * dy) as f64).sqrt())
    }
}

/// Sums, over every mismatched pixel, the normalized inverse-distance vote
/// of ground-truth foreground in its 5x5 neighborhood; the total is divided
/// by the ground truth's foreground pixel count.
pub(crate) fn compute(gt: &GrayImage, res: &GrayImage) -> f64 {
    let (width, height) = gt.dimensions();
    let (w, h) = (width as i64, height as i64);
    let gt_foreground = gt.as_raw().iter().filter(|&&v| v != 0).count() as f64;
    if gt_foreground == 0.0 {
        return 0.0;
    }

    let mut total = 0.0f64;
    for y in 0..h {
        for x in 0..w {
            let i = (y * w + x) as usize;
            if gt.as_raw()[i] == res.as_raw()[i] {
                continue;
            }
            let mut vote = 0.0;
            let mut norm = 0.0;
            for dy in -2..=2i64 {
                for dx in -2..=2i64 {
                    let nx = x + dx;
                    let ny = y + dy;
                    if (0..w).contains(&nx) && (0..h).contains(&ny) {
                        let wgt = weight(dx, dy);
                        norm += wgt;
                        if gt.as_raw()[(ny * w + nx) as usize] != 0 {
                            vote += wgt;
                        }
                    }
                }
            }
            if norm > 0.0 {
                total += vote / norm;
            }
        }
    }
    total / gt_foreground
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::half_split_image;
    use approx::assert_relative_eq;
    use image::Luma;

    #[test]
    fn identical_images_have_zero_distortion() {
        let img = half_split_image(16, 16, 0, 255);
        assert_relative_eq!(compute(&img, &img), 0.0);
    }

    #[test]
    fn errors_near_foreground_cost_more() {
        let gt = half_split_image(32, 32, 0, 255);

        // One false positive right next to the foreground half.
        let mut near = gt.clone();
        near.put_pixel(15, 16, Luma([255]));
        let near_score = compute(&gt, &near);

        // One false positive deep in the background.
        let mut far = gt.clone();
        far.put_pixel(2, 16, Luma([255]));
        let far_score = compute(&gt, &far);

        assert!(near_score > far_score);
        assert!(far_score >= 0.0);
    }

    #[test]
    fn all_background_ground_truth_scores_zero() {
        let gt = GrayImage::new(16, 16);
        let mut res = GrayImage::new(16, 16);
        res.put_pixel(4, 4, Luma([255]));
        assert_relative_eq!(compute(&gt, &res), 0.0);
    }
}
