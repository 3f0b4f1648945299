use image::GrayImage;
use imageproc::distance_transform::Norm;
use imageproc::morphology::{close, erode, open};

/// Binary threshold: strictly greater than `t` becomes foreground (255).
pub fn binarize_at(image: &GrayImage, t: u8) -> GrayImage {
    let mut out = image.clone();
    for p in out.pixels_mut() {
        p.0[0] = if p.0[0] > t { 255 } else { 0 };
    }
    out
}

/// Speckle removal and gap filling on a binary image.
///
/// Opens with an elliptical element of the requested size, then closes with
/// one two sizes larger so thin strokes reconnect after the opening.
pub fn morphological_postprocess(binary: &GrayImage, kernel_size: u32) -> GrayImage {
    let open_radius = (kernel_size / 2) as u8;
    let close_radius = ((kernel_size + 2) / 2) as u8;
    let opened = if open_radius == 0 {
        binary.clone()
    } else {
        open(binary, Norm::L2, open_radius)
    };
    close(&opened, Norm::L2, close_radius)
}

const SKELETON_MAX_ITERATIONS: u32 = 100;

/// Morphological skeleton with a 3x3 cross element.
///
/// Iteratively collects `img - open(img)` while eroding, until the working
/// mask empties or the iteration cap is hit.
pub fn skeletonize(binary: &GrayImage) -> GrayImage {
    let (width, height) = binary.dimensions();
    let mut skeleton = GrayImage::new(width, height);
    let mut working = binarize_at(binary, 0);
    for _ in 0..SKELETON_MAX_ITERATIONS {
        if working.as_raw().iter().all(|&v| v == 0) {
            break;
        }
        let opened = open(&working, Norm::L1, 1);
        let skel: &mut [u8] = &mut skeleton;
        for (i, s) in skel.iter_mut().enumerate() {
            if working.as_raw()[i] != 0 && opened.as_raw()[i] == 0 {
                *s = 255;
            }
        }
        working = erode(&working, Norm::L1, 1);
    }
    skeleton
}

/// Jaccard index over foreground pixels; 1.0 when both masks are empty.
pub fn jaccard(a: &GrayImage, b: &GrayImage) -> f64 {
    let mut intersection = 0u64;
    let mut union = 0u64;
    for (pa, pb) in a.as_raw().iter().zip(b.as_raw()) {
        let fa = *pa != 0;
        let fb = *pb != 0;
        if fa && fb {
            intersection += 1;
        }
        if fa || fb {
            union += 1;
        }
    }
    if union == 0 {
        1.0
    } else {
        intersection as f64 / union as f64
    }
}
