//! Synthetic-image builders shared by unit and integration tests.

use image::{GrayImage, Luma};

use crate::buffer::ImageBuffer;

/// Left half at `left`, right half at `right`.
pub fn half_split_image(width: u32, height: u32, left: u8, right: u8) -> GrayImage {
    GrayImage::from_fn(width, height, |x, _| {
        Luma([if x < width / 2 { left } else { right }])
    })
}

/// `half_split_image` wrapped as an engine-boundary buffer.
pub fn half_split_buffer(width: u32, height: u32, left: u8, right: u8) -> ImageBuffer {
    buffer_of(half_split_image(width, height, left, right))
}

/// Single-valued image as an engine-boundary buffer.
pub fn flat_buffer(width: u32, height: u32, value: u8) -> ImageBuffer {
    buffer_of(GrayImage::from_pixel(width, height, Luma([value])))
}

/// Two filled squares on a dark background, for contour/skeleton tests.
pub fn two_blob_image(width: u32, height: u32) -> GrayImage {
    let mut img = GrayImage::new(width, height);
    let side = (width.min(height) / 4).max(4);
    for (ox, oy) in [(width / 8, height / 8), (width / 2, height / 2)] {
        for y in oy..(oy + side).min(height) {
            for x in ox..(ox + side).min(width) {
                img.put_pixel(x, y, Luma([255]));
            }
        }
    }
    img
}

fn buffer_of(image: GrayImage) -> ImageBuffer {
    // Test-only helper; the dimensions are always valid here.
    ImageBuffer::from_gray(image).expect("valid synthetic image")
}
