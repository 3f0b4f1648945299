use image::{DynamicImage, GrayImage};

use crate::error::{OtsuError, Result};

/// Smallest accepted image dimension.
pub const MIN_DIMENSION: u32 = 3;
/// Largest accepted image dimension.
pub const MAX_DIMENSION: u32 = 32_768;

/// Owned 8-bit pixel grid exchanged across the engine boundary.
///
/// The surrounding layer decodes files into this shape; the engine works on
/// the single-channel intensity view internally and hands results back as a
/// 1-channel buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBuffer {
    width: u32,
    height: u32,
    channels: u8,
    data: Vec<u8>,
}

impl ImageBuffer {
    /// Builds a buffer, checking the dimension and channel invariants.
    pub fn new(width: u32, height: u32, channels: u8, data: Vec<u8>) -> Result<Self> {
        let context = "ImageBuffer::new";
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
        if !matches!(channels, 1 | 3 | 4) {
            return Err(OtsuError::validation(
                context,
                "channels",
                channels,
                "must be 1, 3, or 4",
            ));
        }
        let expected = width as usize * height as usize * channels as usize;
        if data.len() != expected {
            return Err(OtsuError::validation(
                context,
                "data",
                data.len(),
                format!("expected {expected} samples for {width}x{height}x{channels}"),
            ));
        }
        Ok(Self {
            width,
            height,
            channels,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Single-channel intensity view; 3/4-channel input goes through BT.601
    /// luma weights, the alpha channel is ignored.
    pub fn to_gray(&self) -> GrayImage {
        let mut out = GrayImage::new(self.width, self.height);
        let stride = self.channels as usize;
        for (i, px) in out.pixels_mut().enumerate() {
            let base = i * stride;
            px.0[0] = match self.channels {
                1 => self.data[base],
                _ => {
                    let r = self.data[base] as f32;
                    let g = self.data[base + 1] as f32;
                    let b = self.data[base + 2] as f32;
                    (0.299 * r + 0.587 * g + 0.114 * b).round().clamp(0.0, 255.0) as u8
                }
            };
        }
        out
    }

    /// Wraps a grayscale image without copying its storage.
    pub fn from_gray(image: GrayImage) -> Result<Self> {
        let (width, height) = image.dimensions();
        Self::new(width, height, 1, image.into_raw())
    }

    /// Converts any decoded image into the engine's buffer shape.
    pub fn from_dynamic(image: &DynamicImage) -> Result<Self> {
        match image {
            DynamicImage::ImageLuma8(g) => Self::from_gray(g.clone()),
            DynamicImage::ImageRgb8(rgb) => {
                let (w, h) = rgb.dimensions();
                Self::new(w, h, 3, rgb.as_raw().clone())
            }
            DynamicImage::ImageRgba8(rgba) => {
                let (w, h) = rgba.dimensions();
                Self::new(w, h, 4, rgba.as_raw().clone())
            }
            other => Self::from_gray(other.to_luma8()),
        }
    }

    /// Consumes a single-channel buffer into a `GrayImage`.
    pub fn into_gray(self) -> Result<GrayImage> {
        if self.channels != 1 {
            return Err(OtsuError::image_data(
                "ImageBuffer::into_gray",
                "not single-channel",
                format!("channels = {}", self.channels),
            ));
        }
        GrayImage::from_raw(self.width, self.height, self.data).ok_or_else(|| {
            OtsuError::computation("ImageBuffer::into_gray", "storage/dimension mismatch")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_undersized_dimensions() {
        let err = ImageBuffer::new(2, 10, 1, vec![0; 20]).unwrap_err();
        assert!(err.to_string().contains("width"));
    }

    #[test]
    fn rejects_bad_channel_count() {
        assert!(ImageBuffer::new(4, 4, 2, vec![0; 32]).is_err());
    }

    #[test]
    fn rejects_data_length_mismatch() {
        assert!(ImageBuffer::new(4, 4, 1, vec![0; 15]).is_err());
    }

    #[test]
    fn rgb_luma_conversion_uses_bt601_weights() {
        let mut data = Vec::new();
        for _ in 0..3 {
            data.extend_from_slice(&[255, 0, 0, 0, 255, 0, 0, 0, 255]);
        }
        let buf = ImageBuffer::new(3, 3, 3, data).unwrap();
        let gray = buf.to_gray();
        assert_eq!(gray.get_pixel(0, 0).0[0], 76); // 0.299 * 255
        assert_eq!(gray.get_pixel(1, 0).0[0], 150); // 0.587 * 255
        assert_eq!(gray.get_pixel(2, 0).0[0], 29); // 0.114 * 255
    }

    #[test]
    fn gray_round_trip_preserves_pixels() {
        let img = GrayImage::from_fn(5, 4, |x, y| image::Luma([(x + y) as u8 * 10]));
        let buf = ImageBuffer::from_gray(img.clone()).unwrap();
        assert_eq!(buf.into_gray().unwrap(), img);
    }
}
