//! Full images handed to the send side by the producing application.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::PxsError;
use crate::protocol::segment::View;

// ── PixelFormat ──────────────────────────────────────────────────

/// Pixel layout of an [`ImageWrapper`] buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    Rgb,
    #[default]
    Rgba,
    Argb,
    Bgr,
    Bgra,
    Abgr,
}

impl PixelFormat {
    /// Bytes consumed by a single pixel in this format.
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgb | PixelFormat::Bgr => 3,
            PixelFormat::Rgba | PixelFormat::Argb | PixelFormat::Bgra | PixelFormat::Abgr => 4,
        }
    }

    /// Byte offsets of the red, green and blue channels within a pixel.
    pub const fn rgb_offsets(self) -> [usize; 3] {
        match self {
            PixelFormat::Rgb | PixelFormat::Rgba => [0, 1, 2],
            PixelFormat::Argb => [1, 2, 3],
            PixelFormat::Bgr | PixelFormat::Bgra => [2, 1, 0],
            PixelFormat::Abgr => [3, 2, 1],
        }
    }
}

// ── CompressionPolicy ────────────────────────────────────────────

/// Whether tiles go through the compressor before being sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionPolicy {
    #[default]
    On,
    Off,
}

// ── ImageWrapper ─────────────────────────────────────────────────

/// A full image plus everything needed to segment and send it.
///
/// `data` holds `height` rows of `width * bytes_per_pixel` bytes with
/// no padding.
#[derive(Debug, Clone)]
pub struct ImageWrapper {
    pub data: Bytes,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Offset of this image inside the stream's frame.
    pub x: u32,
    pub y: u32,
    pub compression: CompressionPolicy,
    /// JPEG quality, 1..=100.
    pub quality: u8,
    pub view: View,
}

impl ImageWrapper {
    /// Create an image at the frame origin with default compression.
    pub fn new(data: impl Into<Bytes>, width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            data: data.into(),
            width,
            height,
            format,
            x: 0,
            y: 0,
            compression: CompressionPolicy::On,
            quality: 75,
            view: View::Mono,
        }
    }

    /// Set the offset inside the stream's frame.
    pub fn with_position(mut self, x: u32, y: u32) -> Self {
        self.x = x;
        self.y = y;
        self
    }

    /// Set the compression policy.
    pub fn with_compression(mut self, compression: CompressionPolicy) -> Self {
        self.compression = compression;
        self
    }

    /// Set the JPEG quality. Not clamped; out-of-range values are rejected
    /// when the image is enqueued.
    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality;
        self
    }

    /// Set the view.
    pub fn with_view(mut self, view: View) -> Self {
        self.view = view;
        self
    }

    /// Bytes of one tightly packed row.
    pub fn row_len(&self) -> usize {
        self.width as usize * self.format.bytes_per_pixel()
    }

    /// Checks performed before an image is accepted for sending.
    pub fn validate(&self) -> Result<(), PxsError> {
        if self.compression == CompressionPolicy::Off && self.format != PixelFormat::Rgba {
            return Err(PxsError::InvalidImage(
                "RAW images can only be sent in RGBA format".into(),
            ));
        }
        if self.compression == CompressionPolicy::On && !(1..=100).contains(&self.quality) {
            return Err(PxsError::InvalidQuality(self.quality));
        }
        if self.width == 0 || self.height == 0 {
            return Err(PxsError::InvalidImage(format!(
                "empty image {}x{}",
                self.width, self.height
            )));
        }
        let expected = self.row_len() * self.height as usize;
        if self.data.len() < expected {
            return Err(PxsError::InvalidImage(format!(
                "buffer holds {} bytes, {}x{} {:?} needs {expected}",
                self.data.len(),
                self.width,
                self.height,
                self.format
            )));
        }
        Ok(())
    }

    /// Copy the `width × height` rectangle at `(x, y)` into a packed buffer.
    pub fn crop(&self, x: u32, y: u32, width: u32, height: u32) -> Vec<u8> {
        let bpp = self.format.bytes_per_pixel();
        let row_len = self.row_len();
        let tile_row = width as usize * bpp;
        let mut out = Vec::with_capacity(tile_row * height as usize);

        for row in y..y + height {
            let start = row as usize * row_len + x as usize * bpp;
            out.extend_from_slice(&self.data[start..start + tile_row]);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rgba(w: u32, h: u32) -> ImageWrapper {
        ImageWrapper::new(vec![0u8; (w * h * 4) as usize], w, h, PixelFormat::Rgba)
    }

    #[test]
    fn raw_requires_rgba() {
        let img = ImageWrapper::new(vec![0u8; 12], 2, 2, PixelFormat::Rgb)
            .with_compression(CompressionPolicy::Off);
        assert!(matches!(img.validate(), Err(PxsError::InvalidImage(_))));

        let img = rgba(2, 2).with_compression(CompressionPolicy::Off);
        assert!(img.validate().is_ok());
    }

    #[test]
    fn quality_range() {
        assert!(matches!(
            rgba(2, 2).with_quality(0).validate(),
            Err(PxsError::InvalidQuality(0))
        ));
        assert!(matches!(
            rgba(2, 2).with_quality(101).validate(),
            Err(PxsError::InvalidQuality(101))
        ));
        assert!(rgba(2, 2).with_quality(100).validate().is_ok());
        // quality is irrelevant for raw images
        assert!(
            rgba(2, 2)
                .with_compression(CompressionPolicy::Off)
                .with_quality(0)
                .validate()
                .is_ok()
        );
    }

    #[test]
    fn short_buffer_rejected() {
        let img = ImageWrapper::new(vec![0u8; 15], 2, 2, PixelFormat::Rgba);
        assert!(img.validate().is_err());
    }

    #[test]
    fn crop_copies_rows() {
        // 3x2 RGB image, pixel value = index
        let data: Vec<u8> = (0..18).collect();
        let img = ImageWrapper::new(data, 3, 2, PixelFormat::Rgb);
        let tile = img.crop(1, 0, 2, 2);
        assert_eq!(tile, vec![3, 4, 5, 6, 7, 8, 12, 13, 14, 15, 16, 17]);
    }

    #[test]
    fn channel_offsets() {
        assert_eq!(PixelFormat::Bgra.rgb_offsets(), [2, 1, 0]);
        assert_eq!(PixelFormat::Argb.rgb_offsets(), [1, 2, 3]);
        assert_eq!(PixelFormat::Rgb.bytes_per_pixel(), 3);
    }
}
