//! Tile compression, the codec collaborator of the segmenter.

use bytes::Bytes;
use image::ExtendedColorType;
use image::codecs::jpeg::JpegEncoder;

use crate::error::PxsError;
use crate::protocol::{DataType, PixelFormat};

/// Turns one packed tile into the bytes of a compressed segment.
pub trait TileCompressor: Send + Sync {
    /// Compress `width × height` pixels laid out as `format`.
    fn compress(
        &self,
        tile: &[u8],
        width: u32,
        height: u32,
        format: PixelFormat,
        quality: u8,
    ) -> Result<Bytes, PxsError>;

    /// Data type tag of the produced segments.
    fn data_type(&self) -> DataType {
        DataType::Jpeg
    }
}

/// Baseline JPEG via the `image` crate. Alpha is dropped.
#[derive(Debug, Default, Clone, Copy)]
pub struct JpegCompressor;

impl TileCompressor for JpegCompressor {
    fn compress(
        &self,
        tile: &[u8],
        width: u32,
        height: u32,
        format: PixelFormat,
        quality: u8,
    ) -> Result<Bytes, PxsError> {
        let bpp = format.bytes_per_pixel();
        let pixels = width as usize * height as usize;
        if tile.len() < pixels * bpp {
            return Err(PxsError::Compression(format!(
                "tile holds {} bytes, {width}x{height} needs {}",
                tile.len(),
                pixels * bpp
            )));
        }

        let [r, g, b] = format.rgb_offsets();
        let mut rgb = Vec::with_capacity(pixels * 3);
        for px in tile.chunks_exact(bpp).take(pixels) {
            rgb.extend_from_slice(&[px[r], px[g], px[b]]);
        }

        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100)).encode(
            &rgb,
            width,
            height,
            ExtendedColorType::Rgb8,
        )?;
        Ok(Bytes::from(out))
    }
}
