//! Segment decompression on the display side.
//!
//! This is the only mutation a segment undergoes after it arrives: its
//! compressed bytes are replaced in place by tightly packed RGBA rows.

use bytes::Bytes;

use crate::error::PxsError;
use crate::protocol::{DataType, Segment};
use crate::receive::Frame;

#[derive(Debug, Default, Clone, Copy)]
pub struct SegmentDecoder;

impl SegmentDecoder {
    pub fn new() -> Self {
        Self
    }

    /// Decompress `segment` into RGBA. Raw segments are left untouched.
    pub fn decode(&self, segment: &mut Segment) -> Result<(), PxsError> {
        match segment.parameters.data_type {
            DataType::Rgba => Ok(()),
            DataType::Jpeg => {
                let image =
                    image::load_from_memory_with_format(&segment.data, image::ImageFormat::Jpeg)
                        .map_err(|e| PxsError::Decompression(e.to_string()))?;

                let (width, height) = (image.width(), image.height());
                if width != segment.parameters.width || height != segment.parameters.height {
                    return Err(PxsError::Decompression(format!(
                        "jpeg is {width}x{height}, segment expects {}x{}",
                        segment.parameters.width, segment.parameters.height
                    )));
                }

                segment.data = Bytes::from(image.to_rgba8().into_raw());
                segment.parameters.data_type = DataType::Rgba;
                Ok(())
            }
            other => Err(PxsError::UnsupportedDataType(other.to_string())),
        }
    }

    /// Decode every segment of a frame, stopping at the first failure.
    pub fn decode_frame(&self, frame: &mut Frame) -> Result<(), PxsError> {
        for segment in &mut frame.segments {
            self.decode(segment)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ImageWrapper, PixelFormat, SegmentParameters};
    use crate::send::{JpegCompressor, TileCompressor};

    #[test]
    fn raw_segment_passes_through() {
        let mut seg = Segment::new(
            SegmentParameters::new(0, 0, 1, 1, DataType::Rgba),
            Bytes::from_static(&[1, 2, 3, 4]),
        );
        SegmentDecoder::new().decode(&mut seg).unwrap();
        assert_eq!(seg.data.as_ref(), &[1, 2, 3, 4]);
    }

    #[test]
    fn jpeg_segment_becomes_rgba() {
        let image = ImageWrapper::new(vec![200u8; 16 * 8 * 4], 16, 8, PixelFormat::Rgba);
        let jpeg = JpegCompressor.compress(&image.crop(0, 0, 16, 8), 16, 8, PixelFormat::Rgba, 90)
            .unwrap();

        let mut seg = Segment::new(SegmentParameters::new(0, 0, 16, 8, DataType::Jpeg), jpeg);
        SegmentDecoder::new().decode(&mut seg).unwrap();

        assert_eq!(seg.parameters.data_type, DataType::Rgba);
        assert_eq!(seg.data.len(), 16 * 8 * 4);
    }

    #[test]
    fn jpeg_size_mismatch_rejected() {
        let jpeg = JpegCompressor
            .compress(&[0u8; 4 * 4 * 4], 4, 4, PixelFormat::Rgba, 50)
            .unwrap();
        let mut seg = Segment::new(SegmentParameters::new(0, 0, 8, 8, DataType::Jpeg), jpeg);
        assert!(matches!(
            SegmentDecoder::new().decode(&mut seg),
            Err(PxsError::Decompression(_))
        ));
    }

    #[test]
    fn garbage_and_yuv_rejected() {
        let decoder = SegmentDecoder::new();
        let mut seg = Segment::new(
            SegmentParameters::new(0, 0, 1, 1, DataType::Jpeg),
            Bytes::from_static(b"not a jpeg"),
        );
        assert!(decoder.decode(&mut seg).is_err());

        let mut seg = Segment::new(
            SegmentParameters::new(0, 0, 1, 1, DataType::Yuv420),
            Bytes::from_static(&[0, 0]),
        );
        assert!(matches!(
            decoder.decode(&mut seg),
            Err(PxsError::UnsupportedDataType(_))
        ));
    }
}
