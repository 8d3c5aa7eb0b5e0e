//! Segments: the rectangular tiles a frame is made of.
//!
//! # Wire format
//!
//! ```text
//! Producer ──[PixelStream]──────────────────► Server   (repeated)
//!   Payload: SegmentParameters (17 bytes) ++ tile bytes
//!
//! Producer ──[ImageView]────────────────────► Server   (on view change)
//!   Payload: View (1 byte)
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::PxsError;

// ── DataType ─────────────────────────────────────────────────────

/// Encoding of the bytes carried by a segment.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DataType {
    /// Uncompressed, tightly packed RGBA rows.
    Rgba = 0,
    /// A complete JPEG image.
    #[default]
    Jpeg = 1,
    Yuv444 = 2,
    Yuv422 = 3,
    Yuv420 = 4,
}

impl TryFrom<u8> for DataType {
    type Error = PxsError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(DataType::Rgba),
            1 => Ok(DataType::Jpeg),
            2 => Ok(DataType::Yuv444),
            3 => Ok(DataType::Yuv422),
            4 => Ok(DataType::Yuv420),
            _ => Err(PxsError::UnknownVariant {
                type_name: "DataType",
                value: value as u64,
            }),
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataType::Rgba => write!(f, "rgba"),
            DataType::Jpeg => write!(f, "jpeg"),
            DataType::Yuv444 => write!(f, "yuv444"),
            DataType::Yuv422 => write!(f, "yuv422"),
            DataType::Yuv420 => write!(f, "yuv420"),
        }
    }
}

// ── View ─────────────────────────────────────────────────────────

/// Which eye (or both) a segment belongs to.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum View {
    #[default]
    Mono = 0,
    LeftEye = 1,
    RightEye = 2,
    SideBySide = 3,
}

impl View {
    pub fn to_bytes(self) -> [u8; 1] {
        [self as u8]
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PxsError> {
        if bytes.len() != 1 {
            return Err(PxsError::InvalidPacketLength {
                expected: 1,
                actual: bytes.len(),
            });
        }
        Self::try_from(bytes[0])
    }
}

impl TryFrom<u8> for View {
    type Error = PxsError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(View::Mono),
            1 => Ok(View::LeftEye),
            2 => Ok(View::RightEye),
            3 => Ok(View::SideBySide),
            _ => Err(PxsError::UnknownVariant {
                type_name: "View",
                value: value as u64,
            }),
        }
    }
}

// ── SegmentParameters ────────────────────────────────────────────

/// Position, size and encoding of one segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SegmentParameters {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub data_type: DataType,
}

impl SegmentParameters {
    /// Encoded size on the wire.
    pub const SIZE: usize = 17;

    pub fn new(x: u32, y: u32, width: u32, height: u32, data_type: DataType) -> Self {
        Self {
            x,
            y,
            width,
            height,
            data_type,
        }
    }

    /// Serialize to bytes (little-endian).
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(&self.x.to_le_bytes());
        buf[4..8].copy_from_slice(&self.y.to_le_bytes());
        buf[8..12].copy_from_slice(&self.width.to_le_bytes());
        buf[12..16].copy_from_slice(&self.height.to_le_bytes());
        buf[16] = self.data_type as u8;
        buf
    }

    /// Deserialize from the head of `data`.
    pub fn decode(data: &[u8]) -> Result<Self, PxsError> {
        if data.len() < Self::SIZE {
            return Err(PxsError::InvalidPacketLength {
                expected: Self::SIZE,
                actual: data.len(),
            });
        }
        let u32_at = |i: usize| u32::from_le_bytes([data[i], data[i + 1], data[i + 2], data[i + 3]]);
        Ok(Self {
            x: u32_at(0),
            y: u32_at(4),
            width: u32_at(8),
            height: u32_at(12),
            data_type: DataType::try_from(data[16])?,
        })
    }
}

// ── Segment ──────────────────────────────────────────────────────

/// One tile of a frame, as sent on the wire and stored by the receive buffer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Segment {
    pub parameters: SegmentParameters,
    /// Raw RGBA or compressed bytes, depending on `parameters.data_type`.
    pub data: Bytes,
    /// Not part of the `PixelStream` payload; carried by `ImageView` messages.
    pub view: View,
}

impl Segment {
    pub fn new(parameters: SegmentParameters, data: Bytes) -> Self {
        Self {
            parameters,
            data,
            view: View::Mono,
        }
    }

    /// Encode as a `PixelStream` payload.
    pub fn to_payload(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(SegmentParameters::SIZE + self.data.len());
        buf.put_slice(&self.parameters.encode());
        buf.put_slice(&self.data);
        buf.freeze()
    }

    /// Decode a `PixelStream` payload. The view is the one last announced
    /// by the connection, supplied by the caller.
    pub fn from_payload(payload: Bytes, view: View) -> Result<Self, PxsError> {
        let parameters = SegmentParameters::decode(&payload)?;
        Ok(Self {
            parameters,
            data: payload.slice(SegmentParameters::SIZE..),
            view,
        })
    }

    /// Exclusive right edge.
    pub fn right(&self) -> u32 {
        self.parameters.x + self.parameters.width
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> u32 {
        self.parameters.y + self.parameters.height
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_parameters_layout() {
        let params = SegmentParameters::new(512, 1024, 488, 176, DataType::Jpeg);
        let encoded = params.encode();
        assert_eq!(&encoded[0..4], &512u32.to_le_bytes());
        assert_eq!(encoded[16], 1);
        assert_eq!(SegmentParameters::decode(&encoded).unwrap(), params);
    }

    #[test]
    fn segment_parameters_too_short() {
        assert!(SegmentParameters::decode(&[0u8; 10]).is_err());
    }

    #[test]
    fn segment_parameters_unknown_data_type() {
        let mut encoded = SegmentParameters::default().encode();
        encoded[16] = 42;
        assert!(matches!(
            SegmentParameters::decode(&encoded),
            Err(PxsError::UnknownVariant { type_name: "DataType", .. })
        ));
    }

    #[test]
    fn segment_payload_keeps_tile_bytes() {
        let seg = Segment::new(
            SegmentParameters::new(0, 0, 2, 1, DataType::Rgba),
            Bytes::from_static(&[1, 2, 3, 4, 5, 6, 7, 8]),
        );
        let payload = seg.to_payload();
        assert_eq!(payload.len(), SegmentParameters::SIZE + 8);

        let decoded = Segment::from_payload(payload, View::LeftEye).unwrap();
        assert_eq!(decoded.parameters, seg.parameters);
        assert_eq!(decoded.data, seg.data);
        assert_eq!(decoded.view, View::LeftEye);
    }

    #[test]
    fn view_rejects_garbage() {
        assert!(View::from_bytes(&[7]).is_err());
        assert!(View::from_bytes(&[]).is_err());
        assert_eq!(View::from_bytes(&[3]).unwrap(), View::SideBySide);
    }
}
