//! Size hints a producer may advertise for its stream.

use crate::error::PxsError;

/// Value meaning "no preference" for any dimension.
pub const UNSPECIFIED_SIZE: u32 = 0;

/// Preferred, minimum and maximum dimensions of a stream, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SizeHints {
    pub max_width: u32,
    pub max_height: u32,
    pub min_width: u32,
    pub min_height: u32,
    pub preferred_width: u32,
    pub preferred_height: u32,
}

impl SizeHints {
    /// Encoded size on the wire.
    pub const SIZE: usize = 24;

    /// Hints with only the preferred size set.
    pub fn preferred(width: u32, height: u32) -> Self {
        Self {
            preferred_width: width,
            preferred_height: height,
            ..Self::default()
        }
    }

    /// Serialize to bytes (little-endian).
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let fields = [
            self.max_width,
            self.max_height,
            self.min_width,
            self.min_height,
            self.preferred_width,
            self.preferred_height,
        ];
        let mut buf = [0u8; Self::SIZE];
        for (chunk, value) in buf.chunks_exact_mut(4).zip(fields) {
            chunk.copy_from_slice(&value.to_le_bytes());
        }
        buf
    }

    /// Deserialize from bytes; the payload must be exactly [`Self::SIZE`].
    pub fn decode(data: &[u8]) -> Result<Self, PxsError> {
        if data.len() != Self::SIZE {
            return Err(PxsError::InvalidPacketLength {
                expected: Self::SIZE,
                actual: data.len(),
            });
        }
        let mut fields = [0u32; 6];
        for (value, chunk) in fields.iter_mut().zip(data.chunks_exact(4)) {
            *value = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        Ok(Self {
            max_width: fields[0],
            max_height: fields[1],
            min_width: fields[2],
            min_height: fields[3],
            preferred_width: fields[4],
            preferred_height: fields[5],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_order() {
        let hints = SizeHints {
            max_width: 1,
            max_height: 2,
            min_width: 3,
            min_height: 4,
            preferred_width: 5,
            preferred_height: 6,
        };
        let bytes = hints.encode();
        assert_eq!(&bytes[16..20], &5u32.to_le_bytes());
        assert_eq!(SizeHints::decode(&bytes).unwrap(), hints);
    }

    #[test]
    fn preferred_leaves_rest_unspecified() {
        let hints = SizeHints::preferred(1920, 1080);
        assert_eq!(hints.max_width, UNSPECIFIED_SIZE);
        assert_eq!(hints.preferred_height, 1080);
    }

    #[test]
    fn wrong_length() {
        assert!(SizeHints::decode(&[0u8; 23]).is_err());
        assert!(SizeHints::decode(&[0u8; 25]).is_err());
    }
}
