use crate::error::PxsError;
use crate::message::MessageType;

/// Bytes reserved for the stream identifier in every header.
pub const STREAM_ID_LENGTH: usize = 64;

/// Encoded header size on the wire.
pub const HEADER_LENGTH: usize = 16 + STREAM_ID_LENGTH;

const MAGIC: [u8; 4] = *b"PXS0";

pub type MessageHeaderBytes = [u8; HEADER_LENGTH];

/// Fixed-size header preceding every payload.
///
/// ```text
/// magic:          [u8; 4]   "PXS0"
/// checksum:       u32       blake3(payload)[0..4], 0 only when empty
/// message_type:   u32
/// payload_length: u32
/// stream_id:      [u8; 64]  UTF-8, NUL padded
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct MessageHeader {
    checksum: u32,
    message_type: MessageType,
    payload_length: u32,
    stream_id: String,
}

impl MessageHeader {
    pub fn new(
        message_type: MessageType,
        payload_length: u32,
        stream_id: &str,
    ) -> Result<Self, PxsError> {
        validate_stream_id(stream_id)?;
        Ok(Self {
            checksum: 0,
            message_type,
            payload_length,
            stream_id: stream_id.to_string(),
        })
    }

    pub fn to_bytes(&self) -> MessageHeaderBytes {
        let mut bytes: MessageHeaderBytes = [0; HEADER_LENGTH];
        bytes[0..4].copy_from_slice(&MAGIC);
        bytes[4..8].copy_from_slice(&self.checksum.to_le_bytes());
        bytes[8..12].copy_from_slice(&(self.message_type as u32).to_le_bytes());
        bytes[12..16].copy_from_slice(&self.payload_length.to_le_bytes());
        let id = self.stream_id.as_bytes();
        bytes[16..16 + id.len()].copy_from_slice(id);
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PxsError> {
        if bytes.len() < HEADER_LENGTH {
            return Err(PxsError::InvalidPacketLength {
                expected: HEADER_LENGTH,
                actual: bytes.len(),
            });
        }
        if bytes[0..4] != MAGIC {
            return Err(PxsError::InvalidMagic);
        }

        let checksum = read_u32(&bytes[4..8]);
        let message_type = MessageType::try_from(read_u32(&bytes[8..12]))?;
        let payload_length = read_u32(&bytes[12..16]);

        let id_field = &bytes[16..HEADER_LENGTH];
        let id_len = id_field
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(STREAM_ID_LENGTH);
        let stream_id = std::str::from_utf8(&id_field[..id_len])
            .map_err(|_| PxsError::InvalidHeader("stream id is not valid utf-8"))?
            .to_string();

        Ok(Self {
            checksum,
            message_type,
            payload_length,
            stream_id,
        })
    }

    pub fn checksum(&self) -> u32 {
        self.checksum
    }

    pub fn set_checksum(&mut self, checksum: u32) {
        self.checksum = checksum;
    }

    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    pub fn payload_length(&self) -> u32 {
        self.payload_length
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }
}

/// Stream identifiers must be non-empty, NUL-free and fit the header field.
pub fn validate_stream_id(stream_id: &str) -> Result<(), PxsError> {
    if stream_id.is_empty() {
        return Err(PxsError::InvalidStreamId("empty".into()));
    }
    if stream_id.len() > STREAM_ID_LENGTH {
        return Err(PxsError::InvalidStreamId(format!(
            "{} bytes exceeds {STREAM_ID_LENGTH}",
            stream_id.len()
        )));
    }
    if stream_id.as_bytes().contains(&0) {
        return Err(PxsError::InvalidStreamId("contains NUL".into()));
    }
    Ok(())
}

/// Truncated blake3 digest used as the payload checksum.
///
/// Zero is reserved for empty payloads.
pub fn payload_checksum(payload: &[u8]) -> u32 {
    if payload.is_empty() {
        return 0;
    }
    let hash = blake3::hash(payload);
    read_u32(&hash.as_bytes()[0..4]).max(1)
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[..4]);
    u32::from_le_bytes(buf)
}

impl std::fmt::Debug for MessageHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageHeader")
            .field("message_type", &self.message_type)
            .field("payload_length", &self.payload_length)
            .field("stream_id", &self.stream_id)
            .field("checksum", &self.checksum)
            .finish()
    }
}
