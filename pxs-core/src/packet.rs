use bytes::Bytes;

use crate::error::PxsError;
use crate::header::{self, MessageHeader};
use crate::message::{MessageType, PROTOCOL_VERSION};
use crate::protocol::{Segment, SizeHints, View};

/// Largest payload accepted in either direction.
pub const MAX_PAYLOAD_SIZE: usize = 32 * 1024 * 1024;

/// Largest complete message (header + payload).
pub const MAX_FRAME_SIZE: usize = header::HEADER_LENGTH + MAX_PAYLOAD_SIZE;

/// One header + payload unit on a pixel-stream connection.
#[derive(Clone, PartialEq, Eq)]
pub struct Message {
    header: MessageHeader,
    payload: Bytes,
}

impl Message {
    pub fn new(
        message_type: MessageType,
        stream_id: &str,
        payload: impl Into<Bytes>,
    ) -> Result<Self, PxsError> {
        let payload = payload.into();
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(PxsError::PayloadTooLarge {
                size: payload.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }

        let mut header = MessageHeader::new(message_type, payload.len() as u32, stream_id)?;
        header.set_checksum(header::payload_checksum(&payload));
        Ok(Self { header, payload })
    }

    pub fn open(stream_id: &str) -> Result<Self, PxsError> {
        Self::new(
            MessageType::PixelStreamOpen,
            stream_id,
            PROTOCOL_VERSION.to_string(),
        )
    }

    pub fn observer_open(stream_id: &str) -> Result<Self, PxsError> {
        Self::new(
            MessageType::ObserverOpen,
            stream_id,
            PROTOCOL_VERSION.to_string(),
        )
    }

    pub fn quit(stream_id: &str) -> Result<Self, PxsError> {
        Self::new(MessageType::Quit, stream_id, Bytes::new())
    }

    pub fn finish_frame(stream_id: &str) -> Result<Self, PxsError> {
        Self::new(MessageType::PixelStreamFinishFrame, stream_id, Bytes::new())
    }

    pub fn pixel_stream(stream_id: &str, segment: &Segment) -> Result<Self, PxsError> {
        Self::new(MessageType::PixelStream, stream_id, segment.to_payload())
    }

    pub fn image_view(stream_id: &str, view: View) -> Result<Self, PxsError> {
        Self::new(
            MessageType::ImageView,
            stream_id,
            Bytes::copy_from_slice(&view.to_bytes()),
        )
    }

    pub fn size_hints(stream_id: &str, hints: &SizeHints) -> Result<Self, PxsError> {
        Self::new(
            MessageType::SizeHints,
            stream_id,
            Bytes::copy_from_slice(&hints.encode()),
        )
    }

    /// Exclusivity is conveyed by the message type alone.
    pub fn bind_events(stream_id: &str, exclusive: bool) -> Result<Self, PxsError> {
        let message_type = if exclusive {
            MessageType::BindEventsEx
        } else {
            MessageType::BindEvents
        };
        Self::new(message_type, stream_id, Bytes::new())
    }

    pub fn bind_events_reply(stream_id: &str, accepted: bool) -> Result<Self, PxsError> {
        Self::new(
            MessageType::BindEventsReply,
            stream_id,
            Bytes::copy_from_slice(&[accepted as u8]),
        )
    }

    pub fn data(stream_id: &str, data: Bytes) -> Result<Self, PxsError> {
        Self::new(MessageType::Data, stream_id, data)
    }

    pub fn header(&self) -> &MessageHeader {
        &self.header
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    pub fn message_type(&self) -> MessageType {
        self.header.message_type()
    }

    pub fn stream_id(&self) -> &str {
        self.header.stream_id()
    }

    /// Serialize header and payload into one contiguous buffer.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(header::HEADER_LENGTH + self.payload.len());
        out.extend_from_slice(&self.header.to_bytes());
        out.extend_from_slice(&self.payload);
        out
    }

    /// Reassemble from a decoded header and the payload bytes that followed it.
    pub fn from_parts(header: MessageHeader, payload: Bytes) -> Result<Self, PxsError> {
        if payload.len() != header.payload_length() as usize {
            return Err(PxsError::InvalidPacketLength {
                expected: header.payload_length() as usize,
                actual: payload.len(),
            });
        }
        let message = Self { header, payload };
        message.validate()?;
        Ok(message)
    }

    /// Verify the payload checksum.
    pub fn validate(&self) -> Result<(), PxsError> {
        if self.payload.is_empty() {
            return Ok(());
        }
        if self.header.checksum() == 0 {
            return Err(PxsError::ProtocolViolation("checksum must be non-zero"));
        }
        if header::payload_checksum(&self.payload) != self.header.checksum() {
            return Err(PxsError::ChecksumMismatch);
        }
        Ok(())
    }

    /// Parse the `PixelStreamOpen` / `ObserverOpen` version payload.
    pub fn protocol_version(&self) -> Option<u32> {
        std::str::from_utf8(&self.payload).ok()?.trim().parse().ok()
    }
}

impl std::fmt::Debug for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Message")
            .field("header", &self.header)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}
