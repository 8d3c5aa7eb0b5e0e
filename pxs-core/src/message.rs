//! Protocol message types.
//!
//! Uses a proper enum with `TryFrom`; unknown values are errors, not panics.

use crate::error::PxsError;
use std::fmt;

/// Version advertised in `PixelStreamOpen` / `ObserverOpen` payloads.
pub const PROTOCOL_VERSION: u32 = 9;

// ── MessageType ──────────────────────────────────────────────────

/// Every message kind carried on a pixel-stream connection.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// A producer announces itself as a source of the stream.
    PixelStreamOpen = 3,
    /// The sending source finished the current round.
    PixelStreamFinishFrame = 4,
    /// One segment: parameters followed by tile bytes.
    PixelStream = 5,
    /// Ask to receive interaction events for the stream.
    BindEvents = 6,
    /// Same as `BindEvents`, but exclusive.
    BindEventsEx = 7,
    /// Server answer to a bind request.
    BindEventsReply = 8,
    /// Interaction event sent from server to producer.
    Event = 9,
    /// Close the stream for this connection.
    Quit = 12,
    /// Preferred / min / max dimensions of the stream.
    SizeHints = 13,
    /// Opaque application payload.
    Data = 14,
    /// The view (mono / stereo eye) following segments belong to.
    ImageView = 15,
    /// A consumer registers interest without producing.
    ObserverOpen = 16,
}

impl TryFrom<u32> for MessageType {
    type Error = PxsError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            3 => Ok(MessageType::PixelStreamOpen),
            4 => Ok(MessageType::PixelStreamFinishFrame),
            5 => Ok(MessageType::PixelStream),
            6 => Ok(MessageType::BindEvents),
            7 => Ok(MessageType::BindEventsEx),
            8 => Ok(MessageType::BindEventsReply),
            9 => Ok(MessageType::Event),
            12 => Ok(MessageType::Quit),
            13 => Ok(MessageType::SizeHints),
            14 => Ok(MessageType::Data),
            15 => Ok(MessageType::ImageView),
            16 => Ok(MessageType::ObserverOpen),
            _ => Err(PxsError::UnknownVariant {
                type_name: "MessageType",
                value: value as u64,
            }),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl MessageType {
    /// Whether the transport should wait for the bytes to hit the socket
    /// before reporting success. Segments are fire-and-forget; the next
    /// control message flushes them.
    pub fn waits_for_bytes_written(&self) -> bool {
        !matches!(self, MessageType::PixelStream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_type_roundtrip() {
        let types = [
            MessageType::PixelStreamOpen,
            MessageType::PixelStreamFinishFrame,
            MessageType::PixelStream,
            MessageType::BindEvents,
            MessageType::BindEventsEx,
            MessageType::BindEventsReply,
            MessageType::Event,
            MessageType::Quit,
            MessageType::SizeHints,
            MessageType::Data,
            MessageType::ImageView,
            MessageType::ObserverOpen,
        ];
        for ty in types {
            assert_eq!(MessageType::try_from(ty as u32).unwrap(), ty);
        }
    }

    #[test]
    fn message_type_invalid() {
        assert!(MessageType::try_from(0).is_err());
        assert!(MessageType::try_from(0xDEAD).is_err());
    }

    #[test]
    fn segments_do_not_wait_for_bytes() {
        assert!(!MessageType::PixelStream.waits_for_bytes_written());
        assert!(MessageType::PixelStreamFinishFrame.waits_for_bytes_written());
    }
}
