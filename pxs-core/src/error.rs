//! Domain-specific error types for the pixel-stream protocol.
//!
//! All fallible operations return `Result<T, PxsError>`.
//! No panics on wire input; every error is typed and recoverable.

use thiserror::Error;

/// The canonical error type for the pixel-stream protocol.
#[derive(Debug, Error)]
pub enum PxsError {
    // ── Protocol Errors ──────────────────────────────────────────
    /// Received bytes that do not start with the `PXS0` magic sequence.
    #[error("invalid magic bytes: expected PXS0")]
    InvalidMagic,

    /// A field in the message header could not be parsed.
    #[error("invalid header: {0}")]
    InvalidHeader(&'static str),

    /// The payload failed checksum verification.
    #[error("checksum mismatch")]
    ChecksumMismatch,

    /// A numeric value did not map to any known enum variant.
    #[error("unknown {type_name} discriminant: {value:#x}")]
    UnknownVariant { type_name: &'static str, value: u64 },

    /// A message violated protocol rules.
    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),

    /// The stream identifier does not fit in the header.
    #[error("invalid stream id: {0}")]
    InvalidStreamId(String),

    // ── Packet Errors ────────────────────────────────────────────
    /// The payload exceeds the configured maximum size.
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// A fixed-size struct was shorter or longer than expected.
    #[error("invalid packet length: expected {expected}, got {actual}")]
    InvalidPacketLength { expected: usize, actual: usize },

    // ── Connection Errors ────────────────────────────────────────
    /// The TCP/IO layer reported an error.
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// An mpsc channel was closed unexpectedly.
    #[error("channel closed")]
    ChannelClosed,

    // ── Image Errors ─────────────────────────────────────────────
    /// The image cannot be sent as described.
    #[error("invalid image: {0}")]
    InvalidImage(String),

    /// Compression quality outside 1..=100.
    #[error("JPEG compression quality must be between 1 and 100, got {0}")]
    InvalidQuality(u8),

    /// The tile compressor failed.
    #[error("compression failed: {0}")]
    Compression(String),

    /// The segment decoder failed.
    #[error("decompression failed: {0}")]
    Decompression(String),

    /// A segment carries a data type this build cannot handle.
    #[error("unsupported segment data type: {0}")]
    UnsupportedDataType(String),

    // ── Receive Errors ───────────────────────────────────────────
    /// Producers finished more rounds than the consumer drained.
    #[error("maximum buffered frames exceeded ({max})")]
    BufferExceeded { max: usize },

    // ── Send Worker Errors ───────────────────────────────────────
    /// An image was enqueued while a finish-frame request is outstanding.
    #[error("pending finish, no send allowed")]
    PendingFinish,

    /// A finish-frame request was enqueued while another is outstanding.
    #[error("already have pending finish")]
    AlreadyPendingFinish,

    /// The send worker was stopped before the request executed.
    #[error("send worker stopped")]
    WorkerStopped,

    /// The transport refused a message.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for PxsError {
    fn from(s: String) -> Self {
        PxsError::Other(s)
    }
}

impl From<&str> for PxsError {
    fn from(s: &str) -> Self {
        PxsError::Other(s.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for PxsError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        PxsError::ChannelClosed
    }
}

impl From<image::ImageError> for PxsError {
    fn from(e: image::ImageError) -> Self {
        PxsError::Compression(e.to_string())
    }
}

impl PxsError {
    /// Errors raised before a request ever reaches the send queue.
    pub fn is_invalid_request(&self) -> bool {
        matches!(
            self,
            PxsError::InvalidImage(_)
                | PxsError::InvalidQuality(_)
                | PxsError::PendingFinish
                | PxsError::AlreadyPendingFinish
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = PxsError::InvalidMagic;
        assert!(e.to_string().contains("magic"));

        let e = PxsError::PayloadTooLarge {
            size: 1000,
            max: 500,
        };
        assert!(e.to_string().contains("1000"));
        assert!(e.to_string().contains("500"));

        let e = PxsError::InvalidQuality(0);
        assert!(e.to_string().contains("between 1 and 100"));
    }

    #[test]
    fn from_string() {
        let e: PxsError = "something broke".into();
        assert!(matches!(e, PxsError::Other(_)));
    }

    #[test]
    fn from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broke");
        let e: PxsError = io_err.into();
        assert!(matches!(e, PxsError::Connection(_)));
    }

    #[test]
    fn invalid_request_classification() {
        assert!(PxsError::PendingFinish.is_invalid_request());
        assert!(PxsError::InvalidQuality(101).is_invalid_request());
        assert!(!PxsError::WorkerStopped.is_invalid_request());
        assert!(!PxsError::ChannelClosed.is_invalid_request());
    }
}
