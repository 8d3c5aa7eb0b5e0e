//! Events the receive side reports to its owner.
//!
//! The dispatcher and the server push these onto an unbounded mpsc
//! channel owned by the caller; nothing is broadcast implicitly.

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::protocol::SizeHints;
use crate::receive::Frame;

pub type StreamEventSender = mpsc::UnboundedSender<StreamEvent>;
pub type StreamEventReceiver = mpsc::UnboundedReceiver<StreamEvent>;

#[derive(Debug)]
pub enum StreamEvent {
    /// The stream gained its first source or observer.
    Opened(String),
    /// The stream lost its last source and last observer.
    Closed(String),
    /// A complete frame, delivered after the consumer asked for it.
    FrameReady(Frame),
    /// Producers outran the consumer; the stream must be closed.
    BufferExceeded(String),
    SizeHintsReceived { stream_id: String, hints: SizeHints },
    DataReceived { stream_id: String, data: Bytes },
    EventsBound { stream_id: String, exclusive: bool },
}

impl StreamEvent {
    /// The stream this event concerns.
    pub fn stream_id(&self) -> &str {
        match self {
            StreamEvent::Opened(id)
            | StreamEvent::Closed(id)
            | StreamEvent::BufferExceeded(id) => id,
            StreamEvent::FrameReady(frame) => &frame.stream_id,
            StreamEvent::SizeHintsReceived { stream_id, .. }
            | StreamEvent::DataReceived { stream_id, .. }
            | StreamEvent::EventsBound { stream_id, .. } => stream_id,
        }
    }
}

/// Create the channel pair handed to a dispatcher or server.
pub fn channel() -> (StreamEventSender, StreamEventReceiver) {
    mpsc::unbounded_channel()
}
