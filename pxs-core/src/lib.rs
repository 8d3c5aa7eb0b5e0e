//! # pxs-core
//!
//! Pixel-streaming protocol engine.
//!
//! This crate contains:
//! - **Protocol types**: `MessageHeader`, `Message`, `MessageType`, segments, size hints, images
//! - **Codec**: `PxsCodec` for framed TCP I/O via `tokio_util`
//! - **Receive**: `FrameDispatcher` and `ReceiveBuffer`, reassembling segments from
//!   any number of sources into frames handed out one at a time on request
//! - **Send**: `ImageSegmenter` and `StreamSendWorker`, cutting images into tiles
//!   and sending them in order, with frame-finish markers held back until
//!   everything queued before them is out
//! - **Network**: `StreamServer` and the client-side `Stream`
//! - **Error**: `PxsError`, a typed `thiserror`-based error hierarchy

pub mod codec;
pub mod error;
pub mod event;
pub mod header;
pub mod message;
pub mod network;
pub mod packet;
pub mod protocol;
pub mod receive;
pub mod send;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use codec::PxsCodec;
pub use error::PxsError;
pub use event::{StreamEvent, StreamEventReceiver, StreamEventSender};
pub use header::{HEADER_LENGTH, MessageHeader, STREAM_ID_LENGTH};
pub use message::{MessageType, PROTOCOL_VERSION};
pub use network::{ServerHandle, Stream, StreamServer};
pub use packet::{MAX_FRAME_SIZE, MAX_PAYLOAD_SIZE, Message};
pub use protocol::{
    CompressionPolicy, DataType, ImageWrapper, PixelFormat, Segment, SegmentParameters,
    SizeHints, View,
};
pub use receive::{DispatcherConfig, Frame, FrameDispatcher, ReceiveBuffer, SegmentDecoder};
pub use send::{
    ImageSegmenter, JpegCompressor, SendFuture, SendWorkerConfig, StreamSendWorker,
    TileCompressor, Transport,
};
