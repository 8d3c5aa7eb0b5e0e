//! Payload definitions carried inside [`Message`] bodies.
//!
//! Every payload is a fixed little-endian layout, except tile bytes and
//! application `Data`, which are opaque.
//!
//! [`Message`]: crate::packet::Message

pub mod hints;
pub mod image;
pub mod segment;

pub use hints::{SizeHints, UNSPECIFIED_SIZE};
pub use image::{CompressionPolicy, ImageWrapper, PixelFormat};
pub use segment::{DataType, Segment, SegmentParameters, View};
