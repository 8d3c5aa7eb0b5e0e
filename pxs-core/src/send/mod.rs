//! Send path: images are cut into segments, optionally compressed, and
//! written to the connection by one worker per stream.
//!
//! | Module       | Purpose                                           |
//! |--------------|---------------------------------------------------|
//! | `compressor` | Tile compression (`TileCompressor`, JPEG)         |
//! | `segmenter`  | Tiling of images into segments                    |
//! | `worker`     | Ordered request execution with finish deferral    |
//! | `future`     | Completion handles for queued requests            |
//! | `transport`  | Connection abstraction used by the worker         |

pub mod compressor;
pub mod future;
pub mod segmenter;
pub mod transport;
pub mod worker;

pub use compressor::{JpegCompressor, TileCompressor};
pub use future::{SendFuture, SendResult};
pub use segmenter::{DEFAULT_SEGMENT_SIZE, DEFAULT_SMALL_IMAGE_SIZE, ImageSegmenter, Tile};
pub use transport::{FramedTransport, Transport};
pub use worker::{SendWorkerConfig, StreamSendWorker};
