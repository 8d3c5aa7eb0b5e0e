//! Receive path: reassembly of producer segments into frames delivered
//! at the consumer's pace.
//!
//! ```text
//! transport ──► FrameDispatcher ──► ReceiveBuffer (per stream)
//!                     │                    │
//!                     │◄── complete round ─┘
//!                     ▼
//!       StreamEvent::FrameReady ──► consumer ──► request_frame()
//! ```
//!
//! | Module       | Purpose                                            |
//! |------------- |----------------------------------------------------|
//! | `buffer`     | Per-source segment queues and round completion     |
//! | `dispatcher` | Stream lifecycle, routing and pull-based delivery  |
//! | `frame`      | The frame handed to consumers                      |
//! | `decoder`    | In-place JPEG → RGBA decompression                 |

pub mod buffer;
pub mod decoder;
pub mod dispatcher;
pub mod frame;

pub use buffer::{ReceiveBuffer, SegmentBuffer, SourceIndex};
pub use decoder::SegmentDecoder;
pub use dispatcher::{DispatcherConfig, FrameDispatcher};
pub use frame::Frame;
