//! TCP server and client built on [`PxsCodec`](crate::codec::PxsCodec).

pub mod client;
pub mod server;

pub use client::Stream;
pub use server::{ServerHandle, StreamServer};
