//! # pxs-server: headless pixel-stream receiver
//!
//! Accepts producer and observer connections, reassembles their segments
//! into frames and pulls one frame per stream at a time, logging what
//! arrives. JPEG segments can optionally be decoded on arrival.

pub mod config;
pub mod consumer;
