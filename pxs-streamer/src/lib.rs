//! # pxs-streamer: test-pattern producer
//!
//! Renders a moving RGBA pattern and streams it to a `pxs-server`,
//! optionally split across several producer connections that each own a
//! vertical band of the frame.

pub mod config;
pub mod pattern;
pub mod producer;
