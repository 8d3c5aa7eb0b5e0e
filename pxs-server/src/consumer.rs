//! The server's own frame consumer.
//!
//! It pulls one frame at a time per stream: a request goes out when the
//! stream opens and again after every delivered frame, so producers that
//! outrun it simply have their older rounds dropped.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use pxs_core::{Frame, PxsError, SegmentDecoder, ServerHandle, StreamEvent, StreamEventReceiver};

use crate::config::ConsumerConfig;

#[derive(Debug, Default, Clone)]
pub struct StreamStats {
    pub frames: u64,
    pub bytes: u64,
    pub last_dimensions: (u32, u32),
}

pub struct FrameConsumer {
    server: ServerHandle,
    decoder: Option<SegmentDecoder>,
    min_interval: Option<Duration>,
    last_request: HashMap<String, Instant>,
    stats: HashMap<String, StreamStats>,
}

impl FrameConsumer {
    pub fn new(server: ServerHandle, config: &ConsumerConfig) -> Self {
        Self {
            server,
            decoder: config.decode_segments.then(SegmentDecoder::new),
            min_interval: (config.max_fps > 0)
                .then(|| Duration::from_secs(1) / config.max_fps),
            last_request: HashMap::new(),
            stats: HashMap::new(),
        }
    }

    /// Handle events until the server shuts down.
    pub async fn run(mut self, mut events: StreamEventReceiver) -> HashMap<String, StreamStats> {
        while let Some(event) = events.recv().await {
            if let Err(e) = self.handle(event).await {
                warn!("consumer: {e}");
            }
        }
        self.stats
    }

    pub fn stats(&self, stream_id: &str) -> Option<&StreamStats> {
        self.stats.get(stream_id)
    }

    pub async fn handle(&mut self, event: StreamEvent) -> Result<(), PxsError> {
        match event {
            StreamEvent::Opened(stream_id) => {
                info!(stream = %stream_id, "stream opened");
                self.stats.insert(stream_id.clone(), StreamStats::default());
                self.request(&stream_id).await?;
            }
            StreamEvent::Closed(stream_id) => {
                self.last_request.remove(&stream_id);
                match self.stats.remove(&stream_id) {
                    Some(stats) => info!(stream = %stream_id, frames = stats.frames, bytes = stats.bytes, "stream closed"),
                    None => info!(stream = %stream_id, "stream closed"),
                }
            }
            StreamEvent::FrameReady(frame) => {
                let stream_id = frame.stream_id.clone();
                self.consume(frame)?;
                self.request(&stream_id).await?;
            }
            StreamEvent::BufferExceeded(stream_id) => {
                warn!(stream = %stream_id, "producers outran the consumer; stream dropped");
            }
            StreamEvent::SizeHintsReceived { stream_id, hints } => {
                info!(
                    stream = %stream_id,
                    "size hints: preferred {}x{}",
                    hints.preferred_width, hints.preferred_height
                );
            }
            StreamEvent::DataReceived { stream_id, data } => {
                info!(stream = %stream_id, bytes = data.len(), "application data");
            }
            StreamEvent::EventsBound {
                stream_id,
                exclusive,
            } => {
                info!(stream = %stream_id, exclusive, "producer bound for events");
            }
        }
        Ok(())
    }

    fn consume(&mut self, mut frame: Frame) -> Result<(), PxsError> {
        if let Some(decoder) = &self.decoder {
            decoder.decode_frame(&mut frame)?;
        }

        let dimensions = frame.compute_dimensions();
        let stats = self.stats.entry(frame.stream_id.clone()).or_default();
        stats.frames += 1;
        stats.bytes += frame.byte_len() as u64;
        stats.last_dimensions = dimensions;

        debug!(
            stream = %frame.stream_id,
            segments = frame.segments.len(),
            bytes = frame.byte_len(),
            "frame {} {}x{}",
            stats.frames, dimensions.0, dimensions.1
        );
        Ok(())
    }

    async fn request(&mut self, stream_id: &str) -> Result<(), PxsError> {
        if let (Some(interval), Some(last)) = (self.min_interval, self.last_request.get(stream_id)) {
            let elapsed = last.elapsed();
            if elapsed < interval {
                tokio::time::sleep(interval - elapsed).await;
            }
        }
        self.last_request.insert(stream_id.to_string(), Instant::now());
        self.server.request_frame(stream_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pxs_core::{CompressionPolicy, DispatcherConfig, ImageWrapper, PixelFormat, Stream, StreamServer};

    #[tokio::test]
    async fn pulls_frames_after_open() {
        let (server, mut events) = StreamServer::bind("127.0.0.1:0", DispatcherConfig::default())
            .await
            .unwrap()
            .spawn()
            .unwrap();
        let config = ConsumerConfig {
            decode_segments: true,
            max_fps: 0,
        };
        let mut consumer = FrameConsumer::new(server.clone(), &config);

        let stream = Stream::connect(server.local_addr(), "wall").await.unwrap();
        let opened = events.recv().await.unwrap();
        consumer.handle(opened).await.unwrap();

        let image = ImageWrapper::new(vec![9u8; 100 * 40 * 4], 100, 40, PixelFormat::Rgba);
        stream.send_and_finish(image).await.unwrap();
        let frame = events.recv().await.unwrap();
        assert!(matches!(frame, StreamEvent::FrameReady(_)));
        consumer.handle(frame).await.unwrap();

        let stats = consumer.stats("wall").unwrap();
        assert_eq!(stats.frames, 1);
        assert_eq!(stats.last_dimensions, (100, 40));
        // decoded to RGBA
        assert_eq!(stats.bytes, 100 * 40 * 4);

        // the consumer asked for the next frame already
        let raw = ImageWrapper::new(vec![0u8; 100 * 40 * 4], 100, 40, PixelFormat::Rgba)
            .with_compression(CompressionPolicy::Off);
        stream.send_and_finish(raw).await.unwrap();
        assert!(matches!(
            events.recv().await.unwrap(),
            StreamEvent::FrameReady(_)
        ));
        server.shutdown();
    }
}
