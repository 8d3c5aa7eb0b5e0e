//! One producer connection streaming its band of the test pattern.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use pxs_core::{ImageWrapper, PixelFormat, PxsError, SizeHints, Stream};

use crate::config::StreamerConfig;
use crate::pattern::{self, Band};

/// Stream frames until `running` clears or the frame budget is spent.
///
/// Returns the number of frames the server accepted.
pub async fn run_producer(
    config: &StreamerConfig,
    band: Band,
    running: Arc<AtomicBool>,
) -> Result<u64, PxsError> {
    let stream_cfg = &config.stream;
    let stream = Stream::connect_with_config(
        config.network.server_address.as_str(),
        &stream_cfg.stream_id,
        config.worker.clone(),
        false,
    )
    .await?;

    if band.x == 0 {
        stream
            .send_size_hints(&SizeHints::preferred(stream_cfg.width, stream_cfg.height))
            .await?;
    }

    let period = Duration::from_secs(1) / stream_cfg.fps.max(1);
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut sent = 0u64;
    let mut frame = 0u64;
    while running.load(Ordering::SeqCst) && (stream_cfg.frames == 0 || frame < stream_cfg.frames) {
        ticker.tick().await;

        let pixels = pattern::render(band, stream_cfg.width, stream_cfg.height, frame);
        let image = ImageWrapper::new(pixels, band.width, stream_cfg.height, PixelFormat::Rgba)
            .with_position(band.x, 0)
            .with_compression(stream_cfg.compression)
            .with_quality(stream_cfg.quality);
        frame += 1;

        match stream.send_and_finish(image).await {
            Ok(()) => {
                sent += 1;
                debug!(stream = %stream.id(), band = band.x, frame, "frame sent");
            }
            Err(e @ (PxsError::PendingFinish | PxsError::AlreadyPendingFinish)) => {
                debug!(stream = %stream.id(), "frame skipped: {e}");
            }
            Err(e) if e.is_invalid_request() => return Err(e),
            Err(e) => {
                warn!(stream = %stream.id(), "send failed: {e}");
                break;
            }
        }
    }

    info!(stream = %stream.id(), band = band.x, sent, "producer done");
    if let Err(e) = stream.close().await {
        debug!("close: {e}");
    }
    Ok(sent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pxs_core::{DispatcherConfig, StreamEvent, StreamServer};

    #[tokio::test]
    async fn streams_the_configured_number_of_frames() {
        let (server, mut events) = StreamServer::bind("127.0.0.1:0", DispatcherConfig::default())
            .await
            .unwrap()
            .spawn()
            .unwrap();

        let mut config = StreamerConfig::default();
        config.network.server_address = server.local_addr().to_string();
        config.stream.width = 200;
        config.stream.height = 100;
        config.stream.fps = 200;
        config.stream.frames = 3;

        let band = Band::split(200, 1)[0];
        let sent = run_producer(&config, band, Arc::new(AtomicBool::new(true)))
            .await
            .unwrap();
        assert_eq!(sent, 3);

        assert!(matches!(events.recv().await, Some(StreamEvent::Opened(_))));
        assert!(matches!(
            events.recv().await,
            Some(StreamEvent::SizeHintsReceived { .. })
        ));
        server.shutdown();
    }
}
