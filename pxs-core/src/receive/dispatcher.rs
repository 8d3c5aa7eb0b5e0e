//! Routing of producer traffic into per-stream receive buffers.
//!
//! The dispatcher takes `&mut self` everywhere and is owned by exactly
//! one task (see
//! [`StreamServer`](crate::network::StreamServer)), which serializes every
//! producer and consumer request.
//!
//! # Open / close rule
//!
//! A stream is *open* while it has at least one source **or** at least one
//! observer. `Opened` fires on every transition from neither to either,
//! `Closed` on every transition back, at which point all state of the
//! stream is dropped. Sources and observers are treated identically.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::event::{StreamEvent, StreamEventSender};
use crate::protocol::Segment;
use crate::receive::buffer::{DEFAULT_MAX_BUFFERED_FRAMES, ReceiveBuffer, SourceIndex};
use crate::receive::frame::Frame;

// ── DispatcherConfig ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Completed rounds a stream may hold before it is declared overflowed.
    pub max_buffered_frames: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_buffered_frames: DEFAULT_MAX_BUFFERED_FRAMES,
        }
    }
}

// ── StreamState ──────────────────────────────────────────────────

#[derive(Debug)]
struct StreamState {
    buffer: ReceiveBuffer,
    observers: usize,
    /// Set once the buffer overflowed; cleared when the last source leaves.
    failed: bool,
}

impl StreamState {
    fn new(config: &DispatcherConfig) -> Self {
        Self {
            buffer: ReceiveBuffer::new(config.max_buffered_frames),
            observers: 0,
            failed: false,
        }
    }

    fn is_open(&self) -> bool {
        self.buffer.source_count() > 0 || self.observers > 0
    }
}

// ── FrameDispatcher ──────────────────────────────────────────────

pub struct FrameDispatcher {
    streams: HashMap<String, StreamState>,
    config: DispatcherConfig,
    events: StreamEventSender,
}

impl FrameDispatcher {
    pub fn new(events: StreamEventSender) -> Self {
        Self::with_config(events, DispatcherConfig::default())
    }

    pub fn with_config(events: StreamEventSender, config: DispatcherConfig) -> Self {
        Self {
            streams: HashMap::new(),
            config,
            events,
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    // ── Producers ────────────────────────────────────────────────

    /// Register a producer. Registering the same index twice is a no-op.
    pub fn add_source(&mut self, stream_id: &str, source: SourceIndex) {
        let state = self.state_entry(stream_id);
        let was_open = state.is_open();
        if !state.buffer.add_source(source) {
            debug!(stream = %stream_id, source, "source already registered");
            return;
        }
        debug!(stream = %stream_id, source, sources = state.buffer.source_count(), "source added");

        if !was_open {
            self.emit_opened(stream_id);
        }
    }

    /// Unregister a producer, closing the stream if nothing else uses it.
    pub fn remove_source(&mut self, stream_id: &str, source: SourceIndex) {
        let Some(state) = self.streams.get_mut(stream_id) else {
            return;
        };
        let overflow = match state.buffer.remove_source(source) {
            Ok(false) => return,
            Ok(true) => None,
            Err(e) => Some(e),
        };
        debug!(stream = %stream_id, source, sources = state.buffer.source_count(), "source removed");

        if state.buffer.source_count() == 0 {
            state.failed = false;
        } else if let Some(e) = overflow {
            // the remaining sources may have completed rounds on their own
            if !state.failed {
                warn!(stream = %stream_id, source, "closing stream: {e}");
                state.failed = true;
                self.emit(StreamEvent::BufferExceeded(stream_id.to_string()));
            }
            return;
        } else if !state.failed
            && state.buffer.is_allowed_to_send()
            && state.buffer.has_complete_frame()
        {
            self.send_latest_frame(stream_id);
            return;
        }
        self.close_if_unused(stream_id);
    }

    /// Route a segment to its stream. Unknown streams are ignored.
    pub fn process_segment(&mut self, stream_id: &str, source: SourceIndex, segment: Segment) {
        if let Some(state) = self.streams.get_mut(stream_id) {
            if !state.failed {
                state.buffer.insert(segment, source);
            }
        }
    }

    /// Mark `source`'s round as finished, delivering a frame if the round
    /// completed and the consumer asked for one.
    pub fn process_frame_finished(&mut self, stream_id: &str, source: SourceIndex) {
        let Some(state) = self.streams.get_mut(stream_id) else {
            return;
        };
        if state.failed {
            return;
        }

        if let Err(e) = state.buffer.finish_frame_for_source(source) {
            warn!(stream = %stream_id, source, "closing stream: {e}");
            state.failed = true;
            self.emit(StreamEvent::BufferExceeded(stream_id.to_string()));
            return;
        }

        if state.buffer.is_allowed_to_send() && state.buffer.has_complete_frame() {
            self.send_latest_frame(stream_id);
        }
    }

    // ── Consumers ────────────────────────────────────────────────

    /// Register interest in a stream without producing to it.
    pub fn add_observer(&mut self, stream_id: &str) {
        let state = self.state_entry(stream_id);
        let was_open = state.is_open();
        state.observers += 1;
        debug!(stream = %stream_id, observers = state.observers, "observer added");

        if !was_open {
            self.emit_opened(stream_id);
        }
    }

    pub fn remove_observer(&mut self, stream_id: &str) {
        let Some(state) = self.streams.get_mut(stream_id) else {
            return;
        };
        if state.observers == 0 {
            return;
        }
        state.observers -= 1;
        debug!(stream = %stream_id, observers = state.observers, "observer removed");
        self.close_if_unused(stream_id);
    }

    /// Open the send gate for one frame.
    ///
    /// If a round is already complete the frame is delivered right away;
    /// otherwise it goes out as soon as the next round completes. The gate
    /// closes again after every delivery.
    pub fn request_frame(&mut self, stream_id: &str) {
        let Some(state) = self.streams.get_mut(stream_id) else {
            return;
        };
        if state.failed {
            return;
        }

        state.buffer.set_allowed_to_send(true);
        if state.buffer.has_complete_frame() {
            self.send_latest_frame(stream_id);
        }
    }

    // ── Introspection ────────────────────────────────────────────

    pub fn is_open(&self, stream_id: &str) -> bool {
        self.streams.contains_key(stream_id)
    }

    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    pub fn source_count(&self, stream_id: &str) -> usize {
        self.streams
            .get(stream_id)
            .map_or(0, |s| s.buffer.source_count())
    }

    pub fn observer_count(&self, stream_id: &str) -> usize {
        self.streams.get(stream_id).map_or(0, |s| s.observers)
    }

    // ── Internal ─────────────────────────────────────────────────

    fn state_entry(&mut self, stream_id: &str) -> &mut StreamState {
        let config = &self.config;
        self.streams
            .entry(stream_id.to_string())
            .or_insert_with(|| StreamState::new(config))
    }

    /// Coalesce every completed round into one frame holding the newest.
    fn consume_latest_frame(&mut self, stream_id: &str) -> Option<Frame> {
        let state = self.streams.get_mut(stream_id)?;
        let skipped = state.buffer.complete_frame_count().saturating_sub(1);
        let segments = state.buffer.take_latest_frame()?;
        state.buffer.set_allowed_to_send(false);

        if skipped > 0 {
            debug!(stream = %stream_id, skipped, "dropped stale rounds");
        }
        Some(Frame::new(stream_id, segments))
    }

    fn send_latest_frame(&mut self, stream_id: &str) {
        if let Some(frame) = self.consume_latest_frame(stream_id) {
            self.emit(StreamEvent::FrameReady(frame));
        }
    }

    fn close_if_unused(&mut self, stream_id: &str) {
        let unused = self
            .streams
            .get(stream_id)
            .is_some_and(|state| !state.is_open());
        if unused {
            self.streams.remove(stream_id);
            info!(stream = %stream_id, "stream closed");
            self.emit(StreamEvent::Closed(stream_id.to_string()));
        }
    }

    fn emit_opened(&self, stream_id: &str) {
        info!(stream = %stream_id, "stream opened");
        self.emit(StreamEvent::Opened(stream_id.to_string()));
    }

    fn emit(&self, event: StreamEvent) {
        if self.events.send(event).is_err() {
            debug!("stream event receiver dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{self, StreamEventReceiver};
    use crate::protocol::{DataType, SegmentParameters};
    use bytes::Bytes;

    fn dispatcher() -> (FrameDispatcher, StreamEventReceiver) {
        let (tx, rx) = event::channel();
        (FrameDispatcher::new(tx), rx)
    }

    fn drain(rx: &mut StreamEventReceiver) -> Vec<StreamEvent> {
        let mut out = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            out.push(ev);
        }
        out
    }

    fn seg(x: u32) -> Segment {
        Segment::new(
            SegmentParameters::new(x, 0, 1, 1, DataType::Rgba),
            Bytes::from_static(&[9, 9, 9, 9]),
        )
    }

    fn opened(events: &[StreamEvent]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, StreamEvent::Opened(_)))
            .count()
    }

    fn closed(events: &[StreamEvent]) -> usize {
        events
            .iter()
            .filter(|e| matches!(e, StreamEvent::Closed(_)))
            .count()
    }

    fn frames(events: Vec<StreamEvent>) -> Vec<Frame> {
        events
            .into_iter()
            .filter_map(|e| match e {
                StreamEvent::FrameReady(f) => Some(f),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn open_close_once_per_transition() {
        let (mut d, mut rx) = dispatcher();
        d.add_source("s", 0);
        d.add_source("s", 1);
        d.add_source("s", 1);
        d.remove_source("s", 0);
        d.remove_source("s", 0);
        let ev = drain(&mut rx);
        assert_eq!(opened(&ev), 1);
        assert_eq!(closed(&ev), 0);

        d.remove_source("s", 1);
        let ev = drain(&mut rx);
        assert_eq!(closed(&ev), 1);
        assert!(!d.is_open("s"));

        d.add_source("s", 7);
        let ev = drain(&mut rx);
        assert_eq!(opened(&ev), 1);
    }

    #[test]
    fn observers_share_open_state_with_sources() {
        let (mut d, mut rx) = dispatcher();
        d.add_observer("s");
        d.add_source("s", 0);
        d.add_observer("s");
        assert_eq!(opened(&drain(&mut rx)), 1);

        d.remove_source("s", 0);
        d.remove_observer("s");
        assert_eq!(closed(&drain(&mut rx)), 0);
        assert!(d.is_open("s"));

        d.remove_observer("s");
        assert_eq!(closed(&drain(&mut rx)), 1);
        assert_eq!(d.stream_count(), 0);

        // extra removals on a closed stream are silent
        d.remove_observer("s");
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn frame_only_after_request() {
        let (mut d, mut rx) = dispatcher();
        d.add_source("s", 0);
        drain(&mut rx);

        d.process_segment("s", 0, seg(1));
        d.process_frame_finished("s", 0);
        assert!(frames(drain(&mut rx)).is_empty());

        d.request_frame("s");
        let got = frames(drain(&mut rx));
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].stream_id, "s");
        assert_eq!(got[0].segments[0].parameters.x, 1);
    }

    #[test]
    fn request_before_round_delivers_on_completion() {
        let (mut d, mut rx) = dispatcher();
        d.add_source("s", 0);
        d.add_source("s", 1);
        d.request_frame("s");
        drain(&mut rx);

        d.process_segment("s", 1, seg(5));
        d.process_frame_finished("s", 1);
        assert!(frames(drain(&mut rx)).is_empty());

        d.process_segment("s", 0, seg(4));
        d.process_frame_finished("s", 0);
        let got = frames(drain(&mut rx));
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].segments.len(), 2);

        // gate closed again until the next request
        d.process_frame_finished("s", 0);
        d.process_frame_finished("s", 1);
        assert!(frames(drain(&mut rx)).is_empty());
    }

    #[test]
    fn slow_consumer_sees_latest_round_only() {
        let (mut d, mut rx) = dispatcher();
        d.add_source("s", 0);
        d.process_segment("s", 0, seg(1));
        d.process_frame_finished("s", 0);
        d.process_segment("s", 0, seg(2));
        d.process_frame_finished("s", 0);
        drain(&mut rx);

        d.request_frame("s");
        let got = frames(drain(&mut rx));
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].segments.len(), 1);
        assert_eq!(got[0].segments[0].parameters.x, 2);

        d.request_frame("s");
        assert!(frames(drain(&mut rx)).is_empty());
    }

    #[test]
    fn unknown_streams_are_ignored() {
        let (mut d, mut rx) = dispatcher();
        d.process_segment("ghost", 0, seg(1));
        d.process_frame_finished("ghost", 0);
        d.request_frame("ghost");
        d.remove_source("ghost", 0);
        assert!(drain(&mut rx).is_empty());
        assert_eq!(d.stream_count(), 0);
    }

    #[test]
    fn overflow_reported_once_then_silent() {
        let (tx, mut rx) = event::channel();
        let mut d = FrameDispatcher::with_config(
            tx,
            DispatcherConfig {
                max_buffered_frames: 4,
            },
        );
        d.add_source("s", 0);
        for _ in 0..10 {
            d.process_segment("s", 0, seg(0));
            d.process_frame_finished("s", 0);
        }
        d.request_frame("s");
        d.process_frame_finished("s", 0);

        let ev = drain(&mut rx);
        let exceeded = ev
            .iter()
            .filter(|e| matches!(e, StreamEvent::BufferExceeded(id) if id == "s"))
            .count();
        assert_eq!(exceeded, 1);
        assert!(frames(ev).is_empty());

        d.remove_source("s", 0);
        assert_eq!(closed(&drain(&mut rx)), 1);
    }

    #[test]
    fn removing_laggard_delivers_requested_frame() {
        let (mut d, mut rx) = dispatcher();
        d.add_source("s", 0);
        d.add_source("s", 1);
        d.request_frame("s");
        d.process_segment("s", 0, seg(3));
        d.process_frame_finished("s", 0);
        assert!(frames(drain(&mut rx)).is_empty());

        d.remove_source("s", 1);
        let got = frames(drain(&mut rx));
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].segments[0].parameters.x, 3);
        assert!(d.is_open("s"));
    }

    #[test]
    fn removing_laggard_without_request_keeps_frame_queued() {
        let (mut d, mut rx) = dispatcher();
        d.add_source("s", 0);
        d.add_source("s", 1);
        d.process_frame_finished("s", 0);
        d.remove_source("s", 1);
        assert!(frames(drain(&mut rx)).is_empty());

        d.request_frame("s");
        assert_eq!(frames(drain(&mut rx)).len(), 1);
    }

    #[test]
    fn removal_overflow_reported_once() {
        let (tx, mut rx) = event::channel();
        let mut d = FrameDispatcher::with_config(
            tx,
            DispatcherConfig {
                max_buffered_frames: 2,
            },
        );
        d.add_source("s", 0);
        d.add_source("s", 1);
        d.add_source("s", 2);
        for _ in 0..2 {
            d.process_frame_finished("s", 0);
            d.process_frame_finished("s", 1);
            d.process_frame_finished("s", 2);
        }
        // two more lists from sources 0 and 1 wait on source 2
        d.process_frame_finished("s", 0);
        d.process_frame_finished("s", 1);
        d.process_frame_finished("s", 0);
        d.process_frame_finished("s", 1);
        drain(&mut rx);

        d.remove_source("s", 2);
        d.request_frame("s");
        d.process_frame_finished("s", 0);
        let ev = drain(&mut rx);
        let exceeded = ev
            .iter()
            .filter(|e| matches!(e, StreamEvent::BufferExceeded(id) if id == "s"))
            .count();
        assert_eq!(exceeded, 1);
        assert!(frames(ev).is_empty());
        assert!(d.is_open("s"));
    }

    #[test]
    fn observer_only_stream_gets_frames_once_source_joins() {
        let (mut d, mut rx) = dispatcher();
        d.add_observer("s");
        d.request_frame("s");
        d.add_source("s", 3);
        d.process_segment("s", 3, seg(8));
        d.process_frame_finished("s", 3);

        let ev = drain(&mut rx);
        assert_eq!(opened(&ev), 1);
        assert_eq!(frames(ev).len(), 1);
    }

    #[test]
    fn streams_are_independent() {
        let (mut d, mut rx) = dispatcher();
        d.add_source("a", 0);
        d.add_source("b", 0);
        d.request_frame("a");
        d.process_frame_finished("b", 0);
        d.process_frame_finished("a", 0);

        let got = frames(drain(&mut rx));
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].stream_id, "a");
        assert_eq!(d.source_count("b"), 1);
        assert_eq!(d.observer_count("b"), 0);
    }
}
