//! Per-stream reassembly of segments into complete rounds.
//!
//! Every registered source accumulates segments until it signals
//! frame-finished; the finished list then waits in that source's FIFO.
//! As soon as every registered source holds at least one finished list,
//! one list is taken from each (ascending source index) and the
//! concatenation becomes a completed round.
//!
//! ```text
//!  source 0: [seg seg] ─finish─► finished ─┐
//!  source 1: [seg]     ─finish─► finished ─┼─► completed rounds ─► take_latest()
//!  source 2: [seg seg] ─finish─► finished ─┘
//! ```

use std::collections::{BTreeMap, VecDeque};

use tracing::trace;

use crate::error::PxsError;
use crate::protocol::Segment;

/// Index distinguishing the producers of one stream.
pub type SourceIndex = u64;

/// Default bound on rounds buffered without being consumed.
pub const DEFAULT_MAX_BUFFERED_FRAMES: usize = 150;

// ── SegmentBuffer ────────────────────────────────────────────────

/// Pending segments of a single source.
#[derive(Debug, Default)]
pub struct SegmentBuffer {
    current: Vec<Segment>,
    finished: VecDeque<Vec<Segment>>,
}

impl SegmentBuffer {
    pub fn push(&mut self, segment: Segment) {
        self.current.push(segment);
    }

    /// Close the segment list being accumulated.
    pub fn finish(&mut self) {
        self.finished.push_back(std::mem::take(&mut self.current));
    }

    /// Number of finished lists not yet collected into a round.
    pub fn finished_count(&self) -> usize {
        self.finished.len()
    }

    /// Segments received since the last finish.
    pub fn pending_segments(&self) -> usize {
        self.current.len()
    }

    fn pop_finished(&mut self) -> Option<Vec<Segment>> {
        self.finished.pop_front()
    }
}

// ── ReceiveBuffer ────────────────────────────────────────────────

#[derive(Debug)]
pub struct ReceiveBuffer {
    sources: BTreeMap<SourceIndex, SegmentBuffer>,
    completed: VecDeque<Vec<Segment>>,
    allowed_to_send: bool,
    max_buffered_frames: usize,
}

impl Default for ReceiveBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BUFFERED_FRAMES)
    }
}

impl ReceiveBuffer {
    pub fn new(max_buffered_frames: usize) -> Self {
        Self {
            sources: BTreeMap::new(),
            completed: VecDeque::new(),
            allowed_to_send: false,
            max_buffered_frames: max_buffered_frames.max(1),
        }
    }

    /// Register a source. Returns `false` if it was already registered.
    pub fn add_source(&mut self, index: SourceIndex) -> bool {
        if self.sources.contains_key(&index) {
            return false;
        }
        self.sources.insert(index, SegmentBuffer::default());
        true
    }

    /// Unregister a source, discarding its unfinished segments.
    ///
    /// Returns `Ok(false)` if it was not registered. The remaining sources
    /// may now complete rounds on their own; the source is removed even
    /// when that pushes the completed rounds past the bound.
    pub fn remove_source(&mut self, index: SourceIndex) -> Result<bool, PxsError> {
        if self.sources.remove(&index).is_none() {
            return Ok(false);
        }
        self.collect_rounds();
        self.check_completed_bound()?;
        Ok(true)
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    pub fn has_source(&self, index: SourceIndex) -> bool {
        self.sources.contains_key(&index)
    }

    /// Append a segment to its source's current list.
    pub fn insert(&mut self, segment: Segment, index: SourceIndex) -> bool {
        match self.sources.get_mut(&index) {
            Some(buffer) => {
                buffer.push(segment);
                true
            }
            None => {
                trace!(source = index, "segment for unregistered source dropped");
                false
            }
        }
    }

    /// Close `index`'s current list and collect any round this completes.
    ///
    /// A source finishing again before the others is queued, not an
    /// error, until more than `max_buffered_frames` lists pile up.
    pub fn finish_frame_for_source(&mut self, index: SourceIndex) -> Result<(), PxsError> {
        let Some(buffer) = self.sources.get_mut(&index) else {
            trace!(source = index, "finish for unregistered source ignored");
            return Ok(());
        };

        buffer.finish();
        if buffer.finished_count() > self.max_buffered_frames {
            return Err(PxsError::BufferExceeded {
                max: self.max_buffered_frames,
            });
        }

        self.collect_rounds();
        self.check_completed_bound()
    }

    pub fn has_complete_frame(&self) -> bool {
        !self.completed.is_empty()
    }

    /// Number of completed rounds waiting to be consumed.
    pub fn complete_frame_count(&self) -> usize {
        self.completed.len()
    }

    /// Oldest completed round.
    pub fn pop_frame(&mut self) -> Option<Vec<Segment>> {
        self.completed.pop_front()
    }

    /// Drain every completed round, keeping only the newest.
    pub fn take_latest_frame(&mut self) -> Option<Vec<Segment>> {
        let latest = self.completed.pop_back();
        self.completed.clear();
        latest
    }

    pub fn set_allowed_to_send(&mut self, allowed: bool) {
        self.allowed_to_send = allowed;
    }

    pub fn is_allowed_to_send(&self) -> bool {
        self.allowed_to_send
    }

    fn check_completed_bound(&self) -> Result<(), PxsError> {
        if self.completed.len() > self.max_buffered_frames {
            return Err(PxsError::BufferExceeded {
                max: self.max_buffered_frames,
            });
        }
        Ok(())
    }

    fn collect_rounds(&mut self) {
        if self.sources.is_empty() {
            return;
        }
        while self.sources.values().all(|s| s.finished_count() > 0) {
            let mut round = Vec::new();
            for buffer in self.sources.values_mut() {
                if let Some(mut segments) = buffer.pop_finished() {
                    round.append(&mut segments);
                }
            }
            self.completed.push_back(round);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{DataType, SegmentParameters};
    use bytes::Bytes;

    fn seg(x: u32) -> Segment {
        Segment::new(
            SegmentParameters::new(x, 0, 1, 1, DataType::Rgba),
            Bytes::from_static(&[0, 0, 0, 0]),
        )
    }

    fn xs(round: &[Segment]) -> Vec<u32> {
        round.iter().map(|s| s.parameters.x).collect()
    }

    #[test]
    fn single_source_round() {
        let mut buf = ReceiveBuffer::default();
        buf.add_source(0);
        buf.insert(seg(1), 0);
        buf.insert(seg(2), 0);
        assert!(!buf.has_complete_frame());

        buf.finish_frame_for_source(0).unwrap();
        assert!(buf.has_complete_frame());
        assert_eq!(xs(&buf.pop_frame().unwrap()), vec![1, 2]);
        assert!(!buf.has_complete_frame());
    }

    #[test]
    fn round_waits_for_every_source() {
        let mut buf = ReceiveBuffer::default();
        for i in 0..3 {
            buf.add_source(i);
        }

        // interleaved arrival
        buf.insert(seg(20), 2);
        buf.insert(seg(0), 0);
        buf.finish_frame_for_source(2).unwrap();
        buf.insert(seg(10), 1);
        buf.finish_frame_for_source(0).unwrap();
        assert!(!buf.has_complete_frame());

        buf.finish_frame_for_source(1).unwrap();
        assert!(buf.has_complete_frame());
        assert_eq!(xs(&buf.pop_frame().unwrap()), vec![0, 10, 20]);
    }

    #[test]
    fn repeated_finish_is_queued_per_source() {
        let mut buf = ReceiveBuffer::default();
        buf.add_source(0);
        buf.add_source(1);

        buf.insert(seg(1), 0);
        buf.finish_frame_for_source(0).unwrap();
        buf.insert(seg(2), 0);
        buf.finish_frame_for_source(0).unwrap();
        assert!(!buf.has_complete_frame());

        buf.insert(seg(100), 1);
        buf.finish_frame_for_source(1).unwrap();
        assert_eq!(buf.complete_frame_count(), 1);
        assert_eq!(xs(&buf.pop_frame().unwrap()), vec![1, 100]);

        buf.finish_frame_for_source(1).unwrap();
        assert_eq!(xs(&buf.pop_frame().unwrap()), vec![2]);
    }

    #[test]
    fn duplicate_add_source_is_idempotent() {
        let mut buf = ReceiveBuffer::default();
        assert!(buf.add_source(4));
        assert!(!buf.add_source(4));
        assert_eq!(buf.source_count(), 1);
    }

    #[test]
    fn unknown_source_is_ignored() {
        let mut buf = ReceiveBuffer::default();
        buf.add_source(0);
        assert!(!buf.insert(seg(1), 9));
        assert!(buf.finish_frame_for_source(9).is_ok());
        assert!(!buf.has_complete_frame());
    }

    #[test]
    fn removing_laggard_completes_round() {
        let mut buf = ReceiveBuffer::default();
        buf.add_source(0);
        buf.add_source(1);
        buf.insert(seg(1), 0);
        buf.finish_frame_for_source(0).unwrap();
        assert!(!buf.has_complete_frame());

        assert!(buf.remove_source(1).unwrap());
        assert!(buf.has_complete_frame());
        assert!(!buf.remove_source(1).unwrap());
    }

    #[test]
    fn adding_source_keeps_completed_round() {
        let mut buf = ReceiveBuffer::default();
        buf.add_source(0);
        buf.insert(seg(1), 0);
        buf.finish_frame_for_source(0).unwrap();

        buf.add_source(1);
        assert!(buf.has_complete_frame());
        assert_eq!(xs(&buf.pop_frame().unwrap()), vec![1]);

        // the next round needs both sources
        buf.finish_frame_for_source(0).unwrap();
        assert!(!buf.has_complete_frame());
        buf.finish_frame_for_source(1).unwrap();
        assert!(buf.has_complete_frame());
    }

    #[test]
    fn take_latest_discards_older_rounds() {
        let mut buf = ReceiveBuffer::default();
        buf.add_source(0);
        for x in 0..3 {
            buf.insert(seg(x), 0);
            buf.finish_frame_for_source(0).unwrap();
        }
        assert_eq!(buf.complete_frame_count(), 3);
        assert_eq!(xs(&buf.take_latest_frame().unwrap()), vec![2]);
        assert!(!buf.has_complete_frame());
        assert!(buf.take_latest_frame().is_none());
    }

    #[test]
    fn overflow_after_bound() {
        let mut buf = ReceiveBuffer::new(3);
        buf.add_source(0);
        for _ in 0..3 {
            buf.finish_frame_for_source(0).unwrap();
        }
        assert!(matches!(
            buf.finish_frame_for_source(0),
            Err(PxsError::BufferExceeded { max: 3 })
        ));
    }

    #[test]
    fn runaway_source_overflows_while_others_idle() {
        let mut buf = ReceiveBuffer::new(2);
        buf.add_source(0);
        buf.add_source(1);
        buf.finish_frame_for_source(0).unwrap();
        buf.finish_frame_for_source(0).unwrap();
        assert!(buf.finish_frame_for_source(0).is_err());
    }

    #[test]
    fn removal_that_floods_rounds_overflows() {
        let mut buf = ReceiveBuffer::new(2);
        buf.add_source(0);
        buf.add_source(1);
        for _ in 0..2 {
            buf.finish_frame_for_source(0).unwrap();
            buf.finish_frame_for_source(1).unwrap();
        }
        // two more finished lists from source 0, waiting on source 1
        buf.finish_frame_for_source(0).unwrap();
        buf.finish_frame_for_source(0).unwrap();
        assert_eq!(buf.complete_frame_count(), 2);

        assert!(matches!(
            buf.remove_source(1),
            Err(PxsError::BufferExceeded { max: 2 })
        ));
        assert!(!buf.has_source(1));
        assert_eq!(buf.complete_frame_count(), 4);
    }

    #[test]
    fn gate_defaults_closed() {
        let mut buf = ReceiveBuffer::default();
        assert!(!buf.is_allowed_to_send());
        buf.set_allowed_to_send(true);
        assert!(buf.is_allowed_to_send());
    }
}
