use crate::protocol::Segment;

/// A complete, displayable image of one stream.
///
/// Ownership passes to the consumer on delivery; the receive buffer keeps
/// no reference to it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    pub stream_id: String,
    pub segments: Vec<Segment>,
}

impl Frame {
    pub fn new(stream_id: impl Into<String>, segments: Vec<Segment>) -> Self {
        Self {
            stream_id: stream_id.into(),
            segments,
        }
    }

    /// Bounding box of all segments, anchored at the origin.
    pub fn compute_dimensions(&self) -> (u32, u32) {
        self.segments.iter().fold((0, 0), |(w, h), seg| {
            (w.max(seg.right()), h.max(seg.bottom()))
        })
    }

    /// Total bytes carried by the segments.
    pub fn byte_len(&self) -> usize {
        self.segments.iter().map(|s| s.data.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{DataType, SegmentParameters};
    use bytes::Bytes;

    fn seg(x: u32, y: u32, w: u32, h: u32) -> Segment {
        Segment::new(
            SegmentParameters::new(x, y, w, h, DataType::Jpeg),
            Bytes::from_static(b"jp"),
        )
    }

    #[test]
    fn dimensions_cover_all_segments() {
        let frame = Frame::new(
            "s",
            vec![seg(0, 0, 512, 512), seg(512, 0, 488, 512), seg(0, 512, 512, 188)],
        );
        assert_eq!(frame.compute_dimensions(), (1000, 700));
        assert_eq!(frame.byte_len(), 6);
    }

    #[test]
    fn empty_frame_has_no_size() {
        assert_eq!(Frame::new("s", Vec::new()).compute_dimensions(), (0, 0));
    }
}
