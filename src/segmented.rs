//! Non-contiguous byte windows shared between the relay pipe and decoder.
//!
//! A [`SegmentedBytes`] is an ordered list of [`Bytes`] segments treated as
//! one logical byte sequence. Slicing and cursor operations never copy
//! payload data; they clone reference-counted segments or split them at
//! the requested offset.

use std::collections::VecDeque;

use bytes::{Buf, Bytes};

/// An ordered sequence of byte segments viewed as one logical buffer.
///
/// Empty segments are never stored, so [`Buf::chunk`] on a
/// [`SegmentedCursor`] always yields a non-empty slice while bytes remain.
#[derive(Clone, Debug, Default)]
pub struct SegmentedBytes {
    segments: VecDeque<Bytes>,
    len: usize,
}

impl SegmentedBytes {
    /// Create an empty segment list.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Build a segment list from an iterator of segments, skipping empties.
    pub fn from_segments<I>(segments: I) -> Self
    where
        I: IntoIterator<Item = Bytes>,
    {
        let mut buf = Self::new();
        for segment in segments {
            buf.push(segment);
        }
        buf
    }

    /// Append a segment to the end of the sequence.
    ///
    /// Zero-length segments are discarded so segment boundaries always
    /// carry data.
    pub fn push(&mut self, segment: Bytes) {
        if segment.is_empty() {
            return;
        }
        self.len += segment.len();
        self.segments.push_back(segment);
    }

    /// Total number of bytes across all segments.
    #[must_use]
    pub fn len(&self) -> usize { self.len }

    /// Whether the sequence holds no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.len == 0 }

    /// Iterate over the underlying segments in order.
    pub fn segments(&self) -> impl Iterator<Item = &Bytes> { self.segments.iter() }

    /// Split off the first `count` bytes, preserving segment boundaries.
    ///
    /// A segment straddling the split point is divided at the boundary;
    /// both halves keep referencing the original allocation.
    ///
    /// # Panics
    ///
    /// Panics if `count` exceeds [`len`](Self::len).
    #[must_use]
    pub fn split_to(&mut self, count: usize) -> SegmentedBytes {
        assert!(count <= self.len, "split_to past end of buffer");
        let mut head = SegmentedBytes::new();
        let mut needed = count;
        while needed > 0 {
            let mut front = self.segments.pop_front().expect("len accounts for segments");
            if front.len() <= needed {
                needed -= front.len();
                head.push(front);
            } else {
                head.push(front.split_to(needed));
                self.segments.push_front(front);
                needed = 0;
            }
        }
        self.len -= count;
        head
    }

    /// A borrowing [`Buf`] cursor over the whole sequence.
    ///
    /// Reading through the cursor does not consume the underlying bytes,
    /// so a window can be decoded and then still forwarded verbatim.
    #[must_use]
    pub fn cursor(&self) -> SegmentedCursor<'_> {
        SegmentedCursor {
            buf: self,
            segment: 0,
            offset: 0,
            remaining: self.len,
        }
    }

    /// Copy the sequence into one contiguous vector.
    #[must_use]
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len);
        for segment in &self.segments {
            out.extend_from_slice(segment);
        }
        out
    }
}

impl From<Bytes> for SegmentedBytes {
    fn from(segment: Bytes) -> Self { Self::from_segments([segment]) }
}

/// Read-only [`Buf`] view over a [`SegmentedBytes`].
pub struct SegmentedCursor<'a> {
    buf: &'a SegmentedBytes,
    segment: usize,
    offset: usize,
    remaining: usize,
}

impl Buf for SegmentedCursor<'_> {
    fn remaining(&self) -> usize { self.remaining }

    fn chunk(&self) -> &[u8] {
        match self.buf.segments.get(self.segment) {
            Some(segment) => &segment[self.offset..],
            None => &[],
        }
    }

    fn advance(&mut self, mut cnt: usize) {
        assert!(cnt <= self.remaining, "advance past end of cursor");
        self.remaining -= cnt;
        while cnt > 0 {
            let segment = &self.buf.segments[self.segment];
            let available = segment.len() - self.offset;
            if cnt < available {
                self.offset += cnt;
                return;
            }
            cnt -= available;
            self.segment += 1;
            self.offset = 0;
        }
    }
}
