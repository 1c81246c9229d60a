//! Bounded single-writer/single-reader byte pipe.
//!
//! [`BytePipe`] is the conduit between the staged relay's producer and
//! consumer tasks. The writer appends whole segments and suspends while
//! the unconsumed byte count is at capacity; the reader receives the
//! buffered region as a [`SegmentedBytes`] window and releases bytes with
//! an explicit `(consumed, examined)` cursor pair, so a partial chunk can
//! stay buffered without being re-delivered until more data arrives.
//!
//! Each half signals completion independently. Dropping a half signals on
//! its behalf, so a faulted task always releases a partner blocked on the
//! other side.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard},
};

use bytes::{Buf, Bytes};
use tokio::sync::Notify;

use crate::segmented::SegmentedBytes;

/// Error returned by [`PipeWriter::write`] once the reader has finished.
#[derive(Debug, PartialEq, Eq)]
pub struct PipeClosed;

impl std::fmt::Display for PipeClosed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("byte pipe closed by reader")
    }
}

impl std::error::Error for PipeClosed {}

/// One read result: the whole unconsumed region plus a completion flag.
#[derive(Debug)]
pub struct ReadWindow {
    /// Every buffered segment, in write order.
    pub buffer: SegmentedBytes,
    /// True once the writer has completed; the window then holds all
    /// bytes that will ever arrive.
    pub completed: bool,
}

struct State {
    segments: VecDeque<Bytes>,
    buffered: usize,
    /// Prefix of `buffered` the reader has already examined. A read only
    /// completes once unexamined bytes exist or the writer is done.
    examined: usize,
    writer_done: bool,
    reader_done: bool,
}

struct Shared {
    capacity: usize,
    state: Mutex<State>,
    /// Signalled when bytes are committed or the writer completes.
    readable: Notify,
    /// Signalled when bytes are consumed or the reader finishes.
    writable: Notify,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("byte pipe lock poisoned")
    }
}

/// Bounded byte conduit with exactly one writer and one reader.
pub struct BytePipe;

impl BytePipe {
    /// Create a pipe that suspends the writer once `capacity` unconsumed
    /// bytes are buffered.
    ///
    /// A write issued below the threshold is admitted in full, so the
    /// in-flight byte count is bounded by `capacity` plus one message —
    /// under two chunks when messages are no larger than the chunk size.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn new(capacity: usize) -> (PipeWriter, PipeReader) {
        assert!(capacity > 0, "pipe capacity must be non-zero");
        let shared = Arc::new(Shared {
            capacity,
            state: Mutex::new(State {
                segments: VecDeque::new(),
                buffered: 0,
                examined: 0,
                writer_done: false,
                reader_done: false,
            }),
            readable: Notify::new(),
            writable: Notify::new(),
        });
        (
            PipeWriter {
                shared: Arc::clone(&shared),
            },
            PipeReader { shared },
        )
    }
}

/// Writing half of a [`BytePipe`].
pub struct PipeWriter {
    shared: Arc<Shared>,
}

impl PipeWriter {
    /// Append `bytes` as one segment, suspending while the pipe is full.
    ///
    /// Returns the number of bytes committed (always `bytes.len()` on
    /// success). Zero-length writes complete immediately without storing
    /// a segment.
    ///
    /// # Errors
    ///
    /// Returns [`PipeClosed`] once the reader has finished — including
    /// when the writer was already suspended on a full pipe at that
    /// moment, so a departed reader never deadlocks the writer.
    pub async fn write(&mut self, bytes: Bytes) -> Result<usize, PipeClosed> {
        loop {
            {
                let mut state = self.shared.lock();
                if state.reader_done {
                    return Err(PipeClosed);
                }
                if bytes.is_empty() {
                    return Ok(0);
                }
                if state.buffered < self.shared.capacity {
                    let len = bytes.len();
                    state.buffered += len;
                    state.segments.push_back(bytes);
                    drop(state);
                    self.shared.readable.notify_one();
                    return Ok(len);
                }
            }
            self.shared.writable.notified().await;
        }
    }

    /// Signal that no more data will be written.
    ///
    /// A pending or subsequent read returns immediately with whatever
    /// bytes remain, marked completed. Idempotent.
    pub fn complete(&mut self) {
        let mut state = self.shared.lock();
        state.writer_done = true;
        drop(state);
        self.shared.readable.notify_one();
    }
}

impl Drop for PipeWriter {
    fn drop(&mut self) {
        self.complete();
    }
}

/// Reading half of a [`BytePipe`].
pub struct PipeReader {
    shared: Arc<Shared>,
}

impl PipeReader {
    /// Wait for unexamined bytes and return the whole buffered region.
    ///
    /// The window covers every unconsumed byte, including a remainder the
    /// reader previously examined without consuming. Once the writer has
    /// completed, `read` no longer suspends; it returns the remaining
    /// bytes (possibly none) with `completed` set.
    pub async fn read(&mut self) -> ReadWindow {
        loop {
            {
                let state = self.shared.lock();
                if state.writer_done || state.buffered > state.examined {
                    return ReadWindow {
                        buffer: SegmentedBytes::from_segments(state.segments.iter().cloned()),
                        completed: state.writer_done,
                    };
                }
            }
            self.shared.readable.notified().await;
        }
    }

    /// Release `consumed` bytes and record `examined` as seen.
    ///
    /// Bytes in `consumed..examined` stay buffered and reappear in the
    /// next window, but do not themselves satisfy another `read`; the
    /// reader suspends until bytes beyond `examined` arrive or the writer
    /// completes. Consuming bytes wakes a writer suspended on a full pipe.
    ///
    /// # Panics
    ///
    /// Panics unless `consumed <= examined <= buffered bytes`.
    pub fn advance(&mut self, consumed: usize, examined: usize) {
        let mut state = self.shared.lock();
        assert!(consumed <= examined, "consumed cursor past examined cursor");
        assert!(examined <= state.buffered, "examined cursor past buffered data");
        let mut remaining = consumed;
        while remaining > 0 {
            let mut front = state
                .segments
                .pop_front()
                .expect("buffered count accounts for segments");
            if front.len() <= remaining {
                remaining -= front.len();
            } else {
                front.advance(remaining);
                state.segments.push_front(front);
                remaining = 0;
            }
        }
        state.buffered -= consumed;
        state.examined = examined - consumed;
        drop(state);
        if consumed > 0 {
            self.shared.writable.notify_one();
        }
    }

    /// Signal that the reader will consume nothing further.
    ///
    /// Buffered data is discarded and a writer suspended on a full pipe
    /// is released with [`PipeClosed`].
    pub fn finish(self) {
        drop(self);
    }
}

impl Drop for PipeReader {
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        state.reader_done = true;
        state.segments.clear();
        state.buffered = 0;
        state.examined = 0;
        drop(state);
        self.shared.writable.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use rstest::rstest;
    use tokio::time::{Duration, timeout};

    use super::{BytePipe, PipeClosed};

    fn payload(byte: u8, len: usize) -> Bytes { Bytes::from(vec![byte; len]) }

    #[rstest]
    #[tokio::test]
    async fn read_returns_written_segments_in_order() {
        let (mut writer, mut reader) = BytePipe::new(16);
        writer.write(Bytes::from_static(b"abc")).await.unwrap();
        writer.write(Bytes::from_static(b"de")).await.unwrap();

        let window = reader.read().await;
        assert!(!window.completed);
        assert_eq!(window.buffer.to_vec(), b"abcde");
        let sizes: Vec<usize> = window.buffer.segments().map(Bytes::len).collect();
        assert_eq!(sizes, vec![3, 2]);
    }

    #[rstest]
    #[tokio::test]
    async fn write_suspends_at_capacity_until_reader_consumes() {
        let (mut writer, mut reader) = BytePipe::new(4);
        writer.write(payload(1, 4)).await.unwrap();

        // The pipe is at capacity; the next write must not complete yet.
        let blocked = timeout(Duration::from_millis(20), writer.write(payload(2, 2))).await;
        assert!(blocked.is_err(), "write should suspend on a full pipe");

        let window = reader.read().await;
        assert_eq!(window.buffer.len(), 4);
        reader.advance(4, 4);

        writer.write(payload(2, 2)).await.unwrap();
        let window = reader.read().await;
        assert_eq!(window.buffer.to_vec(), vec![2, 2]);
    }

    #[rstest]
    #[tokio::test]
    async fn read_suspends_until_data_arrives() {
        let (mut writer, mut reader) = BytePipe::new(4);
        let pending = timeout(Duration::from_millis(20), reader.read()).await;
        assert!(pending.is_err(), "read should suspend on an empty pipe");

        writer.write(payload(7, 1)).await.unwrap();
        let window = reader.read().await;
        assert_eq!(window.buffer.to_vec(), vec![7]);
    }

    #[rstest]
    #[tokio::test]
    async fn examined_remainder_does_not_satisfy_next_read() {
        let (mut writer, mut reader) = BytePipe::new(8);
        writer.write(payload(1, 3)).await.unwrap();

        let window = reader.read().await;
        assert_eq!(window.buffer.len(), 3);
        // Examine everything, consume nothing.
        reader.advance(0, 3);

        let pending = timeout(Duration::from_millis(20), reader.read()).await;
        assert!(pending.is_err(), "fully examined window must not re-deliver");

        writer.write(payload(2, 1)).await.unwrap();
        let window = reader.read().await;
        assert_eq!(window.buffer.to_vec(), vec![1, 1, 1, 2]);
    }

    #[rstest]
    #[tokio::test]
    async fn complete_drains_remaining_bytes_as_final() {
        let (mut writer, mut reader) = BytePipe::new(8);
        writer.write(payload(9, 2)).await.unwrap();
        writer.complete();

        let window = reader.read().await;
        assert!(window.completed);
        assert_eq!(window.buffer.to_vec(), vec![9, 9]);
        reader.advance(2, 2);

        let window = reader.read().await;
        assert!(window.completed);
        assert!(window.buffer.is_empty());
    }

    #[rstest]
    #[tokio::test]
    async fn pending_read_wakes_on_complete() {
        let (writer, mut reader) = BytePipe::new(8);
        let handle = tokio::spawn(async move { reader.read().await });
        tokio::task::yield_now().await;
        drop(writer);
        let window = handle.await.unwrap();
        assert!(window.completed);
        assert!(window.buffer.is_empty());
    }

    #[rstest]
    #[tokio::test]
    async fn blocked_writer_fails_fast_when_reader_finishes() {
        let (mut writer, reader) = BytePipe::new(2);
        writer.write(payload(1, 2)).await.unwrap();

        let handle = tokio::spawn(async move { writer.write(payload(2, 1)).await });
        tokio::task::yield_now().await;
        reader.finish();

        assert_eq!(handle.await.unwrap(), Err(PipeClosed));
    }

    #[rstest]
    #[tokio::test]
    async fn write_after_reader_finish_is_rejected() {
        let (mut writer, reader) = BytePipe::new(4);
        reader.finish();
        assert_eq!(writer.write(payload(1, 1)).await, Err(PipeClosed));
    }

    #[rstest]
    #[tokio::test]
    async fn partial_consume_splits_front_segment() {
        let (mut writer, mut reader) = BytePipe::new(8);
        writer.write(Bytes::from_static(b"abcd")).await.unwrap();

        let window = reader.read().await;
        assert_eq!(window.buffer.len(), 4);
        reader.advance(1, 4);

        writer.write(Bytes::from_static(b"e")).await.unwrap();
        let window = reader.read().await;
        assert_eq!(window.buffer.to_vec(), b"bcde");
    }
}
