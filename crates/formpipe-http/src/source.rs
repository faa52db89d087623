//! Byte-sequence sources.
//!
//! The parsers pull the request body through [`BodySource`], an incremental
//! pull interface modeled on a pipe reader: `read` hands back everything
//! that has arrived and not yet been consumed, `consume` marks a prefix as
//! processed, and unconsumed bytes are re-delivered (prefixed to newer data)
//! by the next `read`. A chunk may span several discontiguous memory
//! regions; the parsers pick their fast or slow path based on the segment
//! count of each read.
//!
//! Three ready-made sources cover the common cases: [`BytesSource`] for a
//! body that is already in memory, [`ChunkedSource`] for scripted
//! incremental arrival with contiguous re-delivery, and [`SegmentedSource`]
//! for scripted arrival that keeps every unconsumed piece as its own
//! segment. Adapters over real I/O implement the trait the same way.

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use smallvec::SmallVec;

/// One delivery from a [`BodySource`].
///
/// Holds every unconsumed byte the source currently has, split into one or
/// more segments, plus the completion flag.
#[derive(Debug)]
pub struct BodyChunk<'a> {
    segments: SmallVec<[&'a [u8]; 4]>,
    complete: bool,
}

impl<'a> BodyChunk<'a> {
    /// Build a chunk from segments; empty segments are skipped.
    #[must_use]
    pub fn from_segments<I>(segments: I, complete: bool) -> Self
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        Self {
            segments: segments.into_iter().filter(|s| !s.is_empty()).collect(),
            complete,
        }
    }

    /// Build a single-segment chunk.
    #[must_use]
    pub fn contiguous(bytes: &'a [u8], complete: bool) -> Self {
        Self::from_segments([bytes], complete)
    }

    /// Total bytes across all segments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.iter().map(|s| s.len()).sum()
    }

    /// Returns true if the chunk holds no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Returns true if the source will deliver nothing after this chunk.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// The chunk as one contiguous slice, when it has at most one segment.
    #[must_use]
    pub fn as_contiguous(&self) -> Option<&'a [u8]> {
        match self.segments.len() {
            0 => Some(&[]),
            1 => Some(self.segments[0]),
            _ => None,
        }
    }

    /// The underlying segments.
    #[must_use]
    pub fn segments(&self) -> &[&'a [u8]] {
        &self.segments
    }
}

/// An incremental source of request-body bytes.
///
/// Contract:
/// - `read` blocks until data beyond what the previous `read` delivered is
///   available, or the body is complete; it returns *all* unconsumed bytes.
/// - `consume(n)` marks the first `n` bytes of the last delivery as
///   processed; everything after them is re-delivered by the next `read`.
/// - Once a delivery reports [`BodyChunk::is_complete`], later reads keep
///   reporting completion with whatever bytes remain unconsumed.
pub trait BodySource {
    /// Wait for the next delivery.
    fn read(&mut self) -> io::Result<BodyChunk<'_>>;

    /// Mark `n` bytes as consumed.
    fn consume(&mut self, n: usize);
}

/// A body that is fully available up front, delivered as one segment.
#[derive(Debug)]
pub struct BytesSource {
    data: Vec<u8>,
    pos: usize,
}

impl BytesSource {
    /// Wrap a complete body.
    #[must_use]
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            pos: 0,
        }
    }
}

impl BodySource for BytesSource {
    fn read(&mut self) -> io::Result<BodyChunk<'_>> {
        Ok(BodyChunk::contiguous(&self.data[self.pos..], true))
    }

    fn consume(&mut self, n: usize) {
        self.pos += n;
        debug_assert!(self.pos <= self.data.len());
    }
}

/// A body arriving as a script of chunks, re-delivered contiguously.
///
/// Each `read` appends the next scripted chunk to an internal buffer and
/// hands the whole unconsumed tail back as one segment, the way a socket
/// reader that compacts its buffer would.
#[derive(Debug)]
pub struct ChunkedSource {
    pending: Vec<u8>,
    consumed: usize,
    script: VecDeque<Vec<u8>>,
}

impl ChunkedSource {
    /// Script the chunk arrival order.
    #[must_use]
    pub fn new<I>(chunks: I) -> Self
    where
        I: IntoIterator<Item = Vec<u8>>,
    {
        Self {
            pending: Vec::new(),
            consumed: 0,
            script: chunks.into_iter().collect(),
        }
    }
}

impl BodySource for ChunkedSource {
    fn read(&mut self) -> io::Result<BodyChunk<'_>> {
        if self.consumed > 0 {
            self.pending.drain(..self.consumed);
            self.consumed = 0;
        }
        if let Some(next) = self.script.pop_front() {
            self.pending.extend_from_slice(&next);
        }
        Ok(BodyChunk::contiguous(&self.pending, self.script.is_empty()))
    }

    fn consume(&mut self, n: usize) {
        debug_assert!(self.consumed + n <= self.pending.len());
        self.consumed += n;
    }
}

/// A body arriving as a script of chunks, re-delivered discontiguously.
///
/// Unconsumed pieces stay in their original allocations, so a read that
/// spans several scripted chunks yields several segments and exercises the
/// parsers' slow path.
#[derive(Debug)]
pub struct SegmentedSource {
    pending: VecDeque<Vec<u8>>,
    first_offset: usize,
    script: VecDeque<Vec<u8>>,
}

impl SegmentedSource {
    /// Script the chunk arrival order.
    #[must_use]
    pub fn new<I>(chunks: I) -> Self
    where
        I: IntoIterator<Item = Vec<u8>>,
    {
        Self {
            pending: VecDeque::new(),
            first_offset: 0,
            script: chunks.into_iter().collect(),
        }
    }
}

impl BodySource for SegmentedSource {
    fn read(&mut self) -> io::Result<BodyChunk<'_>> {
        if let Some(next) = self.script.pop_front() {
            self.pending.push_back(next);
        }
        let mut segments: SmallVec<[&[u8]; 4]> = SmallVec::new();
        for (i, seg) in self.pending.iter().enumerate() {
            let seg = if i == 0 { &seg[self.first_offset..] } else { &seg[..] };
            if !seg.is_empty() {
                segments.push(seg);
            }
        }
        Ok(BodyChunk::from_segments(segments, self.script.is_empty()))
    }

    fn consume(&mut self, mut n: usize) {
        while n > 0 {
            let first_len = self.pending[0].len() - self.first_offset;
            if n >= first_len {
                self.pending.pop_front();
                self.first_offset = 0;
                n -= first_len;
            } else {
                self.first_offset += n;
                n = 0;
            }
        }
        while self
            .pending
            .front()
            .is_some_and(|seg| seg.len() == self.first_offset)
        {
            self.pending.pop_front();
            self.first_offset = 0;
        }
    }
}

/// Cooperative cancellation flag, checked once per drive-loop iteration.
///
/// Cloning shares the flag; any clone can cancel.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create an untriggered token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// Returns true once cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}
