//! Pooled output buffer.
//!
//! Every decoded field value, file name, and content type from one parse
//! lands in a single growable byte buffer and is referred to by offset
//! ranges. The backing storage is rented from a process-wide free list and
//! returned when the owning [`FormDictionary`](crate::FormDictionary) is
//! dropped, so the common request parses without allocating at all.
//!
//! Growth never reallocates in place: a larger buffer is rented, existing
//! contents are copied forward, and only then is the old buffer returned to
//! the pool. Previously issued ranges therefore stay valid across growth.

use crate::error::FormError;

/// Hard cap on the output buffer (64 MiB).
///
/// Growing past this surfaces [`FormError::BufferOverflow`] instead of
/// buffering an unbounded body while searching for a delimiter.
pub const MAX_BUFFER_SIZE: usize = 64 * 1024 * 1024;

/// Default capacity of the first rented buffer.
pub const DEFAULT_BUFFER_CAPACITY: usize = 8 * 1024;

/// An offset pair into the output buffer.
///
/// A range with `end == 0` is the "not captured" sentinel used for the
/// transient per-part header state; every captured header value either ends
/// past offset 0 or is empty, and an empty capture carries no information
/// either way.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValueRange {
    /// Start offset, inclusive.
    pub start: usize,
    /// End offset, exclusive.
    pub end: usize,
}

impl ValueRange {
    /// The unset sentinel.
    pub const UNSET: Self = Self { start: 0, end: 0 };

    /// Length of the referenced slice.
    #[must_use]
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Returns true for zero-length ranges.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }

    /// Returns true if this range was never captured.
    #[must_use]
    pub fn is_unset(&self) -> bool {
        self.end == 0
    }
}

/// Growable byte buffer backed by pooled storage.
///
/// Writes either commit immediately ([`append`](Self::append),
/// [`append_segments`](Self::append_segments)) or go through a
/// stage-then-commit pair when the caller needs to rewrite the bytes in
/// place first (percent-decoding shrinks a staged value before committing
/// its final length).
#[derive(Debug, Default)]
pub struct OutputBuffer {
    data: Vec<u8>,
    staged_from: Option<usize>,
}

impl OutputBuffer {
    /// Create a buffer with no backing storage.
    ///
    /// Dropping it never touches the pool; used for the empty store.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            data: Vec::new(),
            staged_from: None,
        }
    }

    /// Rent a buffer with at least `capacity` bytes from the pool.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: pool::rent(capacity.min(MAX_BUFFER_SIZE)),
            staged_from: None,
        }
    }

    /// Bytes committed so far (the write cursor).
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if nothing has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// All committed bytes.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// The bytes referenced by `range`.
    ///
    /// # Panics
    ///
    /// Panics if `range` does not lie within the written region.
    #[must_use]
    pub fn slice(&self, range: ValueRange) -> &[u8] {
        &self.data[range.start..range.end]
    }

    /// Copy `bytes` to the end of the buffer and return their range.
    pub fn append(&mut self, bytes: &[u8]) -> Result<ValueRange, FormError> {
        self.ensure(bytes.len())?;
        let start = self.data.len();
        self.data.extend_from_slice(bytes);
        Ok(ValueRange {
            start,
            end: self.data.len(),
        })
    }

    /// Copy a run of discontiguous segments and return their joint range.
    ///
    /// `total` must equal the summed segment lengths; it is used to grow
    /// once up front so no segment copy reallocates.
    pub fn append_segments<'s, I>(
        &mut self,
        segments: I,
        total: usize,
    ) -> Result<ValueRange, FormError>
    where
        I: IntoIterator<Item = &'s [u8]>,
    {
        self.ensure(total)?;
        let start = self.data.len();
        for seg in segments {
            self.data.extend_from_slice(seg);
        }
        debug_assert_eq!(self.data.len(), start + total);
        Ok(ValueRange {
            start,
            end: self.data.len(),
        })
    }

    /// Copy `bytes` past the cursor without committing them, returning the
    /// staged region for in-place rewriting.
    pub fn stage(&mut self, bytes: &[u8]) -> Result<&mut [u8], FormError> {
        self.ensure(bytes.len())?;
        let start = self.data.len();
        self.data.extend_from_slice(bytes);
        self.staged_from = Some(start);
        Ok(&mut self.data[start..])
    }

    /// Stage a run of discontiguous segments (slow-path counterpart of
    /// [`stage`](Self::stage)).
    pub fn stage_segments<'s, I>(
        &mut self,
        segments: I,
        total: usize,
    ) -> Result<&mut [u8], FormError>
    where
        I: IntoIterator<Item = &'s [u8]>,
    {
        self.ensure(total)?;
        let start = self.data.len();
        for seg in segments {
            self.data.extend_from_slice(seg);
        }
        self.staged_from = Some(start);
        Ok(&mut self.data[start..])
    }

    /// Commit the first `len` bytes of the staged region, discard the rest,
    /// and return the committed range.
    ///
    /// # Panics
    ///
    /// Panics if nothing is staged or `len` exceeds the staged length.
    pub fn commit(&mut self, len: usize) -> ValueRange {
        let start = self.staged_from.take().expect("no staged region");
        assert!(len <= self.data.len() - start);
        self.data.truncate(start + len);
        ValueRange {
            start,
            end: self.data.len(),
        }
    }

    /// Drop the staged region without committing anything.
    pub fn discard_staged(&mut self) {
        if let Some(start) = self.staged_from.take() {
            self.data.truncate(start);
        }
    }

    /// Grow so that `additional` more bytes fit without reallocating.
    fn ensure(&mut self, additional: usize) -> Result<(), FormError> {
        let needed = self.data.len() + additional;
        if needed <= self.data.capacity() {
            return Ok(());
        }
        if needed > MAX_BUFFER_SIZE {
            return Err(FormError::BufferOverflow {
                needed,
                max: MAX_BUFFER_SIZE,
            });
        }

        let target = needed.max(self.data.capacity() * 2).min(MAX_BUFFER_SIZE);
        let mut next = pool::rent(target);
        next.extend_from_slice(&self.data);
        pool::give(std::mem::replace(&mut self.data, next));
        Ok(())
    }
}

impl Drop for OutputBuffer {
    fn drop(&mut self) {
        pool::give(std::mem::take(&mut self.data));
    }
}

/// Process-wide free list of output buffers.
mod pool {
    use parking_lot::Mutex;

    /// Buffers retained at most.
    const MAX_POOLED: usize = 8;
    /// Buffers smaller than this are not worth keeping.
    const MIN_RETAIN_CAPACITY: usize = 1024;

    static FREE: Mutex<Vec<Vec<u8>>> = Mutex::new(Vec::new());

    /// Take a cleared buffer with at least `min` capacity, renting a fresh
    /// one if the free list has nothing big enough.
    pub(super) fn rent(min: usize) -> Vec<u8> {
        let mut free = FREE.lock();
        if let Some(idx) = free.iter().position(|b| b.capacity() >= min) {
            return free.swap_remove(idx);
        }
        drop(free);
        Vec::with_capacity(min)
    }

    /// Return a buffer to the free list.
    pub(super) fn give(mut buf: Vec<u8>) {
        if buf.capacity() < MIN_RETAIN_CAPACITY {
            return;
        }
        buf.clear();
        let mut free = FREE.lock();
        if free.len() < MAX_POOLED {
            free.push(buf);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_returns_adjacent_ranges() {
        let mut buf = OutputBuffer::with_capacity(16);
        let a = buf.append(b"hello").unwrap();
        let b = buf.append(b"world").unwrap();
        assert_eq!(a, ValueRange { start: 0, end: 5 });
        assert_eq!(b, ValueRange { start: 5, end: 10 });
        assert_eq!(buf.slice(a), b"hello");
        assert_eq!(buf.slice(b), b"world");
    }

    #[test]
    fn ranges_survive_growth() {
        let mut buf = OutputBuffer::with_capacity(8);
        let a = buf.append(b"abcd").unwrap();
        // Force several growth steps past the initial capacity.
        let mut ranges = Vec::new();
        for i in 0..64u8 {
            ranges.push((i, buf.append(&[i; 33]).unwrap()));
        }
        assert_eq!(buf.slice(a), b"abcd");
        for (i, r) in ranges {
            assert_eq!(buf.slice(r), &[i; 33][..]);
        }
    }

    #[test]
    fn append_segments_concatenates() {
        let mut buf = OutputBuffer::with_capacity(8);
        let parts: [&[u8]; 3] = [b"ab", b"", b"cdef"];
        let r = buf.append_segments(parts, 6).unwrap();
        assert_eq!(buf.slice(r), b"abcdef");
    }

    #[test]
    fn stage_commit_shrinks() {
        let mut buf = OutputBuffer::with_capacity(8);
        let before = buf.append(b"x").unwrap();
        let staged = buf.stage(b"a%20b").unwrap();
        // Pretend decoding rewrote the staged bytes down to 3.
        staged[..3].copy_from_slice(b"a b");
        let r = buf.commit(3);
        assert_eq!(buf.slice(r), b"a b");
        assert_eq!(r.start, 1);
        assert_eq!(buf.len(), 4);
        assert_eq!(buf.slice(before), b"x");
    }

    #[test]
    fn discard_staged_restores_cursor() {
        let mut buf = OutputBuffer::with_capacity(8);
        buf.append(b"keep").unwrap();
        buf.stage(b"drop me").unwrap();
        buf.discard_staged();
        assert_eq!(buf.as_slice(), b"keep");
    }

    #[test]
    fn growth_past_cap_is_an_error() {
        let mut buf = OutputBuffer::with_capacity(8);
        let err = buf.ensure(MAX_BUFFER_SIZE + 1).unwrap_err();
        assert!(matches!(err, FormError::BufferOverflow { .. }));
    }

    #[test]
    fn unset_range_sentinel() {
        assert!(ValueRange::UNSET.is_unset());
        assert!(ValueRange::UNSET.is_empty());
        let captured = ValueRange { start: 3, end: 7 };
        assert!(!captured.is_unset());
        assert_eq!(captured.len(), 4);
    }

    #[test]
    fn empty_buffer_has_no_storage() {
        let buf = OutputBuffer::empty();
        assert!(buf.is_empty());
        assert_eq!(buf.as_slice(), b"");
        drop(buf);
    }
}
