//! Cursor over discontiguous body segments.
//!
//! The slow parsing path works on a chunk that spans several memory
//! regions. [`SegCursor`] presents those regions as one logical byte
//! sequence addressed by absolute offsets, with the handful of operations
//! the parsers need: single-byte and token search, byte access, and
//! sub-range extraction. It must agree byte-for-byte with slicing the same
//! logical bytes out of one contiguous buffer; the equivalence tests lean
//! on that.

use smallvec::SmallVec;

/// Read-only view over an ordered list of byte segments.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SegCursor<'a> {
    segments: &'a [&'a [u8]],
    len: usize,
}

impl<'a> SegCursor<'a> {
    pub(crate) fn new(segments: &'a [&'a [u8]]) -> Self {
        Self {
            segments,
            len: segments.iter().map(|s| s.len()).sum(),
        }
    }

    /// Total logical length.
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Byte at absolute offset `pos`.
    ///
    /// # Panics
    ///
    /// Panics if `pos` is out of bounds.
    pub(crate) fn byte_at(&self, pos: usize) -> u8 {
        let mut base = 0;
        for seg in self.segments {
            if pos < base + seg.len() {
                return seg[pos - base];
            }
            base += seg.len();
        }
        panic!("cursor position {pos} out of bounds ({})", self.len);
    }

    /// First occurrence of `needle` at or after `from`.
    pub(crate) fn find_byte(&self, needle: u8, from: usize) -> Option<usize> {
        let mut base = 0;
        for seg in self.segments {
            let end = base + seg.len();
            if end > from {
                let local = from.saturating_sub(base);
                if let Some(i) = memchr::memchr(needle, &seg[local..]) {
                    return Some(base + local + i);
                }
            }
            base = end;
        }
        None
    }

    /// First occurrence of a multi-byte `token` at or after `from`,
    /// including matches spanning segment edges.
    pub(crate) fn find(&self, token: &[u8], from: usize) -> Option<usize> {
        let first = *token.first()?;
        let last_start = self.len.checked_sub(token.len())?;
        let mut pos = from;
        while let Some(candidate) = self.find_byte(first, pos) {
            if candidate > last_start {
                return None;
            }
            if self.matches_at(candidate, token) {
                return Some(candidate);
            }
            pos = candidate + 1;
        }
        None
    }

    /// Does `token` occur at absolute offset `pos`?
    pub(crate) fn matches_at(&self, pos: usize, token: &[u8]) -> bool {
        if pos + token.len() > self.len {
            return false;
        }
        let mut matched = 0;
        let mut base = 0;
        for seg in self.segments {
            if matched == token.len() {
                break;
            }
            let seg_end = base + seg.len();
            if seg_end <= pos + matched {
                base = seg_end;
                continue;
            }
            let local = pos + matched - base;
            let take = (seg.len() - local).min(token.len() - matched);
            if seg[local..local + take] != token[matched..matched + take] {
                return false;
            }
            matched += take;
            base = seg_end;
        }
        matched == token.len()
    }

    /// Sub-slices covering the absolute range `start..end`, in order.
    pub(crate) fn slices(&self, start: usize, end: usize) -> SmallVec<[&'a [u8]; 4]> {
        let mut out = SmallVec::new();
        let mut base = 0;
        for seg in self.segments {
            let seg_start = base;
            let seg_end = base + seg.len();
            base = seg_end;
            if seg_end <= start {
                continue;
            }
            if seg_start >= end {
                break;
            }
            let s = start.max(seg_start) - seg_start;
            let e = end.min(seg_end) - seg_start;
            if s < e {
                out.push(&seg[s..e]);
            }
        }
        out
    }

    /// Copy the absolute range `start..end` into a scratch buffer.
    pub(crate) fn copy_range(&self, start: usize, end: usize) -> SmallVec<[u8; 256]> {
        let mut out = SmallVec::with_capacity(end - start);
        for slice in self.slices(start, end) {
            out.extend_from_slice(slice);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cursor_over<'a>(segs: &'a [&'a [u8]]) -> SegCursor<'a> {
        SegCursor::new(segs)
    }

    #[test]
    fn length_and_bytes() {
        let segs: [&[u8]; 3] = [b"ab", b"", b"cde"];
        let c = cursor_over(&segs);
        assert_eq!(c.len(), 5);
        assert_eq!(c.byte_at(0), b'a');
        assert_eq!(c.byte_at(2), b'c');
        assert_eq!(c.byte_at(4), b'e');
    }

    #[test]
    fn find_byte_across_segments() {
        let segs: [&[u8]; 2] = [b"abc", b"dxe"];
        let c = cursor_over(&segs);
        assert_eq!(c.find_byte(b'x', 0), Some(4));
        assert_eq!(c.find_byte(b'a', 1), None);
        assert_eq!(c.find_byte(b'e', 4), Some(5));
    }

    #[test]
    fn find_token_spanning_edge() {
        let segs: [&[u8]; 3] = [b"xx--bo", b"und", b"ary--"];
        let c = cursor_over(&segs);
        assert_eq!(c.find(b"--boundary", 0), Some(2));
        assert_eq!(c.find(b"--boundary", 3), None);
        assert_eq!(c.find(b"ry--", 0), Some(10));
    }

    #[test]
    fn find_skips_false_starts() {
        // Logical bytes: --x---yz
        let segs: [&[u8]; 2] = [b"--x--", b"-yz"];
        let c = cursor_over(&segs);
        assert_eq!(c.find(b"--y", 0), Some(4));
        assert_eq!(c.find(b"---y", 0), Some(3));
        assert_eq!(c.find(b"--z", 0), None);
    }

    #[test]
    fn slices_partial_overlap() {
        let segs: [&[u8]; 3] = [b"abcd", b"ef", b"ghij"];
        let c = cursor_over(&segs);
        let got = c.slices(2, 8);
        assert_eq!(got.as_slice(), &[&b"cd"[..], b"ef", b"gh"]);
        assert_eq!(c.copy_range(2, 8).as_slice(), b"cdefgh");
        assert!(c.slices(3, 3).is_empty());
    }

    #[test]
    fn agrees_with_contiguous_search() {
        let body = b"aa--b--bb--bba--bb";
        // Split the body at every offset into two segments and compare
        // searches against the contiguous answer.
        for split in 0..=body.len() {
            let segs: [&[u8]; 2] = [&body[..split], &body[split..]];
            let c = cursor_over(&segs);
            for from in 0..=body.len() {
                let expected = memchr::memmem::find(&body[from.min(body.len())..], b"--bb")
                    .map(|i| i + from);
                assert_eq!(c.find(b"--bb", from), expected, "split={split} from={from}");
            }
        }
    }
}
