//! `application/x-www-form-urlencoded` body parsing.
//!
//! The body is one flat run of `key=value` pairs separated by `&`. Keys are
//! percent-decoded into a scratch buffer and hashed; values are copied into
//! the output buffer and percent-decoded in place there, so the stored
//! range is already decoded. A segment without `=` carries no retrievable
//! value and is dropped, as are pairs with an empty key or an empty value.
//!
//! Length limits are hard caps, not configuration: a key past 2 KiB or a
//! value past 4 MiB fails the parse, and so does accumulating more than a
//! maximal pair's worth of bytes while waiting for a `&` that never comes.

use formpipe_core::{FormError, OutputBuffer, hash_key};
use smallvec::SmallVec;

use crate::cursor::SegCursor;
use crate::parser::ValueMap;

/// Hard cap on a single (still encoded) key.
pub const KEY_LENGTH_LIMIT: usize = 2 * 1024;

/// Hard cap on a single (still encoded) value.
pub const VALUE_LENGTH_LIMIT: usize = 4 * 1024 * 1024;

/// Working state of one url-encoded parse.
#[derive(Debug)]
pub(crate) struct UrlEncodedMachine {
    pub(crate) buffer: OutputBuffer,
    pub(crate) values: ValueMap,
}

impl UrlEncodedMachine {
    pub(crate) fn new(initial_capacity: usize) -> Self {
        Self {
            buffer: OutputBuffer::with_capacity(initial_capacity),
            values: ValueMap::default(),
        }
    }

    /// Fast path: the whole chunk is one contiguous slice.
    ///
    /// Returns the number of bytes fully consumed; an incomplete trailing
    /// pair is left for re-delivery unless this is the final chunk.
    pub(crate) fn process_contiguous(
        &mut self,
        span: &[u8],
        is_final: bool,
    ) -> Result<usize, FormError> {
        let mut consumed = 0;
        let mut rest = span;

        while !rest.is_empty() {
            let pair = match memchr::memchr(b'&', rest) {
                Some(i) => {
                    let pair = &rest[..i];
                    rest = &rest[i + 1..];
                    consumed += i + 1;
                    pair
                }
                None => {
                    if !is_final {
                        // Don't buffer indefinitely while waiting for '&'.
                        check_pending(rest.len())?;
                        break;
                    }
                    let pair = rest;
                    consumed += rest.len();
                    rest = &[];
                    pair
                }
            };
            self.handle_pair(pair)?;
        }

        Ok(consumed)
    }

    /// Slow path: the chunk spans several discontiguous segments.
    pub(crate) fn process_segmented(
        &mut self,
        cursor: &SegCursor<'_>,
        is_final: bool,
    ) -> Result<usize, FormError> {
        let mut pos = 0;

        while pos < cursor.len() {
            let (end, next) = match cursor.find_byte(b'&', pos) {
                Some(i) => (i, i + 1),
                None => {
                    if !is_final {
                        check_pending(cursor.len() - pos)?;
                        return Ok(pos);
                    }
                    (cursor.len(), cursor.len())
                }
            };

            let slices = cursor.slices(pos, end);
            match slices.as_slice() {
                [] => self.handle_pair(b"")?,
                [single] => self.handle_pair(single)?,
                _ => self.handle_pair_segmented(cursor, pos, end)?,
            }
            pos = next;
        }

        Ok(pos)
    }

    /// Split one contiguous pair, enforce limits, store the value.
    fn handle_pair(&mut self, pair: &[u8]) -> Result<(), FormError> {
        let Some(eq) = memchr::memchr(b'=', pair) else {
            // A bare token has no retrievable value; it is length-checked
            // and then dropped.
            check_key_len(pair.len())?;
            return Ok(());
        };

        let key = &pair[..eq];
        let value = &pair[eq + 1..];
        check_key_len(key.len())?;
        check_value_len(value.len())?;
        if key.is_empty() || value.is_empty() {
            return Ok(());
        }

        let mut key_buf: SmallVec<[u8; 128]> = SmallVec::from_slice(key);
        let key_len = decode_in_place(&mut key_buf)?;
        let hash = hash_key(&key_buf[..key_len]);

        let staged = self.buffer.stage(value)?;
        let range = match decode_in_place(staged) {
            Ok(len) => self.buffer.commit(len),
            Err(e) => {
                self.buffer.discard_staged();
                return Err(e);
            }
        };
        self.values.entry(hash).or_default().push(range);
        Ok(())
    }

    /// Same as [`handle_pair`](Self::handle_pair) for a pair spanning
    /// segment edges.
    fn handle_pair_segmented(
        &mut self,
        cursor: &SegCursor<'_>,
        start: usize,
        end: usize,
    ) -> Result<(), FormError> {
        let eq = cursor.find_byte(b'=', start).filter(|&i| i < end);
        let Some(eq) = eq else {
            check_key_len(end - start)?;
            return Ok(());
        };

        let key_len = eq - start;
        let value_len = end - (eq + 1);
        check_key_len(key_len)?;
        check_value_len(value_len)?;
        if key_len == 0 || value_len == 0 {
            return Ok(());
        }

        let mut key_buf = cursor.copy_range(start, eq);
        let decoded_key_len = decode_in_place(&mut key_buf)?;
        let hash = hash_key(&key_buf[..decoded_key_len]);

        let slices = cursor.slices(eq + 1, end);
        let staged = self
            .buffer
            .stage_segments(slices.iter().copied(), value_len)?;
        let range = match decode_in_place(staged) {
            Ok(len) => self.buffer.commit(len),
            Err(e) => {
                self.buffer.discard_staged();
                return Err(e);
            }
        };
        self.values.entry(hash).or_default().push(range);
        Ok(())
    }
}

fn check_key_len(len: usize) -> Result<(), FormError> {
    if len > KEY_LENGTH_LIMIT {
        return Err(FormError::KeyTooLong {
            len,
            max: KEY_LENGTH_LIMIT,
        });
    }
    Ok(())
}

fn check_value_len(len: usize) -> Result<(), FormError> {
    if len > VALUE_LENGTH_LIMIT {
        return Err(FormError::ValueTooLong {
            len,
            max: VALUE_LENGTH_LIMIT,
        });
    }
    Ok(())
}

/// Reject unconsumed accumulation beyond one maximal `key=value&` pair.
fn check_pending(len: usize) -> Result<(), FormError> {
    if len > KEY_LENGTH_LIMIT + VALUE_LENGTH_LIMIT + 2 {
        return Err(FormError::ValueTooLong {
            len,
            max: VALUE_LENGTH_LIMIT,
        });
    }
    Ok(())
}

/// Decode form url-encoding in place: `+` becomes space, `%XX` becomes the
/// escaped byte. Returns the decoded length (always <= the input length).
///
/// A truncated or non-hex escape is fatal; unlike lenient query-string
/// decoding there is no keep-as-is fallback for form bodies.
pub(crate) fn decode_in_place(bytes: &mut [u8]) -> Result<usize, FormError> {
    // Fast path: nothing to decode.
    if memchr::memchr2(b'%', b'+', bytes).is_none() {
        return Ok(bytes.len());
    }

    let mut read = 0;
    let mut write = 0;
    while read < bytes.len() {
        match bytes[read] {
            b'+' => {
                bytes[write] = b' ';
                read += 1;
            }
            b'%' => {
                if read + 2 >= bytes.len() {
                    return Err(FormError::InvalidEncoding);
                }
                let hi = hex_digit(bytes[read + 1]).ok_or(FormError::InvalidEncoding)?;
                let lo = hex_digit(bytes[read + 2]).ok_or(FormError::InvalidEncoding)?;
                bytes[write] = hi << 4 | lo;
                read += 3;
            }
            b => {
                bytes[write] = b;
                read += 1;
            }
        }
        write += 1;
    }
    Ok(write)
}

/// Convert a hex digit to its numeric value.
fn hex_digit(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine() -> UrlEncodedMachine {
        UrlEncodedMachine::new(64)
    }

    fn get<'a>(m: &'a UrlEncodedMachine, key: &[u8]) -> Vec<&'a [u8]> {
        m.values
            .get(&hash_key(key))
            .map(|ranges| ranges.iter().map(|r| m.buffer.slice(*r)).collect())
            .unwrap_or_default()
    }

    #[test]
    fn two_simple_pairs() {
        let mut m = machine();
        let consumed = m.process_contiguous(b"name=Jane&age=30", true).unwrap();
        assert_eq!(consumed, 16);
        assert_eq!(get(&m, b"name"), vec![b"Jane".as_slice()]);
        assert_eq!(get(&m, b"age"), vec![b"30".as_slice()]);
    }

    #[test]
    fn repeated_key_accumulates_in_order() {
        let mut m = machine();
        m.process_contiguous(b"c=red&c=blue&c=green&c=teal", true)
            .unwrap();
        assert_eq!(
            get(&m, b"c"),
            vec![b"red".as_slice(), b"blue", b"green", b"teal"]
        );
    }

    #[test]
    fn bare_token_is_dropped() {
        let mut m = machine();
        m.process_contiguous(b"flag&name=alice", true).unwrap();
        assert!(get(&m, b"flag").is_empty());
        assert_eq!(get(&m, b"name"), vec![b"alice".as_slice()]);
        assert_eq!(m.values.len(), 1);
    }

    #[test]
    fn empty_key_or_value_is_dropped() {
        let mut m = machine();
        m.process_contiguous(b"name=&=orphan&age=30", true).unwrap();
        assert!(get(&m, b"name").is_empty());
        assert_eq!(get(&m, b"age"), vec![b"30".as_slice()]);
        assert_eq!(m.values.len(), 1);
    }

    #[test]
    fn percent_and_plus_decode() {
        let mut m = machine();
        m.process_contiguous(b"msg=hello+world%21&word=caf%C3%A9", true)
            .unwrap();
        assert_eq!(get(&m, b"msg"), vec![b"hello world!".as_slice()]);
        assert_eq!(get(&m, b"word"), vec!["café".as_bytes()]);
    }

    #[test]
    fn encoded_key_is_decoded_before_hashing() {
        let mut m = machine();
        m.process_contiguous(b"my+key=1&other%3Dkey=2", true).unwrap();
        assert_eq!(get(&m, b"my key"), vec![b"1".as_slice()]);
        assert_eq!(get(&m, b"other=key"), vec![b"2".as_slice()]);
    }

    #[test]
    fn invalid_escape_is_fatal() {
        let mut m = machine();
        let err = m.process_contiguous(b"a=%ZZ", true).unwrap_err();
        assert!(matches!(err, FormError::InvalidEncoding));

        let mut m = machine();
        let err = m.process_contiguous(b"a=%2", true).unwrap_err();
        assert!(matches!(err, FormError::InvalidEncoding));
    }

    #[test]
    fn invalid_escape_discards_staged_bytes() {
        let mut m = machine();
        let _ = m.process_contiguous(b"good=yes&bad=%Q9", true).unwrap_err();
        // The staged bad value must not linger past the committed region.
        assert_eq!(m.buffer.as_slice(), b"yes");
    }

    #[test]
    fn key_too_long_is_fatal() {
        let mut m = machine();
        let mut body = vec![b'k'; KEY_LENGTH_LIMIT + 1];
        body.extend_from_slice(b"=v");
        let err = m.process_contiguous(&body, true).unwrap_err();
        assert!(matches!(err, FormError::KeyTooLong { .. }));

        // A bare over-long token is rejected too.
        let mut m = machine();
        let body = vec![b'k'; KEY_LENGTH_LIMIT + 1];
        let err = m.process_contiguous(&body, true).unwrap_err();
        assert!(matches!(err, FormError::KeyTooLong { .. }));
    }

    #[test]
    fn unbounded_accumulation_is_rejected() {
        let mut m = machine();
        let body = vec![b'x'; KEY_LENGTH_LIMIT + VALUE_LENGTH_LIMIT + 3];
        let err = m.process_contiguous(&body, false).unwrap_err();
        assert!(matches!(err, FormError::ValueTooLong { .. }));
    }

    #[test]
    fn incomplete_trailing_pair_waits() {
        let mut m = machine();
        let consumed = m.process_contiguous(b"a=1&b=partial", false).unwrap();
        assert_eq!(consumed, 4);
        assert_eq!(get(&m, b"a"), vec![b"1".as_slice()]);
        assert!(get(&m, b"b").is_empty());

        // Re-delivery with the rest completes the pair.
        let consumed = m.process_contiguous(b"b=partial+done", true).unwrap();
        assert_eq!(consumed, 14);
        assert_eq!(get(&m, b"b"), vec![b"partial done".as_slice()]);
    }

    #[test]
    fn segmented_matches_contiguous() {
        let body = b"name=Jane&msg=hello+world%21&name=Janet";
        for split in 0..=body.len() {
            let segs: [&[u8]; 2] = [&body[..split], &body[split..]];
            let segs: Vec<&[u8]> = segs.iter().filter(|s| !s.is_empty()).copied().collect();
            let cursor = SegCursor::new(&segs);

            let mut slow = machine();
            let consumed = slow.process_segmented(&cursor, true).unwrap();
            assert_eq!(consumed, body.len());

            let mut fast = machine();
            fast.process_contiguous(body, true).unwrap();

            for key in [&b"name"[..], b"msg"] {
                assert_eq!(get(&slow, key), get(&fast, key), "split={split}");
            }
        }
    }

    #[test]
    fn decode_in_place_plain() {
        let mut bytes = *b"plain";
        assert_eq!(decode_in_place(&mut bytes).unwrap(), 5);
        assert_eq!(&bytes, b"plain");
    }

    #[test]
    fn decode_in_place_mixed() {
        let mut bytes = *b"a%20b+c%3d";
        let len = decode_in_place(&mut bytes).unwrap();
        assert_eq!(&bytes[..len], b"a b c=");
    }
}
