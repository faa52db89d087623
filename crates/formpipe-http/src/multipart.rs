//! `multipart/form-data` body parsing.
//!
//! An explicit three-phase state machine threaded through a small struct of
//! pending-part fields, resumable at any byte position:
//!
//! - `ParsingHeaders`: consume one line at a time. Lines are split on `;`
//!   and each token matched against `name=`, `filename=` and
//!   `Content-Type:` (exact, case-sensitive). An empty line ends the header
//!   block once a `name=` has been seen. A part that captured a
//!   content-type opens its spill file right here, before any body byte
//!   arrives, and the transient header state is cleared so nothing leaks
//!   into the next part.
//! - `StreamingBody`: scan for the `--boundary` token. Everything before it
//!   is the part's value (minus one trailing newline); it goes to the
//!   pooled buffer for simple fields or to the open spill file for
//!   uploads. With no boundary in sight, an open spill file absorbs all
//!   but a small held-back tail; simple values are never partially
//!   committed and wait for the boundary instead.
//! - `Done`: entered at the `--` terminator; the epilogue is consumed and
//!   ignored.
//!
//! The machine starts in `StreamingBody`: the preamble before the first
//! boundary streams through as an unnamed part and is discarded, as is any
//! part that never carried a `name=` header.
//!
//! `process_contiguous` and `process_segmented` are the fast and slow paths
//! over the same logic; for any same logical input they must produce
//! byte-identical stores.

use formpipe_core::{
    FormError, KeyHash, NO_KEY, OutputBuffer, StoredFile, ValueRange, hash_key,
};

use crate::cursor::SegCursor;
use crate::log::debug;
use crate::parser::{FileMap, ValueMap};
use crate::spill::SpillFile;

/// Parsing phase, per part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Consuming part headers line by line.
    ParsingHeaders,
    /// Consuming part body bytes up to the next boundary.
    StreamingBody,
    /// Terminating boundary seen; the rest of the body is ignored.
    Done,
}

/// Working state of one multipart parse.
#[derive(Debug)]
pub(crate) struct MultipartMachine {
    delimiter: Vec<u8>,
    pub(crate) buffer: OutputBuffer,
    pub(crate) values: ValueMap,
    pub(crate) files: FileMap,
    pub(crate) open_file: Option<SpillFile>,
    key_hash: KeyHash,
    file_name: ValueRange,
    content_type: ValueRange,
    phase: Phase,
}

impl MultipartMachine {
    /// `delimiter` is the full `--boundary` token.
    pub(crate) fn new(delimiter: Vec<u8>, initial_capacity: usize) -> Self {
        Self {
            delimiter,
            buffer: OutputBuffer::with_capacity(initial_capacity),
            values: ValueMap::default(),
            files: FileMap::default(),
            open_file: None,
            key_hash: NO_KEY,
            file_name: ValueRange::UNSET,
            content_type: ValueRange::UNSET,
            phase: Phase::StreamingBody,
        }
    }

    /// Fast path: the whole chunk is one contiguous slice.
    ///
    /// Returns the number of bytes fully consumed; undecided bytes (a
    /// partial header line, a body tail that could still start a boundary)
    /// stay unconsumed for re-delivery.
    pub(crate) fn process_contiguous(
        &mut self,
        span: &[u8],
        is_final: bool,
    ) -> Result<usize, FormError> {
        let mut consumed = 0;
        let mut rest = span;

        loop {
            match self.phase {
                Phase::Done => {
                    consumed += rest.len();
                    break;
                }
                Phase::ParsingHeaders => {
                    let Some(nl) = memchr::memchr(b'\n', rest) else {
                        if is_final && is_terminator(rest) {
                            consumed += rest.len();
                            self.phase = Phase::Done;
                        }
                        break;
                    };
                    let mut line = &rest[..nl];
                    if line.last() == Some(&b'\r') {
                        line = &line[..line.len() - 1];
                    }
                    let advance = nl + 1;
                    if line == b"--" {
                        self.phase = Phase::Done;
                    } else if line.is_empty() && self.key_hash != NO_KEY {
                        self.phase = Phase::StreamingBody;
                        self.open_spill_if_needed()?;
                    } else {
                        self.header_line(line)?;
                    }
                    rest = &rest[advance..];
                    consumed += advance;
                }
                Phase::StreamingBody => {
                    if let Some(at) = memchr::memmem::find(rest, &self.delimiter) {
                        self.finish_part(&rest[..at])?;
                        let advance = at + self.delimiter.len();
                        rest = &rest[advance..];
                        consumed += advance;
                        self.phase = Phase::ParsingHeaders;
                    } else {
                        // Hold back enough for a split boundary plus the
                        // CRLF that may precede it; the rest of an upload
                        // can stream to disk now.
                        let hold = self.delimiter.len() + 2;
                        if let Some(file) = self.open_file.as_mut() {
                            if rest.len() > hold {
                                let safe = rest.len() - hold;
                                file.append(&rest[..safe])?;
                                consumed += safe;
                            }
                        }
                        break;
                    }
                }
            }
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

        loop {
            match self.phase {
                Phase::Done => {
                    pos = cursor.len();
                    break;
                }
                Phase::ParsingHeaders => {
                    let Some(nl) = cursor.find_byte(b'\n', pos) else {
                        if is_final && cursor.len() - pos <= 3 {
                            let tail = cursor.copy_range(pos, cursor.len());
                            if is_terminator(&tail) {
                                pos = cursor.len();
                                self.phase = Phase::Done;
                            }
                        }
                        break;
                    };
                    let mut line_end = nl;
                    if line_end > pos && cursor.byte_at(line_end - 1) == b'\r' {
                        line_end -= 1;
                    }
                    let line = cursor.copy_range(pos, line_end);
                    pos = nl + 1;
                    if line.as_slice() == b"--" {
                        self.phase = Phase::Done;
                    } else if line.is_empty() && self.key_hash != NO_KEY {
                        self.phase = Phase::StreamingBody;
                        self.open_spill_if_needed()?;
                    } else {
                        self.header_line(&line)?;
                    }
                }
                Phase::StreamingBody => {
                    if let Some(at) = cursor.find(&self.delimiter, pos) {
                        self.finish_part_segmented(cursor, pos, at)?;
                        pos = at + self.delimiter.len();
                        self.phase = Phase::ParsingHeaders;
                    } else {
                        let hold = self.delimiter.len() + 2;
                        let available = cursor.len() - pos;
                        if let Some(file) = self.open_file.as_mut() {
                            if available > hold {
                                let safe = available - hold;
                                for slice in cursor.slices(pos, pos + safe) {
                                    file.append(slice)?;
                                }
                                pos += safe;
                            }
                        }
                        break;
                    }
                }
            }
        }

        Ok(pos)
    }

    /// Flush the open spill file, if any.
    pub(crate) fn flush(&mut self) -> Result<(), FormError> {
        if let Some(file) = self.open_file.as_mut() {
            file.flush()?;
        }
        Ok(())
    }

    /// Delete every temp file created so far.
    ///
    /// The pooled buffer goes back on its own when the machine drops.
    pub(crate) fn abort(&mut self) {
        if let Some(file) = self.open_file.take() {
            file.discard();
        }
        for files in self.files.values() {
            for file in files {
                let _ = std::fs::remove_file(file.path());
            }
        }
        self.files.clear();
    }

    /// One part header line, split on `;` into tokens.
    fn header_line(&mut self, line: &[u8]) -> Result<(), FormError> {
        let mut rest = line;
        loop {
            match memchr::memchr(b';', rest) {
                Some(i) => {
                    self.header_token(&rest[..i])?;
                    rest = &rest[i + 1..];
                }
                None => {
                    self.header_token(rest)?;
                    return Ok(());
                }
            }
        }
    }

    /// Match one `;`-separated token against the captured header fields.
    ///
    /// The `name=` value is hashed and never stored; `filename=` and
    /// `Content-Type:` values are copied into the output buffer as ranges.
    /// Unrecognized tokens are ignored.
    fn header_token(&mut self, token: &[u8]) -> Result<(), FormError> {
        let token = trim_byte(token, b' ');
        if token.is_empty() {
            return Ok(());
        }
        if let Some(value) = token.strip_prefix(b"Content-Type:") {
            self.content_type = self.buffer.append(trim_byte(value, b' '))?;
        } else if let Some(value) = token.strip_prefix(b"filename=") {
            self.file_name = self.buffer.append(trim_byte(value, b'"'))?;
        } else if let Some(value) = token.strip_prefix(b"name=") {
            self.key_hash = hash_key(trim_byte(value, b'"'));
        }
        Ok(())
    }

    /// Open the spill file for a part whose headers captured a
    /// content-type, and clear the transient header state so it cannot
    /// leak into the next part.
    fn open_spill_if_needed(&mut self) -> Result<(), FormError> {
        if self.content_type.is_unset() || self.open_file.is_some() {
            return Ok(());
        }
        let file = SpillFile::create()?;
        debug!("multipart upload spills to {}", file.path().display());
        self.files.entry(self.key_hash).or_default().push(StoredFile::new(
            self.file_name,
            self.content_type,
            file.path().to_path_buf(),
        ));
        self.open_file = Some(file);
        self.content_type = ValueRange::UNSET;
        self.file_name = ValueRange::UNSET;
        self.key_hash = NO_KEY;
        Ok(())
    }

    /// A boundary was found: commit the contiguous value before it.
    fn finish_part(&mut self, mut value: &[u8]) -> Result<(), FormError> {
        if value.last() == Some(&b'\n') {
            value = &value[..value.len() - 1];
        }
        if value.last() == Some(&b'\r') {
            value = &value[..value.len() - 1];
        }
        if let Some(mut file) = self.open_file.take() {
            file.append(value)?;
            file.finalize()?;
        } else if self.key_hash != NO_KEY {
            let range = self.buffer.append(value)?;
            self.values.entry(self.key_hash).or_default().push(range);
        }
        self.key_hash = NO_KEY;
        Ok(())
    }

    /// Segment-spanning counterpart of [`finish_part`](Self::finish_part).
    fn finish_part_segmented(
        &mut self,
        cursor: &SegCursor<'_>,
        start: usize,
        mut end: usize,
    ) -> Result<(), FormError> {
        if end > start && cursor.byte_at(end - 1) == b'\n' {
            end -= 1;
        }
        if end > start && cursor.byte_at(end - 1) == b'\r' {
            end -= 1;
        }
        if let Some(mut file) = self.open_file.take() {
            for slice in cursor.slices(start, end) {
                file.append(slice)?;
            }
            file.finalize()?;
        } else if self.key_hash != NO_KEY {
            let slices = cursor.slices(start, end);
            let range = self
                .buffer
                .append_segments(slices.iter().copied(), end - start)?;
            self.values.entry(self.key_hash).or_default().push(range);
        }
        self.key_hash = NO_KEY;
        Ok(())
    }
}

/// A dangling `--` (optionally `--\r`) at end of body terminates the form
/// even without a final newline.
fn is_terminator(mut tail: &[u8]) -> bool {
    if tail.last() == Some(&b'\r') {
        tail = &tail[..tail.len() - 1];
    }
    tail == b"--"
}

/// Strip all leading and trailing occurrences of `b`.
fn trim_byte(mut bytes: &[u8], b: u8) -> &[u8] {
    while let Some((first, rest)) = bytes.split_first() {
        if *first == b {
            bytes = rest;
        } else {
            break;
        }
    }
    while let Some((last, rest)) = bytes.split_last() {
        if *last == b {
            bytes = rest;
        } else {
            break;
        }
    }
    bytes
}
