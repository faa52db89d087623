//! The incremental drive loop.
//!
//! [`FormParser`] picks the multipart or url-encoded machine once from the
//! Content-Type header, then runs one loop over the byte source: check
//! cancellation, read a chunk, process as much as is unambiguous, flush any
//! open spill file, tell the source exactly how much was consumed, repeat
//! until the source reports completion. Completion with undecided bytes
//! left over is the fatal "end of body before form was fully parsed"
//! condition.
//!
//! Every exit path settles resources: the pooled buffer rides back to its
//! pool with the machine (or inside the returned store), and on error every
//! temp file created so far is deleted before the error surfaces.
//!
//! # Example
//!
//! ```
//! use formpipe_http::{BytesSource, FormParser};
//!
//! let mut source = BytesSource::new(b"name=Jane&age=30".to_vec());
//! let form = FormParser::from_content_type(Some("application/x-www-form-urlencoded"))
//!     .parse(&mut source)
//!     .unwrap();
//! assert_eq!(form.get(b"name").first(), Some(&&b"Jane"[..]));
//! ```

use formpipe_core::{
    DEFAULT_BUFFER_CAPACITY, FormDictionary, FormError, KeyMap, StoredFile, ValueRange, Values,
};

use crate::content_type::FormKind;
use crate::cursor::SegCursor;
use crate::log::debug;
use crate::multipart::MultipartMachine;
use crate::source::{BodyChunk, BodySource, CancelToken};
use crate::urlencoded::UrlEncodedMachine;

pub(crate) type ValueMap = KeyMap<Values<ValueRange>>;
pub(crate) type FileMap = KeyMap<Values<StoredFile>>;

/// Configured entry point for parsing one request body.
///
/// The parser variant is chosen once up front from the Content-Type header;
/// the same `FormParser` can drive any number of sources.
#[derive(Debug, Clone)]
pub struct FormParser {
    kind: FormKind,
    cancel: CancelToken,
    length_hint: Option<u64>,
}

impl FormParser {
    /// Choose the parser variant from a request's Content-Type header.
    #[must_use]
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        Self::new(FormKind::from_content_type(content_type))
    }

    /// Build a parser for an already determined variant.
    #[must_use]
    pub fn new(kind: FormKind) -> Self {
        Self {
            kind,
            cancel: CancelToken::new(),
            length_hint: None,
        }
    }

    /// Attach a cancellation token, checked once per drive-loop iteration.
    #[must_use]
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Size the first buffer rent from the declared body length.
    #[must_use]
    pub fn with_length_hint(mut self, length: u64) -> Self {
        self.length_hint = Some(length);
        self
    }

    /// The chosen parser variant.
    #[must_use]
    pub fn kind(&self) -> &FormKind {
        &self.kind
    }

    /// Drive `source` to completion and build the value store.
    ///
    /// # Errors
    ///
    /// Any [`FormError`] is fatal for the whole parse; buffers and temp
    /// files created along the way are released before it is returned.
    pub fn parse<S: BodySource>(&self, source: &mut S) -> Result<FormDictionary, FormError> {
        let capacity = self.initial_capacity();
        match &self.kind {
            FormKind::Multipart { delimiter } => {
                debug!("parsing multipart body");
                drive(
                    source,
                    &self.cancel,
                    MultipartMachine::new(delimiter.clone(), capacity),
                )
            }
            FormKind::UrlEncoded => {
                debug!("parsing url-encoded body");
                drive(source, &self.cancel, UrlEncodedMachine::new(capacity))
            }
        }
    }

    fn initial_capacity(&self) -> usize {
        let default = DEFAULT_BUFFER_CAPACITY as u64;
        usize::try_from(self.length_hint.map_or(default, |hint| hint.min(default)))
            .unwrap_or(DEFAULT_BUFFER_CAPACITY)
    }
}

/// Parse one body with default settings.
pub fn parse_form<S: BodySource>(
    source: &mut S,
    content_type: Option<&str>,
) -> Result<FormDictionary, FormError> {
    FormParser::from_content_type(content_type).parse(source)
}

/// What the drive loop needs from a parsing machine.
trait Machine {
    /// Consume as much of `chunk` as is unambiguous; return the count.
    fn process(&mut self, chunk: &BodyChunk<'_>, is_final: bool) -> Result<usize, FormError>;
    /// Per-chunk settling point (spill-file flush).
    fn flush(&mut self) -> Result<(), FormError>;
    /// Delete temp files after a failed parse.
    fn abort(&mut self);
    /// Freeze the working maps into the final store.
    fn finish(self) -> FormDictionary;
}

fn drive<S: BodySource, M: Machine>(
    source: &mut S,
    cancel: &CancelToken,
    mut machine: M,
) -> Result<FormDictionary, FormError> {
    match run_loop(source, cancel, &mut machine) {
        Ok(()) => Ok(machine.finish()),
        Err(e) => {
            machine.abort();
            Err(e)
        }
    }
}

fn run_loop<S: BodySource, M: Machine>(
    source: &mut S,
    cancel: &CancelToken,
    machine: &mut M,
) -> Result<(), FormError> {
    loop {
        if cancel.is_cancelled() {
            return Err(FormError::Cancelled);
        }

        let (consumed, remaining, is_final) = {
            let chunk = source.read()?;
            if cancel.is_cancelled() {
                return Err(FormError::Cancelled);
            }
            let is_final = chunk.is_complete();
            let total = chunk.len();
            let consumed = if total == 0 {
                0
            } else {
                machine.process(&chunk, is_final)?
            };
            (consumed, total - consumed, is_final)
        };

        machine.flush()?;
        source.consume(consumed);

        if is_final {
            if remaining > 0 {
                return Err(FormError::UnexpectedEndOfBody);
            }
            return Ok(());
        }
    }
}

impl Machine for MultipartMachine {
    fn process(&mut self, chunk: &BodyChunk<'_>, is_final: bool) -> Result<usize, FormError> {
        match chunk.as_contiguous() {
            Some(span) => self.process_contiguous(span, is_final),
            None => self.process_segmented(&SegCursor::new(chunk.segments()), is_final),
        }
    }

    fn flush(&mut self) -> Result<(), FormError> {
        MultipartMachine::flush(self)
    }

    fn abort(&mut self) {
        MultipartMachine::abort(self);
    }

    fn finish(mut self) -> FormDictionary {
        // A file part whose body never arrived leaves a zero-byte spill
        // file behind; close it and let the lookup-side check hide it.
        if let Some(file) = self.open_file.take() {
            let _ = file.finalize();
        }
        if self.values.is_empty() && self.files.is_empty() {
            return FormDictionary::empty();
        }
        debug!(
            "multipart form parsed: {} value keys, {} file keys",
            self.values.len(),
            self.files.len()
        );
        FormDictionary::from_parts(
            self.buffer,
            std::mem::take(&mut self.values),
            std::mem::take(&mut self.files),
        )
    }
}

impl Machine for UrlEncodedMachine {
    fn process(&mut self, chunk: &BodyChunk<'_>, is_final: bool) -> Result<usize, FormError> {
        match chunk.as_contiguous() {
            Some(span) => self.process_contiguous(span, is_final),
            None => self.process_segmented(&SegCursor::new(chunk.segments()), is_final),
        }
    }

    fn flush(&mut self) -> Result<(), FormError> {
        Ok(())
    }

    fn abort(&mut self) {}

    fn finish(self) -> FormDictionary {
        if self.values.is_empty() {
            return FormDictionary::empty();
        }
        debug!("url-encoded form parsed: {} keys", self.values.len());
        FormDictionary::from_parts(self.buffer, self.values, FileMap::default())
    }
}
