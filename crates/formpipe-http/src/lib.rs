//! Incremental form-body parsers.
//!
//! This crate turns an HTTP request body arriving as arbitrarily sized,
//! possibly discontiguous byte chunks into a
//! [`FormDictionary`](formpipe_core::FormDictionary) without ever holding
//! the whole body in memory: small field values accumulate in one pooled
//! buffer, file uploads stream to temp files as their bytes arrive.
//!
//! # Features
//!
//! - Parser selection from the Content-Type header ([`FormKind`])
//! - Multipart header/boundary state machine tolerant of boundaries split
//!   across chunk edges
//! - Url-encoded splitting with in-place percent-decoding and hard
//!   key/value length caps
//! - Matching fast (contiguous) and slow (segmented) code paths
//! - Cooperative cancellation via [`CancelToken`]
//!
//! # Example
//!
//! ```
//! use formpipe_http::{ChunkedSource, FormParser};
//!
//! // The body may arrive in any number of chunks, split anywhere.
//! let mut source = ChunkedSource::new([b"na".to_vec(), b"me=Jane&age=30".to_vec()]);
//! let form = FormParser::from_content_type(None).parse(&mut source).unwrap();
//! assert_eq!(form.get(b"age").first(), Some(&&b"30"[..]));
//! ```

#![deny(unsafe_code)]

mod content_type;
mod cursor;
mod log;
mod multipart;
mod parser;
mod source;
mod spill;
mod urlencoded;

pub use content_type::FormKind;
pub use parser::{FormParser, parse_form};
pub use source::{BodyChunk, BodySource, BytesSource, CancelToken, ChunkedSource, SegmentedSource};
pub use urlencoded::{KEY_LENGTH_LIMIT, VALUE_LENGTH_LIMIT};
