//! Streaming form-body parsing with a pooled, hash-indexed value store.
//!
//! formpipe turns an HTTP request body (`multipart/form-data` or
//! `application/x-www-form-urlencoded`) into a queryable [`FormDictionary`]
//! by parsing incrementally over an unbounded sequence of arbitrarily sized
//! byte chunks:
//!
//! - **No per-field allocation**: decoded values land in one pooled buffer
//!   addressed by offset ranges
//! - **Split-tolerant**: boundary delimiters and header lines may straddle
//!   chunk edges, and chunks may span discontiguous memory regions
//! - **Disk spill**: file uploads stream straight to temp files instead of
//!   the in-memory buffer
//! - **Hash-indexed lookups**: keys are 64-bit hashes; the key bytes are
//!   never stored
//!
//! # Quick Start
//!
//! ```
//! use formpipe::{BytesSource, FormParser};
//!
//! let body = b"name=Jane&age=30".to_vec();
//! let form = FormParser::from_content_type(Some("application/x-www-form-urlencoded"))
//!     .parse(&mut BytesSource::new(body))
//!     .unwrap();
//!
//! assert_eq!(form.get(b"name").first(), Some(&&b"Jane"[..]));
//! assert_eq!(form.get(b"age").first(), Some(&&b"30"[..]));
//! // Dropping the form returns the pooled buffer and deletes temp files.
//! ```
//!
//! # Crate Structure
//!
//! - [`formpipe_core`]: value store, pooled buffer, key hashing
//! - [`formpipe_http`]: the incremental multipart/url-encoded parsers

#![forbid(unsafe_code)]

// Re-export crates
pub use formpipe_core as core;
pub use formpipe_http as http;

// Re-export commonly used types
pub use formpipe_core::{
    FormDictionary, FormError, FormFile, KeyHash, OutputBuffer, ValueRange, Values, hash_key,
};
pub use formpipe_http::{
    BodyChunk, BodySource, BytesSource, CancelToken, ChunkedSource, FormKind, FormParser,
    KEY_LENGTH_LIMIT, SegmentedSource, VALUE_LENGTH_LIMIT, parse_form,
};
