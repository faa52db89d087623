//! Value store and buffer primitives for formpipe.
//!
//! This crate provides the building blocks the body parsers assemble their
//! result from:
//! - [`OutputBuffer`]: one pooled, growable byte buffer per parse, addressed
//!   by [`ValueRange`] offset pairs
//! - [`Values`]: a multi-value container that stays inline for the common
//!   one-value-per-key case
//! - [`hash_key`]: the 64-bit key hash used as dictionary identity
//! - [`FormDictionary`]: the immutable, disposable parse result
//!
//! # Design Principles
//!
//! - No per-field allocation on the common path
//! - Ranges into one buffer, never independent allocations
//! - Read access is shared-safe; disposal is single-owner

#![forbid(unsafe_code)]

mod buffer;
mod error;
mod form;
mod hash;
mod values;

pub use buffer::{DEFAULT_BUFFER_CAPACITY, MAX_BUFFER_SIZE, OutputBuffer, ValueRange};
pub use error::FormError;
pub use form::{FormDictionary, FormFile, KeyMap, StoredFile};
pub use hash::{KeyHash, NO_KEY, hash_key};
pub use values::Values;
