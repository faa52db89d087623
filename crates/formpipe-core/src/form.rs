//! The finished form value store.
//!
//! [`FormDictionary`] is the immutable result of one body parse: a pooled
//! byte buffer holding every decoded value, plus two hash-keyed maps, one
//! from key hash to value ranges and one from key hash to uploaded files. Read
//! access never mutates the store, so a constructed dictionary can be shared
//! across threads; dropping it is single-owner and releases the buffer back
//! to the pool and deletes every temp file it created.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use fnv::FnvHashMap;

use crate::buffer::{OutputBuffer, ValueRange};
use crate::hash::{KeyHash, hash_key};
use crate::values::Values;

/// Map keyed by precomputed key hashes.
pub type KeyMap<V> = FnvHashMap<KeyHash, V>;

/// An uploaded file as recorded by the parser: header ranges plus the temp
/// file the body was spilled to.
#[derive(Debug)]
pub struct StoredFile {
    file_name: ValueRange,
    content_type: ValueRange,
    path: PathBuf,
}

impl StoredFile {
    /// Record a spilled file.
    #[must_use]
    pub fn new(file_name: ValueRange, content_type: ValueRange, path: PathBuf) -> Self {
        Self {
            file_name,
            content_type,
            path,
        }
    }

    /// Path of the temp file backing this upload.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Buffer range of the `filename=` header value.
    #[must_use]
    pub fn file_name_range(&self) -> ValueRange {
        self.file_name
    }

    /// Buffer range of the `Content-Type:` header value.
    #[must_use]
    pub fn content_type_range(&self) -> ValueRange {
        self.content_type
    }
}

/// An uploaded file exposed to lookups.
///
/// Borrows its metadata from the owning [`FormDictionary`]; the temp file
/// itself stays on disk until the dictionary is dropped.
#[derive(Debug, Clone, Copy)]
pub struct FormFile<'a> {
    file_name: &'a [u8],
    content_type: &'a [u8],
    path: &'a Path,
    len: u64,
}

impl<'a> FormFile<'a> {
    /// The `filename=` header value.
    #[must_use]
    pub fn file_name(&self) -> &'a [u8] {
        self.file_name
    }

    /// The part's `Content-Type:` header value.
    #[must_use]
    pub fn content_type(&self) -> &'a [u8] {
        self.content_type
    }

    /// File size in bytes, as observed when the lookup was made.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Returns true for a zero-length upload.
    ///
    /// Lookups already skip zero-length files, so this is false for every
    /// file a lookup hands out.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Path of the backing temp file.
    #[must_use]
    pub fn path(&self) -> &'a Path {
        self.path
    }

    /// Open the upload for reading.
    pub fn open(&self) -> std::io::Result<File> {
        File::open(self.path)
    }
}

/// Immutable, disposable result of parsing a form body.
///
/// # Example
///
/// ```
/// use formpipe_core::FormDictionary;
///
/// let form = FormDictionary::empty();
/// assert_eq!(form.len(), 0);
/// assert!(form.get(b"anything").is_empty());
/// ```
#[derive(Debug)]
pub struct FormDictionary {
    buffer: OutputBuffer,
    values: KeyMap<Values<ValueRange>>,
    files: KeyMap<Values<StoredFile>>,
}

impl FormDictionary {
    /// The store for a body that produced nothing.
    ///
    /// Holds no pooled storage, so constructing and dropping it is free and
    /// touches no temp files.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            buffer: OutputBuffer::empty(),
            values: KeyMap::default(),
            files: KeyMap::default(),
        }
    }

    /// Assemble a store from parser output.
    #[must_use]
    pub fn from_parts(
        buffer: OutputBuffer,
        values: KeyMap<Values<ValueRange>>,
        files: KeyMap<Values<StoredFile>>,
    ) -> Self {
        Self {
            buffer,
            values,
            files,
        }
    }

    /// Number of distinct keys (value keys plus file keys).
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len() + self.files.len()
    }

    /// Returns true if the parse produced no fields and no files.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.files.is_empty()
    }

    /// All values stored under `key`, in arrival order.
    ///
    /// Returns an empty collection for unknown keys. The returned slices
    /// borrow the store's buffer.
    #[must_use]
    pub fn get(&self, key: &[u8]) -> Values<&[u8]> {
        let mut out = Values::new();
        if let Some(ranges) = self.values.get(&hash_key(key)) {
            for range in ranges {
                out.push(self.buffer.slice(*range));
            }
        }
        out
    }

    /// All uploads stored under `key`, in arrival order.
    ///
    /// A recorded upload whose temp file has vanished or is zero-length is
    /// skipped: a part can open its spill file and then hit an error before
    /// any body byte arrives, and such husks must not surface downstream.
    #[must_use]
    pub fn get_files(&self, key: &[u8]) -> Values<FormFile<'_>> {
        let mut out = Values::new();
        if let Some(files) = self.files.get(&hash_key(key)) {
            for file in files {
                let len = match fs::metadata(&file.path) {
                    Ok(meta) if meta.len() > 0 => meta.len(),
                    _ => continue,
                };
                out.push(FormFile {
                    file_name: self.buffer.slice(file.file_name),
                    content_type: self.buffer.slice(file.content_type),
                    path: &file.path,
                    len,
                });
            }
        }
        out
    }
}

impl Drop for FormDictionary {
    fn drop(&mut self) {
        for files in self.files.values() {
            for file in files {
                let _ = fs::remove_file(&file.path);
            }
        }
        // The buffer's own drop returns the pooled storage.
    }
}
