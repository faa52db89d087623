//! Temp-file spill for uploaded file parts.
//!
//! File part bodies bypass the pooled output buffer and stream straight to
//! a freshly created temp file, one unique path per part. Writes are plain
//! blocking writes issued from the drive loop; the loop already yields only
//! at the chunk-read boundary, so this is acceptable there, but it does
//! serialize disk latency into the parse under concurrent load.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static SPILL_COUNTER: AtomicU64 = AtomicU64::new(1);

/// An open spill file for the part currently being streamed.
#[derive(Debug)]
pub(crate) struct SpillFile {
    path: PathBuf,
    file: File,
}

impl SpillFile {
    /// Create a new uniquely named temp file.
    ///
    /// Paths are never reused across parts; collisions with leftovers from
    /// other processes are handled by retrying with a fresh counter value.
    pub(crate) fn create() -> io::Result<Self> {
        let temp_dir = std::env::temp_dir();
        let ts_nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();

        for _ in 0..32 {
            let counter = SPILL_COUNTER.fetch_add(1, Ordering::Relaxed);
            let candidate = temp_dir.join(format!(
                "formpipe-upload-{}-{ts_nanos}-{counter}.tmp",
                std::process::id()
            ));

            match OpenOptions::new()
                .create_new(true)
                .write(true)
                .open(&candidate)
            {
                Ok(file) => {
                    return Ok(Self {
                        path: candidate,
                        file,
                    });
                }
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {}
                Err(err) => return Err(err),
            }
        }

        Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            "failed to allocate unique spill file",
        ))
    }

    /// Path of the temp file.
    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Append part bytes.
    pub(crate) fn append(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.file.write_all(bytes)
    }

    /// Flush buffered writes to the OS.
    pub(crate) fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }

    /// Flush and close, keeping the file on disk.
    pub(crate) fn finalize(mut self) -> io::Result<()> {
        self.file.flush()
    }

    /// Close and delete the file.
    pub(crate) fn discard(self) {
        let path = self.path.clone();
        drop(self);
        let _ = std::fs::remove_file(path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_append_finalize() {
        let mut spill = SpillFile::create().unwrap();
        let path = spill.path().to_path_buf();
        assert!(path.exists());
        spill.append(b"abc").unwrap();
        spill.append(b"def").unwrap();
        spill.finalize().unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"abcdef");
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn paths_are_unique() {
        let a = SpillFile::create().unwrap();
        let b = SpillFile::create().unwrap();
        assert_ne!(a.path(), b.path());
        let (pa, pb) = (a.path().to_path_buf(), b.path().to_path_buf());
        a.discard();
        b.discard();
        assert!(!pa.exists());
        assert!(!pb.exists());
    }

    #[test]
    fn discard_removes_the_file() {
        let spill = SpillFile::create().unwrap();
        let path = spill.path().to_path_buf();
        spill.discard();
        assert!(!path.exists());
    }
}
