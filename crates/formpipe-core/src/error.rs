//! Error types shared by the form-body parsers.
//!
//! All parse failures are fatal: the drive loop surfaces the first error to
//! the caller and releases every rented buffer and temp file on the way out.
//! Waiting for more data is *not* an error and never appears here.

/// Errors that can occur while parsing a form body.
#[derive(Debug)]
pub enum FormError {
    /// The byte source reported completion while undecided bytes remained.
    UnexpectedEndOfBody,
    /// A form key exceeded the fixed key length limit.
    KeyTooLong {
        /// Observed (raw, still encoded) key length.
        len: usize,
        /// The fixed limit.
        max: usize,
    },
    /// A form value exceeded the fixed value length limit.
    ValueTooLong {
        /// Observed (raw, still encoded) value length.
        len: usize,
        /// The fixed limit.
        max: usize,
    },
    /// A percent-encoded key or value contained an invalid escape sequence.
    InvalidEncoding,
    /// The pooled output buffer would have to grow past its hard cap.
    BufferOverflow {
        /// Bytes the buffer would need to hold.
        needed: usize,
        /// The hard cap.
        max: usize,
    },
    /// An I/O error from the byte source or a spill file.
    Io(std::io::Error),
    /// The caller's cancel token was triggered.
    Cancelled,
}

impl std::fmt::Display for FormError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnexpectedEndOfBody => {
                write!(f, "end of body before form was fully parsed")
            }
            Self::KeyTooLong { len, max } => {
                write!(f, "form key too long: {len} bytes exceeds limit of {max}")
            }
            Self::ValueTooLong { len, max } => {
                write!(f, "form value too long: {len} bytes exceeds limit of {max}")
            }
            Self::InvalidEncoding => write!(f, "form value contains invalid characters"),
            Self::BufferOverflow { needed, max } => {
                write!(
                    f,
                    "form buffer overflow: {needed} bytes exceeds limit of {max}"
                )
            }
            Self::Io(e) => write!(f, "form I/O error: {e}"),
            Self::Cancelled => write!(f, "form parsing was cancelled"),
        }
    }
}

impl std::error::Error for FormError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for FormError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_contract_wording() {
        assert_eq!(
            FormError::UnexpectedEndOfBody.to_string(),
            "end of body before form was fully parsed"
        );
        assert_eq!(
            FormError::KeyTooLong { len: 3000, max: 2048 }.to_string(),
            "form key too long: 3000 bytes exceeds limit of 2048"
        );
        assert_eq!(
            FormError::InvalidEncoding.to_string(),
            "form value contains invalid characters"
        );
    }

    #[test]
    fn io_errors_keep_their_source() {
        let err = FormError::from(std::io::Error::other("disk gone"));
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.to_string().contains("disk gone"));
    }
}
