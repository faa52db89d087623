//! Parser selection from the Content-Type header.
//!
//! A body is parsed as multipart only when the header names
//! `multipart/form-data` (ASCII case-insensitive) and carries a non-empty
//! `boundary=` parameter; everything else, including a missing header, is
//! treated as `application/x-www-form-urlencoded`.

/// Which parser handles the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormKind {
    /// Multipart parsing with the full `--boundary` delimiter bytes.
    Multipart {
        /// `--` followed by the boundary parameter value.
        delimiter: Vec<u8>,
    },
    /// Flat `key=value&...` parsing.
    UrlEncoded,
}

impl FormKind {
    /// Pick the parser for a request's Content-Type header.
    #[must_use]
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        match content_type.and_then(extract_boundary) {
            Some(boundary) => {
                let mut delimiter = Vec::with_capacity(boundary.len() + 2);
                delimiter.extend_from_slice(b"--");
                delimiter.extend_from_slice(boundary.as_bytes());
                Self::Multipart { delimiter }
            }
            None => Self::UrlEncoded,
        }
    }

    /// Returns true for the multipart variant.
    #[must_use]
    pub fn is_multipart(&self) -> bool {
        matches!(self, Self::Multipart { .. })
    }
}

/// Extract the boundary parameter from a `multipart/form-data` header.
///
/// The media type is matched case-insensitively anywhere in the header; the
/// `boundary=` token itself is matched case-sensitively after it. The value
/// runs to the next `;` or the end of the header, with surrounding quotes
/// stripped. Returns `None` (url-encoded fallback) when either piece is
/// missing or the boundary is empty.
fn extract_boundary(content_type: &str) -> Option<&str> {
    const MULTIPART: &str = "multipart/form-data";
    const BOUNDARY: &str = "boundary=";

    let lower = content_type.to_ascii_lowercase();
    let multipart_end = lower.find(MULTIPART)? + MULTIPART.len();
    let params = &content_type[multipart_end..];

    let boundary_start = params.find(BOUNDARY)? + BOUNDARY.len();
    let mut value = &params[boundary_start..];
    if let Some(end) = value.find(';') {
        value = &value[..end];
    }
    let value = value.trim().trim_matches('"');
    if value.is_empty() { None } else { Some(value) }
}
