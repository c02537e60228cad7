//! `Range` request header parsing.

use thiserror::Error;

/// One satisfiable byte range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub length: u64,
}

impl ByteRange {
    /// Inclusive last byte offset.
    pub fn end(&self) -> u64 {
        self.start + self.length - 1
    }

    /// `Content-Range` value for an object of `size` bytes.
    pub fn content_range(&self, size: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end(), size)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangeError {
    #[error("malformed range header: {0}")]
    Malformed(String),

    #[error("no requested range overlaps the {size}-byte object")]
    NotSatisfiable { size: u64 },
}

/// Parse a `Range` header against an object of `size` bytes.
///
/// An empty header yields no ranges. Ranges starting past the end are
/// dropped; if that leaves nothing, the request is not satisfiable. Ends are
/// clamped to the object size, and `bytes=-N` selects the last `N` bytes.
pub fn parse_range(header: &str, size: u64) -> Result<Vec<ByteRange>, RangeError> {
    if header.is_empty() {
        return Ok(Vec::new());
    }

    let malformed = || RangeError::Malformed(header.to_string());
    let spec = header.strip_prefix("bytes=").ok_or_else(malformed)?;

    let mut ranges = Vec::new();
    let mut no_overlap = false;

    for part in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (start, end) = part.split_once('-').ok_or_else(malformed)?;
        let (start, end) = (start.trim(), end.trim());

        if start.is_empty() {
            // Suffix range: the last `end` bytes.
            let suffix: u64 = end.parse().map_err(|_| malformed())?;
            let suffix = suffix.min(size);
            if suffix == 0 {
                no_overlap = true;
                continue;
            }
            ranges.push(ByteRange {
                start: size - suffix,
                length: suffix,
            });
            continue;
        }

        let start: u64 = start.parse().map_err(|_| malformed())?;
        if start >= size {
            no_overlap = true;
            continue;
        }

        let length = if end.is_empty() {
            size - start
        } else {
            let end: u64 = end.parse().map_err(|_| malformed())?;
            if start > end {
                return Err(malformed());
            }
            end.min(size - 1) - start + 1
        };

        ranges.push(ByteRange { start, length });
    }

    if no_overlap && ranges.is_empty() {
        return Err(RangeError::NotSatisfiable { size });
    }
    Ok(ranges)
}
