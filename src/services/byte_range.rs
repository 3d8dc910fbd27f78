//! HTTP byte-range protocol support.
//!
//! Parses a `Range: bytes=<start>-<end>` request header against a known
//! object size and yields the inclusive span a partial-content response must
//! serve. Single-span requests only; multipart ranges are rejected.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RangeError {
    #[error("malformed range header `{0}`")]
    Malformed(String),
    #[error("range start {start} is not satisfiable for size {total_size}")]
    Unsatisfiable { start: u64, total_size: u64 },
}

/// One serviceable byte span. Invariant: `start <= end <= total_size - 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
    pub total_size: u64,
}

impl ByteRange {
    /// Parse a range header against the object's total size.
    ///
    /// The start offset is mandatory. A missing end means "serve to end of
    /// object"; an end past the object is clamped to the last byte. A start
    /// at or past the object (or any range against an empty object) is
    /// unsatisfiable rather than malformed, so the caller can answer 416
    /// with the proper `Content-Range: bytes */{size}` form.
    pub fn parse(header: &str, total_size: u64) -> Result<Self, RangeError> {
        let malformed = || RangeError::Malformed(header.to_string());

        let spec = header.strip_prefix("bytes=").ok_or_else(malformed)?;
        let (raw_start, raw_end) = spec.split_once('-').ok_or_else(malformed)?;

        let start: u64 = raw_start.trim().parse().map_err(|_| malformed())?;

        if total_size == 0 || start >= total_size {
            return Err(RangeError::Unsatisfiable { start, total_size });
        }

        let end = match raw_end.trim() {
            "" => total_size - 1,
            raw => {
                let end: u64 = raw.parse().map_err(|_| malformed())?;
                end.min(total_size - 1)
            }
        };

        if start > end {
            return Err(RangeError::Unsatisfiable { start, total_size });
        }

        Ok(Self {
            start,
            end,
            total_size,
        })
    }

    /// Value for the `Content-Length` response header.
    pub fn content_length(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Value for the `Content-Range` response header.
    pub fn content_range(&self) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, self.total_size)
    }
}
