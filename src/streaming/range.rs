//! `Range` and conditional-request evaluation.
//!
//! Pure functions over header values and file metadata; the response
//! building lives in the parent module.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// What a `Range` header asks for, resolved against a file size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeRequest {
    /// No `Range` header: the whole file.
    Full,
    /// An inclusive byte window that fits the file.
    Partial {
        /// First byte.
        start: u64,
        /// Last byte, inclusive.
        end: u64,
    },
    /// The header was present but cannot be served.
    Unsatisfiable,
}

impl RangeRequest {
    /// Bytes the response body carries.
    pub fn len(&self, size: u64) -> u64 {
        match *self {
            RangeRequest::Full => size,
            RangeRequest::Partial { start, end } => end - start + 1,
            RangeRequest::Unsatisfiable => 0,
        }
    }

    /// Whether the response body is empty.
    pub fn is_empty(&self, size: u64) -> bool {
        self.len(size) == 0
    }
}

fn parse_position(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// Resolve a `Range` header value against a file of `size` bytes.
///
/// Accepts a single `bytes=start-end`, `bytes=start-` or `bytes=-suffix`.
/// Everything else (another unit, several ranges, reversed or out-of-bounds
/// positions, a zero-length suffix, any range on an empty file) is
/// unsatisfiable.
pub fn parse_range(header: Option<&str>, size: u64) -> RangeRequest {
    let Some(value) = header else {
        return RangeRequest::Full;
    };
    resolve(value.trim(), size).unwrap_or(RangeRequest::Unsatisfiable)
}

fn resolve(value: &str, size: u64) -> Option<RangeRequest> {
    let spec = value.strip_prefix("bytes=")?;
    if spec.contains(',') || size == 0 {
        return None;
    }
    let (start, end) = spec.split_once('-')?;
    let (start, end) = (start.trim(), end.trim());

    let (start, end) = match (start.is_empty(), end.is_empty()) {
        // bytes=-N: the last N bytes.
        (true, false) => {
            let suffix = parse_position(end)?;
            if suffix == 0 {
                return None;
            }
            (size - suffix.min(size), size - 1)
        }
        // bytes=N-: from N to the end.
        (false, true) => (parse_position(start)?, size - 1),
        (false, false) => (parse_position(start)?, parse_position(end)?),
        (true, true) => return None,
    };

    if start > end || end >= size {
        return None;
    }
    Some(RangeRequest::Partial { start, end })
}

/// Strong validator derived from size and modification time.
pub fn etag_for(size: u64, modified: Option<SystemTime>) -> String {
    let secs = modified
        .and_then(|m| m.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0);
    format!("\"{size:x}-{secs:x}\"")
}

/// Whether `If-None-Match` matches `etag`.
///
/// Accepts `*` or a comma-separated list; weak tags compare by value.
pub fn if_none_match(header: &str, etag: &str) -> bool {
    header.split(',').map(str::trim).any(|candidate| {
        candidate == "*" || candidate.strip_prefix("W/").unwrap_or(candidate) == etag
    })
}

/// Whether the resource is unmodified since an `If-Modified-Since` date.
pub fn not_modified_since(header: &str, modified: SystemTime) -> bool {
    let Ok(since) = httpdate::parse_http_date(header.trim()) else {
        return false;
    };
    // HTTP dates have one-second resolution.
    let modified_secs = modified
        .duration_since(UNIX_EPOCH)
        .map(|d| Duration::from_secs(d.as_secs()))
        .unwrap_or_default();
    UNIX_EPOCH + modified_secs <= since
}

/// Evaluate conditional headers. `If-None-Match` takes precedence; when it is
/// present `If-Modified-Since` is ignored.
pub fn is_not_modified(
    if_none_match_header: Option<&str>,
    if_modified_since_header: Option<&str>,
    etag: &str,
    modified: Option<SystemTime>,
) -> bool {
    if let Some(inm) = if_none_match_header {
        return if_none_match(inm, etag);
    }
    match (if_modified_since_header, modified) {
        (Some(ims), Some(modified)) => not_modified_since(ims, modified),
        _ => false,
    }
}
