//! File streaming with byte ranges and conditional requests.
//!
//! [`serve_file`] is the single place a file on disk becomes an HTTP
//! response, whether it is a library source or a cached derivative.

pub mod range;

use std::path::Path;

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use reelcache_common::{Error, Result};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;

pub use range::{etag_for, is_not_modified, parse_range, RangeRequest};

/// Read size for streamed bodies.
const CHUNK_SIZE: usize = 64 * 1024;

/// 416 with the `bytes */size` form of `Content-Range` and no body.
pub fn range_not_satisfiable(size: u64) -> Response {
    (
        StatusCode::RANGE_NOT_SATISFIABLE,
        [(header::CONTENT_RANGE, format!("bytes */{size}"))],
        Body::empty(),
    )
        .into_response()
}

fn header_str<'a>(headers: &'a HeaderMap, name: header::HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

async fn open(path: &Path) -> Result<tokio::fs::File> {
    tokio::fs::File::open(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => Error::not_found("file", path.display()),
        _ => e.into(),
    })
}

/// Serve `path` honoring `Range`, `If-None-Match` and `If-Modified-Since`.
///
/// # Errors
///
/// - [`Error::NotFound`] if the file does not exist.
/// - [`Error::Io`] if it cannot be read or seeked.
///
/// Once headers are sent, a read failure simply ends the body early.
pub async fn serve_file(path: &Path, content_type: &str, headers: &HeaderMap) -> Result<Response> {
    let metadata = tokio::fs::metadata(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => Error::not_found("file", path.display()),
        _ => e.into(),
    })?;

    let size = metadata.len();
    let modified = metadata.modified().ok();
    let etag = etag_for(size, modified);

    let mut validators = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&etag) {
        validators.insert(header::ETAG, value);
    }
    if let Some(modified) = modified {
        if let Ok(value) = HeaderValue::from_str(&httpdate::fmt_http_date(modified)) {
            validators.insert(header::LAST_MODIFIED, value);
        }
    }

    if is_not_modified(
        header_str(headers, header::IF_NONE_MATCH),
        header_str(headers, header::IF_MODIFIED_SINCE),
        &etag,
        modified,
    ) {
        return Ok((StatusCode::NOT_MODIFIED, validators, Body::empty()).into_response());
    }

    let request = parse_range(header_str(headers, header::RANGE), size);
    tracing::trace!(path = %path.display(), size, ?request, "Serving file");

    match request {
        RangeRequest::Unsatisfiable => Ok(range_not_satisfiable(size)),
        RangeRequest::Full => {
            let file = open(path).await?;
            let body = Body::from_stream(ReaderStream::with_capacity(file, CHUNK_SIZE));
            Ok((
                StatusCode::OK,
                validators,
                [
                    (header::CONTENT_TYPE, content_type.to_string()),
                    (header::CONTENT_LENGTH, size.to_string()),
                    (header::ACCEPT_RANGES, "bytes".to_string()),
                ],
                body,
            )
                .into_response())
        }
        RangeRequest::Partial { start, end } => {
            let length = end - start + 1;
            let mut file = open(path).await?;
            file.seek(std::io::SeekFrom::Start(start)).await?;

            // Take limits reads to exactly the requested window.
            let limited = file.take(length);
            let body = Body::from_stream(ReaderStream::with_capacity(limited, CHUNK_SIZE));
            Ok((
                StatusCode::PARTIAL_CONTENT,
                validators,
                [
                    (header::CONTENT_TYPE, content_type.to_string()),
                    (header::CONTENT_RANGE, format!("bytes {start}-{end}/{size}")),
                    (header::CONTENT_LENGTH, length.to_string()),
                    (header::ACCEPT_RANGES, "bytes".to_string()),
                ],
                body,
            )
                .into_response())
        }
    }
}
