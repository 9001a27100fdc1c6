//! Unified error type for reelcache.
//!
//! Every crate funnels its failures into [`Error`], which carries enough
//! context for the HTTP layer to derive a status code via
//! [`Error::http_status`].

use std::fmt;
use std::time::Duration;

/// Unified error type covering all failure modes in reelcache.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested entity (library entry, source file) could not be found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g. "movie", "episode", "file").
        entity: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// The request was well-formed HTTP but cannot be satisfied as asked.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A byte range did not fit the resource.
    #[error("Range not satisfiable for resource of {size} bytes")]
    RangeNotSatisfiable {
        /// Size of the resource the range was checked against.
        size: u64,
    },

    /// An external tool (ffmpeg, ffprobe) failed to run or exited non-zero.
    #[error("Tool error [{tool}]: {message}")]
    Tool {
        /// Name of the tool that failed.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// A probe query ran but its output could not be interpreted.
    #[error("Probe error [{query}]: {message}")]
    Probe {
        /// The probe query that failed (e.g. "duration").
        query: String,
        /// Human-readable error description.
        message: String,
    },

    /// A joiner gave up waiting for another caller's generation.
    #[error("Timed out after {waited:?} waiting for generation of {key}")]
    GenerationTimeout {
        /// Cache key being generated.
        key: String,
        /// Total time spent waiting.
        waited: Duration,
    },

    /// The owner of a generation released it without producing output.
    #[error("Generation of {key} failed")]
    GenerationFailed {
        /// Cache key that was being generated.
        key: String,
    },

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Map this error to an appropriate HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::NotFound { .. } => 404,
            Error::InvalidRequest(_) => 400,
            Error::RangeNotSatisfiable { .. } => 416,
            Error::Tool { .. } => 500,
            Error::Probe { .. } => 500,
            Error::GenerationTimeout { .. } => 500,
            Error::GenerationFailed { .. } => 500,
            Error::Io { .. } => 500,
            Error::Internal(_) => 500,
        }
    }

    /// Short machine-readable code for response bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Error::NotFound { .. } => "not_found",
            Error::InvalidRequest(_) => "invalid_request",
            Error::RangeNotSatisfiable { .. } => "range_not_satisfiable",
            Error::Tool { .. } => "tool_error",
            Error::Probe { .. } => "probe_error",
            Error::GenerationTimeout { .. } => "generation_timeout",
            Error::GenerationFailed { .. } => "generation_failed",
            Error::Io { .. } => "io_error",
            Error::Internal(_) => "internal_error",
        }
    }

    /// Convenience constructor for [`Error::NotFound`].
    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        Error::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Convenience constructor for [`Error::InvalidRequest`].
    pub fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidRequest(msg.into())
    }

    /// Convenience constructor for [`Error::Tool`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::Probe`].
    pub fn probe(query: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Probe {
            query: query.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::Internal`].
    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
