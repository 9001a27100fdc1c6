//! reelcache-common: shared types and utilities.
//!
//! This crate provides functionality used across reelcache:
//!
//! - **Error Handling**: the unified [`Error`] type and its HTTP status mapping
//! - **Core Types**: audio tracks, audio-track selectors, library queries, clip windows
//! - **Path Utilities**: video-file detection and MIME type guessing by extension
//!
//! # Examples
//!
//! ```
//! use reelcache_common::{AudioSelector, Error, Result};
//! use reelcache_common::paths::is_video_file;
//! use std::path::Path;
//!
//! let selector: AudioSelector = "max".parse().unwrap();
//! assert_eq!(selector, AudioSelector::Max);
//!
//! assert!(is_video_file(Path::new("movie.mkv")));
//!
//! fn example() -> Result<()> {
//!     Err(Error::not_found("movie", "Alien"))
//! }
//! assert_eq!(example().unwrap_err().http_status(), 404);
//! ```

pub mod error;
pub mod paths;
pub mod types;

pub use error::{Error, Result};
pub use types::*;
