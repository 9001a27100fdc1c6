//! reelcache - on-demand media transcoding and caching
//!
//! Serves library titles over HTTP with byte ranges and conditional requests,
//! re-encoding on first access when a request needs a different codec or
//! audio layout, and caching the result so later requests stream from disk.

pub mod cache;
pub mod config;
pub mod library;
pub mod orchestrator;
pub mod server;
pub mod streaming;
