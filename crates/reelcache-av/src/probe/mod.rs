//! Media file probing.
//!
//! [`ProbeService`] answers one question per call (duration, HDR, audio
//! tracks, ...). The production implementation, [`FfprobeService`], runs a
//! separate `ffprobe` invocation for each query; callers that need several
//! answers for one file ask for each.

mod ffprobe;

pub use ffprobe::FfprobeService;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reelcache_common::{AudioTrack, Result};
use serde::{Deserialize, Serialize};

/// Width and height of the first video stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

/// A chapter marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    /// Start offset in seconds.
    pub start: f64,
    /// End offset in seconds.
    pub end: f64,
    /// Chapter title, if tagged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Queries about a media file.
#[async_trait]
pub trait ProbeService: Send + Sync {
    /// Whether the first video stream uses an HDR transfer (PQ or HLG).
    /// A missing transfer tag means SDR.
    async fn is_hdr(&self, path: &Path) -> Result<bool>;

    /// Container duration.
    async fn duration(&self, path: &Path) -> Result<Duration>;

    /// Size of the first video stream.
    async fn dimensions(&self, path: &Path) -> Result<Dimensions>;

    /// Chapter markers. A file without chapters yields an empty list.
    async fn chapters(&self, path: &Path) -> Result<Vec<Chapter>>;

    /// Audio streams, indexed relative to audio streams only.
    async fn audio_tracks(&self, path: &Path) -> Result<Vec<AudioTrack>>;

    /// Codec of the first video stream as ffprobe names it.
    async fn codec_name(&self, path: &Path) -> Result<String>;

    /// Pixel format of the first video stream.
    async fn pixel_format(&self, path: &Path) -> Result<String>;
}

/// Every probe answer for one file, for display.
#[derive(Debug, Clone, Serialize)]
pub struct ProbeSummary {
    /// Duration in seconds.
    pub duration_secs: f64,
    /// Video size.
    pub dimensions: Dimensions,
    /// Video codec.
    pub codec: String,
    /// Video pixel format.
    pub pixel_format: String,
    /// HDR transfer detected.
    pub hdr: bool,
    /// Audio streams.
    pub audio_tracks: Vec<AudioTrack>,
    /// Chapter markers.
    pub chapters: Vec<Chapter>,
}

/// Run every query against one file.
pub async fn summarize(prober: &dyn ProbeService, path: &Path) -> Result<ProbeSummary> {
    Ok(ProbeSummary {
        duration_secs: prober.duration(path).await?.as_secs_f64(),
        dimensions: prober.dimensions(path).await?,
        codec: prober.codec_name(path).await?,
        pixel_format: prober.pixel_format(path).await?,
        hdr: prober.is_hdr(path).await?,
        audio_tracks: prober.audio_tracks(path).await?,
        chapters: prober.chapters(path).await?,
    })
}
