//! Core type definitions shared between the media tooling and the server.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::Error;

/// One audio stream of a media file.
///
/// `index` is relative to audio streams only: the first audio stream is 0 no
/// matter how many video or subtitle streams precede it in the container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioTrack {
    /// Index among the file's audio streams.
    pub index: u32,
    /// Codec name as reported by ffprobe (e.g. "aac", "eac3").
    pub codec: String,
    /// Channel count, or 0 when the container does not report one.
    pub channels: u32,
    /// Language tag, if present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// How the caller wants the audio track chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AudioSelector {
    /// First two-channel track.
    #[default]
    Stereo,
    /// Track with the highest channel count, passed through at that count.
    Max,
    /// An explicit audio-relative track index.
    Index(u32),
}

impl FromStr for AudioSelector {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "stereo" => Ok(Self::Stereo),
            "max" => Ok(Self::Max),
            other => other
                .parse::<u32>()
                .map(Self::Index)
                .map_err(|_| Error::invalid(format!("unknown audio selector: {s}"))),
        }
    }
}

impl fmt::Display for AudioSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stereo => write!(f, "stereo"),
            Self::Max => write!(f, "max"),
            Self::Index(i) => write!(f, "{i}"),
        }
    }
}

/// What the caller asked the library for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MediaQuery {
    /// A movie by name.
    Movie {
        /// Movie name as it appears in the library.
        name: String,
    },
    /// One episode of a show.
    Episode {
        /// Show name as it appears in the library.
        show: String,
        /// Season number.
        season: u32,
        /// Episode number within the season.
        episode: u32,
    },
}

impl MediaQuery {
    /// Entity name used in not-found errors.
    pub fn entity(&self) -> &'static str {
        match self {
            Self::Movie { .. } => "movie",
            Self::Episode { .. } => "episode",
        }
    }
}

impl fmt::Display for MediaQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Movie { name } => write!(f, "{name}"),
            Self::Episode {
                show,
                season,
                episode,
            } => write!(f, "{show} S{season:02}E{episode:02}"),
        }
    }
}

/// A library hit: where the source lives plus whatever audio metadata the
/// library already knows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryEntry {
    /// Absolute path to the source file.
    pub path: PathBuf,
    /// Audio tracks declared by the library; `None` means "probe the file".
    pub audio_tracks: Option<Vec<AudioTrack>>,
}

impl LibraryEntry {
    /// Entry with no declared audio metadata.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            audio_tracks: None,
        }
    }
}

/// A clip window in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipWindow {
    /// Start offset in seconds.
    pub start: f64,
    /// End offset in seconds.
    pub end: f64,
}

impl ClipWindow {
    /// Validate and build a window. `end` must exceed `start`, `start` must not
    /// be negative, and the length must not exceed `max_len`.
    pub fn new(start: f64, end: f64, max_len: f64) -> crate::Result<Self> {
        if !start.is_finite() || !end.is_finite() {
            return Err(Error::invalid("clip bounds must be finite numbers"));
        }
        if start < 0.0 {
            return Err(Error::invalid("clip start must not be negative"));
        }
        if end <= start {
            return Err(Error::invalid("clip end must be greater than start"));
        }
        if end - start > max_len {
            return Err(Error::invalid(format!(
                "clip window of {:.3}s exceeds the {max_len}s maximum",
                end - start
            )));
        }
        Ok(Self { start, end })
    }

    /// Window length in seconds.
    pub fn len(&self) -> f64 {
        self.end - self.start
    }

    /// Always false for a validated window.
    pub fn is_empty(&self) -> bool {
        self.len() <= 0.0
    }
}
