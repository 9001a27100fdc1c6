use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub library: LibraryConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub coordinator: CoordinatorConfig,

    #[serde(default)]
    pub transcode: TranscodeConfig,

    #[serde(default)]
    pub clip: ClipConfig,

    #[serde(default)]
    pub tools: ToolsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Where source media lives.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LibraryConfig {
    /// One directory (or file) per movie.
    #[serde(default = "default_movies_dir")]
    pub movies_dir: PathBuf,

    /// One directory per show, episodes anywhere beneath it.
    #[serde(default = "default_shows_dir")]
    pub shows_dir: PathBuf,
}

fn default_movies_dir() -> PathBuf {
    PathBuf::from("/media/movies")
}
fn default_shows_dir() -> PathBuf {
    PathBuf::from("/media/shows")
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            movies_dir: default_movies_dir(),
            shows_dir: default_shows_dir(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Root of the derived-artifact cache.
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,

    /// Two-pass statistics and clip extraction scratch space. Kept outside
    /// the cache root.
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("/var/cache/reelcache")
}
fn default_work_dir() -> PathBuf {
    std::env::temp_dir().join("reelcache")
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
            work_dir: default_work_dir(),
        }
    }
}

/// How long joiners wait for someone else's generation.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CoordinatorConfig {
    /// Re-check interval in milliseconds (default: 1000).
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Checks before giving up (default: 3600, one hour at the default interval).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_poll_interval_ms() -> u64 {
    1000
}
fn default_max_attempts() -> u32 {
    3600
}

impl CoordinatorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TranscodeConfig {
    /// Encoder the `plan` and `cache-key` commands use when none is given.
    #[serde(default = "default_codec")]
    pub default_codec: String,

    /// Preferred hardware encoder (e.g. "h264_vaapi"). Unset means software.
    #[serde(default)]
    pub hardware_encoder: Option<String>,

    /// Render device for VA-API encoders.
    #[serde(default)]
    pub hw_device: Option<PathBuf>,

    /// Per-pass ffmpeg timeout in seconds (default: 6 hours).
    #[serde(default = "default_transcode_timeout")]
    pub timeout_secs: u64,
}

fn default_codec() -> String {
    "h264".to_string()
}
fn default_transcode_timeout() -> u64 {
    6 * 60 * 60
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            default_codec: default_codec(),
            hardware_encoder: None,
            hw_device: None,
            timeout_secs: default_transcode_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClipConfig {
    /// Longest clip in seconds (default: 600).
    #[serde(default = "default_max_window")]
    pub max_window_secs: f64,

    /// Software encoder used for clips when no hardware encoder applies.
    #[serde(default = "default_codec")]
    pub codec: String,
}

fn default_max_window() -> f64 {
    600.0
}

impl Default for ClipConfig {
    fn default() -> Self {
        Self {
            max_window_secs: default_max_window(),
            codec: default_codec(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ToolsConfig {
    /// Custom path to ffmpeg.
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,

    /// Custom path to ffprobe.
    #[serde(default)]
    pub ffprobe_path: Option<PathBuf>,
}
