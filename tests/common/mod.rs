//! Shared test harness for integration tests.
//!
//! [`TestHarness`] lays out a temporary library, cache and work directory,
//! installs fake `ffmpeg`/`ffprobe` shell scripts, and starts Axum on a
//! random port. The fake ffmpeg appends every invocation to a log and writes
//! a small file to its last argument, so tests can count encodes and inspect
//! the arguments without a real transcoder.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use reelcache::config::Config;
use reelcache::server::{create_router, AppContext};

/// SDR h264 source with one stereo and one 5.1 track.
pub const SDR_PROBE: &str = r#"{
  "streams": [
    {"codec_type": "video", "codec_name": "h264", "width": 1920, "height": 1080,
     "color_transfer": "bt709", "pix_fmt": "yuv420p"},
    {"codec_type": "audio", "codec_name": "aac", "channels": 2, "tags": {"language": "eng"}},
    {"codec_type": "audio", "codec_name": "eac3", "channels": 6, "tags": {"language": "eng"}}
  ],
  "format": {"duration": "600.000000"},
  "chapters": []
}"#;

/// Ten-minute PQ HDR hevc source with stereo audio.
pub const HDR_PROBE: &str = r#"{
  "streams": [
    {"codec_type": "video", "codec_name": "hevc", "width": 3840, "height": 2160,
     "color_transfer": "smpte2084", "pix_fmt": "yuv420p10le"},
    {"codec_type": "audio", "codec_name": "aac", "channels": 2}
  ],
  "format": {"duration": "600.000000"},
  "chapters": []
}"#;

const FAKE_FFPROBE: &str = r#"#!/bin/sh
for last; do :; done
if [ -f "$last.probe.json" ]; then
  cat "$last.probe.json"
else
  cat "__DIR__/default.probe.json"
fi
"#;

const FAKE_FFMPEG: &str = r#"#!/bin/sh
echo "$*" >> "__DIR__/ffmpeg.log"
delay=$(cat "__DIR__/delay" 2>/dev/null || echo 0)
[ "$delay" = 0 ] || sleep "$delay"
prev=""
pass=""
passlog=""
for arg; do
  [ "$prev" = "-pass" ] && pass="$arg"
  [ "$prev" = "-passlogfile" ] && passlog="$arg"
  prev="$arg"
  last="$arg"
done
if [ -n "$passlog" ]; then
  : > "$passlog-0.log"
  : > "$passlog-0.log.mbtree"
fi
if [ "$last" != "/dev/null" ]; then
  printf 'fake-encode %s' "$*" > "$last"
fi
if [ -f "__DIR__/fail" ]; then
  fail_on=$(cat "__DIR__/fail")
  if [ "$fail_on" = "any" ] || [ "$fail_on" = "$pass" ]; then
    exit 1
  fi
fi
exit 0
"#;

pub struct TestHarness {
    pub dir: tempfile::TempDir,
    pub config: Config,
}

impl TestHarness {
    /// Empty library, fake tools, default probe answers from [`SDR_PROBE`].
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let root = dir.path();
        let tools = root.join("bin");
        std::fs::create_dir_all(&tools).unwrap();

        install_script(&tools.join("ffmpeg"), FAKE_FFMPEG, &tools);
        install_script(&tools.join("ffprobe"), FAKE_FFPROBE, &tools);
        std::fs::write(tools.join("default.probe.json"), SDR_PROBE).unwrap();

        let mut config = Config::default();
        config.library.movies_dir = root.join("movies");
        config.library.shows_dir = root.join("shows");
        config.cache.dir = root.join("cache");
        config.cache.work_dir = root.join("work");
        config.tools.ffmpeg_path = Some(tools.join("ffmpeg"));
        config.tools.ffprobe_path = Some(tools.join("ffprobe"));
        config.coordinator.poll_interval_ms = 20;
        config.coordinator.max_attempts = 1500;
        config.transcode.hw_device = Some(root.join("dri").join("renderD128"));
        std::fs::create_dir_all(&config.library.movies_dir).unwrap();
        std::fs::create_dir_all(&config.library.shows_dir).unwrap();

        Self { dir, config }
    }

    fn tools_dir(&self) -> PathBuf {
        self.dir.path().join("bin")
    }

    /// Add `movies/<name>/<name>.mkv` with `data`, probed as `probe`.
    pub fn add_movie(&self, name: &str, data: &[u8], probe: &str) -> PathBuf {
        let dir = self.config.library.movies_dir.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(format!("{name}.mkv"));
        std::fs::write(&path, data).unwrap();
        std::fs::write(format!("{}.probe.json", path.display()), probe).unwrap();
        path
    }

    /// Add `shows/<show>/Season N/<show>.SxxEyy.mkv`.
    pub fn add_episode(&self, show: &str, season: u32, episode: u32, data: &[u8]) -> PathBuf {
        let dir = self
            .config
            .library
            .shows_dir
            .join(show)
            .join(format!("Season {season}"));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(format!("{show}.S{season:02}E{episode:02}.mkv"));
        std::fs::write(&path, data).unwrap();
        path
    }

    /// Make every fake ffmpeg run sleep first.
    pub fn set_encode_delay(&self, secs: f64) {
        std::fs::write(self.tools_dir().join("delay"), secs.to_string()).unwrap();
    }

    /// Make fake ffmpeg exit 1 on the given pass ("1", "2") or on every run ("any").
    pub fn fail_encodes(&self, on: &str) {
        std::fs::write(self.tools_dir().join("fail"), on).unwrap();
    }

    /// Let fake ffmpeg succeed again.
    pub fn clear_failures(&self) {
        std::fs::remove_file(self.tools_dir().join("fail")).ok();
    }

    /// Make the hardware render device path exist.
    pub fn install_render_device(&self) {
        let device = self.config.transcode.hw_device.clone().unwrap();
        std::fs::create_dir_all(device.parent().unwrap()).unwrap();
        std::fs::write(device, b"").unwrap();
    }

    /// Every recorded ffmpeg invocation, one string per run.
    pub fn ffmpeg_calls(&self) -> Vec<String> {
        std::fs::read_to_string(self.tools_dir().join("ffmpeg.log"))
            .map(|s| s.lines().map(String::from).collect())
            .unwrap_or_default()
    }

    /// Files (recursively) under `sub` of the harness root.
    pub fn files_under(&self, sub: &str) -> Vec<PathBuf> {
        walkdir::WalkDir::new(self.dir.path().join(sub))
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .collect()
    }

    /// Harness plus a running server, for tests that need no setup first.
    pub async fn with_server() -> (Self, SocketAddr) {
        let harness = Self::new();
        let addr = harness.serve().await;
        (harness, addr)
    }

    pub fn context(&self) -> AppContext {
        AppContext::from_config(self.config.clone()).expect("failed to build context")
    }

    /// Start an Axum server on a random port and return the bound address.
    pub async fn serve(&self) -> SocketAddr {
        let app = create_router(self.context());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind random port");
        let addr = listener.local_addr().expect("failed to get local addr");

        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        addr
    }
}

fn install_script(path: &Path, template: &str, dir: &Path) {
    let body = template.replace("__DIR__", &dir.display().to_string());
    std::fs::write(path, body).unwrap();
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

/// Deterministic non-repeating payload.
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}
