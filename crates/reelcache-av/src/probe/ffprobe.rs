//! FFprobe-based media probing.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reelcache_common::{AudioTrack, Error, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::{Chapter, Dimensions, ProbeService};
use crate::command::ToolCommand;

/// Transfer characteristics that mark a stream as HDR.
const HDR_TRANSFERS: [&str; 2] = ["smpte2084", "arib-std-b67"];

const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Default, Deserialize)]
struct StreamsOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    channels: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
    color_transfer: Option<String>,
    pix_fmt: Option<String>,
    #[serde(default)]
    tags: FfprobeTags,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeTags {
    language: Option<String>,
    title: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FormatOutput {
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChaptersOutput {
    #[serde(default)]
    chapters: Vec<FfprobeChapter>,
}

#[derive(Debug, Deserialize)]
struct FfprobeChapter {
    start_time: String,
    end_time: String,
    #[serde(default)]
    tags: FfprobeTags,
}

/// [`ProbeService`] backed by the `ffprobe` binary.
#[derive(Debug, Clone)]
pub struct FfprobeService {
    ffprobe: PathBuf,
    timeout: Duration,
}

impl FfprobeService {
    /// Probe with the given `ffprobe` binary.
    pub fn new(ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffprobe: ffprobe.into(),
            timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    /// Override the per-query timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn query<T: DeserializeOwned>(&self, query: &str, args: &[&str], path: &Path) -> Result<T> {
        let output = ToolCommand::new(self.ffprobe.clone())
            .args(["-v", "error"])
            .args(args.iter().copied())
            .args(["-of", "json"])
            .path_arg(path)
            .timeout(self.timeout)
            .execute()
            .await?;

        parse_json(query, &output.stdout)
    }

    async fn first_video_stream(&self, query: &str, entries: &str, path: &Path) -> Result<Option<FfprobeStream>> {
        let out: StreamsOutput = self
            .query(
                query,
                &["-select_streams", "v:0", "-show_entries", entries],
                path,
            )
            .await?;
        Ok(out.streams.into_iter().next())
    }
}

fn parse_json<T: DeserializeOwned>(query: &str, stdout: &str) -> Result<T> {
    serde_json::from_str(stdout).map_err(|e| Error::probe(query, format!("invalid ffprobe output: {e}")))
}

fn parse_seconds(query: &str, raw: Option<&str>) -> Result<f64> {
    let raw = raw.ok_or_else(|| Error::probe(query, "no value reported"))?;
    let secs: f64 = raw
        .trim()
        .parse()
        .map_err(|_| Error::probe(query, format!("unparsable value: {raw}")))?;
    if !secs.is_finite() || secs < 0.0 {
        return Err(Error::probe(query, format!("out of range: {raw}")));
    }
    Ok(secs)
}

fn is_hdr_transfer(transfer: Option<&str>) -> bool {
    transfer.is_some_and(|t| HDR_TRANSFERS.iter().any(|h| t.eq_ignore_ascii_case(h)))
}

fn audio_tracks_from(streams: Vec<FfprobeStream>) -> Vec<AudioTrack> {
    streams
        .into_iter()
        .filter(|s| s.codec_type.as_deref() == Some("audio"))
        .enumerate()
        .map(|(i, s)| AudioTrack {
            index: i as u32,
            codec: s.codec_name.unwrap_or_default(),
            // Unknown is not stereo; 0 makes the caller downmix.
            channels: s.channels.unwrap_or(0),
            language: s.tags.language,
        })
        .collect()
}

fn chapters_from(query: &str, raw: Vec<FfprobeChapter>) -> Result<Vec<Chapter>> {
    raw.into_iter()
        .map(|c| {
            Ok(Chapter {
                start: parse_seconds(query, Some(&c.start_time))?,
                end: parse_seconds(query, Some(&c.end_time))?,
                title: c.tags.title,
            })
        })
        .collect()
}

#[async_trait]
impl ProbeService for FfprobeService {
    async fn is_hdr(&self, path: &Path) -> Result<bool> {
        let stream = self
            .first_video_stream("is_hdr", "stream=color_transfer", path)
            .await?;
        Ok(is_hdr_transfer(
            stream.as_ref().and_then(|s| s.color_transfer.as_deref()),
        ))
    }

    async fn duration(&self, path: &Path) -> Result<Duration> {
        let out: FormatOutput = self
            .query("duration", &["-show_entries", "format=duration"], path)
            .await?;
        let secs = parse_seconds(
            "duration",
            out.format.as_ref().and_then(|f| f.duration.as_deref()),
        )?;
        Ok(Duration::from_secs_f64(secs))
    }

    async fn dimensions(&self, path: &Path) -> Result<Dimensions> {
        let stream = self
            .first_video_stream("dimensions", "stream=width,height", path)
            .await?;
        match stream {
            Some(FfprobeStream {
                width: Some(width),
                height: Some(height),
                ..
            }) if width > 0 && height > 0 => Ok(Dimensions { width, height }),
            _ => Err(Error::probe("dimensions", "no video stream size reported")),
        }
    }

    async fn chapters(&self, path: &Path) -> Result<Vec<Chapter>> {
        let out: ChaptersOutput = self.query("chapters", &["-show_chapters"], path).await?;
        chapters_from("chapters", out.chapters)
    }

    async fn audio_tracks(&self, path: &Path) -> Result<Vec<AudioTrack>> {
        let out: StreamsOutput = self
            .query(
                "audio_tracks",
                &[
                    "-show_entries",
                    "stream=index,codec_type,codec_name,channels:stream_tags=language",
                ],
                path,
            )
            .await?;
        Ok(audio_tracks_from(out.streams))
    }

    async fn codec_name(&self, path: &Path) -> Result<String> {
        self.first_video_stream("codec_name", "stream=codec_name", path)
            .await?
            .and_then(|s| s.codec_name)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| Error::probe("codec_name", "no video codec reported"))
    }

    async fn pixel_format(&self, path: &Path) -> Result<String> {
        self.first_video_stream("pixel_format", "stream=pix_fmt", path)
            .await?
            .and_then(|s| s.pix_fmt)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| Error::probe("pixel_format", "no pixel format reported"))
    }
}
