//! ffmpeg invocation assembly.
//!
//! Turns a [`TranscodeJob`] into a [`TranscodePlan`]: one or two argument
//! vectors ready to hand to [`ToolCommand`](crate::ToolCommand). Nothing here
//! touches the filesystem or spawns processes.

use std::path::{Path, PathBuf};

use reelcache_common::{Error, Result};

use crate::catalog::{Container, EncoderProfile, QualityTier};
use crate::filters::{build_filter_chain, FilterChain};
use crate::flags::FlagSet;

/// Platform null sink used as the first-pass output.
#[cfg(windows)]
pub const NULL_SINK: &str = "NUL";
/// Platform null sink used as the first-pass output.
#[cfg(not(windows))]
pub const NULL_SINK: &str = "/dev/null";

/// Audio encoder used when only the audio needs re-encoding.
pub const COPY_AUDIO_CODEC: &str = "aac";

/// Container used when only the audio needs re-encoding.
pub const COPY_CONTAINER: Container = Container::Mkv;

/// Audio flags that have no meaning in a video-only pass.
const AUDIO_FLAGS: [&str; 4] = ["-c:a", "-b:a", "-ac", "-ar"];

/// What to do with the video stream.
#[derive(Debug, Clone)]
pub enum VideoTarget<'a> {
    /// Re-encode with a catalog profile.
    Encode {
        /// Encoder to use.
        profile: &'a EncoderProfile,
        /// Quality tier of that encoder.
        quality: QualityTier,
        /// Source is HDR and must be tone-mapped.
        hdr: bool,
        /// Source pixel format.
        pixel_format: String,
    },
    /// Copy the video bitstream untouched.
    Copy,
}

impl VideoTarget<'_> {
    /// Container the output is written in.
    pub fn container(&self) -> Container {
        match self {
            VideoTarget::Encode { profile, .. } => profile.container,
            VideoTarget::Copy => COPY_CONTAINER,
        }
    }
}

/// Everything needed to plan one transcode.
#[derive(Debug, Clone)]
pub struct TranscodeJob<'a> {
    /// Source file.
    pub input: PathBuf,
    /// Destination file.
    pub output: PathBuf,
    /// Audio track to keep, relative to audio streams.
    pub audio_index: u32,
    /// Output channel count.
    pub channels: u32,
    /// Video handling.
    pub target: VideoTarget<'a>,
    /// Caller flags applied last.
    pub overrides: FlagSet,
    /// Two-pass statistics prefix; required when the quality is two-pass.
    pub passlog: Option<PathBuf>,
}

/// Argument vectors for one transcode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscodePlan {
    /// One ffmpeg run.
    SinglePass {
        /// ffmpeg arguments.
        args: Vec<String>,
    },
    /// Analysis pass to the null sink followed by the real encode.
    TwoPass {
        /// Video-only first pass.
        first: Vec<String>,
        /// Final pass writing the output.
        second: Vec<String>,
        /// Statistics prefix shared by both passes.
        passlog: PathBuf,
    },
}

impl TranscodePlan {
    /// Number of ffmpeg runs.
    pub fn passes(&self) -> usize {
        match self {
            TranscodePlan::SinglePass { .. } => 1,
            TranscodePlan::TwoPass { .. } => 2,
        }
    }

    /// Argument vectors in execution order.
    pub fn runs(&self) -> Vec<&[String]> {
        match self {
            TranscodePlan::SinglePass { args } => vec![args.as_slice()],
            TranscodePlan::TwoPass { first, second, .. } => {
                vec![first.as_slice(), second.as_slice()]
            }
        }
    }

    /// Files ffmpeg leaves behind for a two-pass encode.
    pub fn passlog_artifacts(&self) -> Vec<PathBuf> {
        match self {
            TranscodePlan::SinglePass { .. } => Vec::new(),
            TranscodePlan::TwoPass { passlog, .. } => passlog_artifacts(passlog),
        }
    }
}

/// Statistics files ffmpeg writes for a given `-passlogfile` prefix.
pub fn passlog_artifacts(prefix: &Path) -> Vec<PathBuf> {
    let base = prefix.to_string_lossy();
    vec![
        PathBuf::from(format!("{base}-0.log")),
        PathBuf::from(format!("{base}-0.log.mbtree")),
    ]
}

/// Merge encoder, quality and caller flags.
///
/// Layers apply in order: encoder base flags, quality flags, the quality's
/// HDR-dependent extras, then caller overrides. Later layers win.
pub fn merged_flags(
    profile: &EncoderProfile,
    quality: QualityTier,
    hdr: bool,
    overrides: &FlagSet,
) -> Result<FlagSet> {
    let q = profile.quality(quality).ok_or_else(|| {
        Error::invalid(format!(
            "encoder {} has no {quality} profile",
            profile.name
        ))
    })?;

    let mut flags = profile.base_flags.clone();
    flags.overlay(&q.flags);
    flags.overlay(&(q.extra_args)(hdr));
    flags.overlay(overrides);
    Ok(flags)
}

/// Remove audio flags and disable audio.
pub fn strip_audio(flags: &FlagSet) -> FlagSet {
    let mut stripped = flags.clone();
    for flag in AUDIO_FLAGS {
        stripped.remove(flag);
    }
    stripped.switch("-an");
    stripped
}

fn preamble(device: Option<&Path>) -> Vec<String> {
    let mut args: Vec<String> = ["-hide_banner", "-nostdin", "-loglevel", "error", "-y"]
        .into_iter()
        .map(String::from)
        .collect();
    if let Some(device) = device {
        args.push("-vaapi_device".into());
        args.push(device.to_string_lossy().into_owned());
    }
    args
}

fn input_args(input: &Path) -> [String; 2] {
    ["-i".into(), input.to_string_lossy().into_owned()]
}

fn map_video() -> [String; 2] {
    ["-map".into(), "0:v:0".into()]
}

/// Optional map: a source without the track yields a video-only output.
fn map_audio(index: u32) -> [String; 2] {
    ["-map".into(), format!("0:a:{index}?")]
}

fn stream_flags(video_codec: &str, audio_codec: Option<&str>, reencode: bool) -> FlagSet {
    let mut flags = FlagSet::new();
    flags.set("-c:v", video_codec);
    if let Some(audio) = audio_codec {
        flags.set("-c:a", audio);
    }
    if reencode {
        flags.set("-fps_mode", "cfr");
    }
    flags
        .set("-avoid_negative_ts", "make_zero")
        .set("-max_muxing_queue_size", "1024");
    flags
}

/// Plan a transcode.
///
/// # Errors
///
/// - [`Error::InvalidRequest`] if the encoder lacks the requested quality tier.
/// - [`Error::Internal`] if the quality is two-pass and no passlog prefix was
///   supplied.
pub fn assemble(job: &TranscodeJob<'_>) -> Result<TranscodePlan> {
    match &job.target {
        VideoTarget::Copy => Ok(TranscodePlan::SinglePass {
            args: assemble_copy(job),
        }),
        VideoTarget::Encode {
            profile,
            quality,
            hdr,
            pixel_format,
        } => {
            let q = profile.quality(*quality).ok_or_else(|| {
                Error::invalid(format!("encoder {} has no {quality} profile", profile.name))
            })?;
            let chain = build_filter_chain(profile, *hdr, pixel_format, q.scale);
            let merged = merged_flags(profile, *quality, *hdr, &job.overrides)?;

            if !q.two_pass {
                return Ok(TranscodePlan::SinglePass {
                    args: encode_args(job, profile, &chain, &merged, None),
                });
            }

            let passlog = job.passlog.clone().ok_or_else(|| {
                Error::internal(format!(
                    "two-pass {} encode needs a passlog prefix",
                    profile.name
                ))
            })?;

            Ok(TranscodePlan::TwoPass {
                first: first_pass_args(job, profile, &chain, &merged, &passlog),
                second: encode_args(job, profile, &chain, &merged, Some(&passlog)),
                passlog,
            })
        }
    }
}

fn encode_args(
    job: &TranscodeJob<'_>,
    profile: &EncoderProfile,
    chain: &FilterChain,
    merged: &FlagSet,
    passlog: Option<&Path>,
) -> Vec<String> {
    let mut args = preamble(profile.device.as_deref());
    args.extend(input_args(&job.input));
    args.extend(map_video());
    args.extend(map_audio(job.audio_index));
    args.push("-vf".into());
    args.push(chain.render());

    let mut flags = stream_flags(profile.codec, Some(profile.audio_codec), true);
    flags.overlay(&profile.container.flags());
    if !merged.contains("-ac") {
        flags.set("-ac", job.channels.to_string());
    }
    flags.overlay(merged);
    args.extend(flags.to_args());

    if let Some(passlog) = passlog {
        args.extend(pass_args(2, passlog));
    }
    args.push(job.output.to_string_lossy().into_owned());
    args
}

fn first_pass_args(
    job: &TranscodeJob<'_>,
    profile: &EncoderProfile,
    chain: &FilterChain,
    merged: &FlagSet,
    passlog: &Path,
) -> Vec<String> {
    let mut args = preamble(profile.device.as_deref());
    args.extend(input_args(&job.input));
    args.extend(map_video());
    args.push("-vf".into());
    args.push(chain.render());

    let mut flags = stream_flags(profile.codec, None, true);
    flags.overlay(&strip_audio(merged));
    args.extend(flags.to_args());

    args.extend(pass_args(1, passlog));
    args.extend(["-f".into(), "null".into(), NULL_SINK.into()]);
    args
}

fn pass_args(pass: u8, passlog: &Path) -> [String; 4] {
    [
        "-pass".into(),
        pass.to_string(),
        "-passlogfile".into(),
        passlog.to_string_lossy().into_owned(),
    ]
}

fn assemble_copy(job: &TranscodeJob<'_>) -> Vec<String> {
    let mut args = preamble(None);
    args.extend(input_args(&job.input));
    args.extend(map_video());
    args.extend(map_audio(job.audio_index));

    let mut flags = stream_flags("copy", Some(COPY_AUDIO_CODEC), false);
    flags.overlay(&COPY_CONTAINER.flags());
    if !job.overrides.contains("-ac") {
        flags.set("-ac", job.channels.to_string());
    }
    flags.overlay(&job.overrides);
    args.extend(flags.to_args());

    args.push(job.output.to_string_lossy().into_owned());
    args
}

/// Arguments that cut `[start, start + len)` out of `source` by stream copy.
///
/// The audio map is optional (`?`) so a source without the track still
/// yields a video-only segment.
pub fn extraction_args(
    source: &Path,
    start: f64,
    len: f64,
    audio_index: Option<u32>,
    output: &Path,
) -> Vec<String> {
    let mut args = preamble(None);
    args.extend([
        "-ss".into(),
        format_seconds(start),
        "-t".into(),
        format_seconds(len),
    ]);
    args.extend(input_args(source));
    args.extend(map_video());
    if let Some(index) = audio_index {
        args.extend(map_audio(index));
    }
    args.extend([
        "-c".into(),
        "copy".into(),
        "-avoid_negative_ts".into(),
        "make_zero".into(),
    ]);
    args.push(output.to_string_lossy().into_owned());
    args
}

/// Seconds with millisecond precision and no trailing zeros.
fn format_seconds(secs: f64) -> String {
    let s = format!("{secs:.3}");
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}
