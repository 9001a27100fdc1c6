//! Declarative encoder catalog.
//!
//! Each [`EncoderProfile`] names an ffmpeg encoder together with everything
//! needed to drive it: container, audio codec, base flags, filter-chain
//! builders and a set of [`QualityProfile`]s keyed by [`QualityTier`].

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use reelcache_common::Error;

use crate::filters::{self, FilterChain, ScaleOverride};
use crate::flags::FlagSet;

/// Default VA-API render node.
pub const DEFAULT_VAAPI_DEVICE: &str = "/dev/dri/renderD128";

/// Control node the NVIDIA driver creates; NVENC cannot run without it.
pub const DEFAULT_NVENC_CONTROL: &str = "/dev/nvidiactl";

/// Profile substituted for unknown encoder names.
pub const BASELINE_ENCODER: &str = "h264";

/// Output container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Container {
    /// ISO base media (MP4).
    Mp4,
    /// WebM.
    Webm,
    /// Matroska.
    Mkv,
}

impl Container {
    /// File extension without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            Container::Mp4 => "mp4",
            Container::Webm => "webm",
            Container::Mkv => "mkv",
        }
    }

    /// MIME type served for this container.
    pub fn mime_type(self) -> &'static str {
        match self {
            Container::Mp4 => "video/mp4",
            Container::Webm => "video/webm",
            Container::Mkv => "video/x-matroska",
        }
    }

    /// Muxer flags this container needs for progressive playback.
    pub fn flags(self) -> FlagSet {
        match self {
            Container::Mp4 => FlagSet::from_pairs([("-movflags", "+faststart")]),
            Container::Webm | Container::Mkv => {
                FlagSet::from_pairs([("-cluster_time_limit", "5000")])
            }
        }
    }
}

/// Codec family, shared by software and hardware encoders of one codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecFamily {
    /// H.264 / AVC.
    H264,
    /// H.265 / HEVC.
    Hevc,
    /// AV1.
    Av1,
    /// VP9.
    Vp9,
}

impl CodecFamily {
    /// Map a codec name as ffprobe reports it.
    pub fn from_codec_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "h264" | "avc" | "avc1" => Some(Self::H264),
            "hevc" | "h265" | "hvc1" | "hev1" => Some(Self::Hevc),
            "av1" | "av01" => Some(Self::Av1),
            "vp9" | "vp09" => Some(Self::Vp9),
            _ => None,
        }
    }

    /// Canonical ffprobe codec name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::H264 => "h264",
            Self::Hevc => "hevc",
            Self::Av1 => "av1",
            Self::Vp9 => "vp9",
        }
    }
}

impl fmt::Display for CodecFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an encoder is accelerated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acceleration {
    /// CPU encoder.
    Software,
    /// VA-API, requires a render device.
    Vaapi,
    /// NVIDIA NVENC.
    Nvenc,
}

/// Named quality tier of an encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum QualityTier {
    /// Whole-title re-encode.
    Full,
    /// Short clip.
    Clip,
    /// Low-resolution preview.
    Preview,
}

impl QualityTier {
    /// Lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Clip => "clip",
            Self::Preview => "preview",
        }
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QualityTier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "full" => Ok(Self::Full),
            "clip" => Ok(Self::Clip),
            "preview" => Ok(Self::Preview),
            _ => Err(Error::invalid(format!("unknown quality profile: {s}"))),
        }
    }
}

/// Encoder settings for one quality tier.
#[derive(Debug, Clone)]
pub struct QualityProfile {
    /// Flags layered over the encoder's base flags.
    pub flags: FlagSet,
    /// Extra flags that depend on whether the source is HDR.
    pub extra_args: fn(bool) -> FlagSet,
    /// Encode in two passes.
    pub two_pass: bool,
    /// Explicit output size.
    pub scale: Option<ScaleOverride>,
}

impl QualityProfile {
    fn new(pairs: &[(&str, &str)]) -> Self {
        Self {
            flags: FlagSet::from_pairs(pairs.iter().copied()),
            extra_args: bt709_tags,
            two_pass: false,
            scale: None,
        }
    }

    fn two_pass(mut self) -> Self {
        self.two_pass = true;
        self
    }

    fn scaled(mut self, scale: ScaleOverride) -> Self {
        self.scale = Some(scale);
        self
    }
}

/// Tone-mapped output gets explicit BT.709 tags so players do not trust
/// stale container metadata.
fn bt709_tags(hdr: bool) -> FlagSet {
    if hdr {
        FlagSet::from_pairs([
            ("-color_primaries", "bt709"),
            ("-color_trc", "bt709"),
            ("-colorspace", "bt709"),
        ])
    } else {
        FlagSet::new()
    }
}

/// One encoder and everything needed to drive it.
#[derive(Debug, Clone)]
pub struct EncoderProfile {
    /// Catalog name (`h264`, `hevc_vaapi`, ...).
    pub name: &'static str,
    /// ffmpeg encoder id (`libx264`, `h264_vaapi`, ...).
    pub codec: &'static str,
    /// Codec family.
    pub family: CodecFamily,
    /// Acceleration kind.
    pub acceleration: Acceleration,
    /// Hardware device to initialize, if any.
    pub device: Option<PathBuf>,
    /// Output container.
    pub container: Container,
    /// Default audio encoder.
    pub audio_codec: &'static str,
    /// Flags applied to every encode.
    pub base_flags: FlagSet,
    /// SDR chain, given whether the input is higher bit depth.
    pub sdr_filters: fn(bool) -> FilterChain,
    /// HDR tone-mapping chain.
    pub hdr_filters: fn() -> FilterChain,
    /// Quality tiers.
    pub qualities: BTreeMap<QualityTier, QualityProfile>,
}

impl EncoderProfile {
    /// Whether this encoder runs on a GPU.
    pub fn is_hardware(&self) -> bool {
        self.acceleration != Acceleration::Software
    }

    /// Settings for a quality tier.
    pub fn quality(&self, tier: QualityTier) -> Option<&QualityProfile> {
        self.qualities.get(&tier)
    }
}

struct ProfileSpec {
    name: &'static str,
    codec: &'static str,
    family: CodecFamily,
    acceleration: Acceleration,
    container: Container,
    audio_codec: &'static str,
    base: &'static [(&'static str, &'static str)],
    full: QualityProfile,
    clip: QualityProfile,
    preview: QualityProfile,
}

impl ProfileSpec {
    fn build(self) -> EncoderProfile {
        let (device, sdr_filters, hdr_filters): (Option<PathBuf>, fn(bool) -> FilterChain, fn() -> FilterChain) =
            match self.acceleration {
                Acceleration::Vaapi => (
                    Some(PathBuf::from(DEFAULT_VAAPI_DEVICE)),
                    filters::vaapi_sdr_chain,
                    filters::vaapi_hdr_chain,
                ),
                Acceleration::Software | Acceleration::Nvenc => (
                    None,
                    filters::software_sdr_chain,
                    filters::software_hdr_chain,
                ),
            };

        let mut qualities = BTreeMap::new();
        qualities.insert(QualityTier::Full, self.full);
        qualities.insert(QualityTier::Clip, self.clip);
        qualities.insert(QualityTier::Preview, self.preview);

        EncoderProfile {
            name: self.name,
            codec: self.codec,
            family: self.family,
            acceleration: self.acceleration,
            device,
            container: self.container,
            audio_codec: self.audio_codec,
            base_flags: FlagSet::from_pairs(self.base.iter().copied()),
            sdr_filters,
            hdr_filters,
            qualities,
        }
    }
}

const PREVIEW_SCALE: ScaleOverride = ScaleOverride::width(854);

/// The set of encoders reelcache knows how to drive.
#[derive(Debug, Clone)]
pub struct EncoderCatalog {
    profiles: Vec<EncoderProfile>,
    nvenc_control: PathBuf,
}

impl EncoderCatalog {
    /// The built-in encoders.
    pub fn builtin() -> Self {
        let specs = vec![
            ProfileSpec {
                name: "h264",
                codec: "libx264",
                family: CodecFamily::H264,
                acceleration: Acceleration::Software,
                container: Container::Mp4,
                audio_codec: "aac",
                base: &[("-preset", "medium"), ("-profile:v", "high")],
                full: QualityProfile::new(&[("-crf", "20"), ("-preset", "slow"), ("-b:a", "192k")]),
                clip: QualityProfile::new(&[("-crf", "23"), ("-preset", "veryfast"), ("-b:a", "128k")]),
                preview: QualityProfile::new(&[("-crf", "28"), ("-preset", "veryfast"), ("-b:a", "96k")])
                    .scaled(PREVIEW_SCALE),
            },
            ProfileSpec {
                name: "hevc",
                codec: "libx265",
                family: CodecFamily::Hevc,
                acceleration: Acceleration::Software,
                container: Container::Mp4,
                audio_codec: "aac",
                base: &[("-preset", "medium"), ("-tag:v", "hvc1")],
                full: QualityProfile::new(&[("-crf", "22"), ("-b:a", "192k")]),
                clip: QualityProfile::new(&[("-crf", "26"), ("-preset", "fast"), ("-b:a", "128k")]),
                preview: QualityProfile::new(&[("-crf", "30"), ("-preset", "veryfast"), ("-b:a", "96k")])
                    .scaled(PREVIEW_SCALE),
            },
            ProfileSpec {
                name: "av1",
                codec: "libsvtav1",
                family: CodecFamily::Av1,
                acceleration: Acceleration::Software,
                container: Container::Mp4,
                audio_codec: "aac",
                base: &[("-preset", "8")],
                full: QualityProfile::new(&[("-crf", "30"), ("-b:a", "192k")]),
                clip: QualityProfile::new(&[("-crf", "35"), ("-preset", "10"), ("-b:a", "128k")]),
                preview: QualityProfile::new(&[("-crf", "40"), ("-preset", "12"), ("-b:a", "96k")])
                    .scaled(PREVIEW_SCALE),
            },
            ProfileSpec {
                name: "vp9",
                codec: "libvpx-vp9",
                family: CodecFamily::Vp9,
                acceleration: Acceleration::Software,
                container: Container::Webm,
                audio_codec: "libopus",
                base: &[("-row-mt", "1"), ("-deadline", "good")],
                full: QualityProfile::new(&[
                    ("-b:v", "0"),
                    ("-crf", "31"),
                    ("-cpu-used", "2"),
                    ("-b:a", "160k"),
                ])
                .two_pass(),
                clip: QualityProfile::new(&[
                    ("-b:v", "0"),
                    ("-crf", "36"),
                    ("-cpu-used", "4"),
                    ("-b:a", "128k"),
                ]),
                preview: QualityProfile::new(&[
                    ("-b:v", "0"),
                    ("-crf", "40"),
                    ("-cpu-used", "5"),
                    ("-b:a", "96k"),
                ])
                .scaled(PREVIEW_SCALE),
            },
            ProfileSpec {
                name: "h264_vaapi",
                codec: "h264_vaapi",
                family: CodecFamily::H264,
                acceleration: Acceleration::Vaapi,
                container: Container::Mp4,
                audio_codec: "aac",
                base: &[("-rc_mode", "CQP")],
                full: QualityProfile::new(&[("-qp", "21"), ("-b:a", "192k")]),
                clip: QualityProfile::new(&[("-qp", "24"), ("-b:a", "128k")]),
                preview: QualityProfile::new(&[("-qp", "28"), ("-b:a", "96k")]).scaled(PREVIEW_SCALE),
            },
            ProfileSpec {
                name: "hevc_vaapi",
                codec: "hevc_vaapi",
                family: CodecFamily::Hevc,
                acceleration: Acceleration::Vaapi,
                container: Container::Mp4,
                audio_codec: "aac",
                base: &[("-rc_mode", "CQP"), ("-tag:v", "hvc1")],
                full: QualityProfile::new(&[("-qp", "23"), ("-b:a", "192k")]),
                clip: QualityProfile::new(&[("-qp", "26"), ("-b:a", "128k")]),
                preview: QualityProfile::new(&[("-qp", "30"), ("-b:a", "96k")]).scaled(PREVIEW_SCALE),
            },
            ProfileSpec {
                name: "h264_nvenc",
                codec: "h264_nvenc",
                family: CodecFamily::H264,
                acceleration: Acceleration::Nvenc,
                container: Container::Mp4,
                audio_codec: "aac",
                base: &[("-preset", "p5"), ("-tune", "hq"), ("-rc", "vbr")],
                full: QualityProfile::new(&[("-cq", "21"), ("-b:a", "192k")]),
                clip: QualityProfile::new(&[("-cq", "25"), ("-b:a", "128k")]),
                preview: QualityProfile::new(&[("-cq", "30"), ("-b:a", "96k")]).scaled(PREVIEW_SCALE),
            },
        ];

        Self {
            profiles: specs.into_iter().map(ProfileSpec::build).collect(),
            nvenc_control: PathBuf::from(DEFAULT_NVENC_CONTROL),
        }
    }

    /// Override the node whose presence marks NVENC as usable.
    pub fn with_nvenc_control(mut self, node: impl AsRef<Path>) -> Self {
        self.nvenc_control = node.as_ref().to_path_buf();
        self
    }

    /// Node that must be openable for `profile` to run: the render device
    /// for VA-API, the driver control node for NVENC, nothing for software.
    pub fn required_node<'a>(&'a self, profile: &'a EncoderProfile) -> Option<&'a Path> {
        match profile.acceleration {
            Acceleration::Software => None,
            Acceleration::Vaapi => profile.device.as_deref(),
            Acceleration::Nvenc => Some(self.nvenc_control.as_path()),
        }
    }

    /// Override the device path of every hardware profile that uses one.
    pub fn with_device_path(mut self, device: impl AsRef<Path>) -> Self {
        for profile in &mut self.profiles {
            if profile.device.is_some() {
                profile.device = Some(device.as_ref().to_path_buf());
            }
        }
        self
    }

    /// Exact lookup by catalog name or ffmpeg encoder id, case-insensitive.
    pub fn get(&self, name: &str) -> Option<&EncoderProfile> {
        let name = name.trim();
        self.profiles
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
            .or_else(|| {
                self.profiles
                    .iter()
                    .find(|p| p.codec.eq_ignore_ascii_case(name))
            })
    }

    /// Look up a profile, substituting the baseline software encoder for
    /// unknown names.
    pub fn lookup(&self, name: &str) -> &EncoderProfile {
        match self.get(name) {
            Some(profile) => profile,
            None => {
                tracing::warn!(
                    requested = name,
                    substitute = BASELINE_ENCODER,
                    "Unknown encoder, using baseline"
                );
                self.baseline()
            }
        }
    }

    /// The baseline software encoder.
    pub fn baseline(&self) -> &EncoderProfile {
        self.profiles
            .iter()
            .find(|p| p.name == BASELINE_ENCODER)
            .unwrap_or(&self.profiles[0])
    }

    /// Software encoder of the same codec family as `profile`.
    ///
    /// Software profiles map to themselves. A family without a software
    /// encoder falls back to the baseline.
    pub fn software_fallback<'a>(&'a self, profile: &'a EncoderProfile) -> &'a EncoderProfile {
        if !profile.is_hardware() {
            return profile;
        }
        self.profiles
            .iter()
            .find(|p| p.family == profile.family && !p.is_hardware())
            .unwrap_or_else(|| self.baseline())
    }

    /// Codec family a requested codec name refers to.
    ///
    /// Accepts catalog names, ffmpeg encoder ids and ffprobe codec names.
    pub fn family_of(&self, name: &str) -> Option<CodecFamily> {
        self.get(name)
            .map(|p| p.family)
            .or_else(|| CodecFamily::from_codec_name(name))
    }

    /// All profiles.
    pub fn profiles(&self) -> &[EncoderProfile] {
        &self.profiles
    }

    /// All catalog names.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.profiles.iter().map(|p| p.name)
    }
}

impl Default for EncoderCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}
