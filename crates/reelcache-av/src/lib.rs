//! # reelcache-av
//!
//! Everything reelcache knows about ffmpeg, without any HTTP:
//!
//! - [`catalog`]: declarative encoder profiles and quality tiers
//! - [`filters`]: typed video filter chains, including HDR tone-mapping
//! - [`assembler`]: turning a transcode job into ffmpeg argument vectors
//! - [`probe`]: per-query `ffprobe` lookups behind the [`ProbeService`] trait
//! - [`executor`]: running plans and cleaning up after them
//! - [`hardware`]: hardware encoder preference and device fallback
//!
//! ## Example
//!
//! ```
//! use reelcache_av::{assemble, EncoderCatalog, FlagSet, QualityTier, TranscodeJob, VideoTarget};
//!
//! let catalog = EncoderCatalog::builtin();
//! let job = TranscodeJob {
//!     input: "/media/in.mkv".into(),
//!     output: "/cache/out.mp4".into(),
//!     audio_index: 0,
//!     channels: 2,
//!     target: VideoTarget::Encode {
//!         profile: catalog.lookup("h264"),
//!         quality: QualityTier::Full,
//!         hdr: false,
//!         pixel_format: "yuv420p".into(),
//!     },
//!     overrides: FlagSet::new(),
//!     passlog: None,
//! };
//! let plan = assemble(&job)?;
//! assert_eq!(plan.passes(), 1);
//! # Ok::<(), reelcache_common::Error>(())
//! ```

pub mod assembler;
pub mod catalog;
pub mod command;
pub mod executor;
pub mod filters;
pub mod flags;
pub mod hardware;
pub mod probe;
pub mod tools;

pub use assembler::{assemble, extraction_args, TranscodeJob, TranscodePlan, VideoTarget};
pub use catalog::{Container, CodecFamily, EncoderCatalog, EncoderProfile, QualityTier};
pub use command::{ToolCommand, ToolOutput};
pub use executor::TranscodeExecutor;
pub use filters::{FilterChain, FilterStage};
pub use flags::FlagSet;
pub use hardware::{ConfiguredHardwareProbe, HardwareProbe};
pub use probe::{Chapter, Dimensions, FfprobeService, ProbeService};
pub use tools::{check_tools, require_tool, ToolInfo, ToolPaths};
