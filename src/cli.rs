use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "reelcache")]
#[command(author, version, about = "On-demand media transcoding and caching server")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server
    Start {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Probe a media file and display information
    Probe {
        /// File to probe
        #[arg(required = true)]
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the ffmpeg invocations an encode would run, without running them
    Plan {
        /// Source file
        #[arg(required = true)]
        file: PathBuf,

        /// Encoder name from the catalog (defaults to transcode.default_codec)
        #[arg(long)]
        codec: Option<String>,

        /// Quality tier: full, clip or preview
        #[arg(long, default_value = "full")]
        quality: String,

        /// Two-pass statistics prefix
        #[arg(long)]
        two_pass_log: Option<PathBuf>,

        /// Output path (defaults to <stem>.<container ext> in the current directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the cache key and cache path for a full-title encode
    CacheKey {
        /// Source file, as the library reports it
        #[arg(required = true)]
        file: PathBuf,

        /// Audio track index
        #[arg(long, default_value = "0")]
        audio_track: u32,

        /// Output channel count
        #[arg(long, default_value = "2")]
        channels: u32,

        /// Codec label (defaults to transcode.default_codec)
        #[arg(long)]
        codec: Option<String>,
    },

    /// Check that required external tools are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
