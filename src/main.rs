mod cli;

use reelcache::cache::{ArtifactClass, CacheKey, CacheStore, KeyMaterial, Variant};
use reelcache::{config, server};
use reelcache_av::assembler::{assemble, TranscodeJob, TranscodePlan, VideoTarget};
use reelcache_av::probe::summarize;
use reelcache_av::{
    check_tools, EncoderCatalog, FfprobeService, FlagSet, ProbeService, QualityTier, ToolPaths,
};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use std::path::{Path, PathBuf};

async fn start_server(
    host: Option<String>,
    port: Option<u16>,
    config_path: Option<&Path>,
) -> Result<()> {
    let mut config = config::load_config_or_default(config_path)?;

    // Override host/port from CLI if specified
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    tracing::info!("Starting reelcache server");
    tracing::info!(
        "Library: movies {:?}, shows {:?}; cache {:?}",
        config.library.movies_dir,
        config.library.shows_dir,
        config.cache.dir
    );

    server::start_server(config).await
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "reelcache=trace,reelcache_av=trace,reelcache_common=debug,tower_http=debug".to_string()
        } else {
            "reelcache=info,reelcache_av=info,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(env_filter))
        .init();

    match cli.command {
        Commands::Start { host, port } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(start_server(host, port, cli.config.as_deref()))
        }
        Commands::Probe { file, json } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(probe_file(&file, json, cli.config.as_deref()))
        }
        Commands::Plan {
            file,
            codec,
            quality,
            two_pass_log,
            output,
        } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(plan_file(PlanArgs {
                file,
                codec,
                quality,
                two_pass_log,
                output,
                config_path: cli.config,
            }))
        }
        Commands::CacheKey {
            file,
            audio_track,
            channels,
            codec,
        } => cache_key(&file, audio_track, channels, codec, cli.config.as_deref()),
        Commands::CheckTools => run_check_tools(cli.config.as_deref()),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("reelcache {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn tool_paths(config: &config::Config) -> ToolPaths {
    ToolPaths::resolve(
        config.tools.ffmpeg_path.as_deref(),
        config.tools.ffprobe_path.as_deref(),
    )
}

async fn probe_file(file: &Path, json: bool, config_path: Option<&Path>) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {:?}", file);
    }
    let config = config::load_config_or_default(config_path)?;
    let prober = FfprobeService::new(tool_paths(&config).ffprobe);

    let summary = summarize(&prober, file)
        .await
        .with_context(|| format!("Failed to probe {:?}", file))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    let secs = summary.duration_secs as u64;
    println!("File: {}", file.display());
    println!(
        "Duration: {:02}:{:02}:{:02}",
        secs / 3600,
        (secs / 60) % 60,
        secs % 60
    );
    println!(
        "Video: {} {}x{} ({})",
        summary.codec, summary.dimensions.width, summary.dimensions.height, summary.pixel_format
    );
    if summary.hdr {
        println!("HDR: yes");
    }

    println!("\nAudio Tracks: {}", summary.audio_tracks.len());
    for track in &summary.audio_tracks {
        print!("  [{}] {} {}ch", track.index, track.codec, track.channels);
        if let Some(ref lang) = track.language {
            print!(" ({})", lang);
        }
        println!();
    }

    println!("\nChapters: {}", summary.chapters.len());
    for chapter in &summary.chapters {
        println!(
            "  {:>9.3} - {:>9.3}  {}",
            chapter.start,
            chapter.end,
            chapter.title.as_deref().unwrap_or("")
        );
    }

    Ok(())
}

struct PlanArgs {
    file: PathBuf,
    codec: Option<String>,
    quality: String,
    two_pass_log: Option<PathBuf>,
    output: Option<PathBuf>,
    config_path: Option<PathBuf>,
}

async fn plan_file(args: PlanArgs) -> Result<()> {
    let config = config::load_config_or_default(args.config_path.as_deref())?;
    let quality: QualityTier = args.quality.parse()?;

    let mut catalog = EncoderCatalog::builtin();
    if let Some(device) = &config.transcode.hw_device {
        catalog = catalog.with_device_path(device);
    }
    let profile = catalog.lookup(args.codec.as_deref().unwrap_or(&config.transcode.default_codec));

    // Without a usable ffprobe the plan assumes an 8-bit SDR source.
    let prober = FfprobeService::new(tool_paths(&config).ffprobe);
    let hdr = match prober.is_hdr(&args.file).await {
        Ok(hdr) => hdr,
        Err(e) => {
            tracing::warn!("HDR probe failed, assuming SDR: {}", e);
            false
        }
    };
    let pixel_format = match prober.pixel_format(&args.file).await {
        Ok(fmt) => fmt,
        Err(e) => {
            tracing::warn!("Pixel format probe failed, assuming yuv420p: {}", e);
            "yuv420p".to_string()
        }
    };

    let output = args.output.unwrap_or_else(|| {
        let stem = args
            .file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string());
        PathBuf::from(format!("{stem}.{}", profile.container.extension()))
    });
    let passlog = args
        .two_pass_log
        .unwrap_or_else(|| std::env::temp_dir().join("reelcache-passlog"));

    let plan = assemble(&TranscodeJob {
        input: args.file,
        output,
        audio_index: 0,
        channels: 2,
        target: VideoTarget::Encode {
            profile,
            quality,
            hdr,
            pixel_format,
        },
        overrides: FlagSet::new(),
        passlog: Some(passlog),
    })?;

    println!("# encoder: {} ({}), quality: {}, hdr: {}", profile.name, profile.codec, quality, hdr);
    let ffmpeg = tool_paths(&config).ffmpeg;
    for (i, run) in plan.runs().into_iter().enumerate() {
        println!("# pass {}", i + 1);
        println!("{} {}", ffmpeg.display(), run.join(" "));
    }
    if let TranscodePlan::TwoPass { passlog, .. } = &plan {
        println!("# passlog prefix: {}", passlog.display());
    }

    Ok(())
}

fn cache_key(
    file: &Path,
    audio_track: u32,
    channels: u32,
    codec: Option<String>,
    config_path: Option<&Path>,
) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let catalog = EncoderCatalog::builtin();
    let requested = codec.unwrap_or_else(|| config.transcode.default_codec.clone());

    // Aliases such as "libx265" key under the catalog name, as the server does.
    let (label, ext) = match catalog.get(&requested) {
        Some(profile) => (profile.name, profile.container.extension()),
        None => (requested.as_str(), "mkv"),
    };
    let key = CacheKey::derive(&KeyMaterial {
        source: file,
        audio_index: audio_track,
        channels,
        codec: label,
        variant: Variant::Full,
    });
    let store = CacheStore::new(&config.cache.dir, &config.cache.work_dir);
    let entry = store.entry(ArtifactClass::Full, &key, ext);

    println!("{}", key);
    println!(
        "{} ({})",
        entry.path.display(),
        if entry.is_valid() { "cached" } else { "missing" }
    );
    Ok(())
}

fn run_check_tools(config_path: Option<&Path>) -> Result<()> {
    println!("Checking external tools...\n");

    let config = config::load_config_or_default(config_path)?;
    let tools = check_tools(&tool_paths(&config));
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version.lines().next().unwrap_or(""));
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Install them to enable transcoding.");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            println!("  Server: {}:{}", config.server.host, config.server.port);
            println!("  Movies: {:?}", config.library.movies_dir);
            println!("  Shows: {:?}", config.library.shows_dir);
            println!("  Cache: {:?}", config.cache.dir);
            println!(
                "  Hardware encoder: {}",
                config.transcode.hardware_encoder.as_deref().unwrap_or("none")
            );
        }
        None => {
            println!("No config file specified, using defaults");
            let config = config::Config::default();
            println!("Default config:");
            println!("  Server: {}:{}", config.server.host, config.server.port);
        }
    }

    Ok(())
}
