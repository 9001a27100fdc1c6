mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = [
        "./reelcache.toml",
        "./config.toml",
        "~/.config/reelcache/config.toml",
        "/etc/reelcache/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.server.port == 0 {
        anyhow::bail!("Server port cannot be 0");
    }

    if config.coordinator.poll_interval_ms == 0 {
        anyhow::bail!("Coordinator poll interval cannot be 0");
    }
    if config.coordinator.max_attempts == 0 {
        anyhow::bail!("Coordinator max attempts cannot be 0");
    }

    if !config.clip.max_window_secs.is_finite() || config.clip.max_window_secs <= 0.0 {
        anyhow::bail!(
            "Clip max window must be a positive number of seconds, got {}",
            config.clip.max_window_secs
        );
    }

    if config.transcode.timeout_secs == 0 {
        anyhow::bail!("Transcode timeout cannot be 0");
    }

    for (name, path) in [
        ("movies", &config.library.movies_dir),
        ("shows", &config.library.shows_dir),
    ] {
        if !path.exists() {
            tracing::warn!("Library {} directory does not exist: {:?}", name, path);
        }
    }

    if config.cache.work_dir.starts_with(&config.cache.dir) {
        tracing::warn!(
            "Work directory {:?} is inside the cache root {:?}",
            config.cache.work_dir,
            config.cache.dir
        );
    }

    Ok(())
}
