//! External tool detection and management.

use reelcache_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Information about an external tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    /// Name of the tool.
    pub name: String,
    /// Whether the tool is available.
    pub available: bool,
    /// Version string if available.
    pub version: Option<String>,
    /// Path to the tool executable.
    pub path: Option<PathBuf>,
}

/// Resolved locations of the two tools reelcache drives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    /// The transcoder.
    pub ffmpeg: PathBuf,
    /// The prober.
    pub ffprobe: PathBuf,
}

impl ToolPaths {
    /// Resolve both tools, preferring configured paths over `PATH` lookup.
    ///
    /// A tool that cannot be found falls back to its bare name so that the
    /// failure surfaces as a spawn error at first use rather than at startup.
    pub fn resolve(ffmpeg: Option<&Path>, ffprobe: Option<&Path>) -> Self {
        let ffmpeg = get_tool_path("ffmpeg", ffmpeg).unwrap_or_else(|_| {
            tracing::warn!("ffmpeg not found on PATH; transcoding will fail");
            PathBuf::from("ffmpeg")
        });
        let ffprobe = get_tool_path("ffprobe", ffprobe).unwrap_or_else(|_| {
            tracing::warn!("ffprobe not found on PATH; probing will fail");
            PathBuf::from("ffprobe")
        });
        Self { ffmpeg, ffprobe }
    }
}

/// Check if a tool is available using a custom version argument.
///
/// # Example
///
/// ```no_run
/// use reelcache_av::tools::check_tool_with_arg;
///
/// let info = check_tool_with_arg("ffprobe", "-version");
/// if info.available {
///     println!("ffprobe version: {:?}", info.version);
/// }
/// ```
pub fn check_tool_with_arg(name: &str, version_arg: &str) -> ToolInfo {
    check_tool_at(name, Path::new(name), version_arg)
}

fn check_tool_at(name: &str, program: &Path, version_arg: &str) -> ToolInfo {
    match Command::new(program).arg(version_arg).output() {
        Ok(output) if output.status.success() => {
            let version = String::from_utf8_lossy(&output.stdout)
                .lines()
                .next()
                .map(|s| s.to_string());

            let path = if program.components().count() > 1 {
                Some(program.to_path_buf())
            } else {
                which::which(program).ok()
            };

            ToolInfo {
                name: name.to_string(),
                available: true,
                version,
                path,
            }
        }
        _ => ToolInfo {
            name: name.to_string(),
            available: false,
            version: None,
            path: None,
        },
    }
}

/// Check the tools reelcache needs at their resolved locations.
pub fn check_tools(paths: &ToolPaths) -> Vec<ToolInfo> {
    vec![
        check_tool_at("ffmpeg", &paths.ffmpeg, "-version"),
        check_tool_at("ffprobe", &paths.ffprobe, "-version"),
    ]
}

/// Require that a tool is available on `PATH`, returning its path.
///
/// # Errors
///
/// Returns [`Error::NotFound`] if the tool is not found.
pub fn require_tool(name: &str) -> Result<PathBuf> {
    which::which(name).map_err(|_| Error::not_found("tool", name))
}

/// Get the path to a tool, preferring a configured path over PATH lookup.
pub fn get_tool_path(name: &str, config_path: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = config_path {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        tracing::warn!(
            "Configured path for {} does not exist: {}",
            name,
            path.display()
        );
    }

    require_tool(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_tool_not_found() {
        let info = check_tool_with_arg("nonexistent_tool_12345", "--version");
        assert!(!info.available);
        assert!(info.version.is_none());
        assert!(info.path.is_none());
    }

    #[test]
    fn test_require_missing_tool() {
        let err = require_tool("nonexistent_tool_12345").unwrap_err();
        assert_eq!(err.http_status(), 404);
    }

    #[test]
    fn test_configured_path_wins() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let path = get_tool_path("ffmpeg", Some(file.path())).unwrap();
        assert_eq!(path, file.path());
    }

    #[test]
    fn test_resolve_falls_back_to_bare_name() {
        let missing = Path::new("/definitely/not/here/ffmpeg");
        let paths = ToolPaths::resolve(Some(missing), Some(missing));
        // Either found on PATH or the bare name; never the missing override.
        assert_ne!(paths.ffmpeg, missing);
        assert_ne!(paths.ffprobe, missing);
    }
}
