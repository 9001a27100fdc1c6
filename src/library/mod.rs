//! Resolving movie and episode requests to source files.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use reelcache_common::paths::is_video_file;
use reelcache_common::{Error, LibraryEntry, MediaQuery, Result};
use walkdir::WalkDir;

/// Source of media files.
#[async_trait]
pub trait MediaLibrary: Send + Sync {
    /// Find the file for a query.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when nothing matches.
    async fn lookup(&self, query: &MediaQuery) -> Result<LibraryEntry>;
}

/// Library laid out on disk.
///
/// - Movies: `<movies_dir>/<name>/` (first video file, by name) or
///   `<movies_dir>/<name>.<ext>`.
/// - Episodes: any video file under `<shows_dir>/<name>/` whose file name
///   carries `SxxEyy` for the requested season and episode.
#[derive(Debug, Clone)]
pub struct DirectoryLibrary {
    movies_dir: PathBuf,
    shows_dir: PathBuf,
}

impl DirectoryLibrary {
    /// Library over the two root directories.
    pub fn new(movies_dir: impl Into<PathBuf>, shows_dir: impl Into<PathBuf>) -> Self {
        Self {
            movies_dir: movies_dir.into(),
            shows_dir: shows_dir.into(),
        }
    }
}

/// Reject names that would escape the library root.
fn check_name(name: &str) -> Result<()> {
    if name.is_empty()
        || name.starts_with('.')
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0')
    {
        return Err(Error::invalid(format!("invalid library name: {name:?}")));
    }
    Ok(())
}

fn episode_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)s(\d{1,3})[ ._-]?e(\d{1,4})").unwrap_or_else(|e| unreachable!("{e}"))
    })
}

/// Season and episode numbers encoded in a file name.
pub fn parse_episode_marker(file_name: &str) -> Option<(u32, u32)> {
    let caps = episode_pattern().captures(file_name)?;
    Some((caps[1].parse().ok()?, caps[2].parse().ok()?))
}

fn sorted_videos(dir: &Path, max_depth: usize) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .max_depth(max_depth)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && is_video_file(e.path()))
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}

fn find_movie(movies_dir: &Path, name: &str) -> Option<PathBuf> {
    let dir = movies_dir.join(name);
    if dir.is_dir() {
        return sorted_videos(&dir, 1).into_iter().next();
    }

    std::fs::read_dir(movies_dir)
        .ok()?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && is_video_file(p))
        .filter(|p| p.file_stem().is_some_and(|s| s == name))
        .min()
}

fn find_episode(shows_dir: &Path, show: &str, season: u32, episode: u32) -> Option<PathBuf> {
    let dir = shows_dir.join(show);
    if !dir.is_dir() {
        return None;
    }
    sorted_videos(&dir, usize::MAX).into_iter().find(|p| {
        p.file_name()
            .and_then(|n| n.to_str())
            .and_then(parse_episode_marker)
            == Some((season, episode))
    })
}

#[async_trait]
impl MediaLibrary for DirectoryLibrary {
    async fn lookup(&self, query: &MediaQuery) -> Result<LibraryEntry> {
        let found = match query {
            MediaQuery::Movie { name } => {
                check_name(name)?;
                let root = self.movies_dir.clone();
                let name = name.clone();
                tokio::task::spawn_blocking(move || find_movie(&root, &name)).await
            }
            MediaQuery::Episode {
                show,
                season,
                episode,
            } => {
                check_name(show)?;
                let root = self.shows_dir.clone();
                let show = show.clone();
                let (season, episode) = (*season, *episode);
                tokio::task::spawn_blocking(move || find_episode(&root, &show, season, episode))
                    .await
            }
        }
        .map_err(|e| Error::internal(format!("library lookup task failed: {e}")))?;

        match found {
            Some(path) => {
                tracing::debug!(query = %query, path = %path.display(), "Library hit");
                Ok(LibraryEntry::new(path))
            }
            None => Err(Error::not_found(query.entity(), query)),
        }
    }
}
