//! On-disk layout of derived artifacts.
//!
//! ```text
//! <cache root>/full/<key>.<ext>     whole-title re-encodes
//! <cache root>/clips/<key>.<ext>    clips
//! <work dir>/passlog/<key>.<uuid>   two-pass statistics prefix
//! <work dir>/<key>.<uuid>.<ext>     clip extraction scratch
//! ```
//!
//! Generation writes to a hidden `.partial` sibling of the final path and
//! publishes with a rename, so a published file is always complete.

use std::path::{Path, PathBuf};

use reelcache_common::Result;
use tracing::warn;
use uuid::Uuid;

use super::CacheKey;

/// Kind of derived artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactClass {
    /// Whole-title re-encode.
    Full,
    /// Bounded clip.
    Clip,
}

impl ArtifactClass {
    fn dir_name(self) -> &'static str {
        match self {
            ArtifactClass::Full => "full",
            ArtifactClass::Clip => "clips",
        }
    }
}

/// Where an artifact for a key lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Key the entry belongs to.
    pub key: CacheKey,
    /// Final path.
    pub path: PathBuf,
}

impl CacheEntry {
    /// Whether the artifact exists with non-zero length.
    pub fn is_valid(&self) -> bool {
        is_valid_file(&self.path)
    }

    /// [`is_valid`](Self::is_valid) without blocking the executor.
    pub async fn is_ready(&self) -> bool {
        file_ready(&self.path).await
    }
}

/// A file counts as a cache hit when it exists and is not empty.
pub fn is_valid_file(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}

/// Async form of [`is_valid_file`].
pub async fn file_ready(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}

/// Cache directory layout.
#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
    work_dir: PathBuf,
}

impl CacheStore {
    /// Store rooted at `root`, scratch files under `work_dir`.
    pub fn new(root: impl Into<PathBuf>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            work_dir: work_dir.into(),
        }
    }

    /// Cache root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Scratch directory.
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Create every directory the store writes to.
    pub fn ensure_dirs(&self) -> Result<()> {
        for class in [ArtifactClass::Full, ArtifactClass::Clip] {
            std::fs::create_dir_all(self.root.join(class.dir_name()))?;
        }
        std::fs::create_dir_all(self.passlog_dir())?;
        Ok(())
    }

    /// Final location of the artifact for `key`.
    pub fn entry(&self, class: ArtifactClass, key: &CacheKey, ext: &str) -> CacheEntry {
        CacheEntry {
            key: key.clone(),
            path: self
                .root
                .join(class.dir_name())
                .join(format!("{key}.{ext}")),
        }
    }

    /// A unique in-progress path next to `entry`.
    ///
    /// Same directory as the final path so publishing is a same-filesystem
    /// rename.
    pub fn temp_path(&self, entry: &CacheEntry) -> PathBuf {
        let ext = entry
            .path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default();
        let name = format!(".{}.{}.partial.{}", entry.key, Uuid::new_v4().simple(), ext);
        entry.path.with_file_name(name)
    }

    /// Move a finished temp file into place.
    pub async fn publish(&self, temp: &Path, entry: &CacheEntry) -> Result<()> {
        tokio::fs::rename(temp, &entry.path).await?;
        Ok(())
    }

    /// Remove a file, ignoring absence and logging anything else.
    pub async fn discard(&self, path: &Path) {
        if let Err(e) = tokio::fs::remove_file(path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %path.display(), error = %e, "Failed to discard file");
            }
        }
    }

    fn passlog_dir(&self) -> PathBuf {
        self.work_dir.join("passlog")
    }

    /// Two-pass statistics prefix for one generation of `key`. Unique per
    /// call so two encoders never share a stats file.
    pub fn passlog_prefix(&self, key: &CacheKey) -> PathBuf {
        self.passlog_dir()
            .join(format!("{key}.{}", Uuid::new_v4().simple()))
    }

    /// Unique scratch file for `key`.
    pub fn scratch_path(&self, key: &CacheKey, ext: &str) -> PathBuf {
        self.work_dir
            .join(format!("{key}.{}.{ext}", Uuid::new_v4().simple()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{KeyMaterial, Variant};

    fn key() -> CacheKey {
        CacheKey::derive(&KeyMaterial {
            source: Path::new("/media/a.mkv"),
            audio_index: 0,
            channels: 2,
            codec: "h264",
            variant: Variant::Full,
        })
    }

    #[test]
    fn layout() {
        let store = CacheStore::new("/cache", "/work");
        let key = key();
        let entry = store.entry(ArtifactClass::Clip, &key, "mp4");
        assert_eq!(entry.path, PathBuf::from(format!("/cache/clips/{key}.mp4")));
        assert_eq!(
            store.entry(ArtifactClass::Full, &key, "mkv").path,
            PathBuf::from(format!("/cache/full/{key}.mkv"))
        );
        let passlog = store.passlog_prefix(&key);
        assert_eq!(passlog.parent(), Some(Path::new("/work/passlog")));
        assert!(passlog
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with(&format!("{key}.")));
        assert!(!passlog.starts_with(store.root()));
    }

    #[test]
    fn passlog_prefixes_are_unique_per_generation() {
        let store = CacheStore::new("/cache", "/work");
        let key = key();
        assert_ne!(store.passlog_prefix(&key), store.passlog_prefix(&key));
    }

    #[test]
    fn temp_paths_are_unique_hidden_siblings() {
        let store = CacheStore::new("/cache", "/work");
        let entry = store.entry(ArtifactClass::Full, &key(), "mp4");
        let a = store.temp_path(&entry);
        let b = store.temp_path(&entry);
        assert_ne!(a, b);
        assert_eq!(a.parent(), entry.path.parent());
        let name = a.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with('.'));
        assert!(name.ends_with(".partial.mp4"));
    }

    #[tokio::test]
    async fn publish_and_validity() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path().join("cache"), dir.path().join("work"));
        store.ensure_dirs().unwrap();

        let entry = store.entry(ArtifactClass::Full, &key(), "mp4");
        assert!(!entry.is_valid());

        let temp = store.temp_path(&entry);
        std::fs::write(&temp, b"").unwrap();
        store.publish(&temp, &entry).await.unwrap();
        assert!(!entry.is_valid(), "empty file must not count");
        assert!(!entry.is_ready().await);

        let temp = store.temp_path(&entry);
        std::fs::write(&temp, b"video").unwrap();
        store.publish(&temp, &entry).await.unwrap();
        assert!(entry.is_valid());
        assert!(entry.is_ready().await);
        assert!(!temp.exists());
    }

    #[tokio::test]
    async fn discard_is_best_effort() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path(), dir.path().join("work"));
        let path = dir.path().join("x.partial.mp4");
        std::fs::write(&path, b"x").unwrap();
        store.discard(&path).await;
        store.discard(&path).await;
        assert!(!path.exists());
    }
}
