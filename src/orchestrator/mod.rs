//! Request orchestration: from a library query to a file worth streaming.
//!
//! [`MediaService`] decides whether a request can be served from the source,
//! from the cache, or needs a generation, and runs that generation through
//! the [`GenerationCoordinator`] so concurrent requests share one encode.

mod clip;
pub mod decision;
mod video;

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use reelcache_av::{EncoderCatalog, HardwareProbe, ProbeService, TranscodeExecutor};
use reelcache_common::{Error, Result};
use tracing::{info, warn, Instrument};

use crate::cache::{Acquired, CacheEntry, CacheStore, GenerationCoordinator};
use crate::config::Config;
use crate::library::MediaLibrary;

pub use clip::ClipRequest;
pub use video::VideoRequest;

/// Where a delivered file came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// The library file itself.
    Source,
    /// An artifact that was already cached.
    Cache,
    /// Generated for this request, or by a concurrent one it joined.
    Generated,
}

impl Origin {
    /// Lowercase name, sent in the `X-Reelcache-Origin` header.
    pub fn as_str(self) -> &'static str {
        match self {
            Origin::Source => "source",
            Origin::Cache => "cache",
            Origin::Generated => "generated",
        }
    }
}

/// A file ready to be streamed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// File to stream.
    pub path: PathBuf,
    /// `Content-Type` to send.
    pub content_type: &'static str,
    /// How the file was obtained.
    pub origin: Origin,
}

/// Tunables the orchestrator reads from configuration.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// Longest clip in seconds.
    pub max_clip_window: f64,
    /// Encoder for clips when no hardware encoder is preferred.
    pub clip_codec: String,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            max_clip_window: 600.0,
            clip_codec: reelcache_av::catalog::BASELINE_ENCODER.to_string(),
        }
    }
}

impl From<&Config> for ServiceSettings {
    fn from(config: &Config) -> Self {
        Self {
            max_clip_window: config.clip.max_window_secs,
            clip_codec: config.clip.codec.clone(),
        }
    }
}

/// Everything a request needs, shared across handlers.
///
/// Cheap to clone; every collaborator sits behind an `Arc`.
#[derive(Clone)]
pub struct MediaService {
    library: Arc<dyn MediaLibrary>,
    prober: Arc<dyn ProbeService>,
    executor: Arc<TranscodeExecutor>,
    catalog: Arc<EncoderCatalog>,
    store: Arc<CacheStore>,
    coordinator: GenerationCoordinator,
    hardware: Arc<dyn HardwareProbe>,
    settings: Arc<ServiceSettings>,
}

impl MediaService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        library: Arc<dyn MediaLibrary>,
        prober: Arc<dyn ProbeService>,
        executor: TranscodeExecutor,
        catalog: EncoderCatalog,
        store: CacheStore,
        coordinator: GenerationCoordinator,
        hardware: Arc<dyn HardwareProbe>,
        settings: ServiceSettings,
    ) -> Self {
        Self {
            library,
            prober,
            executor: Arc::new(executor),
            catalog: Arc::new(catalog),
            store: Arc::new(store),
            coordinator,
            hardware,
            settings: Arc::new(settings),
        }
    }

    pub fn catalog(&self) -> &EncoderCatalog {
        &self.catalog
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    pub fn coordinator(&self) -> &GenerationCoordinator {
        &self.coordinator
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    /// Serve `entry` from disk, generating it first if needed.
    ///
    /// The owner's generation runs on its own task: it writes to a temp path
    /// handed to `generate`, and on success the file is renamed into place
    /// before the ticket is released. Dropping the calling future (a client
    /// disconnect) does not stop it.
    async fn obtain<F, Fut>(&self, entry: CacheEntry, generate: F) -> Result<(PathBuf, Origin)>
    where
        F: FnOnce(PathBuf) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        if entry.is_ready().await {
            return Ok((entry.path, Origin::Cache));
        }

        let guard = match self.coordinator.begin_or_join(&entry.key, &entry.path).await? {
            Acquired::Ready(path) => return Ok((path, Origin::Generated)),
            Acquired::Owner(guard) => guard,
        };

        let store = Arc::clone(&self.store);
        let span = tracing::info_span!("generate", key = %entry.key);
        let task_entry = entry.clone();
        let handle = tokio::spawn(
            async move {
                let entry = task_entry;
                if let Some(parent) = entry.path.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                let temp = store.temp_path(&entry);

                let result = match generate(temp.clone()).await {
                    Ok(()) => store.publish(&temp, &entry).await,
                    Err(e) => Err(e),
                };
                match &result {
                    Ok(()) => info!(path = %entry.path.display(), "Artifact published"),
                    Err(e) => {
                        warn!(error = %e, "Generation failed");
                        store.discard(&temp).await;
                    }
                }
                // Published (or cleaned up) before joiners are woken.
                drop(guard);
                result
            }
            .instrument(span),
        );

        handle
            .await
            .map_err(|e| Error::internal(format!("generation task failed: {e}")))??;
        Ok((entry.path, Origin::Generated))
    }
}

impl std::fmt::Debug for MediaService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaService")
            .field("store", &self.store)
            .field("coordinator", &self.coordinator)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
