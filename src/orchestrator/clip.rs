//! Clip requests: a time window extracted by stream copy, then re-encoded.

use std::sync::Arc;

use reelcache_av::assembler::{extraction_args, TranscodeJob, VideoTarget};
use reelcache_av::catalog::QualityTier;
use reelcache_av::flags::FlagSet;
use reelcache_av::hardware::select_encoder;
use reelcache_av::assemble;
use reelcache_common::{AudioSelector, ClipWindow, Error, MediaQuery, Result};
use tracing::debug;

use super::decision::select_audio;
use super::{Delivery, MediaService};
use crate::cache::{ArtifactClass, CacheKey, KeyMaterial, Variant};

/// Query parameters of a clip request, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipRequest {
    /// Window start.
    pub start: f64,
    /// Window end.
    pub end: f64,
}

impl MediaService {
    /// Resolve a clip request to a file to stream.
    ///
    /// The window must be non-empty, no longer than the configured maximum
    /// and start before the end of the source. An end past the source is
    /// clamped.
    pub async fn clip(&self, query: &MediaQuery, request: ClipRequest) -> Result<Delivery> {
        let max_len = self.settings.max_clip_window;
        ClipWindow::new(request.start, request.end, max_len)?;

        let entry = self.library.lookup(query).await?;
        let source = entry.path;

        let duration = self.prober.duration(&source).await?.as_secs_f64();
        if request.start >= duration {
            return Err(Error::invalid(format!(
                "clip start {}s is past the end of the media ({duration:.3}s)",
                request.start
            )));
        }
        let window = ClipWindow::new(request.start, request.end.min(duration), max_len)?;

        let tracks = match entry.audio_tracks {
            Some(tracks) => tracks,
            None => self.prober.audio_tracks(&source).await?,
        };
        // Clips keep the default track when there is one; silent sources
        // produce silent clips.
        let audio_index = select_audio(&tracks, AudioSelector::Stereo)
            .ok()
            .map(|t| t.index);

        let profile = select_encoder(
            &self.catalog,
            self.hardware.as_ref(),
            &self.settings.clip_codec,
        );
        let encoder = profile.name;
        let container = profile.container;

        let key = CacheKey::derive(&KeyMaterial {
            source: &source,
            audio_index: audio_index.unwrap_or(0),
            channels: 2,
            codec: encoder,
            variant: Variant::Clip {
                window,
                tier: QualityTier::Clip,
            },
        });
        let cache_entry = self
            .store
            .entry(ArtifactClass::Clip, &key, container.extension());
        debug!(
            query = %query,
            start = window.start,
            end = window.end,
            encoder,
            key = %key,
            "Clip request resolved"
        );

        let catalog = Arc::clone(&self.catalog);
        let prober = Arc::clone(&self.prober);
        let executor = Arc::clone(&self.executor);
        let store = Arc::clone(&self.store);

        let (path, origin) = self
            .obtain(cache_entry, move |output| async move {
                tokio::fs::create_dir_all(store.work_dir()).await?;
                let segment = store.scratch_path(&key, "mkv");
                let result: Result<()> = async {
                    executor
                        .run_args(&extraction_args(
                            &source,
                            window.start,
                            window.len(),
                            audio_index,
                            &segment,
                        ))
                        .await?;

                    // Tone mapping follows the source, not the copied segment.
                    let hdr = prober.is_hdr(&source).await?;
                    let pixel_format = prober.pixel_format(&source).await?;

                    let passlog = store.passlog_prefix(&key);
                    if let Some(dir) = passlog.parent() {
                        tokio::fs::create_dir_all(dir).await?;
                    }
                    let plan = assemble(&TranscodeJob {
                        input: segment.clone(),
                        output: output.clone(),
                        audio_index: 0,
                        channels: 2,
                        target: VideoTarget::Encode {
                            profile: catalog.lookup(encoder),
                            quality: QualityTier::Clip,
                            hdr,
                            pixel_format,
                        },
                        overrides: FlagSet::new(),
                        passlog: Some(passlog),
                    })?;
                    executor.execute(&plan, &output).await
                }
                .await;

                store.discard(&segment).await;
                result
            })
            .await?;

        Ok(Delivery {
            path,
            content_type: container.mime_type(),
            origin,
        })
    }
}
