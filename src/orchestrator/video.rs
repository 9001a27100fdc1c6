//! Full-title requests.

use std::sync::Arc;

use reelcache_av::assembler::{COPY_CONTAINER, TranscodeJob, VideoTarget};
use reelcache_av::catalog::QualityTier;
use reelcache_av::flags::FlagSet;
use reelcache_av::hardware::usable_profile;
use reelcache_av::assemble;
use reelcache_common::paths::guess_content_type;
use reelcache_common::{AudioSelector, MediaQuery, Result};
use tracing::debug;

use super::decision::{decide, output_channels, select_audio, Decision};
use super::{Delivery, MediaService, Origin};
use crate::cache::{ArtifactClass, CacheKey, KeyMaterial, Variant};

/// Query parameters of a full-video request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VideoRequest {
    /// Audio track selection.
    pub audio: AudioSelector,
    /// Target video codec, if the caller wants a specific one.
    pub codec: Option<String>,
}

impl MediaService {
    /// Resolve a full-video request to a file to stream.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`](reelcache_common::Error::NotFound) if the library
    ///   has no such title.
    /// - [`Error::InvalidRequest`](reelcache_common::Error::InvalidRequest) for
    ///   an audio selector the source cannot satisfy or an unknown codec.
    /// - Tool, probe and generation errors from the encode.
    pub async fn video(&self, query: &MediaQuery, request: &VideoRequest) -> Result<Delivery> {
        let entry = self.library.lookup(query).await?;
        let source = entry.path;

        let tracks = match entry.audio_tracks {
            Some(tracks) => tracks,
            None => self.prober.audio_tracks(&source).await?,
        };
        let track = select_audio(&tracks, request.audio)?.clone();

        let source_codec = match request.codec {
            Some(_) => Some(self.prober.codec_name(&source).await?),
            None => None,
        };
        let decision = decide(
            &self.catalog,
            request.codec.as_deref(),
            source_codec.as_deref(),
            request.audio,
            &track,
        )?;
        debug!(
            query = %query,
            audio = %request.audio,
            track = track.index,
            channels = track.channels,
            ?decision,
            "Video request decided"
        );

        if decision == Decision::Passthrough {
            return Ok(Delivery {
                content_type: guess_content_type(&source),
                path: source,
                origin: Origin::Source,
            });
        }

        let channels = output_channels(request.audio, &track);
        let encoder = match decision {
            Decision::Encode { encoder } => {
                Some(usable_profile(&self.catalog, self.catalog.lookup(encoder)).name)
            }
            _ => None,
        };
        let container = match encoder {
            Some(name) => self.catalog.lookup(name).container,
            None => COPY_CONTAINER,
        };

        let key = CacheKey::derive(&KeyMaterial {
            source: &source,
            audio_index: track.index,
            channels,
            codec: encoder.unwrap_or(decision.codec_label()),
            variant: Variant::Full,
        });
        let cache_entry = self
            .store
            .entry(ArtifactClass::Full, &key, container.extension());

        let catalog = Arc::clone(&self.catalog);
        let prober = Arc::clone(&self.prober);
        let executor = Arc::clone(&self.executor);
        let passlog = self.store.passlog_prefix(&key);
        let audio_index = track.index;

        let (path, origin) = self
            .obtain(cache_entry, move |output| async move {
                let target = match encoder {
                    Some(name) => VideoTarget::Encode {
                        profile: catalog.lookup(name),
                        quality: QualityTier::Full,
                        hdr: prober.is_hdr(&source).await?,
                        pixel_format: prober.pixel_format(&source).await?,
                    },
                    None => VideoTarget::Copy,
                };
                if let Some(dir) = passlog.parent() {
                    tokio::fs::create_dir_all(dir).await?;
                }
                let plan = assemble(&TranscodeJob {
                    input: source,
                    output: output.clone(),
                    audio_index,
                    channels,
                    target,
                    overrides: FlagSet::new(),
                    passlog: Some(passlog),
                })?;
                executor.execute(&plan, &output).await
            })
            .await?;

        Ok(Delivery {
            path,
            content_type: container.mime_type(),
            origin,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheStore, GenerationCoordinator};
    use crate::orchestrator::testing::{entry, movie, FixedLibrary, FixedProbe};
    use crate::orchestrator::ServiceSettings;
    use reelcache_av::{ConfiguredHardwareProbe, EncoderCatalog, TranscodeExecutor};
    use reelcache_common::AudioTrack;
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    /// Fake ffmpeg: logs its arguments and writes its last argument.
    #[cfg(unix)]
    fn fake_ffmpeg(dir: &Path) -> (PathBuf, PathBuf) {
        slow_ffmpeg(dir, 0.0)
    }

    /// Like [`fake_ffmpeg`], sleeping `secs` between logging and writing.
    #[cfg(unix)]
    fn slow_ffmpeg(dir: &Path, secs: f64) -> (PathBuf, PathBuf) {
        use std::os::unix::fs::PermissionsExt;
        let log = dir.join("ffmpeg.log");
        let script = dir.join("ffmpeg");
        std::fs::write(
            &script,
            format!(
                "#!/bin/sh\necho \"$@\" >> '{}'\nsleep {secs}\nfor last; do :; done\n[ \"$last\" = /dev/null ] || printf encoded > \"$last\"\n",
                log.display()
            ),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        (script, log)
    }

    fn service(dir: &Path, ffmpeg: &Path, probe: FixedProbe) -> (MediaService, PathBuf) {
        let coordinator = GenerationCoordinator::new(Duration::from_millis(10), 500);
        service_with(dir, ffmpeg, probe, coordinator)
    }

    fn service_with(
        dir: &Path,
        ffmpeg: &Path,
        probe: FixedProbe,
        coordinator: GenerationCoordinator,
    ) -> (MediaService, PathBuf) {
        let source = dir.join("Heat.mkv");
        std::fs::write(&source, b"source bytes").unwrap();
        let mut titles = HashMap::new();
        titles.insert(movie("Heat"), entry(&source));

        let store = CacheStore::new(dir.join("cache"), dir.join("work"));
        store.ensure_dirs().unwrap();
        let service = MediaService::new(
            Arc::new(FixedLibrary(titles)),
            Arc::new(probe),
            TranscodeExecutor::new(ffmpeg),
            EncoderCatalog::builtin(),
            store,
            coordinator,
            Arc::new(ConfiguredHardwareProbe::default()),
            ServiceSettings::default(),
        );
        (service, source)
    }

    fn invocations(log: &Path) -> usize {
        std::fs::read_to_string(log)
            .map(|s| s.lines().count())
            .unwrap_or(0)
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn max_audio_on_surround_streams_source() {
        let dir = tempfile::tempdir().unwrap();
        let (ffmpeg, log) = fake_ffmpeg(dir.path());
        let probe = FixedProbe {
            audio: vec![
                AudioTrack { index: 0, codec: "aac".into(), channels: 2, language: None },
                AudioTrack { index: 1, codec: "eac3".into(), channels: 6, language: None },
            ],
            ..FixedProbe::default()
        };
        let (service, source) = service(dir.path(), &ffmpeg, probe);

        let request = VideoRequest { audio: AudioSelector::Max, codec: None };
        let delivery = service.video(&movie("Heat"), &request).await.unwrap();
        assert_eq!(delivery.origin, Origin::Source);
        assert_eq!(delivery.path, source);
        assert_eq!(delivery.content_type, "video/x-matroska");
        assert_eq!(invocations(&log), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn codec_change_generates_once_then_hits_cache() {
        let dir = tempfile::tempdir().unwrap();
        let (ffmpeg, log) = fake_ffmpeg(dir.path());
        let (service, _) = service(dir.path(), &ffmpeg, FixedProbe::default());
        let request = VideoRequest {
            audio: AudioSelector::Stereo,
            codec: Some("hevc".into()),
        };

        let first = service.video(&movie("Heat"), &request).await.unwrap();
        assert_eq!(first.origin, Origin::Generated);
        assert_eq!(first.content_type, "video/mp4");
        assert_eq!(std::fs::read(&first.path).unwrap(), b"encoded");
        assert!(first.path.starts_with(dir.path().join("cache").join("full")));

        let second = service.video(&movie("Heat"), &request).await.unwrap();
        assert_eq!(second.origin, Origin::Cache);
        assert_eq!(second.path, first.path);
        assert_eq!(invocations(&log), 1);
        assert_eq!(service.coordinator().in_flight(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn encode_outlasting_the_wait_bound_runs_once() {
        let dir = tempfile::tempdir().unwrap();
        let (ffmpeg, log) = slow_ffmpeg(dir.path(), 0.4);
        // Joiners give up after 50ms, well before the encode finishes.
        let coordinator = GenerationCoordinator::new(Duration::from_millis(10), 5);
        let (service, _) = service_with(dir.path(), &ffmpeg, FixedProbe::default(), coordinator);
        let service = Arc::new(service);
        let request = VideoRequest {
            audio: AudioSelector::Stereo,
            codec: Some("hevc".into()),
        };

        let first = {
            let service = Arc::clone(&service);
            let request = request.clone();
            tokio::spawn(async move { service.video(&movie("Heat"), &request).await })
        };
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(service.coordinator().in_flight(), 1);

        let err = service.video(&movie("Heat"), &request).await.unwrap_err();
        assert_eq!(err.code(), "generation_timeout");
        assert_eq!(invocations(&log), 1, "second encode started for the same key");

        let first = first.await.unwrap().unwrap();
        assert_eq!(first.origin, Origin::Generated);
        assert_eq!(invocations(&log), 1);
        assert_eq!(service.coordinator().in_flight(), 0);
        assert!(std::fs::read_dir(dir.path().join("work").join("passlog"))
            .unwrap()
            .next()
            .is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn surround_default_request_copies_video() {
        let dir = tempfile::tempdir().unwrap();
        let (ffmpeg, log) = fake_ffmpeg(dir.path());
        let probe = FixedProbe {
            audio: vec![AudioTrack { index: 0, codec: "dts".into(), channels: 6, language: None }],
            ..FixedProbe::default()
        };
        let (service, _) = service(dir.path(), &ffmpeg, probe);

        let delivery = service
            .video(&movie("Heat"), &VideoRequest::default())
            .await
            .unwrap();
        assert_eq!(delivery.origin, Origin::Generated);
        assert_eq!(delivery.content_type, "video/x-matroska");

        let args = std::fs::read_to_string(&log).unwrap();
        assert!(args.contains("-c:v copy"));
        assert!(args.contains("-ac 2"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failed_encode_leaves_no_cache_file() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let ffmpeg = dir.path().join("ffmpeg");
        std::fs::write(&ffmpeg, "#!/bin/sh\nfor last; do :; done\nprintf x > \"$last\"\nexit 1\n").unwrap();
        std::fs::set_permissions(&ffmpeg, std::fs::Permissions::from_mode(0o755)).unwrap();
        let (service, _) = service(dir.path(), &ffmpeg, FixedProbe::default());

        let request = VideoRequest {
            audio: AudioSelector::Stereo,
            codec: Some("vp9".into()),
        };
        let err = service.video(&movie("Heat"), &request).await.unwrap_err();
        assert_eq!(err.http_status(), 500);

        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("cache").join("full"))
            .unwrap()
            .collect();
        assert!(leftovers.is_empty(), "partial output left behind");
        assert_eq!(service.coordinator().in_flight(), 0);
    }

    #[tokio::test]
    async fn missing_title_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _) = service(dir.path(), Path::new("ffmpeg"), FixedProbe::default());
        let err = service
            .video(&movie("Ronin"), &VideoRequest::default())
            .await
            .unwrap_err();
        assert_eq!(err.http_status(), 404);
    }
}
