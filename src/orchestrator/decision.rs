//! Audio track selection and the re-encode decision.

use reelcache_av::{CodecFamily, EncoderCatalog, EncoderProfile};
use reelcache_common::{AudioSelector, AudioTrack, Error, Result};

/// Codec label used in cache keys when the video stream is copied.
pub const COPY_LABEL: &str = "copy";

/// Pick the audio track a selector refers to.
///
/// `Stereo` takes the first two-channel track and falls back to the first
/// track, which is then downmixed. `Max` takes the track with the most
/// channels, the lowest index winning ties.
///
/// # Errors
///
/// [`Error::InvalidRequest`] when the source has no audio or the index does
/// not exist.
pub fn select_audio(tracks: &[AudioTrack], selector: AudioSelector) -> Result<&AudioTrack> {
    let first = tracks
        .first()
        .ok_or_else(|| Error::invalid("source has no audio streams"))?;

    match selector {
        AudioSelector::Index(index) => tracks.iter().find(|t| t.index == index).ok_or_else(|| {
            Error::invalid(format!(
                "audio track {index} does not exist (source has {})",
                tracks.len()
            ))
        }),
        AudioSelector::Stereo => Ok(tracks.iter().find(|t| t.channels == 2).unwrap_or(first)),
        AudioSelector::Max => Ok(tracks.iter().fold(first, |best, t| {
            if t.channels > best.channels {
                t
            } else {
                best
            }
        })),
    }
}

/// Channel count of the delivered audio. An unreported count is delivered
/// as stereo.
pub fn output_channels(selector: AudioSelector, track: &AudioTrack) -> u32 {
    match selector {
        AudioSelector::Max if track.channels > 0 => track.channels,
        _ => 2,
    }
}

/// What a full-video request needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Serve the source as is.
    Passthrough,
    /// Copy the video stream, re-encode audio only.
    AudioOnly,
    /// Re-encode video with a catalog encoder.
    Encode {
        /// Catalog name of the encoder.
        encoder: &'static str,
    },
}

impl Decision {
    /// Codec label for the cache key.
    pub fn codec_label(&self) -> &'static str {
        match self {
            Decision::Passthrough | Decision::AudioOnly => COPY_LABEL,
            Decision::Encode { encoder } => encoder,
        }
    }
}

/// Resolve a requested codec name to a catalog encoder.
///
/// # Errors
///
/// [`Error::InvalidRequest`] for names the catalog does not know.
pub fn requested_encoder<'a>(catalog: &'a EncoderCatalog, name: &str) -> Result<&'a EncoderProfile> {
    catalog
        .get(name)
        .or_else(|| {
            // ffprobe-style names ("avc", "h265") resolve through their family.
            let family = CodecFamily::from_codec_name(name)?;
            catalog
                .profiles()
                .iter()
                .find(|p| p.family == family && !p.is_hardware())
        })
        .ok_or_else(|| Error::invalid(format!("unknown video codec: {name}")))
}

/// Decide whether a full-video request needs re-encoding.
///
/// Video is re-encoded iff a target codec was requested whose family differs
/// from the source's. Otherwise audio alone is re-encoded iff the selected
/// track is not stereo and the caller did not ask for `max`.
///
/// `source_codec` is only consulted when `requested` is set.
pub fn decide(
    catalog: &EncoderCatalog,
    requested: Option<&str>,
    source_codec: Option<&str>,
    selector: AudioSelector,
    track: &AudioTrack,
) -> Result<Decision> {
    if let Some(name) = requested {
        let profile = requested_encoder(catalog, name)?;
        let source_family = source_codec.and_then(|c| catalog.family_of(c));
        if source_family != Some(profile.family) {
            return Ok(Decision::Encode {
                encoder: profile.name,
            });
        }
    }

    if track.channels != 2 && selector != AudioSelector::Max {
        return Ok(Decision::AudioOnly);
    }
    Ok(Decision::Passthrough)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(index: u32, channels: u32) -> AudioTrack {
        AudioTrack {
            index,
            codec: "aac".into(),
            channels,
            language: None,
        }
    }

    #[test]
    fn stereo_prefers_two_channels_then_first() {
        let tracks = [track(0, 6), track(1, 2)];
        assert_eq!(select_audio(&tracks, AudioSelector::Stereo).unwrap().index, 1);

        let tracks = [track(0, 6), track(1, 8)];
        assert_eq!(select_audio(&tracks, AudioSelector::Stereo).unwrap().index, 0);
    }

    #[test]
    fn max_takes_most_channels_lowest_index_on_ties() {
        let tracks = [track(0, 2), track(1, 6), track(2, 6)];
        assert_eq!(select_audio(&tracks, AudioSelector::Max).unwrap().index, 1);
    }

    #[test]
    fn index_must_exist() {
        let tracks = [track(0, 2)];
        assert_eq!(select_audio(&tracks, AudioSelector::Index(0)).unwrap().index, 0);
        let err = select_audio(&tracks, AudioSelector::Index(3)).unwrap_err();
        assert_eq!(err.http_status(), 400);
    }

    #[test]
    fn no_audio_is_invalid() {
        let err = select_audio(&[], AudioSelector::Stereo).unwrap_err();
        assert_eq!(err.http_status(), 400);
    }

    #[test]
    fn max_with_surround_does_not_reencode() {
        let catalog = EncoderCatalog::builtin();
        let tracks = [track(0, 2), track(1, 6)];
        let selected = select_audio(&tracks, AudioSelector::Max).unwrap();
        assert_eq!(selected.channels, 6);
        assert_eq!(
            decide(&catalog, None, None, AudioSelector::Max, selected).unwrap(),
            Decision::Passthrough
        );
        assert_eq!(output_channels(AudioSelector::Max, selected), 6);
    }

    #[test]
    fn surround_without_max_reencodes_audio() {
        let catalog = EncoderCatalog::builtin();
        let t = track(0, 6);
        let decision = decide(&catalog, None, None, AudioSelector::Index(0), &t).unwrap();
        assert_eq!(decision, Decision::AudioOnly);
        assert_eq!(decision.codec_label(), COPY_LABEL);
        assert_eq!(output_channels(AudioSelector::Index(0), &t), 2);
    }

    #[test]
    fn unknown_channel_count_is_downmixed() {
        let catalog = EncoderCatalog::builtin();
        let t = track(0, 0);
        let decision = decide(&catalog, None, None, AudioSelector::Stereo, &t).unwrap();
        assert_eq!(decision, Decision::AudioOnly);
        assert_eq!(output_channels(AudioSelector::Stereo, &t), 2);
        assert_eq!(output_channels(AudioSelector::Max, &t), 2);

        // A reported stereo track wins over an unknown one.
        let tracks = [track(0, 0), track(1, 2)];
        assert_eq!(select_audio(&tracks, AudioSelector::Stereo).unwrap().index, 1);
    }

    #[test]
    fn codec_comparison_is_by_family() {
        let catalog = EncoderCatalog::builtin();
        let t = track(0, 2);
        let same = decide(&catalog, Some("libx264"), Some("h264"), AudioSelector::Stereo, &t);
        assert_eq!(same.unwrap(), Decision::Passthrough);

        let same_hw = decide(&catalog, Some("hevc_vaapi"), Some("hevc"), AudioSelector::Stereo, &t);
        assert_eq!(same_hw.unwrap(), Decision::Passthrough);

        let differs = decide(&catalog, Some("hevc"), Some("h264"), AudioSelector::Stereo, &t);
        assert_eq!(differs.unwrap(), Decision::Encode { encoder: "hevc" });

        let unknown_source = decide(&catalog, Some("h264"), Some("mpeg2video"), AudioSelector::Stereo, &t);
        assert_eq!(unknown_source.unwrap(), Decision::Encode { encoder: "h264" });
    }

    #[test]
    fn unknown_requested_codec_is_invalid() {
        let catalog = EncoderCatalog::builtin();
        let err = decide(&catalog, Some("divx"), Some("h264"), AudioSelector::Stereo, &track(0, 2))
            .unwrap_err();
        assert_eq!(err.http_status(), 400);
    }

    #[test]
    fn probe_style_names_resolve() {
        let catalog = EncoderCatalog::builtin();
        assert_eq!(requested_encoder(&catalog, "h265").unwrap().name, "hevc");
        assert_eq!(requested_encoder(&catalog, "AVC").unwrap().name, "h264");
    }
}
