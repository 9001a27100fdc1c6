//! Hardware encoder selection.

use std::fs::OpenOptions;
use std::path::Path;

use tracing::warn;

use crate::catalog::{EncoderCatalog, EncoderProfile};

/// Reports which hardware encoder, if any, this host should use.
pub trait HardwareProbe: Send + Sync {
    /// Catalog name of the preferred hardware encoder.
    fn preferred_encoder(&self) -> Option<String>;
}

/// [`HardwareProbe`] that reports a fixed, configured answer.
#[derive(Debug, Clone, Default)]
pub struct ConfiguredHardwareProbe {
    encoder: Option<String>,
}

impl ConfiguredHardwareProbe {
    /// Prefer `encoder`; `None` or an empty name means software only.
    pub fn new(encoder: Option<String>) -> Self {
        Self {
            encoder: encoder.filter(|e| !e.trim().is_empty()),
        }
    }
}

impl HardwareProbe for ConfiguredHardwareProbe {
    fn preferred_encoder(&self) -> Option<String> {
        self.encoder.clone()
    }
}

/// Whether a render device can be opened for reading and writing.
pub fn device_accessible(device: &Path) -> bool {
    OpenOptions::new()
        .read(true)
        .write(true)
        .open(device)
        .is_ok()
}

/// Choose the encoder for an encode.
///
/// The hardware probe's preference wins over `default_codec`.
pub fn select_encoder<'a>(
    catalog: &'a EncoderCatalog,
    probe: &dyn HardwareProbe,
    default_codec: &str,
) -> &'a EncoderProfile {
    let requested = probe.preferred_encoder();
    usable_profile(catalog, catalog.lookup(requested.as_deref().unwrap_or(default_codec)))
}

/// `profile` itself, or the software encoder of the same codec family when
/// the node it needs (VA-API render device, NVIDIA control node) cannot be
/// opened.
pub fn usable_profile<'a>(
    catalog: &'a EncoderCatalog,
    profile: &'a EncoderProfile,
) -> &'a EncoderProfile {
    match catalog.required_node(profile) {
        Some(device) if !device_accessible(device) => {
            let fallback = catalog.software_fallback(profile);
            warn!(
                encoder = profile.name,
                device = %device.display(),
                fallback = fallback.name,
                "Hardware device not accessible, using software encoder"
            );
            fallback
        }
        _ => profile,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_preference_is_none() {
        assert!(ConfiguredHardwareProbe::new(Some("  ".into()))
            .preferred_encoder()
            .is_none());
        assert_eq!(
            ConfiguredHardwareProbe::new(Some("h264_vaapi".into())).preferred_encoder(),
            Some("h264_vaapi".to_string())
        );
    }

    #[test]
    fn inaccessible_device_falls_back_to_software() {
        let catalog = EncoderCatalog::builtin().with_device_path("/nonexistent/renderD128");
        let probe = ConfiguredHardwareProbe::new(Some("h264_vaapi".into()));
        let profile = select_encoder(&catalog, &probe, "hevc");
        assert_eq!(profile.name, "h264");
        assert!(profile.device.is_none());
    }

    #[test]
    fn accessible_device_keeps_hardware() {
        let device = tempfile::NamedTempFile::new().unwrap();
        let catalog = EncoderCatalog::builtin().with_device_path(device.path());
        let probe = ConfiguredHardwareProbe::new(Some("hevc_vaapi".into()));
        assert_eq!(select_encoder(&catalog, &probe, "h264").name, "hevc_vaapi");
    }

    #[test]
    fn nvenc_without_driver_falls_back_to_software() {
        let catalog = EncoderCatalog::builtin().with_nvenc_control("/nonexistent/nvidiactl");
        let probe = ConfiguredHardwareProbe::new(Some("h264_nvenc".into()));
        let profile = select_encoder(&catalog, &probe, "hevc");
        assert_eq!(profile.name, "h264");
        assert!(!profile.is_hardware());
    }

    #[test]
    fn nvenc_with_driver_keeps_hardware() {
        let control = tempfile::NamedTempFile::new().unwrap();
        let catalog = EncoderCatalog::builtin().with_nvenc_control(control.path());
        let probe = ConfiguredHardwareProbe::new(Some("h264_nvenc".into()));
        assert_eq!(select_encoder(&catalog, &probe, "h264").name, "h264_nvenc");
    }

    #[test]
    fn no_preference_uses_default() {
        let catalog = EncoderCatalog::builtin();
        let probe = ConfiguredHardwareProbe::default();
        assert_eq!(select_encoder(&catalog, &probe, "av1").name, "av1");
    }
}
