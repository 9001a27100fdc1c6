//! Deterministic cache keys.
//!
//! A key is the SHA-256 of everything that changes the bytes of a derived
//! artifact: the source, the audio selection, the target codec, the variant
//! and [`ENCODER_VERSION`]. Changing any of them changes the key, so a stale
//! artifact is never served for a new request shape.

use std::fmt;
use std::path::Path;

use reelcache_av::QualityTier;
use reelcache_common::ClipWindow;
use sha2::{Digest, Sha256};

/// Bump when encoding logic changes in a way that should invalidate every
/// previously cached artifact.
pub const ENCODER_VERSION: u32 = 1;

/// Which artifact of a source the key names.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Variant {
    /// The whole title.
    Full,
    /// A time window encoded at a quality tier.
    Clip {
        /// Window in seconds.
        window: ClipWindow,
        /// Quality tier of the encode.
        tier: QualityTier,
    },
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Full => f.write_str("full"),
            // Millisecond resolution keeps float noise out of the key.
            Variant::Clip { window, tier } => write!(
                f,
                "clip:{}-{}:{}",
                (window.start * 1000.0).round() as u64,
                (window.end * 1000.0).round() as u64,
                tier
            ),
        }
    }
}

/// Inputs to [`CacheKey::derive`].
#[derive(Debug, Clone, Copy)]
pub struct KeyMaterial<'a> {
    /// Source path as the library reported it.
    pub source: &'a Path,
    /// Audio track index, relative to audio streams.
    pub audio_index: u32,
    /// Output channel count.
    pub channels: u32,
    /// Target codec label (catalog name, or "copy").
    pub codec: &'a str,
    /// Artifact variant.
    pub variant: Variant,
}

/// A 64-character lowercase hex digest, safe as a file name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive the key under the current [`ENCODER_VERSION`].
    pub fn derive(material: &KeyMaterial<'_>) -> Self {
        Self::derive_with_version(material, ENCODER_VERSION)
    }

    /// Derive the key under an explicit encoder version.
    pub fn derive_with_version(material: &KeyMaterial<'_>, version: u32) -> Self {
        let mut hasher = Sha256::new();
        for part in [
            format!("v{version}"),
            material.source.to_string_lossy().into_owned(),
            format!("a{}", material.audio_index),
            format!("c{}", material.channels),
            material.codec.to_ascii_lowercase(),
            material.variant.to_string(),
        ] {
            hasher.update(part.as_bytes());
            hasher.update([0u8]);
        }
        Self(hex::encode(hasher.finalize()))
    }

    /// The hex digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
