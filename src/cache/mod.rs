//! Derived-artifact cache: keys, on-disk layout and generation dedup.

mod coordinator;
mod key;
mod store;

pub use coordinator::{Acquired, GenerationCoordinator, GenerationGuard};
pub use key::{CacheKey, KeyMaterial, Variant, ENCODER_VERSION};
pub use store::{file_ready, is_valid_file, ArtifactClass, CacheEntry, CacheStore};
