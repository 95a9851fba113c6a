//! Finalized recordings and their playable locators
//!
//! An `Artifact` pairs the assembled audio `Blob` with an `ObjectUrl` issued
//! by an `ObjectUrlRegistry`. URLs resolve back to the blob until revoked.
//! Registries are plain handles: each session owns one unless a shared one is
//! passed in, so there is no process-wide URL table.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use uuid::Uuid;

/// Media type attached to every recorded blob
pub const WAV_MEDIA_TYPE: &str = "audio/wav";

const URL_SCHEME_PREFIX: &str = "blob:recipe-dictation/";

/// Immutable audio bytes tagged with a media type. Cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    bytes: Arc<[u8]>,
    media_type: String,
}

impl Blob {
    pub fn new(bytes: impl Into<Arc<[u8]>>, media_type: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            media_type: media_type.into(),
        }
    }

    /// Blob tagged with `WAV_MEDIA_TYPE`
    pub fn wav(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self::new(bytes, WAV_MEDIA_TYPE)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Process-local, revocable locator for a blob.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectUrl(String);

impl ObjectUrl {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ObjectUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The finalized recording: blob plus a playable URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub blob: Blob,
    pub url: ObjectUrl,
}

/// Table of live object URLs.
#[derive(Debug, Clone, Default)]
pub struct ObjectUrlRegistry {
    entries: Arc<Mutex<HashMap<ObjectUrl, Blob>>>,
}

impl ObjectUrlRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<ObjectUrl, Blob>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Issue a fresh URL resolving to `blob`.
    pub fn create_url(&self, blob: &Blob) -> ObjectUrl {
        let url = ObjectUrl(format!("{}{}", URL_SCHEME_PREFIX, Uuid::new_v4()));
        self.entries().insert(url.clone(), blob.clone());
        log::debug!("Created object URL {} ({} bytes)", url, blob.len());
        url
    }

    pub fn resolve(&self, url: &ObjectUrl) -> Option<Blob> {
        self.entries().get(url).cloned()
    }

    /// Release a URL. Returns false if it was unknown or already revoked.
    pub fn revoke(&self, url: &ObjectUrl) -> bool {
        let removed = self.entries().remove(url).is_some();
        if removed {
            log::debug!("Revoked object URL {}", url);
        }
        removed
    }

    /// Number of live URLs
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}
