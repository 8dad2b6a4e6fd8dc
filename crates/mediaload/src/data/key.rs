use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Data-center identifier of the remote storage service.
pub type DcId = i32;

/// Address of one item on the remote storage service.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageLocation {
    pub dc_id:          DcId,
    pub content_id:     u64,
    pub access_hash:    u64,
    /// Opaque reference the origin requires alongside the access hash.
    pub file_reference: Bytes,
    pub version:        i32,
}

impl StorageLocation {
    pub fn new(dc_id: DcId, content_id: u64, access_hash: u64) -> Self {
        Self {
            dc_id,
            content_id,
            access_hash,
            file_reference: Bytes::new(),
            version: 0,
        }
    }

    #[must_use]
    pub fn version(mut self, version: i32) -> Self {
        self.version = version;
        self
    }

    #[must_use]
    pub fn file_reference(mut self, file_reference: impl Into<Bytes>) -> Self {
        self.file_reference = file_reference.into();
        self
    }
}

/// What a loader fetches. Immutable once the loader exists.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ContentKey {
    Storage(StorageLocation),
    Web(String),
}

impl ContentKey {
    pub fn cache_key(&self) -> CacheKey {
        match self {
            ContentKey::Storage(location) => CacheKey::Storage {
                dc_id:      location.dc_id,
                content_id: location.content_id,
                version:    location.version,
            },
            ContentKey::Web(url) => CacheKey::Web(url.clone()),
        }
    }

    pub fn queue_key(&self) -> QueueKey {
        match self {
            ContentKey::Storage(location) => QueueKey::Storage(location.dc_id),
            ContentKey::Web(_) => QueueKey::Web,
        }
    }
}

/// Key of a local cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CacheKey {
    Storage {
        dc_id:      DcId,
        content_id: u64,
        version:    i32,
    },
    Web(String),
}

/// Identifies the per-endpoint queue a loader is scheduled on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueKey {
    Storage(DcId),
    Web,
}

impl fmt::Display for QueueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueKey::Storage(dc_id) => write!(f, "dc{dc_id}"),
            QueueKey::Web => write!(f, "web"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_ignores_access_hash() {
        let a = ContentKey::Storage(StorageLocation::new(2, 77, 1).version(3));
        let b = ContentKey::Storage(StorageLocation::new(2, 77, 9).version(3));
        assert_eq!(a.cache_key(), b.cache_key());
        assert_eq!(a.queue_key(), QueueKey::Storage(2));
    }

    #[test]
    fn test_web_key() {
        let key = ContentKey::Web("https://example.com/a.png".into());
        assert_eq!(key.cache_key(), CacheKey::Web("https://example.com/a.png".into()));
        assert_eq!(key.queue_key(), QueueKey::Web);
        assert_eq!(key.queue_key().to_string(), "web");
    }
}
