use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use bytes::Bytes;

use crate::data::CacheKey;

/// Key/value store consulted before any network access.
///
/// Backends swallow their own errors: a failed read is a miss and a failed
/// write is logged and dropped, since the download itself already succeeded.
pub trait LocalCache: Send + Sync {
    fn get(&self, key: &CacheKey) -> Option<Bytes>;
    fn put(&self, key: CacheKey, bytes: Bytes);
}

/// In-process cache backend.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<CacheKey, Bytes>>,
}

impl MemoryCache {
    pub fn new() -> Self { Self::default() }

    pub fn len(&self) -> usize { self.entries().len() }

    pub fn is_empty(&self) -> bool { self.entries().is_empty() }

    pub fn contains(&self, key: &CacheKey) -> bool { self.entries().contains_key(key) }

    fn entries(&self) -> MutexGuard<'_, HashMap<CacheKey, Bytes>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl LocalCache for MemoryCache {
    fn get(&self, key: &CacheKey) -> Option<Bytes> { self.entries().get(key).cloned() }

    fn put(&self, key: CacheKey, bytes: Bytes) { self.entries().insert(key, bytes); }
}

#[cfg(feature = "sled")]
mod sled_impl {
    use std::path::Path;

    use bytes::Bytes;
    use tracing::warn;

    use super::LocalCache;
    use crate::data::CacheKey;
    use crate::error::Result;

    /// Persistent cache backend storing entries in a `sled` tree.
    ///
    /// Keys are `postcard`-encoded [`CacheKey`]s.
    pub struct SledCache {
        db: sled::Db,
    }

    impl SledCache {
        pub fn open(path: impl AsRef<Path>) -> Result<Self> {
            let db = sled::open(path)?;
            Ok(Self { db })
        }

        /// Write pending entries to disk.
        pub fn flush(&self) -> Result<()> {
            self.db.flush()?;
            Ok(())
        }

        fn encode(key: &CacheKey) -> Result<Vec<u8>> { Ok(postcard::to_allocvec(key)?) }
    }

    impl LocalCache for SledCache {
        fn get(&self, key: &CacheKey) -> Option<Bytes> {
            let encoded = Self::encode(key).ok()?;
            match self.db.get(encoded) {
                Ok(value) => value.map(|value| Bytes::copy_from_slice(&value)),
                Err(error) => {
                    warn!(target: "mediaload::cache", ?key, %error, "cache read failed");
                    None
                }
            }
        }

        fn put(&self, key: CacheKey, bytes: Bytes) {
            let result = Self::encode(&key).and_then(|encoded| {
                self.db.insert(encoded, bytes.as_ref())?;
                Ok(())
            });
            if let Err(error) = result {
                warn!(target: "mediaload::cache", ?key, %error, "cache write failed");
            }
        }
    }
}

#[cfg(feature = "sled")]
pub use sled_impl::SledCache;
