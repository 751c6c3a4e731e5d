//! The geocode cache capability.
//!
//! Resolution results are cached per [`QuantizedKey`] so that repeated runs
//! (and repeated shots from the same spot) never hit a provider twice. The
//! cache is modeled as an explicit injected capability rather than process
//! state: `snapsort-cache` provides the SQLite implementation that survives
//! across runs, while [`MemoryCache`] serves tests and cache-less operation.

use crate::coord::QuantizedKey;
use crate::error::Result;
use crate::place::Place;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use time::UtcDateTime;
use tokio::sync::RwLock;

pub type CacheHandle = Arc<dyn GeoCache>;

/// A cached resolution outcome.
///
/// Failures are cached too, with a retry-after timestamp, so a transient
/// provider outage does not permanently blacklist a coordinate. The
/// [`GeoResolver`](crate::GeoResolver) treats a failure entry whose
/// retry-after has elapsed as a cache miss.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheValue {
    Resolved(Place),
    Failed { retry_after: UtcDateTime },
}

impl CacheValue {
    /// Whether this entry still answers a lookup at time `now`.
    pub fn is_live(&self, now: UtcDateTime) -> bool {
        match self {
            Self::Resolved(_) => true,
            Self::Failed { retry_after } => *retry_after > now,
        }
    }
}

/// Persistent key/value store for resolved place names.
///
/// Implementations must be safe for concurrent readers and writers from
/// multiple workers. Writes are idempotent — all resolutions for the same
/// key are equivalent, so last-write-wins is acceptable.
#[async_trait]
pub trait GeoCache: Send + Sync {
    async fn lookup(&self, key: QuantizedKey) -> Result<Option<CacheValue>>;
    async fn store(&self, key: QuantizedKey, value: CacheValue) -> Result<()>;
}

/// In-memory [`GeoCache`] backed by a `HashMap` behind an [`RwLock`].
///
/// Used by tests and by runs configured without a persistent cache. Contents
/// are lost when the process exits.
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<QuantizedKey, CacheValue>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries currently held, live or expired.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl GeoCache for MemoryCache {
    async fn lookup(&self, key: QuantizedKey) -> Result<Option<CacheValue>> {
        Ok(self.entries.read().await.get(&key).cloned())
    }

    async fn store(&self, key: QuantizedKey, value: CacheValue) -> Result<()> {
        self.entries.write().await.insert(key, value);
        Ok(())
    }
}
