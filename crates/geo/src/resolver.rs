//! Coordinate resolution: cache, rate-limited provider fallback, normalization.

use crate::cache::{CacheHandle, CacheValue};
use crate::coord::Coordinate;
use crate::error::{ErrorKind, Result};
use crate::place::{NamingPolicy, Place};
use crate::provider::{ProviderHandle, ProviderResult};
use crate::ratelimit::TokenBucket;
use crate::retry::RetryPolicy;
use exn::ResultExt;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use time::UtcDateTime;
use tracing::{debug, instrument, warn};

/// Default quantization precision: 3 decimal degrees, ~111 m cells.
pub const DEFAULT_PRECISION: u8 = 3;
/// Default TTL for cached failures before a coordinate is retried.
pub const DEFAULT_FAILURE_TTL: time::Duration = time::Duration::hours(24);

/// One provider in the fallback chain, paired with its own rate limiter.
///
/// The limiter belongs to the slot, not the resolver, so each provider's
/// quota is enforced independently of the others and of worker count.
pub struct ProviderSlot {
    provider: ProviderHandle,
    limiter: TokenBucket,
}

impl ProviderSlot {
    pub fn new(provider: ProviderHandle, limiter: TokenBucket) -> Self {
        Self { provider, limiter }
    }
}

/// Counters accumulated over the lifetime of a resolver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolverStats {
    pub cache_hits: u64,
    pub provider_calls: u64,
}

/// Resolves coordinates to normalized [`Place`]s.
///
/// Algorithm per [`resolve`](Self::resolve) call:
/// 1. Quantize and consult the cache; return immediately on a live hit
///    (including still-embargoed failure entries, which resolve to unknown).
/// 2. On a miss, query providers in priority order. Each call first takes a
///    token from that provider's bucket; transient failures are retried with
///    exponential backoff up to the policy's attempt budget; permanent
///    failures skip to the next provider.
/// 3. The first successful response is normalized through the
///    [`NamingPolicy`] and written back to the cache.
/// 4. If every provider fails, a failure entry with a retry-after timestamp
///    is cached and the coordinate resolves to [`Place::unknown`].
///
/// No other component performs geocoding.
pub struct GeoResolver {
    providers: Vec<ProviderSlot>,
    cache: CacheHandle,
    naming: NamingPolicy,
    retry: RetryPolicy,
    precision: u8,
    failure_ttl: time::Duration,
    cache_hits: AtomicU64,
    provider_calls: AtomicU64,
}

impl GeoResolver {
    pub fn new(cache: CacheHandle, providers: Vec<ProviderSlot>) -> Self {
        Self {
            providers,
            cache,
            naming: NamingPolicy::default(),
            retry: RetryPolicy::default(),
            precision: DEFAULT_PRECISION,
            failure_ttl: DEFAULT_FAILURE_TTL,
            cache_hits: AtomicU64::new(0),
            provider_calls: AtomicU64::new(0),
        }
    }

    pub fn with_naming(mut self, naming: NamingPolicy) -> Self {
        self.naming = naming;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_precision(mut self, precision: u8) -> Self {
        self.precision = precision;
        self
    }

    pub fn with_failure_ttl(mut self, ttl: time::Duration) -> Self {
        self.failure_ttl = ttl;
        self
    }

    /// Quantization precision used for cache keys. Callers batching
    /// lookups should dedupe by [`Coordinate::quantize`] at this
    /// precision to match the resolver's cache cells.
    pub fn precision(&self) -> u8 {
        self.precision
    }

    /// Resolve a coordinate to a place, consulting and populating the cache.
    ///
    /// Provider exhaustion is not an error — the coordinate resolves to
    /// [`Place::unknown`] and the run continues. Only a broken cache raises.
    #[instrument(skip(self), fields(lat = coordinate.latitude(), lon = coordinate.longitude()))]
    pub async fn resolve(&self, coordinate: Coordinate) -> Result<Place> {
        let key = coordinate.quantize(self.precision);
        let now = UtcDateTime::now();

        if let Some(value) = self.cache.lookup(key).await.or_raise(|| ErrorKind::Cache)?
            && value.is_live(now)
        {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(match value {
                CacheValue::Resolved(place) => place,
                // Still inside the failure embargo; don't waste a provider call.
                CacheValue::Failed { .. } => Place::unknown(),
            });
        }

        for slot in &self.providers {
            match self.query(slot, coordinate).await {
                Ok(raw) => {
                    let place = self.naming.classify(&raw);
                    self.cache.store(key, CacheValue::Resolved(place.clone())).await.or_raise(|| ErrorKind::Cache)?;
                    return Ok(place);
                },
                Err(error) => {
                    warn!(provider = slot.provider.name(), %error, "provider exhausted, falling back");
                },
            }
        }

        let retry_after = now + self.failure_ttl;
        self.cache.store(key, CacheValue::Failed { retry_after }).await.or_raise(|| ErrorKind::Cache)?;
        Ok(Place::unknown())
    }

    /// Call one provider with rate limiting and bounded retries.
    async fn query(&self, slot: &ProviderSlot, coordinate: Coordinate) -> ProviderResult<crate::place::RawPlace> {
        let mut failures = 0;
        loop {
            slot.limiter.acquire().await;
            self.provider_calls.fetch_add(1, Ordering::Relaxed);
            match slot.provider.reverse(coordinate).await {
                Ok(raw) => return Ok(raw),
                Err(error) => {
                    failures += 1;
                    if !error.deref().is_retryable() || failures >= self.retry.max_attempts {
                        return Err(error);
                    }
                    let delay = self.retry.delay(failures - 1);
                    debug!(provider = slot.provider.name(), %error, ?delay, "transient failure, backing off");
                    tokio::time::sleep(delay).await;
                },
            }
        }
    }

    /// Snapshot of the hit/call counters.
    pub fn stats(&self) -> ResolverStats {
        ResolverStats {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            provider_calls: self.provider_calls.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{GeoCache, MemoryCache};
    use crate::place::{Granularity, RawPlace};
    use crate::provider::ProviderErrorKind;
    use crate::providers::MockProvider;
    use std::sync::Arc;
    use std::time::Duration;

    fn oslo() -> Coordinate {
        Coordinate::new(59.9139, 10.7522).unwrap()
    }

    fn norway() -> RawPlace {
        RawPlace { country: "Norway".to_string(), ..RawPlace::default() }
    }

    fn slot(provider: &Arc<MockProvider>) -> ProviderSlot {
        ProviderSlot::new(provider.clone(), TokenBucket::new(100, 100.0))
    }

    fn resolver(cache: Arc<MemoryCache>, providers: Vec<ProviderSlot>) -> GeoResolver {
        GeoResolver::new(cache, providers)
            .with_retry(RetryPolicy::new(3, Duration::from_millis(1), 0.0))
    }

    #[tokio::test]
    async fn resolves_and_caches() {
        let provider = Arc::new(MockProvider::answering(norway()));
        let cache = Arc::new(MemoryCache::new());
        let resolver = resolver(cache.clone(), vec![slot(&provider)]);

        let place = resolver.resolve(oslo()).await.unwrap();
        assert_eq!(place.name, "Norway");
        assert_eq!(place.granularity, Granularity::Country);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn same_cell_issues_at_most_one_provider_call() {
        let provider = Arc::new(MockProvider::answering(norway()));
        let cache = Arc::new(MemoryCache::new());
        let resolver = resolver(cache, vec![slot(&provider)]);

        resolver.resolve(oslo()).await.unwrap();
        // Microscopic jitter: same quantization cell at precision 3.
        resolver.resolve(Coordinate::new(59.91391, 10.75219).unwrap()).await.unwrap();
        resolver.resolve(oslo()).await.unwrap();

        assert_eq!(provider.calls(), 1);
        assert_eq!(resolver.stats().cache_hits, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_are_retried_then_fall_back() {
        let flaky = Arc::new(MockProvider::failing(ProviderErrorKind::Timeout));
        let backup = Arc::new(MockProvider::answering(norway()));
        let cache = Arc::new(MemoryCache::new());
        let resolver = resolver(cache, vec![slot(&flaky), slot(&backup)]);

        let place = resolver.resolve(oslo()).await.unwrap();
        assert_eq!(place.name, "Norway");
        // Full retry budget spent on the flaky provider before falling back.
        assert_eq!(flaky.calls(), 3);
        assert_eq!(backup.calls(), 1);
    }

    #[tokio::test]
    async fn permanent_errors_skip_to_next_provider() {
        let exhausted = Arc::new(MockProvider::failing(ProviderErrorKind::Quota));
        let backup = Arc::new(MockProvider::answering(norway()));
        let cache = Arc::new(MemoryCache::new());
        let resolver = resolver(cache, vec![slot(&exhausted), slot(&backup)]);

        resolver.resolve(oslo()).await.unwrap();
        assert_eq!(exhausted.calls(), 1, "permanent errors must not be retried");
        assert_eq!(backup.calls(), 1);
    }

    #[tokio::test]
    async fn total_failure_caches_an_embargo() {
        let broken = Arc::new(MockProvider::failing(ProviderErrorKind::Rejected("nope".to_string())));
        let cache = Arc::new(MemoryCache::new());
        let resolver = resolver(cache.clone(), vec![slot(&broken)]);

        let place = resolver.resolve(oslo()).await.unwrap();
        assert!(place.is_unknown());

        let key = oslo().quantize(DEFAULT_PRECISION);
        let entry = cache.lookup(key).await.unwrap().unwrap();
        assert!(matches!(entry, CacheValue::Failed { retry_after } if retry_after > UtcDateTime::now()));

        // Second resolve hits the embargo, not the provider.
        let place = resolver.resolve(oslo()).await.unwrap();
        assert!(place.is_unknown());
        assert_eq!(broken.calls(), 1);
    }

    #[tokio::test]
    async fn elapsed_embargo_reads_as_a_miss() {
        let provider = Arc::new(MockProvider::answering(norway()));
        let cache = Arc::new(MemoryCache::new());
        let key = oslo().quantize(DEFAULT_PRECISION);
        let expired = UtcDateTime::now() - time::Duration::hours(1);
        cache.store(key, CacheValue::Failed { retry_after: expired }).await.unwrap();

        let resolver = resolver(cache, vec![slot(&provider)]);
        let place = resolver.resolve(oslo()).await.unwrap();
        assert_eq!(place.name, "Norway");
        assert_eq!(provider.calls(), 1);
    }
}
