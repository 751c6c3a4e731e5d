//! Coordinate handling and location intelligence.
//!
//! This crate turns raw GPS coordinates into folder-ready place names. The
//! moving parts, leaf-first:
//!
//! - [`Coordinate`] / [`QuantizedKey`] — validated lat/lon pairs and the
//!   fixed-precision cache key derived from them.
//! - [`GeocodeProvider`] — the capability boundary for external reverse
//!   geocoding services. Concrete implementations live in [`providers`].
//! - [`GeoCache`] — the capability boundary for persistent geocode caching.
//!   A SQLite-backed implementation lives in `snapsort-cache`; an in-memory
//!   one ([`MemoryCache`]) lives here.
//! - [`GeoResolver`] — ties it all together: cache lookup, rate-limited and
//!   retried provider calls in priority order, normalization of the response
//!   into a [`Place`] via the [`NamingPolicy`] granularity rules.

pub mod cache;
mod coord;
pub mod error;
mod place;
pub mod provider;
pub mod providers;
mod ratelimit;
mod resolver;
mod retry;

pub use crate::cache::{CacheHandle, CacheValue, GeoCache, MemoryCache};
pub use crate::coord::{Coordinate, EARTH_RADIUS_MILES, QuantizedKey};
pub use crate::place::{
    DEFAULT_MAJOR_CITIES, DEFAULT_NATIONAL_PARKS, Granularity, NamingPolicy, Place, RawPlace, sanitize,
};
pub use crate::provider::{GeocodeProvider, ProviderHandle};
pub use crate::ratelimit::TokenBucket;
pub use crate::resolver::{DEFAULT_FAILURE_TTL, DEFAULT_PRECISION, GeoResolver, ProviderSlot, ResolverStats};
pub use crate::retry::RetryPolicy;
