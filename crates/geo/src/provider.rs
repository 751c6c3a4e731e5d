//! The reverse-geocoding provider capability.
//!
//! External services are consumed through [`GeocodeProvider`], never
//! directly, so the resolver can iterate an ordered fallback chain of
//! uniform capabilities. Errors are classified as transient (worth retrying
//! with backoff) or permanent (skip straight to the next provider).

use crate::coord::Coordinate;
use crate::place::RawPlace;
use async_trait::async_trait;
use derive_more::{Display, Error};
use std::sync::Arc;

pub type ProviderHandle = Arc<dyn GeocodeProvider>;

/// A provider error with automatic location tracking.
pub type ProviderError = exn::Exn<ProviderErrorKind>;
/// Result type alias for provider calls.
pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Classifies why a provider call failed, and therefore what the resolver
/// should do about it.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// The request timed out. Transient.
    #[display("geocoding request timed out")]
    Timeout,
    /// The service reported a server-side failure (5xx or equivalent). Transient.
    #[display("geocoding service error: {_0}")]
    Service(#[error(not(source))] String),
    /// The provider's quota is exhausted for the day. Permanent for this run.
    #[display("geocoding quota exhausted")]
    Quota,
    /// The provider rejected the request (malformed input, bad credentials).
    /// Permanent.
    #[display("geocoding request rejected: {_0}")]
    Rejected(#[error(not(source))] String),
}

impl ProviderErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout | Self::Service(_))
    }
}

/// Uniform capability over one external reverse-geocoding service.
///
/// Implementations translate their wire protocol into a [`RawPlace`] and
/// classify failures via [`ProviderErrorKind`]; rate limiting and retries
/// are the resolver's job, not the provider's.
#[async_trait]
pub trait GeocodeProvider: Send + Sync {
    /// Name of the provider, used for logging and configuration lookup.
    fn name(&self) -> &str;

    /// Resolve a coordinate to raw address components.
    async fn reverse(&self, coordinate: Coordinate) -> ProviderResult<RawPlace>;
}
