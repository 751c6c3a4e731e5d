//! Concrete [`GeocodeProvider`](crate::GeocodeProvider) implementations.
//!
//! Each provider owns its wire protocol and nothing else: rate limiting,
//! retries and fallback ordering live in the resolver.

mod locationiq;
#[cfg(any(test, feature = "mock"))]
mod mock;
mod nominatim;

pub use self::locationiq::LocationIq;
#[cfg(any(test, feature = "mock"))]
pub use self::mock::MockProvider;
pub use self::nominatim::Nominatim;
