//! Scripted provider for testing.

use crate::coord::Coordinate;
use crate::place::RawPlace;
use crate::provider::{GeocodeProvider, ProviderErrorKind, ProviderResult};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};

/// A [`GeocodeProvider`] that answers from a fixed script and counts calls.
///
/// Three behaviours, covering what resolver and cluster tests need:
/// - [`answering`](Self::answering): every coordinate resolves to one place.
/// - [`near`](Self::near): a coordinate resolves to the scripted place whose
///   anchor is closest (within 100 miles), else an empty [`RawPlace`].
/// - [`failing`](Self::failing): every call fails with the given kind.
pub struct MockProvider {
    script: Script,
    calls: AtomicU64,
}

enum Script {
    Always(RawPlace),
    Near(Vec<(Coordinate, RawPlace)>),
    Fail(ProviderErrorKind),
}

impl MockProvider {
    pub fn answering(place: RawPlace) -> Self {
        Self { script: Script::Always(place), calls: AtomicU64::new(0) }
    }

    pub fn near(places: impl IntoIterator<Item = (Coordinate, RawPlace)>) -> Self {
        Self { script: Script::Near(places.into_iter().collect()), calls: AtomicU64::new(0) }
    }

    pub fn failing(kind: ProviderErrorKind) -> Self {
        Self { script: Script::Fail(kind), calls: AtomicU64::new(0) }
    }

    /// Total number of [`reverse`](GeocodeProvider::reverse) calls observed.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl GeocodeProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn reverse(&self, coordinate: Coordinate) -> ProviderResult<RawPlace> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        match &self.script {
            Script::Always(place) => Ok(place.clone()),
            Script::Near(places) => Ok(places
                .iter()
                .map(|(anchor, place)| (coordinate.distance_miles(anchor), place))
                .filter(|(distance, _)| *distance <= 100.0)
                .min_by(|(a, _), (b, _)| a.total_cmp(b))
                .map(|(_, place)| place.clone())
                .unwrap_or_default()),
            Script::Fail(kind) => Err(exn::Exn::from(kind.clone())),
        }
    }
}
