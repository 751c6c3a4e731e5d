//! Spatio-temporal clustering of media records.
//!
//! Records are bucketed per calendar month, then partitioned into clusters
//! of chained proximity: two records land in the same cluster when a chain
//! of members, each within the distance threshold of a neighbour, connects
//! them. A chain may therefore span more than one threshold end-to-end,
//! which keeps a day of driving around rural Montana in a single folder.
//!
//! Each cluster is assigned one representative [`Place`] by majority rules
//! over its members' resolved locations (see
//! [`LocationClusterer::cluster`]).

mod dsu;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use exn::ResultExt;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use snapsort_extract::MediaRecord;
use snapsort_geo::{Coordinate, GeoResolver, Granularity, Place, QuantizedKey, sanitize};
use time::PrimitiveDateTime;
use tracing::{debug, instrument};

use crate::cluster::dsu::UnionFind;
use crate::error::{ErrorKind, Result};

/// Default bound on concurrent coordinate resolutions. Providers are rate
/// limited independently of this; it only bounds dispatch.
const DEFAULT_RESOLVE_CONCURRENCY: usize = 8;

/// A calendar-month bucket. Clustering never crosses bucket boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimeBucket {
    Dated { year: i32, month: u8 },
    Undated,
}

impl TimeBucket {
    pub fn of(captured: Option<PrimitiveDateTime>) -> Self {
        match captured {
            Some(at) => Self::Dated { year: at.year(), month: u8::from(at.month()) },
            None => Self::Undated,
        }
    }
}

/// A set of records sharing a time bucket and a chained-proximity
/// component, with the representative place the whole cluster files under.
/// Consumed immediately by path generation; never persisted.
#[derive(Debug)]
pub struct LocationCluster {
    pub bucket: TimeBucket,
    pub place: Place,
    pub members: Vec<MediaRecord>,
}

/// Groups records by month and geography.
///
/// Coordinate resolution goes through the shared [`GeoResolver`] exactly
/// once per quantization cell; clustering itself is pure computation over
/// the resolved places.
pub struct LocationClusterer {
    resolver: Arc<GeoResolver>,
    distance_threshold_miles: f64,
    city_vote_threshold: f64,
    concurrency: usize,
}

impl LocationClusterer {
    pub fn new(resolver: Arc<GeoResolver>) -> Self {
        Self {
            resolver,
            distance_threshold_miles: 25.0,
            city_vote_threshold: 0.8,
            concurrency: DEFAULT_RESOLVE_CONCURRENCY,
        }
    }

    pub fn with_distance_threshold(mut self, miles: f64) -> Self {
        self.distance_threshold_miles = miles;
        self
    }

    pub fn with_city_vote_threshold(mut self, fraction: f64) -> Self {
        self.city_vote_threshold = fraction.clamp(0.0, 1.0);
        self
    }

    /// Bound the number of in-flight coordinate resolutions, normally the
    /// configured worker count.
    pub fn with_concurrency(mut self, workers: usize) -> Self {
        self.concurrency = workers.max(1);
        self
    }

    /// Partition `records` into [`LocationCluster`]s.
    ///
    /// Records without a valid coordinate never enter the proximity graph;
    /// each becomes its own singleton cluster with an unknown place.
    /// Resolution happens up front for every unique quantization cell, so
    /// clustering never re-queries per cluster.
    #[instrument(skip_all, fields(records = records.len()))]
    pub async fn cluster(&self, records: Vec<MediaRecord>) -> Result<Vec<LocationCluster>> {
        let places = self.resolve_places(&records).await?;
        let precision = self.resolver.precision();

        let mut buckets: BTreeMap<TimeBucket, Vec<MediaRecord>> = BTreeMap::new();
        for record in records {
            buckets.entry(TimeBucket::of(record.captured_at)).or_default().push(record);
        }

        let mut clusters = Vec::new();
        for (bucket, members) in buckets {
            let mut located: Vec<(MediaRecord, Coordinate)> = Vec::new();
            for record in members {
                match record.coordinate {
                    Some(coordinate) => located.push((record, coordinate)),
                    None => clusters.push(LocationCluster {
                        bucket,
                        place: Place::unknown(),
                        members: vec![record],
                    }),
                }
            }

            let mut dsu = UnionFind::new(located.len());
            for i in 0..located.len() {
                for j in (i + 1)..located.len() {
                    if located[i].1.distance_miles(&located[j].1) <= self.distance_threshold_miles {
                        dsu.union(i, j);
                    }
                }
            }

            // Keyed by the smallest member index so output order is stable.
            let mut components: BTreeMap<usize, Vec<(MediaRecord, Coordinate)>> = BTreeMap::new();
            for (index, member) in located.into_iter().enumerate() {
                components.entry(dsu.find(index)).or_default().push(member);
            }
            for component in components.into_values() {
                let place = self.representative(&component, &places, precision);
                clusters.push(LocationCluster {
                    bucket,
                    place,
                    members: component.into_iter().map(|(record, _)| record).collect(),
                });
            }
        }
        debug!(clusters = clusters.len(), "clustering complete");
        Ok(clusters)
    }

    /// Resolve every unique quantization cell among `records`, bounded to
    /// the configured number of in-flight lookups.
    async fn resolve_places(&self, records: &[MediaRecord]) -> Result<HashMap<QuantizedKey, Place>> {
        let precision = self.resolver.precision();
        let mut unique: HashMap<QuantizedKey, Coordinate> = HashMap::new();
        for record in records {
            if let Some(coordinate) = record.coordinate {
                unique.entry(coordinate.quantize(precision)).or_insert(coordinate);
            }
        }

        let resolver = &self.resolver;
        let mut futures: Vec<_> = unique
            .into_iter()
            .map(|(key, coordinate)| async move {
                resolver.resolve(coordinate).await.map(|place| (key, place))
            })
            .collect();
        let mut processing = FuturesUnordered::new();
        processing.extend(futures.drain(..self.concurrency.min(futures.len())));

        let mut places = HashMap::new();
        while let Some(result) = processing.next().await {
            let (key, place) = result.or_raise(|| ErrorKind::Geocode)?;
            places.insert(key, place);
            if !futures.is_empty() {
                processing.push(futures.remove(0));
            }
        }
        Ok(places)
    }

    /// Derive a component's representative place.
    ///
    /// Rules, most specific first:
    /// 1. One major-city name holds at least the vote-threshold share of
    ///    resolved members.
    /// 2. One park name holds a strict majority.
    /// 3. Every resolved member lies in the same US state.
    /// 4. Every resolved member lies in the same foreign country.
    /// 5. Otherwise the most frequent resolved name wins, ties broken by
    ///    the member with the earliest capture timestamp.
    fn representative(
        &self,
        members: &[(MediaRecord, Coordinate)],
        places: &HashMap<QuantizedKey, Place>,
        precision: u8,
    ) -> Place {
        let resolved: Vec<(&MediaRecord, &Place)> = members
            .iter()
            .filter_map(|(record, coordinate)| {
                let place = places.get(&coordinate.quantize(precision))?;
                (!place.is_unknown()).then_some((record, place))
            })
            .collect();
        let total = resolved.len();
        if total == 0 {
            return Place::unknown();
        }

        if let Some(place) = leading(&resolved, Granularity::StateCity)
            .filter(|(count, _)| *count as f64 / total as f64 >= self.city_vote_threshold)
        {
            return place.1.clone();
        }
        if let Some(place) = leading(&resolved, Granularity::StatePark).filter(|(count, _)| count * 2 > total) {
            return place.1.clone();
        }

        let domestic = resolved.iter().all(|(_, place)| place.granularity != Granularity::Country);
        if domestic {
            let states: BTreeSet<&str> =
                resolved.iter().filter_map(|(_, place)| place.state.as_deref().map(str::trim)).collect();
            if let Some(&state) = states.first()
                && states.len() == 1
                && let Some((_, sample)) = resolved.iter().find(|(_, p)| p.state.as_deref().map(str::trim) == Some(state))
            {
                return Place {
                    name: sanitize(state),
                    granularity: Granularity::State,
                    country: sample.country.clone(),
                    state: sample.state.clone(),
                    city: None,
                    park: None,
                };
            }
        } else if resolved.iter().all(|(_, place)| place.granularity == Granularity::Country) {
            let countries: BTreeSet<&str> = resolved.iter().map(|(_, place)| place.country.trim()).collect();
            if countries.len() == 1 {
                return resolved[0].1.clone();
            }
        }

        // Mixed component: fall back to the mode of the resolved names.
        let mut votes: BTreeMap<&str, (usize, PrimitiveDateTime, &Place)> = BTreeMap::new();
        for (record, place) in &resolved {
            let captured = record.captured_at.unwrap_or(PrimitiveDateTime::MAX);
            let entry = votes.entry(place.name.as_str()).or_insert((0, captured, *place));
            entry.0 += 1;
            entry.1 = entry.1.min(captured);
        }
        votes
            .into_values()
            .max_by(|a, b| a.0.cmp(&b.0).then_with(|| b.1.cmp(&a.1)))
            .map(|(_, _, place)| place.clone())
            .unwrap_or_else(Place::unknown)
    }
}

/// Most common name at `granularity` among resolved members, with its vote
/// count. Ties resolve to the lexicographically-first name so the outcome
/// never depends on map iteration order.
fn leading<'p>(
    resolved: &[(&MediaRecord, &'p Place)],
    granularity: Granularity,
) -> Option<(usize, &'p Place)> {
    let mut votes: BTreeMap<&str, (usize, &'p Place)> = BTreeMap::new();
    for (_, place) in resolved {
        if place.granularity == granularity {
            votes.entry(place.name.as_str()).or_insert((0, *place)).0 += 1;
        }
    }
    votes.into_values().max_by(|a, b| a.0.cmp(&b.0).then_with(|| b.1.name.cmp(&a.1.name)))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;

    use snapsort_geo::providers::MockProvider;
    use snapsort_geo::{EARTH_RADIUS_MILES, MemoryCache, ProviderSlot, RawPlace, TokenBucket};
    use time::macros::datetime;

    use super::*;

    const MILES_PER_DEGREE_LAT: f64 = EARTH_RADIUS_MILES * std::f64::consts::PI / 180.0;

    fn north_of(base: Coordinate, miles: f64) -> Coordinate {
        Coordinate::new(base.latitude() + miles / MILES_PER_DEGREE_LAT, base.longitude()).unwrap()
    }

    fn record(name: &str, captured: Option<PrimitiveDateTime>, coordinate: Option<Coordinate>) -> MediaRecord {
        let mut record = MediaRecord::new(PathBuf::from(format!("/media/{name}")), 1024);
        record.captured_at = captured;
        record.coordinate = coordinate;
        record
    }

    fn clusterer(provider: MockProvider) -> LocationClusterer {
        let slot = ProviderSlot::new(Arc::new(provider), TokenBucket::new(1000, 1000.0));
        LocationClusterer::new(Arc::new(GeoResolver::new(Arc::new(MemoryCache::new()), vec![slot])))
    }

    fn montana() -> RawPlace {
        RawPlace { country: "United States".to_string(), state: Some("Montana".to_string()), ..RawPlace::default() }
    }

    #[tokio::test]
    async fn points_within_the_threshold_share_a_cluster() {
        let base = Coordinate::new(46.8797, -110.3626).unwrap();
        let clusterer = clusterer(MockProvider::answering(montana()));
        let clusters = clusterer
            .cluster(vec![
                record("a.jpg", Some(datetime!(2023-06-01 10:00:00)), Some(base)),
                record("b.jpg", Some(datetime!(2023-06-02 10:00:00)), Some(north_of(base, 24.0))),
            ])
            .await
            .unwrap();
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].members.len(), 2);
        assert_eq!(clusters[0].place.name, "Montana");
        assert_eq!(clusters[0].place.granularity, Granularity::State);
    }

    #[tokio::test]
    async fn points_past_the_threshold_split() {
        let base = Coordinate::new(46.8797, -110.3626).unwrap();
        let clusterer = clusterer(MockProvider::answering(montana()));
        let clusters = clusterer
            .cluster(vec![
                record("a.jpg", Some(datetime!(2023-06-01 10:00:00)), Some(base)),
                record("b.jpg", Some(datetime!(2023-06-02 10:00:00)), Some(north_of(base, 26.0))),
            ])
            .await
            .unwrap();
        assert_eq!(clusters.len(), 2);
    }

    #[tokio::test]
    async fn chained_proximity_spans_more_than_one_threshold() {
        let base = Coordinate::new(46.8797, -110.3626).unwrap();
        let clusterer = clusterer(MockProvider::answering(montana()));
        // a—b and b—c are each 20 miles; a—c is 40. Still one cluster.
        let clusters = clusterer
            .cluster(vec![
                record("a.jpg", Some(datetime!(2023-06-01 10:00:00)), Some(base)),
                record("b.jpg", Some(datetime!(2023-06-02 10:00:00)), Some(north_of(base, 20.0))),
                record("c.jpg", Some(datetime!(2023-06-03 10:00:00)), Some(north_of(base, 40.0))),
            ])
            .await
            .unwrap();
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].members.len(), 3);
    }

    #[tokio::test]
    async fn months_never_share_a_cluster() {
        let base = Coordinate::new(46.8797, -110.3626).unwrap();
        let clusterer = clusterer(MockProvider::answering(montana()));
        let clusters = clusterer
            .cluster(vec![
                record("june.jpg", Some(datetime!(2023-06-30 23:00:00)), Some(base)),
                record("july.jpg", Some(datetime!(2023-07-01 01:00:00)), Some(base)),
            ])
            .await
            .unwrap();
        assert_eq!(clusters.len(), 2);
    }

    #[tokio::test]
    async fn records_without_coordinates_become_singletons() {
        let clusterer = clusterer(MockProvider::answering(montana()));
        let clusters = clusterer
            .cluster(vec![
                record("a.jpg", Some(datetime!(2023-06-01 10:00:00)), None),
                record("b.jpg", Some(datetime!(2023-06-02 10:00:00)), None),
            ])
            .await
            .unwrap();
        assert_eq!(clusters.len(), 2);
        assert!(clusters.iter().all(|c| c.place.is_unknown() && c.members.len() == 1));
    }

    #[tokio::test]
    async fn majority_city_vote_names_the_cluster() {
        let san_francisco = Coordinate::new(37.7749, -122.4194).unwrap();
        let oakland = Coordinate::new(37.8044, -122.2712).unwrap();
        let provider = MockProvider::near([
            (san_francisco, RawPlace {
                country: "United States".to_string(),
                state: Some("California".to_string()),
                city: Some("San Francisco".to_string()),
                county: None,
            }),
            (oakland, RawPlace {
                country: "United States".to_string(),
                state: Some("California".to_string()),
                city: Some("Oakland".to_string()),
                county: None,
            }),
        ]);
        let clusterer = clusterer(provider);

        // 85% of members near San Francisco, 15% near Oakland, all chained.
        let mut records = Vec::new();
        for i in 0..17 {
            records.push(record(&format!("sf{i}.jpg"), Some(datetime!(2023-06-01 10:00:00)), Some(san_francisco)));
        }
        for i in 0..3 {
            records.push(record(&format!("oak{i}.jpg"), Some(datetime!(2023-06-01 12:00:00)), Some(oakland)));
        }

        let clusters = clusterer.cluster(records).await.unwrap();
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].place.name, "California-San_Francisco");
        assert_eq!(clusters[0].place.granularity, Granularity::StateCity);
    }

    #[tokio::test]
    async fn below_threshold_city_vote_falls_back_to_the_state() {
        let san_francisco = Coordinate::new(37.7749, -122.4194).unwrap();
        let oakland = Coordinate::new(37.8044, -122.2712).unwrap();
        let provider = MockProvider::near([
            (san_francisco, RawPlace {
                country: "United States".to_string(),
                state: Some("California".to_string()),
                city: Some("San Francisco".to_string()),
                county: None,
            }),
            (oakland, RawPlace {
                country: "United States".to_string(),
                state: Some("California".to_string()),
                city: Some("Oakland".to_string()),
                county: None,
            }),
        ]);
        let clusterer = clusterer(provider);

        // 50/50 split: no city reaches the 80% vote, same state though.
        let clusters = clusterer
            .cluster(vec![
                record("sf.jpg", Some(datetime!(2023-06-01 10:00:00)), Some(san_francisco)),
                record("oak.jpg", Some(datetime!(2023-06-01 12:00:00)), Some(oakland)),
            ])
            .await
            .unwrap();
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].place.name, "California");
        assert_eq!(clusters[0].place.granularity, Granularity::State);
    }

    #[tokio::test]
    async fn each_unique_cell_resolves_once() {
        let base = Coordinate::new(46.8797, -110.3626).unwrap();
        let provider = Arc::new(MockProvider::answering(montana()));
        let slot = ProviderSlot::new(provider.clone(), TokenBucket::new(1000, 1000.0));
        let resolver = Arc::new(GeoResolver::new(Arc::new(MemoryCache::new()), vec![slot]));
        let clusterer = LocationClusterer::new(resolver);

        let records = (0..10)
            .map(|i| record(&format!("{i}.jpg"), Some(datetime!(2023-06-01 10:00:00)), Some(base)))
            .collect();
        clusterer.cluster(records).await.unwrap();
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn resolution_respects_a_single_worker_bound() {
        let base = Coordinate::new(46.8797, -110.3626).unwrap();
        let provider = Arc::new(MockProvider::answering(montana()));
        let slot = ProviderSlot::new(provider.clone(), TokenBucket::new(1000, 1000.0));
        let resolver = Arc::new(GeoResolver::new(Arc::new(MemoryCache::new()), vec![slot]));
        // Zero is nonsense; the bound clamps to one and everything still
        // resolves, just serially.
        let clusterer = LocationClusterer::new(resolver).with_concurrency(0);

        let records = (0..5)
            .map(|i| {
                record(
                    &format!("{i}.jpg"),
                    Some(datetime!(2023-06-01 10:00:00)),
                    Some(north_of(base, f64::from(i) * 100.0)),
                )
            })
            .collect();
        let clusters = clusterer.cluster(records).await.unwrap();
        assert_eq!(clusters.len(), 5);
        assert_eq!(provider.calls(), 5);
    }
}
