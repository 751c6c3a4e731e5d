//! Turning clusters into an ordered execution plan.

use std::collections::BTreeSet;

use snapsort_extract::MediaRecord;
use snapsort_geo::{Granularity, Place};

use crate::cluster::LocationCluster;
use crate::error::Result;
use crate::path::{Destination, PathGenerator};

/// One file's unit of work: the record, its computed destination and a
/// snapshot of the location it was filed under.
#[derive(Debug, Clone)]
pub struct PlanEntry {
    pub record: MediaRecord,
    pub destination: Destination,
    pub location: String,
    pub granularity: Granularity,
}

/// The full ordered plan for a run.
#[derive(Debug, Default)]
pub struct OrganizePlan {
    pub entries: Vec<PlanEntry>,
}

impl OrganizePlan {
    /// Flatten clusters into per-file entries, ordered by destination so
    /// the log reads coherently and duplicate counters assign in a stable
    /// order.
    pub fn build(clusters: &[LocationCluster], generator: &PathGenerator) -> Result<Self> {
        let mut entries = Vec::new();
        for cluster in clusters {
            for record in &cluster.members {
                let destination = generator.destination(record, &cluster.place)?;
                entries.push(PlanEntry {
                    record: record.clone(),
                    destination,
                    location: location_label(&cluster.place),
                    granularity: cluster.place.granularity,
                });
            }
        }
        entries.sort_by(|a, b| {
            a.destination.relative_path().cmp(&b.destination.relative_path()).then_with(|| a.record.source.cmp(&b.record.source))
        });
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Distinct location labels in the plan.
    pub fn unique_locations(&self) -> usize {
        self.entries.iter().map(|entry| entry.location.as_str()).collect::<BTreeSet<_>>().len()
    }
}

fn location_label(place: &Place) -> String {
    if place.is_unknown() { "Unknown".to_string() } else { place.name.clone() }
}
