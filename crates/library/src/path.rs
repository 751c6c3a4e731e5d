//! Destination path derivation.
//!
//! Pure mapping from (capture date, cluster place) to a relative
//! destination: directory `YYYY/MM/Location` for dated records, falling
//! back to `Unknown` for unresolvable locations and `Unknown_Date/Unknown`
//! when no capture date exists. The file name itself comes from the
//! configured [`FilenamePattern`]. Deterministic: equal inputs always map
//! to equal paths.

use std::path::PathBuf;

use snapsort_extract::MediaRecord;
use snapsort_geo::{Place, sanitize};

use crate::error::Result;
use crate::template::FilenamePattern;

/// Directory used when a record has no capture date.
const UNKNOWN_DATE_DIR: &str = "Unknown_Date";
/// Location segment used when a cluster's place is unresolvable.
const UNKNOWN_LOCATION_DIR: &str = "Unknown";

/// A record's computed destination, relative to the library root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub directory: PathBuf,
    pub file_name: String,
}

impl Destination {
    pub fn relative_path(&self) -> PathBuf {
        self.directory.join(&self.file_name)
    }
}

/// Maps records and their cluster's place onto destination paths.
pub struct PathGenerator {
    pattern: FilenamePattern,
}

impl PathGenerator {
    pub fn new(pattern: FilenamePattern) -> Self {
        Self { pattern }
    }

    /// Compute where `record` belongs given its cluster's `place`.
    ///
    /// The location segment reuses the place's already-sanitized name; the
    /// original file name passes through the filename pattern untouched so
    /// the source name stays recognizable.
    pub fn destination(&self, record: &MediaRecord, place: &Place) -> Result<Destination> {
        let location = if place.is_unknown() {
            UNKNOWN_LOCATION_DIR.to_string()
        } else {
            sanitize(&place.name)
        };
        let date = record.captured_at.map(|at| at.date());
        let directory = match date {
            Some(date) => PathBuf::from(format!("{:04}", date.year()))
                .join(format!("{:02}", u8::from(date.month())))
                .join(location),
            None => PathBuf::from(UNKNOWN_DATE_DIR).join(UNKNOWN_LOCATION_DIR),
        };
        let file_name = self.pattern.render(date, record.stem(), &record.extension)?;
        Ok(Destination { directory, file_name })
    }
}

impl Default for PathGenerator {
    fn default() -> Self {
        Self::new(FilenamePattern::default())
    }
}
