use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use snapsort_geo::Coordinate;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};
use tokio::process::Command;
use tracing::{debug, instrument, warn};

use crate::error::{ErrorKind, Result};
use crate::record::MediaRecord;

/// Paths handed to a single exiftool invocation. Large batches hit
/// the platform argv limit; small ones waste process startup time.
const BATCH_SIZE: usize = 64;

/// Tag order matters: the first present tag wins as the capture date.
const DATE_TAGS: [&str; 3] = ["DateTimeOriginal", "CreateDate", "MediaCreateDate"];

/// Wrapper around the `exiftool` binary, invoked in batches with JSON
/// output.
#[derive(Debug, Clone)]
pub struct ExifTool {
    binary: PathBuf,
}

impl ExifTool {
    /// Find `exiftool` on the PATH.
    pub fn locate() -> Option<Self> {
        match which::which("exiftool") {
            Ok(binary) => Some(Self { binary }),
            Err(_) => None,
        }
    }

    #[cfg(test)]
    fn at(binary: PathBuf) -> Self {
        Self { binary }
    }

    /// Read the capture tags of `paths` in one subprocess call. Files
    /// exiftool cannot read are simply absent from the result.
    async fn read_tags(&self, paths: &[PathBuf]) -> Result<Vec<RawTags>> {
        let mut command = Command::new(&self.binary);
        command.args(["-json", "-n", "-fast2", "-charset", "filename=utf8"]);
        for tag in DATE_TAGS {
            command.arg(format!("-{tag}"));
        }
        command.args(["-GPSLatitude", "-GPSLongitude"]);
        command.args(paths);

        let output = command
            .output()
            .await
            .map_err(|error| exn::Exn::from(ErrorKind::Subprocess(error.to_string())))?;
        // exiftool exits non-zero when any file in the batch is
        // unreadable but still emits JSON for the rest.
        if output.stdout.is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            return Err(exn::Exn::from(ErrorKind::Subprocess(stderr)));
        }
        serde_json::from_slice(&output.stdout)
            .map_err(|_| exn::Exn::from(ErrorKind::InvalidOutput))
    }
}

#[derive(Debug, Deserialize)]
struct RawTags {
    #[serde(rename = "SourceFile")]
    source_file: PathBuf,
    #[serde(rename = "DateTimeOriginal")]
    date_time_original: Option<String>,
    #[serde(rename = "CreateDate")]
    create_date: Option<String>,
    #[serde(rename = "MediaCreateDate")]
    media_create_date: Option<String>,
    #[serde(rename = "GPSLatitude")]
    gps_latitude: Option<f64>,
    #[serde(rename = "GPSLongitude")]
    gps_longitude: Option<f64>,
}

impl RawTags {
    fn captured_at(&self) -> Option<PrimitiveDateTime> {
        [
            self.date_time_original.as_deref(),
            self.create_date.as_deref(),
            self.media_create_date.as_deref(),
        ]
        .into_iter()
        .flatten()
        .find_map(parse_exif_datetime)
    }

    fn coordinate(&self) -> Option<Coordinate> {
        // Out-of-range values are discarded here rather than poisoning
        // the geocode pipeline downstream.
        Coordinate::new(self.gps_latitude?, self.gps_longitude?)
    }
}

/// Parse an EXIF timestamp such as `2023:06:15 14:30:00`, tolerating
/// trailing sub-seconds or timezone offsets. The all-zero placeholder
/// some devices write is treated as absent.
fn parse_exif_datetime(raw: &str) -> Option<PrimitiveDateTime> {
    let format = format_description!("[year]:[month]:[day] [hour]:[minute]:[second]");
    let head = raw.get(..19)?;
    if head.starts_with("0000") {
        return None;
    }
    PrimitiveDateTime::parse(head, &format).ok()
}

/// Produces [`MediaRecord`]s for discovered files. Works degraded,
/// from filesystem timestamps alone, when exiftool is not installed.
pub struct Extractor {
    exiftool: Option<ExifTool>,
}

impl Extractor {
    pub fn new() -> Self {
        let exiftool = ExifTool::locate();
        if exiftool.is_none() {
            warn!("exiftool not found on PATH; capture dates fall back to file modification times and GPS tags are unavailable");
        }
        Self { exiftool }
    }

    pub fn with_exiftool(exiftool: Option<ExifTool>) -> Self {
        Self { exiftool }
    }

    /// Extract metadata for every path, in batches. Every input path
    /// yields a record; files whose tags cannot be read keep their
    /// modification time as the capture date.
    #[instrument(skip_all, fields(files = paths.len()))]
    pub async fn extract(&self, paths: &[PathBuf]) -> Result<Vec<MediaRecord>> {
        let mut records = Vec::with_capacity(paths.len());
        for batch in paths.chunks(BATCH_SIZE) {
            let mut tags: HashMap<PathBuf, RawTags> = match &self.exiftool {
                Some(exiftool) => match exiftool.read_tags(batch).await {
                    Ok(parsed) => parsed
                        .into_iter()
                        .map(|raw| (raw.source_file.clone(), raw))
                        .collect(),
                    Err(error) => {
                        warn!(%error, "metadata batch failed; falling back to file timestamps");
                        HashMap::new()
                    }
                },
                None => HashMap::new(),
            };
            for path in batch {
                records.push(build_record(path, tags.remove(path)).await?);
            }
        }
        debug!(records = records.len(), "metadata extraction complete");
        Ok(records)
    }
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new()
    }
}

async fn build_record(path: &Path, tags: Option<RawTags>) -> Result<MediaRecord> {
    let stat = tokio::fs::metadata(path)
        .await
        .map_err(|_| exn::Exn::from(ErrorKind::Io(path.to_path_buf())))?;
    let mut record = MediaRecord::new(path.to_path_buf(), stat.len());
    if let Some(tags) = &tags {
        record.captured_at = tags.captured_at();
        record.coordinate = tags.coordinate();
    }
    if record.captured_at.is_none()
        && let Ok(modified) = stat.modified()
    {
        let at = OffsetDateTime::from(modified);
        record.captured_at = Some(PrimitiveDateTime::new(at.date(), at.time()));
    }
    Ok(record)
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    fn tags(json: &str) -> RawTags {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn first_present_date_tag_wins() {
        let raw = tags(
            r#"{"SourceFile": "a.jpg",
                "CreateDate": "2021:01:02 03:04:05",
                "DateTimeOriginal": "2023:06:15 14:30:00"}"#,
        );
        assert_eq!(raw.captured_at(), Some(datetime!(2023-06-15 14:30:00)));
    }

    #[test]
    fn zeroed_placeholder_dates_are_absent() {
        let raw = tags(r#"{"SourceFile": "a.jpg", "CreateDate": "0000:00:00 00:00:00"}"#);
        assert_eq!(raw.captured_at(), None);
    }

    #[test]
    fn trailing_timezone_suffix_is_tolerated() {
        assert_eq!(
            parse_exif_datetime("2023:06:15 14:30:00+02:00"),
            Some(datetime!(2023-06-15 14:30:00)),
        );
    }

    #[test]
    fn out_of_range_gps_is_discarded() {
        let raw = tags(
            r#"{"SourceFile": "a.jpg", "GPSLatitude": 95.0, "GPSLongitude": 10.0}"#,
        );
        assert_eq!(raw.coordinate(), None);
    }

    #[test]
    fn valid_gps_becomes_a_coordinate() {
        let raw = tags(
            r#"{"SourceFile": "a.jpg", "GPSLatitude": 37.77, "GPSLongitude": -122.42}"#,
        );
        assert_eq!(raw.coordinate(), Coordinate::new(37.77, -122.42));
    }

    #[tokio::test]
    async fn records_fall_back_to_modification_time() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.jpg");
        std::fs::write(&path, b"not really a jpeg").unwrap();

        let extractor = Extractor::with_exiftool(None);
        let records = extractor.extract(&[path.clone()]).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].source, path);
        assert_eq!(records[0].size, 17);
        assert!(records[0].captured_at.is_some());
        assert_eq!(records[0].coordinate, None);
    }

    #[tokio::test]
    async fn missing_binary_batches_degrade_per_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("b.jpg");
        std::fs::write(&path, b"x").unwrap();

        let extractor =
            Extractor::with_exiftool(Some(ExifTool::at(PathBuf::from("/nonexistent/exiftool"))));
        let records = extractor.extract(&[path.clone()]).await.unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].captured_at.is_some());
    }
}
