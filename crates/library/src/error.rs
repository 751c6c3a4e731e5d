use std::path::PathBuf;

use derive_more::{Display, Error};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

/// Classifies the origin of a library failure.
///
/// Per-file conditions (permission errors, verification mismatches) never
/// surface here — they are isolated inside the organizer and recorded as
/// failed outcomes. These kinds cover the conditions that stop a run.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Coordinate resolution via [`snapsort_geo::GeoResolver`] failed.
    Geocode,
    /// The filename template could not be compiled or rendered.
    Template,
    /// The transaction log could not be written or read back.
    #[display("transaction log operation failed")]
    Log,
    /// The destination filesystem is out of space.
    #[display("destination filesystem is out of space")]
    DiskFull,
    /// The destination root is missing or not writable.
    #[display("destination root is not writable: {_0:?}")]
    Unwritable(#[error(not(source))] PathBuf),
    /// The duplicates report could not be written.
    Report,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Geocode | Self::Log)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_format_their_context() {
        assert_eq!(
            ErrorKind::Unwritable(PathBuf::from("/library")).to_string(),
            "destination root is not writable: \"/library\"",
        );
        assert!(ErrorKind::Log.is_retryable());
        assert!(!ErrorKind::DiskFull.is_retryable());
    }
}
