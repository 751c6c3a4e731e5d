//! Run summaries and the duplicates report.

use std::fmt;
use std::path::{Path, PathBuf};

use exn::ResultExt;

use crate::error::{ErrorKind, Result};
use crate::organize::{Action, Outcome, Replay};

/// Default duplicates report file name inside the destination root.
pub const DUPLICATES_REPORT_NAME: &str = "duplicates_report.txt";

/// A destination collision resolved by a counter rename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateEvent {
    pub source: PathBuf,
    /// The destination the file originally wanted.
    pub original: PathBuf,
    /// The counter-suffixed destination it received.
    pub duplicate: PathBuf,
    pub counter: u32,
    pub size: u64,
    pub captured: Option<String>,
}

/// Aggregated outcome of one organizing run.
#[derive(Debug, Default, Clone)]
pub struct ExecutionReport {
    pub total: usize,
    pub placed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub planned: usize,
    pub unique_locations: usize,
    pub duplicates: Vec<DuplicateEvent>,
    /// Set when the run aborted early (disk full, unwritable root).
    pub fatal: Option<String>,
}

impl ExecutionReport {
    pub fn absorb(&mut self, action: &Action) {
        match action {
            Action::Placed { .. } => self.placed += 1,
            Action::DuplicateRenamed(event) => {
                self.placed += 1;
                self.duplicates.push(event.clone());
            },
            Action::Planned { .. } => self.planned += 1,
            Action::Failed { .. } => self.failed += 1,
            Action::Skipped { .. } => self.skipped += 1,
        }
    }

    /// Rebuild the countable portion of a report from a replayed log,
    /// e.g. when auditing after a crash.
    pub fn from_replay(replay: &Replay) -> Self {
        Self {
            total: replay.operations.len(),
            placed: replay.count(Outcome::Success) + replay.count(Outcome::DuplicateRenamed),
            failed: replay.count(Outcome::Failed),
            skipped: replay.count(Outcome::Skipped),
            planned: replay.count(Outcome::Planned),
            ..Self::default()
        }
    }

    pub fn is_full_success(&self) -> bool {
        self.fatal.is_none() && self.failed == 0 && self.skipped == 0
    }
}

impl fmt::Display for ExecutionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} placed, {} renamed duplicates, {} failed, {} skipped, {} planned",
            self.placed,
            self.duplicates.len(),
            self.failed,
            self.skipped,
            self.planned,
        )?;
        if let Some(fatal) = &self.fatal {
            write!(f, " (aborted: {fatal})")?;
        }
        Ok(())
    }
}

/// Write the human-readable duplicates report.
pub async fn write_duplicates_report(path: &Path, duplicates: &[DuplicateEvent]) -> Result<()> {
    let mut body = String::from("Duplicate destinations resolved by counter rename\n");
    body.push_str("==================================================\n\n");
    if duplicates.is_empty() {
        body.push_str("No duplicates encountered.\n");
    }
    for event in duplicates {
        body.push_str(&format!(
            "source:    {}\nwanted:    {}\nplaced as: {} (counter {})\nsize:      {} bytes\ncaptured:  {}\n\n",
            event.source.display(),
            event.original.display(),
            event.duplicate.display(),
            event.counter,
            event.size,
            event.captured.as_deref().unwrap_or("unknown"),
        ));
    }
    tokio::fs::write(path, body).await.or_raise(|| ErrorKind::Report)
}
