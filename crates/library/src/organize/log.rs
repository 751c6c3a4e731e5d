//! The append-only transaction log.
//!
//! One self-contained JSON object per line, so the file stays parseable
//! after a crash at any byte. Every operation appends a `pending` line
//! *before* the filesystem mutation and an `outcome` line after it
//! (log-then-act): a pending line without a matching outcome line is the
//! signature of an interrupted run, which [`replay`] surfaces without ever
//! re-applying a committed move.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use exn::ResultExt;
use serde::{Deserialize, Serialize};
use snapsort_geo::Granularity;
use time::UtcDateTime;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;

use crate::error::{ErrorKind, Result};
use crate::plan::PlanEntry;

/// Default log file name inside the destination root.
pub const TRANSACTION_LOG_NAME: &str = "transaction_log.json";

/// Terminal state of one logged operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, derive_more::Display)]
#[serde(rename_all = "kebab-case")]
pub enum Outcome {
    #[display("success")]
    Success,
    #[display("failed")]
    Failed,
    #[display("duplicate-renamed")]
    DuplicateRenamed,
    #[display("planned")]
    Planned,
    #[display("skipped")]
    Skipped,
}

/// One line of the log.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
enum LogLine {
    Pending {
        seq: u64,
        at: i64,
        source: PathBuf,
        destination: PathBuf,
        location: String,
        granularity: Granularity,
        captured: Option<String>,
    },
    Outcome {
        seq: u64,
        at: i64,
        outcome: Outcome,
        destination: Option<PathBuf>,
        reason: Option<String>,
    },
}

/// Single-writer handle to the log file. Appends are serialized through
/// an internal mutex and flushed line by line, so concurrent file workers
/// never interleave partial lines.
pub struct TransactionLog {
    file: Mutex<File>,
    seq: AtomicU64,
}

impl TransactionLog {
    /// Open (appending) or create the log at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .or_raise(|| ErrorKind::Log)?;
        Ok(Self { file: Mutex::new(file), seq: AtomicU64::new(1) })
    }

    /// Record intent for one plan entry; returns the sequence number the
    /// outcome line must reference.
    pub async fn pending(&self, entry: &PlanEntry, destination: &Path) -> Result<u64> {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        self.append(&LogLine::Pending {
            seq,
            at: UtcDateTime::now().unix_timestamp(),
            source: entry.record.source.clone(),
            destination: destination.to_path_buf(),
            location: entry.location.clone(),
            granularity: entry.granularity,
            captured: entry.record.captured_at.map(|at| at.to_string()),
        })
        .await?;
        Ok(seq)
    }

    /// Record the terminal state of a previously-pending operation.
    pub async fn outcome(
        &self,
        seq: u64,
        outcome: Outcome,
        destination: Option<&Path>,
        reason: Option<String>,
    ) -> Result<()> {
        self.append(&LogLine::Outcome {
            seq,
            at: UtcDateTime::now().unix_timestamp(),
            outcome,
            destination: destination.map(Path::to_path_buf),
            reason,
        })
        .await
    }

    async fn append(&self, line: &LogLine) -> Result<()> {
        let mut encoded = serde_json::to_string(line).or_raise(|| ErrorKind::Log)?;
        encoded.push('\n');
        let mut file = self.file.lock().await;
        file.write_all(encoded.as_bytes()).await.or_raise(|| ErrorKind::Log)?;
        file.flush().await.or_raise(|| ErrorKind::Log)
    }
}

/// One operation reconstructed from the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayedOp {
    pub seq: u64,
    pub source: PathBuf,
    pub planned_destination: PathBuf,
    pub outcome: Option<Outcome>,
    pub final_destination: Option<PathBuf>,
}

impl ReplayedOp {
    /// Whether the operation reached a terminal state. A pending line
    /// without an outcome means the run died between logging and the
    /// mutation completing; only those operations may need re-applying.
    pub fn is_committed(&self) -> bool {
        self.outcome.is_some()
    }
}

/// The log read back, pendings matched to their outcomes.
#[derive(Debug, Default)]
pub struct Replay {
    pub operations: Vec<ReplayedOp>,
}

impl Replay {
    pub fn uncommitted(&self) -> impl Iterator<Item = &ReplayedOp> {
        self.operations.iter().filter(|op| !op.is_committed())
    }

    pub fn count(&self, outcome: Outcome) -> usize {
        self.operations.iter().filter(|op| op.outcome == Some(outcome)).count()
    }
}

/// Parse the log back into matched operations.
///
/// A truncated final line (crash mid-append) is tolerated; any other
/// unparsable line is as well, with a warning, since an audit tool should
/// extract as much as possible from a damaged log.
pub async fn replay(path: &Path) -> Result<Replay> {
    let raw = tokio::fs::read_to_string(path).await.or_raise(|| ErrorKind::Log)?;
    let mut operations: Vec<ReplayedOp> = Vec::new();
    for (number, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let parsed: LogLine = match serde_json::from_str(line) {
            Ok(parsed) => parsed,
            Err(error) => {
                warn!(line = number + 1, %error, "skipping unparsable log line");
                continue;
            },
        };
        match parsed {
            LogLine::Pending { seq, source, destination, .. } => operations.push(ReplayedOp {
                seq,
                source,
                planned_destination: destination,
                outcome: None,
                final_destination: None,
            }),
            LogLine::Outcome { seq, outcome, destination, .. } => {
                if let Some(op) = operations.iter_mut().rev().find(|op| op.seq == seq) {
                    op.outcome = Some(outcome);
                    op.final_destination = destination;
                } else {
                    warn!(seq, "outcome line without a pending line");
                }
            },
        }
    }
    Ok(Replay { operations })
}
