//! Transactional plan execution.
//!
//! Relocates media files to their computed destinations under a
//! log-then-act discipline: every mutation is preceded by a `pending`
//! transaction-log line and followed by an outcome line (see [`log`]).
//! Per-file failures are isolated — recorded and surfaced, never fatal to
//! the run. Only disk exhaustion or an unwritable destination root aborts
//! the remaining plan, and even then everything not yet started is logged
//! as skipped.
//!
//! The primary entry point is [`organize`], which streams
//! [`OrganizeEvent`]s as the plan executes.

mod file;
mod log;

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::OnceLock;

use async_stream::stream;
use futures::stream::FuturesUnordered;
use futures::{Stream, StreamExt};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

pub use self::log::{Outcome, Replay, ReplayedOp, TRANSACTION_LOG_NAME, TransactionLog, replay};
use crate::error::{ErrorKind, Result};
use crate::plan::{OrganizePlan, PlanEntry};
use crate::report::{DuplicateEvent, ExecutionReport};

/// Whether files are moved out of the source tree or copied into place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum Mode {
    #[display("move")]
    Move,
    #[display("copy")]
    Copy,
}

/// Execution knobs for one run.
#[derive(Debug, Clone, Copy)]
pub struct OrganizeOptions {
    pub mode: Mode,
    pub dry_run: bool,
    /// Re-check the destination after each mutation (size always; content
    /// hash whenever the bytes were rewritten rather than renamed).
    pub verify: bool,
    /// Concurrent file operations in flight.
    pub concurrency: usize,
}

impl Default for OrganizeOptions {
    fn default() -> Self {
        Self { mode: Mode::Move, dry_run: false, verify: true, concurrency: 4 }
    }
}

/// The outcome of processing a single plan entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// File landed at its computed destination.
    Placed { source: PathBuf, destination: PathBuf },
    /// Destination was taken; the file received a counter suffix.
    DuplicateRenamed(DuplicateEvent),
    /// Dry run: the would-be operation was logged, nothing moved.
    Planned { source: PathBuf, destination: PathBuf },
    /// Per-file failure; the original remains where it was.
    Failed { source: PathBuf, reason: String },
    /// Never started: cancellation or a preceding fatal condition.
    Skipped { source: PathBuf },
}

/// Progress events emitted by [`organize`].
///
/// Events follow a strict ordering: [`Started`](Self::Started) exactly
/// once, [`FileDone`](Self::FileDone) once per plan entry, then
/// [`Complete`](Self::Complete) exactly once with the final report. A
/// setup failure (unwritable root) terminates the stream with an `Err`
/// before any `FileDone`.
pub enum OrganizeEvent {
    Started { total: usize },
    FileDone(Action),
    Complete(ExecutionReport),
}

/// Shared state for one run's workers.
pub(crate) struct ExecCtx {
    pub(crate) root: PathBuf,
    pub(crate) options: OrganizeOptions,
    pub(crate) log: TransactionLog,
    pub(crate) reservations: Reservations,
    /// First fatal condition observed; set once, checked by the
    /// dispatcher after every completion.
    pub(crate) fatal: OnceLock<String>,
}

/// Per-destination-directory name reservation, so two files bound for the
/// same folder can never race on the same duplicate counter.
#[derive(Default)]
pub(crate) struct Reservations {
    dirs: Mutex<HashMap<PathBuf, HashSet<String>>>,
}

impl Reservations {
    /// Claim the first free name derived from `base` inside `dir`: the
    /// base name itself, then `stem_1.ext`, `stem_2.ext`, strictly
    /// increasing. A name is free when neither the filesystem nor an
    /// earlier reservation holds it.
    pub(crate) async fn reserve(&self, dir: &Path, base: &str) -> std::io::Result<(String, u32)> {
        let mut dirs = self.dirs.lock().await;
        let taken = dirs.entry(dir.to_path_buf()).or_default();
        let (stem, ext) = match base.rfind('.') {
            Some(at) if at > 0 => (&base[..at], &base[at..]),
            _ => (base, ""),
        };
        let mut counter: u32 = 0;
        loop {
            let candidate =
                if counter == 0 { base.to_string() } else { format!("{stem}_{counter}{ext}") };
            if !taken.contains(&candidate) && !tokio::fs::try_exists(dir.join(&candidate)).await? {
                taken.insert(candidate.clone());
                return Ok((candidate, counter));
            }
            counter += 1;
        }
    }
}

/// Execute `plan` against `root`, streaming progress.
///
/// Cancellation stops dispatch of new work immediately; operations already
/// in flight run to completion so no move is ever interrupted mid-write.
/// Entries never started are logged and reported as skipped.
#[instrument(skip_all, fields(total = plan.len(), mode = %options.mode, dry_run = options.dry_run))]
pub fn organize(
    plan: OrganizePlan,
    root: PathBuf,
    options: OrganizeOptions,
    cancel: CancellationToken,
) -> impl Stream<Item = Result<OrganizeEvent>> {
    stream!({
        let mut report = ExecutionReport { total: plan.len(), unique_locations: plan.unique_locations(), ..ExecutionReport::default() };
        yield Ok(OrganizeEvent::Started { total: plan.len() });

        if tokio::fs::create_dir_all(&root).await.is_err() {
            yield Err(exn::Exn::from(ErrorKind::Unwritable(root.clone())));
            return;
        }
        let log = match TransactionLog::open(&root.join(TRANSACTION_LOG_NAME)).await {
            Ok(log) => log,
            Err(error) => {
                yield Err(error);
                return;
            },
        };
        let ctx = Arc::new(ExecCtx {
            root,
            options,
            log,
            reservations: Reservations::default(),
            fatal: OnceLock::new(),
        });

        let mut pending: Vec<PlanEntry> = plan.entries;
        pending.reverse(); // pop() dispatches in plan order
        let mut processing = FuturesUnordered::new();
        let concurrency = options.concurrency.max(1);
        while processing.len() < concurrency
            && !cancel.is_cancelled()
            && let Some(entry) = pending.pop()
        {
            processing.push(file::execute_entry(ctx.clone(), entry));
        }

        while let Some(action) = processing.next().await {
            report.absorb(&action);
            yield Ok(OrganizeEvent::FileDone(action));
            let halted = ctx.fatal.get().is_some() || cancel.is_cancelled();
            if !halted && let Some(entry) = pending.pop() {
                processing.push(file::execute_entry(ctx.clone(), entry));
            }
        }

        // Anything never dispatched is recorded, not silently dropped.
        while let Some(entry) = pending.pop() {
            let action = file::skip_entry(&ctx, entry).await;
            report.absorb(&action);
            yield Ok(OrganizeEvent::FileDone(action));
        }

        report.fatal = ctx.fatal.get().cloned();
        info!(%report, "organize run finished");
        yield Ok(OrganizeEvent::Complete(report));
    })
}

#[cfg(test)]
mod tests {
    use futures::pin_mut;
    use snapsort_extract::MediaRecord;
    use snapsort_geo::Granularity;
    use time::macros::datetime;

    use super::*;
    use crate::path::Destination;

    fn entry(source: &Path, directory: &str, file_name: &str) -> PlanEntry {
        let mut record = MediaRecord::new(source.to_path_buf(), 4);
        record.captured_at = Some(datetime!(2023-06-15 14:30:00));
        PlanEntry {
            record,
            destination: Destination {
                directory: PathBuf::from(directory),
                file_name: file_name.to_string(),
            },
            location: "Norway".to_string(),
            granularity: Granularity::Country,
        }
    }

    fn source_file(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, b"abcd").unwrap();
        path
    }

    async fn run(
        plan: OrganizePlan,
        root: PathBuf,
        options: OrganizeOptions,
        cancel: CancellationToken,
    ) -> (Vec<Action>, ExecutionReport) {
        let events = organize(plan, root, options, cancel);
        pin_mut!(events);
        let mut actions = Vec::new();
        let mut report = None;
        while let Some(event) = events.next().await {
            match event.unwrap() {
                OrganizeEvent::Started { .. } => {},
                OrganizeEvent::FileDone(action) => actions.push(action),
                OrganizeEvent::Complete(r) => report = Some(r),
            }
        }
        (actions, report.unwrap())
    }

    #[tokio::test]
    async fn colliding_destinations_get_strictly_increasing_counters() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        let plan = OrganizePlan {
            entries: (0..3)
                .map(|i| {
                    let source = source_file(src.path(), &format!("copy{i}.jpg"));
                    entry(&source, "2023/06/Norway", "2023-06-15_IMG.jpg")
                })
                .collect(),
        };

        let (actions, report) =
            run(plan, dst.path().to_path_buf(), OrganizeOptions::default(), CancellationToken::new()).await;

        let dir = dst.path().join("2023/06/Norway");
        assert!(dir.join("2023-06-15_IMG.jpg").exists());
        assert!(dir.join("2023-06-15_IMG_1.jpg").exists());
        assert!(dir.join("2023-06-15_IMG_2.jpg").exists());
        assert_eq!(report.placed, 3);
        assert_eq!(report.duplicates.len(), 2);
        let counters: Vec<u32> = actions
            .iter()
            .filter_map(|action| match action {
                Action::DuplicateRenamed(event) => Some(event.counter),
                _ => None,
            })
            .collect();
        assert_eq!(counters, vec![1, 2]);
    }

    #[tokio::test]
    async fn existing_files_on_disk_claim_the_base_name() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        let dir = dst.path().join("2023/06/Norway");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("2023-06-15_IMG.jpg"), b"already here").unwrap();

        let source = source_file(src.path(), "a.jpg");
        let plan = OrganizePlan { entries: vec![entry(&source, "2023/06/Norway", "2023-06-15_IMG.jpg")] };
        let (_, report) =
            run(plan, dst.path().to_path_buf(), OrganizeOptions::default(), CancellationToken::new()).await;

        assert!(dir.join("2023-06-15_IMG_1.jpg").exists());
        assert_eq!(report.duplicates.len(), 1);
        assert_eq!(report.duplicates[0].counter, 1);
    }

    #[tokio::test]
    async fn move_mode_relocates_and_copy_mode_retains_the_source() {
        for (mode, expect_source) in [(Mode::Move, false), (Mode::Copy, true)] {
            let src = tempfile::tempdir().unwrap();
            let dst = tempfile::tempdir().unwrap();
            let source = source_file(src.path(), "a.jpg");
            let plan = OrganizePlan { entries: vec![entry(&source, "2023/06/Norway", "a.jpg")] };
            let options = OrganizeOptions { mode, ..OrganizeOptions::default() };
            let (_, report) = run(plan, dst.path().to_path_buf(), options, CancellationToken::new()).await;

            assert_eq!(report.placed, 1, "mode {mode}");
            assert_eq!(source.exists(), expect_source, "mode {mode}");
            assert!(dst.path().join("2023/06/Norway/a.jpg").exists(), "mode {mode}");
        }
    }

    #[tokio::test]
    async fn dry_run_logs_intent_without_touching_files() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        let source = source_file(src.path(), "a.jpg");
        let plan = OrganizePlan { entries: vec![entry(&source, "2023/06/Norway", "a.jpg")] };
        let options = OrganizeOptions { dry_run: true, ..OrganizeOptions::default() };
        let (_, report) = run(plan, dst.path().to_path_buf(), options, CancellationToken::new()).await;

        assert_eq!(report.planned, 1);
        assert!(source.exists());
        assert!(!dst.path().join("2023/06/Norway/a.jpg").exists());

        let replayed = replay(&dst.path().join(TRANSACTION_LOG_NAME)).await.unwrap();
        assert_eq!(replayed.count(Outcome::Planned), 1);
    }

    #[tokio::test]
    async fn cancellation_before_start_skips_everything() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        let sources: Vec<PathBuf> = (0..4).map(|i| source_file(src.path(), &format!("{i}.jpg"))).collect();
        let plan = OrganizePlan {
            entries: sources.iter().enumerate().map(|(i, s)| entry(s, "2023/06/Norway", &format!("{i}.jpg"))).collect(),
        };
        let cancel = CancellationToken::new();
        cancel.cancel();
        let options = OrganizeOptions { concurrency: 1, ..OrganizeOptions::default() };
        let (actions, report) = run(plan, dst.path().to_path_buf(), options, cancel).await;

        assert_eq!(actions.len(), 4);
        assert_eq!(report.skipped, 4);
        assert!(actions.iter().all(|action| matches!(action, Action::Skipped { .. })));
        let replayed = replay(&dst.path().join(TRANSACTION_LOG_NAME)).await.unwrap();
        assert_eq!(replayed.count(Outcome::Skipped), report.skipped);
    }

    #[tokio::test]
    async fn per_file_failures_never_stop_the_run() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        let good = source_file(src.path(), "good.jpg");
        let missing = src.path().join("missing.jpg");
        let plan = OrganizePlan {
            entries: vec![
                entry(&missing, "2023/06/Norway", "missing.jpg"),
                entry(&good, "2023/06/Norway", "good.jpg"),
            ],
        };
        let (_, report) =
            run(plan, dst.path().to_path_buf(), OrganizeOptions::default(), CancellationToken::new()).await;

        assert_eq!(report.failed, 1);
        assert_eq!(report.placed, 1);
        assert!(report.fatal.is_none());
        assert!(dst.path().join("2023/06/Norway/good.jpg").exists());
    }

    #[tokio::test]
    async fn replayed_log_rebuilds_the_report_counts() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        let good = source_file(src.path(), "good.jpg");
        let missing = src.path().join("missing.jpg");
        let plan = OrganizePlan {
            entries: vec![
                entry(&good, "2023/06/Norway", "good.jpg"),
                entry(&missing, "2023/06/Norway", "missing.jpg"),
            ],
        };
        let (_, report) =
            run(plan, dst.path().to_path_buf(), OrganizeOptions::default(), CancellationToken::new()).await;

        let replayed = replay(&dst.path().join(TRANSACTION_LOG_NAME)).await.unwrap();
        let audited = ExecutionReport::from_replay(&replayed);
        assert_eq!(audited.total, report.total);
        assert_eq!(audited.placed, report.placed);
        assert_eq!(audited.failed, report.failed);
        assert_eq!(replayed.uncommitted().count(), 0);
    }

    #[tokio::test]
    async fn end_to_end_three_file_scenario() {
        use std::sync::Arc;

        use snapsort_geo::providers::MockProvider;
        use snapsort_geo::{Coordinate, GeoResolver, MemoryCache, ProviderSlot, RawPlace, TokenBucket};

        use crate::cluster::LocationClusterer;
        use crate::path::PathGenerator;

        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();

        let mut oslo = MediaRecord::new(source_file(src.path(), "oslo.jpg"), 4);
        oslo.captured_at = Some(datetime!(2023-06-15 14:30:00));
        oslo.coordinate = Coordinate::new(59.9139, 10.7522);
        let mut no_gps = MediaRecord::new(source_file(src.path(), "no_gps.jpg"), 4);
        no_gps.captured_at = Some(datetime!(2023-06-16 09:00:00));
        let no_date = MediaRecord::new(source_file(src.path(), "no_date.jpg"), 4);

        let provider = MockProvider::answering(RawPlace {
            country: "Norway".to_string(),
            ..RawPlace::default()
        });
        let slot = ProviderSlot::new(Arc::new(provider), TokenBucket::new(10, 10.0));
        let resolver = Arc::new(GeoResolver::new(Arc::new(MemoryCache::new()), vec![slot]));

        let clusters =
            LocationClusterer::new(resolver).cluster(vec![oslo, no_gps, no_date]).await.unwrap();
        let plan = OrganizePlan::build(&clusters, &PathGenerator::default()).unwrap();
        let (_, report) =
            run(plan, dst.path().to_path_buf(), OrganizeOptions::default(), CancellationToken::new()).await;

        assert!(dst.path().join("2023/06/Norway/2023-06-15_oslo.jpg").exists());
        assert!(dst.path().join("2023/06/Unknown/2023-06-16_no_gps.jpg").exists());
        assert!(dst.path().join("Unknown_Date/Unknown/Unknown_no_date.jpg").exists());
        assert_eq!(report.placed, 3);
        assert!(report.is_full_success());

        let replayed = replay(&dst.path().join(TRANSACTION_LOG_NAME)).await.unwrap();
        assert_eq!(replayed.count(Outcome::Success), 3);
        assert_eq!(replayed.uncommitted().count(), 0);
    }
}
