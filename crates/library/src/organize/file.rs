//! Per-entry execution: reserve a name, log intent, mutate, verify, log
//! the outcome. All failures are absorbed into an [`Action`]; fatal
//! conditions additionally flag the shared context so the dispatcher
//! stops promoting new work.

use std::io;
use std::path::Path;
use std::sync::Arc;

use tracing::warn;

use crate::organize::log::Outcome;
use crate::organize::{Action, ExecCtx, Mode};
use crate::plan::PlanEntry;
use crate::report::DuplicateEvent;

pub(crate) async fn execute_entry(ctx: Arc<ExecCtx>, entry: PlanEntry) -> Action {
    let source = entry.record.source.clone();
    let dir = ctx.root.join(&entry.destination.directory);
    let base_destination = dir.join(&entry.destination.file_name);

    if let Err(error) = tokio::fs::create_dir_all(&dir).await {
        // A root we cannot create directories under dooms every entry, not
        // just this one; flag it so the dispatcher stops promoting work.
        if root_unwritable(&error) {
            let _ = ctx.fatal.set(format!("destination root is not writable: {error}"));
        }
        return fail(&ctx, &entry, &base_destination, &error, None).await;
    }
    let (name, counter) = match ctx.reservations.reserve(&dir, &entry.destination.file_name).await {
        Ok(reserved) => reserved,
        Err(error) => return fail(&ctx, &entry, &base_destination, &error, None).await,
    };
    let destination = dir.join(&name);

    let seq = match ctx.log.pending(&entry, &destination).await {
        Ok(seq) => seq,
        Err(error) => {
            // A log that cannot be appended to breaks the audit trail;
            // nothing further may mutate the filesystem.
            let _ = ctx.fatal.set(error.to_string());
            return Action::Failed { source, reason: error.to_string() };
        },
    };

    if ctx.options.dry_run {
        let _ = ctx.log.outcome(seq, Outcome::Planned, Some(&destination), None).await;
        return Action::Planned { source, destination };
    }

    if let Err(error) = transfer_and_verify(&ctx, &entry, &source, &destination).await {
        return fail(&ctx, &entry, &destination, &error, Some(seq)).await;
    }

    let outcome = if counter > 0 { Outcome::DuplicateRenamed } else { Outcome::Success };
    if let Err(error) = ctx.log.outcome(seq, outcome, Some(&destination), None).await {
        let _ = ctx.fatal.set(error.to_string());
    }
    if counter > 0 {
        Action::DuplicateRenamed(DuplicateEvent {
            source,
            original: base_destination,
            duplicate: destination,
            counter,
            size: entry.record.size,
            captured: entry.record.captured_at.map(|at| at.to_string()),
        })
    } else {
        Action::Placed { source, destination }
    }
}

/// Record an entry that was never started.
pub(crate) async fn skip_entry(ctx: &ExecCtx, entry: PlanEntry) -> Action {
    let destination = ctx.root.join(&entry.destination.directory).join(&entry.destination.file_name);
    if let Ok(seq) = ctx.log.pending(&entry, &destination).await {
        let _ = ctx.log.outcome(seq, Outcome::Skipped, None, None).await;
    }
    Action::Skipped { source: entry.record.source.clone() }
}

/// Destination-directory creation failures that condemn the whole run.
/// Per-file permission errors (an unreadable source, say) stay isolated;
/// these arise from the destination side and will recur for every entry.
fn root_unwritable(error: &io::Error) -> bool {
    matches!(error.kind(), io::ErrorKind::PermissionDenied | io::ErrorKind::ReadOnlyFilesystem)
}

/// Absorb a per-file error: flag the run on disk exhaustion, log the
/// failed outcome (opening a pending line first when the failure predates
/// one), and report the file untouched.
async fn fail(
    ctx: &ExecCtx,
    entry: &PlanEntry,
    destination: &Path,
    error: &io::Error,
    seq: Option<u64>,
) -> Action {
    if error.kind() == io::ErrorKind::StorageFull {
        let _ = ctx.fatal.set(error.to_string());
    }
    let reason = error.to_string();
    warn!(source = %entry.record.source.display(), %reason, "file failed");
    let seq = match seq {
        Some(seq) => Some(seq),
        None => ctx.log.pending(entry, destination).await.ok(),
    };
    if let Some(seq) = seq {
        let _ = ctx.log.outcome(seq, Outcome::Failed, None, Some(reason.clone())).await;
    }
    Action::Failed { source: entry.record.source.clone(), reason }
}

/// Perform the mutation, then verify it when enabled.
///
/// A cross-device move degrades to copy-verify-delete so the source stays
/// intact until the destination is known good. A verification mismatch
/// undoes the mutation where feasible: the copied destination is removed,
/// or a same-device rename is renamed back.
async fn transfer_and_verify(
    ctx: &ExecCtx,
    entry: &PlanEntry,
    source: &Path,
    destination: &Path,
) -> io::Result<()> {
    let copied = match ctx.options.mode {
        Mode::Copy => {
            tokio::fs::copy(source, destination).await?;
            true
        },
        Mode::Move => match tokio::fs::rename(source, destination).await {
            Ok(()) => false,
            Err(error) if error.kind() == io::ErrorKind::CrossesDevices => {
                tokio::fs::copy(source, destination).await?;
                true
            },
            Err(error) => return Err(error),
        },
    };

    if ctx.options.verify
        && let Err(error) = verify(entry, source, destination, copied).await
    {
        return Err(error);
    }

    // Source removal is the last step, so a failure anywhere above leaves
    // the original in place (or restorable).
    if copied && ctx.options.mode == Mode::Move {
        tokio::fs::remove_file(source).await?;
    }
    Ok(())
}

async fn verify(entry: &PlanEntry, source: &Path, destination: &Path, copied: bool) -> io::Result<()> {
    let stat = tokio::fs::metadata(destination).await?;
    let matches = stat.len() == entry.record.size
        && (!copied || digest(source).await? == digest(destination).await?);
    if matches {
        return Ok(());
    }
    if copied {
        let _ = tokio::fs::remove_file(destination).await;
    } else {
        let _ = tokio::fs::rename(destination, source).await;
    }
    Err(io::Error::other("destination does not match the source after transfer"))
}

async fn digest(path: &Path) -> io::Result<blake3::Hash> {
    let data = tokio::fs::read(path).await?;
    Ok(blake3::hash(&data))
}
