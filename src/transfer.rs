//! Concurrent per-archive upload and download
//!
//! One task per split (upload) or per selected archive (download) runs on a
//! bounded rayon pool. Every task produces a [`TaskOutcome`]; failures stay
//! scoped to their task and never stop the siblings.

use crate::archive;
use crate::cancel::CancelFlag;
use crate::error::{Error, Result};
use crate::logger::Logger;
use crate::model::{archive_name, ArchiveDescriptor, Metadata, Split};
use crate::split::find_by_path_substring;
use crate::stats::StatsAggregator;
use crate::store::ObjectStore;
use crate::uri::StoreUri;
use std::io::{BufReader, Seek, SeekFrom};
use std::path::Path;
use std::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Everything a transfer task borrows from the command that started it.
pub struct TransferContext<'a> {
    pub store: &'a dyn ObjectStore,
    pub uri: &'a StoreUri,
    pub threads: usize,
    pub cancel: &'a CancelFlag,
    pub stats: &'a StatsAggregator,
    pub logger: &'a dyn Logger,
    /// Scratch space for archives on their way to or from the store.
    pub work_dir: &'a Path,
}

/// Result of one task
#[derive(Debug)]
pub enum TaskOutcome {
    Done(ArchiveDescriptor),
    Skipped(u32),
    Failed { id: u32, error: Error },
}

/// Outcomes partitioned by kind, in completion order.
#[derive(Debug, Default)]
pub struct TransferReport {
    pub completed: Vec<ArchiveDescriptor>,
    pub skipped: Vec<u32>,
    pub failed: Vec<(u32, String)>,
}

impl TransferReport {
    pub fn from_outcomes(outcomes: impl IntoIterator<Item = TaskOutcome>) -> Self {
        let mut report = Self::default();
        for outcome in outcomes {
            match outcome {
                TaskOutcome::Done(desc) => report.completed.push(desc),
                TaskOutcome::Skipped(id) => report.skipped.push(id),
                TaskOutcome::Failed { id, error } => report.failed.push((id, error.to_string())),
            }
        }
        report
    }

    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty() && self.failed.is_empty()
    }

    pub fn bytes(&self) -> u64 {
        self.completed.iter().map(|d| d.size).sum()
    }

    /// One-line tally for the end of a run.
    pub fn summary(&self, verb: &str) -> String {
        let mut out = format!(
            "{} archive(s) {verb}, {} skipped, {} failed",
            self.completed.len(),
            self.skipped.len(),
            self.failed.len()
        );
        if !self.failed.is_empty() {
            let mut ids: Vec<u32> = self.failed.iter().map(|(id, _)| *id).collect();
            ids.sort_unstable();
            let ids: Vec<String> = ids.iter().map(u32::to_string).collect();
            out.push_str(&format!(" (failed split ids: {})", ids.join(", ")));
        }
        out
    }
}

/// Run `task` once per item on a pool of `threads` workers.
///
/// Outcomes are returned in the order the tasks finished.
fn run_tasks<I, F>(threads: usize, items: &[I], task: F) -> Result<Vec<TaskOutcome>>
where
    I: Sync,
    F: Fn(&I) -> TaskOutcome + Sync,
{
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads.max(1))
        .thread_name(|i| format!("s3split-worker-{i}"))
        .build()
        .map_err(|e| Error::Pool(e.to_string()))?;

    let (tx, rx) = mpsc::channel::<TaskOutcome>();
    let task = &task;
    pool.scope(|s| {
        for item in items {
            let tx = tx.clone();
            s.spawn(move |_| {
                // Receiver outlives the scope
                let _ = tx.send(task(item));
            });
        }
    });
    drop(tx);
    Ok(rx.into_iter().collect())
}

/// Archive and upload every split.
pub fn upload_splits(
    ctx: &TransferContext<'_>,
    source_root: &Path,
    splits: &[Split],
) -> Result<TransferReport> {
    info!(
        splits = splits.len(),
        threads = ctx.threads,
        target = %ctx.uri,
        "starting upload"
    );
    let outcomes = run_tasks(ctx.threads, splits, |split| {
        let name = split.archive_name();
        match upload_one(ctx, source_root, split) {
            Ok(Some(desc)) => TaskOutcome::Done(desc),
            Ok(None) => {
                ctx.logger.skipped(&name);
                TaskOutcome::Skipped(split.id)
            }
            Err(e) => {
                error!(archive = %name, error = %e, "upload failed");
                ctx.logger.error("upload", &name, &e.to_string());
                TaskOutcome::Failed { id: split.id, error: e }
            }
        }
    })?;
    Ok(TransferReport::from_outcomes(outcomes))
}

/// `Ok(None)` when cancellation was observed.
fn upload_one(
    ctx: &TransferContext<'_>,
    source_root: &Path,
    split: &Split,
) -> Result<Option<ArchiveDescriptor>> {
    let name = split.archive_name();
    if ctx.cancel.is_cancelled() {
        debug!(archive = %name, "cancelled before start");
        return Ok(None);
    }

    let scratch = tempfile::Builder::new()
        .prefix("s3split-")
        .tempdir_in(ctx.work_dir)?;
    let tar_path = scratch.path().join(&name);
    let size = archive::pack(source_root, &split.paths, &tar_path)?;
    debug!(archive = %name, files = split.paths.len(), bytes = size, "archive created");
    ctx.logger.archived(&name, split.paths.len(), size);

    if ctx.cancel.is_cancelled() {
        debug!(archive = %name, "cancelled before transfer");
        return Ok(None);
    }

    let key = ctx.uri.key(&name);
    let progress = |n: u64| ctx.stats.update(&name, n, size);
    ctx.store.upload_file(&key, &tar_path, &progress)?;
    ctx.logger.uploaded(&key, size);
    info!(key = %key, bytes = size, "archive uploaded");

    Ok(Some(ArchiveDescriptor { name, id: split.id, size }))
}

/// Archives holding at least one path that contains `filter`.
///
/// Returns the selection and the selected split ids with no archive recorded.
pub fn select_archives(
    metadata: &Metadata,
    filter: Option<&str>,
) -> (Vec<ArchiveDescriptor>, Vec<u32>) {
    let ids = find_by_path_substring(&metadata.owned_splits(), filter);
    let mut selected = Vec::with_capacity(ids.len());
    let mut missing = Vec::new();
    for id in ids {
        match metadata.archive_by_id(id) {
            Some(desc) => selected.push(desc.clone()),
            None => {
                warn!(archive = %archive_name(id), "split has no uploaded archive, skipping");
                missing.push(id);
            }
        }
    }
    (selected, missing)
}

/// Fetch and extract every archive into `dest_root`.
pub fn download_archives(
    ctx: &TransferContext<'_>,
    archives: &[ArchiveDescriptor],
    dest_root: &Path,
    filter: Option<&str>,
) -> Result<TransferReport> {
    info!(
        archives = archives.len(),
        threads = ctx.threads,
        source = %ctx.uri,
        "starting download"
    );
    let outcomes = run_tasks(ctx.threads, archives, |desc| {
        match download_one(ctx, desc, dest_root, filter) {
            Ok(true) => TaskOutcome::Done(desc.clone()),
            Ok(false) => {
                ctx.logger.skipped(&desc.name);
                TaskOutcome::Skipped(desc.id)
            }
            Err(e) => {
                error!(archive = %desc.name, error = %e, "download failed");
                ctx.logger.error("download", &desc.name, &e.to_string());
                TaskOutcome::Failed { id: desc.id, error: e }
            }
        }
    })?;
    Ok(TransferReport::from_outcomes(outcomes))
}

/// `Ok(false)` when cancellation was observed.
fn download_one(
    ctx: &TransferContext<'_>,
    desc: &ArchiveDescriptor,
    dest_root: &Path,
    filter: Option<&str>,
) -> Result<bool> {
    if ctx.cancel.is_cancelled() {
        debug!(archive = %desc.name, "cancelled before start");
        return Ok(false);
    }

    let key = ctx.uri.key(&desc.name);
    let mut scratch = tempfile::tempfile_in(ctx.work_dir)?;
    let progress = |n: u64| ctx.stats.update(&desc.name, n, desc.size);
    let received = ctx.store.download_file(&key, &mut scratch, &progress)?;
    ctx.logger.downloaded(&key, received);
    if received != desc.size {
        warn!(key = %key, expected = desc.size, received, "archive size differs from metadata");
    }

    scratch.seek(SeekFrom::Start(0))?;
    let unpacked = archive::unpack(BufReader::new(scratch), dest_root, filter)?;
    ctx.logger.extracted(&desc.name, unpacked.extracted);
    info!(
        archive = %desc.name,
        extracted = unpacked.extracted,
        filtered = unpacked.filtered,
        rejected = unpacked.rejected,
        "archive extracted"
    );
    Ok(true)
}
