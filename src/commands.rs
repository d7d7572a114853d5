//! The upload, download and check commands

use crate::cancel::CancelFlag;
use crate::check::{check as check_dataset, CheckReport};
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::logger::Logger;
use crate::metadata::MetadataStore;
use crate::model::Metadata;
use crate::split::split_by_size;
use crate::stats::StatsAggregator;
use crate::store::{open_store, ObjectStore};
use crate::transfer::{download_archives, select_archives, upload_splits, TransferContext, TransferReport};
use crate::uri::StoreUri;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{error, info, warn};

const MIB: u64 = 1024 * 1024;

/// Process-wide state shared by every command.
pub struct Runtime<'a> {
    pub settings: &'a Settings,
    pub cancel: &'a CancelFlag,
    pub logger: &'a dyn Logger,
    /// Where task-local archives are staged; the system temp dir when `None`.
    pub work_dir: Option<PathBuf>,
}

impl Runtime<'_> {
    fn work_dir(&self) -> PathBuf {
        self.work_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    fn context<'a>(
        &'a self,
        store: &'a dyn ObjectStore,
        uri: &'a StoreUri,
        stats: &'a StatsAggregator,
        work_dir: &'a Path,
    ) -> TransferContext<'a> {
        TransferContext {
            store,
            uri,
            threads: self.settings.threads,
            cancel: self.cancel,
            stats,
            logger: self.logger,
            work_dir,
        }
    }
}

/// Split `source` into archives of at most `tar_size_mb` MiB and upload them to `target`.
pub fn upload(
    rt: &Runtime<'_>,
    source: &Path,
    target: &str,
    tar_size_mb: u64,
    description: Option<String>,
) -> Result<TransferReport> {
    let started = Instant::now();
    if !source.is_dir() {
        return Err(Error::Validation(format!(
            "{}: source is not a directory",
            source.display()
        )));
    }
    let max_bytes = tar_size_mb
        .checked_mul(MIB)
        .filter(|n| *n > 0)
        .ok_or_else(|| Error::Validation(format!("invalid tar size {tar_size_mb} MiB")))?;
    let uri = StoreUri::parse(target)?;
    if description.is_none() {
        warn!("no description given for the dataset");
    }

    let store = open_store(&rt.settings.store, &uri.bucket)?;
    store.ensure_bucket()?;
    let meta_store = MetadataStore::new(store.as_ref(), &uri);

    let existing = store.list(&uri.list_prefix())?;
    if !existing.is_empty() {
        warn!(target = %uri, objects = existing.len(), "target path is not empty");
    }
    if let Some(previous) = meta_store.read()? {
        if !previous.splits.is_empty() {
            warn!(target = %uri, "dataset metadata already exists and will be overwritten");
        }
    }

    let splits = split_by_size(source, max_bytes)?;
    if splits.is_empty() {
        return Err(Error::Validation(format!(
            "{}: no files to upload",
            source.display()
        )));
    }
    let pending = Metadata::pending(description.clone(), &splits);
    meta_store.write(&pending)?;
    info!(splits = splits.len(), "pre-transfer metadata written");

    let stats = StatsAggregator::new(
        rt.settings.stats_interval,
        splits.len(),
        pending.total_size(),
    );
    let work_dir = rt.work_dir();
    let report = upload_splits(
        &rt.context(store.as_ref(), &uri, &stats, &work_dir),
        source,
        &splits,
    )?;

    meta_store.write(&Metadata::completed(
        description,
        &splits,
        report.completed.clone(),
    ))?;
    info!(archives = report.completed.len(), "post-transfer metadata written");

    stats.report();
    rt.logger.done(
        report.completed.len(),
        report.bytes(),
        started.elapsed().as_secs_f64(),
    );
    info!("{}", report.summary("uploaded"));
    Ok(report)
}

/// Restore the dataset at `source` into the new directory `target`.
///
/// With `prefix`, only archives and entries whose path contains it are restored.
pub fn download(
    rt: &Runtime<'_>,
    source: &str,
    target: &Path,
    prefix: Option<&str>,
) -> Result<TransferReport> {
    let started = Instant::now();
    if target.exists() {
        return Err(Error::Validation(format!(
            "{}: target path already exists",
            target.display()
        )));
    }
    let uri = StoreUri::parse(source)?;
    let store = open_store(&rt.settings.store, &uri.bucket)?;

    let (metadata, checked) = inspect(store.as_ref(), &uri)?;
    if !checked.passed() {
        return Err(Error::Integrity(checked.problems.len()));
    }
    std::fs::create_dir_all(target)?;

    let (selected, missing) = select_archives(&metadata, prefix);
    if selected.is_empty() {
        info!(prefix = prefix.unwrap_or(""), "no split selected");
        return Ok(TransferReport {
            skipped: missing,
            ..TransferReport::default()
        });
    }
    info!(archives = selected.len(), "archives selected for download");

    let stats = StatsAggregator::new(
        rt.settings.stats_interval,
        selected.len(),
        selected.iter().map(|d| d.size).sum(),
    );
    let work_dir = rt.work_dir();
    let mut report = download_archives(
        &rt.context(store.as_ref(), &uri, &stats, &work_dir),
        &selected,
        target,
        prefix,
    )?;
    report.skipped.extend(missing);

    stats.report();
    rt.logger.done(
        report.completed.len(),
        report.bytes(),
        started.elapsed().as_secs_f64(),
    );
    info!("{}", report.summary("downloaded"));
    Ok(report)
}

/// Verify the dataset at `target` against its metadata document.
pub fn check(rt: &Runtime<'_>, target: &str) -> Result<CheckReport> {
    let uri = StoreUri::parse(target)?;
    let store = open_store(&rt.settings.store, &uri.bucket)?;
    let (_, report) = inspect(store.as_ref(), &uri)?;
    Ok(report)
}

fn inspect(store: &dyn ObjectStore, uri: &StoreUri) -> Result<(Metadata, CheckReport)> {
    if !store.bucket_exists()? {
        return Err(Error::Store(format!("bucket {} does not exist", uri.bucket)));
    }
    let metadata = MetadataStore::new(store, uri).require()?;
    if let Some(description) = &metadata.description {
        info!(description = %description, "dataset");
    }
    let listing = store.list(&uri.list_prefix())?;
    let report = check_dataset(&metadata, &listing, uri);

    for problem in &report.problems {
        error!("{problem}");
    }
    if report.passed() {
        info!(splits = metadata.splits.len(), "S3 check passed");
    } else {
        error!(problems = report.problems.len(), "S3 check not passed");
    }
    info!("dataset directories:\n{}", report.directory_listing());
    Ok((metadata, report))
}
