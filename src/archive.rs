//! Tar packing and filtered extraction of split archives
//! Entries are stored as `s3split/<relative path>` so an archive opened by
//! hand never spills into the working directory.

use crate::error::{Error, Result};
use crate::model::CONTAINER_FOLDER;
use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Component, Path, PathBuf};
use tar::{Archive, Builder};
use tracing::{debug, warn};

/// Outcome of extracting one archive
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UnpackStats {
    pub extracted: u64,
    pub filtered: u64,
    pub rejected: u64,
}

/// Name an entry gets inside the archive.
pub fn container_entry_name(rel: &str) -> PathBuf {
    Path::new(CONTAINER_FOLDER).join(rel)
}

/// Restore the original relative path of an archive entry.
///
/// Returns `None` for the bare container folder and for entries that would
/// land outside the destination (absolute, `..`).
pub fn restore_entry_path(entry: &Path) -> Option<PathBuf> {
    let rel = entry.strip_prefix(CONTAINER_FOLDER).unwrap_or(entry);
    let mut out = PathBuf::new();
    for component in rel.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if out.as_os_str().is_empty() {
        None
    } else {
        Some(out)
    }
}

/// True when a parent of `rel` under `dest_root` is a symlink, which would
/// let the entry land outside `dest_root`.
fn through_symlink(dest_root: &Path, rel: &Path) -> bool {
    rel.ancestors()
        .skip(1)
        .filter(|a| !a.as_os_str().is_empty())
        .any(|a| {
            fs::symlink_metadata(dest_root.join(a))
                .map(|m| m.file_type().is_symlink())
                .unwrap_or(false)
        })
}

/// Write `paths` (relative to `source_root`) into a tar file at `dest`.
///
/// Symlinks are stored as link entries, not followed.
///
/// Returns the archive size in bytes.
pub fn pack(source_root: &Path, paths: &[String], dest: &Path) -> Result<u64> {
    let file = File::create(dest)?;
    let mut builder = Builder::new(BufWriter::with_capacity(1024 * 1024, file));
    builder.follow_symlinks(false);

    for rel in paths {
        builder
            .append_path_with_name(source_root.join(rel), container_entry_name(rel))
            .map_err(|e| Error::Archive(format!("cannot add {rel}: {e}")))?;
    }

    let mut writer = builder
        .into_inner()
        .map_err(|e| Error::Archive(format!("cannot finish {}: {e}", dest.display())))?;
    writer.flush()?;
    drop(writer);

    Ok(fs::metadata(dest)?.len())
}

/// Extract the tar stream in `reader` under `dest_root`.
///
/// With a `filter`, only entries whose restored path contains the
/// `/`-trimmed filter are written.
pub fn unpack<R: Read>(reader: R, dest_root: &Path, filter: Option<&str>) -> Result<UnpackStats> {
    let filter = filter.map(|f| f.trim_matches('/'));
    let mut archive = Archive::new(reader);
    let mut stats = UnpackStats::default();

    let entries = archive
        .entries()
        .map_err(|e| Error::Archive(format!("cannot read archive: {e}")))?;
    for entry in entries {
        let mut entry = entry.map_err(|e| Error::Archive(format!("corrupt entry: {e}")))?;
        let raw = entry
            .path()
            .map_err(|e| Error::Archive(format!("bad entry name: {e}")))?
            .into_owned();

        let Some(rel) = restore_entry_path(&raw) else {
            if raw != Path::new(CONTAINER_FOLDER) {
                warn!(entry = %raw.display(), "rejecting archive entry outside the destination");
                stats.rejected += 1;
            }
            continue;
        };

        if let Some(needle) = filter {
            let rel_str = rel.to_string_lossy().replace('\\', "/");
            if !rel_str.contains(needle) {
                debug!(entry = %rel_str, filter = needle, "entry not selected by prefix");
                stats.filtered += 1;
                continue;
            }
        }

        if through_symlink(dest_root, &rel) {
            warn!(entry = %rel.display(), "rejecting archive entry below a restored symlink");
            stats.rejected += 1;
            continue;
        }

        let target = dest_root.join(&rel);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        entry
            .unpack(&target)
            .map_err(|e| Error::Archive(format!("cannot extract {}: {e}", rel.display())))?;
        stats.extracted += 1;
    }

    Ok(stats)
}
