//! Deterministic partitioning of a directory tree into size-bounded splits

use crate::error::{Error, Result};
use crate::model::Split;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{info, warn};
use walkdir::WalkDir;

/// Regular file or symlink found under the source root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// `/`-separated path relative to the walk root
    pub path: String,
    /// Length of the link itself for symlinks, never of its target.
    pub size: u64,
}

/// Enumerate regular files and symlinks under `root`, sorted by name at every level.
///
/// Symlinks are not followed.
pub fn enumerate_files(root: &Path) -> Result<Vec<FileEntry>> {
    let mut entries = Vec::new();

    for entry in WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
    {
        let entry = entry.map_err(|e| {
            Error::Validation(format!("cannot walk {}: {e}", root.display()))
        })?;

        let file_type = entry.file_type();
        if file_type.is_dir() {
            continue;
        }
        if !file_type.is_file() && !file_type.is_symlink() {
            warn!(path = %entry.path().display(), "skipping special file");
            continue;
        }

        let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
        let Some(rel) = relative_key(rel) else {
            warn!(path = %entry.path().display(), "skipping file with a non UTF-8 name");
            continue;
        };
        let size = entry
            .metadata()
            .map_err(|e| Error::Validation(format!("cannot stat {}: {e}", entry.path().display())))?
            .len();
        entries.push(FileEntry { path: rel, size });
    }

    Ok(entries)
}

/// Join path components with `/` so split paths read the same on every platform.
fn relative_key(rel: &Path) -> Option<String> {
    let mut parts = Vec::new();
    for component in rel.components() {
        parts.push(component.as_os_str().to_str()?);
    }
    Some(parts.join("/"))
}

/// Greedy next-fit packing of `files`, in order, into bins of at most `max_bin_size` bytes.
///
/// A file bigger than `max_bin_size` gets a split of its own.
pub fn pack_files(files: Vec<FileEntry>, max_bin_size: u64) -> Result<Vec<Split>> {
    if max_bin_size == 0 {
        return Err(Error::Validation("split size must be greater than zero".into()));
    }

    let mut splits = Vec::new();
    let mut paths: Vec<String> = Vec::new();
    let mut bin_size = 0u64;

    for file in files {
        if !paths.is_empty() && bin_size + file.size > max_bin_size {
            let id = splits.len() as u32 + 1;
            splits.push(Split { id, paths: std::mem::take(&mut paths), size: bin_size });
            bin_size = 0;
        }
        if file.size > max_bin_size {
            warn!(
                path = %file.path,
                size = file.size,
                max = max_bin_size,
                "file is bigger than the split size, it gets an oversized split of its own"
            );
        }
        bin_size += file.size;
        paths.push(file.path);
    }

    if !paths.is_empty() {
        let id = splits.len() as u32 + 1;
        splits.push(Split { id, paths, size: bin_size });
    }

    Ok(splits)
}

/// Walk `root` and partition its files into splits of at most `max_bin_size` bytes.
pub fn split_by_size(root: &Path, max_bin_size: u64) -> Result<Vec<Split>> {
    let files = enumerate_files(root)?;
    let total: u64 = files.iter().map(|f| f.size).sum();
    info!(
        root = %root.display(),
        files = files.len(),
        bytes = total,
        "source tree enumerated"
    );
    pack_files(files, max_bin_size)
}

/// Ids of the splits holding at least one path that contains `needle`.
///
/// Both sides are trimmed of `/` and compared as plain substrings, not as
/// path prefixes: `dir_1` also selects `dir_10/a` and `x/dir_1.txt`.
/// `None` selects every split.
pub fn find_by_path_substring(splits: &[Split], needle: Option<&str>) -> BTreeSet<u32> {
    match needle {
        None => splits.iter().map(|s| s.id).collect(),
        Some(needle) => {
            let needle = needle.trim_matches('/');
            splits
                .iter()
                .filter(|s| s.paths.iter().any(|p| p.trim_matches('/').contains(needle)))
                .map(|s| s.id)
                .collect()
        }
    }
}

/// Parent directories of every path in `splits`; root-level files add nothing.
pub fn distinct_directories<'a>(splits: impl IntoIterator<Item = &'a Split>) -> BTreeSet<String> {
    splits
        .into_iter()
        .flat_map(|s| s.paths.iter())
        .filter_map(|p| p.rsplit_once('/').map(|(dir, _)| dir))
        .filter(|dir| !dir.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::fs;

    fn entry(path: &str, size: u64) -> FileEntry {
        FileEntry { path: path.to_string(), size }
    }

    fn write_sized(root: &Path, rel: &str, size: usize) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, vec![7u8; size]).unwrap();
    }

    #[test]
    fn packs_greedily_in_order() {
        let files = vec![entry("a", 4), entry("b", 4), entry("c", 3), entry("d", 9)];
        let splits = pack_files(files, 10).unwrap();
        assert_eq!(splits.len(), 3);
        assert_eq!(splits[0].paths, vec!["a", "b"]);
        assert_eq!(splits[0].size, 8);
        assert_eq!(splits[1].paths, vec!["c"]);
        assert_eq!(splits[2].paths, vec!["d"]);
        let ids: Vec<u32> = splits.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn oversized_file_gets_its_own_split() {
        let files = vec![entry("small", 2), entry("huge", 50), entry("tail", 1)];
        let splits = pack_files(files, 10).unwrap();
        assert_eq!(splits.len(), 3);
        assert_eq!(splits[1].paths, vec!["huge"]);
        assert_eq!(splits[1].size, 50);
        assert_eq!(splits[2].paths, vec!["tail"]);
    }

    #[test]
    fn exact_fit_stays_in_bin() {
        let splits = pack_files(vec![entry("a", 5), entry("b", 5)], 10).unwrap();
        assert_eq!(splits.len(), 1);
        assert_eq!(splits[0].size, 10);
    }

    #[test]
    fn zero_bin_size_is_rejected() {
        assert!(matches!(pack_files(vec![entry("a", 1)], 0), Err(Error::Validation(_))));
    }

    #[test]
    fn empty_input_yields_no_splits() {
        assert!(pack_files(Vec::new(), 10).unwrap().is_empty());
    }

    #[test]
    fn split_invariants_hold_on_a_real_tree() {
        let tmp = tempfile::tempdir().unwrap();
        let sizes = [300usize, 1200, 50, 999, 0, 4000, 10, 700, 700, 1];
        let mut expected = HashSet::new();
        for (i, size) in sizes.iter().enumerate() {
            let rel = format!("d{}/sub{}/f{i}.bin", i % 3, i % 2);
            write_sized(tmp.path(), &rel, *size);
            expected.insert(rel);
        }

        let max = 1000;
        let splits = split_by_size(tmp.path(), max).unwrap();

        let mut seen = HashSet::new();
        for (i, split) in splits.iter().enumerate() {
            assert_eq!(split.id as usize, i + 1);
            let sum: u64 = split
                .paths
                .iter()
                .map(|p| fs::metadata(tmp.path().join(p)).unwrap().len())
                .sum();
            assert_eq!(sum, split.size);
            if split.paths.len() > 1 {
                assert!(split.size <= max);
            } else if split.size > max {
                assert_eq!(split.paths.len(), 1);
            }
            for p in &split.paths {
                assert!(seen.insert(p.clone()), "duplicate path {p}");
            }
        }
        assert_eq!(seen, expected);
    }

    #[test]
    fn walk_order_is_sorted_and_reproducible() {
        let tmp = tempfile::tempdir().unwrap();
        for rel in ["b/2.txt", "a/9.txt", "a/10.txt", "c.txt", "a/1.txt"] {
            write_sized(tmp.path(), rel, 1);
        }
        let first = enumerate_files(tmp.path()).unwrap();
        let paths: Vec<&str> = first.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["a/1.txt", "a/10.txt", "a/9.txt", "b/2.txt", "c.txt"]);
        assert_eq!(first, enumerate_files(tmp.path()).unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_listed_without_following_them() {
        let tmp = tempfile::tempdir().unwrap();
        write_sized(tmp.path(), "d/real.txt", 5000);
        std::os::unix::fs::symlink("real.txt", tmp.path().join("d/link.txt")).unwrap();
        std::os::unix::fs::symlink("../d", tmp.path().join("e")).unwrap();

        let files = enumerate_files(tmp.path()).unwrap();
        let paths: Vec<&str> = files.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["d/link.txt", "d/real.txt", "e"]);
        let link = &files[0];
        assert_eq!(link.size, fs::symlink_metadata(tmp.path().join("d/link.txt")).unwrap().len());
        assert!(link.size < 5000);
    }

    #[test]
    fn ten_one_mib_files_make_two_splits_of_five() {
        let tmp = tempfile::tempdir().unwrap();
        for i in 0..10 {
            write_sized(tmp.path(), &format!("file_{i}.txt"), 1024 * 1024);
        }
        let splits = split_by_size(tmp.path(), 5 * 1024 * 1024).unwrap();
        assert_eq!(splits.len(), 2);
        assert!(splits.iter().all(|s| s.paths.len() == 5));
    }

    #[test]
    fn substring_search_is_loose() {
        let splits = pack_files(
            vec![
                entry("dir_1/a.txt", 5),
                entry("dir_10/b.txt", 5),
                entry("other/dir_1.txt", 5),
                entry("zzz/c.txt", 5),
            ],
            5,
        )
        .unwrap();
        let all = find_by_path_substring(&splits, None);
        assert_eq!(all, BTreeSet::from([1, 2, 3, 4]));
        let hit = find_by_path_substring(&splits, Some("/dir_1/"));
        assert_eq!(hit, BTreeSet::from([1, 2, 3]));
        assert!(find_by_path_substring(&splits, Some("missing")).is_empty());
    }

    #[test]
    fn directories_exclude_root_level_files() {
        let splits = pack_files(
            vec![entry("top.txt", 1), entry("a/b/c.txt", 1), entry("a/d.txt", 1), entry("a/b/e.txt", 1)],
            100,
        )
        .unwrap();
        let dirs: Vec<String> = distinct_directories(&splits).into_iter().collect();
        assert_eq!(dirs, vec!["a".to_string(), "a/b".to_string()]);
    }
}
