//! Reconcile a metadata document with what the store actually holds

use crate::model::{archive_name, Metadata};
use crate::split::distinct_directories;
use crate::store::ObjectInfo;
use crate::uri::StoreUri;
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// One integrity problem found by [`check`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Problem {
    /// `splits[index]` is null: the document was partially overwritten.
    CorruptSplit { index: usize },
    NotFound { key: String },
    SizeMismatch {
        key: String,
        expected: Option<u64>,
        actual: u64,
    },
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Problem::CorruptSplit { index } => write!(
                f,
                "metadata file is corrupted: split #{index} is missing from the split array"
            ),
            Problem::NotFound { key } => {
                write!(f, "split part {key} not found on S3: incomplete upload detected")
            }
            Problem::SizeMismatch { key, expected: Some(expected), actual } => write!(
                f,
                "size mismatch for split part {key}: expected {expected} bytes, S3 object has {actual}"
            ),
            Problem::SizeMismatch { key, expected: None, actual } => write!(
                f,
                "size mismatch for split part {key}: no archive recorded in metadata, S3 object has {actual} bytes"
            ),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckReport {
    pub problems: Vec<Problem>,
    /// Sorted distinct directories represented in the dataset.
    pub directories: BTreeSet<String>,
}

impl CheckReport {
    pub fn passed(&self) -> bool {
        self.problems.is_empty()
    }

    /// Operator-facing list of the dataset directories.
    pub fn directory_listing(&self) -> String {
        let mut out = String::from("----------\n");
        for dir in &self.directories {
            out.push_str("    - ");
            out.push_str(dir);
            out.push('\n');
        }
        out.push_str("----------");
        out
    }
}

/// Compare `metadata` against `listing`, keeping only objects under `uri`'s prefix.
pub fn check(metadata: &Metadata, listing: &[ObjectInfo], uri: &StoreUri) -> CheckReport {
    let expected = metadata.archive_sizes();
    let prefix = uri.list_prefix();
    let actual: HashMap<&str, u64> = listing
        .iter()
        .filter(|o| o.key.starts_with(&prefix))
        .map(|o| (o.key.as_str(), o.size))
        .collect();

    let mut problems = Vec::new();
    for (index, split) in metadata.splits.iter().enumerate() {
        let Some(split) = split else {
            problems.push(Problem::CorruptSplit { index });
            continue;
        };
        let name = archive_name(split.id);
        let key = uri.key(&name);
        match actual.get(key.as_str()) {
            None => problems.push(Problem::NotFound { key }),
            Some(&size) => {
                let want = expected.get(name.as_str()).copied();
                if want != Some(size) {
                    problems.push(Problem::SizeMismatch { key, expected: want, actual: size });
                }
            }
        }
    }

    CheckReport {
        problems,
        directories: distinct_directories(metadata.present_splits()),
    }
}
