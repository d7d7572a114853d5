//! Records persisted in the dataset metadata document

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Object name of the metadata document, relative to the dataset prefix.
pub const METADATA_FILE: &str = "s3split-metadata.json";

/// Top-level folder every archive entry is rooted under.
pub const CONTAINER_FOLDER: &str = "s3split";

/// Archive object name for a split id.
pub fn archive_name(id: u32) -> String {
    format!("s3split-part-{id}.tar")
}

/// A bounded-size group of source files, archived as one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Split {
    pub id: u32,
    /// `/`-separated paths relative to the source root, in walk order.
    pub paths: Vec<String>,
    /// Sum of the sizes of `paths`.
    pub size: u64,
}

impl Split {
    pub fn archive_name(&self) -> String {
        archive_name(self.id)
    }
}

/// An archive produced by a successful upload task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveDescriptor {
    pub name: String,
    pub id: u32,
    pub size: u64,
}

/// The dataset bookkeeping document.
///
/// `tars` is `None` until an upload finishes (the pre-transfer snapshot) and
/// `Some` afterwards, even when no archive succeeded. A `None` element in
/// `splits` only appears in a damaged document and is reported by the checker;
/// a `None` element in `tars` stands for an archive that was never uploaded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub splits: Vec<Option<Split>>,
    #[serde(default)]
    pub tars: Option<Vec<Option<ArchiveDescriptor>>>,
}

impl Metadata {
    /// Pre-transfer snapshot: the record of intent.
    pub fn pending(description: Option<String>, splits: &[Split]) -> Self {
        Self {
            description,
            splits: splits.iter().cloned().map(Some).collect(),
            tars: None,
        }
    }

    /// Post-transfer snapshot: the record of result.
    pub fn completed(
        description: Option<String>,
        splits: &[Split],
        mut tars: Vec<ArchiveDescriptor>,
    ) -> Self {
        tars.sort_by_key(|t| t.id);
        Self {
            tars: Some(tars.into_iter().map(Some).collect()),
            ..Self::pending(description, splits)
        }
    }

    /// Splits that are actually present in the document.
    pub fn present_splits(&self) -> impl Iterator<Item = &Split> {
        self.splits.iter().flatten()
    }

    pub fn owned_splits(&self) -> Vec<Split> {
        self.present_splits().cloned().collect()
    }

    /// Archives actually recorded in the document.
    pub fn present_archives(&self) -> impl Iterator<Item = &ArchiveDescriptor> {
        self.tars.iter().flatten().flatten()
    }

    /// Archive name -> recorded size. Empty while `tars` is absent.
    pub fn archive_sizes(&self) -> HashMap<&str, u64> {
        self.present_archives()
            .map(|t| (t.name.as_str(), t.size))
            .collect()
    }

    pub fn archive_by_id(&self, id: u32) -> Option<&ArchiveDescriptor> {
        self.present_archives().find(|t| t.id == id)
    }

    /// Sum of the declared sizes of all present splits.
    pub fn total_size(&self) -> u64 {
        self.present_splits().map(|s| s.size).sum()
    }

    pub fn to_json(&self) -> crate::Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn from_json(data: &[u8]) -> crate::Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split(id: u32, paths: &[&str], size: u64) -> Split {
        Split {
            id,
            paths: paths.iter().map(|p| p.to_string()).collect(),
            size,
        }
    }

    #[test]
    fn pending_document_serializes_null_tars() {
        let meta = Metadata::pending(None, &[split(1, &["a.txt"], 3)]);
        let value: serde_json::Value = serde_json::from_slice(&meta.to_json().unwrap()).unwrap();
        assert!(value["tars"].is_null());
        assert!(value["description"].is_null());
        assert_eq!(value["splits"][0]["id"], 1);
        assert_eq!(value["splits"][0]["paths"][0], "a.txt");
    }

    #[test]
    fn completed_document_keeps_empty_tars_distinct_from_absent() {
        let meta = Metadata::completed(Some("d".into()), &[split(1, &["a"], 1)], Vec::new());
        let back = Metadata::from_json(&meta.to_json().unwrap()).unwrap();
        assert_eq!(back.tars, Some(Vec::new()));
        assert_eq!(back.description.as_deref(), Some("d"));
    }

    #[test]
    fn null_split_elements_are_preserved() {
        let doc = br#"{"description": null, "splits": [{"id": 1, "paths": ["x"], "size": 1}, null], "tars": null}"#;
        let meta = Metadata::from_json(doc).unwrap();
        assert_eq!(meta.splits.len(), 2);
        assert!(meta.splits[1].is_none());
        assert_eq!(meta.present_splits().count(), 1);
    }

    #[test]
    fn missing_optional_keys_default() {
        let meta = Metadata::from_json(br#"{"splits": []}"#).unwrap();
        assert_eq!(meta, Metadata::default());
    }

    #[test]
    fn completed_sorts_tars_by_id() {
        let tars = vec![
            ArchiveDescriptor { name: archive_name(2), id: 2, size: 10 },
            ArchiveDescriptor { name: archive_name(1), id: 1, size: 20 },
        ];
        let meta = Metadata::completed(None, &[], tars);
        let ids: Vec<u32> = meta.present_archives().map(|t| t.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn null_archive_elements_are_readable() {
        let doc = br#"{
            "splits": [{"id": 1, "paths": ["x"], "size": 1}, {"id": 2, "paths": ["y"], "size": 1}],
            "tars": [null, {"name": "s3split-part-2.tar", "id": 2, "size": 2048}]
        }"#;
        let meta = Metadata::from_json(doc).unwrap();
        assert_eq!(meta.tars.as_ref().map(Vec::len), Some(2));
        assert_eq!(meta.archive_by_id(1), None);
        assert_eq!(meta.archive_by_id(2).map(|t| t.size), Some(2048));
        assert_eq!(meta.archive_sizes().len(), 1);
    }

    #[test]
    fn archive_names_follow_split_id() {
        assert_eq!(archive_name(7), "s3split-part-7.tar");
        assert_eq!(split(3, &[], 0).archive_name(), "s3split-part-3.tar");
    }
}
