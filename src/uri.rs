//! URI parsing for s3:// dataset locations

use crate::error::{Error, Result};
use crate::model::METADATA_FILE;
use std::fmt;

/// Dataset location: a bucket plus the prefix all of its objects live under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreUri {
    pub bucket: String,
    pub prefix: String,
}

impl StoreUri {
    /// Parse `s3://bucket/path`; both parts are required.
    pub fn parse(s: &str) -> Result<Self> {
        let s_trim = s.trim();
        let lower = s_trim.to_ascii_lowercase();
        if !lower.starts_with("s3:") {
            return Err(Error::Validation(format!("{s}: not a S3 URI")));
        }
        let rest = s_trim[3..].trim_start_matches('/');
        let (bucket, prefix) = rest.split_once('/').unwrap_or((rest, ""));
        let prefix = prefix.trim_matches('/');
        if bucket.is_empty() || prefix.is_empty() {
            return Err(Error::Validation(
                "S3 URI must contain bucket and path s3://bucket/path".into(),
            ));
        }
        Ok(Self {
            bucket: bucket.to_string(),
            prefix: prefix.to_string(),
        })
    }

    /// Full object key for `name` inside the dataset.
    pub fn key(&self, name: &str) -> String {
        format!("{}/{}", self.prefix, name)
    }

    pub fn metadata_key(&self) -> String {
        self.key(METADATA_FILE)
    }

    /// Listing prefix that matches only this dataset's objects.
    pub fn list_prefix(&self) -> String {
        format!("{}/", self.prefix)
    }
}

impl fmt::Display for StoreUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bucket_and_path() {
        let uri = StoreUri::parse("s3://aaa/bbb").unwrap();
        assert_eq!(uri.bucket, "aaa");
        assert_eq!(uri.prefix, "bbb");
    }

    #[test]
    fn keeps_long_paths() {
        let uri = StoreUri::parse("S3://aaa/bbb/ccc/ddd/").unwrap();
        assert_eq!(uri.bucket, "aaa");
        assert_eq!(uri.prefix, "bbb/ccc/ddd");
        assert_eq!(uri.key("x.tar"), "bbb/ccc/ddd/x.tar");
        assert_eq!(uri.metadata_key(), "bbb/ccc/ddd/s3split-metadata.json");
        assert_eq!(uri.to_string(), "s3://aaa/bbb/ccc/ddd");
    }

    #[test]
    fn path_is_required() {
        for bad in ["s3://aaa", "s3://aaa/", "s3://ddd//"] {
            let err = StoreUri::parse(bad).unwrap_err();
            assert!(err.to_string().contains("must contain bucket and path"), "{bad}");
        }
    }

    #[test]
    fn other_schemes_are_rejected() {
        let err = StoreUri::parse("http://aaa/bbb").unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(err.to_string().contains("not a S3 URI"));
    }
}
