//! Bucket-scoped object store used for archives and the metadata document

pub mod local;
pub mod s3;

use crate::config::{Backend, StoreConfig};
use crate::error::Result;
use std::io::{self, Read, Write};
use std::path::Path;

pub use local::LocalStore;
pub use s3::S3Store;

/// A listed object: full key and size in bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub key: String,
    pub size: u64,
}

/// Called with the number of bytes moved since the previous call.
pub type Progress<'a> = &'a (dyn Fn(u64) + Sync);

pub trait ObjectStore: Send + Sync {
    fn bucket_exists(&self) -> Result<bool>;

    /// Create the bucket when it does not exist yet.
    fn ensure_bucket(&self) -> Result<()>;

    fn put(&self, key: &str, data: &[u8]) -> Result<()>;

    /// `None` when the object does not exist.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Every object whose key starts with `prefix`.
    fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>>;

    /// Stream a local file to `key`. Returns the bytes sent.
    fn upload_file(&self, key: &str, path: &Path, progress: Progress<'_>) -> Result<u64>;

    /// Stream `key` into `out`. Returns the bytes received.
    fn download_file(&self, key: &str, out: &mut dyn Write, progress: Progress<'_>) -> Result<u64>;
}

/// Open the store for `bucket` described by `config`.
pub fn open_store(config: &StoreConfig, bucket: &str) -> Result<Box<dyn ObjectStore>> {
    match &config.backend {
        Backend::Local { root } => Ok(Box::new(LocalStore::new(root, bucket)?)),
        Backend::S3 { .. } => Ok(Box::new(S3Store::new(config, bucket)?)),
    }
}

/// Reader that reports every read to a progress callback
pub struct ProgressReader<'a, R> {
    inner: R,
    progress: Progress<'a>,
}

impl<'a, R: Read> ProgressReader<'a, R> {
    pub fn new(inner: R, progress: Progress<'a>) -> Self {
        Self { inner, progress }
    }
}

impl<R: Read> Read for ProgressReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n > 0 {
            (self.progress)(n as u64);
        }
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[test]
    fn progress_reader_reports_every_byte() {
        let seen = AtomicU64::new(0);
        let report = |n: u64| {
            seen.fetch_add(n, Ordering::SeqCst);
        };
        let data = vec![1u8; 100_000];
        let mut reader = ProgressReader::new(&data[..], &report);
        let mut sink = Vec::new();
        io::copy(&mut reader, &mut sink).unwrap();
        assert_eq!(sink.len(), data.len());
        assert_eq!(seen.load(Ordering::SeqCst), 100_000);
    }
}
