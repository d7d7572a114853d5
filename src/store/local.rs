use std::fs::{self, File};
use std::io::{self, BufReader, Write};
use std::path::{Component, Path, PathBuf};

use tempfile::NamedTempFile;
use walkdir::WalkDir;

use super::{ObjectInfo, ObjectStore, Progress, ProgressReader};
use crate::error::{Error, Result};

/// Temp files live next to their target until renamed into place.
const TEMP_PREFIX: &str = ".s3split-tmp";

/// Object store backed by a local directory: `<root>/<bucket>/<key>`.
pub struct LocalStore {
    bucket_dir: PathBuf,
}

impl LocalStore {
    pub fn new(root: &Path, bucket: &str) -> Result<Self> {
        Self::validate_key(bucket)?;
        if bucket.contains('/') {
            return Err(Error::Validation(format!("invalid bucket name '{bucket}'")));
        }
        Ok(Self { bucket_dir: root.join(bucket) })
    }

    /// Reject keys that could escape the bucket directory.
    fn validate_key(key: &str) -> Result<()> {
        if key.is_empty() {
            return Err(Error::Store("unsafe key: empty".into()));
        }
        if key.starts_with('/') || key.contains('\\') {
            return Err(Error::Store(format!("unsafe key '{key}'")));
        }
        if Path::new(key)
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(Error::Store(format!("unsafe key '{key}'")));
        }
        Ok(())
    }

    fn resolve(&self, key: &str) -> Result<PathBuf> {
        Self::validate_key(key)?;
        Ok(self.bucket_dir.join(key))
    }

    /// Fill a temp file beside `path` with `write`, then rename it into place.
    fn atomic_write(
        &self,
        path: &Path,
        write: impl FnOnce(&mut File) -> io::Result<u64>,
    ) -> Result<u64> {
        let dir = path.parent().unwrap_or(&self.bucket_dir);
        fs::create_dir_all(dir)?;
        let mut tmp = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .tempfile_in(dir)?;
        let n = write(tmp.as_file_mut())?;
        tmp.as_file_mut().flush()?;
        persist(tmp, path)?;
        Ok(n)
    }
}

fn persist(tmp: NamedTempFile, path: &Path) -> Result<()> {
    tmp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

impl ObjectStore for LocalStore {
    fn bucket_exists(&self) -> Result<bool> {
        Ok(self.bucket_dir.is_dir())
    }

    fn ensure_bucket(&self) -> Result<()> {
        fs::create_dir_all(&self.bucket_dir)?;
        Ok(())
    }

    fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        let path = self.resolve(key)?;
        self.atomic_write(&path, |f| {
            f.write_all(data)?;
            Ok(data.len() as u64)
        })?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.resolve(key)?;
        match fs::read(&path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>> {
        if !self.bucket_dir.is_dir() {
            return Err(Error::Store(format!(
                "bucket directory {} does not exist",
                self.bucket_dir.display()
            )));
        }
        let mut objects = Vec::new();
        for entry in WalkDir::new(&self.bucket_dir).sort_by_file_name() {
            let entry = entry.map_err(|e| Error::Store(format!("list failed: {e}")))?;
            if !entry.file_type().is_file()
                || entry.file_name().to_string_lossy().starts_with(TEMP_PREFIX)
            {
                continue;
            }
            let rel = entry.path().strip_prefix(&self.bucket_dir).unwrap_or(entry.path());
            let key = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if key.starts_with(prefix) {
                let size = entry
                    .metadata()
                    .map_err(|e| Error::Store(format!("list failed: {e}")))?
                    .len();
                objects.push(ObjectInfo { key, size });
            }
        }
        Ok(objects)
    }

    fn upload_file(&self, key: &str, path: &Path, progress: Progress<'_>) -> Result<u64> {
        let target = self.resolve(key)?;
        let source = File::open(path)?;
        self.atomic_write(&target, |out| {
            let mut reader = ProgressReader::new(BufReader::new(source), progress);
            io::copy(&mut reader, out)
        })
    }

    fn download_file(&self, key: &str, out: &mut dyn Write, progress: Progress<'_>) -> Result<u64> {
        let path = self.resolve(key)?;
        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(Error::Store(format!("object {key} not found")));
            }
            Err(e) => return Err(e.into()),
        };
        let mut reader = ProgressReader::new(BufReader::new(file), progress);
        Ok(io::copy(&mut reader, out)?)
    }
}
