use crate::error::Result;
use chrono::Utc;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

/// Journal of transfer events, one call per archive milestone.
pub trait Logger: Send + Sync {
    fn archived(&self, _archive: &str, _files: usize, _bytes: u64) {}
    fn uploaded(&self, _key: &str, _bytes: u64) {}
    fn downloaded(&self, _key: &str, _bytes: u64) {}
    fn extracted(&self, _archive: &str, _files: u64) {}
    fn skipped(&self, _archive: &str) {}
    fn error(&self, _context: &str, _archive: &str, _msg: &str) {}
    fn done(&self, _archives: usize, _bytes: u64, _seconds: f64) {}
}

pub struct NoopLogger;
impl Logger for NoopLogger {}

pub struct TextLogger {
    file: Mutex<File>,
}

impl TextLogger {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let f = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(f),
        })
    }

    fn line(&self, s: &str) {
        let mut f = self.file.lock();
        let _ = writeln!(f, "[{}] {}", Utc::now().to_rfc3339(), s);
    }
}

impl Logger for TextLogger {
    fn archived(&self, archive: &str, files: usize, bytes: u64) {
        self.line(&format!("ARCHIVED archive={archive} files={files} bytes={bytes}"));
    }
    fn uploaded(&self, key: &str, bytes: u64) {
        self.line(&format!("UPLOADED key={key} bytes={bytes}"));
    }
    fn downloaded(&self, key: &str, bytes: u64) {
        self.line(&format!("DOWNLOADED key={key} bytes={bytes}"));
    }
    fn extracted(&self, archive: &str, files: u64) {
        self.line(&format!("EXTRACTED archive={archive} files={files}"));
    }
    fn skipped(&self, archive: &str) {
        self.line(&format!("SKIPPED archive={archive}"));
    }
    fn error(&self, context: &str, archive: &str, msg: &str) {
        self.line(&format!("ERROR ctx={context} archive={archive} msg={msg}"));
    }
    fn done(&self, archives: usize, bytes: u64, seconds: f64) {
        self.line(&format!("DONE archives={archives} bytes={bytes} seconds={seconds:.3}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_logger_appends_timestamped_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("events.log");
        {
            let log = TextLogger::new(&path).unwrap();
            log.uploaded("ds/s3split-part-1.tar", 42);
            log.skipped("s3split-part-2.tar");
        }
        TextLogger::new(&path).unwrap().done(1, 42, 0.5);

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with('['));
        assert!(lines[0].ends_with("UPLOADED key=ds/s3split-part-1.tar bytes=42"));
        assert!(lines[1].ends_with("SKIPPED archive=s3split-part-2.tar"));
        assert!(lines[2].ends_with("DONE archives=1 bytes=42 seconds=0.500"));
    }
}
