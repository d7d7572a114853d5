//! Run settings: command line and environment over a TOML profile over defaults

use crate::cli::GlobalOpts;
use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_THREADS: usize = 5;
pub const DEFAULT_STATS_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_MULTIPART_THRESHOLD_MB: u64 = 64;
pub const DEFAULT_MULTIPART_CHUNK_MB: u64 = 64;
/// S3 rejects multipart parts below 5 MiB (except the last).
const MIN_MULTIPART_CHUNK_MB: u64 = 5;

const MIB: u64 = 1024 * 1024;

pub fn config_dir() -> PathBuf {
    #[cfg(windows)]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata).join("s3split");
        }
    }
    // Unix-like default
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".config").join("s3split");
    }
    PathBuf::from(".s3split")
}

pub fn default_config_path() -> PathBuf {
    config_dir().join("s3split.toml")
}

/// Contents of the optional TOML profile
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub s3_endpoint: Option<String>,
    pub s3_access_key: Option<String>,
    pub s3_secret_key: Option<String>,
    pub s3_region: Option<String>,
    pub s3_verify_certificate: Option<bool>,
    pub threads: Option<usize>,
    pub stats_interval: Option<u64>,
    pub multipart_threshold_mb: Option<u64>,
    pub multipart_chunk_mb: Option<u64>,
}

impl FileConfig {
    pub fn parse(data: &str) -> Result<Self> {
        toml::from_str(data).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::parse(&data).map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    /// Load an explicit profile, or the default one when it exists.
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::load(path),
            None => {
                let path = default_config_path();
                if path.is_file() {
                    Self::load(&path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }
}

/// Which object store the endpoint points at
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Backend {
    S3 {
        endpoint: url::Url,
        access_key: String,
        secret_key: String,
        region: String,
        verify_certificate: bool,
    },
    /// Buckets are sub-directories of `root`.
    Local { root: PathBuf },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreConfig {
    pub backend: Backend,
    pub multipart_threshold: u64,
    pub multipart_chunk_size: u64,
}

impl StoreConfig {
    /// Store config for a local directory with default transfer knobs.
    pub fn local(root: impl Into<PathBuf>) -> Self {
        Self {
            backend: Backend::Local { root: root.into() },
            multipart_threshold: DEFAULT_MULTIPART_THRESHOLD_MB * MIB,
            multipart_chunk_size: DEFAULT_MULTIPART_CHUNK_MB * MIB,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    pub store: StoreConfig,
    pub threads: usize,
    pub stats_interval: Duration,
}

impl Settings {
    pub fn resolve(opts: &GlobalOpts, file: &FileConfig) -> Result<Self> {
        let endpoint = opts
            .s3_endpoint
            .clone()
            .or_else(|| file.s3_endpoint.clone())
            .ok_or_else(|| required("s3-endpoint"))?;

        let parsed = url::Url::parse(&endpoint)
            .map_err(|_| Error::Validation(format!("S3 validation - Invalid endpoint: {endpoint}")))?;
        let backend = match parsed.scheme() {
            "http" | "https" => Backend::S3 {
                endpoint: parsed,
                access_key: opts
                    .s3_access_key
                    .clone()
                    .or_else(|| file.s3_access_key.clone())
                    .ok_or_else(|| required("s3-access-key"))?,
                secret_key: opts
                    .s3_secret_key
                    .clone()
                    .or_else(|| file.s3_secret_key.clone())
                    .ok_or_else(|| required("s3-secret-key"))?,
                region: opts
                    .s3_region
                    .clone()
                    .or_else(|| file.s3_region.clone())
                    .unwrap_or_else(|| DEFAULT_REGION.to_string()),
                verify_certificate: opts
                    .s3_verify_certificate
                    .or(file.s3_verify_certificate)
                    .unwrap_or(true),
            },
            "file" => Backend::Local {
                root: parsed.to_file_path().map_err(|_| {
                    Error::Validation(format!("S3 validation - Invalid endpoint: {endpoint}"))
                })?,
            },
            _ => {
                return Err(Error::Validation(format!(
                    "S3 validation - Invalid endpoint: {endpoint}"
                )))
            }
        };

        let threshold_mb = file
            .multipart_threshold_mb
            .unwrap_or(DEFAULT_MULTIPART_THRESHOLD_MB);
        let chunk_mb = file.multipart_chunk_mb.unwrap_or(DEFAULT_MULTIPART_CHUNK_MB);
        if threshold_mb == 0 {
            return Err(Error::Config("multipart_threshold_mb must be at least 1".into()));
        }
        if chunk_mb < MIN_MULTIPART_CHUNK_MB {
            return Err(Error::Config(format!(
                "multipart_chunk_mb must be at least {MIN_MULTIPART_CHUNK_MB}"
            )));
        }

        let threads = match opts.threads.or(file.threads).unwrap_or(DEFAULT_THREADS) {
            0 => num_cpus::get(),
            n => n,
        };
        let stats_interval = opts
            .stats_interval
            .or(file.stats_interval)
            .unwrap_or(DEFAULT_STATS_INTERVAL_SECS);

        Ok(Self {
            store: StoreConfig {
                backend,
                multipart_threshold: threshold_mb * MIB,
                multipart_chunk_size: chunk_mb * MIB,
            },
            threads,
            stats_interval: Duration::from_secs(stats_interval),
        })
    }
}

fn required(flag: &str) -> Error {
    let env = flag.replace('-', "_").to_ascii_uppercase();
    Error::Validation(format!("param --{flag} or env variable {env} is required"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(endpoint: &str) -> GlobalOpts {
        GlobalOpts {
            s3_endpoint: Some(endpoint.to_string()),
            s3_access_key: Some("ak".into()),
            s3_secret_key: Some("sk".into()),
            ..GlobalOpts::default()
        }
    }

    #[test]
    fn http_endpoint_selects_s3_with_defaults() {
        let settings = Settings::resolve(&opts("http://127.0.0.1:9000"), &FileConfig::default()).unwrap();
        assert_eq!(settings.threads, DEFAULT_THREADS);
        assert_eq!(settings.stats_interval, Duration::from_secs(30));
        match settings.store.backend {
            Backend::S3 { region, verify_certificate, access_key, .. } => {
                assert_eq!(region, "us-east-1");
                assert!(verify_certificate);
                assert_eq!(access_key, "ak");
            }
            other => panic!("unexpected backend {other:?}"),
        }
        assert_eq!(settings.store.multipart_threshold, 64 * MIB);
    }

    #[test]
    fn command_line_wins_over_profile() {
        let file = FileConfig::parse(
            r#"
            s3_endpoint = "http://profile:9000"
            s3_access_key = "profile-ak"
            s3_secret_key = "profile-sk"
            threads = 9
            stats_interval = 5
            s3_verify_certificate = false
            "#,
        )
        .unwrap();
        let mut cli = GlobalOpts::default();
        cli.threads = Some(3);
        let settings = Settings::resolve(&cli, &file).unwrap();
        assert_eq!(settings.threads, 3);
        assert_eq!(settings.stats_interval, Duration::from_secs(5));
        match settings.store.backend {
            Backend::S3 { endpoint, access_key, verify_certificate, .. } => {
                assert_eq!(endpoint.host_str(), Some("profile"));
                assert_eq!(access_key, "profile-ak");
                assert!(!verify_certificate);
            }
            other => panic!("unexpected backend {other:?}"),
        }
    }

    #[test]
    fn file_endpoint_selects_local_store_without_keys() {
        let cli = GlobalOpts {
            s3_endpoint: Some("file:///tmp/store".into()),
            ..GlobalOpts::default()
        };
        let settings = Settings::resolve(&cli, &FileConfig::default()).unwrap();
        assert_eq!(
            settings.store.backend,
            Backend::Local { root: PathBuf::from("/tmp/store") }
        );
    }

    #[test]
    fn invalid_endpoint_is_a_validation_error() {
        let err = Settings::resolve(&opts("C"), &FileConfig::default()).unwrap_err();
        assert_eq!(err.to_string(), "validation error: S3 validation - Invalid endpoint: C");
    }

    #[test]
    fn missing_credentials_are_reported_by_flag_and_env() {
        let cli = GlobalOpts {
            s3_endpoint: Some("https://s3.example.com".into()),
            s3_access_key: Some("ak".into()),
            ..GlobalOpts::default()
        };
        let err = Settings::resolve(&cli, &FileConfig::default()).unwrap_err();
        assert!(err.to_string().contains("--s3-secret-key or env variable S3_SECRET_KEY"));
    }

    #[test]
    fn zero_threads_means_one_per_cpu() {
        let mut cli = opts("http://h:1");
        cli.threads = Some(0);
        let settings = Settings::resolve(&cli, &FileConfig::default()).unwrap();
        assert_eq!(settings.threads, num_cpus::get());
    }

    #[test]
    fn unknown_profile_keys_are_rejected() {
        assert!(matches!(FileConfig::parse("thread = 3"), Err(Error::Config(_))));
    }

    #[test]
    fn tiny_multipart_chunks_are_rejected() {
        let file = FileConfig { multipart_chunk_mb: Some(1), ..FileConfig::default() };
        assert!(matches!(
            Settings::resolve(&opts("http://h:1"), &file),
            Err(Error::Config(_))
        ));
    }
}
