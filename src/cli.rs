//! Command-line surface

use clap::builder::BoolishValueParser;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// s3split splits big datasets in different tar archives and uploads/downloads
/// them to/from S3 remote storage
#[derive(Debug, Parser)]
#[command(name = "s3split", author, version, about)]
pub struct Args {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

/// Options common to all commands
#[derive(Clone, Debug, Default, clap::Args)]
pub struct GlobalOpts {
    /// S3 endpoint in the form http(s)://host:port, or file:///dir for a local store
    #[arg(long, env = "S3_ENDPOINT", global = true)]
    pub s3_endpoint: Option<String>,

    /// S3 access key
    #[arg(long, env = "S3_ACCESS_KEY", hide_env_values = true, global = true)]
    pub s3_access_key: Option<String>,

    /// S3 secret key
    #[arg(long, env = "S3_SECRET_KEY", hide_env_values = true, global = true)]
    pub s3_secret_key: Option<String>,

    /// S3 region used to sign requests
    #[arg(long, env = "S3_REGION", global = true)]
    pub s3_region: Option<String>,

    /// Verify the endpoint TLS certificate
    #[arg(long, env = "S3_VERIFY_CERTIFICATE", value_parser = BoolishValueParser::new(), global = true)]
    pub s3_verify_certificate: Option<bool>,

    /// Number of parallel transfer threads (0 = one per CPU)
    #[arg(short = 't', long, global = true)]
    pub threads: Option<usize>,

    /// Seconds between two stats reports
    #[arg(long, global = true)]
    pub stats_interval: Option<u64>,

    /// TOML profile with defaults for the options above
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Append transfer events to this file
    #[arg(long = "log-file", global = true)]
    pub log_file: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Split a local directory into tar archives and upload them to s3://bucket/path
    Upload {
        /// Local filesystem directory
        source: PathBuf,

        /// S3 path in the form s3://bucket/path (path is required)
        target: String,

        /// Desired size in MiB for a single split tar file
        #[arg(short = 's', long, default_value_t = 1024, value_parser = clap::value_parser!(u64).range(1..))]
        tar_size: u64,

        /// Dataset description
        #[arg(short, long)]
        description: Option<String>,
    },

    /// Download the archives of a dataset and join them in a new local directory
    Download {
        /// S3 path in the form s3://bucket/path (path is required)
        source: String,

        /// Local filesystem directory, must not exist yet
        target: PathBuf,

        /// Restrict the download to files whose path contains this text
        #[arg(short, long)]
        prefix: Option<String>,
    },

    /// Compare metadata (archive names and sizes) with the remote objects
    Check {
        /// S3 path in the form s3://bucket/path
        target: String,
    },
}
