//! s3split - split big datasets into tar archives and move them to/from S3

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use s3split::cancel::CancelFlag;
use s3split::cli::{Args, Command};
use s3split::commands::{self, Runtime};
use s3split::config::{FileConfig, Settings};
use s3split::logger::{Logger, NoopLogger, TextLogger};

fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.global.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    // First signal stops new work, a second one exits immediately (128 + SIGINT)
    let cancel = CancelFlag::new();
    let handler_flag = cancel.clone();
    ctrlc::set_handler(move || {
        if handler_flag.is_cancelled() {
            eprintln!("\nInterrupted again. Exiting...");
            std::process::exit(130);
        }
        handler_flag.cancel();
        warn!("interrupted: no new transfers will start, running ones will finish");
    })
    .context("Error setting Ctrl-C handler")?;

    let file_config = FileConfig::discover(args.global.config.as_deref())?;
    let settings = Settings::resolve(&args.global, &file_config)?;

    // Choose logger once; NoopLogger when no journal is requested
    let logger: Arc<dyn Logger> = match args.global.log_file {
        Some(ref p) => Arc::new(
            TextLogger::new(p).with_context(|| format!("cannot open log file {}", p.display()))?,
        ),
        None => Arc::new(NoopLogger),
    };

    let rt = Runtime {
        settings: &settings,
        cancel: &cancel,
        logger: logger.as_ref(),
        work_dir: None,
    };

    match args.command {
        Command::Upload {
            source,
            target,
            tar_size,
            description,
        } => {
            let report = commands::upload(&rt, &source, &target, tar_size, description)?;
            if !report.is_complete() {
                warn!("upload incomplete, run `s3split check {target}` and upload again");
            }
        }
        Command::Download {
            source,
            target,
            prefix,
        } => {
            let report = commands::download(&rt, &source, &target, prefix.as_deref())?;
            if !report.is_complete() {
                warn!("download incomplete: some archives were not restored");
            }
        }
        Command::Check { target } => {
            let report = commands::check(&rt, &target)?;
            if !report.passed() {
                bail!("S3 check not passed");
            }
        }
    }

    if cancel.is_cancelled() {
        info!("stopped after interrupt");
    }
    Ok(())
}
