//! s3split library
//!
//! Splits a directory tree into size-bounded tar archives, moves them to and
//! from an S3-compatible store in parallel and checks the remote dataset
//! against its metadata document.

pub mod archive;
pub mod cancel;
pub mod check;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod logger;
pub mod metadata;
pub mod model;
pub mod split;
pub mod stats;
pub mod store;
pub mod tls;
pub mod transfer;
pub mod uri;

pub use error::{Error, Result};
