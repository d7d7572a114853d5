use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Bad CLI input, malformed URI or endpoint, bad local path state.
    #[error("validation error: {0}")]
    Validation(String),

    /// Auth, connectivity or protocol failure talking to the object store.
    #[error("store error: {0}")]
    Store(String),

    #[error("archive error: {0}")]
    Archive(String),

    #[error("metadata error: {0}")]
    Metadata(String),

    /// The dataset on the store does not match its metadata document.
    #[error("integrity check failed: {0} problem(s) found")]
    Integrity(usize),

    #[error("config error: {0}")]
    Config(String),

    #[error("worker pool error: {0}")]
    Pool(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// Convenient crate-wide result type
pub type Result<T> = std::result::Result<T, Error>;
