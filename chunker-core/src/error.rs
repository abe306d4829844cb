use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChunkError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("source unavailable: {}: {source}", .path.display())]
    SourceUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("destination directory unavailable: {}", .0.display())]
    DestinationUnavailable(PathBuf),

    #[error("destination already exists: {}", .0.display())]
    DestinationExists(PathBuf),

    #[error("chunk {index}: source truncated, expected {expected} bytes but read {actual}")]
    TruncatedSource { index: u64, expected: u64, actual: u64 },

    #[error("chunk {index}: incomplete write, {written} of {expected} bytes accepted")]
    IncompleteWrite {
        index: u64,
        expected: u64,
        written: u64,
    },

    #[error("cancelled")]
    Cancelled,

    #[error("worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ChunkError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ChunkError::Cancelled)
    }
}

// Convenient crate-wide result type
pub type Result<T> = std::result::Result<T, ChunkError>;
