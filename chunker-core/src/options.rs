use crate::error::{ChunkError, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CHUNK_SIZE: u64 = 8192;
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkerOptions {
    /// Target size of every chunk except possibly the last one.
    pub chunk_size: u64,
    /// Upper bound on concurrently running chunk writes.
    pub max_concurrency: usize,
    /// Per-worker copy buffer. Clamped to `chunk_size` when larger.
    pub buffer_size: usize,
    /// fsync each artifact before it is closed.
    pub sync: bool,
}

impl Default for ChunkerOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_concurrency: default_concurrency(),
            buffer_size: DEFAULT_BUFFER_SIZE,
            sync: true,
        }
    }
}

impl ChunkerOptions {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(ChunkError::InvalidConfiguration(
                "chunk size must be greater than zero".into(),
            ));
        }
        if self.max_concurrency == 0 {
            return Err(ChunkError::InvalidConfiguration(
                "max concurrency must be at least 1".into(),
            ));
        }
        if self.buffer_size == 0 {
            return Err(ChunkError::InvalidConfiguration(
                "buffer size must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Copy buffer actually allocated per worker.
    pub fn effective_buffer_size(&self) -> usize {
        effective_buffer_size(self.buffer_size, self.chunk_size)
    }
}

pub(crate) fn effective_buffer_size(buffer_size: usize, chunk_size: u64) -> usize {
    let cap = usize::try_from(chunk_size).unwrap_or(usize::MAX);
    buffer_size.min(cap).max(1)
}

pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
