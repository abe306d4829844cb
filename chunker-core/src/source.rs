use crate::error::{ChunkError, Result};
use std::fs::{self, File};
use std::io::{Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// The file being split, with its size fixed at probe time.
#[derive(Clone, Debug)]
pub struct InputDescriptor {
    path: PathBuf,
    total_size: u64,
}

impl InputDescriptor {
    /// Stats `path`; fails with `SourceUnavailable` when it is missing or not a regular file.
    pub fn probe(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let md = match fs::metadata(&path) {
            Ok(md) => md,
            Err(source) => return Err(ChunkError::SourceUnavailable { path, source }),
        };
        if !md.is_file() {
            return Err(ChunkError::SourceUnavailable {
                path,
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "not a regular file",
                ),
            });
        }
        Ok(Self {
            path,
            total_size: md.len(),
        })
    }

    pub fn new(path: impl Into<PathBuf>, total_size: u64) -> Self {
        Self {
            path: path.into(),
            total_size,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Final path component, used as the stem of artifact names.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "chunk".to_string())
    }

    /// Opens a fresh handle positioned at `offset`. Every caller gets its own cursor.
    pub fn open_at(&self, offset: u64) -> Result<File> {
        let mut f = File::open(&self.path).map_err(|source| ChunkError::SourceUnavailable {
            path: self.path.clone(),
            source,
        })?;
        f.seek(SeekFrom::Start(offset))?;
        Ok(f)
    }
}
