use crate::plan::ChunkPlan;
use crate::source::InputDescriptor;
use std::path::{Path, PathBuf};

/// Smallest zero-pad width for chunk indices.
pub const MIN_INDEX_WIDTH: usize = 4;

/// Maps a chunk index to the path of its artifact. Must be injective.
pub trait ChunkNamer: Send + Sync {
    fn path_for(&self, index: u64) -> PathBuf;
}

impl<F> ChunkNamer for F
where
    F: Fn(u64) -> PathBuf + Send + Sync,
{
    fn path_for(&self, index: u64) -> PathBuf {
        self(index)
    }
}

/// `<dir>/<stem>.<index>` with the index zero-padded to a width that covers
/// the whole plan, so a lexicographic sort restores plan order.
#[derive(Clone, Debug)]
pub struct PaddedNamer {
    dir: PathBuf,
    stem: String,
    width: usize,
}

impl PaddedNamer {
    pub fn new(dir: impl Into<PathBuf>, stem: impl Into<String>, chunks_total: u64) -> Self {
        Self {
            dir: dir.into(),
            stem: stem.into(),
            width: digits(chunks_total.saturating_sub(1)).max(MIN_INDEX_WIDTH),
        }
    }

    pub fn for_source(dir: &Path, input: &InputDescriptor, plan: &ChunkPlan) -> Self {
        Self::new(dir, input.file_name(), plan.len() as u64)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn width(&self) -> usize {
        self.width
    }
}

impl ChunkNamer for PaddedNamer {
    fn path_for(&self, index: u64) -> PathBuf {
        self.dir
            .join(format!("{}.{:0width$}", self.stem, index, width = self.width))
    }
}

fn digits(n: u64) -> usize {
    n.checked_ilog10().map_or(1, |d| d as usize + 1)
}
