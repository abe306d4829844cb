use crate::error::{ChunkError, Result};
use serde::{Deserialize, Serialize};

/// One byte range of the input, written to its own artifact.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkSpec {
    pub index: u64,
    pub offset: u64,
    pub length: u64,
}

impl ChunkSpec {
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }
}

/// Ordered, gap-free cover of `[0, total_size)`.
///
/// Indices are dense from zero and match positions in `chunks()`. A plan for
/// an empty input holds exactly one zero-length chunk so that empty files
/// still produce one artifact. Deserializing re-plans from the stored sizes
/// and rejects a chunk table that does not match.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PlanRepr")]
pub struct ChunkPlan {
    total_size: u64,
    chunk_size: u64,
    chunks: Vec<ChunkSpec>,
}

#[derive(Deserialize)]
struct PlanRepr {
    total_size: u64,
    chunk_size: u64,
    chunks: Vec<ChunkSpec>,
}

impl TryFrom<PlanRepr> for ChunkPlan {
    type Error = ChunkError;

    fn try_from(repr: PlanRepr) -> Result<Self> {
        let planned = plan(repr.total_size, repr.chunk_size)?;
        if planned.chunks != repr.chunks {
            return Err(ChunkError::InvalidConfiguration(format!(
                "chunk table does not match a {}-byte plan of {}-byte chunks",
                repr.total_size, repr.chunk_size
            )));
        }
        Ok(planned)
    }
}

impl ChunkPlan {
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn chunks(&self) -> &[ChunkSpec] {
        &self.chunks
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Always false: even an empty input plans one chunk.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn get(&self, index: u64) -> Option<&ChunkSpec> {
        usize::try_from(index).ok().and_then(|i| self.chunks.get(i))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ChunkSpec> {
        self.chunks.iter()
    }
}

impl<'a> IntoIterator for &'a ChunkPlan {
    type Item = &'a ChunkSpec;
    type IntoIter = std::slice::Iter<'a, ChunkSpec>;

    fn into_iter(self) -> Self::IntoIter {
        self.chunks.iter()
    }
}

pub fn plan(total_size: u64, chunk_size: u64) -> Result<ChunkPlan> {
    if chunk_size == 0 {
        return Err(ChunkError::InvalidConfiguration(
            "chunk size must be greater than zero".into(),
        ));
    }

    let chunks = if total_size == 0 {
        vec![ChunkSpec {
            index: 0,
            offset: 0,
            length: 0,
        }]
    } else {
        let count = total_size.div_ceil(chunk_size);
        (0..count)
            .map(|index| {
                // index < count, so offset < total_size and cannot overflow
                let offset = index * chunk_size;
                ChunkSpec {
                    index,
                    offset,
                    length: chunk_size.min(total_size - offset),
                }
            })
            .collect()
    };

    Ok(ChunkPlan {
        total_size,
        chunk_size,
        chunks,
    })
}
