#![forbid(unsafe_code)]

pub mod cancel;
pub mod coordinator;
pub mod error;
pub mod naming;
pub mod options;
pub mod plan;
pub mod progress;
pub mod session;
pub mod source;
pub mod write;

pub mod util {
    pub mod hash_forward;
}

// Re-exports: stable API surface
pub use cancel::{CancelCheck, CancellationToken};
pub use coordinator::{Coordinator, CoordinatorState, SessionOutcome};
pub use error::{ChunkError, Result};
pub use naming::{ChunkNamer, PaddedNamer};
pub use options::ChunkerOptions;
pub use plan::{ChunkPlan, ChunkSpec, plan};
pub use progress::{NoProgress, ProgressHandle, ProgressReporter, ProgressSink, ProgressSnapshot};
pub use session::{ChunkingSession, SplitRequest, split};
pub use source::InputDescriptor;
pub use write::{ChunkResult, ChunkWriter, FsChunkWriter};
