use crate::plan::ChunkPlan;
use crate::write::ChunkResult;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::warn;

/// Raw counters only; formatting is left to the caller.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub chunks_completed: u64,
    pub bytes_completed: u64,
    pub chunks_total: u64,
    pub bytes_total: u64,
}

impl ProgressSnapshot {
    pub fn is_complete(&self) -> bool {
        self.chunks_completed == self.chunks_total
    }
}

pub type SinkError = Box<dyn std::error::Error + Send + Sync>;

/// Receives one snapshot per completed chunk, in completion order.
pub trait ProgressSink {
    fn on_progress(
        &mut self,
        snapshot: &ProgressSnapshot,
        completed: &ChunkResult,
    ) -> Result<(), SinkError>;
}

/// Discards every snapshot.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn on_progress(&mut self, _: &ProgressSnapshot, _: &ChunkResult) -> Result<(), SinkError> {
        Ok(())
    }
}

impl ProgressSink for Vec<ProgressSnapshot> {
    fn on_progress(&mut self, snapshot: &ProgressSnapshot, _: &ChunkResult) -> Result<(), SinkError> {
        self.push(*snapshot);
        Ok(())
    }
}

/// Aggregates completed chunks for a single session.
///
/// Only the coordinator thread records results, so snapshots are totally
/// ordered. The counters sit behind a lock so `ProgressHandle`s on other
/// threads always read a matching pair of chunk and byte counts.
pub struct ProgressReporter<'s> {
    state: Arc<Mutex<ProgressSnapshot>>,
    sink: &'s mut dyn ProgressSink,
}

impl<'s> ProgressReporter<'s> {
    pub fn new(plan: &ChunkPlan, sink: &'s mut dyn ProgressSink) -> Self {
        Self::with_totals(plan.len() as u64, plan.total_size(), sink)
    }

    pub fn with_totals(chunks_total: u64, bytes_total: u64, sink: &'s mut dyn ProgressSink) -> Self {
        Self {
            state: Arc::new(Mutex::new(ProgressSnapshot {
                chunks_total,
                bytes_total,
                ..Default::default()
            })),
            sink,
        }
    }

    /// Counts a successful chunk and forwards the new snapshot to the sink.
    /// Failed results are ignored. Sink errors are logged, never returned.
    pub fn record(&mut self, result: &ChunkResult) -> ProgressSnapshot {
        if !result.is_success() {
            return self.snapshot();
        }
        let snapshot = {
            let mut s = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            s.chunks_completed += 1;
            s.bytes_completed += result.bytes_written;
            *s
        };
        if let Err(e) = self.sink.on_progress(&snapshot, result) {
            warn!(index = result.index, error = %e, "progress sink rejected snapshot");
        }
        snapshot
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn handle(&self) -> ProgressHandle {
        ProgressHandle {
            state: Arc::clone(&self.state),
        }
    }
}

/// Read-only live view of a reporter, usable from any thread.
#[derive(Clone, Debug)]
pub struct ProgressHandle {
    state: Arc<Mutex<ProgressSnapshot>>,
}

impl ProgressHandle {
    pub fn snapshot(&self) -> ProgressSnapshot {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
