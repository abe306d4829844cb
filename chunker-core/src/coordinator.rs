use crate::cancel::CancellationToken;
use crate::error::{ChunkError, Result};
use crate::plan::{ChunkPlan, ChunkSpec};
use crate::progress::ProgressReporter;
use crate::write::{ChunkResult, ChunkWriter};
use crossbeam_channel::Sender;
use rayon::ThreadPoolBuilder;
use serde::{Serialize, Serializer};
use std::fmt::Display;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CoordinatorState {
    Idle,
    Running,
    Draining,
    Succeeded,
    Failed,
    Cancelled,
}

impl CoordinatorState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

/// Terminal result of a session.
///
/// Serializes as a map tagged by `status`, with the failure cause rendered
/// through its `Display` under `error`.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SessionOutcome {
    Succeeded {
        chunks_total: u64,
        bytes_total: u64,
    },
    Failed {
        #[serde(rename = "error", serialize_with = "display")]
        cause: ChunkError,
        partial_chunks_completed: u64,
    },
    Cancelled {
        partial_chunks_completed: u64,
    },
}

impl SessionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }

    pub fn state(&self) -> CoordinatorState {
        match self {
            Self::Succeeded { .. } => CoordinatorState::Succeeded,
            Self::Failed { .. } => CoordinatorState::Failed,
            Self::Cancelled { .. } => CoordinatorState::Cancelled,
        }
    }

    pub fn chunks_completed(&self) -> u64 {
        match self {
            Self::Succeeded { chunks_total, .. } => *chunks_total,
            Self::Failed {
                partial_chunks_completed,
                ..
            }
            | Self::Cancelled {
                partial_chunks_completed,
            } => *partial_chunks_completed,
        }
    }
}

fn display<T: Display, S: Serializer>(value: &T, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

/// Runs a plan on a dedicated pool of `max_concurrency` workers.
///
/// Workers pull specs in plan order from a shared cursor, so at most
/// `max_concurrency` writes (and copy buffers) are live at once. Results flow
/// back over a bounded channel to the calling thread, which is the only one
/// touching the reporter. The first failure, or an external cancel, switches
/// to draining: no new spec is taken, in-flight writers see the drain token at
/// their next I/O boundary, and once everything has settled every artifact of
/// the session is discarded. A cancel that arrives after the last chunk has
/// succeeded is ignored: nothing is left to drain.
#[derive(Debug)]
pub struct Coordinator {
    max_concurrency: usize,
    state: CoordinatorState,
}

impl Coordinator {
    pub fn new(max_concurrency: usize) -> Result<Self> {
        if max_concurrency == 0 {
            return Err(ChunkError::InvalidConfiguration(
                "max concurrency must be at least 1".into(),
            ));
        }
        Ok(Self {
            max_concurrency,
            state: CoordinatorState::Idle,
        })
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    pub fn state(&self) -> CoordinatorState {
        self.state
    }

    pub fn run<W>(
        &mut self,
        plan: &ChunkPlan,
        writer: &W,
        cancel: &CancellationToken,
        reporter: &mut ProgressReporter<'_>,
    ) -> Result<SessionOutcome>
    where
        W: ChunkWriter + ?Sized,
    {
        if self.state != CoordinatorState::Idle {
            return Err(ChunkError::InvalidConfiguration(
                "coordinator has already run".into(),
            ));
        }

        let specs = plan.chunks();
        let workers = self.max_concurrency.min(specs.len()).max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("chunker-write-{i}"))
            .build()?;

        let drain = cancel.child_token();
        let cursor = AtomicUsize::new(0);
        let (tx, rx) = crossbeam_channel::bounded::<ChunkResult>(workers);
        let mut produced: Vec<u64> = Vec::with_capacity(specs.len());
        let mut first_cause: Option<ChunkError> = None;

        self.transition(CoordinatorState::Running);
        info!(chunks = specs.len(), workers, "dispatching chunks");

        pool.in_place_scope(|scope| {
            for _ in 0..workers {
                let tx = tx.clone();
                let drain = &drain;
                let cursor = &cursor;
                scope.spawn(move |_| worker_loop(specs, writer, cursor, drain, &tx));
            }
            drop(tx);

            // Ends once every worker has exited and dropped its sender.
            for result in rx.iter() {
                match result.outcome {
                    Ok(_) => {
                        produced.push(result.index);
                        if first_cause.is_none() {
                            reporter.record(&result);
                        }
                    }
                    // Abandoned by a drain; the cause is recorded from the failing chunk or the caller token.
                    Err(ChunkError::Cancelled) => {
                        debug!(index = result.index, "chunk abandoned while draining");
                    }
                    Err(e) => {
                        if first_cause.is_none() {
                            warn!(index = result.index, error = %e, "chunk failed, draining");
                            drain.cancel();
                            first_cause = Some(e);
                            self.transition(CoordinatorState::Draining);
                        } else {
                            debug!(index = result.index, error = %e, "chunk settled while draining");
                        }
                    }
                }
                if first_cause.is_none()
                    && produced.len() < specs.len()
                    && cancel.is_cancelled()
                {
                    info!("cancellation requested, draining");
                    drain.cancel();
                    first_cause = Some(ChunkError::Cancelled);
                    self.transition(CoordinatorState::Draining);
                }
            }
        });

        let partial = reporter.snapshot().chunks_completed;
        let outcome = match first_cause {
            Some(ChunkError::Cancelled) => SessionOutcome::Cancelled {
                partial_chunks_completed: partial,
            },
            Some(cause) => SessionOutcome::Failed {
                cause,
                partial_chunks_completed: partial,
            },
            // workers only stop early when the drain token fired
            None if produced.len() < specs.len() => SessionOutcome::Cancelled {
                partial_chunks_completed: partial,
            },
            None => SessionOutcome::Succeeded {
                chunks_total: specs.len() as u64,
                bytes_total: plan.total_size(),
            },
        };

        if !outcome.is_success() {
            if self.state == CoordinatorState::Running {
                self.transition(CoordinatorState::Draining);
            }
            discard_all(writer, &produced);
        }
        self.transition(outcome.state());
        info!(state = ?self.state, completed = outcome.chunks_completed(), "session settled");
        Ok(outcome)
    }

    fn transition(&mut self, next: CoordinatorState) {
        debug!(from = ?self.state, to = ?next, "coordinator state");
        self.state = next;
    }
}

fn worker_loop<W>(
    specs: &[ChunkSpec],
    writer: &W,
    cursor: &AtomicUsize,
    drain: &CancellationToken,
    tx: &Sender<ChunkResult>,
) where
    W: ChunkWriter + ?Sized,
{
    loop {
        if drain.is_cancelled() {
            return;
        }
        let Some(spec) = specs.get(cursor.fetch_add(1, Ordering::SeqCst)) else {
            return;
        };
        let result = writer.write_chunk(spec, drain);
        if !result.is_success() {
            // stop the other workers without waiting for the coordinator
            drain.cancel();
        }
        if tx.send(result).is_err() {
            return;
        }
    }
}

fn discard_all<W>(writer: &W, produced: &[u64])
where
    W: ChunkWriter + ?Sized,
{
    let mut removed = 0usize;
    for &index in produced {
        match writer.discard(index) {
            Ok(()) => removed += 1,
            Err(e) => warn!(
                index,
                path = %writer.destination(index).display(),
                error = %e,
                "failed to remove chunk during cleanup"
            ),
        }
    }
    info!(removed, "discarded session artifacts");
}
