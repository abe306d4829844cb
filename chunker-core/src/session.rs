use crate::cancel::CancellationToken;
use crate::coordinator::{Coordinator, CoordinatorState, SessionOutcome};
use crate::error::{ChunkError, Result};
use crate::naming::PaddedNamer;
use crate::options::ChunkerOptions;
use crate::plan::{ChunkPlan, plan};
use crate::progress::{ProgressHandle, ProgressReporter, ProgressSink};
use crate::source::InputDescriptor;
use crate::write::{ChunkWriter, FsChunkWriter};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Clone, Debug)]
pub struct SplitRequest {
    pub source: PathBuf,
    pub destination_dir: PathBuf,
    pub options: ChunkerOptions,
    pub cancel: CancellationToken,
}

impl SplitRequest {
    pub fn new(source: impl Into<PathBuf>, destination_dir: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination_dir: destination_dir.into(),
            options: ChunkerOptions::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_options(mut self, options: ChunkerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// One accepted split request: the probed input, its plan and the
/// coordinator that will run it. Consumed by `run`.
#[derive(Debug)]
pub struct ChunkingSession {
    input: InputDescriptor,
    plan: ChunkPlan,
    destination_dir: PathBuf,
    options: ChunkerOptions,
    cancel: CancellationToken,
    coordinator: Coordinator,
}

impl ChunkingSession {
    /// Validates the request, probes the source and plans it. No artifact is
    /// created here.
    pub fn open(request: SplitRequest) -> Result<Self> {
        request.options.validate()?;
        let input = InputDescriptor::probe(&request.source)?;
        if !request.destination_dir.is_dir() {
            return Err(ChunkError::DestinationUnavailable(request.destination_dir));
        }
        let plan = plan(input.total_size(), request.options.chunk_size)?;
        let coordinator = Coordinator::new(request.options.max_concurrency)?;

        info!(
            source = %input.path().display(),
            bytes = input.total_size(),
            chunks = plan.len(),
            chunk_size = plan.chunk_size(),
            "session opened"
        );
        Ok(Self {
            input,
            plan,
            destination_dir: request.destination_dir,
            options: request.options,
            cancel: request.cancel,
            coordinator,
        })
    }

    pub fn input(&self) -> &InputDescriptor {
        &self.input
    }

    pub fn plan(&self) -> &ChunkPlan {
        &self.plan
    }

    pub fn options(&self) -> &ChunkerOptions {
        &self.options
    }

    pub fn destination_dir(&self) -> &Path {
        &self.destination_dir
    }

    pub fn state(&self) -> CoordinatorState {
        self.coordinator.state()
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn namer(&self) -> PaddedNamer {
        PaddedNamer::for_source(&self.destination_dir, &self.input, &self.plan)
    }

    /// The filesystem writer `run` uses.
    pub fn fs_writer(&self) -> FsChunkWriter<PaddedNamer> {
        FsChunkWriter::new(self.input.clone(), self.namer()).with_options(&self.options)
    }

    pub fn run(self, sink: &mut dyn ProgressSink) -> Result<SessionOutcome> {
        let writer = self.fs_writer();
        self.run_with(&writer, sink)
    }

    /// Like `run`, with `on_start` receiving a live progress handle first.
    pub fn run_observed(
        self,
        sink: &mut dyn ProgressSink,
        on_start: impl FnOnce(ProgressHandle),
    ) -> Result<SessionOutcome> {
        let writer = self.fs_writer();
        self.execute(&writer, sink, on_start)
    }

    /// Runs the plan through a caller-supplied writer.
    pub fn run_with<W>(self, writer: &W, sink: &mut dyn ProgressSink) -> Result<SessionOutcome>
    where
        W: ChunkWriter + ?Sized,
    {
        self.execute(writer, sink, |_| {})
    }

    fn execute<W>(
        mut self,
        writer: &W,
        sink: &mut dyn ProgressSink,
        on_start: impl FnOnce(ProgressHandle),
    ) -> Result<SessionOutcome>
    where
        W: ChunkWriter + ?Sized,
    {
        let mut reporter = ProgressReporter::new(&self.plan, sink);
        on_start(reporter.handle());
        let outcome = self
            .coordinator
            .run(&self.plan, writer, &self.cancel, &mut reporter)?;
        match &outcome {
            SessionOutcome::Succeeded {
                chunks_total,
                bytes_total,
            } => info!(chunks = chunks_total, bytes = bytes_total, "split complete"),
            SessionOutcome::Failed {
                cause,
                partial_chunks_completed,
            } => info!(error = %cause, completed = partial_chunks_completed, "split failed"),
            SessionOutcome::Cancelled {
                partial_chunks_completed,
            } => info!(completed = partial_chunks_completed, "split cancelled"),
        }
        Ok(outcome)
    }
}

/// Opens and runs a session in one call.
pub fn split(request: SplitRequest, sink: &mut dyn ProgressSink) -> Result<SessionOutcome> {
    ChunkingSession::open(request)?.run(sink)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::naming::ChunkNamer;
    use crate::progress::NoProgress;
    use std::fs;

    #[test]
    fn open_validates_before_touching_disk() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("in");
        fs::write(&src, b"abc").unwrap();

        let bad = SplitRequest::new(&src, dir.path()).with_options(ChunkerOptions {
            chunk_size: 0,
            ..Default::default()
        });
        assert!(matches!(
            ChunkingSession::open(bad),
            Err(ChunkError::InvalidConfiguration(_))
        ));

        let missing_dest = SplitRequest::new(&src, dir.path().join("nope"));
        assert!(matches!(
            ChunkingSession::open(missing_dest),
            Err(ChunkError::DestinationUnavailable(_))
        ));

        let missing_src = SplitRequest::new(dir.path().join("gone"), dir.path());
        assert!(matches!(
            ChunkingSession::open(missing_src),
            Err(ChunkError::SourceUnavailable { .. })
        ));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn session_exposes_plan_and_names() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("movie.mkv");
        fs::write(&src, vec![0u8; 10_000]).unwrap();
        let out = dir.path().join("out");
        fs::create_dir(&out).unwrap();

        let session = ChunkingSession::open(SplitRequest::new(&src, &out).with_options(
            ChunkerOptions {
                chunk_size: 4096,
                ..Default::default()
            },
        ))
        .unwrap();
        assert_eq!(session.plan().len(), 3);
        assert_eq!(session.state(), CoordinatorState::Idle);
        assert_eq!(session.namer().path_for(2), out.join("movie.mkv.0002"));

        let outcome = session.run(&mut NoProgress).unwrap();
        assert!(outcome.is_success());
        assert!(out.join("movie.mkv.0002").exists());
    }

    #[test]
    fn observed_run_hands_out_live_handle() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("obs");
        fs::write(&src, vec![3u8; 2_500]).unwrap();
        let out = dir.path().join("out");
        fs::create_dir(&out).unwrap();

        let session = ChunkingSession::open(SplitRequest::new(&src, &out).with_options(
            ChunkerOptions {
                chunk_size: 1_000,
                max_concurrency: 2,
                ..Default::default()
            },
        ))
        .unwrap();
        let mut handle = None;
        let outcome = session
            .run_observed(&mut NoProgress, |h| handle = Some(h))
            .unwrap();

        assert!(outcome.is_success());
        let snap = handle.unwrap().snapshot();
        assert_eq!(snap.chunks_completed, 3);
        assert_eq!(snap.bytes_completed, 2_500);
    }
}
