use crate::cancel::{CancelCheck, CancellationToken};
use crate::error::{ChunkError, Result};
use crate::naming::ChunkNamer;
use crate::options::{ChunkerOptions, DEFAULT_BUFFER_SIZE, effective_buffer_size};
use crate::plan::ChunkSpec;
use crate::source::InputDescriptor;
use crate::util::hash_forward::HashingForward;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Outcome of writing one chunk. Immutable once produced.
#[derive(Debug)]
pub struct ChunkResult {
    pub index: u64,
    pub destination: PathBuf,
    /// Bytes the destination accepted, including on failure.
    pub bytes_written: u64,
    /// BLAKE3 digest of the chunk on success.
    pub outcome: Result<[u8; 32]>,
}

impl ChunkResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn digest(&self) -> Option<&[u8; 32]> {
        self.outcome.as_ref().ok()
    }

    pub fn digest_hex(&self) -> Option<String> {
        self.digest().map(hex::encode)
    }

    pub fn error(&self) -> Option<&ChunkError> {
        self.outcome.as_ref().err()
    }
}

/// Writes one planned range to its own artifact.
///
/// Implementations are shared by every worker of a session, so each call must
/// use its own source handle. A failed call must leave no artifact behind.
pub trait ChunkWriter: Send + Sync {
    fn write_chunk(&self, spec: &ChunkSpec, cancel: &CancellationToken) -> ChunkResult;

    /// Artifact path for chunk `index`.
    fn destination(&self, index: u64) -> PathBuf;

    /// Removes the artifact of a successful `write_chunk`.
    fn discard(&self, index: u64) -> std::io::Result<()> {
        match fs::remove_file(self.destination(index)) {
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

pub struct FsChunkWriter<N: ChunkNamer> {
    source: InputDescriptor,
    namer: N,
    buffer_size: usize,
    sync: bool,
}

impl<N: ChunkNamer> FsChunkWriter<N> {
    pub fn new(source: InputDescriptor, namer: N) -> Self {
        Self {
            source,
            namer,
            buffer_size: DEFAULT_BUFFER_SIZE,
            sync: true,
        }
    }

    pub fn with_options(mut self, opts: &ChunkerOptions) -> Self {
        self.buffer_size = opts.buffer_size;
        self.sync = opts.sync;
        self
    }

    pub fn source(&self) -> &InputDescriptor {
        &self.source
    }

    pub fn namer(&self) -> &N {
        &self.namer
    }

    fn write_to(
        &self,
        spec: &ChunkSpec,
        destination: &Path,
        cancel: &CancellationToken,
        written: &mut u64,
    ) -> Result<[u8; 32]> {
        cancel.check()?;
        let mut src = self.source.open_at(spec.offset)?;

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(destination)
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => ChunkError::DestinationExists(destination.to_path_buf()),
                _ => ChunkError::Io(e),
            })?;
        // Declared before `sink` so the file is closed before the guard removes it.
        let mut guard = PartialArtifact::new(destination);
        let mut sink = HashingForward::new(file);

        let chunk_cap = spec.length.max(1);
        let mut buf = vec![0u8; effective_buffer_size(self.buffer_size, chunk_cap)];
        let copied = copy_range(&mut src, &mut sink, spec, cancel, &mut buf);
        *written = sink.written();
        copied?;

        sink.flush()?;
        let (file, digest) = sink.finish();
        if self.sync {
            file.sync_all()?;
        }
        drop(file);
        guard.disarm();
        Ok(digest)
    }
}

impl<N: ChunkNamer> ChunkWriter for FsChunkWriter<N> {
    fn destination(&self, index: u64) -> PathBuf {
        self.namer.path_for(index)
    }

    fn write_chunk(&self, spec: &ChunkSpec, cancel: &CancellationToken) -> ChunkResult {
        let destination = self.destination(spec.index);
        let mut bytes_written = 0;
        let outcome = self.write_to(spec, &destination, cancel, &mut bytes_written);
        match &outcome {
            Ok(digest) => debug!(
                index = spec.index,
                bytes = bytes_written,
                path = %destination.display(),
                blake3 = %hex::encode(digest),
                "chunk written"
            ),
            Err(e) => debug!(index = spec.index, error = %e, "chunk write failed"),
        }
        ChunkResult {
            index: spec.index,
            destination,
            bytes_written,
            outcome,
        }
    }
}

/// Copies exactly `spec.length` bytes from `src` to `dst`, looping over short
/// reads and short writes. `cancel` is checked before every read and write.
pub fn copy_range<R: Read, W: Write>(
    src: &mut R,
    dst: &mut W,
    spec: &ChunkSpec,
    cancel: &CancellationToken,
    buf: &mut [u8],
) -> Result<u64> {
    let mut read_total = 0u64;
    let mut written_total = 0u64;

    while read_total < spec.length {
        cancel.check()?;
        let want = (spec.length - read_total).min(buf.len() as u64) as usize;
        let n = match src.read(&mut buf[..want]) {
            Ok(0) => {
                return Err(ChunkError::TruncatedSource {
                    index: spec.index,
                    expected: spec.length,
                    actual: read_total,
                });
            }
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        read_total += n as u64;

        let mut pending = &buf[..n];
        while !pending.is_empty() {
            cancel.check()?;
            match dst.write(pending) {
                Ok(0) => {
                    return Err(ChunkError::IncompleteWrite {
                        index: spec.index,
                        expected: spec.length,
                        written: written_total,
                    });
                }
                Ok(k) => {
                    pending = &pending[k..];
                    written_total += k as u64;
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    if written_total != read_total {
        return Err(ChunkError::IncompleteWrite {
            index: spec.index,
            expected: spec.length,
            written: written_total,
        });
    }
    Ok(written_total)
}

/// Deletes an artifact on drop unless disarmed.
struct PartialArtifact<'a> {
    path: &'a Path,
    armed: bool,
}

impl<'a> PartialArtifact<'a> {
    fn new(path: &'a Path) -> Self {
        Self { path, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for PartialArtifact<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Err(e) = fs::remove_file(self.path) {
            if e.kind() != ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "failed to remove partial chunk");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::naming::PaddedNamer;
    use std::io::Cursor;

    fn spec(index: u64, offset: u64, length: u64) -> ChunkSpec {
        ChunkSpec {
            index,
            offset,
            length,
        }
    }

    /// Returns at most `max` bytes per read.
    struct ShortReads<R: Read> {
        inner: R,
        max: usize,
    }

    impl<R: Read> Read for ShortReads<R> {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let n = buf.len().min(self.max);
            self.inner.read(&mut buf[..n])
        }
    }

    /// Accepts `limit` bytes, then refuses everything.
    struct Stalls {
        data: Vec<u8>,
        limit: usize,
    }

    impl Write for Stalls {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            let n = buf.len().min(self.limit - self.data.len());
            self.data.extend_from_slice(&buf[..n]);
            Ok(n)
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn copy_loops_over_short_reads() {
        let data: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
        let mut src = ShortReads {
            inner: Cursor::new(data.clone()),
            max: 7,
        };
        let mut out = Vec::new();
        let mut buf = [0u8; 1024];
        let n = copy_range(
            &mut src,
            &mut out,
            &spec(0, 0, 9_000),
            &CancellationToken::new(),
            &mut buf,
        )
        .unwrap();
        assert_eq!(n, 9_000);
        assert_eq!(out, &data[..9_000]);
    }

    #[test]
    fn copy_reports_truncated_source() {
        let mut src = Cursor::new(vec![1u8; 100]);
        let mut buf = [0u8; 64];
        let err = copy_range(
            &mut src,
            &mut Vec::new(),
            &spec(3, 0, 150),
            &CancellationToken::new(),
            &mut buf,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ChunkError::TruncatedSource {
                index: 3,
                expected: 150,
                actual: 100
            }
        ));
    }

    #[test]
    fn copy_reports_incomplete_write() {
        let mut src = Cursor::new(vec![1u8; 100]);
        let mut dst = Stalls {
            data: Vec::new(),
            limit: 40,
        };
        let mut buf = [0u8; 16];
        let err = copy_range(
            &mut src,
            &mut dst,
            &spec(1, 0, 100),
            &CancellationToken::new(),
            &mut buf,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ChunkError::IncompleteWrite {
                index: 1,
                expected: 100,
                written: 40
            }
        ));
    }

    #[test]
    fn copy_observes_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut buf = [0u8; 16];
        let err = copy_range(
            &mut Cursor::new(vec![0u8; 32]),
            &mut Vec::new(),
            &spec(0, 0, 32),
            &cancel,
            &mut buf,
        )
        .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn writes_exact_slice_and_digest() {
        let dir = tempfile::tempdir().unwrap();
        let src_path = dir.path().join("in.bin");
        let data: Vec<u8> = (0..5_000u32).map(|i| (i % 253) as u8).collect();
        fs::write(&src_path, &data).unwrap();
        let out = dir.path().join("out");
        fs::create_dir(&out).unwrap();

        let input = InputDescriptor::probe(&src_path).unwrap();
        let writer = FsChunkWriter::new(input, PaddedNamer::new(&out, "in.bin", 3));
        let r = writer.write_chunk(&spec(1, 2_000, 2_000), &CancellationToken::new());

        assert!(r.is_success(), "{:?}", r.error());
        assert_eq!(r.bytes_written, 2_000);
        assert_eq!(r.destination, out.join("in.bin.0001"));
        let written = fs::read(&r.destination).unwrap();
        assert_eq!(written, &data[2_000..4_000]);
        assert_eq!(r.digest(), Some(blake3::hash(&written).as_bytes()));
        assert_eq!(r.digest_hex(), Some(blake3::hash(&written).to_hex().to_string()));
    }

    #[test]
    fn zero_length_chunk_creates_empty_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let src_path = dir.path().join("empty");
        fs::write(&src_path, b"").unwrap();
        let input = InputDescriptor::probe(&src_path).unwrap();
        let out = dir.path().join("out");
        fs::create_dir(&out).unwrap();

        let writer = FsChunkWriter::new(input, PaddedNamer::new(&out, "empty", 1));
        let r = writer.write_chunk(&spec(0, 0, 0), &CancellationToken::new());
        assert!(r.is_success());
        assert_eq!(fs::metadata(&r.destination).unwrap().len(), 0);
    }

    #[test]
    fn truncated_source_leaves_no_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let src_path = dir.path().join("shrunk");
        fs::write(&src_path, vec![9u8; 1_000]).unwrap();
        // descriptor claims more bytes than the file holds
        let input = InputDescriptor::new(&src_path, 4_000);
        let out = dir.path().join("out");
        fs::create_dir(&out).unwrap();

        let writer = FsChunkWriter::new(input, PaddedNamer::new(&out, "shrunk", 2));
        let r = writer.write_chunk(&spec(0, 0, 2_000), &CancellationToken::new());

        assert!(matches!(r.error(), Some(ChunkError::TruncatedSource { .. })));
        assert!(!r.destination.exists());
    }

    #[test]
    fn existing_artifact_is_rejected_and_kept() {
        let dir = tempfile::tempdir().unwrap();
        let src_path = dir.path().join("in");
        fs::write(&src_path, vec![1u8; 10]).unwrap();
        let input = InputDescriptor::probe(&src_path).unwrap();
        let out = dir.path().join("out");
        fs::create_dir(&out).unwrap();
        let namer = PaddedNamer::new(&out, "in", 1);
        fs::write(namer.path_for(0), b"keep me").unwrap();

        let writer = FsChunkWriter::new(input, namer);
        let r = writer.write_chunk(&spec(0, 0, 10), &CancellationToken::new());

        assert!(matches!(r.error(), Some(ChunkError::DestinationExists(_))));
        assert_eq!(fs::read(&r.destination).unwrap(), b"keep me");
    }

    #[test]
    fn cancelled_before_start_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let src_path = dir.path().join("in");
        fs::write(&src_path, vec![1u8; 10]).unwrap();
        let input = InputDescriptor::probe(&src_path).unwrap();
        let namer = PaddedNamer::new(dir.path(), "in", 1);
        let dest = namer.path_for(0);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let r = FsChunkWriter::new(input, namer).write_chunk(&spec(0, 0, 10), &cancel);
        assert!(r.error().is_some_and(ChunkError::is_cancelled));
        assert!(!dest.exists());
    }

    #[test]
    fn discard_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let src_path = dir.path().join("in");
        fs::write(&src_path, vec![1u8; 10]).unwrap();
        let input = InputDescriptor::probe(&src_path).unwrap();
        let out = dir.path().join("out");
        fs::create_dir(&out).unwrap();

        let writer = FsChunkWriter::new(input, PaddedNamer::new(&out, "in", 1));
        let r = writer.write_chunk(&spec(0, 0, 10), &CancellationToken::new());
        assert_eq!(writer.destination(0), r.destination);
        writer.discard(r.index).unwrap();
        assert!(!r.destination.exists());
        writer.discard(r.index).unwrap();
    }
}
