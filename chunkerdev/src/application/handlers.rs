use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};

use chunker_core::error::Result;
use chunker_core::naming::{ChunkNamer, PaddedNamer};
use chunker_core::options::ChunkerOptions;
use chunker_core::{
    CancellationToken, ChunkingSession, InputDescriptor, SessionOutcome, SplitRequest, plan,
};
use indicatif::HumanCount;
use tracing::warn;

use crate::presentation::cli::ProgressMode;
use crate::presentation::progress::{ProgressDisplay, format_total};

/// Exit status for an interrupted split, as shells report SIGINT.
const EXIT_CANCELLED: u8 = 130;

pub async fn handle_split(
    file: PathBuf,
    dest: PathBuf,
    options: ChunkerOptions,
    mode: ProgressMode,
    json: bool,
) -> Result<ExitCode> {
    let cancel = CancellationToken::new();
    let request = SplitRequest::new(&file, &dest)
        .with_options(options)
        .with_cancel(cancel.clone());
    let session = ChunkingSession::open(request)?;
    let mut display = ProgressDisplay::new(progress_mode(mode, json), session.plan());

    let started = Instant::now();
    let mut task = tokio::task::spawn_blocking(move || {
        let outcome = session.run(&mut display);
        (outcome, display)
    });
    let joined = tokio::select! {
        res = &mut task => res,
        Ok(()) = tokio::signal::ctrl_c() => {
            warn!("interrupt received, cancelling split");
            cancel.cancel();
            task.await
        }
    };
    let (outcome, display) = joined.map_err(std::io::Error::other)?;
    display.finish();
    let outcome = outcome?;
    let elapsed = started.elapsed();

    if json {
        println!("{}", outcome_json(&file, &outcome, elapsed)?);
    } else {
        print_outcome(&file, &outcome, elapsed);
    }
    Ok(ExitCode::from(exit_status(&outcome)))
}

pub fn handle_plan(file: PathBuf, chunk_size: u64, json: bool) -> Result<ExitCode> {
    let input = InputDescriptor::probe(&file)?;
    let p = plan(input.total_size(), chunk_size)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&p).map_err(std::io::Error::other)?);
        return Ok(ExitCode::SUCCESS);
    }
    let namer = PaddedNamer::new("", input.file_name(), p.len() as u64);
    for c in &p {
        println!(
            "#{:<6} off={:<12} len={:<10} {}",
            c.index,
            c.offset,
            c.length,
            namer.path_for(c.index).display()
        );
    }
    println!(
        "{} chunks, {}",
        HumanCount(p.len() as u64),
        format_total(p.total_size())
    );
    Ok(ExitCode::SUCCESS)
}

fn print_outcome(file: &Path, outcome: &SessionOutcome, elapsed: Duration) {
    match outcome {
        SessionOutcome::Succeeded {
            chunks_total,
            bytes_total,
        } => {
            println!(
                "split: {} -> {} chunks, {}",
                file.display(),
                HumanCount(*chunks_total),
                format_total(*bytes_total)
            );
        }
        SessionOutcome::Failed {
            cause,
            partial_chunks_completed,
        } => {
            eprintln!(
                "split: failed after {partial_chunks_completed} chunks: {cause} (partial output removed)"
            );
        }
        SessionOutcome::Cancelled {
            partial_chunks_completed,
        } => {
            eprintln!(
                "split: cancelled after {partial_chunks_completed} chunks (partial output removed)"
            );
        }
    }
    println!("Elapsed: {} µs", HumanCount(elapsed.as_micros() as u64));
}

/// Progress lines share stdout with the JSON document, so `--json` silences them.
fn progress_mode(requested: ProgressMode, json: bool) -> ProgressMode {
    if json { ProgressMode::Quiet } else { requested }
}

fn outcome_json(
    file: &Path,
    outcome: &SessionOutcome,
    elapsed: Duration,
) -> Result<serde_json::Value> {
    let mut value = serde_json::to_value(outcome).map_err(std::io::Error::other)?;
    if let Some(map) = value.as_object_mut() {
        map.insert("source".into(), file.display().to_string().into());
        map.insert("elapsed_us".into(), (elapsed.as_micros() as u64).into());
    }
    Ok(value)
}

fn exit_status(outcome: &SessionOutcome) -> u8 {
    match outcome {
        SessionOutcome::Succeeded { .. } => 0,
        SessionOutcome::Failed { .. } => 1,
        SessionOutcome::Cancelled { .. } => EXIT_CANCELLED,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chunker_core::ChunkError;

    #[test]
    fn json_carries_status_and_counts() {
        let ok = SessionOutcome::Succeeded {
            chunks_total: 3,
            bytes_total: 10_000,
        };
        let v = outcome_json(Path::new("a.bin"), &ok, Duration::from_micros(1500)).unwrap();
        assert_eq!(v["status"], "succeeded");
        assert_eq!(v["source"], "a.bin");
        assert_eq!(v["chunks_total"], 3);
        assert_eq!(v["elapsed_us"], 1500);

        let failed = SessionOutcome::Failed {
            cause: ChunkError::TruncatedSource {
                index: 2,
                expected: 10,
                actual: 4,
            },
            partial_chunks_completed: 1,
        };
        let v = outcome_json(Path::new("a.bin"), &failed, Duration::ZERO).unwrap();
        assert_eq!(v["status"], "failed");
        assert_eq!(v["partial_chunks_completed"], 1);
        assert!(v["error"].as_str().unwrap().contains("truncated"));
    }

    #[test]
    fn json_output_silences_progress() {
        for mode in [ProgressMode::Lines, ProgressMode::Bar, ProgressMode::Quiet] {
            assert_eq!(progress_mode(mode, true), ProgressMode::Quiet);
            assert_eq!(progress_mode(mode, false), mode);
        }
    }

    #[test]
    fn exit_codes() {
        let cancelled = SessionOutcome::Cancelled {
            partial_chunks_completed: 0,
        };
        assert_eq!(exit_status(&cancelled), 130);
        assert_eq!(
            exit_status(&SessionOutcome::Succeeded {
                chunks_total: 1,
                bytes_total: 0
            }),
            0
        );
    }

    #[tokio::test]
    async fn split_writes_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("data.bin");
        std::fs::write(&src, vec![5u8; 20_000]).unwrap();
        let out = dir.path().join("out");
        std::fs::create_dir(&out).unwrap();

        let options = ChunkerOptions {
            chunk_size: 8192,
            max_concurrency: 2,
            ..Default::default()
        };
        handle_split(src, out.clone(), options, ProgressMode::Lines, true)
            .await
            .unwrap();
        assert_eq!(std::fs::read_dir(&out).unwrap().count(), 3);
        assert_eq!(std::fs::metadata(out.join("data.bin.0002")).unwrap().len(), 3_616);
    }
}
