use crate::presentation::cli::ProgressMode;
use chunker_core::ChunkPlan;
use chunker_core::ChunkResult;
use chunker_core::progress::{ProgressSink, ProgressSnapshot, SinkError};
use indicatif::{HumanBytes, HumanCount, ProgressBar, ProgressStyle};
use std::io::Write;

const BAR_TEMPLATE: &str =
    "{msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec})";

/// Terminal rendering of session progress.
pub enum ProgressDisplay {
    Lines,
    Bar(ProgressBar),
    Quiet,
}

impl ProgressDisplay {
    pub fn new(mode: ProgressMode, plan: &ChunkPlan) -> Self {
        match mode {
            ProgressMode::Lines => Self::Lines,
            ProgressMode::Quiet => Self::Quiet,
            ProgressMode::Bar => {
                let bar = ProgressBar::new(plan.total_size());
                let style = ProgressStyle::with_template(BAR_TEMPLATE)
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-");
                bar.set_style(style);
                bar.set_message(format!("0/{} chunks", plan.len()));
                Self::Bar(bar)
            }
        }
    }

    pub fn finish(&self) {
        if let Self::Bar(bar) = self {
            bar.finish_and_clear();
        }
    }
}

impl ProgressSink for ProgressDisplay {
    fn on_progress(
        &mut self,
        snapshot: &ProgressSnapshot,
        completed: &ChunkResult,
    ) -> Result<(), SinkError> {
        match self {
            Self::Lines => {
                let mut out = std::io::stdout().lock();
                writeln!(out, "{}", format_line(snapshot, completed.bytes_written))?;
            }
            Self::Bar(bar) => {
                bar.set_position(snapshot.bytes_completed);
                bar.set_message(format!(
                    "{}/{} chunks",
                    snapshot.chunks_completed, snapshot.chunks_total
                ));
            }
            Self::Quiet => {}
        }
        Ok(())
    }
}

/// `Processed[  12]: 8,192B /     98,304B`
pub fn format_line(snapshot: &ProgressSnapshot, chunk_len: u64) -> String {
    format!(
        "Processed[{:>4}]:{:>6}B / {:>10}B",
        HumanCount(snapshot.chunks_completed).to_string(),
        HumanCount(chunk_len).to_string(),
        HumanCount(snapshot.bytes_completed).to_string(),
    )
}

pub fn format_total(bytes: u64) -> String {
    format!("{} ({} bytes)", HumanBytes(bytes), HumanCount(bytes))
}
