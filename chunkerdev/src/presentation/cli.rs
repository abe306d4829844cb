use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about = "chunkerdev: file splitting in bites", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ProgressMode {
    /// One line per finished chunk
    Lines,
    /// A single progress bar
    Bar,
    /// No progress output
    Quiet,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Split a file into numbered chunk files
    Split {
        /// The file to split
        file: PathBuf,
        /// Existing directory that receives the chunks
        dest: PathBuf,

        /// Bytes per chunk; accepts K, M and G suffixes (binary)
        #[arg(long, short = 's', value_parser = parse_size, default_value = "8K")]
        chunk_size: u64,

        /// Concurrent chunk writers [default: available cores]
        #[arg(long, short = 'j')]
        jobs: Option<usize>,

        /// Copy buffer per writer
        #[arg(long, value_parser = parse_size, default_value = "64K")]
        buffer_size: u64,

        /// Skip fsync of each chunk
        #[arg(long)]
        no_sync: bool,

        #[arg(long, value_enum, default_value_t = ProgressMode::Lines)]
        progress: ProgressMode,

        /// Print the outcome as JSON on stdout
        #[arg(long)]
        json: bool,
    },

    /// Print the chunk plan for a file without writing anything
    Plan {
        file: PathBuf,
        #[arg(long, short = 's', value_parser = parse_size, default_value = "8K")]
        chunk_size: u64,
        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Integer byte count with an optional binary unit: `4096`, `8K`, `64KiB`, `2g`.
pub fn parse_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    let split = s
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(s.len());
    let (digits, unit) = s.split_at(split);
    if digits.is_empty() {
        return Err(format!("invalid size: {s:?}"));
    }
    let n: u64 = digits
        .parse()
        .map_err(|e| format!("invalid size {s:?}: {e}"))?;
    let shift = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "b" => 0,
        "k" | "kb" | "kib" => 10,
        "m" | "mb" | "mib" => 20,
        "g" | "gb" | "gib" => 30,
        other => return Err(format!("unknown size unit {other:?}")),
    };
    n.checked_mul(1u64 << shift)
        .ok_or_else(|| format!("size too large: {s:?}"))
}
