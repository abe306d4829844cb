pub mod handlers;

use crate::presentation::cli::{Cli, Commands};
use chunker_core::error::Result;
use chunker_core::options::{ChunkerOptions, default_concurrency};
use clap::Parser;
use std::process::ExitCode;

pub async fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Split {
            file,
            dest,
            chunk_size,
            jobs,
            buffer_size,
            no_sync,
            progress,
            json,
        } => {
            let options = ChunkerOptions {
                chunk_size,
                max_concurrency: jobs.unwrap_or_else(default_concurrency),
                buffer_size: usize::try_from(buffer_size).unwrap_or(usize::MAX),
                sync: !no_sync,
            };
            handlers::handle_split(file, dest, options, progress, json).await
        }
        Commands::Plan {
            file,
            chunk_size,
            json,
        } => handlers::handle_plan(file, chunk_size, json),
    }
}
