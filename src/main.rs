mod cache;
mod cli;
mod commands;
mod error;
mod model;
mod pipeline;
mod progress;
mod selector;
mod store;
#[cfg(test)]
mod test_support;
mod util;
mod vectorize;

use anyhow::Result;
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::error::SyncError;

fn main() {
    init_tracing();

    if let Err(err) = run() {
        let kind = err
            .downcast_ref::<SyncError>()
            .map(SyncError::kind)
            .unwrap_or("command");
        error!(kind, error = %err, "command failed");
        for cause in err.chain().skip(1) {
            error!(cause = %cause, "caused by");
        }
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Sync(args) => commands::sync::run(args),
        Commands::Status(args) => commands::status::run(args),
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
