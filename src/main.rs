mod cli;
mod commands;
mod error;
mod logging;

use crate::cli::Args;
use crate::commands::Outcome;
use clap::Parser;
use keeper_config::Config;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;

/// Exit status when the command could not run at all.
const EXIT_ERROR: u8 = 2;
const EXIT_INTERRUPTED: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let config = match Config::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("Error: {error:?}");
            return ExitCode::from(EXIT_ERROR);
        },
    };
    if let Err(error) = logging::setup_logging(&config.log) {
        eprintln!("Error: {error:?}");
        return ExitCode::from(EXIT_ERROR);
    }

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_interrupt(cancel.clone()));

    match commands::run(args, &config, cancel).await {
        Ok(Outcome::Complete) => ExitCode::SUCCESS,
        Ok(Outcome::Incomplete) => ExitCode::FAILURE,
        Ok(Outcome::Cancelled) => ExitCode::from(EXIT_INTERRUPTED),
        Err(error) => {
            tracing::error!(error = ?error, "Command failed");
            ExitCode::from(EXIT_ERROR)
        },
    }
}

async fn cancel_on_interrupt(cancel: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::warn!("Interrupted; stopping after the current version");
        cancel.cancel();
    }
}
