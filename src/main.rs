// Entrypoint for the `fxf` binary.
// - Routes interrupts to a watcher thread before any other thread exists.
// - Sets up logging, runs the command and maps failures to exit code 1.

use std::process::ExitCode;

use clap::Parser;
use crossterm::style::Stylize;
use fxf_cli::cli::Cli;
use fxf_cli::{commands, interrupt, FxfError};
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "FXF_LOG";

fn main() -> ExitCode {
    let signals = interrupt::install();
    let cli = Cli::parse();
    init_logging(cli.verbose);
    if let Err(e) = signals {
        tracing::warn!(error = %e, "Interrupts will not be handled gracefully");
    }

    match commands::run(cli) {
        // a signal that arrived after the last checkpoint still fails the run
        Ok(()) if interrupt::is_interrupted() => {
            eprintln!("ok, bye");
            ExitCode::FAILURE
        }
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report(&err);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("warn,fxf=debug,fxf_cli=debug")
    } else {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn report(err: &anyhow::Error) {
    match err.downcast_ref::<FxfError>() {
        Some(FxfError::Interrupted) => eprintln!("ok, bye"),
        Some(FxfError::MissingCredential { .. }) => {
            eprintln!("{} {err}", "Error:".red().bold());
            eprintln!(
                "Run {} to store a token for this instance.",
                "fxf auth login -u <instance url>".bold()
            );
        }
        _ => eprintln!("{} {err:#}", "Error:".red().bold()),
    }
}
