mod capture;
mod cli;
mod config;
mod diff;
mod monitor;
mod report;
mod signals;
mod stability;

use capture::CommandProbe;
use cli::{Boundary, Cli};
use monitor::Monitor;
use signals::SignalHandler;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let (cli, boundary) = match Cli::parse_argv(std::env::args()) {
        Ok(parsed) => parsed,
        Err(e) => e.exit(),
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(cli.log_filter()))
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    if let Boundary::Inferred { token } = &boundary {
        tracing::debug!(%token, "no `--` given, command assumed to start here");
    }

    let config = cli.into_config();
    tracing::debug!(?config, "resolved configuration");

    let shutdown = match SignalHandler::install() {
        Ok(shutdown) => shutdown,
        Err(e) => {
            tracing::error!(error = %e, "cannot start monitor");
            return ExitCode::FAILURE;
        }
    };

    let probe = CommandProbe::new(&config.command);
    let monitor = Monitor::new(&config, probe, std::io::stdout(), shutdown);
    match monitor.run().await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "monitor stopped");
            ExitCode::FAILURE
        }
    }
}
