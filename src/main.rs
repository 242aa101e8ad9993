//! wordpage: paginated word streaming over a line protocol
//!
//! Two modes share one binary:
//! - `server` loads a comma-separated word file and serves pages of it,
//!   one connection at a time
//! - `client` fetches every page from a server and prints how often each
//!   word occurred, sorted by word, followed by the elapsed time
//!
//! Configuration comes from a flat `config.json` (or `.toml`) file and
//! command-line flags.

mod client;
mod config;
mod frequency;
mod protocol;
mod server;
mod store;

use client::{Client, SessionOutcome};
use config::{ClientConfig, Config, ServerConfig};
use server::Server;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Exit code for runtime failures (word file, bind, I/O)
const EXIT_FAILURE: u8 = 1;
/// Exit code for configuration errors
const EXIT_CONFIG: u8 = 2;
/// Exit code for a failed connection to the server
const EXIT_CONNECT: u8 = 3;

fn main() -> ExitCode {
    // Load configuration
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("wordpage: {e}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.log_level()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to start runtime");
            return ExitCode::from(EXIT_FAILURE);
        }
    };

    match config {
        Config::Server(config) => runtime.block_on(run_server(config)),
        Config::Client(config) => runtime.block_on(run_client(config)),
    }
}

async fn run_server(config: ServerConfig) -> ExitCode {
    info!(
        listen = %config.listen,
        filename = %config.filename.display(),
        "Starting wordpage server"
    );

    let result = match Server::from_config(config) {
        Ok(server) => server.run().await,
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Server failed");
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

async fn run_client(config: ClientConfig) -> ExitCode {
    info!(
        server = %config.server,
        step = config.step,
        offset = config.initial_offset,
        "Starting wordpage client"
    );

    let quiet = config.quiet;
    let report = match Client::new(config).run().await {
        Ok(report) => report,
        Err(e) => {
            error!(error = %e, "Client failed");
            return ExitCode::from(EXIT_CONNECT);
        }
    };

    if report.outcome != SessionOutcome::EndOfStream {
        warn!(outcome = ?report.outcome, "Session ended early, reporting partial counts");
    } else if report.frequencies.is_empty() {
        info!("Server had no words to send");
    }

    let stdout = std::io::stdout();
    if let Err(e) = report.write_to(&mut stdout.lock(), quiet) {
        error!(error = %e, "Failed to write report");
        return ExitCode::from(EXIT_FAILURE);
    }

    ExitCode::SUCCESS
}
