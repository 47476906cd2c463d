//! floot CLI - Main Entry Point

use clap::Parser;
use floot_cli::{output, Cli};
use std::io;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging, stdout is reserved for run ids and reports
    let log_level = if cli.debug { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let result = {
        let stdin = io::stdin();
        let mut input = stdin.lock();
        let mut out = io::stdout().lock();
        floot_cli::execute(cli, &mut input, &mut out).await
    };

    let code = match result {
        Ok(code) => code,
        Err(e) => {
            output::print_error(&format!("{:#}", e));
            floot_cli::exit_code(&e)
        }
    };
    std::process::exit(code);
}
