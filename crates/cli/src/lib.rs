//! floot CLI
//!
//! Command-line interface for running specs against a host and comparing
//! the recorded runs.

use clap::{Parser, Subcommand};
use std::io::{BufRead, Write};
use std::path::PathBuf;

pub mod commands;
pub mod output;

use commands::{accept, cmp, list, rm, run, show, Context};
use output::OutputFormat;

/// floot - declarative API regression testing
#[derive(Parser, Debug)]
#[command(name = "floot")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Spec file
    #[arg(short, long, env = "FLOOT_CONFIG", default_value = floot_common::DEFAULT_SPEC_FILE, global = true)]
    pub config: PathBuf,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    pub format: OutputFormat,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Execute the spec and record a new run
    Run(run::RunArgs),

    /// List runs, oldest first
    List,

    /// Remove a run
    Rm(rm::RmArgs),

    /// Compare two runs, or a run against main
    Cmp(cmp::CmpArgs),

    /// Promote a run, or one of its requests, into main
    Accept(accept::AcceptArgs),

    /// Print the requests of a run or of main
    Show(show::ShowArgs),
}

/// Run a parsed command line, returning the process exit code
pub async fn execute(cli: Cli, input: &mut dyn BufRead, out: &mut dyn Write) -> anyhow::Result<i32> {
    let ctx = Context::load(&cli.config, cli.format)?;
    let result = match cli.command {
        Commands::Run(args) => run::execute(args, &ctx, out).await,
        Commands::List => list::execute(&ctx, out),
        Commands::Rm(args) => rm::execute(args, &ctx, input, out),
        Commands::Cmp(args) => cmp::execute(args, &ctx, out),
        Commands::Accept(args) => accept::execute(args, &ctx, input, out),
        Commands::Show(args) => show::execute(args, &ctx, out),
    };
    // whatever a failed command printed still goes out before its error
    out.flush()?;
    result
}

/// 2 for domain errors, 3 for everything unexpected
pub fn exit_code(error: &anyhow::Error) -> i32 {
    error
        .downcast_ref::<floot_common::Error>()
        .map(floot_common::Error::exit_code)
        .unwrap_or(3)
}
