// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! relay: run a job directory's plan across lanes of targets.

mod color;
mod commands;
mod exit_error;
mod logging;
mod output;

use clap::{Parser, Subcommand};

use crate::commands::{run, status};

#[derive(Parser)]
#[command(name = "relay", version, about = "Multi-lane plan runner", styles = color::styles())]
struct Cli {
    /// Debug-level diagnostics unless RELAY_LOG / RUST_LOG say otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a job to completion, resuming a previous run
    Run(run::RunArgs),
    /// Show a job's step states and lane summary
    Status(status::StatusArgs),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let result = match cli.command {
        Commands::Run(args) => run::handle(args).await,
        Commands::Status(args) => status::handle(args),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(exit_error::exit_code(&e));
    }
}
