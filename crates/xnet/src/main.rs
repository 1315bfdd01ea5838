//! xnet CLI - prompt directive dispatch.
//!
//! Provides commands for:
//! - `parse`: Show how prompts split into text and directives
//! - `run`: Dry-run the network handler lifecycle over a configured catalog
//! - `meta`: Show the user metadata sidecar of an artifact

mod commands;
mod error;
mod output;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::{MetaArgs, ParseArgs, RunArgs};
use output::Output;

/// xnet - prompt directive dispatch.
#[derive(Parser)]
#[command(name = "xnet", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse prompts and print the cleaned text and directives.
    Parse(ParseArgs),
    /// Activate and deactivate handlers for prompts without loading anything.
    Run(RunArgs),
    /// Print the user metadata sidecar of an artifact.
    Meta(MetaArgs),
}

fn main() {
    let cli = Cli::parse();
    let output = Output::new();

    let verbose = matches!(&cli.command, Commands::Run(args) if args.verbose);

    // --verbose enables INFO level, otherwise use RUST_LOG or default to WARN
    let filter = if verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Parse(args) => args.execute(),
        Commands::Run(args) => args.execute(),
        Commands::Meta(args) => args.execute(),
    };

    if let Err(err) = result {
        output.error(&format!("Error: {err}"));
        std::process::exit(1);
    }
}
