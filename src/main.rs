use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod cli;
mod config;
mod diff;
mod document;
mod index;
mod inputs;
mod kro;
mod matcher;
mod model;
mod normalize;
mod report;
mod resolve;
mod store;
mod workflow;

use cli::{Command, RootArgs};

/// Exit status for usage, configuration and input-file errors.
const EXIT_USAGE: u8 = 2;

fn main() -> ExitCode {
    let args = RootArgs::parse();
    init_tracing(args.verbose);

    let result = match &args.command {
        Command::Sync(sync) => workflow::run_sync(sync),
        Command::Chains(chains) => workflow::run_chains(chains).map(|()| ExitCode::SUCCESS),
        Command::Config(config) => workflow::run_config(config).map(|()| ExitCode::SUCCESS),
    };
    match result {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(EXIT_USAGE)
        }
    }
}

/// Logs go to stderr so stdout stays clean for `--json`.
fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
