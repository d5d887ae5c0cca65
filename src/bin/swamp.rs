// src/bin/swamp.rs

use anyhow::Result;
use clap::Parser;
use colored::*;
use swamp::cli::{Cli, handlers};

/// Sets up logging, runs the requested action and reports any error.
fn main() {
    env_logger::init();

    if let Err(e) = run_cli(Cli::parse()) {
        eprintln!("\n{}: {:#}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

fn run_cli(cli: Cli) -> Result<()> {
    log::debug!("CLI args parsed: {:?}", cli);
    handlers::run::handle(&cli)
}
