//! medicctl - diagnose and fix sandbox runtime environment problems.

use clap::Parser;
use owo_colors::OwoColorize;
use tracing_subscriber::EnvFilter;

use medicctl::cli::{Cli, Commands};
use medicctl::commands;

use medic_common::config::MedicConfig;

fn setup_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> anyhow::Result<i32> {
    let settings = match cli.config {
        Some(ref path) => MedicConfig::load_from(path)?,
        None => MedicConfig::load()?,
    };
    tracing::debug!(
        "service unit {}, client process {}",
        settings.service_unit,
        settings.client_process
    );

    match cli.command {
        Commands::Diagnose { json } => commands::run_diagnose(&settings, json),
        Commands::Fix { ids, all, yes } => commands::run_fix(&settings, &ids, all, yes),
        Commands::List { json } => commands::run_list(json),
    }
}

fn main() {
    let cli = Cli::parse();
    setup_tracing(cli.verbose);

    let code = match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {e:#}", "error:".red().bold());
            1
        }
    };
    std::process::exit(code);
}
