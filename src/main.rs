//! `license-auditor`: resolve Node and Python dependencies, extract their
//! licenses, and check them against a whitelist/blacklist policy.
//!
//! # Flow
//! 1. Parse CLI arguments ([`cli`]) and install logging ([`logging`]).
//! 2. Load the policy config ([`config::load_config`]).
//! 3. Pick the ecosystem(s) to audit ([`detector`]).
//! 4. Resolve dependencies and extract licenses per ecosystem ([`analyzer`], [`registry`]).
//! 5. Classify every package ([`license::classifier`]).
//! 6. Render the requested report ([`report`]).
//! 7. Exit `0` (clean) or `1` (blacklisted license, processing error, or any
//!    unresolved license under `--strict`).

mod analyzer;
mod audit;
mod cli;
mod config;
mod detector;
mod error;
mod license;
mod logging;
mod models;
mod process;
mod registry;
mod report;

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use cli::{Cli, ReportFormat};
use config::load_config;
use logging::Verbosity;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(Verbosity::from_flags(cli.verbose, cli.quiet));

    let path = cli.path.canonicalize().unwrap_or_else(|_| cli.path.clone());

    let (config, config_source) = load_config(&path, cli.config.as_deref())?;
    info!("Loaded policy from {}", config_source);

    let options = cli.audit_options(path.clone());

    let spinner = if !cli.quiet && matches!(cli.report, ReportFormat::Terminal) {
        let pb = ProgressBar::new_spinner();
        pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
        pb.set_message(format!("Auditing {}", path.display()));
        pb.enable_steady_tick(Duration::from_millis(100));
        Some(pb)
    } else {
        None
    };

    let outcome = audit::audit_licenses(&options, &config).await;
    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }
    let result = outcome?;

    match cli.report {
        ReportFormat::Terminal => {
            report::terminal::render(&result, &path, &config_source, cli.verbose > 0, cli.quiet)?;
        }
        ReportFormat::Json => report::render_json(&result)?,
    }

    if result.fails(cli.strict) {
        std::process::exit(1);
    }

    Ok(())
}
