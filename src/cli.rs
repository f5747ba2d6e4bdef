use std::path::PathBuf;

use clap::Parser;

use crate::config::{AuditOptions, EcosystemChoice};

#[derive(Parser, Debug)]
#[command(
    name = "license-auditor",
    about = "Audit license compliance of Node and Python dependencies",
    version
)]
pub struct Cli {
    /// Project path to audit
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Policy config file [default: ./license-auditor.config.toml, fallback ~/.config/license-auditor/config.toml]
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Ecosystem(s) to audit; overrides the config file
    #[arg(long, value_name = "ECOSYSTEM")]
    pub ecosystem: Option<EcosystemChoice>,

    /// Skip development dependencies
    #[arg(long)]
    pub production: bool,

    /// Python interpreter used for environment introspection
    #[arg(long, value_name = "PATH")]
    pub python: Option<PathBuf>,

    /// Requirements file to audit instead of discovered ones (repeatable)
    #[arg(long, value_name = "FILE")]
    pub requirements: Vec<PathBuf>,

    /// Only audit packages whose name@version matches this regex
    #[arg(long, value_name = "REGEX")]
    pub filter_regex: Option<String>,

    /// Report format
    #[arg(long, default_value = "terminal", value_name = "FORMAT")]
    pub report: ReportFormat,

    /// Also fail on unknown, missing, or unverified licenses
    #[arg(long)]
    pub strict: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace); also lists whitelisted packages
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only print the summary line
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum ReportFormat {
    Terminal,
    Json,
}

impl Cli {
    /// Runtime options for an audit of `cwd`.
    pub fn audit_options(&self, cwd: PathBuf) -> AuditOptions {
        let mut options = AuditOptions::new(cwd);
        options.production = self.production;
        options.filter_regex = self.filter_regex.clone();
        options.ecosystem = self.ecosystem;
        options.python = self.python.clone();
        options.requirements = self.requirements.clone();
        options
    }
}
