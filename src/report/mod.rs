//! Report renderers for audit results.
//!
//! - [`terminal`]: colored summary box plus one table per bucket; respects `--verbose` / `--quiet`.
//! - [`render_json`]: the whole [`AuditResult`] as pretty-printed JSON on stdout.

pub mod terminal;

use anyhow::Result;

use crate::models::AuditResult;

pub fn render_json(result: &AuditResult) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(result)?);
    Ok(())
}
