use std::path::Path;

use tracing::debug;

use crate::config::EcosystemChoice;
use crate::error::{AuditError, Result};
use crate::models::Ecosystem;

const NODE_MARKERS: [&str; 7] = [
    "package.json",
    "node_modules",
    "package-lock.json",
    "pnpm-lock.yaml",
    "yarn.lock",
    "bun.lock",
    "bun.lockb",
];

const PYTHON_MARKERS: [&str; 4] = ["pyproject.toml", "uv.lock", "requirements.txt", ".venv"];

/// Ecosystem(s) a run audits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedEcosystem {
    Node,
    Python,
    Both,
}

impl ResolvedEcosystem {
    /// Ecosystems in audit order. Node runs first, so its entries win on key collisions.
    pub fn ecosystems(self) -> &'static [Ecosystem] {
        match self {
            ResolvedEcosystem::Node => &[Ecosystem::Node],
            ResolvedEcosystem::Python => &[Ecosystem::Python],
            ResolvedEcosystem::Both => &[Ecosystem::Node, Ecosystem::Python],
        }
    }
}

fn has_requirements_directory(path: &Path) -> bool {
    std::fs::read_dir(path.join("requirements"))
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .any(|e| e.file_name().to_string_lossy().to_lowercase().ends_with(".txt"))
        })
        .unwrap_or(false)
}

fn has_node_signals(path: &Path) -> bool {
    NODE_MARKERS.iter().any(|m| path.join(m).exists())
}

fn has_python_signals(path: &Path) -> bool {
    PYTHON_MARKERS.iter().any(|m| path.join(m).exists()) || has_requirements_directory(path)
}

/// Pick the ecosystem(s) to audit. The command line wins over the config file,
/// which wins over marker-file detection.
pub fn resolve_audit_ecosystem(
    path: &Path,
    cli_choice: Option<EcosystemChoice>,
    config_choice: Option<EcosystemChoice>,
) -> Result<ResolvedEcosystem> {
    match cli_choice.or(config_choice).unwrap_or(EcosystemChoice::Auto) {
        EcosystemChoice::Node => return Ok(ResolvedEcosystem::Node),
        EcosystemChoice::Python => return Ok(ResolvedEcosystem::Python),
        EcosystemChoice::Both => return Ok(ResolvedEcosystem::Both),
        EcosystemChoice::Auto => {}
    }

    let node = has_node_signals(path);
    let python = has_python_signals(path);
    debug!("Ecosystem signals in {}: node={}, python={}", path.display(), node, python);

    match (node, python) {
        (true, true) => Err(AuditError::AmbiguousEcosystem),
        (false, true) => Ok(ResolvedEcosystem::Python),
        _ => Ok(ResolvedEcosystem::Node),
    }
}
