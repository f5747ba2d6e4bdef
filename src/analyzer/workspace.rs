//! Workspace discovery for Node monorepos.
//!
//! Patterns come from `package.json` (`workspaces` as an array or as
//! `{ packages: [...] }`) and from the `packages:` block of
//! `pnpm-workspace.yaml`.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::pattern::{match_workspace_pattern, normalize_pattern};
use super::real_path_or_fallback;
use crate::error::{AuditError, Result};

const SKIPPED_DIRS: [&str; 3] = ["node_modules", ".git", ".turbo"];

/// The subset of `package.json` the resolver cares about.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawManifest {
    pub name: Option<String>,
    pub version: Option<String>,
    pub workspaces: Option<Workspaces>,
    pub dependencies: Option<BTreeMap<String, Value>>,
    pub dev_dependencies: Option<BTreeMap<String, Value>>,
    pub optional_dependencies: Option<BTreeMap<String, Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Workspaces {
    Patterns(Vec<String>),
    Object {
        #[serde(default)]
        packages: Vec<String>,
    },
}

pub fn read_manifest(path: &Path) -> Result<RawManifest> {
    let content = std::fs::read_to_string(path).map_err(|e| AuditError::manifest(path, e))?;
    serde_json::from_str(&content).map_err(|e| AuditError::manifest(path, e))
}

/// Workspace member directories of a project.
#[derive(Debug, Default)]
pub struct WorkspaceLayout {
    /// Member directories; the project root always comes first.
    pub dirs: Vec<PathBuf>,
    /// Package name → member directory.
    pub names: HashMap<String, PathBuf>,
    /// Canonical paths of all member directories.
    pub real_paths: HashSet<PathBuf>,
}

pub fn workspace_patterns(manifest: &RawManifest) -> Vec<String> {
    let patterns = match &manifest.workspaces {
        Some(Workspaces::Patterns(patterns)) => patterns.clone(),
        Some(Workspaces::Object { packages }) => packages.clone(),
        None => Vec::new(),
    };
    patterns.into_iter().filter(|p| !p.trim().is_empty()).collect()
}

/// Patterns listed under `packages:` in `pnpm-workspace.yaml`.
///
/// The block ends at the first non-empty, non-comment line that is not a list item.
pub fn read_pnpm_workspace_patterns(project_root: &Path) -> Vec<String> {
    let Ok(content) = std::fs::read_to_string(project_root.join("pnpm-workspace.yaml")) else {
        return Vec::new();
    };

    let mut patterns = Vec::new();
    let mut in_packages = false;

    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if trimmed == "packages:" {
            in_packages = true;
            continue;
        }
        if !in_packages {
            continue;
        }
        let Some(item) = trimmed.strip_prefix('-') else {
            in_packages = false;
            continue;
        };

        let pattern = item
            .trim()
            .trim_matches(|c: char| c == '"' || c == '\'')
            .trim();
        if !pattern.is_empty() {
            patterns.push(pattern.to_string());
        }
    }

    patterns
}

/// Every directory under `project_root` that holds a `package.json`,
/// skipping dependency caches and VCS metadata.
fn collect_package_directories(project_root: &Path) -> Vec<PathBuf> {
    WalkDir::new(project_root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            let name = e.file_name().to_string_lossy();
            !(e.file_type().is_dir() && SKIPPED_DIRS.iter().any(|d| name == *d))
        })
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir() && e.path().join("package.json").is_file())
        .map(|e| e.into_path())
        .collect()
}

/// Locate the workspace members of `project_root`.
///
/// Without declared patterns only the root is a workspace.
pub fn locate_workspaces(project_root: &Path) -> Result<WorkspaceLayout> {
    let root_manifest_path = project_root.join("package.json");
    let root_manifest = if root_manifest_path.is_file() {
        read_manifest(&root_manifest_path)?
    } else {
        RawManifest::default()
    };

    let patterns: Vec<String> = workspace_patterns(&root_manifest)
        .into_iter()
        .chain(read_pnpm_workspace_patterns(project_root))
        .map(|p| normalize_pattern(&p))
        .collect();

    let mut dirs = vec![project_root.to_path_buf()];
    if !patterns.is_empty() {
        for dir in collect_package_directories(project_root) {
            let Ok(relative) = dir.strip_prefix(project_root) else {
                continue;
            };
            let relative = relative.to_string_lossy();
            if patterns.iter().any(|p| match_workspace_pattern(&relative, p)) {
                dirs.push(dir);
            }
        }
    }
    debug!("Found {} workspace director(ies) in {}", dirs.len(), project_root.display());

    let mut names = HashMap::new();
    for dir in &dirs {
        let manifest_path = dir.join("package.json");
        if !manifest_path.is_file() {
            continue;
        }
        match read_manifest(&manifest_path) {
            Ok(RawManifest { name: Some(name), .. }) => {
                names.insert(name, dir.clone());
            }
            Ok(_) => {}
            Err(e) => warn!("Skipping workspace manifest: {}", e),
        }
    }

    let real_paths = dirs.iter().map(|d| real_path_or_fallback(d)).collect();

    Ok(WorkspaceLayout {
        dirs,
        names,
        real_paths,
    })
}
