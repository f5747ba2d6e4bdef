//! Pinned `requirements.txt` parsing with `-r` includes.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::{debug, warn};

use crate::analyzer::real_path_or_fallback;
use crate::error::Result;

/// `name[extras]==version`, with an optional environment marker after `;`.
pub const PINNED_REQUIREMENT: &str =
    r"^([A-Za-z0-9_.-]+)(\[[A-Za-z0-9_,.-]+\])?==([^\s;]+)(?:\s*;.*)?$";

const INCLUDE: &str = r"(?i)^(?:-r|--requirement)(?:\s+|=)(.+)$";

const NAME_PREFIX: &str = r"^([A-Za-z0-9_.-]+)";

/// A requirement pinned to an exact version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRequirement {
    pub name: String,
    pub normalized_name: String,
    pub version: String,
    pub source_file: PathBuf,
}

impl ParsedRequirement {
    pub fn new(name: &str, version: &str, source_file: PathBuf) -> Self {
        Self {
            name: name.to_string(),
            normalized_name: normalize_python_package_name(name),
            version: version.to_string(),
            source_file,
        }
    }

    /// Dedup key: normalized name plus version.
    pub fn key(&self) -> String {
        format!("{}@{}", self.normalized_name, self.version)
    }
}

/// A requirement line that is not an exact pin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsupportedRequirement {
    pub raw_line: String,
    pub source_file: PathBuf,
    /// Leading distribution-name-like token, when the line has one.
    pub package_name: Option<String>,
}

#[derive(Debug, Default)]
pub struct RequirementsParseResult {
    pub requirements: Vec<ParsedRequirement>,
    pub warnings: Vec<String>,
    pub unsupported: Vec<UnsupportedRequirement>,
}

/// Compiled requirement-line patterns.
pub struct RequirementPatterns {
    pinned: Regex,
    include: Regex,
    name_prefix: Regex,
}

impl RequirementPatterns {
    pub fn new() -> Result<Self> {
        Ok(Self {
            pinned: Regex::new(PINNED_REQUIREMENT)?,
            include: Regex::new(INCLUDE)?,
            name_prefix: Regex::new(NAME_PREFIX)?,
        })
    }

    /// `(name, version)` of an exactly pinned requirement.
    pub fn pinned<'a>(&self, line: &'a str) -> Option<(&'a str, &'a str)> {
        let caps = self.pinned.captures(line)?;
        Some((caps.get(1)?.as_str(), caps.get(3)?.as_str()))
    }

    fn include_target<'a>(&self, line: &'a str) -> Option<&'a str> {
        let target = self.include.captures(line)?.get(1)?.as_str().trim();
        (!target.is_empty()).then_some(target)
    }

    fn guess_name(&self, line: &str) -> Option<String> {
        self.name_prefix
            .captures(line)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    }
}

/// PEP 503 normalization: lowercase, runs of `.`, `_`, `-` become one `-`.
pub fn normalize_python_package_name(name: &str) -> String {
    let mut normalized = String::with_capacity(name.len());
    let mut in_separator = false;
    for c in name.chars() {
        if matches!(c, '.' | '_' | '-') {
            if !in_separator {
                normalized.push('-');
            }
            in_separator = true;
        } else {
            normalized.extend(c.to_lowercase());
            in_separator = false;
        }
    }
    normalized
}

/// Text before the first `#`.
pub fn strip_comment(line: &str) -> &str {
    line.split('#').next().unwrap_or("")
}

/// `requirements.txt` plus every `.txt` file in `requirements/`, sorted.
pub fn discover_requirements_files(cwd: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let root = cwd.join("requirements.txt");
    if root.is_file() {
        files.push(root);
    }

    if let Ok(entries) = std::fs::read_dir(cwd.join("requirements")) {
        let mut nested: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
            .filter(|e| e.file_name().to_string_lossy().to_lowercase().ends_with(".txt"))
            .map(|e| e.path())
            .collect();
        nested.sort();
        files.extend(nested);
    }

    files
}

fn absolutize(base: &Path, file: &Path) -> PathBuf {
    if file.is_absolute() {
        file.to_path_buf()
    } else {
        base.join(file)
    }
}

fn display_relative(cwd: &Path, file: &Path) -> String {
    file.strip_prefix(cwd).unwrap_or(file).display().to_string()
}

struct Frame {
    file: PathBuf,
    lines: Vec<String>,
    pos: usize,
}

/// Open `file` for parsing unless it was seen before. Missing or unreadable
/// files become warnings.
fn enter_file(
    file: PathBuf,
    stack: &mut Vec<Frame>,
    visited: &mut HashSet<PathBuf>,
    warnings: &mut Vec<String>,
) {
    if !visited.insert(real_path_or_fallback(&file)) {
        debug!("Already parsed {}", file.display());
        return;
    }

    if !file.exists() {
        let message = format!("Requirements include not found: {}", file.display());
        warn!("{}", message);
        warnings.push(message);
        return;
    }

    match std::fs::read_to_string(&file) {
        Ok(content) => {
            debug!("Parsing requirements file {}", file.display());
            stack.push(Frame {
                file,
                lines: content.lines().map(str::to_string).collect(),
                pos: 0,
            });
        }
        Err(e) => {
            let message = format!("Failed to read requirements file {}: {}", file.display(), e);
            warn!("{}", message);
            warnings.push(message);
        }
    }
}

/// Parse requirements files depth-first, following `-r` includes relative to
/// the including file. Each file is parsed at most once.
pub fn parse_requirements_files(cwd: &Path, files: &[PathBuf]) -> Result<RequirementsParseResult> {
    let patterns = RequirementPatterns::new()?;
    let mut result = RequirementsParseResult::default();
    let mut seen_keys: HashSet<String> = HashSet::new();
    let mut visited: HashSet<PathBuf> = HashSet::new();
    let mut stack: Vec<Frame> = Vec::new();

    for file in files {
        enter_file(absolutize(cwd, file), &mut stack, &mut visited, &mut result.warnings);

        while let Some(frame) = stack.last_mut() {
            let Some(raw) = frame.lines.get(frame.pos).cloned() else {
                stack.pop();
                continue;
            };
            frame.pos += 1;
            let current_file = frame.file.clone();

            let line = strip_comment(&raw).trim();
            if line.is_empty() {
                continue;
            }

            if let Some(target) = patterns.include_target(line) {
                let base = current_file.parent().unwrap_or(cwd);
                let include = absolutize(base, Path::new(target));
                enter_file(include, &mut stack, &mut visited, &mut result.warnings);
                continue;
            }

            match patterns.pinned(line) {
                Some((name, version)) => {
                    let requirement = ParsedRequirement::new(name, version, current_file);
                    if seen_keys.insert(requirement.key()) {
                        result.requirements.push(requirement);
                    }
                }
                None => {
                    let message = format!(
                        "Unsupported requirement spec in {}: {}",
                        display_relative(cwd, &current_file),
                        line
                    );
                    warn!("{}", message);
                    result.warnings.push(message);
                    result.unsupported.push(UnsupportedRequirement {
                        raw_line: line.to_string(),
                        source_file: current_file,
                        package_name: patterns.guess_name(line),
                    });
                }
            }
        }
    }

    Ok(result)
}
