use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{AuditError, Result};
use crate::license::spdx::find_license_by_id;

/// License policy, deserialized from `license-auditor.config.toml` (or JSON).
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// SPDX ids that are always acceptable.
    #[serde(default)]
    pub whitelist: Vec<String>,
    /// SPDX ids that fail the audit.
    #[serde(default)]
    pub blacklist: Vec<String>,
    /// Packages removed from the audit entirely, keyed by bare package name.
    #[serde(default)]
    pub overrides: BTreeMap<String, Severity>,
    /// Which ecosystem(s) to audit when not given on the command line.
    #[serde(default)]
    pub ecosystem: Option<EcosystemChoice>,
}

/// How loudly an override is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warn,
    Off,
}

/// Requested ecosystem selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EcosystemChoice {
    Auto,
    Node,
    Python,
    Both,
}

impl Default for Config {
    /// Built-in default policy used when no config file is found.
    ///
    /// Permissive licenses are whitelisted; strong-copyleft licenses (GPL, AGPL)
    /// are blacklisted. Everything else is `unknown`.
    fn default() -> Self {
        let whitelist = [
            "MIT",
            "Apache-2.0",
            "BSD-2-Clause",
            "BSD-3-Clause",
            "ISC",
            "0BSD",
            "Unlicense",
            "CC0-1.0",
            "Zlib",
            "PSF-2.0",
            "Python-2.0",
            "BlueOak-1.0.0",
        ];
        let blacklist = [
            "GPL-2.0-only",
            "GPL-2.0-or-later",
            "GPL-3.0-only",
            "GPL-3.0-or-later",
            "AGPL-3.0-only",
            "AGPL-3.0-or-later",
        ];

        Config {
            whitelist: whitelist.iter().map(|s| s.to_string()).collect(),
            blacklist: blacklist.iter().map(|s| s.to_string()).collect(),
            overrides: BTreeMap::new(),
            ecosystem: None,
        }
    }
}

impl Config {
    /// Reject ids that are not SPDX license identifiers and ids listed twice.
    pub fn validate(&self) -> Result<()> {
        for (list, ids) in [("whitelist", &self.whitelist), ("blacklist", &self.blacklist)] {
            if let Some(bad) = ids.iter().find(|id| find_license_by_id(id).is_none()) {
                return Err(AuditError::config(format!(
                    "{} contains an unsupported SPDX license identifier: {}",
                    list, bad
                )));
            }
        }

        let whitelisted: HashSet<&str> = self.whitelist.iter().map(String::as_str).collect();
        if let Some(both) = self.blacklist.iter().find(|id| whitelisted.contains(id.as_str())) {
            return Err(AuditError::config(format!(
                "{} is listed in both whitelist and blacklist",
                both
            )));
        }

        Ok(())
    }

    pub fn is_whitelisted(&self, license_id: &str) -> bool {
        self.whitelist.iter().any(|id| id == license_id)
    }

    pub fn is_blacklisted(&self, license_id: &str) -> bool {
        self.blacklist.iter().any(|id| id == license_id)
    }
}

/// Per-run options that do not belong in the policy file.
#[derive(Debug, Clone)]
pub struct AuditOptions {
    pub cwd: PathBuf,
    /// Skip development dependencies.
    pub production: bool,
    /// Only audit packages whose `name@version` matches.
    pub filter_regex: Option<String>,
    /// Ecosystem requested on the command line; wins over the config file.
    pub ecosystem: Option<EcosystemChoice>,
    /// Explicit Python interpreter, tried before any other candidate.
    pub python: Option<PathBuf>,
    /// Explicit requirements files; disables discovery when non-empty.
    pub requirements: Vec<PathBuf>,
    pub registry: RegistrySettings,
}

impl AuditOptions {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: cwd.into(),
            production: false,
            filter_regex: None,
            ecosystem: None,
            python: None,
            requirements: Vec::new(),
            registry: RegistrySettings::default(),
        }
    }
}

/// PyPI access settings.
#[derive(Debug, Clone)]
pub struct RegistrySettings {
    pub base_url: String,
    pub concurrency: usize,
    pub timeout: Duration,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            base_url: "https://pypi.org/pypi".to_string(),
            concurrency: 8,
            timeout: Duration::from_secs(10),
        }
    }
}

const PROJECT_CONFIG_FILES: [&str; 3] = [
    "license-auditor.config.toml",
    "license-auditor.config.json",
    ".license-auditorrc.json",
];

/// Load the policy configuration, searching in order:
///
/// 1. `config_override` — path passed via `--config`
/// 2. `<project_path>/license-auditor.config.toml`, then the JSON variants
/// 3. `~/.config/license-auditor/config.toml`
/// 4. Built-in [`Config::default`]
///
/// Returns the config together with where it was loaded from.
pub fn load_config(project_path: &Path, config_override: Option<&Path>) -> Result<(Config, String)> {
    if let Some(path) = config_override {
        return Ok((read_config_file(path)?, path.display().to_string()));
    }

    for file_name in PROJECT_CONFIG_FILES {
        let project_config = project_path.join(file_name);
        if project_config.exists() {
            let config = read_config_file(&project_config)?;
            return Ok((config, project_config.display().to_string()));
        }
    }

    if let Some(home) = dirs::home_dir() {
        let home_config = home
            .join(".config")
            .join("license-auditor")
            .join("config.toml");
        if home_config.exists() {
            let config = read_config_file(&home_config)?;
            return Ok((config, home_config.display().to_string()));
        }
    }

    Ok((Config::default(), "built-in default policy".to_string()))
}

fn read_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)?;
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    let config: Config = if is_json {
        serde_json::from_str(&content).map_err(|e| {
            AuditError::config(format!("invalid configuration file at {}: {}", path.display(), e))
        })?
    } else {
        toml::from_str(&content).map_err(|e| {
            AuditError::config(format!("invalid configuration file at {}: {}", path.display(), e))
        })?
    };

    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn test_load_toml_config() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("license-auditor.config.toml"),
            r#"
whitelist = ["MIT", "ISC"]
blacklist = ["GPL-3.0-only"]
ecosystem = "python"

[overrides]
left-pad = "off"
"#,
        )
        .unwrap();

        let (config, source) = load_config(dir.path(), None).unwrap();
        assert!(source.ends_with("license-auditor.config.toml"));
        assert_eq!(config.whitelist, vec!["MIT", "ISC"]);
        assert_eq!(config.ecosystem, Some(EcosystemChoice::Python));
        assert_eq!(config.overrides.get("left-pad"), Some(&Severity::Off));
    }

    #[test]
    fn test_load_json_config_with_schema_key() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(".license-auditorrc.json"),
            r#"{"$schema": "./schema.json", "whitelist": ["MIT"], "blacklist": [], "overrides": {"foo": "warn"}}"#,
        )
        .unwrap();

        let (config, _) = load_config(dir.path(), None).unwrap();
        assert_eq!(config.whitelist, vec!["MIT"]);
        assert_eq!(config.overrides.get("foo"), Some(&Severity::Warn));
    }

    #[test]
    fn test_unknown_spdx_id_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("policy.toml");
        std::fs::write(&path, "whitelist = [\"Not-A-License\"]\nblacklist = []\n").unwrap();

        let err = load_config(dir.path(), Some(&path)).unwrap_err();
        assert!(matches!(err, AuditError::InvalidConfig(_)));
    }

    #[test]
    fn test_id_in_both_lists_is_rejected() {
        let config = Config {
            whitelist: vec!["MIT".to_string()],
            blacklist: vec!["MIT".to_string()],
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_override_severity_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("policy.json");
        std::fs::write(&path, r#"{"whitelist": [], "blacklist": [], "overrides": {"x": "error"}}"#).unwrap();
        assert!(load_config(dir.path(), Some(&path)).is_err());
    }
}
