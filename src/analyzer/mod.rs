use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::{debug, warn};

use crate::config::{AuditOptions, Config, Severity};
use crate::error::{AuditError, Result};
use crate::models::{package_name_without_version, Ecosystem, EcosystemLicenses};

pub mod node;
pub mod pattern;
pub mod python;
pub mod workspace;

/// Per-ecosystem dependency discovery and license collection.
#[allow(async_fn_in_trait)]
pub trait Analyzer {
    fn ecosystem(&self) -> Ecosystem;

    async fn collect(&self, options: &AuditOptions, filter: &PackageFilter) -> Result<EcosystemLicenses>;
}

/// Package selection shared by every ecosystem: the `--filter-regex` and the
/// config's `overrides`.
#[derive(Debug, Clone)]
pub struct PackageFilter {
    regex: Option<Regex>,
    overrides: BTreeMap<String, Severity>,
}

impl PackageFilter {
    pub fn new(filter_regex: Option<&str>, config: &Config) -> Result<Self> {
        let regex = filter_regex
            .map(|pattern| {
                Regex::new(pattern).map_err(|source| AuditError::InvalidFilterRegex {
                    pattern: pattern.to_string(),
                    source,
                })
            })
            .transpose()?;
        Ok(Self {
            regex,
            overrides: config.overrides.clone(),
        })
    }

    /// Whether `package_name` (`name@version`) passes the filter regex.
    pub fn matches_regex(&self, package_name: &str) -> bool {
        self.regex.as_ref().map_or(true, |re| re.is_match(package_name))
    }

    pub fn bare_name(&self, package_name: &str) -> String {
        package_name_without_version(package_name).to_string()
    }

    /// Whether the package is removed from the audit by an override.
    pub fn is_overridden(&self, package_name: &str) -> bool {
        let name = package_name_without_version(package_name);
        match self.overrides.get(name) {
            Some(Severity::Warn) => {
                warn!("Skipping {} (overridden in config)", package_name);
                true
            }
            Some(Severity::Off) => {
                debug!("Skipping {} (overridden in config)", package_name);
                true
            }
            None => false,
        }
    }
}

/// Canonical (symlink-resolved) path, or the path itself when it cannot be resolved.
pub fn real_path_or_fallback(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_regex() {
        let filter = PackageFilter::new(Some("^react"), &Config::default()).unwrap();
        assert!(filter.matches_regex("react-dom@18.0.0"));
        assert!(!filter.matches_regex("lodash@4.17.21"));

        let open = PackageFilter::new(None, &Config::default()).unwrap();
        assert!(open.matches_regex("anything@1.0.0"));
    }

    #[test]
    fn test_invalid_regex_is_an_error() {
        let err = PackageFilter::new(Some("(unclosed"), &Config::default()).unwrap_err();
        assert!(matches!(err, AuditError::InvalidFilterRegex { .. }));
    }

    #[test]
    fn test_overrides_match_bare_names() {
        let mut config = Config::default();
        config.overrides.insert("@scope/pkg".to_string(), Severity::Off);
        config.overrides.insert("requests".to_string(), Severity::Warn);
        let filter = PackageFilter::new(None, &config).unwrap();

        assert!(filter.is_overridden("@scope/pkg@1.0.0"));
        assert!(filter.is_overridden("requests@2.31.0"));
        assert!(!filter.is_overridden("urllib3@2.0.0"));
        assert_eq!(filter.bare_name("@scope/pkg@1.0.0"), "@scope/pkg");
    }
}
