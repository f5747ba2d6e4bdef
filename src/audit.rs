//! Audit entry points: run the selected analyzers, merge their output, classify.

use std::collections::{BTreeMap, BTreeSet};

use tracing::info;

use crate::analyzer::node::NodeAnalyzer;
use crate::analyzer::python::PythonAnalyzer;
use crate::analyzer::{Analyzer, PackageFilter};
use crate::config::{AuditOptions, Config};
use crate::detector::resolve_audit_ecosystem;
use crate::error::Result;
use crate::license::classifier::map_licenses_to_status;
use crate::models::{AuditResult, Ecosystem, EcosystemLicenses, OverridesReport, PackageIssue, PackageLicenses};

/// Extracted licenses of every selected ecosystem, before classification.
#[derive(Debug, Default)]
pub struct AllLicenses {
    pub licenses: BTreeMap<String, PackageLicenses>,
    pub error_results: BTreeMap<String, PackageIssue>,
    /// Override keys that matched no discovered package.
    pub not_found_overrides: Vec<String>,
    /// Every warning of every ecosystem, newline-separated.
    pub warning: Option<String>,
}

async fn run_analyzer<A: Analyzer>(
    analyzer: A,
    options: &AuditOptions,
    filter: &PackageFilter,
) -> Result<EcosystemLicenses> {
    info!("Collecting {} dependencies", analyzer.ecosystem());
    analyzer.collect(options, filter).await
}

/// Collect licenses for the ecosystem(s) chosen by the CLI, the config, or
/// marker detection. On key collisions the first ecosystem's entry is kept.
pub async fn get_all_licenses(options: &AuditOptions, config: &Config) -> Result<AllLicenses> {
    let selected = resolve_audit_ecosystem(&options.cwd, options.ecosystem, config.ecosystem)?;
    let filter = PackageFilter::new(options.filter_regex.as_deref(), config)?;

    let mut all = AllLicenses::default();
    let mut warnings: Vec<String> = Vec::new();
    let mut found_package_names: BTreeSet<String> = BTreeSet::new();

    for ecosystem in selected.ecosystems() {
        let collected = match ecosystem {
            Ecosystem::Node => run_analyzer(NodeAnalyzer::new(), options, &filter).await?,
            Ecosystem::Python => run_analyzer(PythonAnalyzer::new(), options, &filter).await?,
        };

        for (key, value) in collected.licenses {
            all.licenses.entry(key).or_insert(value);
        }
        for (key, value) in collected.error_results {
            all.error_results.entry(key).or_insert(value);
        }
        found_package_names.extend(collected.found_package_names);
        warnings.extend(collected.warnings);
    }

    all.not_found_overrides = config
        .overrides
        .keys()
        .filter(|name| !found_package_names.contains(name.as_str()))
        .cloned()
        .collect();
    all.warning = (!warnings.is_empty()).then(|| warnings.join("\n"));

    Ok(all)
}

/// Full audit: collection plus classification.
pub async fn audit_licenses(options: &AuditOptions, config: &Config) -> Result<AuditResult> {
    let all = get_all_licenses(options, config).await?;
    let classification = map_licenses_to_status(&all.licenses, config);

    Ok(AuditResult {
        grouped_by_status: classification.grouped_by_status,
        not_found: classification.not_found,
        needs_user_verification: classification.needs_user_verification,
        error_results: all.error_results,
        overrides: OverridesReport {
            not_found_overrides: all.not_found_overrides,
        },
        warning: all.warning,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EcosystemChoice, Severity};
    use crate::error::AuditError;
    use crate::models::LicenseStatus;
    use std::path::Path;
    use tempfile::TempDir;

    fn write(path: &Path, content: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn node_project(root: &Path) {
        write(
            &root.join("package.json"),
            r#"{"name": "app", "dependencies": {"mit-pkg": "1", "gpl-pkg": "1", "bare": "1", "missing": "1"}}"#,
        );
        write(
            &root.join("node_modules/mit-pkg/package.json"),
            r#"{"name": "mit-pkg", "version": "1.0.0", "license": "MIT"}"#,
        );
        write(
            &root.join("node_modules/gpl-pkg/package.json"),
            r#"{"name": "gpl-pkg", "version": "2.0.0", "license": "GPL-3.0-only"}"#,
        );
        write(
            &root.join("node_modules/bare/package.json"),
            r#"{"name": "bare", "version": "0.1.0"}"#,
        );
    }

    #[tokio::test]
    async fn test_node_audit_buckets() {
        let dir = TempDir::new().unwrap();
        node_project(dir.path());

        let mut config = Config::default();
        config.overrides.insert("left-pad".to_string(), Severity::Warn);
        let options = AuditOptions::new(dir.path());

        let result = audit_licenses(&options, &config).await.unwrap();
        assert_eq!(result.count(LicenseStatus::Whitelist), 1);
        assert_eq!(result.count(LicenseStatus::Blacklist), 1);
        assert_eq!(result.count(LicenseStatus::Unknown), 0);
        assert!(result.not_found.contains_key("node:bare@0.1.0"));
        assert_eq!(result.overrides.not_found_overrides, vec!["left-pad"]);

        let warning = result.warning.unwrap();
        assert!(warning.contains("missing (required by"));
    }

    #[tokio::test]
    async fn test_ambiguous_project_is_fatal() {
        let dir = TempDir::new().unwrap();
        node_project(dir.path());
        write(&dir.path().join("requirements.txt"), "six==1.16.0\n");

        let err = audit_licenses(&AuditOptions::new(dir.path()), &Config::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AuditError::AmbiguousEcosystem));
    }

    #[tokio::test]
    async fn test_both_ecosystems_are_merged() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/six/1.16.0/json")
            .with_status(200)
            .with_body(r#"{"info": {"name": "six", "version": "1.16.0", "license": "MIT", "classifiers": []}}"#)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        node_project(dir.path());
        write(&dir.path().join("requirements.txt"), "six==1.16.0\nghost==9.9.9\n");

        let mut options = AuditOptions::new(dir.path());
        options.ecosystem = Some(EcosystemChoice::Both);
        options.registry.base_url = server.url();

        let all = get_all_licenses(&options, &Config::default()).await.unwrap();
        assert!(all.licenses.contains_key("node:mit-pkg@1.0.0"));
        assert!(all.licenses.contains_key("python:six@1.16.0"));
        assert!(all.licenses.contains_key("python:ghost@9.9.9"));

        let warning = all.warning.unwrap();
        let lines: Vec<&str> = warning.split('\n').collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("Some declared dependencies could not be resolved"));
        assert!(lines[1].starts_with("Unable to resolve PyPI metadata for ghost==9.9.9."));
    }
}
