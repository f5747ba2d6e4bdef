//! Python side of the audit.
//!
//! Pinned dependencies come from `uv.lock` (through `uv export`) and
//! requirements files, and are enriched with PyPI metadata. When neither
//! source pins anything, the distributions installed for the project's
//! interpreter are introspected instead.

pub mod environment;
pub mod interpreter;
pub mod requirements;
pub mod uv;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use self::environment::introspect_environment;
use self::interpreter::resolve_python_interpreter;
use self::requirements::{
    discover_requirements_files, normalize_python_package_name, parse_requirements_files,
    ParsedRequirement, UnsupportedRequirement,
};
use self::uv::export_uv_lock;
use super::{Analyzer, PackageFilter};
use crate::config::AuditOptions;
use crate::error::Result;
use crate::license::extractor::{extract_python_licenses, PythonMetadata};
use crate::models::{
    result_key, DependencySource, Ecosystem, EcosystemLicenses, ExtractedLicenses, LicenseSource,
    MetadataSource, PackageCandidate, PackageLicenses,
};
use crate::registry::map_with_concurrency;
use crate::registry::pypi::{PypiClient, PypiMetadata};

const PRODUCTION_CAVEAT: &str = "Python --production mode is best-effort. \
     Precise dev dependency exclusion is guaranteed only for uv.lock export mode.";

#[derive(Debug, Clone)]
struct PinnedDependency {
    requirement: ParsedRequirement,
    source: DependencySource,
}

/// Pinned dependencies in first-seen order, unique by normalized name and version.
#[derive(Debug, Default)]
struct PinnedSet {
    dependencies: Vec<PinnedDependency>,
    keys: HashSet<String>,
}

impl PinnedSet {
    fn extend(&mut self, requirements: Vec<ParsedRequirement>, source: DependencySource) {
        for requirement in requirements {
            if self.keys.insert(requirement.key()) {
                self.dependencies.push(PinnedDependency { requirement, source });
            }
        }
    }
}

/// Regex filter, found-name bookkeeping, then overrides. Returns whether the
/// package stays in the audit.
fn admit(filter: &PackageFilter, result: &mut EcosystemLicenses, package_name: &str) -> bool {
    if !filter.matches_regex(package_name) {
        return false;
    }
    result.found_package_names.insert(filter.bare_name(package_name));
    !filter.is_overridden(package_name)
}

fn record_licenses(
    result: &mut EcosystemLicenses,
    package_name: String,
    package_path: PathBuf,
    dependency_source: DependencySource,
    metadata_source: MetadataSource,
    extracted: ExtractedLicenses,
) {
    let candidate = PackageCandidate {
        name: package_name,
        resolved_path: package_path,
        ecosystem: Ecosystem::Python,
        dependency_source,
    };
    result
        .licenses
        .entry(candidate.identity())
        .or_insert(PackageLicenses {
            candidate,
            metadata_source,
            extracted,
        });
}

/// Identity of a requirement line that is not an exact pin.
fn unsupported_package_name(unsupported: &UnsupportedRequirement) -> String {
    let base = match &unsupported.package_name {
        Some(name) => name.clone(),
        None => {
            let prefix: String = unsupported.raw_line.chars().take(24).collect();
            format!("unresolved-requirement-{}", normalize_python_package_name(&prefix))
        }
    };
    format!("{}@unknown", base)
}

fn requirements_files(options: &AuditOptions) -> Vec<PathBuf> {
    if options.requirements.is_empty() {
        return discover_requirements_files(&options.cwd);
    }
    options
        .requirements
        .iter()
        .map(|file| {
            if file.is_absolute() {
                file.clone()
            } else {
                options.cwd.join(file)
            }
        })
        .collect()
}

/// Python side of the audit: pinned sources first, live environment otherwise.
pub struct PythonAnalyzer;

impl PythonAnalyzer {
    pub fn new() -> Self {
        Self
    }

    fn collect_unsupported(
        &self,
        unsupported: &[UnsupportedRequirement],
        filter: &PackageFilter,
        result: &mut EcosystemLicenses,
    ) {
        for entry in unsupported {
            let package_name = unsupported_package_name(entry);
            if !admit(filter, result, &package_name) {
                continue;
            }

            let message = format!(
                "Requirement entry needs manual verification for {}. Unsupported requirement specification: {}",
                package_name, entry.raw_line
            );
            let extracted = ExtractedLicenses::manual(entry.source_file.clone(), message);
            record_licenses(
                result,
                package_name,
                entry.source_file.clone(),
                DependencySource::Requirements,
                MetadataSource::PypiJsonApi,
                extracted,
            );
        }
    }

    async fn collect_from_environment(
        &self,
        options: &AuditOptions,
        filter: &PackageFilter,
        result: &mut EcosystemLicenses,
    ) -> Result<()> {
        let interpreter = resolve_python_interpreter(&options.cwd, options.python.as_deref()).await?;

        let distributions = match introspect_environment(&interpreter, &options.cwd).await {
            Ok(d) => d,
            Err(e) => {
                let message = format!(
                    "Python environment introspection failed for {}: {}",
                    interpreter.display(),
                    e
                );
                warn!("{}", message);
                result.warnings.push(message);
                return Ok(());
            }
        };

        for dist in distributions {
            if !admit(filter, result, &dist.package_name) {
                continue;
            }

            let (extracted, metadata_source) =
                extract_python_licenses(&dist.package_path, &dist.metadata, &dist.license_paths);
            record_licenses(
                result,
                dist.package_name,
                dist.package_path,
                DependencySource::PythonEnvironment,
                metadata_source,
                extracted,
            );
        }
        Ok(())
    }

    async fn collect_from_registry(
        &self,
        pinned: &[PinnedDependency],
        options: &AuditOptions,
        filter: &PackageFilter,
        result: &mut EcosystemLicenses,
    ) -> Result<()> {
        let client = PypiClient::new(&options.registry)?;
        let fetched = map_with_concurrency(pinned, options.registry.concurrency, |dep| {
            client.fetch_metadata(&dep.requirement.normalized_name, &dep.requirement.version)
        })
        .await;

        for (dep, metadata) in pinned.iter().zip(fetched) {
            let requirement = &dep.requirement;
            let package_path = requirement.source_file.clone();

            let Some(metadata) = metadata else {
                let message = format!(
                    "Unable to resolve PyPI metadata for {}=={}. Source: {}.",
                    requirement.name,
                    requirement.version,
                    requirement.source_file.display()
                );
                warn!("{}", message);
                result.warnings.push(message);

                let package_name = format!("{}@{}", requirement.name, requirement.version);
                if !admit(filter, result, &package_name) {
                    continue;
                }
                let message = format!(
                    "Manual verification required for {}. \
                     PyPI metadata could not be resolved from lockfile/requirements sources.",
                    package_name
                );
                let extracted = ExtractedLicenses::manual(package_path.clone(), message);
                record_licenses(
                    result,
                    package_name,
                    package_path,
                    dep.source,
                    MetadataSource::PypiJsonApi,
                    extracted,
                );
                continue;
            };

            let package_name = format!("{}@{}", metadata.name, metadata.version);
            if !admit(filter, result, &package_name) {
                continue;
            }

            let extracted = extract_registry_licenses(&package_path, metadata);
            record_licenses(
                result,
                package_name,
                package_path,
                dep.source,
                MetadataSource::PypiJsonApi,
                extracted,
            );
        }
        Ok(())
    }
}

/// Licenses of a registry release, every record tagged as registry-derived.
fn extract_registry_licenses(package_path: &Path, metadata: PypiMetadata) -> ExtractedLicenses {
    let python_metadata = PythonMetadata {
        license_expression: metadata.license_expression.clone(),
        license: metadata.license,
        classifiers: metadata.classifiers,
    };
    let (mut extracted, _) = extract_python_licenses(package_path, &python_metadata, &[]);

    for license in &mut extracted.licenses {
        license.source = LicenseSource::PythonPypiMetadata;
    }
    extracted.licenses = crate::models::dedupe_licenses(extracted.licenses);
    if metadata.license_expression.is_some() {
        extracted.license_expression = metadata.license_expression;
    }
    extracted
}

impl Analyzer for PythonAnalyzer {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Python
    }

    async fn collect(&self, options: &AuditOptions, filter: &PackageFilter) -> Result<EcosystemLicenses> {
        let cwd = &options.cwd;
        let mut result = EcosystemLicenses::default();
        let mut pinned = PinnedSet::default();

        let has_uv_lock = cwd.join("uv.lock").is_file();
        let requirements_files = requirements_files(options);

        if has_uv_lock {
            let export = export_uv_lock(cwd, options.production).await?;
            result.warnings.extend(export.warnings);
            pinned.extend(export.dependencies, DependencySource::UvLock);
        }

        if !requirements_files.is_empty() {
            let parsed = parse_requirements_files(cwd, &requirements_files)?;
            result.warnings.extend(parsed.warnings);
            pinned.extend(parsed.requirements, DependencySource::Requirements);
            self.collect_unsupported(&parsed.unsupported, filter, &mut result);
        }

        if options.production && (!has_uv_lock || !requirements_files.is_empty()) {
            result.warnings.push(PRODUCTION_CAVEAT.to_string());
        }

        if pinned.dependencies.is_empty() {
            info!("No pinned Python dependencies, falling back to environment introspection");
            self.collect_from_environment(options, filter, &mut result).await?;
        } else {
            info!("Resolving {} pinned Python dependencies via PyPI", pinned.dependencies.len());
            self.collect_from_registry(&pinned.dependencies, options, filter, &mut result)
                .await?;
        }

        info!("Collected licenses for {} Python packages", result.licenses.len());
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::models::VerificationStatus;
    use tempfile::TempDir;

    #[test]
    fn test_unsupported_package_names() {
        let guessed = UnsupportedRequirement {
            raw_line: "flask>=2.0".to_string(),
            source_file: PathBuf::from("requirements.txt"),
            package_name: Some("flask".to_string()),
        };
        assert_eq!(unsupported_package_name(&guessed), "flask@unknown");

        let url = UnsupportedRequirement {
            raw_line: "git+https://github.com/org/Repo.git@main#egg=repo".to_string(),
            source_file: PathBuf::from("requirements.txt"),
            package_name: None,
        };
        assert_eq!(
            unsupported_package_name(&url),
            "unresolved-requirement-git+https://github-com/o@unknown"
        );
    }

    #[tokio::test]
    async fn test_pinned_requirements_are_enriched_from_pypi() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/requests/2.31.0/json")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"info": {"name": "requests", "version": "2.31.0", "license": "",
                    "license_expression": "Apache-2.0", "classifiers": []}}"#,
            )
            .create_async()
            .await;
        server
            .mock("GET", "/ghost/0.0.1/json")
            .with_status(404)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("requirements.txt"),
            "requests==2.31.0\nghost==0.0.1\nflask>=2.0\n",
        )
        .unwrap();

        let mut options = AuditOptions::new(dir.path());
        options.registry.base_url = server.url();
        let filter = PackageFilter::new(None, &Config::default()).unwrap();

        let result = PythonAnalyzer::new().collect(&options, &filter).await.unwrap();

        let requests = &result.licenses["python:requests@2.31.0"];
        assert_eq!(requests.metadata_source, MetadataSource::PypiJsonApi);
        assert_eq!(requests.candidate.dependency_source, DependencySource::Requirements);
        assert_eq!(requests.extracted.licenses[0].license_id, "Apache-2.0");
        assert_eq!(requests.extracted.licenses[0].source, LicenseSource::PythonPypiMetadata);
        assert_eq!(requests.extracted.license_expression.as_deref(), Some("Apache-2.0"));

        let ghost = &result.licenses["python:ghost@0.0.1"];
        assert!(ghost
            .extracted
            .manual_verification_message
            .as_deref()
            .unwrap()
            .starts_with("Manual verification required for ghost@0.0.1."));

        let flask = &result.licenses["python:flask@unknown"];
        assert_eq!(flask.extracted.verification_status, VerificationStatus::LicenseFileNotFound);
        assert!(flask.extracted.manual_verification_message.is_some());

        assert!(result
            .warnings
            .iter()
            .any(|w| w.starts_with("Unable to resolve PyPI metadata for ghost==0.0.1.")));
        assert_eq!(
            result.found_package_names.iter().cloned().collect::<Vec<_>>(),
            vec!["flask", "ghost", "requests"]
        );
    }

    #[tokio::test]
    async fn test_overrides_and_filter_apply_to_pinned_dependencies() {
        let server = mockito::Server::new_async().await;
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("requirements.txt"), "six==1.16.0\nattrs==23.1.0\n").unwrap();

        let mut config = Config::default();
        config.overrides.insert("six".to_string(), crate::config::Severity::Off);
        let filter = PackageFilter::new(Some("^six@"), &config).unwrap();
        let mut options = AuditOptions::new(dir.path());
        options.registry.base_url = server.url();

        let result = PythonAnalyzer::new().collect(&options, &filter).await.unwrap();
        assert!(result.licenses.is_empty());
        assert_eq!(result.found_package_names.len(), 1);
        assert!(result.found_package_names.contains("six"));
    }

    #[cfg(unix)]
    fn fake_interpreter(dir: &Path, introspection_output: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("fake-python");
        let script = format!(
            "#!/bin/sh\nif [ \"$1\" = \"--version\" ]; then echo 'Python 3.12.0'; else cat <<'EOF'\n{}\nEOF\nfi\n",
            introspection_output
        );
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_environment_fallback_without_pinned_sources() {
        let dir = TempDir::new().unwrap();
        let site = dir.path().join("site-packages");
        std::fs::create_dir_all(&site).unwrap();
        let output = format!(
            r#"[{{"name": "six", "version": "1.16.0", "packagePath": "{}", "license": "MIT", "classifiers": []}}]"#,
            site.display()
        );

        let mut options = AuditOptions::new(dir.path());
        options.python = Some(fake_interpreter(dir.path(), &output));
        options.production = true;
        let filter = PackageFilter::new(None, &Config::default()).unwrap();

        let result = PythonAnalyzer::new().collect(&options, &filter).await.unwrap();
        let six = &result.licenses["python:six@1.16.0"];
        assert_eq!(six.candidate.dependency_source, DependencySource::PythonEnvironment);
        assert_eq!(six.metadata_source, MetadataSource::LocalMetadata);
        assert_eq!(six.extracted.licenses[0].license_id, "MIT");
        assert_eq!(result.warnings, vec![PRODUCTION_CAVEAT.to_string()]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_broken_introspection_is_a_warning() {
        let dir = TempDir::new().unwrap();
        let mut options = AuditOptions::new(dir.path());
        options.python = Some(fake_interpreter(dir.path(), "not json"));
        let filter = PackageFilter::new(None, &Config::default()).unwrap();

        let result = PythonAnalyzer::new().collect(&options, &filter).await.unwrap();
        assert!(result.licenses.is_empty());
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].starts_with("Python environment introspection failed"));
    }
}
