use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Package ecosystem a dependency was discovered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ecosystem {
    Node,
    Python,
}

impl std::fmt::Display for Ecosystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Ecosystem::Node => write!(f, "node"),
            Ecosystem::Python => write!(f, "python"),
        }
    }
}

/// How the pinned version of a dependency was discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DependencySource {
    #[serde(rename = "node_modules")]
    NodeModules,
    #[serde(rename = "python-environment")]
    PythonEnvironment,
    #[serde(rename = "uv-lock")]
    UvLock,
    #[serde(rename = "requirements")]
    Requirements,
}

impl std::fmt::Display for DependencySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DependencySource::NodeModules => write!(f, "node_modules"),
            DependencySource::PythonEnvironment => write!(f, "python-environment"),
            DependencySource::UvLock => write!(f, "uv-lock"),
            DependencySource::Requirements => write!(f, "requirements"),
        }
    }
}

/// Where the license metadata of a dependency was read from.
///
/// Independent of [`DependencySource`]: a requirement pinned by `uv.lock` still
/// has its license read from the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MetadataSource {
    LocalMetadata,
    PypiJsonApi,
    LicenseFile,
}

/// Provenance tag of a single extracted license id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LicenseSource {
    #[serde(rename = "package.json-license")]
    PackageJsonLicense,
    #[serde(rename = "package.json-licenses")]
    PackageJsonLicenses,
    #[serde(rename = "package.json-license-expression")]
    PackageJsonLicenseExpression,
    #[serde(rename = "package.json-legacy")]
    PackageJsonLegacy,
    #[serde(rename = "license-file-content")]
    LicenseFileContent,
    #[serde(rename = "license-file-content-keywords")]
    LicenseFileContentKeywords,
    #[serde(rename = "python-metadata-license-expression")]
    PythonMetadataLicenseExpression,
    #[serde(rename = "python-metadata-license-field")]
    PythonMetadataLicenseField,
    #[serde(rename = "python-metadata-classifier")]
    PythonMetadataClassifier,
    #[serde(rename = "python-metadata-classifier-mapped")]
    PythonMetadataClassifierMapped,
    #[serde(rename = "python-pypi-metadata")]
    PythonPypiMetadata,
}

/// One license id together with where it came from.
///
/// Two records with the same id but different sources are distinct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseRecord {
    pub license_id: String,
    pub source: LicenseSource,
    pub deprecated: bool,
}

impl LicenseRecord {
    fn key(&self) -> (&str, LicenseSource) {
        (&self.license_id, self.source)
    }
}

/// Remove records whose `(license_id, source)` pair was already seen, keeping order.
pub fn dedupe_licenses(licenses: Vec<LicenseRecord>) -> Vec<LicenseRecord> {
    let mut seen: BTreeSet<(String, LicenseSource)> = BTreeSet::new();
    licenses
        .into_iter()
        .filter(|l| {
            let (id, source) = l.key();
            seen.insert((id.to_string(), source))
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VerificationStatus {
    Ok,
    LicenseFileNotFound,
    LicenseFileExistsButUnknownLicense,
    LicenseFilesExistButSomeAreUncertain,
}

impl VerificationStatus {
    /// Statuses that require a human to look at the license files.
    pub fn needs_verification(&self) -> bool {
        matches!(
            self,
            VerificationStatus::LicenseFileExistsButUnknownLicense
                | VerificationStatus::LicenseFilesExistButSomeAreUncertain
        )
    }
}

/// Output of license extraction for one package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedLicenses {
    pub licenses: Vec<LicenseRecord>,
    pub license_paths: Vec<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license_expression: Option<String>,
    pub verification_status: VerificationStatus,
    /// Set when the package must be verified by hand regardless of what was found.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manual_verification_message: Option<String>,
}

impl ExtractedLicenses {
    /// A package for which nothing could be extracted and a human must step in.
    pub fn manual(path: PathBuf, message: String) -> Self {
        Self {
            licenses: Vec::new(),
            license_paths: vec![path],
            license_expression: None,
            verification_status: VerificationStatus::LicenseFileNotFound,
            manual_verification_message: Some(message),
        }
    }
}

/// A resolved dependency discovered during ecosystem resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageCandidate {
    /// `name@version` when the version is known, the bare name otherwise.
    pub name: String,
    pub resolved_path: PathBuf,
    pub ecosystem: Ecosystem,
    pub dependency_source: DependencySource,
}

impl PackageCandidate {
    /// Identity key, unique per audit run: `ecosystem:name[@version]`.
    pub fn identity(&self) -> String {
        result_key(self.ecosystem, &self.name)
    }
}

pub fn result_key(ecosystem: Ecosystem, package_name: &str) -> String {
    format!("{}:{}", ecosystem, package_name)
}

/// Strip a trailing `@version` while keeping a leading npm scope intact.
///
/// `@scope/pkg@1.0.0` → `@scope/pkg`, `requests@2.31.0` → `requests`.
pub fn package_name_without_version(name: &str) -> &str {
    match name.rfind('@') {
        Some(0) | None => name,
        Some(idx) => &name[..idx],
    }
}

/// A candidate enriched with its extracted licenses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageLicenses {
    pub candidate: PackageCandidate,
    pub metadata_source: MetadataSource,
    pub extracted: ExtractedLicenses,
}

/// A package whose extraction failed outright.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageIssue {
    pub package_name: String,
    pub package_path: PathBuf,
    pub message: String,
    pub ecosystem: Ecosystem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LicenseStatus {
    Whitelist,
    Blacklist,
    Unknown,
}

impl LicenseStatus {
    pub const ALL: [LicenseStatus; 3] = [
        LicenseStatus::Whitelist,
        LicenseStatus::Blacklist,
        LicenseStatus::Unknown,
    ];
}

impl std::fmt::Display for LicenseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LicenseStatus::Whitelist => write!(f, "whitelist"),
            LicenseStatus::Blacklist => write!(f, "blacklist"),
            LicenseStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// A classified package.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedLicense {
    pub package_name: String,
    pub package_path: PathBuf,
    pub status: LicenseStatus,
    pub licenses: Vec<LicenseRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license_expression: Option<String>,
    pub license_paths: Vec<PathBuf>,
    pub verification_status: VerificationStatus,
    pub ecosystem: Ecosystem,
    pub dependency_source: DependencySource,
    pub metadata_source: MetadataSource,
}

/// Packages grouped by final status, keyed by status.
pub type GroupedByStatus = BTreeMap<LicenseStatus, Vec<DetectedLicense>>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverridesReport {
    pub not_found_overrides: Vec<String>,
}

/// Aggregate result of one audit run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditResult {
    pub grouped_by_status: GroupedByStatus,
    pub not_found: BTreeMap<String, PackageIssue>,
    pub needs_user_verification: BTreeMap<String, PackageIssue>,
    pub error_results: BTreeMap<String, PackageIssue>,
    pub overrides: OverridesReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl AuditResult {
    pub fn count(&self, status: LicenseStatus) -> usize {
        self.grouped_by_status.get(&status).map_or(0, Vec::len)
    }

    /// Whether the audit should fail: any blacklisted package or extraction
    /// error, plus unknown, missing or unverified licenses in strict mode.
    pub fn fails(&self, strict: bool) -> bool {
        if self.count(LicenseStatus::Blacklist) > 0 || !self.error_results.is_empty() {
            return true;
        }
        strict
            && (self.count(LicenseStatus::Unknown) > 0
                || !self.not_found.is_empty()
                || !self.needs_user_verification.is_empty())
    }
}

/// Licenses and bookkeeping collected for one ecosystem.
#[derive(Debug, Default)]
pub struct EcosystemLicenses {
    pub licenses: BTreeMap<String, PackageLicenses>,
    pub error_results: BTreeMap<String, PackageIssue>,
    pub warnings: Vec<String>,
    /// Bare names (no version) of every package that survived the filter regex.
    pub found_package_names: BTreeSet<String>,
}
