//! Per-package license extraction.
//!
//! Node packages are read from their `package.json`; Python distributions from
//! core metadata (local or registry). Both fall back to license files when the
//! declared metadata yields nothing: Node scans the package directory, Python
//! reads only the files the distribution lists.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::license::expression::parse_license_expression;
use crate::license::file::{find_license_files, scan_license_files};
use crate::license::spdx::{find_license_by_id, licenses_from_classifier};
use crate::models::{
    dedupe_licenses, ExtractedLicenses, LicenseRecord, LicenseSource, MetadataSource,
    VerificationStatus,
};

/// License-relevant fields of a Python distribution's core metadata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PythonMetadata {
    pub license_expression: Option<String>,
    pub license: Option<String>,
    pub classifiers: Vec<String>,
}

/// Licenses declared by a single string: an exact SPDX id or an SPDX expression.
///
/// Returns the records plus the expression text when it had to be parsed as one.
fn licenses_from_declaration(
    value: &str,
    id_source: LicenseSource,
    expression_source: LicenseSource,
) -> (Vec<LicenseRecord>, Option<String>) {
    let value = value.trim();
    if value.is_empty() {
        return (Vec::new(), None);
    }

    if let Some(known) = find_license_by_id(value) {
        return (vec![known.record(id_source)], None);
    }

    match parse_license_expression(value) {
        Some(expr) => (
            expr.license_ids()
                .iter()
                .map(|l| l.record(expression_source))
                .collect(),
            Some(value.to_string()),
        ),
        None => (Vec::new(), None),
    }
}

/// `"MIT"` or `{ "type": "MIT", "url": ... }`.
fn declared_type(value: &Value) -> Option<&str> {
    match value {
        Value::String(s) => Some(s.as_str()),
        Value::Object(map) => map.get("type").and_then(Value::as_str),
        _ => None,
    }
}

/// Extract licenses for an installed Node package.
///
/// Reads `license` (string or legacy object) and the legacy `licenses` array.
/// When none of them resolves to an SPDX id, the package directory is scanned
/// for license files.
pub fn extract_node_licenses(manifest: &Value, package_dir: &Path) -> ExtractedLicenses {
    let mut licenses = Vec::new();
    let mut license_expression = None;

    match manifest.get("license") {
        Some(Value::String(declared)) => {
            let (found, expr) = licenses_from_declaration(
                declared,
                LicenseSource::PackageJsonLicense,
                LicenseSource::PackageJsonLicenseExpression,
            );
            licenses.extend(found);
            license_expression = expr;
        }
        Some(legacy @ Value::Object(_)) => {
            if let Some(declared) = declared_type(legacy) {
                let (found, _) = licenses_from_declaration(
                    declared,
                    LicenseSource::PackageJsonLegacy,
                    LicenseSource::PackageJsonLegacy,
                );
                licenses.extend(found);
            }
        }
        _ => {}
    }

    if let Some(entries) = manifest.get("licenses").and_then(Value::as_array) {
        for declared in entries.iter().filter_map(declared_type) {
            let (found, _) = licenses_from_declaration(
                declared,
                LicenseSource::PackageJsonLicenses,
                LicenseSource::PackageJsonLicenses,
            );
            licenses.extend(found);
        }
    }

    if !licenses.is_empty() {
        return ExtractedLicenses {
            licenses: dedupe_licenses(licenses),
            license_paths: vec![package_dir.join("package.json")],
            license_expression,
            verification_status: VerificationStatus::Ok,
            manual_verification_message: None,
        };
    }

    debug!(
        "No usable license field in {}, scanning license files",
        package_dir.display()
    );
    scan_license_files(&find_license_files(package_dir), package_dir)
}

/// Extract licenses for a Python distribution from its metadata.
///
/// Precedence: `License-Expression`, then the `License` field (only when the
/// expression yielded nothing). License classifiers are always added. License
/// files are consulted only when metadata yielded no license at all, and only
/// the explicit paths are read. `package_path` is never scanned: for an
/// installed distribution it is the shared site-packages root.
pub fn extract_python_licenses(
    package_path: &Path,
    metadata: &PythonMetadata,
    explicit_license_paths: &[PathBuf],
) -> (ExtractedLicenses, MetadataSource) {
    let mut licenses = Vec::new();
    let mut license_expression = None;

    if let Some(expr_text) = metadata.license_expression.as_deref() {
        if let Some(expr) = parse_license_expression(expr_text) {
            licenses.extend(
                expr.license_ids()
                    .iter()
                    .map(|l| l.record(LicenseSource::PythonMetadataLicenseExpression)),
            );
            license_expression = Some(expr_text.trim().to_string());
        }
    }

    if licenses.is_empty() {
        if let Some(field) = metadata.license.as_deref() {
            let (found, expr) = licenses_from_declaration(
                field,
                LicenseSource::PythonMetadataLicenseField,
                LicenseSource::PythonMetadataLicenseField,
            );
            licenses.extend(found);
            if license_expression.is_none() {
                license_expression = expr;
            }
        }
    }

    for classifier in &metadata.classifiers {
        if classifier.trim().to_lowercase().starts_with("license ::") {
            licenses.extend(licenses_from_classifier(classifier));
        }
    }

    if !licenses.is_empty() {
        let extracted = ExtractedLicenses {
            licenses: dedupe_licenses(licenses),
            license_paths: vec![package_path.to_path_buf()],
            license_expression,
            verification_status: VerificationStatus::Ok,
            manual_verification_message: None,
        };
        return (extracted, MetadataSource::LocalMetadata);
    }

    let extracted = scan_license_files(explicit_license_paths, package_path);
    let metadata_source = if extracted.licenses.is_empty() {
        MetadataSource::LocalMetadata
    } else {
        MetadataSource::LicenseFile
    };

    (extracted, metadata_source)
}
