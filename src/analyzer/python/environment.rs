//! Live introspection of the distributions installed for a Python interpreter.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info};

use super::requirements::normalize_python_package_name;
use crate::error::Result;
use crate::license::extractor::PythonMetadata;
use crate::process::run_command;

const INTROSPECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Prints one JSON array describing every distribution visible to the interpreter.
const INTROSPECTION_SCRIPT: &str = r#"
import json
import importlib.metadata as metadata

records = []
for dist in metadata.distributions():
    meta = dist.metadata
    name = meta.get('Name') or meta.get('name')
    version = getattr(dist, 'version', None) or meta.get('Version')
    if not name or not version:
        continue
    classifiers = meta.get_all('Classifier') or []
    license_paths = []
    try:
        for file_item in dist.files or []:
            file_name = str(file_item).lower()
            if 'license' in file_name or 'copying' in file_name or file_name.endswith('notice'):
                try:
                    license_paths.append(str(dist.locate_file(file_item)))
                except Exception:
                    pass
    except Exception:
        pass
    try:
        package_path = str(dist.locate_file(''))
    except Exception:
        package_path = ''
    records.append({
        'name': name,
        'normalizedName': name.lower().replace('_', '-').replace('.', '-'),
        'version': version,
        'packagePath': package_path,
        'licenseExpression': meta.get('License-Expression'),
        'license': meta.get('License'),
        'classifiers': classifiers,
        'licensePaths': license_paths,
    })
print(json.dumps(records))
"#;

/// Serialized record emitted by the introspection script. Snake-case keys are
/// accepted as well.
#[derive(Debug, Deserialize)]
struct DistributionRecord {
    name: Option<String>,
    #[serde(rename = "normalizedName", alias = "normalized_name")]
    normalized_name: Option<String>,
    version: Option<String>,
    #[serde(rename = "packagePath", alias = "package_path")]
    package_path: Option<String>,
    #[serde(rename = "licenseExpression", alias = "license_expression")]
    license_expression: Option<String>,
    license: Option<String>,
    #[serde(default)]
    classifiers: Option<Vec<String>>,
    #[serde(rename = "licensePaths", alias = "license_paths", default)]
    license_paths: Option<Vec<String>>,
}

/// An installed distribution ready for license extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct InstalledDistribution {
    /// `name@version`
    pub package_name: String,
    pub package_path: PathBuf,
    pub metadata: PythonMetadata,
    pub license_paths: Vec<PathBuf>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Parse the introspection script's stdout. Records without a name or a
/// version are dropped.
pub fn parse_distribution_records(stdout: &str) -> Result<Vec<InstalledDistribution>> {
    let records: Vec<DistributionRecord> = serde_json::from_str(stdout.trim())?;

    let distributions = records
        .into_iter()
        .filter_map(|record| {
            let name = non_empty(record.name)?;
            let version = non_empty(record.version)?;
            let normalized_name =
                non_empty(record.normalized_name).unwrap_or_else(|| normalize_python_package_name(&name));
            let package_path = non_empty(record.package_path)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(format!("{}@{}", normalized_name, version)));

            Some(InstalledDistribution {
                package_name: format!("{}@{}", name, version),
                package_path,
                metadata: PythonMetadata {
                    license_expression: non_empty(record.license_expression),
                    license: non_empty(record.license),
                    classifiers: record.classifiers.unwrap_or_default(),
                },
                license_paths: record
                    .license_paths
                    .unwrap_or_default()
                    .into_iter()
                    .map(PathBuf::from)
                    .collect(),
            })
        })
        .collect();

    Ok(distributions)
}

/// Enumerate the distributions installed for `interpreter`.
pub async fn introspect_environment(interpreter: &Path, cwd: &Path) -> Result<Vec<InstalledDistribution>> {
    debug!("Introspecting Python environment of {}", interpreter.display());
    let output = run_command(interpreter, &["-c", INTROSPECTION_SCRIPT], cwd, INTROSPECTION_TIMEOUT).await?;
    let distributions = parse_distribution_records(&output.stdout)?;
    info!("Found {} installed Python distributions", distributions.len());
    Ok(distributions)
}
