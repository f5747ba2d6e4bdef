use std::collections::{BTreeMap, BTreeSet};

use crate::config::Config;
use crate::models::{
    DetectedLicense, GroupedByStatus, LicenseRecord, LicenseStatus, PackageIssue, PackageLicenses,
    VerificationStatus,
};

/// Outcome of classifying every extracted package.
#[derive(Debug, Default)]
pub struct Classification {
    pub grouped_by_status: GroupedByStatus,
    pub not_found: BTreeMap<String, PackageIssue>,
    pub needs_user_verification: BTreeMap<String, PackageIssue>,
}

/// Route every package into a status group, `not_found`, or
/// `needs_user_verification`.
///
/// Precedence per package:
/// 1. A manual-verification message, or a license-file verification status that
///    needs a human, routes the package to `needs_user_verification` only.
/// 2. No licenses at all routes it to `not_found`.
/// 3. Some but not all ids whitelisted flags it for verification *and* lets it
///    continue, so a blacklisted id still shows up in the blacklist group.
/// 4. Status: blacklist if any id is blacklisted, whitelist if every id is
///    whitelisted, unknown otherwise.
pub fn map_licenses_to_status(
    licenses: &BTreeMap<String, PackageLicenses>,
    config: &Config,
) -> Classification {
    let mut result = Classification::default();
    for status in LicenseStatus::ALL {
        result.grouped_by_status.insert(status, Vec::new());
    }

    for (key, package) in licenses {
        let candidate = &package.candidate;
        let extracted = &package.extracted;
        let issue = |message: String| PackageIssue {
            package_name: candidate.name.clone(),
            package_path: candidate.resolved_path.clone(),
            message,
            ecosystem: candidate.ecosystem,
        };

        if let Some(message) = &extracted.manual_verification_message {
            result
                .needs_user_verification
                .insert(key.clone(), issue(message.clone()));
            continue;
        }

        if extracted.verification_status.needs_verification() {
            let message = verification_message(
                extracted.verification_status,
                &candidate.name,
                &candidate.resolved_path.display().to_string(),
            );
            result.needs_user_verification.insert(key.clone(), issue(message));
            continue;
        }

        if extracted.licenses.is_empty() {
            result.not_found.insert(
                key.clone(),
                issue(format!(
                    "License not found in package metadata or license files in {}",
                    candidate.resolved_path.display()
                )),
            );
            continue;
        }

        if some_but_not_all_whitelisted(&extracted.licenses, config) {
            result.needs_user_verification.insert(
                key.clone(),
                issue(format!(
                    "Some but not all licenses of {} are whitelisted. Verify which license applies in {}",
                    candidate.name,
                    candidate.resolved_path.display()
                )),
            );
        }

        let status = resolve_license_status(&extracted.licenses, config);
        let detected = DetectedLicense {
            package_name: candidate.name.clone(),
            package_path: candidate.resolved_path.clone(),
            status,
            licenses: extracted.licenses.clone(),
            license_expression: extracted.license_expression.clone(),
            license_paths: extracted.license_paths.clone(),
            verification_status: extracted.verification_status,
            ecosystem: candidate.ecosystem,
            dependency_source: candidate.dependency_source,
            metadata_source: package.metadata_source,
        };
        result.grouped_by_status.entry(status).or_default().push(detected);
    }

    result
}

/// Status of a single license id under the policy.
pub fn check_license_status(license_id: &str, config: &Config) -> LicenseStatus {
    if config.is_blacklisted(license_id) {
        LicenseStatus::Blacklist
    } else if config.is_whitelisted(license_id) {
        LicenseStatus::Whitelist
    } else {
        LicenseStatus::Unknown
    }
}

/// Combined status of a package's licenses; any blacklisted id wins.
pub fn resolve_license_status(licenses: &[LicenseRecord], config: &Config) -> LicenseStatus {
    let ids = distinct_ids(licenses);
    let statuses: Vec<LicenseStatus> = ids.iter().map(|id| check_license_status(id, config)).collect();

    if statuses.contains(&LicenseStatus::Blacklist) {
        LicenseStatus::Blacklist
    } else if !statuses.is_empty() && statuses.iter().all(|s| *s == LicenseStatus::Whitelist) {
        LicenseStatus::Whitelist
    } else {
        LicenseStatus::Unknown
    }
}

fn some_but_not_all_whitelisted(licenses: &[LicenseRecord], config: &Config) -> bool {
    let ids = distinct_ids(licenses);
    let whitelisted = ids.iter().filter(|id| config.is_whitelisted(id)).count();
    whitelisted > 0 && whitelisted < ids.len()
}

fn distinct_ids(licenses: &[LicenseRecord]) -> BTreeSet<&str> {
    licenses.iter().map(|l| l.license_id.as_str()).collect()
}

fn verification_message(status: VerificationStatus, package_name: &str, package_path: &str) -> String {
    match status {
        VerificationStatus::LicenseFileExistsButUnknownLicense => format!(
            "License file found for {} but its license could not be recognized. Verify it manually in {}",
            package_name, package_path
        ),
        VerificationStatus::LicenseFilesExistButSomeAreUncertain => format!(
            "License of {} was only inferred from license file wording. Verify it manually in {}",
            package_name, package_path
        ),
        VerificationStatus::Ok | VerificationStatus::LicenseFileNotFound => format!(
            "License of {} needs manual verification in {}",
            package_name, package_path
        ),
    }
}
