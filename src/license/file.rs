//! License detection from license-file content.
//!
//! A file whose heading names a license (or which consists of a bare SPDX id)
//! is a certain match. A file that only contains characteristic clauses of a
//! license is a keyword match and needs a human to confirm it.

use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::Result;
use crate::license::spdx::find_license_by_id;
use crate::models::{dedupe_licenses, ExtractedLicenses, LicenseRecord, LicenseSource, VerificationStatus};

const LICENSE_FILE_PREFIXES: [&str; 3] = ["license", "licence", "copying"];

/// How far into the file a heading is looked for.
const HEADING_WINDOW: usize = 400;

/// Headings that identify a license unambiguously. Each entry is
/// `(id, phrases)`; all phrases must appear in the heading window.
const HEADINGS: &[(&str, &[&str])] = &[
    ("AGPL-3.0-only", &["gnu affero general public license", "version 3"]),
    ("LGPL-3.0-only", &["gnu lesser general public license", "version 3"]),
    ("LGPL-2.1-only", &["gnu lesser general public license", "version 2.1"]),
    ("GPL-3.0-only", &["gnu general public license", "version 3"]),
    ("GPL-2.0-only", &["gnu general public license", "version 2"]),
    ("Apache-2.0", &["apache license", "version 2.0"]),
    ("MPL-2.0", &["mozilla public license", "version 2.0"]),
    ("BSD-3-Clause", &["bsd 3-clause license"]),
    ("BSD-2-Clause", &["bsd 2-clause license"]),
    ("0BSD", &["bsd zero clause license"]),
    ("ISC", &["isc license"]),
    ("MIT", &["mit license"]),
    ("BlueOak-1.0.0", &["blue oak model license", "version 1.0.0"]),
    ("CC0-1.0", &["cc0 1.0 universal"]),
    ("Unlicense", &["this is free and unencumbered software released into the public domain"]),
    ("Zlib", &["zlib license"]),
];

/// Characteristic clauses. All phrases must appear; none of `excluded` may.
struct KeywordRule {
    id: &'static str,
    phrases: &'static [&'static str],
    excluded: &'static [&'static str],
}

const KEYWORDS: &[KeywordRule] = &[
    KeywordRule {
        id: "MIT",
        phrases: &["permission is hereby granted, free of charge, to any person obtaining a copy"],
        excluded: &[],
    },
    KeywordRule {
        id: "ISC",
        phrases: &["permission to use, copy, modify, and/or distribute this software for any purpose"],
        excluded: &[],
    },
    KeywordRule {
        id: "BSD-3-Clause",
        phrases: &["redistributions of source code must retain", "neither the name of"],
        excluded: &[],
    },
    KeywordRule {
        id: "BSD-2-Clause",
        phrases: &["redistributions of source code must retain", "redistributions in binary form"],
        excluded: &["neither the name of"],
    },
    KeywordRule {
        id: "Apache-2.0",
        phrases: &["licensed under the apache license, version 2.0"],
        excluded: &[],
    },
    KeywordRule {
        id: "GPL-3.0-only",
        phrases: &["gnu general public license", "version 3"],
        excluded: &["lesser general public license", "affero general public license"],
    },
    KeywordRule {
        id: "GPL-2.0-only",
        phrases: &["gnu general public license", "version 2"],
        excluded: &["lesser general public license", "affero general public license", "version 3"],
    },
];

/// Whether `file_name` looks like a license file.
pub fn is_license_file_name(file_name: &str) -> bool {
    let lower = file_name.to_lowercase();
    LICENSE_FILE_PREFIXES.iter().any(|p| lower.starts_with(p))
}

/// License files directly inside `package_dir`, sorted by name.
pub fn find_license_files(package_dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(package_dir) else {
        return Vec::new();
    };

    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter(|e| is_license_file_name(&e.file_name().to_string_lossy()))
        .map(|e| e.path())
        .collect();
    files.sort();
    files
}

/// Detect licenses in a single file's content.
pub fn detect_licenses_in_text(content: &str) -> Vec<LicenseRecord> {
    let normalized = normalize_text(content);
    if normalized.is_empty() {
        return Vec::new();
    }

    // A file holding nothing but an SPDX id (some packages ship `LICENSE` = "MIT").
    let first_line = content.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("");
    if let Some(known) = find_license_by_id(first_line) {
        if content.trim() == first_line {
            return vec![known.record(LicenseSource::LicenseFileContent)];
        }
    }

    let heading: String = normalized.chars().take(HEADING_WINDOW).collect();
    for (id, phrases) in HEADINGS {
        if phrases.iter().all(|p| heading.contains(p)) {
            if let Some(known) = find_license_by_id(id) {
                return vec![known.record(LicenseSource::LicenseFileContent)];
            }
        }
    }

    let found: Vec<LicenseRecord> = KEYWORDS
        .iter()
        .filter(|rule| rule.phrases.iter().all(|p| normalized.contains(p)))
        .filter(|rule| !rule.excluded.iter().any(|p| normalized.contains(p)))
        .filter_map(|rule| find_license_by_id(rule.id))
        .map(|known| known.record(LicenseSource::LicenseFileContentKeywords))
        .collect();

    found
}

/// Read a license file and detect the licenses it contains.
pub fn find_license_in_license_file(path: &Path) -> Result<Vec<LicenseRecord>> {
    let bytes = std::fs::read(path)?;
    Ok(detect_licenses_in_text(&String::from_utf8_lossy(&bytes)))
}

/// Scan the given license files and derive a verification status.
///
/// `fallback_path` is reported as the license path when there are no files.
pub fn scan_license_files(files: &[PathBuf], fallback_path: &Path) -> ExtractedLicenses {
    if files.is_empty() {
        return ExtractedLicenses {
            licenses: Vec::new(),
            license_paths: vec![fallback_path.to_path_buf()],
            license_expression: None,
            verification_status: VerificationStatus::LicenseFileNotFound,
            manual_verification_message: None,
        };
    }

    let mut found = Vec::new();
    let mut uncertain_files = 0;

    for file in files {
        // An unreadable file counts as uncertain.
        let licenses = match find_license_in_license_file(file) {
            Ok(licenses) => licenses,
            Err(e) => {
                warn!("Cannot read license file {}: {}", file.display(), e);
                Vec::new()
            }
        };
        if licenses.is_empty()
            || licenses
                .iter()
                .any(|l| l.source == LicenseSource::LicenseFileContentKeywords)
        {
            uncertain_files += 1;
        }
        found.extend(licenses);
    }

    let verification_status = if found.is_empty() {
        VerificationStatus::LicenseFileExistsButUnknownLicense
    } else if uncertain_files > 0 {
        VerificationStatus::LicenseFilesExistButSomeAreUncertain
    } else {
        VerificationStatus::Ok
    };

    ExtractedLicenses {
        licenses: dedupe_licenses(found),
        license_paths: files.to_vec(),
        license_expression: None,
        verification_status,
        manual_verification_message: None,
    }
}

fn normalize_text(content: &str) -> String {
    content
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
