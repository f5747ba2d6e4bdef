use crate::models::{LicenseRecord, LicenseSource};

/// A known SPDX license identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownLicense {
    pub id: &'static str,
    pub deprecated: bool,
}

impl KnownLicense {
    pub fn record(&self, source: LicenseSource) -> LicenseRecord {
        LicenseRecord {
            license_id: self.id.to_string(),
            source,
            deprecated: self.deprecated,
        }
    }
}

/// Look up an exact (case-sensitive) SPDX license identifier.
pub fn find_license_by_id(id: &str) -> Option<KnownLicense> {
    spdx::license_id(id.trim()).map(|l| KnownLicense {
        id: l.name,
        deprecated: l.is_deprecated(),
    })
}

/// Whether `id` is a known SPDX exception identifier (the right side of `WITH`).
pub fn is_exception_id(id: &str) -> bool {
    spdx::exception_id(id.trim()).is_some()
}

/// Curated mapping of Python trove license classifiers to SPDX ids.
///
/// Keys are lower-cased classifiers. Classifiers that are ambiguous about the
/// version map to every plausible id.
const CLASSIFIER_TO_SPDX: &[(&str, &[&str])] = &[
    ("license :: osi approved :: mit license", &["MIT"]),
    ("license :: osi approved :: mit no attribution license (mit-0)", &["MIT-0"]),
    ("license :: osi approved :: apache software license", &["Apache-2.0"]),
    ("license :: osi approved :: bsd license", &["BSD-3-Clause", "BSD-2-Clause"]),
    ("license :: osi approved :: isc license (iscl)", &["ISC"]),
    ("license :: osi approved :: isc license", &["ISC"]),
    (
        "license :: osi approved :: gnu general public license (gpl)",
        &["GPL-3.0-only", "GPL-2.0-only"],
    ),
    ("license :: osi approved :: gnu general public license v2 (gplv2)", &["GPL-2.0-only"]),
    (
        "license :: osi approved :: gnu general public license v2 or later (gplv2+)",
        &["GPL-2.0-or-later"],
    ),
    ("license :: osi approved :: gnu general public license v3 (gplv3)", &["GPL-3.0-only"]),
    (
        "license :: osi approved :: gnu general public license v3 or later (gplv3+)",
        &["GPL-3.0-or-later"],
    ),
    (
        "license :: osi approved :: gnu lesser general public license v2 (lgplv2)",
        &["LGPL-2.1-only", "LGPL-2.0-only"],
    ),
    (
        "license :: osi approved :: gnu lesser general public license v3 (lgplv3)",
        &["LGPL-3.0-only"],
    ),
    (
        "license :: osi approved :: gnu affero general public license v3",
        &["AGPL-3.0-only"],
    ),
    (
        "license :: osi approved :: mozilla public license 2.0 (mpl 2.0)",
        &["MPL-2.0"],
    ),
    (
        "license :: osi approved :: python software foundation license",
        &["PSF-2.0"],
    ),
    ("license :: osi approved :: the unlicense (unlicense)", &["Unlicense"]),
    ("license :: osi approved :: zlib/libpng license", &["Zlib"]),
    ("license :: osi approved :: eclipse public license 2.0 (epl-2.0)", &["EPL-2.0"]),
    (
        "license :: cc0 1.0 universal (cc0 1.0) public domain dedication",
        &["CC0-1.0"],
    ),
];

/// Map a `License :: ...` classifier to SPDX license records.
///
/// The curated table is consulted first; when the classifier is not in it, each
/// `::`-delimited segment is tried as a literal SPDX id.
pub fn licenses_from_classifier(classifier: &str) -> Vec<LicenseRecord> {
    let normalized = classifier.trim().to_lowercase();

    let mapped: Vec<LicenseRecord> = CLASSIFIER_TO_SPDX
        .iter()
        .filter(|(key, _)| *key == normalized)
        .flat_map(|(_, ids)| ids.iter())
        .filter_map(|id| find_license_by_id(id))
        .map(|l| l.record(LicenseSource::PythonMetadataClassifierMapped))
        .collect();

    if !mapped.is_empty() {
        return mapped;
    }

    classifier
        .split("::")
        .filter_map(|part| find_license_by_id(part.trim()))
        .map(|l| l.record(LicenseSource::PythonMetadataClassifier))
        .collect()
}
