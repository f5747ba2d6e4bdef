//! License identification and policy classification.
//!
//! - [`spdx`]: SPDX id lookup (backed by the `spdx` crate) and the trove
//!   classifier table.
//! - [`expression`]: SPDX expression parser (AND / OR / WITH).
//! - [`file`]: license-file discovery and content matching.
//! - [`extractor`]: per-package extraction for Node manifests and Python metadata.
//! - [`classifier`]: maps extracted licenses to whitelist / blacklist / unknown.

pub mod classifier;
pub mod expression;
pub mod extractor;
pub mod file;
pub mod spdx;
