use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use anyhow::Result;
use colored::*;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};

use crate::models::{AuditResult, DetectedLicense, LicenseStatus, PackageIssue};

/// Render a colored terminal report.
pub fn render(result: &AuditResult, path: &Path, config_source: &str, verbose: bool, quiet: bool) -> Result<()> {
    let whitelist_count = result.count(LicenseStatus::Whitelist);
    let blacklist_count = result.count(LicenseStatus::Blacklist);
    let unknown_count = result.count(LicenseStatus::Unknown);
    let not_found_count = result.not_found.len();
    let verify_count = result.needs_user_verification.len();
    let error_count = result.error_results.len();

    if quiet {
        println!(
            "Whitelist: {}  Blacklist: {}  Unknown: {}  Not found: {}  Needs verification: {}  Errors: {}",
            whitelist_count.to_string().green(),
            blacklist_count.to_string().red(),
            unknown_count.to_string().yellow(),
            not_found_count.to_string().yellow(),
            verify_count.to_string().yellow(),
            error_count.to_string().red(),
        );
        return Ok(());
    }

    println!("\n {} v{}", "license-auditor".bold(), env!("CARGO_PKG_VERSION"));
    println!(" Auditing: {}", path.display());
    println!(" Policy:   {}\n", config_source);

    let total = whitelist_count + blacklist_count + unknown_count + not_found_count + verify_count + error_count;
    println!(" ┌────────────────────────────────────────────────────┐");
    println!(" │  {:<48} │", "SUMMARY".bold());
    println!(" │  {:<48} │", format!("Total packages     : {}", total));
    println!(
        " │  {:<48} │",
        format!(
            "{}  Whitelist       : {:>4}  {}",
            "✓".green(),
            whitelist_count,
            summarize_licenses(result, LicenseStatus::Whitelist)
        )
    );
    println!(
        " │  {:<48} │",
        format!(
            "{}  Blacklist       : {:>4}  {}",
            "✗".red(),
            blacklist_count,
            summarize_licenses(result, LicenseStatus::Blacklist)
        )
    );
    println!(
        " │  {:<48} │",
        format!(
            "{}  Unknown         : {:>4}  {}",
            "?".yellow(),
            unknown_count,
            summarize_licenses(result, LicenseStatus::Unknown)
        )
    );
    println!(" │  {:<48} │", format!("{}  Not found       : {:>4}", "⚠".yellow(), not_found_count));
    println!(" │  {:<48} │", format!("{}  Verify manually : {:>4}", "⚠".yellow(), verify_count));
    println!(" │  {:<48} │", format!("{}  Errors          : {:>4}", "✗".red(), error_count));
    println!(" └────────────────────────────────────────────────────┘\n");

    if blacklist_count > 0 {
        println!(" {} Packages with blacklisted licenses:\n", "[BLACKLIST]".red().bold());
        render_license_table(result, LicenseStatus::Blacklist);
        println!();
    }

    if unknown_count > 0 {
        println!(" {} Packages with licenses outside the policy:\n", "[UNKNOWN]".yellow().bold());
        render_license_table(result, LicenseStatus::Unknown);
        println!();
    }

    if verify_count > 0 {
        println!(" {} Packages that need manual verification:\n", "[VERIFY]".yellow().bold());
        render_issue_table(&result.needs_user_verification, Color::Yellow);
        println!();
    }

    if not_found_count > 0 {
        println!(" {} Packages without a detectable license:\n", "[NOT FOUND]".yellow().bold());
        render_issue_table(&result.not_found, Color::Yellow);
        println!();
    }

    if error_count > 0 {
        println!(" {} Packages that could not be processed:\n", "[ERROR]".red().bold());
        render_issue_table(&result.error_results, Color::Red);
        println!();
    }

    if verbose && whitelist_count > 0 {
        println!(" {} Whitelisted packages:\n", "[PASS]".green().bold());
        render_license_table(result, LicenseStatus::Whitelist);
        println!();
    }

    if !result.overrides.not_found_overrides.is_empty() {
        println!(
            " {} Overrides that matched no package: {}\n",
            "[OVERRIDES]".yellow().bold(),
            result.overrides.not_found_overrides.join(", ")
        );
    }

    if let Some(warning) = &result.warning {
        for line in warning.lines() {
            println!(" {} {}", "⚠".yellow(), line);
        }
        println!();
    }

    Ok(())
}

fn status_cell(status: LicenseStatus) -> Cell {
    let (label, color) = match status {
        LicenseStatus::Whitelist => ("✓ whitelist", Color::Green),
        LicenseStatus::Blacklist => ("✗ blacklist", Color::Red),
        LicenseStatus::Unknown => ("? unknown", Color::Yellow),
    };
    Cell::new(label).fg(color).set_alignment(CellAlignment::Center)
}

fn license_label(detected: &DetectedLicense) -> String {
    if let Some(expression) = &detected.license_expression {
        return expression.clone();
    }
    let mut ids: Vec<&str> = detected.licenses.iter().map(|l| l.license_id.as_str()).collect();
    ids.dedup();
    ids.join(", ")
}

fn render_license_table(result: &AuditResult, status: LicenseStatus) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Package").add_attribute(Attribute::Bold),
            Cell::new("Ecosystem").add_attribute(Attribute::Bold),
            Cell::new("License").add_attribute(Attribute::Bold),
            Cell::new("Found via").add_attribute(Attribute::Bold),
            Cell::new("Status").add_attribute(Attribute::Bold),
        ]);

    for detected in result.grouped_by_status.get(&status).into_iter().flatten() {
        table.add_row(vec![
            Cell::new(&detected.package_name),
            Cell::new(detected.ecosystem.to_string()),
            Cell::new(license_label(detected)),
            Cell::new(detected.dependency_source.to_string()).fg(Color::DarkGrey),
            status_cell(detected.status),
        ]);
    }

    println!("{}", table);
}

fn render_issue_table(issues: &BTreeMap<String, PackageIssue>, color: Color) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Package").add_attribute(Attribute::Bold),
            Cell::new("Ecosystem").add_attribute(Attribute::Bold),
            Cell::new("Details").add_attribute(Attribute::Bold),
        ]);

    for issue in issues.values() {
        table.add_row(vec![
            Cell::new(&issue.package_name).fg(color),
            Cell::new(issue.ecosystem.to_string()),
            Cell::new(&issue.message),
        ]);
    }

    println!("{}", table);
}

/// Top three license ids of a status group, most frequent first.
fn summarize_licenses(result: &AuditResult, status: LicenseStatus) -> String {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for detected in result.grouped_by_status.get(&status).into_iter().flatten() {
        for license in &detected.licenses {
            *counts.entry(license.license_id.as_str()).or_insert(0) += 1;
        }
    }

    let mut pairs: Vec<(&str, usize)> = counts.into_iter().collect();
    pairs.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));

    let summary: Vec<String> = pairs
        .iter()
        .take(3)
        .map(|(id, count)| format!("{} ({})", id, count))
        .collect();

    if summary.is_empty() {
        String::new()
    } else {
        format!("[{}]", summary.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DependencySource, Ecosystem, LicenseRecord, LicenseSource, MetadataSource, VerificationStatus};
    use std::path::PathBuf;

    fn detected(name: &str, ids: &[&str]) -> DetectedLicense {
        DetectedLicense {
            package_name: name.to_string(),
            package_path: PathBuf::from("/p"),
            status: LicenseStatus::Whitelist,
            licenses: ids
                .iter()
                .map(|id| LicenseRecord {
                    license_id: id.to_string(),
                    source: LicenseSource::PackageJsonLicense,
                    deprecated: false,
                })
                .collect(),
            license_expression: None,
            license_paths: Vec::new(),
            verification_status: VerificationStatus::Ok,
            ecosystem: Ecosystem::Node,
            dependency_source: DependencySource::NodeModules,
            metadata_source: MetadataSource::LocalMetadata,
        }
    }

    #[test]
    fn test_summarize_licenses_top_three() {
        let mut result = AuditResult::default();
        result.grouped_by_status.insert(
            LicenseStatus::Whitelist,
            vec![
                detected("a@1", &["MIT"]),
                detected("b@1", &["MIT"]),
                detected("c@1", &["ISC"]),
                detected("d@1", &["Apache-2.0"]),
                detected("e@1", &["0BSD"]),
            ],
        );
        assert_eq!(
            summarize_licenses(&result, LicenseStatus::Whitelist),
            "[MIT (2), 0BSD (1), Apache-2.0 (1)]"
        );
        assert_eq!(summarize_licenses(&result, LicenseStatus::Blacklist), "");
    }

    #[test]
    fn test_license_label_prefers_expression() {
        let mut d = detected("a@1", &["MIT", "Apache-2.0"]);
        assert_eq!(license_label(&d), "MIT, Apache-2.0");
        d.license_expression = Some("MIT OR Apache-2.0".to_string());
        assert_eq!(license_label(&d), "MIT OR Apache-2.0");
    }
}
