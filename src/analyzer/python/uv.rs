//! `uv.lock` support through `uv export`.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use tracing::{info, warn};

use super::requirements::{strip_comment, ParsedRequirement, RequirementPatterns};
use crate::error::Result;
use crate::process::run_command;

const UV_EXPORT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Default)]
pub struct UvExport {
    pub dependencies: Vec<ParsedRequirement>,
    pub warnings: Vec<String>,
}

/// Join backslash-continued lines; blank lines end a logical line.
fn fold_continuation_lines(output: &str) -> Vec<String> {
    let mut folded = Vec::new();
    let mut buffer = String::new();

    for raw in output.lines() {
        let line = raw.trim();
        if line.is_empty() {
            if !buffer.is_empty() {
                folded.push(std::mem::take(&mut buffer));
            }
            continue;
        }

        let (segment, continues) = match line.strip_suffix('\\') {
            Some(head) => (head.trim_end(), true),
            None => (line, false),
        };
        if !buffer.is_empty() {
            buffer.push(' ');
        }
        buffer.push_str(segment);

        if !continues {
            folded.push(std::mem::take(&mut buffer));
        }
    }

    if !buffer.is_empty() {
        folded.push(buffer);
    }
    folded
}

/// Parse the `requirements.txt`-format output of `uv export`.
///
/// `--` directives such as `--index-url` are skipped and `--hash=` fragments
/// dropped. Every other line that is not an exact pin is reported.
pub fn parse_uv_export_requirements(output: &str, cwd: &Path) -> Result<UvExport> {
    let patterns = RequirementPatterns::new()?;
    let source_file = cwd.join("uv.lock");
    let mut export = UvExport::default();
    let mut seen: HashSet<String> = HashSet::new();

    for logical in fold_continuation_lines(output) {
        let line = strip_comment(&logical).trim();
        if line.is_empty() || line.starts_with("--") {
            continue;
        }

        let without_hashes: Vec<&str> = line
            .split_whitespace()
            .filter(|part| !part.starts_with("--hash="))
            .collect();
        let normalized = without_hashes.join(" ");

        let Some((name, version)) = patterns.pinned(&normalized) else {
            export
                .warnings
                .push(format!("Unsupported uv export requirement line: {}", line));
            continue;
        };

        let requirement = ParsedRequirement::new(name, version, source_file.clone());
        if seen.insert(requirement.key()) {
            export.dependencies.push(requirement);
        }
    }

    Ok(export)
}

/// Run `uv export` in `cwd` and parse its output. A failed or timed-out
/// export becomes a warning with no dependencies.
pub async fn export_uv_lock(cwd: &Path, production: bool) -> Result<UvExport> {
    let mut args = vec!["export", "--frozen", "--format", "requirements.txt"];
    if production {
        args.push("--no-dev");
    }

    match run_command("uv", &args, cwd, UV_EXPORT_TIMEOUT).await {
        Ok(output) => {
            let export = parse_uv_export_requirements(&output.stdout, cwd)?;
            info!("uv export produced {} pinned requirements", export.dependencies.len());
            Ok(export)
        }
        Err(e) => {
            let message = format!(
                "uv.lock detected but uv export failed. {} \
                 Install uv or pass --requirements / --python to select another source.",
                e
            );
            warn!("{}", message);
            Ok(UvExport {
                dependencies: Vec::new(),
                warnings: vec![message],
            })
        }
    }
}
