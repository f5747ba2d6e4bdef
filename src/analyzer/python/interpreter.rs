use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{AuditError, Result};
use crate::process::run_command;

const PROBE_TIMEOUT: Duration = Duration::from_secs(8);

fn local_venv_interpreter(cwd: &Path) -> PathBuf {
    if cfg!(windows) {
        cwd.join(".venv").join("Scripts").join("python.exe")
    } else {
        cwd.join(".venv").join("bin").join("python")
    }
}

/// Interpreters to probe, in order: the explicit override, the project's
/// `.venv` interpreter when present, then `python3` and `python` from `PATH`.
pub fn interpreter_candidates(cwd: &Path, explicit: Option<&Path>) -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(path) = explicit {
        candidates.push(path.to_path_buf());
    }

    let venv = local_venv_interpreter(cwd);
    if venv.exists() {
        candidates.push(venv);
    }

    candidates.push(PathBuf::from("python3"));
    candidates.push(PathBuf::from("python"));
    candidates
}

/// First candidate that answers `--version`.
pub async fn resolve_python_interpreter(cwd: &Path, explicit: Option<&Path>) -> Result<PathBuf> {
    for candidate in interpreter_candidates(cwd, explicit) {
        match run_command(&candidate, &["--version"], cwd, PROBE_TIMEOUT).await {
            Ok(output) => {
                let version = if output.stdout.trim().is_empty() {
                    output.stderr.trim().to_string()
                } else {
                    output.stdout.trim().to_string()
                };
                info!("Using Python interpreter {} ({})", candidate.display(), version);
                return Ok(candidate);
            }
            Err(e) => debug!("Python candidate {} rejected: {}", candidate.display(), e),
        }
    }

    Err(AuditError::PythonInterpreterNotFound)
}
