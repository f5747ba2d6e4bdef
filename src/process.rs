//! Run an external command with an enforced timeout.
//!
//! Shared by the uv lock export, interpreter probing, and environment
//! introspection. Each call gets exactly one attempt; on timeout the child is
//! killed and the call reports [`CommandError::TimedOut`].

use std::ffi::OsStr;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Captured output of a command that exited successfully.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Failed to run command: {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command timed out after {}s: {command}", .timeout.as_secs_f32())]
    TimedOut { command: String, timeout: Duration },

    #[error("Command failed ({}): {command}{}", code_label(.code), stderr_suffix(.stderr))]
    Failed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
}

fn code_label(code: &Option<i32>) -> String {
    code.map_or_else(|| "signal".to_string(), |c| c.to_string())
}

fn stderr_suffix(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(": {}", trimmed)
    }
}

/// Spawn `program` with `args` in `cwd` and wait at most `timeout` for it.
pub async fn run_command<P, A>(
    program: P,
    args: &[A],
    cwd: &Path,
    timeout: Duration,
) -> Result<CommandOutput, CommandError>
where
    P: AsRef<OsStr>,
    A: AsRef<OsStr>,
{
    let command = describe(program.as_ref(), args);
    debug!("Running `{}` in {}", command, cwd.display());

    let child = Command::new(program.as_ref())
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| CommandError::Spawn {
            command: command.clone(),
            source,
        })?;

    // Dropping the pending future on timeout drops the child, which kills it.
    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result.map_err(|source| CommandError::Spawn {
            command: command.clone(),
            source,
        })?,
        Err(_) => return Err(CommandError::TimedOut { command, timeout }),
    };

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    if !output.status.success() {
        return Err(CommandError::Failed {
            command,
            code: output.status.code(),
            stderr,
        });
    }

    Ok(CommandOutput { stdout, stderr })
}

fn describe<A: AsRef<OsStr>>(program: &OsStr, args: &[A]) -> String {
    let mut parts = vec![program.to_string_lossy().into_owned()];
    parts.extend(args.iter().map(|a| a.as_ref().to_string_lossy().into_owned()));
    parts.join(" ")
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_captures_stdout() {
        let out = run_command("sh", &["-c", "echo hello"], Path::new("."), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(out.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_failure() {
        let err = run_command("sh", &["-c", "echo boom >&2; exit 3"], Path::new("."), Duration::from_secs(5))
            .await
            .unwrap_err();
        match err {
            CommandError::Failed { code, stderr, .. } => {
                assert_eq!(code, Some(3));
                assert!(stderr.contains("boom"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_timeout_kills_child() {
        let err = run_command("sh", &["-c", "sleep 5"], Path::new("."), Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::TimedOut { .. }));
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let err = run_command(
            "definitely-not-a-real-program-4242",
            &["--version"],
            Path::new("."),
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CommandError::Spawn { .. }));
    }
}
