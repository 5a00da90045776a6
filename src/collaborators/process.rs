//! Subprocess helper shared by the local collaborators

use crate::collaborators::CollaboratorError;
use std::path::Path;
use std::process::Output;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Run a program to completion, capturing stdout/stderr
///
/// Non-zero exit is returned as `Ok(output)`; callers decide whether that is a failure.
pub async fn run_command(
    program: &str,
    args: &[&str],
    cwd: Option<&Path>,
    envs: &[(&str, String)],
    timeout_secs: u64,
) -> Result<Output, CollaboratorError> {
    debug!("Spawning {} {:?}", program, args);

    let mut command = Command::new(program);
    command.args(args).kill_on_drop(true);
    if let Some(dir) = cwd {
        command.current_dir(dir);
    }
    for (key, value) in envs {
        command.env(key, value);
    }

    let output = timeout(Duration::from_secs(timeout_secs), command.output())
        .await
        .map_err(|_| CollaboratorError::Timeout {
            program: program.to_string(),
            secs: timeout_secs,
        })?
        .map_err(|e| CollaboratorError::Spawn {
            program: program.to_string(),
            reason: e.to_string(),
        })?;

    debug!(
        "{} exited with {:?} ({} bytes stdout)",
        program,
        output.status.code(),
        output.stdout.len()
    );
    Ok(output)
}

/// Run a program and require a zero exit status
pub async fn run_checked(
    program: &str,
    args: &[&str],
    cwd: Option<&Path>,
    timeout_secs: u64,
) -> Result<Vec<u8>, CollaboratorError> {
    let output = run_command(program, args, cwd, &[], timeout_secs).await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let exit_code = output.status.code().unwrap_or(-1);
        warn!("{} exited with code {}: {}", program, exit_code, stderr.trim());
        return Err(CollaboratorError::Exit {
            program: program.to_string(),
            exit_code,
            stderr: stderr.trim().to_string(),
        });
    }

    Ok(output.stdout)
}

/// Run a program and decode its stdout as trimmed UTF-8
pub async fn run_text(
    program: &str,
    args: &[&str],
    cwd: Option<&Path>,
    timeout_secs: u64,
) -> Result<String, CollaboratorError> {
    let stdout = run_checked(program, args, cwd, timeout_secs).await?;
    String::from_utf8(stdout)
        .map(|s| s.trim().to_string())
        .map_err(|e| CollaboratorError::Internal(format!("Failed to decode {} output: {}", program, e)))
}
