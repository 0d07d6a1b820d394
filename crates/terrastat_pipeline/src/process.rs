//! External program invocation.

use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use crate::error::TransformError;

/// Longest stderr excerpt kept in an error.
const MAX_STDERR_CHARS: usize = 4000;

/// Run a program to completion and return its stdout.
///
/// Non-zero exit becomes [`TransformError::Failed`] carrying stderr.
pub(crate) async fn run_program(program: &Path, args: &[OsString]) -> Result<String, TransformError> {
    let name = program.display().to_string();
    debug!(program = %name, args = ?args, "Running external program");

    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| TransformError::Spawn {
            program: name.clone(),
            source,
        })?;

    if !output.status.success() {
        return Err(TransformError::Failed {
            program: name,
            status: output.status.to_string(),
            stderr: excerpt(&String::from_utf8_lossy(&output.stderr)),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn excerpt(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.chars().count() <= MAX_STDERR_CHARS {
        return trimmed.to_string();
    }
    let tail: String = trimmed
        .chars()
        .rev()
        .take(MAX_STDERR_CHARS)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("...{}", tail)
}
