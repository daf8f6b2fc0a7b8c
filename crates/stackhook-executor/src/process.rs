//! Bounded-time execution of external tools.

use std::process::{Output, Stdio};
use std::time::Duration;

use stackhook_core::Error;
use tokio::process::Command;
use tracing::debug;

/// Failure to run an external tool to successful completion.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` failed (exit code {code:?}): {output}")]
    Failed {
        command: String,
        code: Option<i32>,
        output: String,
    },

    #[error("`{command}` timed out after {}s", .after.as_secs())]
    Timeout { command: String, after: Duration },
}

impl ProcessError {
    /// Replace every occurrence of `secret` in captured output.
    pub fn redact(self, secret: Option<&str>) -> Self {
        match (self, secret) {
            (ProcessError::Failed { command, code, output }, Some(secret))
                if !secret.is_empty() =>
            {
                ProcessError::Failed {
                    command,
                    code,
                    output: output.replace(secret, "[REDACTED]"),
                }
            }
            (other, _) => other,
        }
    }

    /// Map into the domain error, using `wrap` for tool failures.
    pub fn into_error(self, wrap: fn(String) -> Error) -> Error {
        match self {
            ProcessError::Timeout { command, after } => Error::Timeout { command, after },
            other => wrap(other.to_string()),
        }
    }
}

/// Run `command` to completion within `timeout`, capturing its output.
///
/// `label` names the invocation in errors and logs; arguments are never
/// echoed since they may carry credentials. The child is killed if the
/// returned future is dropped or the timeout elapses.
pub async fn run(
    command: &mut Command,
    label: &str,
    timeout: Duration,
) -> Result<Output, ProcessError> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = match tokio::time::timeout(timeout, command.output()).await {
        Ok(result) => result.map_err(|source| ProcessError::Spawn {
            command: label.to_string(),
            source,
        })?,
        Err(_) => {
            return Err(ProcessError::Timeout {
                command: label.to_string(),
                after: timeout,
            });
        }
    };

    let stderr = String::from_utf8_lossy(&output.stderr);
    if !output.status.success() {
        let stdout = String::from_utf8_lossy(&output.stdout);
        let combined = format!("{}\n{}", stdout.trim(), stderr.trim());
        return Err(ProcessError::Failed {
            command: label.to_string(),
            code: output.status.code(),
            output: combined.trim().to_string(),
        });
    }

    if !stderr.trim().is_empty() {
        debug!(command = %label, output = %stderr.trim(), "Tool output");
    }
    Ok(output)
}
