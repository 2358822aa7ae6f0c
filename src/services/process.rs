//! Bounded execution of external media tools.

use std::{process::Output, time::Duration};
use thiserror::Error;
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{program}` did not finish within {timeout:?}")]
    TimedOut { program: String, timeout: Duration },
    #[error("`{program}` exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: std::process::ExitStatus,
        stderr: String,
    },
}

/// Run `command` to completion, capturing stdout and stderr.
///
/// The child is killed if the timeout elapses or the calling future is
/// dropped. A non-zero exit is reported as [`ToolError::Failed`].
pub async fn run_with_timeout(
    mut command: Command,
    timeout: Duration,
) -> Result<Output, ToolError> {
    let program = command.as_std().get_program().to_string_lossy().into_owned();
    command.kill_on_drop(true);

    let output = match tokio::time::timeout(timeout, command.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(source)) => return Err(ToolError::Spawn { program, source }),
        Err(_) => return Err(ToolError::TimedOut { program, timeout }),
    };

    if !output.status.success() {
        return Err(ToolError::Failed {
            program,
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(output)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_stdout() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "printf hello"]);
        let out = run_with_timeout(cmd, Duration::from_secs(5)).await.unwrap();
        assert_eq!(out.stdout, b"hello");
    }

    #[tokio::test]
    async fn non_zero_exit_carries_stderr() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo broken >&2; exit 3"]);
        match run_with_timeout(cmd, Duration::from_secs(5)).await {
            Err(ToolError::Failed { stderr, status, .. }) => {
                assert_eq!(stderr, "broken");
                assert_eq!(status.code(), Some(3));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_binary_is_spawn_error() {
        let cmd = Command::new("definitely-not-a-real-binary-7f3a");
        assert!(matches!(
            run_with_timeout(cmd, Duration::from_secs(5)).await,
            Err(ToolError::Spawn { .. })
        ));
    }

    #[tokio::test]
    async fn slow_tool_times_out() {
        let mut cmd = Command::new("sleep");
        cmd.arg("5");
        assert!(matches!(
            run_with_timeout(cmd, Duration::from_millis(100)).await,
            Err(ToolError::TimedOut { .. })
        ));
    }
}
