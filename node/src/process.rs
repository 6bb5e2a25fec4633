use crate::executor::{NodeError, NodeResult};
use crate::types::ExecuteResult;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

/// Run a local program to completion, killing it if `limit` elapses first.
pub(crate) async fn run_with_timeout(
    program: &str,
    args: &[String],
    limit: Duration,
    command: &str,
) -> NodeResult<ExecuteResult> {
    let started = Instant::now();

    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| NodeError::SpawnFailed {
            program: program.to_string(),
            reason: e.to_string(),
        })?;

    // Dropping the future on timeout drops the child, which kills it.
    let output = match timeout(limit, child.wait_with_output()).await {
        Ok(output) => output?,
        Err(_) => {
            return Err(NodeError::Timeout {
                command: command.to_string(),
                timeout: limit,
            })
        }
    };

    let exit_code = output.status.code().unwrap_or(-1);
    let elapsed_ms = started.elapsed().as_millis() as u64;
    debug!(
        "'{}' finished with exit code {} in {}ms",
        command, exit_code, elapsed_ms
    );

    Ok(ExecuteResult {
        exit_code,
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        elapsed_ms,
    })
}
