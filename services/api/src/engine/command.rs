//! Runs the external speech tools and captures what they print.

use coach_core::SpeechError;
use std::ffi::OsStr;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

/// Captured output of a finished tool run.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs `program` with `args`, optionally feeding `stdin`, and fails unless
/// it exits successfully within `timeout`. The child is killed if the
/// returned future is dropped.
pub async fn run_tool<I, S>(
    program: &Path,
    args: I,
    stdin: Option<&[u8]>,
    timeout: Duration,
) -> Result<ToolOutput, SpeechError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let name = program.display().to_string();
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .map_err(|e| SpeechError::Service(format!("failed to start {name}: {e}")))?;

    if let Some(input) = stdin {
        if let Some(mut pipe) = child.stdin.take() {
            pipe.write_all(input)
                .await
                .map_err(|e| SpeechError::Service(format!("failed to write to {name}: {e}")))?;
            // Closing stdin lets tools that read to EOF start working.
            drop(pipe);
        }
    }

    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| {
            SpeechError::Service(format!("{name} timed out after {}s", timeout.as_secs()))
        })?
        .map_err(|e| SpeechError::Service(format!("{name} failed: {e}")))?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    if !output.status.success() {
        warn!(tool = %name, status = %output.status, stderr = %stderr.trim(), "Speech tool failed");
        return Err(SpeechError::Service(format!(
            "{name} exited with {}",
            output.status
        )));
    }
    debug!(tool = %name, "Speech tool finished");
    Ok(ToolOutput { stdout, stderr })
}
