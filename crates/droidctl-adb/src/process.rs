//! One-shot invocation of the bridge tool.
//!
//! Used by the resolver's version probes, device enumeration, exec-out
//! payload capture and the session executor's fallback path. All spawning
//! goes through tokio so callers never block a scheduler thread.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use droidctl_core::{BridgeError, CommandResult, Result};

/// Runs `<tool> [-s <device_id>] <args...>` to completion and captures
/// both output streams as text. Non-zero exit is a `ShellCommandFailed`.
pub(crate) async fn run_tool(
    tool: &Path,
    device_id: &str,
    args: &[&str],
    timeout: Duration,
) -> Result<CommandResult> {
    let output = run_tool_raw(tool, device_id, args, timeout).await?;
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    if output.status.success() {
        Ok(CommandResult::new(stdout, stderr))
    } else {
        Err(BridgeError::ShellCommandFailed {
            device_id: optional_id(device_id),
            reason: format!(
                "{} {} exited with {}: {}",
                tool.display(),
                args.join(" "),
                output.status,
                stderr.trim()
            ),
        })
    }
}

/// Like [`run_tool`] but hands back the raw process output, for binary
/// payloads (screen capture) and callers that inspect the exit status
/// themselves.
pub(crate) async fn run_tool_raw(
    tool: &Path,
    device_id: &str,
    args: &[&str],
    timeout: Duration,
) -> Result<std::process::Output> {
    let mut command = Command::new(tool);
    if !device_id.is_empty() {
        command.arg("-s").arg(device_id);
    }
    command
        .args(args)
        .stdin(Stdio::null())
        .kill_on_drop(true);

    match tokio::time::timeout(timeout, command.output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(BridgeError::ShellCommandFailed {
            device_id: optional_id(device_id),
            reason: format!("failed to run {}: {e}", tool.display()),
        }),
        Err(_) => Err(BridgeError::CommandTimeout {
            device_id: device_id.to_string(),
            command: args.join(" "),
        }),
    }
}

pub(crate) fn optional_id(device_id: &str) -> Option<String> {
    if device_id.is_empty() {
        None
    } else {
        Some(device_id.to_string())
    }
}
