//! Persistent shell sessions with marker-framed command execution.
//!
//! Spawning `adb shell` per command costs hundreds of milliseconds; a
//! persistent session amortizes that to one spawn per device. The price
//! is framing: inside a long-lived interactive stream nothing delimits
//! one command's output, so every command is wrapped between two echoed
//! markers unique to that invocation, and everything strictly between the
//! marker lines is that command's stdout.
//!
//! Per-device lifecycle: absent -> initializing -> ready <-> busy -> dead.
//! A dead entry is evicted from the table, never reused. Any failure on
//! the persistent path falls back to exactly one one-shot invocation.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use droidctl_core::{BridgeError, CommandResult, Result};

use crate::config::BridgeConfig;
use crate::process::{optional_id, run_tool};
use crate::tool::ToolResolver;

/// Discriminator appended to marker timestamps so two markers generated
/// within the same clock tick still differ.
static MARKER_SEQ: AtomicU64 = AtomicU64::new(0);

fn unique_marker(prefix: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let seq = MARKER_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}_{nanos}_{seq}")
}

/// Stream half of a session: the pipe ends commands are written to and
/// read back from. Guarded by the session's async mutex so concurrent
/// callers cannot interleave marker streams on the same pipe.
struct SessionInner {
    stdin: ChildStdin,
    lines: Lines<BufReader<ChildStdout>>,
}

/// One persistent `adb shell` process for one device.
struct ShellSession {
    device_id: String,
    /// Process handle, reachable outside the stream mutex so sweeps and
    /// cleanup can kill a session that is mid-command.
    child: std::sync::Mutex<Child>,
    inner: Mutex<SessionInner>,
    alive: AtomicBool,
    last_used: std::sync::Mutex<Instant>,
}

impl ShellSession {
    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    fn mark_dead(&self) {
        self.alive.store(false, Ordering::Release);
    }

    fn touch(&self) {
        let mut guard = self.last_used.lock().unwrap_or_else(PoisonError::into_inner);
        *guard = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        self.last_used
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
    }

    fn kill(&self) {
        self.mark_dead();
        let mut child = self.child.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = child.start_kill();
    }

    fn has_exited(&self) -> bool {
        let mut child = self.child.lock().unwrap_or_else(PoisonError::into_inner);
        matches!(child.try_wait(), Ok(Some(_)))
    }
}

/// Pool of persistent shell sessions keyed by device id.
///
/// At most one live session exists per device id; different devices
/// execute fully concurrently while commands against one device are
/// serialized by that session's mutex.
pub struct SessionPool {
    tool: Arc<ToolResolver>,
    sessions: Mutex<HashMap<String, Arc<ShellSession>>>,
    config: BridgeConfig,
}

impl SessionPool {
    pub fn new(tool: Arc<ToolResolver>, config: BridgeConfig) -> Self {
        Self {
            tool,
            sessions: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Executes a shell command on the device.
    ///
    /// Prefers the persistent session; any error on that path - session
    /// creation included - triggers exactly one transparent retry via
    /// one-shot invocation. When both fail the returned error carries the
    /// persistent-path cause alongside the fallback failure.
    pub async fn execute(&self, device_id: &str, command: &str) -> Result<CommandResult> {
        match self.execute_persistent(device_id, command).await {
            Ok(result) => Ok(result),
            Err(persistent) => {
                warn!(
                    device_id,
                    command,
                    error = %persistent,
                    "persistent shell failed, retrying one-shot"
                );
                match self.execute_oneshot(device_id, command).await {
                    Ok(result) => Ok(result),
                    Err(fallback) => Err(BridgeError::Fallback {
                        device_id: device_id.to_string(),
                        command: command.to_string(),
                        persistent: Box::new(persistent),
                        fallback: Box::new(fallback),
                    }),
                }
            }
        }
    }

    /// Number of live sessions currently pooled.
    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Force-terminates every session and clears the table. Idempotent.
    pub async fn cleanup(&self) {
        let mut table = self.sessions.lock().await;
        if table.is_empty() {
            return;
        }
        info!(count = table.len(), "terminating shell sessions");
        for (_, session) in table.drain() {
            session.kill();
        }
    }

    async fn execute_persistent(&self, device_id: &str, command: &str) -> Result<CommandResult> {
        // A session can die between lookup and lock; retry once with a
        // fresh one rather than recursing unbounded.
        for _ in 0..2 {
            let session = self.get_or_create_session(device_id).await?;
            let mut inner = session.inner.lock().await;

            if !session.is_alive() {
                drop(inner);
                self.evict(device_id, &session).await;
                continue;
            }

            return match self.run_in_session(&session, &mut inner, command).await {
                Ok(result) => {
                    session.touch();
                    Ok(result)
                }
                Err(e) => {
                    if !matches!(e, BridgeError::CommandTimeout { .. }) {
                        // Timeouts leave the session alive for the next
                        // command; everything else kills it.
                        session.mark_dead();
                        drop(inner);
                        self.evict(device_id, &session).await;
                    }
                    Err(e)
                }
            };
        }

        Err(BridgeError::SessionCreationFailed {
            device_id: device_id.to_string(),
            reason: "session died before the command could be issued".to_string(),
        })
    }

    async fn execute_oneshot(&self, device_id: &str, command: &str) -> Result<CommandResult> {
        let tool = self.tool.resolve().await?;
        run_tool(
            &tool,
            device_id,
            &["shell", command],
            self.config.command_timeout,
        )
        .await
    }

    async fn get_or_create_session(&self, device_id: &str) -> Result<Arc<ShellSession>> {
        self.sweep_sessions().await;

        {
            let table = self.sessions.lock().await;
            if let Some(session) = table.get(device_id) {
                if session.is_alive() {
                    debug!(device_id, "reusing shell session");
                    session.touch();
                    return Ok(session.clone());
                }
            }
        }

        // The table lock is not held across session creation so other
        // devices keep executing; a lost creation race is resolved below.
        let session = self.create_session(device_id).await?;

        let mut table = self.sessions.lock().await;
        match table.get(device_id) {
            Some(existing) if existing.is_alive() => {
                debug!(device_id, "lost session creation race, discarding ours");
                session.kill();
                Ok(existing.clone())
            }
            _ => {
                table.insert(device_id.to_string(), session.clone());
                Ok(session)
            }
        }
    }

    /// Evicts the table entry for `device_id` if it still is `session`.
    async fn evict(&self, device_id: &str, session: &Arc<ShellSession>) {
        let mut table = self.sessions.lock().await;
        if let Some(current) = table.get(device_id) {
            if Arc::ptr_eq(current, session) {
                table.remove(device_id);
            }
        }
    }

    /// Removes sessions that are dead, whose process has exited, or that
    /// idled past the connection timeout, force-killing their processes.
    async fn sweep_sessions(&self) {
        let mut table = self.sessions.lock().await;

        let stale: Vec<String> = table
            .iter()
            .filter(|(_, session)| {
                !session.is_alive()
                    || session.has_exited()
                    || session.idle_for() > self.config.connection_timeout
            })
            .map(|(device_id, _)| device_id.clone())
            .collect();

        for device_id in stale {
            if let Some(session) = table.remove(&device_id) {
                info!(device_id = %device_id, "reaping stale shell session");
                session.kill();
            }
        }
    }

    async fn create_session(&self, device_id: &str) -> Result<Arc<ShellSession>> {
        let tool = self.tool.resolve().await?;
        info!(device_id, "creating shell session");

        let mut command = Command::new(&tool);
        if !device_id.is_empty() {
            command.arg("-s").arg(device_id);
        }
        command
            .arg("shell")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        let mut child = command.spawn().map_err(|e| {
            creation_failed(device_id, format!("failed to spawn {}: {e}", tool.display()))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| creation_failed(device_id, "child stdin unavailable"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| creation_failed(device_id, "child stdout unavailable"))?;

        let mut inner = SessionInner {
            stdin,
            lines: BufReader::new(stdout).lines(),
        };

        if let Err(e) = self.wait_for_ready(device_id, &mut inner).await {
            let _ = child.start_kill();
            return Err(e);
        }

        debug!(device_id, "shell session ready");
        Ok(Arc::new(ShellSession {
            device_id: device_id.to_string(),
            child: std::sync::Mutex::new(child),
            inner: Mutex::new(inner),
            alive: AtomicBool::new(true),
            last_used: std::sync::Mutex::new(Instant::now()),
        }))
    }

    /// Readiness handshake: echo a unique sentinel and wait for it to come
    /// back within the init timeout.
    async fn wait_for_ready(&self, device_id: &str, inner: &mut SessionInner) -> Result<()> {
        let sentinel = unique_marker("SESSION_READY");

        write_line(&mut inner.stdin, &format!("echo '{sentinel}'\n"))
            .await
            .map_err(|reason| creation_failed(device_id, reason))?;

        let deadline = Instant::now() + self.config.session_init_timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(creation_failed(device_id, "timed out waiting for shell readiness"));
            }
            match tokio::time::timeout(remaining, inner.lines.next_line()).await {
                Ok(Ok(Some(line))) => {
                    if line.contains(&sentinel) {
                        return Ok(());
                    }
                }
                Ok(Ok(None)) => {
                    return Err(creation_failed(
                        device_id,
                        "shell closed during readiness handshake",
                    ));
                }
                Ok(Err(e)) => {
                    return Err(creation_failed(device_id, format!("handshake read failed: {e}")));
                }
                Err(_) => {
                    return Err(creation_failed(device_id, "timed out waiting for shell readiness"));
                }
            }
        }
    }

    /// Runs one framed command inside the session.
    ///
    /// Lines observed before the start marker are discarded - this is what
    /// skips stale output left behind by a previously timed-out command.
    async fn run_in_session(
        &self,
        session: &ShellSession,
        inner: &mut SessionInner,
        command: &str,
    ) -> Result<CommandResult> {
        let device_id = session.device_id.as_str();
        let start_marker = unique_marker("CMD_START");
        let end_marker = unique_marker("CMD_END");

        let framed = format!("echo '{start_marker}'\n{command}\necho '{end_marker}'\n");
        write_line(&mut inner.stdin, &framed)
            .await
            .map_err(|reason| BridgeError::ShellCommandFailed {
                device_id: optional_id(device_id),
                reason,
            })?;

        let deadline = Instant::now() + self.config.command_timeout;
        let mut output: Vec<String> = Vec::new();
        let mut found_start = false;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(BridgeError::CommandTimeout {
                    device_id: device_id.to_string(),
                    command: command.to_string(),
                });
            }

            let line = match tokio::time::timeout(remaining, inner.lines.next_line()).await {
                Ok(Ok(Some(line))) => line,
                Ok(Ok(None)) => {
                    return Err(BridgeError::ConnectionClosed {
                        device_id: device_id.to_string(),
                    });
                }
                Ok(Err(e)) => {
                    return Err(BridgeError::ShellCommandFailed {
                        device_id: optional_id(device_id),
                        reason: format!("session read failed: {e}"),
                    });
                }
                Err(_) => {
                    return Err(BridgeError::CommandTimeout {
                        device_id: device_id.to_string(),
                        command: command.to_string(),
                    });
                }
            };

            if line.contains(&start_marker) {
                found_start = true;
            } else if line.contains(&end_marker) {
                break;
            } else if found_start {
                output.push(line);
            }
        }

        Ok(CommandResult::new(
            output.join("\n").trim().to_string(),
            String::new(),
        ))
    }
}

async fn write_line(stdin: &mut ChildStdin, text: &str) -> std::result::Result<(), String> {
    stdin
        .write_all(text.as_bytes())
        .await
        .map_err(|e| format!("session write failed: {e}"))?;
    stdin
        .flush()
        .await
        .map_err(|e| format!("session flush failed: {e}"))
}

fn creation_failed(device_id: &str, reason: impl Into<String>) -> BridgeError {
    BridgeError::SessionCreationFailed {
        device_id: device_id.to_string(),
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markers_are_unique() {
        let a = unique_marker("CMD_START");
        let b = unique_marker("CMD_START");
        assert_ne!(a, b);
        assert!(a.starts_with("CMD_START_"));
    }

    #[test]
    fn test_marker_embeds_timestamp_and_sequence() {
        let marker = unique_marker("CMD_END");
        let suffix = marker.trim_start_matches("CMD_END_");
        let mut parts = suffix.split('_');
        assert!(parts.next().is_some_and(|p| p.parse::<u128>().is_ok()));
        assert!(parts.next().is_some_and(|p| p.parse::<u64>().is_ok()));
    }
}
