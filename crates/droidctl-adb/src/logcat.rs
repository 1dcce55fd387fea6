//! Logcat capture and threadtime record parsing.

use std::sync::{Arc, OnceLock};

use regex::Regex;
use tracing::{debug, warn};

use droidctl_core::{LogEntry, LogPriority, Result};

use crate::config::BridgeConfig;
use crate::process::run_tool;
use crate::session::SessionPool;
use crate::tool::ToolResolver;

// threadtime format: MM-DD HH:MM:SS.mmm PID TID P Tag: message
fn threadtime_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(\d{2}-\d{2}\s+\d{2}:\d{2}:\d{2}\.\d{3})\s+(\d+)\s+(\d+)\s+([VDIWEF])\s+([^:]+):\s*(.*)",
        )
        .unwrap()
    })
}

/// Captures and clears device logs.
///
/// Capture is always one-shot: logcat output is unbounded and must not
/// run through the framed session, whose reader would wait on the end
/// marker forever.
pub struct LogInspector {
    tool: Arc<ToolResolver>,
    pool: Arc<SessionPool>,
    config: BridgeConfig,
}

impl LogInspector {
    pub fn new(tool: Arc<ToolResolver>, pool: Arc<SessionPool>, config: BridgeConfig) -> Self {
        Self { tool, pool, config }
    }

    /// The last `max_lines` log records, optionally restricted to a
    /// priority floor and a package.
    ///
    /// Package filtering uses logcat's `--pid=$(pidof <pkg>)` form first;
    /// when that fails (older devices, app not running) the capture is
    /// retried unfiltered and lines are matched against the package name
    /// instead.
    pub async fn logs(
        &self,
        device_id: &str,
        package: Option<&str>,
        max_lines: u32,
        priority: Option<LogPriority>,
    ) -> Result<Vec<LogEntry>> {
        let tool = self.tool.resolve().await?;
        let lines_arg = max_lines.to_string();

        let mut args = vec!["logcat", "-v", "threadtime", "-t", lines_arg.as_str()];
        let priority_arg = priority.map(|p| format!("*:{}", p.letter()));
        if let Some(priority_arg) = priority_arg.as_deref() {
            args.push(priority_arg);
        }
        let pid_arg = package.map(|pkg| format!("--pid=$(pidof {pkg})"));
        if let Some(pid_arg) = pid_arg.as_deref() {
            args.push(pid_arg);
        }

        let output = match run_tool(&tool, device_id, &args, self.config.command_timeout).await {
            Ok(result) => result.stdout,
            Err(e) => match package {
                Some(pkg) => {
                    warn!(device_id, error = %e, "pid-filtered logcat failed, retrying unfiltered");
                    let mut args = vec!["logcat", "-v", "threadtime", "-t", lines_arg.as_str()];
                    if let Some(priority_arg) = priority_arg.as_deref() {
                        args.push(priority_arg);
                    }
                    let result =
                        run_tool(&tool, device_id, &args, self.config.command_timeout).await?;
                    filter_by_package(&result.stdout, pkg)
                }
                None => return Err(e),
            },
        };

        let entries = parse_log_output(&output, package);
        debug!(device_id, count = entries.len(), "captured log records");
        Ok(entries)
    }

    /// Clears the log buffer. Returns whether the clear succeeded.
    pub async fn clear_logs(&self, device_id: &str) -> bool {
        match self.pool.execute(device_id, "logcat -c").await {
            Ok(_) => true,
            Err(e) => {
                warn!(device_id, error = %e, "failed to clear logs");
                false
            }
        }
    }
}

/// Post-filter for the fallback path: keep lines mentioning the package.
fn filter_by_package(output: &str, package: &str) -> String {
    let needle = package.to_lowercase();
    output
        .lines()
        .filter(|line| line.to_lowercase().contains(&needle))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parses threadtime records, silently skipping lines that do not match
/// (logcat prepends `--------- beginning of main` separators).
fn parse_log_output(output: &str, package: Option<&str>) -> Vec<LogEntry> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| parse_log_line(line, package))
        .collect()
}

fn parse_log_line(line: &str, package: Option<&str>) -> Option<LogEntry> {
    let captures = threadtime_regex().captures(line.trim())?;
    Some(LogEntry {
        timestamp: captures.get(1)?.as_str().to_string(),
        pid: captures.get(2)?.as_str().parse().ok()?,
        tid: captures.get(3)?.as_str().parse().ok()?,
        priority: LogPriority::from_letter(captures.get(4)?.as_str())?,
        tag: captures.get(5)?.as_str().trim().to_string(),
        message: captures.get(6)?.as_str().trim().to_string(),
        package: package.map(str::to_string),
    })
}
