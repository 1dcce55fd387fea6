//! UI-tree and activity inspection.
//!
//! The dump itself goes over `exec-out`, which streams the payload from
//! the device without the persistent shell in between; large XML
//! documents routinely corrupt when squeezed through the framed session.
//! Everything else (debug settings, dumpsys queries) runs through the
//! session pool.

use std::sync::{Arc, OnceLock};

use regex::Regex;
use tracing::{debug, warn};

use droidctl_core::{BridgeError, CurrentActivity, Result, UiHierarchy, WindowInfo};
use droidctl_dump::{extract_xml, parse_hierarchy};

use crate::config::BridgeConfig;
use crate::process::run_tool_raw;
use crate::session::SessionPool;
use crate::tool::ToolResolver;

const UI_DUMP_COMMAND: &str = "uiautomator dump /dev/tty";
const ENABLE_DEBUG_ATTRIBUTES: &str = "settings put global debug_view_attributes 1";
const DISABLE_DEBUG_ATTRIBUTES: &str = "settings delete global debug_view_attributes";

const WINDOW_FOCUS_COMMAND: &str =
    "dumpsys window | grep -E \"mCurrentFocus|mFocusedApp\" | head -5";
const ACTIVITY_COMMAND: &str =
    "dumpsys activity activities | grep -A2 -B1 \"topResumedActivity\\|packageName=\\|processName=\" | head -10";

fn current_focus_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"mCurrentFocus=Window\{[^}]*\s+u\d+\s+([^/\s]+)/([^}\s]+)").unwrap()
    })
}

fn focused_app_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"mFocusedApp=.*\s+([^/\s]+)/\.?([^}\s]+)").unwrap())
}

fn pid_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"pid=(\d+)").unwrap())
}

/// Inspects the on-screen view tree and foreground activity of a device.
pub struct UiInspector {
    tool: Arc<ToolResolver>,
    pool: Arc<SessionPool>,
    config: BridgeConfig,
}

impl UiInspector {
    pub fn new(tool: Arc<ToolResolver>, pool: Arc<SessionPool>, config: BridgeConfig) -> Self {
        Self { tool, pool, config }
    }

    /// Captures and parses the current UI hierarchy.
    pub async fn view_hierarchy(&self, device_id: &str) -> Result<UiHierarchy> {
        let xml = self.dump_ui(device_id).await?;
        parse_hierarchy(&xml, device_id)
    }

    /// Like [`UiInspector::view_hierarchy`] but with the enhanced view
    /// attributes the framework only emits while `debug_view_attributes`
    /// is set.
    ///
    /// The setting is enabled for the duration of the dump and removed
    /// again by a fire-and-forget task; a failed removal is logged and
    /// never reaches the caller, whose hierarchy is already complete.
    pub async fn view_attributes(&self, device_id: &str) -> Result<UiHierarchy> {
        self.pool
            .execute(device_id, ENABLE_DEBUG_ATTRIBUTES)
            .await?;
        tokio::time::sleep(self.config.debug_attributes_delay).await;

        let dump = self.dump_ui(device_id).await;

        let pool = self.pool.clone();
        let device = device_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = pool.execute(&device, DISABLE_DEBUG_ATTRIBUTES).await {
                warn!(device_id = %device, error = %e, "failed to clear debug_view_attributes");
            }
        });

        parse_hierarchy(&dump?, device_id)
    }

    /// The foreground activity, or `None` when it cannot be determined.
    ///
    /// Both dumpsys queries run concurrently through the session pool.
    /// This is informational: any failure along the way degrades to
    /// `None` instead of an error.
    pub async fn current_activity(&self, device_id: &str) -> Result<Option<CurrentActivity>> {
        let (window, activity) = tokio::join!(
            self.pool.execute(device_id, WINDOW_FOCUS_COMMAND),
            self.pool.execute(device_id, ACTIVITY_COMMAND),
        );

        let window_output = match window {
            Ok(result) => result.stdout,
            Err(e) => {
                debug!(device_id, error = %e, "dumpsys window query failed");
                return Ok(None);
            }
        };
        let activity_output = activity.map(|r| r.stdout).unwrap_or_default();

        Ok(parse_current_activity(&window_output, &activity_output))
    }

    /// Raw PNG bytes of the current screen contents.
    pub async fn screenshot(&self, device_id: &str) -> Result<Vec<u8>> {
        let tool = self.tool.resolve().await?;
        let output = run_tool_raw(
            &tool,
            device_id,
            &["exec-out", "screencap", "-p"],
            self.config.command_timeout,
        )
        .await?;

        if !output.status.success() {
            return Err(BridgeError::ShellCommandFailed {
                device_id: Some(device_id.to_string()),
                reason: format!(
                    "screencap exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        Ok(output.stdout)
    }

    /// Runs the uiautomator dump over `exec-out` and recovers the XML
    /// payload from the noisy output.
    async fn dump_ui(&self, device_id: &str) -> Result<String> {
        let tool = self.tool.resolve().await?;
        let output = run_tool_raw(
            &tool,
            device_id,
            &["exec-out", UI_DUMP_COMMAND],
            self.config.command_timeout,
        )
        .await?;

        if !output.status.success() {
            return Err(BridgeError::DumpFailed {
                device_id: device_id.to_string(),
                reason: format!(
                    "uiautomator dump exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        let raw = String::from_utf8_lossy(&output.stdout);
        let xml = extract_xml(&raw);
        if xml.is_empty() {
            return Err(BridgeError::DumpFailed {
                device_id: device_id.to_string(),
                reason: "no UI hierarchy data in dump output".to_string(),
            });
        }
        debug!(device_id, bytes = xml.len(), "captured UI dump");
        Ok(xml)
    }
}

/// Parses dumpsys output into the foreground activity. `mCurrentFocus`
/// is tried first; `mFocusedApp` is the fallback for transitional states
/// (keyguard, app switching) where no window holds focus.
fn parse_current_activity(
    window_output: &str,
    activity_output: &str,
) -> Option<CurrentActivity> {
    if let Some(captures) = current_focus_regex().captures(window_output) {
        return Some(CurrentActivity {
            package: captures.get(1)?.as_str().to_string(),
            activity: captures.get(2)?.as_str().to_string(),
            pid: extract_pid(activity_output),
            window: window_info(window_output),
        });
    }

    let captures = focused_app_regex().captures(window_output)?;
    let package = captures.get(1)?.as_str().to_string();
    let activity = captures.get(2)?.as_str();
    let activity = if activity.starts_with('.') {
        activity.to_string()
    } else {
        format!(".{activity}")
    };

    Some(CurrentActivity {
        package,
        activity,
        pid: None,
        window: WindowInfo {
            focused: true,
            visible: true,
            has_input_focus: true,
        },
    })
}

fn extract_pid(activity_output: &str) -> Option<i32> {
    pid_regex()
        .captures(activity_output)
        .and_then(|captures| captures.get(1))
        .and_then(|pid| pid.as_str().parse().ok())
}

fn window_info(window_output: &str) -> WindowInfo {
    WindowInfo {
        focused: window_output.contains("mCurrentFocus"),
        visible: !window_output.contains("NOT_VISIBLE"),
        has_input_focus: window_output.contains("mFocusedApp"),
    }
}
