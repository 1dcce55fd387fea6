//! Device input: taps, swipes, text, key events and intent launches.
//!
//! Every gesture maps to one `input` shell command issued through the
//! session pool. Intent launches build an `am start` command line; when a
//! package is given without a class for a MAIN/LAUNCHER intent, the
//! launcher activity is discovered through the package manager first.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use regex::Regex;
use tracing::debug;

use droidctl_core::{CommandResult, Result};

use crate::session::SessionPool;

/// Common Android key codes, as accepted by `input keyevent`.
pub mod keycodes {
    pub const HOME: i32 = 3;
    pub const BACK: i32 = 4;
    pub const DPAD_UP: i32 = 19;
    pub const DPAD_DOWN: i32 = 20;
    pub const DPAD_LEFT: i32 = 21;
    pub const DPAD_RIGHT: i32 = 22;
    pub const DPAD_CENTER: i32 = 23;
    pub const VOLUME_UP: i32 = 24;
    pub const VOLUME_DOWN: i32 = 25;
    pub const POWER: i32 = 26;
    pub const CAMERA: i32 = 27;
    pub const TAB: i32 = 61;
    pub const SPACE: i32 = 62;
    pub const ENTER: i32 = 66;
    pub const DEL: i32 = 67;
    pub const MENU: i32 = 82;
    pub const SEARCH: i32 = 84;
    pub const ESCAPE: i32 = 111;

    /// Looks up a key code by its conventional name, case-insensitive.
    pub fn from_name(name: &str) -> Option<i32> {
        match name.to_ascii_lowercase().as_str() {
            "home" => Some(HOME),
            "back" => Some(BACK),
            "up" | "dpad_up" => Some(DPAD_UP),
            "down" | "dpad_down" => Some(DPAD_DOWN),
            "left" | "dpad_left" => Some(DPAD_LEFT),
            "right" | "dpad_right" => Some(DPAD_RIGHT),
            "center" | "dpad_center" => Some(DPAD_CENTER),
            "volume_up" => Some(VOLUME_UP),
            "volume_down" => Some(VOLUME_DOWN),
            "power" => Some(POWER),
            "camera" => Some(CAMERA),
            "tab" => Some(TAB),
            "space" => Some(SPACE),
            "enter" => Some(ENTER),
            "del" | "delete" => Some(DEL),
            "menu" => Some(MENU),
            "search" => Some(SEARCH),
            "escape" | "esc" => Some(ESCAPE),
            _ => None,
        }
    }
}

const DEFAULT_SWIPE_DURATION: Duration = Duration::from_millis(300);
const DEFAULT_LONG_PRESS_DURATION: Duration = Duration::from_millis(1000);

const MAIN_ACTION: &str = "android.intent.action.MAIN";
const LAUNCHER_CATEGORY: &str = "android.intent.category.LAUNCHER";

fn activity_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"name=(\S+)").unwrap())
}

/// An intent to launch via `am start`.
#[derive(Debug, Clone, Default)]
pub struct IntentSpec {
    pub action: Option<String>,
    pub category: Option<String>,
    pub data_uri: Option<String>,
    pub package: Option<String>,
    pub class_name: Option<String>,
    pub extras: Vec<(String, String)>,
}

impl IntentSpec {
    /// A MAIN/LAUNCHER intent for the given package, the common "open
    /// this app" case.
    pub fn launch(package: impl Into<String>) -> Self {
        Self {
            action: Some(MAIN_ACTION.to_string()),
            category: Some(LAUNCHER_CATEGORY.to_string()),
            package: Some(package.into()),
            ..Self::default()
        }
    }

    /// Whether the launcher activity should be discovered before launch:
    /// a MAIN/LAUNCHER intent naming a package but no class.
    fn needs_activity_discovery(&self) -> bool {
        self.package.is_some()
            && self.class_name.is_none()
            && self.action.as_deref() == Some(MAIN_ACTION)
            && self.category.as_deref() == Some(LAUNCHER_CATEGORY)
    }
}

/// Drives input events on a device through the session pool.
pub struct InputController {
    pool: Arc<SessionPool>,
}

impl InputController {
    pub fn new(pool: Arc<SessionPool>) -> Self {
        Self { pool }
    }

    pub async fn tap(&self, device_id: &str, x: i32, y: i32) -> Result<()> {
        self.pool
            .execute(device_id, &format!("input tap {x} {y}"))
            .await?;
        Ok(())
    }

    /// Long press, implemented as a swipe with equal endpoints.
    pub async fn long_press(
        &self,
        device_id: &str,
        x: i32,
        y: i32,
        duration: Option<Duration>,
    ) -> Result<()> {
        let millis = duration.unwrap_or(DEFAULT_LONG_PRESS_DURATION).as_millis();
        self.pool
            .execute(device_id, &format!("input swipe {x} {y} {x} {y} {millis}"))
            .await?;
        Ok(())
    }

    pub async fn swipe(
        &self,
        device_id: &str,
        start_x: i32,
        start_y: i32,
        end_x: i32,
        end_y: i32,
        duration: Option<Duration>,
    ) -> Result<()> {
        let millis = duration.unwrap_or(DEFAULT_SWIPE_DURATION).as_millis();
        self.pool
            .execute(
                device_id,
                &format!("input swipe {start_x} {start_y} {end_x} {end_y} {millis}"),
            )
            .await?;
        Ok(())
    }

    /// Drag-and-drop: like swipe, but the press is held before moving so
    /// draggable items pick up.
    pub async fn drag(
        &self,
        device_id: &str,
        start_x: i32,
        start_y: i32,
        end_x: i32,
        end_y: i32,
        duration: Option<Duration>,
    ) -> Result<()> {
        let millis = duration.unwrap_or(DEFAULT_SWIPE_DURATION).as_millis();
        self.pool
            .execute(
                device_id,
                &format!("input draganddrop {start_x} {start_y} {end_x} {end_y} {millis}"),
            )
            .await?;
        Ok(())
    }

    /// Types text into the focused element.
    pub async fn input_text(&self, device_id: &str, text: &str) -> Result<()> {
        let escaped = escape_text(text);
        self.pool
            .execute(device_id, &format!("input text '{escaped}'"))
            .await?;
        Ok(())
    }

    pub async fn key_event(&self, device_id: &str, key_code: i32) -> Result<()> {
        self.pool
            .execute(device_id, &format!("input keyevent {key_code}"))
            .await?;
        Ok(())
    }

    /// Launches an intent, returning the `am start` output.
    pub async fn start_intent(
        &self,
        device_id: &str,
        intent: &IntentSpec,
    ) -> Result<CommandResult> {
        let mut intent = intent.clone();
        if intent.needs_activity_discovery() {
            if let Some(package) = intent.package.as_deref() {
                intent.class_name = self.discover_main_activity(device_id, package).await;
            }
        }

        let command = build_intent_command(&intent);
        debug!(device_id, command = %command, "starting intent");
        self.pool.execute(device_id, &command).await
    }

    /// Asks the package manager for the exported MAIN/LAUNCHER activity
    /// of a package. `None` when discovery fails; `am start` can usually
    /// resolve a bare package on its own.
    async fn discover_main_activity(&self, device_id: &str, package: &str) -> Option<String> {
        let command =
            format!("pm resolve-activity -a {MAIN_ACTION} -c {LAUNCHER_CATEGORY} {package}");
        let result = self.pool.execute(device_id, &command).await.ok()?;

        // The name= field is the exported launcher entry; targetActivity
        // may route to a non-exported internal activity.
        let full_name = activity_name_regex()
            .captures(&result.stdout)?
            .get(1)?
            .as_str();

        Some(match full_name.strip_prefix(package) {
            Some(class) if !class.is_empty() => class.to_string(),
            _ => full_name.to_string(),
        })
    }
}

/// Escapes text for `input text`: single quotes are backslashed and
/// spaces become `%s`, which the input service expands back.
fn escape_text(text: &str) -> String {
    text.replace('\'', "\\'").replace(' ', "%s")
}

/// Renders an [`IntentSpec`] as an `am start` command line.
fn build_intent_command(intent: &IntentSpec) -> String {
    let mut command = String::from("am start");

    if let Some(action) = &intent.action {
        command.push_str(&format!(" -a \"{action}\""));
    }
    if let Some(category) = &intent.category {
        command.push_str(&format!(" -c \"{category}\""));
    }
    if let Some(data_uri) = &intent.data_uri {
        command.push_str(&format!(" -d \"{data_uri}\""));
    }
    for (key, value) in &intent.extras {
        command.push_str(&format!(" -e \"{key}\" \"{value}\""));
    }

    match (&intent.package, &intent.class_name) {
        (Some(package), Some(class)) => command.push_str(&format!(" \"{package}/{class}\"")),
        (Some(package), None) => command.push_str(&format!(" \"{package}\"")),
        _ => {}
    }

    command
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_text() {
        assert_eq!(escape_text("hello world"), "hello%sworld");
        assert_eq!(escape_text("it's"), "it\\'s");
        assert_eq!(escape_text("don't stop"), "don\\'t%sstop");
        assert_eq!(escape_text("plain"), "plain");
    }

    #[test]
    fn test_build_intent_command_full() {
        let intent = IntentSpec {
            action: Some("android.intent.action.VIEW".to_string()),
            category: Some("android.intent.category.BROWSABLE".to_string()),
            data_uri: Some("https://example.com".to_string()),
            package: Some("com.example.app".to_string()),
            class_name: Some(".MainActivity".to_string()),
            extras: vec![("key".to_string(), "value".to_string())],
        };
        assert_eq!(
            build_intent_command(&intent),
            "am start -a \"android.intent.action.VIEW\" -c \"android.intent.category.BROWSABLE\" \
             -d \"https://example.com\" -e \"key\" \"value\" \"com.example.app/.MainActivity\""
        );
    }

    #[test]
    fn test_build_intent_command_package_only() {
        let intent = IntentSpec {
            package: Some("com.example.app".to_string()),
            ..IntentSpec::default()
        };
        assert_eq!(build_intent_command(&intent), "am start \"com.example.app\"");
    }

    #[test]
    fn test_launch_intent_needs_discovery() {
        assert!(IntentSpec::launch("com.example.app").needs_activity_discovery());

        let mut with_class = IntentSpec::launch("com.example.app");
        with_class.class_name = Some(".Main".to_string());
        assert!(!with_class.needs_activity_discovery());

        let view = IntentSpec {
            action: Some("android.intent.action.VIEW".to_string()),
            package: Some("com.example.app".to_string()),
            ..IntentSpec::default()
        };
        assert!(!view.needs_activity_discovery());
    }

    #[test]
    fn test_keycode_lookup() {
        assert_eq!(keycodes::from_name("enter"), Some(keycodes::ENTER));
        assert_eq!(keycodes::from_name("BACK"), Some(4));
        assert_eq!(keycodes::from_name("esc"), Some(111));
        assert_eq!(keycodes::from_name("no-such-key"), None);
    }
}
