//! Device records produced by `adb devices -l` enumeration.

use serde::{Deserialize, Serialize};

/// Connection state of an enumerated device.
///
/// The wire tokens come from adb's tabular output. Anything adb prints
/// that we do not recognize maps to [`DeviceState::Offline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceState {
    /// Online and usable (`device` in adb output).
    #[serde(rename = "device")]
    Connected,
    Offline,
    Unauthorized,
}

impl DeviceState {
    /// Maps an adb state token to a state. Unknown tokens are treated as
    /// offline rather than rejected, matching adb's own loose vocabulary.
    pub fn from_token(token: &str) -> Self {
        match token {
            "device" => DeviceState::Connected,
            "unauthorized" => DeviceState::Unauthorized,
            _ => DeviceState::Offline,
        }
    }
}

/// One connected (or half-connected) device, parsed from a single line of
/// enumeration output. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub state: DeviceState,
}

impl DeviceRecord {
    pub fn is_connected(&self) -> bool {
        self.state == DeviceState::Connected
    }
}

/// An installed package, from `pm list packages` output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppInfo {
    pub package: String,
}
