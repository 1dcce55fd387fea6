//! Bridge error taxonomy following panic-free policy.
//!
//! Every failure that can cross the crate boundary is a [`BridgeError`]
//! variant carrying a stable [`ErrorKind`] plus, where known, the device
//! the operation targeted. Resolution failures (tool path, device id) are
//! fatal for the current request; parse failures are recoverable and must
//! never take the caller down.

use serde::Serialize;
use thiserror::Error;

/// Result type for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Stable machine-readable error kinds, exposed at the boundary so callers
/// can dispatch on failures without string matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    ToolNotFound,
    DeviceNotFound,
    SessionCreationFailed,
    CommandTimeout,
    ConnectionClosed,
    ShellCommandFailed,
    DumpFailed,
    ParseError,
    FallbackFailed,
}

/// Errors raised while driving the adb bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// No adb executable answered a version probe.
    #[error("adb not found in PATH or common SDK locations; install Android platform-tools")]
    ToolNotFound,

    /// Device resolution failed. `device_id` is absent when no connected
    /// device was available at all.
    #[error("device not found{}", id_suffix(device_id))]
    DeviceNotFound { device_id: Option<String> },

    /// The persistent shell session could not be established.
    #[error("failed to create shell session for '{device_id}': {reason}")]
    SessionCreationFailed { device_id: String, reason: String },

    /// The end marker never appeared before the per-command deadline.
    /// The session is left alive; only this command is abandoned.
    #[error("command timed out on '{device_id}': {command}")]
    CommandTimeout { device_id: String, command: String },

    /// The session stream reached end-of-file mid-command. The session is
    /// dead and has been evicted.
    #[error("shell connection closed for '{device_id}'")]
    ConnectionClosed { device_id: String },

    /// Generic execution failure (spawn error, non-zero exit, pipe error).
    #[error("shell command failed{}: {reason}", id_suffix(device_id))]
    ShellCommandFailed {
        device_id: Option<String>,
        reason: String,
    },

    /// The UI dump produced no usable XML payload.
    #[error("UI dump failed on '{device_id}': {reason}")]
    DumpFailed { device_id: String, reason: String },

    /// The dump payload could not be parsed into a hierarchy. Recoverable:
    /// reported to the caller, never fatal for the process.
    #[error("failed to parse UI hierarchy{}: {reason}", id_suffix(device_id))]
    Parse {
        device_id: Option<String>,
        reason: String,
    },

    /// Both the persistent session and the one-shot fallback failed. Keeps
    /// the persistent-path cause observable next to the fallback failure.
    #[error(
        "command '{command}' failed on '{device_id}': {fallback} (persistent session: {persistent})"
    )]
    Fallback {
        device_id: String,
        command: String,
        persistent: Box<BridgeError>,
        fallback: Box<BridgeError>,
    },
}

impl BridgeError {
    /// Stable kind for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            BridgeError::ToolNotFound => ErrorKind::ToolNotFound,
            BridgeError::DeviceNotFound { .. } => ErrorKind::DeviceNotFound,
            BridgeError::SessionCreationFailed { .. } => ErrorKind::SessionCreationFailed,
            BridgeError::CommandTimeout { .. } => ErrorKind::CommandTimeout,
            BridgeError::ConnectionClosed { .. } => ErrorKind::ConnectionClosed,
            BridgeError::ShellCommandFailed { .. } => ErrorKind::ShellCommandFailed,
            BridgeError::DumpFailed { .. } => ErrorKind::DumpFailed,
            BridgeError::Parse { .. } => ErrorKind::ParseError,
            BridgeError::Fallback { .. } => ErrorKind::FallbackFailed,
        }
    }

    /// The device this error relates to, when one is known.
    pub fn device_id(&self) -> Option<&str> {
        match self {
            BridgeError::ToolNotFound => None,
            BridgeError::DeviceNotFound { device_id } => device_id.as_deref(),
            BridgeError::SessionCreationFailed { device_id, .. }
            | BridgeError::CommandTimeout { device_id, .. }
            | BridgeError::ConnectionClosed { device_id }
            | BridgeError::DumpFailed { device_id, .. }
            | BridgeError::Fallback { device_id, .. } => Some(device_id),
            BridgeError::ShellCommandFailed { device_id, .. }
            | BridgeError::Parse { device_id, .. } => device_id.as_deref(),
        }
    }
}

fn id_suffix(device_id: &Option<String>) -> String {
    match device_id {
        Some(id) => format!(" on '{id}'"),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_is_stable_per_variant() {
        let err = BridgeError::CommandTimeout {
            device_id: "emulator-5554".to_string(),
            command: "input tap 1 2".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::CommandTimeout);

        let err = BridgeError::Parse {
            device_id: None,
            reason: "truncated".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::ParseError);
    }

    #[test]
    fn test_device_id_extraction() {
        let err = BridgeError::ConnectionClosed {
            device_id: "emulator-5554".to_string(),
        };
        assert_eq!(err.device_id(), Some("emulator-5554"));

        assert_eq!(BridgeError::ToolNotFound.device_id(), None);

        let err = BridgeError::DeviceNotFound { device_id: None };
        assert_eq!(err.device_id(), None);
    }

    #[test]
    fn test_fallback_display_keeps_both_causes() {
        let err = BridgeError::Fallback {
            device_id: "emulator-5554".to_string(),
            command: "echo hi".to_string(),
            persistent: Box::new(BridgeError::ConnectionClosed {
                device_id: "emulator-5554".to_string(),
            }),
            fallback: Box::new(BridgeError::ShellCommandFailed {
                device_id: Some("emulator-5554".to_string()),
                reason: "exit code 1".to_string(),
            }),
        };
        let message = err.to_string();
        assert!(message.contains("connection closed"), "message: {message}");
        assert!(message.contains("exit code 1"), "message: {message}");
    }

    #[test]
    fn test_error_kind_serializes_screaming_snake() {
        let json = serde_json::to_string(&ErrorKind::CommandTimeout).unwrap();
        assert_eq!(json, "\"COMMAND_TIMEOUT\"");
    }
}
