//! droidctl core - shared types for Android device control
//!
//! This crate provides the domain types shared between the adb driving
//! layer (`droidctl-adb`), the UI dump parser (`droidctl-dump`) and the
//! CLI (`droidctl-cli`).
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]` in
//! production paths.

pub mod command;
pub mod device;
pub mod error;
pub mod logs;
pub mod ui;

// Re-exports for convenience
pub use command::CommandResult;
pub use device::{AppInfo, DeviceRecord, DeviceState};
pub use error::{BridgeError, ErrorKind, Result};
pub use logs::{LogEntry, LogPriority};
pub use ui::{CurrentActivity, Rect, UiHierarchy, UiNode, WindowInfo};
