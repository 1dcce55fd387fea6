//! Command execution results.

use serde::{Deserialize, Serialize};

/// Captured output of one shell command. Value type, no identity.
///
/// On the persistent session path stderr is not separately captured and
/// stays empty; the one-shot path fills both streams.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    pub stdout: String,
    pub stderr: String,
}

impl CommandResult {
    pub fn new(stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }
}
