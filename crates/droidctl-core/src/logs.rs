//! Typed logcat records.

use serde::{Deserialize, Serialize};

/// Logcat priority, expanded from the single-letter threadtime field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogPriority {
    Verbose,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl LogPriority {
    /// Maps a threadtime priority letter (`V`, `D`, `I`, `W`, `E`, `F`).
    pub fn from_letter(letter: &str) -> Option<Self> {
        match letter {
            "V" => Some(LogPriority::Verbose),
            "D" => Some(LogPriority::Debug),
            "I" => Some(LogPriority::Info),
            "W" => Some(LogPriority::Warn),
            "E" => Some(LogPriority::Error),
            "F" => Some(LogPriority::Fatal),
            _ => None,
        }
    }

    /// The letter accepted by logcat filter specs (`*:W`).
    pub fn letter(&self) -> &'static str {
        match self {
            LogPriority::Verbose => "V",
            LogPriority::Debug => "D",
            LogPriority::Info => "I",
            LogPriority::Warn => "W",
            LogPriority::Error => "E",
            LogPriority::Fatal => "F",
        }
    }
}

/// One record parsed from `logcat -v threadtime` output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub pid: u32,
    pub tid: u32,
    pub priority: LogPriority,
    pub tag: String,
    pub message: String,
    /// The package filter the entry was captured under, if any. Logcat
    /// itself does not attribute lines to packages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,
}
