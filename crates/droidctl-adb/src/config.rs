//! Timing and tool configuration for the bridge.

use std::path::PathBuf;
use std::time::Duration;

/// Command the resolver probes before falling back to SDK locations.
pub const DEFAULT_COMMAND: &str = "adb";

/// Per-command deadline on both execution paths.
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Idle time after which a persistent session is reaped.
pub const CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Deadline for the session readiness handshake.
pub const SESSION_INIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Deadline for one `adb version` probe.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Maximum age of a cached device enumeration.
pub const DEVICE_CACHE_TTL: Duration = Duration::from_secs(5);

/// Settle time after enabling `debug_view_attributes` before dumping.
pub const DEBUG_ATTRIBUTES_DELAY: Duration = Duration::from_millis(200);

/// Bridge configuration, threaded explicitly through every component.
///
/// Defaults match the documented timings; tests override individual
/// fields (short TTLs, scripted adb replacements) instead of reaching
/// into global state.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// adb executable name or path handed to the resolver.
    pub adb_command: PathBuf,
    pub command_timeout: Duration,
    pub connection_timeout: Duration,
    pub session_init_timeout: Duration,
    pub probe_timeout: Duration,
    pub device_cache_ttl: Duration,
    pub debug_attributes_delay: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            adb_command: PathBuf::from(DEFAULT_COMMAND),
            command_timeout: COMMAND_TIMEOUT,
            connection_timeout: CONNECTION_TIMEOUT,
            session_init_timeout: SESSION_INIT_TIMEOUT,
            probe_timeout: PROBE_TIMEOUT,
            device_cache_ttl: DEVICE_CACHE_TTL,
            debug_attributes_delay: DEBUG_ATTRIBUTES_DELAY,
        }
    }
}

impl BridgeConfig {
    /// Configuration pointing at a specific adb executable.
    pub fn with_command(command: impl Into<PathBuf>) -> Self {
        Self {
            adb_command: command.into(),
            ..Self::default()
        }
    }
}
