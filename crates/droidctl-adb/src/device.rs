//! Device enumeration with time-bounded caching.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use droidctl_core::{AppInfo, BridgeError, DeviceRecord, DeviceState, Result};

use crate::config::BridgeConfig;
use crate::process::run_tool;
use crate::session::SessionPool;
use crate::tool::ToolResolver;

struct DeviceCache {
    devices: Vec<DeviceRecord>,
    fetched_at: Instant,
}

/// Enumerates connected devices via `adb devices -l`, caching the list
/// for a short TTL.
///
/// The cache cell is visibility-atomic but not compare-and-swap: two
/// concurrent misses may both enumerate, last write wins. The list is
/// replaced wholesale, never merged.
pub struct DeviceRegistry {
    tool: Arc<ToolResolver>,
    pool: Arc<SessionPool>,
    cache: RwLock<Option<DeviceCache>>,
    ttl: Duration,
    command_timeout: Duration,
}

impl DeviceRegistry {
    pub fn new(tool: Arc<ToolResolver>, pool: Arc<SessionPool>, config: &BridgeConfig) -> Self {
        Self {
            tool,
            pool,
            cache: RwLock::new(None),
            ttl: config.device_cache_ttl,
            command_timeout: config.command_timeout,
        }
    }

    /// Returns the device list, enumerating afresh when the cache is
    /// older than the TTL.
    pub async fn get_devices(&self) -> Result<Vec<DeviceRecord>> {
        if let Some(devices) = self.cached_devices() {
            debug!(count = devices.len(), "returning cached device list");
            return Ok(devices);
        }

        let tool = self.tool.resolve().await?;
        let result = run_tool(&tool, "", &["devices", "-l"], self.command_timeout).await?;
        let devices = parse_device_list(&result.stdout);
        info!(count = devices.len(), "enumerated devices");

        let mut guard = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Some(DeviceCache {
            devices: devices.clone(),
            fetched_at: Instant::now(),
        });

        Ok(devices)
    }

    /// First device in CONNECTED state; [`BridgeError::DeviceNotFound`]
    /// when nothing usable is attached.
    pub async fn get_first_available(&self) -> Result<DeviceRecord> {
        let devices = self.get_devices().await?;
        devices
            .into_iter()
            .find(DeviceRecord::is_connected)
            .ok_or(BridgeError::DeviceNotFound { device_id: None })
    }

    /// Resolves an optional caller-supplied device id: `None` selects the
    /// first available device, `Some` is validated against the current
    /// enumeration.
    pub async fn resolve_device(&self, device_id: Option<&str>) -> Result<String> {
        match device_id {
            None => Ok(self.get_first_available().await?.id),
            Some(id) => {
                let devices = self.get_devices().await?;
                if devices.iter().any(|d| d.id == id) {
                    Ok(id.to_string())
                } else {
                    Err(BridgeError::DeviceNotFound {
                        device_id: Some(id.to_string()),
                    })
                }
            }
        }
    }

    /// Lists installed packages on the device, sorted by name. Never
    /// cached: installs and uninstalls must show up immediately.
    pub async fn get_app_list(
        &self,
        device_id: &str,
        include_system_apps: bool,
    ) -> Result<Vec<AppInfo>> {
        let command = if include_system_apps {
            "pm list packages"
        } else {
            "pm list packages -3"
        };
        let result = self.pool.execute(device_id, command).await?;
        let apps = parse_package_list(&result.stdout);
        debug!(device_id, count = apps.len(), "listed packages");
        Ok(apps)
    }

    /// Drops the cached list so the next call enumerates afresh.
    pub fn clear_cache(&self) {
        let mut guard = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        *guard = None;
    }

    fn cached_devices(&self) -> Option<Vec<DeviceRecord>> {
        let guard = self.cache.read().unwrap_or_else(PoisonError::into_inner);
        guard.as_ref().and_then(|cache| {
            if cache.fetched_at.elapsed() < self.ttl {
                Some(cache.devices.clone())
            } else {
                None
            }
        })
    }
}

/// Parses `adb devices -l` output: header line dropped, one device per
/// remaining non-blank line.
fn parse_device_list(stdout: &str) -> Vec<DeviceRecord> {
    stdout
        .trim()
        .lines()
        .skip(1)
        .filter_map(parse_device_line)
        .collect()
}

fn parse_device_line(line: &str) -> Option<DeviceRecord> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let mut parts = line.split_whitespace();
    let id = parts.next()?.to_string();
    let state = DeviceState::from_token(parts.next()?);
    let model = line
        .split_whitespace()
        .find_map(|token| token.strip_prefix("model:"))
        .map(str::to_string);

    Some(DeviceRecord { id, model, state })
}

/// Parses `pm list packages` output: keep `package:`-prefixed lines,
/// strip the prefix, sort ascending.
pub(crate) fn parse_package_list(stdout: &str) -> Vec<AppInfo> {
    let mut apps: Vec<AppInfo> = stdout
        .lines()
        .filter_map(|line| line.trim().strip_prefix("package:"))
        .filter(|name| !name.is_empty())
        .map(|name| AppInfo {
            package: name.to_string(),
        })
        .collect();
    apps.sort_by(|a, b| a.package.cmp(&b.package));
    apps
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_device_list_drops_header_and_blanks() {
        let output = "List of devices attached\n\
                      emulator-5554\tdevice product:sdk_gphone64 model:sdk_gphone64_x86_64 device:emu64x\n\
                      \n\
                      R58M123ABC\tunauthorized usb:1-1\n";
        let devices = parse_device_list(output);
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].id, "emulator-5554");
        assert_eq!(devices[0].state, DeviceState::Connected);
        assert_eq!(devices[0].model.as_deref(), Some("sdk_gphone64_x86_64"));
        assert_eq!(devices[1].id, "R58M123ABC");
        assert_eq!(devices[1].state, DeviceState::Unauthorized);
        assert_eq!(devices[1].model, None);
    }

    #[test]
    fn test_parse_device_line_unknown_state_is_offline() {
        let record = parse_device_line("emulator-5556 recovery").expect("parses");
        assert_eq!(record.state, DeviceState::Offline);
    }

    #[test]
    fn test_parse_package_list_filters_and_sorts() {
        let output = "package:com.zebra.app\n\
                      junk line\n\
                      package:com.alpha.app\n\
                      package:\n";
        let apps = parse_package_list(output);
        assert_eq!(apps.len(), 2);
        assert_eq!(apps[0].package, "com.alpha.app");
        assert_eq!(apps[1].package, "com.zebra.app");
    }
}
