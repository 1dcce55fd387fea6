//! Discovery and caching of the adb executable path.

use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use tracing::{debug, info};

use droidctl_core::{BridgeError, Result};

use crate::process::run_tool;

/// Locates the adb executable and memoizes the result.
///
/// The cache lives in the resolver instance (no process-wide static);
/// once set it is never empty until [`ToolResolver::clear_cache`] resets
/// it for tests or environment changes.
pub struct ToolResolver {
    /// Command probed before the filesystem candidates, normally `adb`.
    command: PathBuf,
    cached: RwLock<Option<PathBuf>>,
    probe_timeout: Duration,
}

impl ToolResolver {
    pub fn new(probe_timeout: Duration) -> Self {
        Self::with_command(crate::config::DEFAULT_COMMAND, probe_timeout)
    }

    /// Resolver probing a specific command or path first. Used when the
    /// caller configures an explicit adb location, and by tests pointing
    /// at a scripted replacement.
    pub fn with_command(command: impl Into<PathBuf>, probe_timeout: Duration) -> Self {
        Self {
            command: command.into(),
            cached: RwLock::new(None),
            probe_timeout,
        }
    }

    /// Returns the resolved adb path, probing on first use.
    ///
    /// Probes the configured command as-is (normally resolving through
    /// PATH), then each platform candidate that exists on disk, caching
    /// the first one whose `version` invocation succeeds. No candidate
    /// succeeding is a terminal [`BridgeError::ToolNotFound`].
    pub async fn resolve(&self) -> Result<PathBuf> {
        if let Some(path) = self.cached_path() {
            return Ok(path);
        }

        let command = self.command.clone();
        if self.probe(&command).await {
            self.store(&command);
            return Ok(command);
        }

        for candidate in fallback_candidates() {
            if !candidate.exists() {
                continue;
            }
            if self.probe(&candidate).await {
                self.store(&candidate);
                return Ok(candidate);
            }
        }

        Err(BridgeError::ToolNotFound)
    }

    /// Clears the cached path so the next resolve probes again.
    pub fn clear_cache(&self) {
        let mut guard = self
            .cached
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *guard = None;
    }

    async fn probe(&self, path: &Path) -> bool {
        match run_tool(path, "", &["version"], self.probe_timeout).await {
            Ok(_) => true,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "adb probe failed");
                false
            }
        }
    }

    fn cached_path(&self) -> Option<PathBuf> {
        self.cached
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn store(&self, path: &Path) {
        info!(path = %path.display(), "resolved adb");
        let mut guard = self
            .cached
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *guard = Some(path.to_path_buf());
    }
}

/// Platform-specific SDK install locations, probed in order when the bare
/// command is not on PATH.
fn fallback_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(home) = dirs::home_dir() {
        // macOS
        candidates.push(home.join("Library/Android/sdk/platform-tools/adb"));
        // Windows
        candidates.push(home.join("Android/sdk/platform-tools/adb.exe"));
        // Linux
        candidates.push(home.join("Android/sdk/platform-tools/adb"));
    }
    candidates.push(PathBuf::from("/usr/local/bin/adb"));
    candidates.push(PathBuf::from("/opt/android-sdk/platform-tools/adb"));
    candidates
}
