//! The bridge facade wiring resolver, sessions, registry and inspectors.
//!
//! One [`Bridge`] is constructed at process start and threaded through
//! calls; there is no hidden global state, and [`Bridge::cleanup`] tears
//! everything down explicitly. All public operations take an optional
//! device id that is resolved through the registry: `None` selects the
//! first available device, `Some` is validated against the enumeration.

use std::sync::Arc;
use std::time::Duration;

use droidctl_core::{
    AppInfo, CommandResult, CurrentActivity, DeviceRecord, LogEntry, LogPriority, Result,
    UiHierarchy,
};

use crate::config::BridgeConfig;
use crate::device::DeviceRegistry;
use crate::input::{InputController, IntentSpec};
use crate::logcat::LogInspector;
use crate::session::SessionPool;
use crate::tool::ToolResolver;
use crate::ui::UiInspector;

/// Handle to one adb bridge: resolver, session pool, device registry and
/// the inspectors built on top of them.
pub struct Bridge {
    tool: Arc<ToolResolver>,
    pool: Arc<SessionPool>,
    registry: DeviceRegistry,
    ui: UiInspector,
    input: InputController,
    logs: LogInspector,
}

impl Bridge {
    pub fn new(config: BridgeConfig) -> Self {
        let tool = Arc::new(ToolResolver::with_command(
            config.adb_command.clone(),
            config.probe_timeout,
        ));
        let pool = Arc::new(SessionPool::new(tool.clone(), config.clone()));
        let registry = DeviceRegistry::new(tool.clone(), pool.clone(), &config);
        let ui = UiInspector::new(tool.clone(), pool.clone(), config.clone());
        let input = InputController::new(pool.clone());
        let logs = LogInspector::new(tool.clone(), pool.clone(), config);

        Self {
            tool,
            pool,
            registry,
            ui,
            input,
            logs,
        }
    }

    // ---- devices -------------------------------------------------------

    pub async fn devices(&self) -> Result<Vec<DeviceRecord>> {
        self.registry.get_devices().await
    }

    pub async fn first_available(&self) -> Result<DeviceRecord> {
        self.registry.get_first_available().await
    }

    pub async fn app_list(
        &self,
        device_id: Option<&str>,
        include_system_apps: bool,
    ) -> Result<Vec<AppInfo>> {
        let device = self.registry.resolve_device(device_id).await?;
        self.registry
            .get_app_list(&device, include_system_apps)
            .await
    }

    // ---- shell ---------------------------------------------------------

    /// Runs a shell command on the device through the session pool.
    pub async fn shell(&self, device_id: Option<&str>, command: &str) -> Result<CommandResult> {
        let device = self.registry.resolve_device(device_id).await?;
        self.pool.execute(&device, command).await
    }

    // ---- UI inspection -------------------------------------------------

    pub async fn view_hierarchy(&self, device_id: Option<&str>) -> Result<UiHierarchy> {
        let device = self.registry.resolve_device(device_id).await?;
        self.ui.view_hierarchy(&device).await
    }

    pub async fn view_attributes(&self, device_id: Option<&str>) -> Result<UiHierarchy> {
        let device = self.registry.resolve_device(device_id).await?;
        self.ui.view_attributes(&device).await
    }

    pub async fn current_activity(
        &self,
        device_id: Option<&str>,
    ) -> Result<Option<CurrentActivity>> {
        let device = self.registry.resolve_device(device_id).await?;
        self.ui.current_activity(&device).await
    }

    pub async fn screenshot(&self, device_id: Option<&str>) -> Result<Vec<u8>> {
        let device = self.registry.resolve_device(device_id).await?;
        self.ui.screenshot(&device).await
    }

    // ---- input ---------------------------------------------------------

    pub async fn tap(&self, device_id: Option<&str>, x: i32, y: i32) -> Result<()> {
        let device = self.registry.resolve_device(device_id).await?;
        self.input.tap(&device, x, y).await
    }

    pub async fn long_press(
        &self,
        device_id: Option<&str>,
        x: i32,
        y: i32,
        duration: Option<Duration>,
    ) -> Result<()> {
        let device = self.registry.resolve_device(device_id).await?;
        self.input.long_press(&device, x, y, duration).await
    }

    pub async fn swipe(
        &self,
        device_id: Option<&str>,
        start_x: i32,
        start_y: i32,
        end_x: i32,
        end_y: i32,
        duration: Option<Duration>,
    ) -> Result<()> {
        let device = self.registry.resolve_device(device_id).await?;
        self.input
            .swipe(&device, start_x, start_y, end_x, end_y, duration)
            .await
    }

    pub async fn drag(
        &self,
        device_id: Option<&str>,
        start_x: i32,
        start_y: i32,
        end_x: i32,
        end_y: i32,
        duration: Option<Duration>,
    ) -> Result<()> {
        let device = self.registry.resolve_device(device_id).await?;
        self.input
            .drag(&device, start_x, start_y, end_x, end_y, duration)
            .await
    }

    pub async fn input_text(&self, device_id: Option<&str>, text: &str) -> Result<()> {
        let device = self.registry.resolve_device(device_id).await?;
        self.input.input_text(&device, text).await
    }

    pub async fn key_event(&self, device_id: Option<&str>, key_code: i32) -> Result<()> {
        let device = self.registry.resolve_device(device_id).await?;
        self.input.key_event(&device, key_code).await
    }

    pub async fn start_intent(
        &self,
        device_id: Option<&str>,
        intent: &IntentSpec,
    ) -> Result<CommandResult> {
        let device = self.registry.resolve_device(device_id).await?;
        self.input.start_intent(&device, intent).await
    }

    // ---- logs ----------------------------------------------------------

    pub async fn logs(
        &self,
        device_id: Option<&str>,
        package: Option<&str>,
        max_lines: u32,
        priority: Option<LogPriority>,
    ) -> Result<Vec<LogEntry>> {
        let device = self.registry.resolve_device(device_id).await?;
        self.logs.logs(&device, package, max_lines, priority).await
    }

    pub async fn clear_logs(&self, device_id: Option<&str>) -> Result<bool> {
        let device = self.registry.resolve_device(device_id).await?;
        Ok(self.logs.clear_logs(&device).await)
    }

    // ---- lifecycle -----------------------------------------------------

    /// Drops the tool-path and device-list caches. For tests and for
    /// recovering from environment changes (SDK moved, adb restarted).
    pub fn clear_caches(&self) {
        self.tool.clear_cache();
        self.registry.clear_cache();
    }

    /// Terminates every live shell session. Idempotent; the bridge stays
    /// usable and will open fresh sessions on demand.
    pub async fn cleanup(&self) {
        self.pool.cleanup().await;
    }
}

impl Default for Bridge {
    fn default() -> Self {
        Self::new(BridgeConfig::default())
    }
}
