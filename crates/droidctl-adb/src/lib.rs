//! droidctl adb - the bridge-driving layer
//!
//! Everything that talks to the external `adb` executable lives here:
//! locating the tool ([`ToolResolver`]), persistent marker-framed shell
//! sessions with one-shot fallback ([`SessionPool`]), device enumeration
//! with TTL caching ([`DeviceRegistry`]), and the inspectors and input
//! controller built on top. [`Bridge`] wires them into one handle.

pub mod bridge;
pub mod config;
pub mod device;
pub mod input;
pub mod logcat;
mod process;
pub mod session;
pub mod tool;
pub mod ui;

pub use bridge::Bridge;
pub use config::BridgeConfig;
pub use device::DeviceRegistry;
pub use input::{keycodes, InputController, IntentSpec};
pub use logcat::LogInspector;
pub use session::SessionPool;
pub use tool::ToolResolver;
pub use ui::UiInspector;
