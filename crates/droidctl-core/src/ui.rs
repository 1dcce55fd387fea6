//! Typed view of the UI hierarchy dumped by uiautomator.
//!
//! The tree is immutable after parsing; child order equals document order
//! in the dump. Serde field names follow the XML attribute names so a
//! serialized node round-trips the wire vocabulary.

use serde::{Deserialize, Serialize};

/// Screen-space rectangle from a `bounds="[L,T][R,B]"` attribute.
///
/// Width, height, center and area are derived, not stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    pub fn center_x(&self) -> i32 {
        self.left + self.width() / 2
    }

    pub fn center_y(&self) -> i32 {
        self.top + self.height() / 2
    }

    pub fn area(&self) -> i32 {
        self.width() * self.height()
    }

    /// Whether the point lies inside these bounds (edges inclusive).
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.left && x <= self.right && y >= self.top && y <= self.bottom
    }

    /// Whether the rectangle covers no area.
    pub fn is_empty(&self) -> bool {
        self.width() <= 0 || self.height() <= 0
    }
}

/// One node of the dumped view tree.
///
/// `class` and `package` are mandatory in the wire format and kept even
/// when empty; the free-text attributes (`text`, `resource-id`,
/// `content-desc` and the enhanced set) treat an empty string as absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UiNode {
    #[serde(rename = "class")]
    pub class_name: String,
    #[serde(rename = "package")]
    pub package_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(rename = "resource-id", default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    #[serde(rename = "content-desc", default, skip_serializing_if = "Option::is_none")]
    pub content_desc: Option<String>,
    pub checkable: bool,
    pub checked: bool,
    pub clickable: bool,
    pub enabled: bool,
    pub focusable: bool,
    pub focused: bool,
    pub scrollable: bool,
    #[serde(rename = "long-clickable")]
    pub long_clickable: bool,
    pub password: bool,
    pub selected: bool,
    pub visible: bool,
    pub bounds: Rect,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<UiNode>,
    // Enhanced attributes, present when debug_view_attributes is enabled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub displayed: Option<bool>,
    #[serde(rename = "nav-bar", default, skip_serializing_if = "Option::is_none")]
    pub nav_bar: Option<bool>,
    #[serde(rename = "status-bar", default, skip_serializing_if = "Option::is_none")]
    pub status_bar: Option<bool>,
    #[serde(rename = "view-tag", default, skip_serializing_if = "Option::is_none")]
    pub view_tag: Option<String>,
    #[serde(rename = "view-id-name", default, skip_serializing_if = "Option::is_none")]
    pub view_id_name: Option<String>,
    #[serde(rename = "layout-params", default, skip_serializing_if = "Option::is_none")]
    pub layout_params: Option<String>,
}

/// A parsed UI dump snapshot for one device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiHierarchy {
    pub device: String,
    pub timestamp: String,
    pub rotation: i32,
    pub root: UiNode,
}

/// Foreground activity information from `dumpsys window`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentActivity {
    pub package: String,
    pub activity: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<i32>,
    pub window: WindowInfo,
}

/// Window focus flags from `dumpsys window` output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowInfo {
    pub focused: bool,
    pub visible: bool,
    pub has_input_focus: bool,
}
