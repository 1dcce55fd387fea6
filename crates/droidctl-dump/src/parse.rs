//! Streaming parser for the uiautomator XML dump.
//!
//! The dump is a `hierarchy` element whose descendant `node` elements each
//! carry a flat attribute set. Parsing walks the event stream once,
//! keeping an explicit stack of open nodes so arbitrarily deep trees never
//! recurse on the call stack.

use chrono::Utc;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use droidctl_core::{BridgeError, Rect, Result, UiHierarchy, UiNode};

/// Parses a UI dump document into a typed hierarchy snapshot.
///
/// Fails with [`BridgeError::Parse`] on malformed XML or when the document
/// contains no `node` element at all. The error is recoverable and carries
/// the device id for reporting.
pub fn parse_hierarchy(xml: &str, device_id: &str) -> Result<UiHierarchy> {
    let mut reader = Reader::from_str(xml);
    let mut rotation = 0;
    let mut stack: Vec<UiNode> = Vec::new();
    let mut root: Option<UiNode> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) if e.name().as_ref() == b"hierarchy" => {
                rotation = rotation_attribute(e);
            }
            Ok(Event::Start(ref e)) if e.name().as_ref() == b"node" => {
                stack.push(node_from_attributes(e, device_id)?);
            }
            Ok(Event::Empty(ref e)) if e.name().as_ref() == b"node" => {
                let node = node_from_attributes(e, device_id)?;
                attach(&mut stack, &mut root, node);
            }
            Ok(Event::End(ref e)) if e.name().as_ref() == b"node" => {
                if let Some(node) = stack.pop() {
                    attach(&mut stack, &mut root, node);
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(parse_error(
                    device_id,
                    format!("malformed XML at byte {}: {e}", reader.buffer_position()),
                ));
            }
        }
    }

    let root = root.ok_or_else(|| parse_error(device_id, "no root node found in hierarchy"))?;

    Ok(UiHierarchy {
        device: device_id.to_string(),
        timestamp: Utc::now().to_rfc3339(),
        rotation,
        root,
    })
}

/// Attaches a completed node to its parent, or promotes it to tree root
/// when the stack is empty. Only the first top-level node becomes the
/// root; document order is preserved among siblings.
fn attach(stack: &mut Vec<UiNode>, root: &mut Option<UiNode>, node: UiNode) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => {
            if root.is_none() {
                *root = Some(node);
            }
        }
    }
}

fn parse_error(device_id: &str, reason: impl Into<String>) -> BridgeError {
    BridgeError::Parse {
        device_id: Some(device_id.to_string()),
        reason: reason.into(),
    }
}

fn rotation_attribute(element: &BytesStart<'_>) -> i32 {
    element
        .attributes()
        .flatten()
        .find(|attr| attr.key.as_ref() == b"rotation")
        .and_then(|attr| attr.unescape_value().ok())
        .and_then(|value| value.parse().ok())
        .unwrap_or(0)
}

fn node_from_attributes(element: &BytesStart<'_>, device_id: &str) -> Result<UiNode> {
    let mut node = UiNode::default();

    for attr in element.attributes() {
        let attr =
            attr.map_err(|e| parse_error(device_id, format!("malformed attribute: {e}")))?;
        let value = attr
            .unescape_value()
            .map_err(|e| parse_error(device_id, format!("malformed attribute value: {e}")))?
            .into_owned();

        match attr.key.as_ref() {
            b"class" => node.class_name = value,
            b"package" => node.package_name = value,
            b"text" => node.text = non_empty(value),
            b"resource-id" => node.resource_id = non_empty(value),
            b"content-desc" => node.content_desc = non_empty(value),
            b"checkable" => node.checkable = value == "true",
            b"checked" => node.checked = value == "true",
            b"clickable" => node.clickable = value == "true",
            b"enabled" => node.enabled = value == "true",
            b"focusable" => node.focusable = value == "true",
            b"focused" => node.focused = value == "true",
            b"scrollable" => node.scrollable = value == "true",
            b"long-clickable" => node.long_clickable = value == "true",
            b"password" => node.password = value == "true",
            b"selected" => node.selected = value == "true",
            b"visible-to-user" => node.visible = value == "true",
            b"bounds" => node.bounds = parse_bounds(&value),
            b"index" => node.index = value.parse().ok(),
            b"instance" => node.instance = value.parse().ok(),
            b"displayed" => node.displayed = non_empty(value).map(|v| v == "true"),
            b"nav-bar" => node.nav_bar = non_empty(value).map(|v| v == "true"),
            b"status-bar" => node.status_bar = non_empty(value).map(|v| v == "true"),
            b"view-tag" => node.view_tag = non_empty(value),
            b"view-id-name" => node.view_id_name = non_empty(value),
            b"layout-params" => node.layout_params = non_empty(value),
            _ => {}
        }
    }

    Ok(node)
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Parses a `[L,T][R,B]` bounds attribute. Malformed or missing bounds
/// become the all-zero rectangle rather than failing the whole parse.
fn parse_bounds(raw: &str) -> Rect {
    try_parse_bounds(raw).unwrap_or_default()
}

fn try_parse_bounds(raw: &str) -> Option<Rect> {
    let rest = raw.trim().strip_prefix('[')?;
    let (first, rest) = rest.split_once("][")?;
    let second = rest.strip_suffix(']')?;
    let (left, top) = first.split_once(',')?;
    let (right, bottom) = second.split_once(',')?;
    Some(Rect::new(
        left.trim().parse().ok()?,
        top.trim().parse().ok()?,
        right.trim().parse().ok()?,
        bottom.trim().parse().ok()?,
    ))
}

/// Returns every node whose resource id equals `resource_id` exactly, in
/// pre-order traversal sequence.
pub fn find_by_id<'a>(root: &'a UiNode, resource_id: &str) -> Vec<&'a UiNode> {
    find_nodes(root, &|node| {
        node.resource_id.as_deref() == Some(resource_id)
    })
}

/// Returns every node whose text matches, in pre-order traversal sequence.
/// With `exact` the comparison is string equality; otherwise it is
/// case-insensitive substring containment.
pub fn find_by_text<'a>(root: &'a UiNode, text: &str, exact: bool) -> Vec<&'a UiNode> {
    let needle = text.to_lowercase();
    find_nodes(root, &|node| match node.text.as_deref() {
        Some(node_text) if exact => node_text == text,
        Some(node_text) => node_text.to_lowercase().contains(&needle),
        None => false,
    })
}

/// Returns every node whose class name contains `class_name`, in pre-order
/// traversal sequence.
pub fn find_by_class<'a>(root: &'a UiNode, class_name: &str) -> Vec<&'a UiNode> {
    find_nodes(root, &|node| node.class_name.contains(class_name))
}

/// Full depth-first pre-order traversal; never early-exits on first match.
fn find_nodes<'a>(root: &'a UiNode, predicate: &dyn Fn(&UiNode) -> bool) -> Vec<&'a UiNode> {
    let mut matches = Vec::new();
    collect(root, predicate, &mut matches);
    matches
}

fn collect<'a>(
    node: &'a UiNode,
    predicate: &dyn Fn(&UiNode) -> bool,
    matches: &mut Vec<&'a UiNode>,
) {
    if predicate(node) {
        matches.push(node);
    }
    for child in &node.children {
        collect(child, predicate, matches);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version='1.0' encoding='UTF-8' standalone='yes' ?>
<hierarchy rotation="1">
  <node index="0" text="" resource-id="" class="android.widget.FrameLayout" package="com.example.app" content-desc="" checkable="false" checked="false" clickable="false" enabled="true" focusable="false" focused="false" scrollable="false" long-clickable="false" password="false" selected="false" visible-to-user="true" bounds="[0,0][1080,1920]">
    <node index="0" text="Sign in" resource-id="com.example.app:id/sign_in" class="android.widget.Button" package="com.example.app" content-desc="Sign in button" checkable="false" checked="false" clickable="true" enabled="true" focusable="true" focused="false" scrollable="false" long-clickable="true" password="false" selected="false" visible-to-user="true" bounds="[10,20][30,40]" />
    <node index="1" text="sign in help" resource-id="" class="android.widget.TextView" package="com.example.app" content-desc="" checkable="false" checked="false" clickable="false" enabled="true" focusable="false" focused="false" scrollable="false" long-clickable="false" password="false" selected="false" visible-to-user="true" bounds="[0,40][1080,80]" />
  </node>
</hierarchy>"#;

    fn parse_sample() -> UiHierarchy {
        parse_hierarchy(SAMPLE, "test-device").expect("sample parses")
    }

    #[test]
    fn test_parses_root_and_rotation() {
        let hierarchy = parse_sample();
        assert_eq!(hierarchy.device, "test-device");
        assert_eq!(hierarchy.rotation, 1);
        assert_eq!(hierarchy.root.class_name, "android.widget.FrameLayout");
        assert_eq!(hierarchy.root.package_name, "com.example.app");
        assert_eq!(hierarchy.root.children.len(), 2);
    }

    #[test]
    fn test_bounds_round_trip() {
        let hierarchy = parse_sample();
        let button = &hierarchy.root.children[0];
        assert_eq!(button.bounds, Rect::new(10, 20, 30, 40));
        assert_eq!(button.bounds.width(), 20);
        assert_eq!(button.bounds.height(), 20);
        assert_eq!(button.bounds.area(), 400);
    }

    #[test]
    fn test_malformed_bounds_default_to_zero_rect() {
        assert_eq!(parse_bounds("[10,20][30,40]"), Rect::new(10, 20, 30, 40));
        assert_eq!(parse_bounds(""), Rect::default());
        assert_eq!(parse_bounds("[10,20]"), Rect::default());
        assert_eq!(parse_bounds("[a,b][c,d]"), Rect::default());
        assert_eq!(parse_bounds("10,20,30,40"), Rect::default());
    }

    #[test]
    fn test_boolean_attributes_require_literal_true() {
        let hierarchy = parse_sample();
        let button = &hierarchy.root.children[0];
        assert!(button.clickable);
        assert!(button.long_clickable);
        assert!(!button.checkable);
        assert!(button.visible);
    }

    #[test]
    fn test_empty_optional_attributes_are_absent() {
        let hierarchy = parse_sample();
        let root = &hierarchy.root;
        assert_eq!(root.text, None);
        assert_eq!(root.resource_id, None);
        assert_eq!(root.content_desc, None);
        // mandatory attributes keep empty strings rather than becoming None
        let button = &hierarchy.root.children[0];
        assert_eq!(button.text.as_deref(), Some("Sign in"));
        assert_eq!(
            button.resource_id.as_deref(),
            Some("com.example.app:id/sign_in")
        );
    }

    #[test]
    fn test_children_preserve_document_order() {
        let hierarchy = parse_sample();
        assert_eq!(
            hierarchy.root.children[0].class_name,
            "android.widget.Button"
        );
        assert_eq!(
            hierarchy.root.children[1].class_name,
            "android.widget.TextView"
        );
    }

    #[test]
    fn test_missing_root_node_is_parse_error() {
        let err = parse_hierarchy("<hierarchy rotation=\"0\"></hierarchy>", "dev")
            .expect_err("no node element");
        assert_eq!(err.kind(), droidctl_core::ErrorKind::ParseError);
        assert_eq!(err.device_id(), Some("dev"));
    }

    #[test]
    fn test_malformed_xml_is_parse_error() {
        let err = parse_hierarchy("<hierarchy><node class=broken", "dev")
            .expect_err("malformed document");
        assert_eq!(err.kind(), droidctl_core::ErrorKind::ParseError);
    }

    fn leaf(text: &str) -> UiNode {
        UiNode {
            class_name: "android.widget.TextView".to_string(),
            package_name: "com.example.app".to_string(),
            text: Some(text.to_string()),
            ..UiNode::default()
        }
    }

    #[test]
    fn test_search_is_complete_and_pre_order() {
        // matches at mixed depths: root(match) -> [a(match) -> [b(match)], c]
        let mut root = leaf("target one");
        let mut a = leaf("TARGET two");
        a.children.push(leaf("a target three"));
        root.children.push(a);
        root.children.push(leaf("unrelated"));

        let matches = find_by_text(&root, "target", false);
        assert_eq!(matches.len(), 3);
        let texts: Vec<_> = matches.iter().map(|n| n.text.as_deref()).collect();
        assert_eq!(
            texts,
            vec![Some("target one"), Some("TARGET two"), Some("a target three")]
        );
    }

    #[test]
    fn test_find_by_text_exact_mode() {
        let mut root = leaf("Home");
        root.children.push(leaf("Homepage"));

        assert_eq!(find_by_text(&root, "Home", true).len(), 1);
        assert_eq!(find_by_text(&root, "home", true).len(), 0);
        assert_eq!(find_by_text(&root, "home", false).len(), 2);
    }

    #[test]
    fn test_find_by_id_is_exact() {
        let hierarchy = parse_sample();
        let matches = find_by_id(&hierarchy.root, "com.example.app:id/sign_in");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].class_name, "android.widget.Button");
        assert!(find_by_id(&hierarchy.root, "com.example.app:id/sign").is_empty());
    }

    #[test]
    fn test_find_by_class_is_substring() {
        let hierarchy = parse_sample();
        assert_eq!(find_by_class(&hierarchy.root, "Button").len(), 1);
        // every sample class contains "android."
        assert_eq!(find_by_class(&hierarchy.root, "android.").len(), 3);
    }
}
