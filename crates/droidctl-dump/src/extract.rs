//! Recovery of the XML payload from noisy dump output.
//!
//! `adb exec-out uiautomator dump /dev/tty` interleaves the document with
//! shell prompts, progress lines and occasional warnings. Extraction tries
//! three strategies in order and returns an empty string when none finds a
//! usable payload - callers must treat that as a dump failure, not parse
//! an empty document.

use tracing::debug;

const XML_PROLOGUE: &str = "<?xml version='1.0' encoding='UTF-8' standalone='yes' ?>";
const HIERARCHY_CLOSE: &str = "</hierarchy>";

/// Extracts the XML document embedded in raw dump output.
///
/// Strategies, first hit wins:
/// 1. the span from the first `<?xml` to the last `</hierarchy>`;
/// 2. a bare `<hierarchy>...</hierarchy>` span, with a standard prologue
///    synthesized in front;
/// 3. a line-by-line scan for a single line carrying the whole document.
pub fn extract_xml(raw: &str) -> String {
    if let Some(xml) = find_complete_document(raw) {
        return xml;
    }
    if let Some(xml) = find_bare_hierarchy(raw) {
        debug!("dump output missing XML prologue, synthesizing one");
        return xml;
    }
    find_xml_in_lines(raw).unwrap_or_default()
}

fn find_complete_document(raw: &str) -> Option<String> {
    let start = raw.find("<?xml")?;
    let end = raw.rfind(HIERARCHY_CLOSE)?;
    if end < start {
        return None;
    }
    Some(raw[start..end + HIERARCHY_CLOSE.len()].to_string())
}

fn find_bare_hierarchy(raw: &str) -> Option<String> {
    let start = raw.find("<hierarchy")?;
    let end = raw.rfind(HIERARCHY_CLOSE)?;
    if end < start {
        return None;
    }
    let span = &raw[start..end + HIERARCHY_CLOSE.len()];
    Some(format!("{XML_PROLOGUE}{span}"))
}

fn find_xml_in_lines(raw: &str) -> Option<String> {
    for line in raw.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("<?xml") || trimmed.starts_with("<hierarchy") {
            return extract_from_line(trimmed);
        }
    }
    None
}

fn extract_from_line(line: &str) -> Option<String> {
    let end = line.rfind(HIERARCHY_CLOSE)?;
    let span = &line[..end + HIERARCHY_CLOSE.len()];
    if span.starts_with("<?xml") {
        Some(span.to_string())
    } else {
        Some(format!("{XML_PROLOGUE}{span}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_document_from_prompt_noise() {
        let raw = "$ uiautomator dump\n<?xml version='1.0'?><hierarchy rotation=\"0\"><node /></hierarchy>\n$";
        let expected = "<?xml version='1.0'?><hierarchy rotation=\"0\"><node /></hierarchy>";
        assert_eq!(extract_xml(raw), expected);
    }

    #[test]
    fn test_spans_first_prologue_to_last_close() {
        let raw = "junk <?xml version='1.0'?><hierarchy></hierarchy> mid <hierarchy></hierarchy> tail";
        let extracted = extract_xml(raw);
        assert!(extracted.starts_with("<?xml"));
        assert!(extracted.ends_with("</hierarchy>"));
        // greedy: runs through the *last* closing tag
        assert!(extracted.contains("mid"));
    }

    #[test]
    fn test_synthesizes_prologue_for_bare_hierarchy() {
        let raw = "noise\n<hierarchy rotation=\"0\"><node /></hierarchy>\nnoise";
        let extracted = extract_xml(raw);
        assert!(extracted.starts_with("<?xml version='1.0'"));
        assert!(extracted.ends_with("</hierarchy>"));
        assert!(extracted.contains("<hierarchy rotation=\"0\">"));
    }

    #[test]
    fn test_recovers_document_embedded_in_one_line() {
        let raw = "UI hierchary dumped to: /dev/tty\n  <hierarchy rotation=\"0\"><node /></hierarchy>garbage";
        let extracted = extract_xml(raw);
        assert!(extracted.starts_with("<?xml"));
        assert!(extracted.ends_with("</hierarchy>"));
        assert!(!extracted.contains("garbage"));
    }

    #[test]
    fn test_empty_output_yields_empty_payload() {
        assert_eq!(extract_xml(""), "");
        assert_eq!(extract_xml("ERROR: could not get idle state"), "");
        assert_eq!(extract_xml("<?xml version='1.0'?> no close tag"), "");
    }
}
