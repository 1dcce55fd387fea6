//! droidctl dump - UI dump wire format handling
//!
//! uiautomator serializes the on-screen view tree as an XML document of
//! nested `node` elements, usually surrounded by prompt noise and status
//! chatter when captured over `exec-out`. This crate recovers the XML
//! payload from raw process output ([`extract_xml`]), parses it into a
//! typed tree ([`parse_hierarchy`]) and runs search predicates over the
//! result ([`find_by_id`], [`find_by_text`], [`find_by_class`]).

pub mod extract;
pub mod parse;

pub use extract::extract_xml;
pub use parse::{find_by_class, find_by_id, find_by_text, parse_hierarchy};
