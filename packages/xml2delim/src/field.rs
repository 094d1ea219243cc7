//! Field specifiers: `<path>` or `<path>=<attr>`.

use std::sync::LazyLock;

use regex::Regex;
use roxmltree::Node;

use crate::error::Result;
use crate::select::select;
use crate::xml::{get_attribute, leading_text};

/// Lazy path, then an optional trailing `=word` attribute marker.
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static FIELD_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?s)(.*?)(?:=(\w+))?$").expect("valid regex"));

/// A parsed field specifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    /// Selection path relative to the context node, `.` when omitted.
    pub path: String,
    /// Attribute to read from the first match instead of its text.
    pub attribute: Option<String>,
}

impl FieldSpec {
    /// Split a specifier into path and optional attribute.
    ///
    /// # Examples
    /// ```
    /// use xml2delim::field::FieldSpec;
    ///
    /// let spec = FieldSpec::parse("item=name");
    /// assert_eq!(spec.path, "item");
    /// assert_eq!(spec.attribute.as_deref(), Some("name"));
    ///
    /// assert_eq!(FieldSpec::parse("=id").path, ".");
    /// assert_eq!(FieldSpec::parse("qty").attribute, None);
    /// ```
    #[must_use]
    pub fn parse(spec: &str) -> Self {
        let (path, attribute) = match FIELD_PATTERN.captures(spec) {
            Some(caps) => (
                caps.get(1).map_or("", |m| m.as_str()),
                caps.get(2).map(|m| m.as_str().to_string()),
            ),
            None => (spec, None),
        };

        Self {
            path: if path.is_empty() { "." } else { path }.to_string(),
            attribute,
        }
    }
}

/// Clean an extracted value: absent becomes empty, surrounding whitespace
/// is trimmed when `strip` is set.
#[must_use]
pub fn clean_value(value: Option<&str>, strip: bool) -> String {
    let value = value.unwrap_or_default();
    if strip { value.trim() } else { value }.to_string()
}

/// Resolve one field specifier against a context node.
///
/// # Errors
/// `Selection` when the path is malformed. Missing nodes, attributes or
/// text resolve to an empty string.
pub fn resolve(node: Node<'_, '_>, spec: &FieldSpec, strip: bool) -> Result<String> {
    let matches = select(node, &spec.path)?;
    let Some(first) = matches.first().copied() else {
        return Ok(String::new());
    };

    let raw = match spec.attribute.as_deref() {
        Some(attr) => get_attribute(first, attr),
        None => leading_text(first),
    };

    Ok(clean_value(raw, strip))
}
