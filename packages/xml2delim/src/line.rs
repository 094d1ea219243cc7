//! Record line formatting.

use roxmltree::Node;

use crate::config::DEFAULT_DELIMITER;
use crate::error::Result;
use crate::field::{resolve, FieldSpec};

/// Joins a code and its resolved field values into one record line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineFormatter {
    delimiter: String,
    strip_whitespace: bool,
}

impl LineFormatter {
    #[must_use]
    pub fn new(delimiter: impl Into<String>, strip_whitespace: bool) -> Self {
        Self {
            delimiter: delimiter.into(),
            strip_whitespace,
        }
    }

    #[must_use]
    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    #[must_use]
    pub fn strip_whitespace(&self) -> bool {
        self.strip_whitespace
    }

    /// Format `code` and the values of `fields` resolved against `node`.
    ///
    /// Returns `None` when every resolved value is empty; such a line is
    /// suppressed entirely rather than written as a bare code.
    ///
    /// # Errors
    /// `Selection` when a field path is malformed.
    pub fn format(&self, code: &str, node: Node<'_, '_>, fields: &[String]) -> Result<Option<String>> {
        let mut values = Vec::with_capacity(fields.len());
        for field in fields {
            if field.is_empty() {
                values.push(String::new());
                continue;
            }
            values.push(resolve(node, &FieldSpec::parse(field), self.strip_whitespace)?);
        }

        if values.iter().all(String::is_empty) {
            return Ok(None);
        }

        let mut line = String::with_capacity(
            code.len() + values.iter().map(|v| v.len() + self.delimiter.len()).sum::<usize>() + 1,
        );
        line.push_str(code);
        for value in &values {
            line.push_str(&self.delimiter);
            line.push_str(value);
        }
        line.push('\n');

        Ok(Some(line))
    }
}

impl Default for LineFormatter {
    fn default() -> Self {
        Self::new(DEFAULT_DELIMITER, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roxmltree::Document;

    fn fields(specs: &[&str]) -> Vec<String> {
        specs.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_format_line() {
        let doc = Document::parse(r#"<item name="A">10</item>"#).unwrap();
        let line = LineFormatter::default()
            .format("item", doc.root_element(), &fields(&[".=name", "."]))
            .unwrap();
        assert_eq!(line.as_deref(), Some("item|A|10\n"));
    }

    #[test]
    fn test_format_keeps_empty_values_when_any_present() {
        let doc = Document::parse(r#"<item name="B"></item>"#).unwrap();
        let line = LineFormatter::default()
            .format("item", doc.root_element(), &fields(&[".=name", "."]))
            .unwrap();
        assert_eq!(line.as_deref(), Some("item|B|\n"));
    }

    #[test]
    fn test_format_suppresses_all_empty() {
        let doc = Document::parse(r#"<item name="  "> </item>"#).unwrap();
        let line = LineFormatter::default()
            .format("item", doc.root_element(), &fields(&[".=name", ".", "missing"]))
            .unwrap();
        assert_eq!(line, None);
    }

    #[test]
    fn test_format_whitespace_counts_when_not_stripping() {
        let doc = Document::parse(r#"<item> </item>"#).unwrap();
        let line = LineFormatter::new("|", false)
            .format("item", doc.root_element(), &fields(&["."]))
            .unwrap();
        assert_eq!(line.as_deref(), Some("item| \n"));
    }

    #[test]
    fn test_format_placeholders_and_custom_delimiter() {
        let doc = Document::parse(r#"<p id="9"><n>Ann</n></p>"#).unwrap();
        let line = LineFormatter::new("\t", true)
            .format("P", doc.root_element(), &fields(&["=id", "", "n"]))
            .unwrap();
        assert_eq!(line.as_deref(), Some("P\t9\t\tAnn\n"));
    }

    #[test]
    fn test_format_empty_field_list_is_suppressed() {
        let doc = Document::parse("<p>x</p>").unwrap();
        let line = LineFormatter::default()
            .format("P", doc.root_element(), &[])
            .unwrap();
        assert_eq!(line, None);
    }

    #[test]
    fn test_format_propagates_selection_error() {
        let doc = Document::parse("<p/>").unwrap();
        let result = LineFormatter::default().format("P", doc.root_element(), &fields(&["/abs"]));
        assert!(result.is_err());
    }
}
