//! Recursive template interpretation.
//!
//! Walks a node against a template: field-list entries produce lines via
//! the [`LineFormatter`], nested entries select child nodes and recurse.
//! Output follows template declaration order within one node and document
//! order among the nodes matched by a single key.

use roxmltree::{Document, Node};

use crate::error::Result;
use crate::line::LineFormatter;
use crate::select::select;
use crate::template::{Template, TemplateValue};

/// Interprets nodes against templates, appending lines to a buffer.
#[derive(Debug, Clone, Default)]
pub struct Interpreter {
    formatter: LineFormatter,
}

impl Interpreter {
    #[must_use]
    pub fn new(formatter: LineFormatter) -> Self {
        Self { formatter }
    }

    #[must_use]
    pub fn formatter(&self) -> &LineFormatter {
        &self.formatter
    }

    /// Interpret a single node.
    ///
    /// # Errors
    /// `Selection` on the first malformed path; output appended before the
    /// error is left in `out`, callers abort the run anyway.
    pub fn interpret(&self, node: Node<'_, '_>, template: &Template, out: &mut String) -> Result<()> {
        for (key, value) in template.iter() {
            match value {
                TemplateValue::FieldList(fields) => {
                    if let Some(line) = self.formatter.format(key, node, fields)? {
                        out.push_str(&line);
                    }
                }
                TemplateValue::SubTemplate(sub) => {
                    let children = select(node, key)?;
                    self.interpret_all(&children, sub, out)?;
                }
            }
        }
        Ok(())
    }

    /// Interpret each node of a list in order. An empty list yields nothing.
    ///
    /// # Errors
    /// See [`Interpreter::interpret`].
    pub fn interpret_all(&self, nodes: &[Node<'_, '_>], template: &Template, out: &mut String) -> Result<()> {
        for node in nodes {
            self.interpret(*node, template, out)?;
        }
        Ok(())
    }

    /// Parse one serialized subtree and interpret its root element.
    ///
    /// # Errors
    /// `XmlParse` if the snapshot is not well-formed, `Selection` on a
    /// malformed path.
    pub fn process_subtree(&self, xml: &str, template: &Template) -> Result<String> {
        let doc = Document::parse(xml)?;
        let mut out = String::new();
        self.interpret(doc.root_element(), template, &mut out)?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TranscodeError;
    use pretty_assertions::assert_eq;

    fn run(xml: &str, template: &Template) -> String {
        Interpreter::default().process_subtree(xml, template).unwrap()
    }

    #[test]
    fn test_round_trip_example() {
        let template = Template::new().with_fields("item", [".=name", "."]);
        let out = run(
            r#"<root><item name="A">10</item><item name="B"></item></root>"#,
            &Template::new().with_sub("item", template),
        );
        assert_eq!(out, "item|A|10\nitem|B|\n");
    }

    #[test]
    fn test_template_order_within_node() {
        let template = Template::new()
            .with_fields("B", ["b"])
            .with_fields("A", ["a"]);
        let out = run("<r><a>1</a><b>2</b></r>", &template);
        assert_eq!(out, "B|2\nA|1\n");
    }

    #[test]
    fn test_document_order_among_siblings_of_one_key() {
        let template = Template::new()
            .with_sub("x", Template::new().with_fields("X", ["."]))
            .with_sub("y", Template::new().with_fields("Y", ["."]));
        let out = run("<r><x>1</x><y>2</y><x>3</x><y>4</y></r>", &template);
        assert_eq!(out, "X|1\nX|3\nY|2\nY|4\n");
    }

    #[test]
    fn test_nested_templates() {
        let template = Template::new()
            .with_fields("ORD", ["=id", "customer"])
            .with_sub(
                "lines/line",
                Template::new()
                    .with_fields("LIN", ["=sku", "qty"])
                    .with_sub("note", Template::new().with_fields("NTE", ["."])),
            );
        let xml = r#"<order id="7">
            <customer> Ann </customer>
            <lines>
                <line sku="A"><qty>1</qty><note>fragile</note></line>
                <line sku="B"><qty>2</qty></line>
            </lines>
        </order>"#;
        assert_eq!(
            run(xml, &template),
            "ORD|7|Ann\nLIN|A|1\nNTE|fragile\nLIN|B|2\n"
        );
    }

    #[test]
    fn test_empty_sub_selection_produces_nothing() {
        let template = Template::new().with_sub("missing", Template::new().with_fields("M", ["."]));
        assert_eq!(run("<r><a>1</a></r>", &template), "");

        let mut out = String::new();
        Interpreter::default()
            .interpret_all(&[], &template, &mut out)
            .unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_malformed_sub_template_path_is_fatal() {
        let template = Template::new().with_sub("a[", Template::new());
        let err = Interpreter::default()
            .process_subtree("<r><a/></r>", &template)
            .unwrap_err();
        assert!(matches!(err, TranscodeError::Selection { ref tag, .. } if tag == "r"));
    }

    #[test]
    fn test_malformed_snapshot_is_parse_error() {
        let err = Interpreter::default()
            .process_subtree("<r><a></r>", &Template::new())
            .unwrap_err();
        assert!(matches!(err, TranscodeError::XmlParse(_)));
    }
}
