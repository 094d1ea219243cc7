//! XML utility functions for reading values out of `roxmltree` nodes.

use roxmltree::Node;

/// Get the tag name without namespace prefix.
///
/// # Examples
/// ```
/// use roxmltree::Document;
/// use xml2delim::xml::get_tag_name;
///
/// let xml = r#"<ns:item xmlns:ns="urn:x">text</ns:item>"#;
/// let doc = Document::parse(xml).unwrap();
/// assert_eq!(get_tag_name(doc.root_element()), "item");
/// ```
pub fn get_tag_name<'a>(node: Node<'a, '_>) -> &'a str {
    node.tag_name().name()
}

/// Get all element children of a node.
///
/// Excludes text nodes, comments and processing instructions.
pub fn element_children<'a, 'input>(
    node: Node<'a, 'input>,
) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(|child| child.is_element())
}

/// Text of the first child node of `node`, when that child is text.
///
/// Stops at the first child element, comment or processing instruction.
/// Text of nested elements is not included; empty and self-closing
/// elements have no text.
pub fn leading_text<'a>(node: Node<'a, '_>) -> Option<&'a str> {
    node.text()
}

/// Get an attribute value from a node by local name.
pub fn get_attribute<'a>(node: Node<'a, '_>, name: &str) -> Option<&'a str> {
    node.attributes()
        .find(|attr| attr.name() == name)
        .map(|attr| attr.value())
}
