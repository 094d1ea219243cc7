//! Restricted selection expressions over `roxmltree` nodes.
//!
//! Only child and descendant navigation is supported:
//!
//! ```text
//! expr      := step (("/" | "//") step)*
//! step      := "." | ".." | nametest predicate*
//! nametest  := "*" | NAME
//! predicate := "[" INTEGER "]" | "[" "@" NAME "]" | "[" "@" NAME "=" QUOTED "]"
//! ```
//!
//! Names are matched against local names; subtrees reach this module with
//! namespaces already stripped.

use roxmltree::Node;

use crate::error::{Result, TranscodeError};
use crate::xml::{element_children, get_tag_name};

/// Parsed selection expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    steps: Vec<(Axis, Step)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Child,
    Descendant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Step {
    SelfNode,
    Parent,
    Element {
        name: NameTest,
        predicates: Vec<Predicate>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum NameTest {
    Any,
    Named(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Predicate {
    Position(usize),
    HasAttribute(String),
    AttributeEquals(String, String),
}

impl Selector {
    /// Parse an expression. The error is the reason only; callers attach
    /// the expression and node context.
    pub fn parse(expression: &str) -> std::result::Result<Self, String> {
        let expr = expression.trim();
        if expr.is_empty() {
            return Err("empty expression".to_string());
        }
        if expr.starts_with('/') {
            return Err("absolute paths are not supported".to_string());
        }

        let mut steps = Vec::new();
        let mut axis = Axis::Child;
        let mut rest = expr;

        loop {
            let (raw, tail) = split_step(rest)?;
            steps.push((axis, parse_step(raw.trim())?));

            if tail.is_empty() {
                break;
            }
            if let Some(after) = tail.strip_prefix("//") {
                axis = Axis::Descendant;
                rest = after;
            } else if let Some(after) = tail.strip_prefix('/') {
                axis = Axis::Child;
                rest = after;
            } else {
                return Err(format!("unexpected '{tail}'"));
            }
            if rest.is_empty() {
                return Err("expression ends with '/'".to_string());
            }
        }

        Ok(Self { steps })
    }

    /// Evaluate against a context node, returning matches in document order.
    #[must_use]
    pub fn evaluate<'a, 'input>(&self, context: Node<'a, 'input>) -> Vec<Node<'a, 'input>> {
        let mut current = vec![context];

        for (axis, step) in &self.steps {
            let bases: Vec<Node<'a, 'input>> = match axis {
                Axis::Child => current,
                Axis::Descendant => {
                    let mut all: Vec<_> = current
                        .iter()
                        .flat_map(|n| n.descendants().filter(Node::is_element))
                        .collect();
                    sort_document_order(&mut all);
                    all
                }
            };

            let mut next = Vec::new();
            for base in bases {
                apply_step(base, step, &mut next);
            }
            sort_document_order(&mut next);
            current = next;

            if current.is_empty() {
                break;
            }
        }

        current
    }
}

/// Parse and evaluate `expression` against `node`.
///
/// # Errors
/// `Selection` naming the expression and the node's tag when the expression
/// is malformed. An expression that matches nothing is not an error.
///
/// # Examples
/// ```
/// use roxmltree::Document;
/// use xml2delim::select::select;
///
/// let doc = Document::parse("<r><a>1</a><b/><a>2</a></r>").unwrap();
/// let hits = select(doc.root_element(), "a").unwrap();
/// assert_eq!(hits.len(), 2);
/// assert!(select(doc.root_element(), "a[").is_err());
/// ```
pub fn select<'a, 'input>(node: Node<'a, 'input>, expression: &str) -> Result<Vec<Node<'a, 'input>>> {
    let selector = Selector::parse(expression)
        .map_err(|reason| TranscodeError::selection(expression, node_label(node), reason))?;
    Ok(selector.evaluate(node))
}

/// Tag used in diagnostics for a context node.
fn node_label(node: Node<'_, '_>) -> String {
    if node.is_element() {
        get_tag_name(node).to_string()
    } else {
        "#document".to_string()
    }
}

fn apply_step<'a, 'input>(base: Node<'a, 'input>, step: &Step, out: &mut Vec<Node<'a, 'input>>) {
    match step {
        Step::SelfNode => out.push(base),
        Step::Parent => {
            if let Some(parent) = base.parent().filter(Node::is_element) {
                out.push(parent);
            }
        }
        Step::Element { name, predicates } => {
            let mut candidates: Vec<Node<'a, 'input>> = element_children(base)
                .filter(|child| name.matches(*child))
                .collect();
            for predicate in predicates {
                candidates = predicate.filter(candidates);
                if candidates.is_empty() {
                    break;
                }
            }
            out.extend(candidates);
        }
    }
}

fn sort_document_order(nodes: &mut Vec<Node<'_, '_>>) {
    nodes.sort_by_key(|n| n.range().start);
    nodes.dedup_by_key(|n| n.range().start);
}

impl NameTest {
    fn matches(&self, node: Node<'_, '_>) -> bool {
        match self {
            Self::Any => true,
            Self::Named(name) => get_tag_name(node) == name,
        }
    }
}

impl Predicate {
    fn filter<'a, 'input>(&self, nodes: Vec<Node<'a, 'input>>) -> Vec<Node<'a, 'input>> {
        match self {
            Self::Position(pos) => nodes.into_iter().nth(pos - 1).into_iter().collect(),
            Self::HasAttribute(attr) => nodes
                .into_iter()
                .filter(|n| n.attribute(attr.as_str()).is_some())
                .collect(),
            Self::AttributeEquals(attr, value) => nodes
                .into_iter()
                .filter(|n| n.attribute(attr.as_str()) == Some(value.as_str()))
                .collect(),
        }
    }
}

/// Split off the first step, honouring brackets and quotes.
fn split_step(input: &str) -> std::result::Result<(&str, &str), String> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;

    for (i, c) in input.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '[') => depth += 1,
            (None, ']') => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| "unbalanced ']'".to_string())?;
            }
            (None, '/') if depth == 0 => return Ok((&input[..i], &input[i..])),
            _ => {}
        }
    }

    if quote.is_some() {
        return Err("unterminated string literal".to_string());
    }
    if depth > 0 {
        return Err("unclosed predicate".to_string());
    }
    Ok((input, ""))
}

fn parse_step(raw: &str) -> std::result::Result<Step, String> {
    match raw {
        "" => return Err("empty step".to_string()),
        "." => return Ok(Step::SelfNode),
        ".." => return Ok(Step::Parent),
        _ => {}
    }
    if raw.starts_with('.') {
        return Err(format!("predicates are not supported on '{raw}'"));
    }

    let name_end = raw.find('[').unwrap_or(raw.len());
    let name = parse_name_test(raw[..name_end].trim())?;

    let mut predicates = Vec::new();
    let mut rest = raw[name_end..].trim_start();
    while !rest.is_empty() {
        let body_end = find_predicate_end(rest)?;
        predicates.push(parse_predicate(rest[1..body_end].trim())?);
        rest = rest[body_end + 1..].trim_start();
    }

    Ok(Step::Element { name, predicates })
}

fn parse_name_test(name: &str) -> std::result::Result<NameTest, String> {
    if name == "*" {
        return Ok(NameTest::Any);
    }
    if name.contains(':') {
        return Err(format!("namespace prefix in '{name}' is not supported"));
    }
    if !is_name(name) {
        return Err(format!("invalid element name '{name}'"));
    }
    Ok(NameTest::Named(name.to_string()))
}

/// Index of the `]` closing the predicate that opens at byte 0.
fn find_predicate_end(input: &str) -> std::result::Result<usize, String> {
    if !input.starts_with('[') {
        return Err(format!("unexpected '{input}'"));
    }
    let mut quote: Option<char> = None;
    for (i, c) in input.char_indices().skip(1) {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, '[') => return Err("nested predicates are not supported".to_string()),
            (None, ']') => return Ok(i),
            _ => {}
        }
    }
    Err("unclosed predicate".to_string())
}

fn parse_predicate(body: &str) -> std::result::Result<Predicate, String> {
    if let Ok(pos) = body.parse::<usize>() {
        if pos == 0 {
            return Err("positions start at 1".to_string());
        }
        return Ok(Predicate::Position(pos));
    }

    let Some(attr_expr) = body.strip_prefix('@') else {
        return Err(format!("unsupported predicate '[{body}]'"));
    };

    match attr_expr.split_once('=') {
        None => {
            let attr = attr_expr.trim();
            if !is_name(attr) {
                return Err(format!("invalid attribute name '{attr}'"));
            }
            Ok(Predicate::HasAttribute(attr.to_string()))
        }
        Some((attr, literal)) => {
            let attr = attr.trim();
            if !is_name(attr) {
                return Err(format!("invalid attribute name '{attr}'"));
            }
            let literal = literal.trim();
            let value = ['\'', '"']
                .iter()
                .find_map(|q| literal.strip_prefix(*q)?.strip_suffix(*q))
                .ok_or_else(|| format!("attribute value {literal} must be quoted"))?;
            Ok(Predicate::AttributeEquals(attr.to_string(), value.to_string()))
        }
    }
}

fn is_name(s: &str) -> bool {
    let mut chars = s.chars();
    chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
}
