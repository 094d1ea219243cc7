//! Streaming source of template-matched subtrees.
//!
//! Scans the input once with `quick_xml`. Only the elements currently being
//! captured are held in memory, each as its own serialized snapshot. A
//! match is yielded as soon as its end tag closes, so a root-keyed element
//! nested in another one is surfaced first and leaves an empty placeholder
//! behind in its ancestor.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::LazyLock;

use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};
use regex::Regex;

use crate::error::{Result, TranscodeError};
use crate::template::{RootIndex, Template};

/// General entity declared with a literal value in the internal DTD subset.
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static ENTITY_DECLARATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<!ENTITY\s+([^\s%"']+)\s+(?:"([^"]*)"|'([^']*)')\s*>"#).expect("valid regex")
});

/// One matched root element, serialized, with its governing template.
#[derive(Debug, Clone)]
pub struct MatchedSubtree<'t> {
    /// Position among matched subtrees, starting at 1, in end-tag order.
    pub ordinal: usize,
    /// Root key the element matched.
    pub root: &'t str,
    /// Serialized element with namespace declarations and prefixes removed.
    pub xml: String,
    /// Template for `root`.
    pub template: &'t Template,
}

/// Iterator over the elements of a document whose local tag name is a root
/// key of the index.
///
/// Elements are yielded when their end tag is read, so nested matches come
/// before their ancestors. In the ancestor's snapshot a yielded element is
/// reduced to an empty tag. The iterator is fused: after the first error or
/// the end of the document it yields `None`.
pub struct SubtreeStream<'t, R: BufRead> {
    reader: Reader<R>,
    index: &'t RootIndex,
    buf: Vec<u8>,
    open: Vec<Capture<'t>>,
    subset: Option<InternalSubset>,
    matched: usize,
    finished: bool,
}

/// A root element whose end tag has not been read yet.
struct Capture<'t> {
    root: &'t str,
    template: &'t Template,
    writer: Writer<Vec<u8>>,
    depth: usize,
}

/// Literal entity declarations from the document's DOCTYPE.
#[derive(Debug, Default)]
struct InternalSubset {
    declarations: String,
    entities: HashMap<String, String>,
}

impl InternalSubset {
    /// Collect `<!ENTITY name "value">` declarations; `None` when there are none.
    ///
    /// Parameter and external entities are not supported.
    fn parse(doctype: &[u8]) -> Option<Self> {
        let text = std::str::from_utf8(doctype).ok()?;
        let mut subset = Self::default();

        for caps in ENTITY_DECLARATION.captures_iter(text) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let value = caps.get(2).or_else(|| caps.get(3)).map_or("", |m| m.as_str());
            subset.declarations.push_str(whole.as_str());
            // the first declaration of an entity is binding
            subset
                .entities
                .entry(name.as_str().to_string())
                .or_insert_with(|| value.to_string());
        }

        (!subset.entities.is_empty()).then_some(subset)
    }

    fn resolve(&self, name: &str) -> Option<&str> {
        self.entities.get(name).map(String::as_str)
    }
}

impl<'t> SubtreeStream<'t, BufReader<File>> {
    /// Open a file for streaming.
    pub fn from_path(path: &Path, index: &'t RootIndex) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self::new(BufReader::new(file), index))
    }
}

impl<'t, R: BufRead> SubtreeStream<'t, R> {
    pub fn new(source: R, index: &'t RootIndex) -> Self {
        let mut reader = Reader::from_reader(source);
        reader.config_mut().trim_text(false);
        Self {
            reader,
            index,
            buf: Vec::new(),
            open: Vec::new(),
            subset: None,
            matched: 0,
            finished: false,
        }
    }

    /// Number of subtrees yielded so far.
    #[must_use]
    pub fn matched(&self) -> usize {
        self.matched
    }

    fn next_subtree(&mut self) -> Result<Option<MatchedSubtree<'t>>> {
        let Self {
            reader,
            index,
            buf,
            open,
            subset,
            matched,
            ..
        } = self;
        let index: &'t RootIndex = *index;

        loop {
            buf.clear();
            let event = match reader.read_event_into(buf) {
                Ok(event) => event,
                Err(e) => return Err(read_error(&*reader, e.to_string())),
            };
            let entities = subset.as_ref();

            match event {
                Event::Start(e) => {
                    let found = index.lookup(e.local_name().as_ref());
                    if found.is_none() && open.is_empty() {
                        continue;
                    }
                    let opening =
                        normalize_start(&e, entities).map_err(|msg| read_error(&*reader, msg))?;
                    if let Some((root, template)) = found {
                        if let Some(parent) = open.last_mut() {
                            write_event(&mut parent.writer, Event::Empty(BytesStart::new(root)))?;
                        }
                        let mut writer = Writer::new(Vec::new());
                        write_event(&mut writer, Event::Start(opening))?;
                        open.push(Capture {
                            root,
                            template,
                            writer,
                            depth: 1,
                        });
                    } else if let Some(current) = open.last_mut() {
                        write_event(&mut current.writer, Event::Start(opening))?;
                        current.depth += 1;
                    }
                }
                Event::Empty(e) => {
                    if let Some((root, template)) = index.lookup(e.local_name().as_ref()) {
                        let opening =
                            normalize_start(&e, entities).map_err(|msg| read_error(&*reader, msg))?;
                        if let Some(parent) = open.last_mut() {
                            write_event(&mut parent.writer, Event::Empty(BytesStart::new(root)))?;
                        }
                        let mut writer = Writer::new(Vec::new());
                        write_event(&mut writer, Event::Empty(opening))?;
                        let capture = Capture {
                            root,
                            template,
                            writer,
                            depth: 0,
                        };
                        return complete(&*reader, capture, entities, matched).map(Some);
                    }
                    if let Some(current) = open.last_mut() {
                        let element =
                            normalize_start(&e, entities).map_err(|msg| read_error(&*reader, msg))?;
                        write_event(&mut current.writer, Event::Empty(element))?;
                    }
                }
                Event::End(e) => {
                    let Some(current) = open.last_mut() else {
                        continue;
                    };
                    let name = utf8(e.local_name().as_ref())
                        .map_err(|msg| read_error(&*reader, msg))?
                        .to_string();
                    write_event(&mut current.writer, Event::End(BytesEnd::new(name)))?;
                    current.depth -= 1;
                    if current.depth == 0 {
                        if let Some(capture) = open.pop() {
                            return complete(&*reader, capture, entities, matched).map(Some);
                        }
                    }
                }
                Event::Text(e) => {
                    if let Some(current) = open.last_mut() {
                        write_event(&mut current.writer, Event::Text(e))?;
                    }
                }
                Event::CData(e) => {
                    if let Some(current) = open.last_mut() {
                        write_event(&mut current.writer, Event::CData(e))?;
                    }
                }
                // kept as nodes so that text on either side stays separate
                Event::Comment(e) => {
                    if let Some(current) = open.last_mut() {
                        write_event(&mut current.writer, Event::Comment(e))?;
                    }
                }
                Event::PI(e) => {
                    if let Some(current) = open.last_mut() {
                        write_event(&mut current.writer, Event::PI(e))?;
                    }
                }
                Event::DocType(e) => {
                    *subset = InternalSubset::parse(&e);
                    if let Some(subset) = subset.as_ref() {
                        tracing::debug!(entities = subset.entities.len(), "Read internal DTD subset");
                    }
                }
                Event::Eof => {
                    return match open.last() {
                        Some(current) => Err(read_error(
                            reader,
                            format!("unexpected end of document inside <{}>", current.root),
                        )),
                        None => Ok(None),
                    };
                }
                _ => {}
            }
        }
    }
}

impl<'t, R: BufRead> Iterator for SubtreeStream<'t, R> {
    type Item = Result<MatchedSubtree<'t>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.next_subtree() {
            Ok(Some(subtree)) => Some(Ok(subtree)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

impl<'t, R: BufRead> std::iter::FusedIterator for SubtreeStream<'t, R> {}

/// Turn a closed capture into a yielded subtree.
///
/// Entity declarations are repeated in front of the element so the snapshot
/// parses on its own.
fn complete<'t, R>(
    reader: &Reader<R>,
    capture: Capture<'t>,
    subset: Option<&InternalSubset>,
    matched: &mut usize,
) -> Result<MatchedSubtree<'t>> {
    let element = String::from_utf8(capture.writer.into_inner())
        .map_err(|e| read_error(reader, format!("subtree is not valid UTF-8: {e}")))?;
    let xml = match subset {
        Some(subset) => format!("<!DOCTYPE {} [{}]>{element}", capture.root, subset.declarations),
        None => element,
    };

    *matched += 1;
    tracing::debug!(ordinal = *matched, root = capture.root, bytes = xml.len(), "Matched subtree");

    Ok(MatchedSubtree {
        ordinal: *matched,
        root: capture.root,
        xml,
        template: capture.template,
    })
}

/// Rewrite a start tag under its local name, dropping namespace
/// declarations and attribute prefixes.
fn normalize_start(
    start: &BytesStart<'_>,
    subset: Option<&InternalSubset>,
) -> std::result::Result<BytesStart<'static>, String> {
    let name = utf8(start.local_name().as_ref())?.to_string();
    let mut normalized = BytesStart::new(name);
    let mut seen: Vec<String> = Vec::new();

    for attr in start.attributes() {
        let attr = attr.map_err(|e| e.to_string())?;
        if attr.key.as_namespace_binding().is_some() {
            continue;
        }
        let key = utf8(attr.key.local_name().as_ref())?.to_string();
        if seen.contains(&key) {
            tracing::debug!(attribute = %key, "Dropping attribute that collides after prefix removal");
            continue;
        }
        let value = attr
            .unescape_value_with(|entity| {
                resolve_predefined_entity(entity).or_else(|| subset.and_then(|s| s.resolve(entity)))
            })
            .map_err(|e| e.to_string())?;
        normalized.push_attribute((key.as_str(), value.as_ref()));
        seen.push(key);
    }

    Ok(normalized)
}

fn utf8(bytes: &[u8]) -> std::result::Result<&str, String> {
    std::str::from_utf8(bytes).map_err(|e| format!("invalid UTF-8 in name: {e}"))
}

fn write_event(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<()> {
    writer
        .write_event(event)
        .map_err(|e| TranscodeError::Io(std::io::Error::other(e.to_string())))
}

fn read_error<R>(reader: &Reader<R>, message: String) -> TranscodeError {
    TranscodeError::XmlRead {
        position: reader.buffer_position() as u64,
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::Template;
    use pretty_assertions::assert_eq;

    fn index(roots: &[&str]) -> RootIndex {
        let mut template = Template::new();
        for root in roots {
            template = template.with_sub(*root, Template::new().with_fields("X", ["."]));
        }
        RootIndex::build(&template).unwrap()
    }

    fn collect(xml: &str, roots: &[&str]) -> Vec<(String, String)> {
        let index = index(roots);
        SubtreeStream::new(xml.as_bytes(), &index)
            .map(|r| {
                let s = r.unwrap();
                (s.root.to_string(), s.xml)
            })
            .collect()
    }

    #[test]
    fn test_yields_only_matched_elements() {
        let xml = r#"<?xml version="1.0"?>
            <catalog><meta>skip</meta><item id="1">a</item><other/><item id="2"/></catalog>"#;
        assert_eq!(
            collect(xml, &["item"]),
            vec![
                ("item".to_string(), r#"<item id="1">a</item>"#.to_string()),
                ("item".to_string(), r#"<item id="2"/>"#.to_string()),
            ]
        );
    }

    #[test]
    fn test_interleaved_roots_follow_document_order() {
        let xml = "<d><b>1</b><a>2</a><b>3</b></d>";
        let roots: Vec<String> = collect(xml, &["a", "b"]).into_iter().map(|(r, _)| r).collect();
        assert_eq!(roots, ["b", "a", "b"]);
    }

    #[test]
    fn test_strips_namespaces() {
        let xml = r#"<ns:feed xmlns:ns="urn:feed" xmlns="urn:default">
            <ns:item xmlns:x="urn:x" x:code="A" plain="p"><ns:name>N</ns:name><title>T</title></ns:item>
        </ns:feed>"#;
        assert_eq!(
            collect(xml, &["item"]),
            vec![(
                "item".to_string(),
                r#"<item code="A" plain="p"><name>N</name><title>T</title></item>"#.to_string()
            )]
        );
    }

    #[test]
    fn test_keeps_escaped_text_and_reescapes_attributes() {
        let xml = r#"<r><item q='say "hi"' a="x &amp; y">1 &lt; 2<![CDATA[<raw>]]></item></r>"#;
        let out = collect(xml, &["item"]);
        assert_eq!(
            out[0].1,
            r#"<item q="say &quot;hi&quot;" a="x &amp; y">1 &lt; 2<![CDATA[<raw>]]></item>"#
        );
        let doc = roxmltree::Document::parse(&out[0].1).unwrap();
        assert_eq!(doc.root_element().attribute("q"), Some(r#"say "hi""#));
        assert!(doc.root_element().text().unwrap_or_default().starts_with("1 < 2"));
    }

    #[test]
    fn test_keeps_comments_and_processing_instructions() {
        let xml = "<r><item>a<!-- note -->b<?pi data?></item></r>";
        let out = collect(xml, &["item"]);
        assert_eq!(out[0].1, "<item>a<!-- note -->b<?pi data?></item>");
        let doc = roxmltree::Document::parse(&out[0].1).unwrap();
        assert_eq!(doc.root_element().text(), Some("a"));
    }

    #[test]
    fn test_nested_roots_yield_inner_first_and_leave_placeholder() {
        let xml = r#"<r><item n="1"><item n="2">inner</item>tail</item><item>next</item></r>"#;
        assert_eq!(
            collect(xml, &["item"]),
            vec![
                ("item".to_string(), r#"<item n="2">inner</item>"#.to_string()),
                ("item".to_string(), r#"<item n="1"><item/>tail</item>"#.to_string()),
                ("item".to_string(), "<item>next</item>".to_string()),
            ]
        );
    }

    #[test]
    fn test_document_root_and_children_both_match() {
        let xml = r#"<catalog><title>T</title><book id="1"/><book id="2"><p>x</p></book></catalog>"#;
        assert_eq!(
            collect(xml, &["catalog", "book"]),
            vec![
                ("book".to_string(), r#"<book id="1"/>"#.to_string()),
                ("book".to_string(), r#"<book id="2"><p>x</p></book>"#.to_string()),
                (
                    "catalog".to_string(),
                    "<catalog><title>T</title><book/><book/></catalog>".to_string()
                ),
            ]
        );
    }

    #[test]
    fn test_internal_entities_travel_with_snapshot() {
        let xml = r#"<!DOCTYPE r [
            <!ELEMENT r ANY>
            <!ENTITY e "EXP">
            <!ENTITY q 'a &amp; b'>
        ]><r><item a="&e;|&lt;">&e;</item></r>"#;
        let out = collect(xml, &["item"]);
        assert_eq!(
            out[0].1,
            r#"<!DOCTYPE item [<!ENTITY e "EXP"><!ENTITY q 'a &amp; b'>]><item a="EXP|&lt;">&e;</item>"#
        );
        let doc = roxmltree::Document::parse(&out[0].1).unwrap();
        assert_eq!(doc.root_element().attribute("a"), Some("EXP|<"));
        assert_eq!(doc.root_element().text(), Some("EXP"));
    }

    #[test]
    fn test_doctype_without_entities_adds_nothing() {
        let xml = r#"<!DOCTYPE r SYSTEM "r.dtd"><r><item>1</item></r>"#;
        assert_eq!(collect(xml, &["item"])[0].1, "<item>1</item>");
    }

    #[test]
    fn test_document_root_can_match() {
        let xml = "<root><v>1</v></root>";
        assert_eq!(collect(xml, &["root"])[0].1, "<root><v>1</v></root>");
    }

    #[test]
    fn test_ordinals_and_templates() {
        let index = index(&["a", "b"]);
        let subtrees: Vec<_> = SubtreeStream::new("<d><a/><b/></d>".as_bytes(), &index)
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(subtrees[0].ordinal, 1);
        assert_eq!(subtrees[1].ordinal, 2);
        assert!(std::ptr::eq(subtrees[1].template, index.get("b").unwrap()));
    }

    #[test]
    fn test_no_matches_is_empty() {
        assert!(collect("<d><x/></d>", &["item"]).is_empty());
    }

    #[test]
    fn test_malformed_xml_is_error_then_fused() {
        let index = index(&["item"]);
        let mut stream = SubtreeStream::new("<r><item>1</wrong></r>".as_bytes(), &index);
        assert!(matches!(stream.next(), Some(Err(TranscodeError::XmlRead { .. }))));
        assert!(stream.next().is_none());
    }

    #[test]
    fn test_truncated_document_inside_subtree_is_error() {
        let index = index(&["item"]);
        let results: Vec<_> = SubtreeStream::new("<r><item><v>1</v>".as_bytes(), &index).collect();
        assert_eq!(results.len(), 1);
        assert!(results[0].is_err());
    }

    #[test]
    fn test_many_subtrees_stream_without_accumulating() {
        let index = index(&["rec"]);
        let body: String = (0..5000).map(|i| format!("<rec n=\"{i}\"><v>{i}</v></rec>")).collect();
        let xml = format!("<all>{body}</all>");

        let mut stream = SubtreeStream::new(xml.as_bytes(), &index);
        let mut largest = 0;
        let mut count = 0;
        for subtree in stream.by_ref() {
            let subtree = subtree.unwrap();
            largest = largest.max(subtree.xml.len());
            count += 1;
        }
        assert_eq!(count, 5000);
        assert_eq!(stream.matched(), 5000);
        // each snapshot holds one record only
        assert!(largest < 64, "largest snapshot was {largest} bytes");
    }
}
