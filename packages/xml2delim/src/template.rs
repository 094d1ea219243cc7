//! Extraction templates and the root template index.
//!
//! A template is an ordered mapping from code to either a field list (a
//! leaf rule producing one line) or a nested template (a sub-selection).
//! Deserialization goes through a visitor so that key order survives any
//! serde format, JSON and YAML alike.

use std::collections::HashMap;
use std::fmt;

use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};

use crate::error::{Result, TranscodeError};

/// One template entry value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateValue {
    /// Ordered field specifiers; the entry key is the line code.
    FieldList(Vec<String>),
    /// Nested template; the entry key is a selection path.
    SubTemplate(Template),
}

/// Ordered mapping from code (or selection path) to [`TemplateValue`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Template {
    entries: Vec<(String, TemplateValue)>,
}

impl Template {
    /// Create an empty template.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry.
    ///
    /// An existing key keeps its position and gets the new value.
    pub fn insert(&mut self, key: impl Into<String>, value: TemplateValue) {
        let key = key.into();
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            tracing::debug!(key = %key, "Duplicate template key, keeping last value");
            slot.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    /// Builder-style [`Template::insert`] for a field list.
    #[must_use]
    pub fn with_fields<I, S>(mut self, code: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.insert(
            code,
            TemplateValue::FieldList(fields.into_iter().map(Into::into).collect()),
        );
        self
    }

    /// Builder-style [`Template::insert`] for a nested template.
    #[must_use]
    pub fn with_sub(mut self, path: impl Into<String>, sub: Template) -> Self {
        self.insert(path, TemplateValue::SubTemplate(sub));
        self
    }

    /// Look up an entry by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&TemplateValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Iterate entries in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &TemplateValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'de> Deserialize<'de> for Template {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_map(TemplateVisitor)
    }
}

impl<'de> Deserialize<'de> for TemplateValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_any(TemplateValueVisitor)
    }
}

struct TemplateVisitor;

impl<'de> Visitor<'de> for TemplateVisitor {
    type Value = Template;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a mapping of codes to field lists or nested templates")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<Template, A::Error> {
        let mut template = Template::new();
        while let Some(key) = map.next_key::<String>()? {
            let value: TemplateValue = map.next_value().map_err(|e| {
                de::Error::custom(format!("in entry '{key}': {e}"))
            })?;
            template.insert(key, value);
        }
        Ok(template)
    }
}

struct TemplateValueVisitor;

impl<'de> Visitor<'de> for TemplateValueVisitor {
    type Value = TemplateValue;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a list of field specifiers or a nested template")
    }

    fn visit_seq<A: SeqAccess<'de>>(
        self,
        mut seq: A,
    ) -> std::result::Result<TemplateValue, A::Error> {
        let mut fields = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        // null is an empty positional placeholder
        while let Some(field) = seq.next_element::<Option<String>>()? {
            fields.push(field.unwrap_or_default());
        }
        Ok(TemplateValue::FieldList(fields))
    }

    fn visit_map<A: MapAccess<'de>>(self, map: A) -> std::result::Result<TemplateValue, A::Error> {
        TemplateVisitor.visit_map(map).map(TemplateValue::SubTemplate)
    }
}

/// Top-level template keys bound to the element names that the streaming
/// source matches on.
#[derive(Debug, Clone)]
pub struct RootIndex {
    order: Vec<String>,
    roots: HashMap<String, Template>,
}

impl RootIndex {
    /// Partition a full template into root element templates.
    ///
    /// # Errors
    /// `InvalidTemplate` when a top-level key maps to a field list (there is
    /// no enclosing element to read it from), when a root key is not a plain
    /// element name, or when the template defines no roots at all.
    pub fn build(template: &Template) -> Result<Self> {
        let mut order = Vec::new();
        let mut roots = HashMap::new();

        for (key, value) in template.iter() {
            match value {
                TemplateValue::FieldList(_) => {
                    return Err(TranscodeError::InvalidTemplate(format!(
                        "top-level entry '{key}' is a field list; top-level entries must be \
                         nested templates keyed by element name"
                    )));
                }
                TemplateValue::SubTemplate(sub) => {
                    validate_root_name(key)?;
                    order.push(key.to_string());
                    roots.insert(key.to_string(), sub.clone());
                }
            }
        }

        if order.is_empty() {
            return Err(TranscodeError::InvalidTemplate(
                "template defines no root elements".to_string(),
            ));
        }

        Ok(Self { order, roots })
    }

    /// Template for a root element local name.
    #[must_use]
    pub fn get(&self, local_name: &str) -> Option<&Template> {
        self.roots.get(local_name)
    }

    /// Stored key and template for a root element local name given as bytes.
    #[must_use]
    pub fn lookup(&self, local_name: &[u8]) -> Option<(&str, &Template)> {
        let name = std::str::from_utf8(local_name).ok()?;
        self.roots
            .get_key_value(name)
            .map(|(k, v)| (k.as_str(), v))
    }

    /// Root names in declaration order.
    #[must_use]
    pub fn root_names(&self) -> &[String] {
        &self.order
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

fn validate_root_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_');
    let valid_rest = chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'));

    if valid_start && valid_rest {
        Ok(())
    } else {
        Err(TranscodeError::InvalidTemplate(format!(
            "root key '{name}' must be a plain element name without prefix or path"
        )))
    }
}
