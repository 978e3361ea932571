//! Element-to-record conversion.
//!
//! [`convert`] turns one [`Element`] subtree into a [`Record`], the canonical
//! JSON-compatible form written to shards:
//!
//! - attributes become string fields, in document order;
//! - children become fields keyed by tag name, in document order;
//! - a tag that occurs more than once becomes a [`Field::Many`] holding every
//!   occurrence in order; a tag that occurs once stays a [`Field::One`];
//! - trimmed text is stored under [`TEXT_KEY`] when the element has any other
//!   field, and otherwise the element collapses to [`Record::Text`].
//!
//! The single-versus-many shape of a field depends on the input, so readers of
//! a field that may repeat should go through [`Field::as_slice`].
//!
//! Conversion is pure and cannot fail.

use crate::element::Element;
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use serde_json::Value;
use std::collections::HashMap;

/// Reserved key holding element text alongside attributes or children.
pub const TEXT_KEY: &str = "_text";

/// A converted record: either collapsed text or an ordered object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Record {
    Text(String),
    Object(Fields),
}

/// A field value: a single converted value, or every occurrence of a repeated tag.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Field {
    One(Record),
    Many(Vec<Record>),
}

/// Ordered, key-unique field list of a [`Record::Object`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Fields {
    entries: Vec<(String, Field)>,
}

/// Convert an element subtree into its canonical record.
pub fn convert(node: &Element) -> Record {
    let mut builder = FieldsBuilder::with_capacity(node.attributes.len() + node.children.len());
    for (name, value) in &node.attributes {
        builder.push(name, Record::Text(value.clone()));
    }
    for child in &node.children {
        builder.push(&child.name, convert(child));
    }
    let mut fields = builder.finish();

    match &node.text {
        Some(text) if fields.is_empty() => Record::Text(text.clone()),
        Some(text) => {
            fields.set(TEXT_KEY, Field::One(Record::Text(text.clone())));
            Record::Object(fields)
        }
        None => Record::Object(fields),
    }
}

/// Accumulates fields, promoting a key to [`Field::Many`] on its first repeat.
struct FieldsBuilder<'a> {
    entries: Vec<(String, Field)>,
    index: HashMap<&'a str, usize>,
}

impl<'a> FieldsBuilder<'a> {
    fn with_capacity(n: usize) -> Self {
        Self {
            entries: Vec::with_capacity(n),
            index: HashMap::with_capacity(n),
        }
    }

    fn push(&mut self, key: &'a str, value: Record) {
        if let Some(&at) = self.index.get(key) {
            let slot = &mut self.entries[at].1;
            *slot = match std::mem::replace(slot, Field::Many(Vec::new())) {
                Field::One(first) => Field::Many(vec![first, value]),
                Field::Many(mut values) => {
                    values.push(value);
                    Field::Many(values)
                }
            };
        } else {
            self.index.insert(key, self.entries.len());
            self.entries.push((key.to_string(), Field::One(value)));
        }
    }

    fn finish(self) -> Fields {
        Fields {
            entries: self.entries,
        }
    }
}

impl Record {
    /// The collapsed text, if this record is [`Record::Text`].
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Record::Text(s) => Some(s),
            Record::Object(_) => None,
        }
    }

    /// The field list, if this record is [`Record::Object`].
    pub fn as_object(&self) -> Option<&Fields> {
        match self {
            Record::Object(f) => Some(f),
            Record::Text(_) => None,
        }
    }

    /// Shorthand for `as_object().and_then(|f| f.get(key))`.
    pub fn get(&self, key: &str) -> Option<&Field> {
        self.as_object().and_then(|f| f.get(key))
    }

    /// Render as a `serde_json::Value`, keeping field order.
    pub fn to_value(&self) -> Value {
        match self {
            Record::Text(s) => Value::String(s.clone()),
            Record::Object(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(k, f)| (k.to_string(), f.to_value()))
                    .collect(),
            ),
        }
    }
}

impl Field {
    /// View every value of this field, whether it occurred once or many times.
    pub fn as_slice(&self) -> &[Record] {
        match self {
            Field::One(r) => std::slice::from_ref(r),
            Field::Many(rs) => rs,
        }
    }

    /// The value when the field occurred exactly once.
    pub fn as_one(&self) -> Option<&Record> {
        match self {
            Field::One(r) => Some(r),
            Field::Many(_) => None,
        }
    }

    pub fn is_many(&self) -> bool {
        matches!(self, Field::Many(_))
    }

    pub fn to_value(&self) -> Value {
        match self {
            Field::One(r) => r.to_value(),
            Field::Many(rs) => Value::Array(rs.iter().map(Record::to_value).collect()),
        }
    }
}

impl Fields {
    pub fn get(&self, key: &str) -> Option<&Field> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, f)| f)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate `(key, field)` pairs in stored order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Field)> {
        self.entries.iter().map(|(k, f)| (k.as_str(), f))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Replace the field under `key` in place, or append it.
    fn set(&mut self, key: &str, field: Field) {
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = field,
            None => self.entries.push((key.to_string(), field)),
        }
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Record::Text(s) => serializer.serialize_str(s),
            Record::Object(fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (k, f) in fields.iter() {
                    map.serialize_entry(k, f)?;
                }
                map.end()
            }
        }
    }
}

impl Serialize for Field {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Field::One(r) => r.serialize(serializer),
            Field::Many(rs) => {
                let mut seq = serializer.serialize_seq(Some(rs.len()))?;
                for r in rs {
                    seq.serialize_element(r)?;
                }
                seq.end()
            }
        }
    }
}
