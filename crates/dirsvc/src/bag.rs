//! Backend-neutral attribute bag
//!
//! A raw directory entry: named, possibly multi-valued attributes whose values
//! are either text or raw bytes. Attribute names compare case-insensitively,
//! as LDAP attribute descriptions do.

use std::collections::HashMap;

/// A single attribute value as returned by a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue {
    Text(String),
    Binary(Vec<u8>),
}

impl AttributeValue {
    /// Get as text if this is a text value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(s) => Some(s),
            AttributeValue::Binary(_) => None,
        }
    }

    /// Raw bytes of the value; text values yield their UTF-8 encoding.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            AttributeValue::Text(s) => s.as_bytes(),
            AttributeValue::Binary(b) => b,
        }
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::Text(s)
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::Text(s.to_string())
    }
}

impl From<Vec<u8>> for AttributeValue {
    fn from(b: Vec<u8>) -> Self {
        AttributeValue::Binary(b)
    }
}

impl From<&[u8]> for AttributeValue {
    fn from(b: &[u8]) -> Self {
        AttributeValue::Binary(b.to_vec())
    }
}

#[derive(Debug, Clone)]
struct Slot {
    name: String,
    values: Vec<AttributeValue>,
}

/// Attributes of one directory entry.
#[derive(Debug, Clone, Default)]
pub struct AttributeBag {
    dn: Option<String>,
    attributes: HashMap<String, Slot>,
}

impl AttributeBag {
    /// Create an empty bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty bag for the entry at `dn`.
    pub fn for_entry(dn: impl Into<String>) -> Self {
        Self {
            dn: Some(dn.into()).filter(|d: &String| !d.is_empty()),
            attributes: HashMap::new(),
        }
    }

    /// DN the backend reported for this entry, if any.
    pub fn dn(&self) -> Option<&str> {
        self.dn.as_deref()
    }

    /// Append a value to an attribute.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<AttributeValue>) {
        let name = name.into();
        self.attributes
            .entry(name.to_ascii_lowercase())
            .or_insert_with(|| Slot {
                name,
                values: Vec::new(),
            })
            .values
            .push(value.into());
    }

    /// Append several values to an attribute.
    pub fn extend<V>(&mut self, name: impl Into<String>, values: impl IntoIterator<Item = V>)
    where
        V: Into<AttributeValue>,
    {
        let name = name.into();
        for value in values {
            self.push(name.clone(), value);
        }
    }

    /// Add a value using builder pattern.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.push(name, value);
        self
    }

    /// All values of an attribute; empty when absent.
    pub fn values(&self, name: &str) -> &[AttributeValue] {
        self.attributes
            .get(&name.to_ascii_lowercase())
            .map(|slot| slot.values.as_slice())
            .unwrap_or(&[])
    }

    /// First value of an attribute.
    pub fn first(&self, name: &str) -> Option<&AttributeValue> {
        self.values(name).first()
    }

    /// First value of an attribute, if it is text.
    pub fn get_text(&self, name: &str) -> Option<&str> {
        self.first(name).and_then(AttributeValue::as_text)
    }

    /// Every text value of an attribute.
    pub fn get_texts(&self, name: &str) -> Vec<&str> {
        self.values(name)
            .iter()
            .filter_map(AttributeValue::as_text)
            .collect()
    }

    /// Whether the attribute is present with at least one value.
    pub fn has(&self, name: &str) -> bool {
        !self.values(name).is_empty()
    }

    /// Attribute names as first inserted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.attributes.values().map(|slot| slot.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}
