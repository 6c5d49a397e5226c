use serde_json::{Number, Value};
use std::borrow::Cow;

/// A scalar cell of an output record
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Number(Number),
    Null,
}

impl FieldValue {
    /// Converts a JSON scalar into a field value
    ///
    /// Strings and numbers map directly, booleans become `true`/`false` text,
    /// and null, arrays, and objects become [`FieldValue::Null`].
    pub fn from_json(value: Option<&Value>) -> Self {
        match value {
            Some(Value::String(s)) => Self::Text(s.clone()),
            Some(Value::Number(n)) => Self::Number(n.clone()),
            Some(Value::Bool(b)) => Self::Text(b.to_string()),
            _ => Self::Null,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Renders the value as a CSV cell; null renders as an empty string
    pub fn render(&self) -> Cow<'_, str> {
        match self {
            Self::Text(s) => Cow::Borrowed(s),
            Self::Number(n) => Cow::Owned(n.to_string()),
            Self::Null => Cow::Borrowed(""),
        }
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<Option<String>> for FieldValue {
    fn from(value: Option<String>) -> Self {
        value.map(Self::Text).unwrap_or(Self::Null)
    }
}

/// One flattened award row
///
/// Fields keep insertion order, which is the column order of the export.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputRecord {
    fields: Vec<(String, FieldValue)>,
}

impl OutputRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a field; the caller keeps names unique
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.push((name.into(), value.into()));
    }

    /// Looks up a field by name
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(key, _)| key.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &FieldValue> {
        self.fields.iter().map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
