//! crates/carelink_core/src/fields.rs
//!
//! The typed-field model of the document store.
//!
//! The backing store is schema-typed per value, not per document, so every
//! field carries its own type tag. Serialized, a value looks like
//! `{"stringValue": "ada"}` or `{"objectArrayValue": [{...}, ...]}`.

use crate::ports::{PortError, PortResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The fields of one document, keyed by field name.
pub type Fields = BTreeMap<String, FieldValue>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldValue {
    StringValue(String),
    IntegerValue(i64),
    DoubleValue(f64),
    BooleanValue(bool),
    TimestampValue(DateTime<Utc>),
    StringArrayValue(Vec<String>),
    ObjectArrayValue(Vec<Fields>),
}

impl FieldValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldValue::StringValue(_) => "string",
            FieldValue::IntegerValue(_) => "integer",
            FieldValue::DoubleValue(_) => "double",
            FieldValue::BooleanValue(_) => "boolean",
            FieldValue::TimestampValue(_) => "timestamp",
            FieldValue::StringArrayValue(_) => "string-array",
            FieldValue::ObjectArrayValue(_) => "object-array",
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::StringValue(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::StringValue(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::IntegerValue(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::DoubleValue(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::BooleanValue(value)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        FieldValue::TimestampValue(value)
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(value: Vec<String>) -> Self {
        FieldValue::StringArrayValue(value)
    }
}

impl From<Vec<Fields>> for FieldValue {
    fn from(value: Vec<Fields>) -> Self {
        FieldValue::ObjectArrayValue(value)
    }
}

//=========================================================================================
// Reading typed fields
//=========================================================================================

/// Typed accessors over a decoded document. Every failure names the document kind
/// and field so a malformed record is easy to find.
pub struct FieldReader<'a> {
    kind: &'static str,
    fields: &'a Fields,
}

impl<'a> FieldReader<'a> {
    pub fn new(kind: &'static str, fields: &'a Fields) -> Self {
        Self { kind, fields }
    }

    fn field(&self, name: &str) -> PortResult<&'a FieldValue> {
        self.fields
            .get(name)
            .ok_or_else(|| PortError::Unexpected(format!("{}: missing field '{}'", self.kind, name)))
    }

    fn mismatch(&self, name: &str, expected: &str, found: &FieldValue) -> PortError {
        PortError::Unexpected(format!(
            "{}: field '{}' should be {}, found {}",
            self.kind,
            name,
            expected,
            found.type_name()
        ))
    }

    pub fn string(&self, name: &str) -> PortResult<String> {
        match self.field(name)? {
            FieldValue::StringValue(s) => Ok(s.clone()),
            other => Err(self.mismatch(name, "string", other)),
        }
    }

    /// Like `string`, but an absent field reads as empty.
    pub fn string_or_empty(&self, name: &str) -> PortResult<String> {
        match self.fields.get(name) {
            None => Ok(String::new()),
            Some(_) => self.string(name),
        }
    }

    pub fn integer(&self, name: &str) -> PortResult<i64> {
        match self.field(name)? {
            FieldValue::IntegerValue(i) => Ok(*i),
            other => Err(self.mismatch(name, "integer", other)),
        }
    }

    /// Decimal values written as whole numbers come back as integers.
    pub fn double(&self, name: &str) -> PortResult<f64> {
        match self.field(name)? {
            FieldValue::DoubleValue(d) => Ok(*d),
            FieldValue::IntegerValue(i) => Ok(*i as f64),
            other => Err(self.mismatch(name, "double", other)),
        }
    }

    pub fn boolean(&self, name: &str) -> PortResult<bool> {
        match self.field(name)? {
            FieldValue::BooleanValue(b) => Ok(*b),
            other => Err(self.mismatch(name, "boolean", other)),
        }
    }

    pub fn timestamp(&self, name: &str) -> PortResult<DateTime<Utc>> {
        match self.field(name)? {
            FieldValue::TimestampValue(t) => Ok(*t),
            other => Err(self.mismatch(name, "timestamp", other)),
        }
    }

    pub fn optional_timestamp(&self, name: &str) -> PortResult<Option<DateTime<Utc>>> {
        match self.fields.get(name) {
            None => Ok(None),
            Some(FieldValue::TimestampValue(t)) => Ok(Some(*t)),
            Some(other) => Err(self.mismatch(name, "timestamp", other)),
        }
    }

    /// An absent array reads as empty.
    pub fn string_array(&self, name: &str) -> PortResult<Vec<String>> {
        match self.fields.get(name) {
            None => Ok(Vec::new()),
            Some(FieldValue::StringArrayValue(v)) => Ok(v.clone()),
            Some(other) => Err(self.mismatch(name, "string-array", other)),
        }
    }

    pub fn object_array(&self, name: &str) -> PortResult<&'a [Fields]> {
        match self.fields.get(name) {
            None => Ok(&[]),
            Some(FieldValue::ObjectArrayValue(v)) => Ok(v.as_slice()),
            Some(other) => Err(self.mismatch(name, "object-array", other)),
        }
    }
}

/// Builds a `Fields` map from `(name, value)` pairs.
pub fn fields<I, K>(entries: I) -> Fields
where
    I: IntoIterator<Item = (K, FieldValue)>,
    K: Into<String>,
{
    entries.into_iter().map(|(k, v)| (k.into(), v)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_serialize_with_their_type_tag() {
        let doc = fields([
            ("email", FieldValue::from("ada@example.com")),
            ("age", FieldValue::from(34_i64)),
            ("caretakersID", FieldValue::from(vec!["u1".to_string()])),
        ]);
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["email"]["stringValue"], "ada@example.com");
        assert_eq!(json["age"]["integerValue"], 34);
        assert_eq!(json["caretakersID"]["stringArrayValue"][0], "u1");
    }

    #[test]
    fn nested_object_arrays_keep_their_types() {
        let option = fields([
            ("text", FieldValue::from("Good")),
            ("points", FieldValue::from(0.75)),
        ]);
        let doc = fields([("options", FieldValue::from(vec![option]))]);
        let json = serde_json::to_string(&doc).unwrap();
        let back: Fields = serde_json::from_str(&json).unwrap();
        let reader = FieldReader::new("question", &back);
        let options = reader.object_array("options").unwrap();
        assert_eq!(FieldReader::new("option", &options[0]).double("points").unwrap(), 0.75);
    }

    #[test]
    fn reader_reports_missing_and_mistyped_fields() {
        let doc = fields([("age", FieldValue::from("thirty"))]);
        let reader = FieldReader::new("user", &doc);

        let missing = reader.string("email").unwrap_err().to_string();
        assert!(missing.contains("missing field 'email'"));

        let mistyped = reader.integer("age").unwrap_err().to_string();
        assert!(mistyped.contains("should be integer"));
    }

    #[test]
    fn whole_number_points_read_as_double() {
        let doc = fields([("points", FieldValue::from(1_i64))]);
        assert_eq!(FieldReader::new("option", &doc).double("points").unwrap(), 1.0);
    }
}
