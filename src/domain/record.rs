//! Records and field values
//!
//! A [`Record`] is an insertion-ordered map of field name to [`Value`], plus the
//! per-record errors and warnings collected while it travels through actions and
//! process steps, and the display values attached for rendering.

use crate::domain::errors::QqqError;
use crate::domain::Result;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Ordered values of a unique key's fields for one record
pub type KeyTuple = Vec<Value>;

/// A single typed field value
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// Absent / SQL NULL
    #[default]
    Null,
    /// Text
    String(String),
    /// Whole number
    Integer(i64),
    /// Decimal number
    Decimal(f64),
    /// Boolean flag
    Boolean(bool),
    /// Calendar date
    Date(NaiveDate),
    /// Instant in UTC
    DateTime(DateTime<Utc>),
}

impl Value {
    /// Returns true for [`Value::Null`]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Null, or a string that is empty after trimming
    pub fn is_blank(&self) -> bool {
        match self {
            Value::Null => true,
            Value::String(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Borrow the inner string, if this is a string value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Integer view of this value (decimals with no fraction and numeric strings included)
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Decimal(d) if d.fract() == 0.0 => Some(*d as i64),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Instant view of this value
    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::DateTime(dt) => Some(*dt),
            Value::String(s) => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
            _ => None,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Decimal(d) => Some(*d),
            _ => None,
        }
    }

    /// Compare two values for filtering.
    ///
    /// Integers and decimals compare numerically; other variants only compare
    /// with themselves. Null never compares.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => None,
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
            (Value::DateTime(a), Value::DateTime(b)) => Some(a.cmp(b)),
            (Value::DateTime(a), Value::String(_)) => other.as_datetime().map(|b| a.cmp(&b)),
            (Value::String(_), Value::DateTime(b)) => self.as_datetime().map(|a| a.cmp(b)),
            (Value::Date(a), Value::String(s)) => {
                NaiveDate::parse_from_str(s, "%Y-%m-%d").ok().map(|b| a.cmp(&b))
            }
            (Value::String(s), Value::Date(b)) => {
                NaiveDate::parse_from_str(s, "%Y-%m-%d").ok().map(|a| a.cmp(b))
            }
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a.partial_cmp(&b),
                _ => None,
            },
        }
    }

    /// Loose equality used by filters (numeric variants compare by value)
    pub fn matches(&self, other: &Value) -> bool {
        self.compare(other) == Some(Ordering::Equal)
    }

    /// Convert from a JSON value; arrays and objects are rejected
    pub fn from_json(json: &serde_json::Value) -> Result<Self> {
        Ok(match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => Value::Decimal(n.as_f64().unwrap_or_default()),
            },
            serde_json::Value::String(s) => Value::String(s.clone()),
            other => {
                return Err(QqqError::Serialization(format!(
                    "Unsupported field value (expected a scalar): {other}"
                )))
            }
        })
    }

    /// Convert into a JSON value
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Integer(i) => serde_json::Value::from(*i),
            Value::Decimal(d) => serde_json::Value::from(*d),
            Value::Boolean(b) => serde_json::Value::Bool(*b),
            Value::Date(d) => serde_json::Value::String(d.format("%Y-%m-%d").to_string()),
            Value::DateTime(dt) => {
                serde_json::Value::String(dt.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Decimal(a), Value::Decimal(b)) => normalized_bits(*a) == normalized_bits(*b),
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::DateTime(a), Value::DateTime(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::String(s) => s.hash(state),
            Value::Integer(i) => i.hash(state),
            Value::Decimal(d) => normalized_bits(*d).hash(state),
            Value::Boolean(b) => b.hash(state),
            Value::Date(d) => d.hash(state),
            Value::DateTime(dt) => dt.hash(state),
        }
    }
}

// -0.0 and 0.0 must hash alike
fn normalized_bits(d: f64) -> u64 {
    if d == 0.0 {
        0.0f64.to_bits()
    } else {
        d.to_bits()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::String(s) => write!(f, "{s}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Decimal(d) => write!(f, "{d}"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::DateTime(dt) => write!(f, "{}", dt.to_rfc3339_opts(SecondsFormat::Secs, true)),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Decimal(d)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Value::Date(d)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(dt: DateTime<Utc>) -> Self {
        Value::DateTime(dt)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let json = serde_json::Value::deserialize(deserializer)?;
        Value::from_json(&json).map_err(serde::de::Error::custom)
    }
}

/// An error or warning attached to a single record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMessage {
    /// Human-readable message
    pub message: String,
}

impl RecordMessage {
    /// Create a new message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for RecordMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// One row / entity
///
/// # Examples
///
/// ```
/// use qqq::domain::record::{Record, Value};
///
/// let record = Record::new()
///     .with_value("firstName", "Darin")
///     .with_value("noOfShoes", 2);
///
/// assert_eq!(record.value("firstName"), Some(&Value::from("Darin")));
/// assert!(!record.has_errors());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    values: IndexMap<String, Value>,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    display_values: IndexMap<String, String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    errors: Vec<RecordMessage>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    warnings: Vec<RecordMessage>,
}

impl Record {
    /// Create an empty record
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter
    pub fn with_value(mut self, field_name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set_value(field_name, value);
        self
    }

    /// Set (or replace) a field value, keeping the original field position
    pub fn set_value(&mut self, field_name: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(field_name.into(), value.into());
    }

    /// Get a field value
    pub fn value(&self, field_name: &str) -> Option<&Value> {
        self.values.get(field_name)
    }

    /// Get a field value, treating an absent field as null
    pub fn value_or_null(&self, field_name: &str) -> &Value {
        static NULL: Value = Value::Null;
        self.values.get(field_name).unwrap_or(&NULL)
    }

    /// Remove a field, returning its value
    pub fn remove_value(&mut self, field_name: &str) -> Option<Value> {
        self.values.shift_remove(field_name)
    }

    /// All field values in insertion order
    pub fn values(&self) -> &IndexMap<String, Value> {
        &self.values
    }

    /// Key tuple for the given fields; `None` if any of them is null or absent
    pub fn key_tuple(&self, field_names: &[String]) -> Option<KeyTuple> {
        field_names
            .iter()
            .map(|name| match self.value_or_null(name) {
                Value::Null => None,
                value => Some(value.clone()),
            })
            .collect()
    }

    /// Attach a display value for a field
    pub fn set_display_value(&mut self, field_name: impl Into<String>, display: impl Into<String>) {
        self.display_values.insert(field_name.into(), display.into());
    }

    /// Display value for a field, if annotated
    pub fn display_value(&self, field_name: &str) -> Option<&str> {
        self.display_values.get(field_name).map(String::as_str)
    }

    /// Attach an error
    pub fn add_error(&mut self, message: impl Into<String>) {
        self.errors.push(RecordMessage::new(message));
    }

    /// Attach a warning
    pub fn add_warning(&mut self, message: impl Into<String>) {
        self.warnings.push(RecordMessage::new(message));
    }

    /// Errors attached to this record
    pub fn errors(&self) -> &[RecordMessage] {
        &self.errors
    }

    /// Warnings attached to this record
    pub fn warnings(&self) -> &[RecordMessage] {
        &self.warnings
    }

    /// Whether any error is attached
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Drop errors, warnings and display values, keeping only field values
    pub fn clear_annotations(&mut self) {
        self.errors.clear();
        self.warnings.clear();
        self.display_values.clear();
    }

    /// Build a record from a JSON object of field values
    pub fn from_json(json: &serde_json::Value) -> Result<Self> {
        let object = json.as_object().ok_or_else(|| {
            QqqError::Serialization(format!("Expected a JSON object for a record, got: {json}"))
        })?;

        let mut record = Record::new();
        for (name, value) in object {
            record.set_value(name.clone(), Value::from_json(value)?);
        }
        Ok(record)
    }

    /// Field values as a JSON object
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.values
                .iter()
                .map(|(name, value)| (name.clone(), value.to_json()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;

    #[test]
    fn test_record_preserves_field_order() {
        let record = Record::new()
            .with_value("id", 1)
            .with_value("lastName", "Kelkhoff")
            .with_value("firstName", "Darin");

        let names: Vec<&String> = record.values().keys().collect();
        assert_eq!(names, vec!["id", "lastName", "firstName"]);
    }

    #[test]
    fn test_key_tuple_requires_all_values() {
        let record = Record::new().with_value("a", 1).with_value("b", Value::Null);

        assert_eq!(
            record.key_tuple(&["a".to_string()]),
            Some(vec![Value::Integer(1)])
        );
        assert_eq!(record.key_tuple(&["a".to_string(), "b".to_string()]), None);
        assert_eq!(record.key_tuple(&["missing".to_string()]), None);
    }

    #[test]
    fn test_value_hash_and_eq_for_key_tuples() {
        let mut set = HashSet::new();
        set.insert(vec![Value::from("x"), Value::Decimal(1.5)]);
        assert!(set.contains(&vec![Value::from("x"), Value::Decimal(1.5)]));
        assert!(!set.contains(&vec![Value::from("x"), Value::Decimal(2.5)]));
        assert_eq!(Value::Decimal(0.0), Value::Decimal(-0.0));
    }

    #[test]
    fn test_value_compare_numeric_across_variants() {
        assert_eq!(
            Value::Integer(2).compare(&Value::Decimal(2.0)),
            Some(Ordering::Equal)
        );
        assert!(Value::Integer(2).matches(&Value::Decimal(2.0)));
        assert_eq!(Value::Integer(2).compare(&Value::from("2")), None);
        assert_eq!(Value::Null.compare(&Value::Null), None);
    }

    #[test]
    fn test_value_datetime_compares_with_rfc3339_string() {
        let dt = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(
            Value::DateTime(dt).compare(&Value::from("2025-01-01T00:00:00Z")),
            Some(Ordering::Less)
        );
    }

    #[test]
    fn test_record_json_round_trip_of_values() {
        let json = json!({"id": 7, "name": "Tim", "shoeSize": 10.5, "active": true, "note": null});
        let record = Record::from_json(&json).unwrap();

        assert_eq!(record.value("id"), Some(&Value::Integer(7)));
        assert_eq!(record.value("shoeSize"), Some(&Value::Decimal(10.5)));
        assert_eq!(record.value("note"), Some(&Value::Null));
        assert_eq!(record.to_json(), json);
    }

    #[test]
    fn test_record_from_json_rejects_nested_values() {
        assert!(Record::from_json(&json!({"tags": ["a"]})).is_err());
        assert!(Record::from_json(&json!([1, 2])).is_err());
    }

    #[test]
    fn test_record_errors_and_warnings() {
        let mut record = Record::new().with_value("id", 1);
        record.add_warning("Field was ignored");
        assert!(!record.has_errors());

        record.add_error("Another record already exists");
        assert!(record.has_errors());
        assert_eq!(record.errors()[0].message, "Another record already exists");
        assert_eq!(record.warnings().len(), 1);

        record.clear_annotations();
        assert!(record.errors().is_empty());
        assert!(record.warnings().is_empty());
    }
}
