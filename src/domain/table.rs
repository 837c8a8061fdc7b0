//! Table metadata
//!
//! Declarative description of a table: which backend stores it, its fields,
//! primary key, unique keys, and (for cache tables) which source table it mirrors.

use crate::domain::filter::QueryFilter;
use crate::domain::record::{KeyTuple, Record, Value};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Default name of the freshness column on cache tables
pub const DEFAULT_CACHED_DATE_FIELD: &str = "cachedDate";

/// Type of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// Text
    #[default]
    String,
    /// Whole number
    Integer,
    /// Decimal number
    Decimal,
    /// Boolean flag
    Boolean,
    /// Calendar date (`YYYY-MM-DD`)
    Date,
    /// Instant (RFC 3339)
    DateTime,
}

impl FieldType {
    /// Coerce a loosely-typed value (e.g. parsed from JSON) into this field type.
    ///
    /// Null passes through. Returns an error message when the value cannot be
    /// represented as this type.
    pub fn coerce(&self, value: Value) -> Result<Value, String> {
        let coerced = match (self, value) {
            (_, Value::Null) => Some(Value::Null),
            (FieldType::String, Value::String(s)) => Some(Value::String(s)),
            (FieldType::String, other) => Some(Value::String(other.to_string())),
            (FieldType::Integer, v) => v.as_i64().map(Value::Integer),
            (FieldType::Decimal, Value::Decimal(d)) => Some(Value::Decimal(d)),
            (FieldType::Decimal, Value::Integer(i)) => Some(Value::Decimal(i as f64)),
            (FieldType::Decimal, Value::String(s)) => s.trim().parse().ok().map(Value::Decimal),
            (FieldType::Boolean, Value::Boolean(b)) => Some(Value::Boolean(b)),
            (FieldType::Boolean, Value::String(s)) => match s.to_lowercase().as_str() {
                "true" | "yes" | "1" => Some(Value::Boolean(true)),
                "false" | "no" | "0" => Some(Value::Boolean(false)),
                _ => None,
            },
            (FieldType::Date, Value::Date(d)) => Some(Value::Date(d)),
            (FieldType::Date, Value::DateTime(dt)) => Some(Value::Date(dt.date_naive())),
            (FieldType::Date, Value::String(s)) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                .ok()
                .map(Value::Date),
            (FieldType::DateTime, Value::DateTime(dt)) => Some(Value::DateTime(dt)),
            (FieldType::DateTime, Value::String(s)) => DateTime::parse_from_rfc3339(s.trim())
                .ok()
                .map(|dt| Value::DateTime(dt.with_timezone(&Utc))),
            _ => None,
        };

        coerced.ok_or_else(|| format!("value cannot be converted to {self:?}"))
    }
}

/// One allowed value of an enumerated field, with its display label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PossibleValue {
    /// Stored value
    pub id: Value,
    /// Label shown to users
    pub label: String,
}

/// Field definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMetaData {
    /// Field name
    pub name: String,

    /// Field type
    #[serde(default, rename = "type")]
    pub field_type: FieldType,

    /// Enumerated values, if this field is backed by a possible-value source
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub possible_values: Vec<PossibleValue>,
}

impl FieldMetaData {
    /// Create a field with no possible values
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            possible_values: Vec::new(),
        }
    }

    /// Label for a stored value, if this field enumerates it
    pub fn possible_value_label(&self, value: &Value) -> Option<&str> {
        self.possible_values
            .iter()
            .find(|pv| pv.id.matches(value))
            .map(|pv| pv.label.as_str())
    }
}

/// An ordered set of field names whose combined values identify one record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UniqueKey {
    /// Field names, in key order
    pub fields: Vec<String>,
}

impl UniqueKey {
    /// Create a unique key over the given fields
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    /// Key tuple of a record for this key
    pub fn tuple_of(&self, record: &Record) -> Option<KeyTuple> {
        record.key_tuple(&self.fields)
    }

    /// Human-readable field list, used in error messages
    pub fn describe(&self) -> String {
        self.fields.join(" and ")
    }
}

/// Rule describing how lookups on a cache table are served from its source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheUseCase {
    /// Unique key on the cache table
    pub cache_unique_key: UniqueKey,

    /// Matching unique key on the source table (fields map positionally)
    pub source_unique_key: UniqueKey,

    /// Remember source misses in the cache (not supported; must stay false)
    #[serde(default)]
    pub cache_source_misses: bool,

    /// Copy the source's primary key value into the cache row's primary key
    #[serde(default)]
    pub copy_source_primary_key: bool,

    /// Source records matching any of these filters are never written to the cache
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude_records_matching: Vec<QueryFilter>,
}

impl CacheUseCase {
    /// Whether a source record is disqualified from caching
    pub fn is_excluded(&self, source_record: &Record) -> bool {
        self.exclude_records_matching
            .iter()
            .any(|filter| filter.matches(source_record))
    }

    /// Translate a cache-table field name to its source-table counterpart
    pub fn source_field_for(&self, cache_field: &str) -> Option<&str> {
        self.cache_unique_key
            .fields
            .iter()
            .position(|f| f == cache_field)
            .and_then(|i| self.source_unique_key.fields.get(i))
            .map(String::as_str)
    }
}

/// Declares that a table caches rows of another table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheOf {
    /// Name of the source table
    pub source_table: String,

    /// Rows older than this are stale
    pub expiration_seconds: u64,

    /// Freshness column on the cache table
    #[serde(default = "default_cached_date_field")]
    pub cached_date_field: String,

    /// Lookup rules
    pub use_cases: Vec<CacheUseCase>,
}

impl CacheOf {
    /// Use case whose cache unique key is exactly the given field list
    pub fn use_case_for_fields(&self, fields: &[String]) -> Option<&CacheUseCase> {
        self.use_cases
            .iter()
            .find(|uc| uc.cache_unique_key.fields == fields)
    }
}

fn default_cached_date_field() -> String {
    DEFAULT_CACHED_DATE_FIELD.to_string()
}

/// Table definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableMetaData {
    /// Table name (unique within an instance)
    pub name: String,

    /// Name of the backend storing this table
    pub backend_name: String,

    /// Primary key field
    #[serde(default = "default_primary_key_field")]
    pub primary_key_field: String,

    /// Field definitions
    #[serde(default)]
    pub fields: Vec<FieldMetaData>,

    /// Unique keys
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unique_keys: Vec<UniqueKey>,

    /// Present when this table is a cache of another table
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_of: Option<CacheOf>,
}

fn default_primary_key_field() -> String {
    "id".to_string()
}

impl TableMetaData {
    /// Create a table with an `id` primary key and no fields
    pub fn new(name: impl Into<String>, backend_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            backend_name: backend_name.into(),
            primary_key_field: default_primary_key_field(),
            fields: Vec::new(),
            unique_keys: Vec::new(),
            cache_of: None,
        }
    }

    /// Builder: add a field
    pub fn with_field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.push(FieldMetaData::new(name, field_type));
        self
    }

    /// Builder: add a field definition
    pub fn with_field_meta(mut self, field: FieldMetaData) -> Self {
        self.fields.push(field);
        self
    }

    /// Builder: add a unique key
    pub fn with_unique_key(mut self, key: UniqueKey) -> Self {
        self.unique_keys.push(key);
        self
    }

    /// Builder: mark as a cache table
    pub fn with_cache_of(mut self, cache_of: CacheOf) -> Self {
        self.cache_of = Some(cache_of);
        self
    }

    /// Look up a field definition
    pub fn field(&self, name: &str) -> Option<&FieldMetaData> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Whether a field is defined (the primary key always is)
    pub fn has_field(&self, name: &str) -> bool {
        name == self.primary_key_field || self.field(name).is_some()
    }

    /// Whether this table is a cache of another table
    pub fn is_cache_table(&self) -> bool {
        self.cache_of.is_some()
    }

    /// Validate internal references
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("table name cannot be empty".to_string());
        }
        if self.backend_name.trim().is_empty() {
            return Err(format!("table '{}' has no backend_name", self.name));
        }

        for key in &self.unique_keys {
            if key.fields.is_empty() {
                return Err(format!("table '{}' has an empty unique key", self.name));
            }
            for field in &key.fields {
                if !self.has_field(field) {
                    return Err(format!(
                        "unique key field '{}' is not defined on table '{}'",
                        field, self.name
                    ));
                }
            }
        }

        if let Some(cache_of) = &self.cache_of {
            if cache_of.use_cases.is_empty() {
                return Err(format!("cache table '{}' has no use cases", self.name));
            }
            if !self.has_field(&cache_of.cached_date_field) {
                return Err(format!(
                    "cache table '{}' does not define its cached date field '{}'",
                    self.name, cache_of.cached_date_field
                ));
            }
            for use_case in &cache_of.use_cases {
                if use_case.cache_unique_key.fields.len() != use_case.source_unique_key.fields.len()
                {
                    return Err(format!(
                        "cache table '{}' maps unique keys of different sizes",
                        self.name
                    ));
                }
                if use_case.cache_source_misses {
                    return Err(format!(
                        "cache table '{}' enables cache_source_misses, which is not supported",
                        self.name
                    ));
                }
                if !self.unique_keys.contains(&use_case.cache_unique_key) {
                    return Err(format!(
                        "cache use case key ({}) is not a unique key of table '{}'",
                        use_case.cache_unique_key.describe(),
                        self.name
                    ));
                }
            }
        }

        Ok(())
    }
}
