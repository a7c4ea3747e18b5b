//! Entity descriptors.
//!
//! Types implementing [`Entity`] describe a table: its name, its typed fields
//! and which of them identifies a row. `#[derive(Entity)]` generates the
//! implementation from a struct.
//!
//! # Example
//!
//! ```text
//! #[derive(Entity, Serialize, Deserialize, Clone)]
//! #[entity(table = "samples")]
//! pub struct Sample {
//!     pub id: i64,                 // identifying key (field named `id`)
//!     pub name: String,
//!     pub description: Option<String>,
//!     #[column(default_now)]
//!     pub created_at: NaiveDateTime,
//!     pub deleted_at: Option<NaiveDateTime>,
//! }
//! ```
//!
//! Mark a differently named key with `#[key]`. Use `#[column(name = "...")]`
//! to override the column name and `#[column(skip)]` to keep a field out of
//! storage (pair it with `#[serde(default)]`).

use std::collections::BTreeMap;

use serde::{Serialize, de::DeserializeOwned};

use crate::{RepositoryError, Value};

/// Semantic type of a field, independent of any database dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    Integer,
    Float,
    Boolean,
    Text,
    Timestamp,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Integer => "integer",
            FieldType::Float => "float",
            FieldType::Boolean => "boolean",
            FieldType::Text => "text",
            FieldType::Timestamp => "timestamp",
        }
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a backend fills a field that an insert leaves out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Generated {
    /// Next integer in sequence (serial key).
    AutoIncrement,
    /// Insert time.
    Now,
}

/// One declared field of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    /// Column name.
    pub name: &'static str,
    /// Rust field name (the serde key).
    pub attr: &'static str,
    pub field_type: FieldType,
    pub nullable: bool,
    pub generated: Option<Generated>,
}

impl Field {
    pub const fn new(name: &'static str, field_type: FieldType) -> Self {
        Self {
            name,
            attr: name,
            field_type,
            nullable: false,
            generated: None,
        }
    }

    pub const fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub const fn attr(mut self, attr: &'static str) -> Self {
        self.attr = attr;
        self
    }

    pub const fn generated(mut self, generated: Generated) -> Self {
        self.generated = Some(generated);
        self
    }
}

/// Field name stamped on every update when declared.
pub const UPDATED_AT: &str = "updated_at";

/// Field whose presence enables soft delete.
pub const DELETED_AT: &str = "deleted_at";

/// A typed record persisted in relational storage.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// The database table name for this type.
    fn table_name() -> &'static str;

    /// Type name used in log lines and error messages.
    fn entity_name() -> &'static str;

    /// Declared fields in column order.
    fn fields() -> &'static [Field];

    /// Column name of the identifying key.
    fn key_field() -> &'static str;

    fn field(name: &str) -> Option<&'static Field> {
        Self::fields().iter().find(|f| f.name == name)
    }

    fn has_field(name: &str) -> bool {
        Self::field(name).is_some()
    }

    fn supports_soft_delete() -> bool {
        Self::has_field(DELETED_AT)
    }

    fn tracks_updates() -> bool {
        Self::has_field(UPDATED_AT)
    }
}

/// A row as returned by a backend, keyed by column name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record(BTreeMap<String, Value>);

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }

    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(column.into(), value.into());
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Materialize an entity, mapping columns back to Rust field names.
    ///
    /// Missing columns become `null`, which deserializes into `None` for
    /// optional fields and fails for required ones.
    pub fn into_entity<T: Entity>(self) -> Result<T, RepositoryError> {
        let mut obj = serde_json::Map::new();
        for field in T::fields() {
            let value = match self.0.get(field.name) {
                Some(value) => value.to_json()?,
                None => serde_json::Value::Null,
            };
            obj.insert(field.attr.to_string(), value);
        }

        Ok(serde_json::from_value(serde_json::Value::Object(obj))?)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}
