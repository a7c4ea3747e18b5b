//! Coerce string-encoded filter values to their fields' declared types.
//!
//! Filters and payloads usually come from query strings, so every value may
//! arrive as text. [`cast`] looks up each key's [`FieldType`] and converts
//! text into the native [`Value`] variant, leaving already-native values
//! alone.
//!
//! | Field type  | Accepted text                                           |
//! |-------------|---------------------------------------------------------|
//! | `Integer`   | base-10 integer                                         |
//! | `Float`     | finite decimal float (no `NaN` or `inf`)                |
//! | `Boolean`   | `true 1 yes y t` / `false 0 no n f` (any case)          |
//! | `Timestamp` | `YYYY-MM-DD HH:MM:SS`, then `YYYY-MM-DD` (midnight)     |
//! | `Text`      | anything (kept verbatim)                                |
//!
//! `null` and `none`, in any case, become [`Value::Null`] for every type.

use crate::entity::{Entity, Field, FieldType};
use crate::{FieldMap, RepositoryError, Value, time};

const TRUE_VALUES: &[&str] = &["true", "1", "yes", "y", "t"];
const FALSE_VALUES: &[&str] = &["false", "0", "no", "n", "f"];
const NULL_VALUES: &[&str] = &["null", "none"];

/// Why a single value failed to coerce. Logged, never returned.
#[derive(Debug)]
struct CastFailure(String);

impl std::fmt::Display for CastFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn cast_to_int(value: &str) -> Result<Value, CastFailure> {
    value
        .parse::<i64>()
        .map(Value::Int)
        .map_err(|e| CastFailure(e.to_string()))
}

fn cast_to_float(value: &str) -> Result<Value, CastFailure> {
    let parsed = value
        .parse::<f64>()
        .map_err(|e| CastFailure(e.to_string()))?;
    if !parsed.is_finite() {
        return Err(CastFailure(format!("Not a finite number: {}", value)));
    }
    Ok(Value::Float(parsed))
}

fn cast_to_bool(value: &str) -> Result<Value, CastFailure> {
    let lowered = value.to_lowercase();
    if TRUE_VALUES.contains(&lowered.as_str()) {
        return Ok(Value::Bool(true));
    }
    if FALSE_VALUES.contains(&lowered.as_str()) {
        return Ok(Value::Bool(false));
    }
    Err(CastFailure(format!("Cannot convert to boolean: {}", value)))
}

fn cast_to_timestamp(value: &str) -> Result<Value, CastFailure> {
    time::parse_timestamp(value)
        .map(Value::Timestamp)
        .ok_or_else(|| {
            CastFailure(format!(
                "Cannot convert '{}' to timestamp. Use one of formats: {:?}",
                value,
                time::TIMESTAMP_FORMATS
            ))
        })
}

fn cast_value(field_type: FieldType, value: &str) -> Result<Value, CastFailure> {
    match field_type {
        FieldType::Integer => cast_to_int(value),
        FieldType::Float => cast_to_float(value),
        FieldType::Boolean => cast_to_bool(value),
        FieldType::Timestamp => cast_to_timestamp(value),
        FieldType::Text => Ok(Value::Text(value.to_string())),
    }
}

/// Cast a single value for `field` of entity `entity`.
pub fn cast_field(entity: &str, field: &Field, value: &Value) -> Result<Value, RepositoryError> {
    let raw = match value {
        Value::Text(raw) => raw,
        Value::Float(n) if !n.is_finite() => {
            tracing::warn!(entity, field = field.name, value = %n, "non-finite float");
            return Err(RepositoryError::InvalidValue {
                field: field.name.to_string(),
            });
        }
        other => return Ok(other.clone()),
    };

    if NULL_VALUES.contains(&raw.to_lowercase().as_str()) {
        return Ok(Value::Null);
    }

    if field.field_type == FieldType::Text {
        tracing::debug!(
            entity,
            field = field.name,
            "no coercion for text field; using raw value"
        );
    }

    cast_value(field.field_type, raw).map_err(|e| {
        tracing::warn!(
            entity,
            field = field.name,
            value = %raw,
            field_type = %field.field_type,
            error = %e,
            "failed to cast value"
        );
        RepositoryError::InvalidValue {
            field: field.name.to_string(),
        }
    })
}

/// Cast every entry of `filters` against an explicit field list.
///
/// Fails on the first key not present in `fields`.
pub fn cast_fields(
    entity: &str,
    fields: &[Field],
    filters: &FieldMap,
) -> Result<FieldMap, RepositoryError> {
    let mut casted = FieldMap::new();
    for (key, value) in filters.iter() {
        let field = fields.iter().find(|f| f.name == key).ok_or_else(|| {
            RepositoryError::UnknownField {
                entity: entity.to_string(),
                field: key.to_string(),
            }
        })?;
        casted.insert(key, cast_field(entity, field, value)?);
    }
    Ok(casted)
}

/// Cast `filters` to the declared field types of `T`.
///
/// Returns a new map with the same keys; `filters` is left untouched.
pub fn cast<T: Entity>(filters: &FieldMap) -> Result<FieldMap, RepositoryError> {
    cast_fields(T::entity_name(), T::fields(), filters)
}
