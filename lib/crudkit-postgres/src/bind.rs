//! Typed parameter binding and row decoding.
//!
//! Values bind with the column's declared [`FieldType`] so that nulls carry
//! the right parameter type. Rows decode by PostgreSQL type name into
//! crudkit [`Value`]s and then into the entity through its serde impl.

use chrono::{DateTime, NaiveDateTime, Utc};
use crudkit::{Entity, FieldMap, FieldType, Filter, Record, RepositoryError, Value};
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::{Arguments, Column, Row, TypeInfo};

fn column_type<T: Entity>(column: &str) -> Result<FieldType, RepositoryError> {
    T::field(column)
        .map(|f| f.field_type)
        .ok_or_else(|| RepositoryError::UnknownField {
            entity: T::entity_name().to_string(),
            field: column.to_string(),
        })
}

/// Bind a Value to PgArguments.
pub fn bind_value(
    args: &mut PgArguments,
    value: &Value,
    field_type: FieldType,
) -> Result<(), RepositoryError> {
    match value {
        Value::Null => match field_type {
            FieldType::Integer => args.add(None::<i64>),
            FieldType::Float => args.add(None::<f64>),
            FieldType::Boolean => args.add(None::<bool>),
            FieldType::Timestamp => args.add(None::<NaiveDateTime>),
            FieldType::Text => args.add(None::<String>),
        },
        Value::Text(s) => args.add(s.clone()),
        Value::Int(n) => match field_type {
            FieldType::Float => args.add(*n as f64),
            _ => args.add(*n),
        },
        Value::Float(n) => args.add(*n),
        Value::Bool(b) => args.add(*b),
        Value::Timestamp(ts) => args.add(*ts),
    }
    .map_err(RepositoryError::backend)
}

/// Bind filter values in clause order. `IS NULL` filters take no parameter.
pub fn bind_filters<T: Entity>(
    args: &mut PgArguments,
    filters: &[Filter],
) -> Result<(), RepositoryError> {
    for filter in filters {
        if let Filter::Eq(field, value) = filter {
            bind_value(args, value, column_type::<T>(field)?)?;
        }
    }
    Ok(())
}

/// Bind every entry of a column map, in the map's order.
pub fn bind_fields<T: Entity>(
    args: &mut PgArguments,
    values: &FieldMap,
) -> Result<(), RepositoryError> {
    for (field, value) in values.iter() {
        bind_value(args, value, column_type::<T>(field)?)?;
    }
    Ok(())
}

/// Decode a PostgreSQL row into an entity.
///
/// Only declared columns are read; extra columns in the row are ignored.
pub fn decode_row<T: Entity>(row: &PgRow) -> Result<T, RepositoryError> {
    let mut record = Record::new();
    for field in T::fields() {
        record.set(field.name, extract_column_value(row, field.name)?);
    }
    record.into_entity()
}

/// Extract a column value from a row
/// Column types that cannot decode into any crudkit value.
fn unsupported_type(column: &str, type_name: &str) -> Option<RepositoryError> {
    match type_name {
        "NUMERIC" => Some(RepositoryError::Storage(format!(
            "column \"{}\" is NUMERIC; declare float columns as FLOAT4 or FLOAT8",
            column
        ))),
        _ => None,
    }
}

fn extract_column_value(row: &PgRow, col_name: &str) -> Result<Value, RepositoryError> {
    // Find the column index
    let col_idx = row
        .columns()
        .iter()
        .position(|c| c.name() == col_name)
        .ok_or_else(|| RepositoryError::Storage(format!("Column not found: {}", col_name)))?;

    let type_name = row.columns()[col_idx].type_info().name();
    if let Some(err) = unsupported_type(col_name, type_name) {
        return Err(err);
    }

    // Handle based on PostgreSQL type
    let value = match type_name {
        "BOOL" => row
            .try_get::<Option<bool>, _>(col_idx)
            .map(|v| v.map(Value::Bool)),
        "INT2" => row
            .try_get::<Option<i16>, _>(col_idx)
            .map(|v| v.map(|n| Value::Int(n.into()))),
        "INT4" => row
            .try_get::<Option<i32>, _>(col_idx)
            .map(|v| v.map(|n| Value::Int(n.into()))),
        "INT8" => row
            .try_get::<Option<i64>, _>(col_idx)
            .map(|v| v.map(Value::Int)),
        "FLOAT4" => row
            .try_get::<Option<f32>, _>(col_idx)
            .map(|v| v.map(|n| Value::Float(n.into()))),
        "FLOAT8" => row
            .try_get::<Option<f64>, _>(col_idx)
            .map(|v| v.map(Value::Float)),
        "TIMESTAMP" => row
            .try_get::<Option<NaiveDateTime>, _>(col_idx)
            .map(|v| v.map(Value::Timestamp)),
        "TIMESTAMPTZ" => row
            .try_get::<Option<DateTime<Utc>>, _>(col_idx)
            .map(|v| v.map(|dt| Value::Timestamp(dt.naive_utc()))),
        // Default: treat as string (VARCHAR, TEXT, CHAR, etc.)
        _ => row
            .try_get::<Option<String>, _>(col_idx)
            .map(|v| v.map(Value::Text)),
    }
    .map_err(RepositoryError::backend)?;

    Ok(value.unwrap_or(Value::Null))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_columns_are_rejected_with_a_hint() {
        let err = unsupported_type("price", "NUMERIC").unwrap();
        let message = err.to_string();
        assert!(message.contains("price"));
        assert!(message.contains("FLOAT8"));

        for type_name in ["FLOAT8", "INT8", "TEXT", "TIMESTAMPTZ"] {
            assert!(unsupported_type("price", type_name).is_none());
        }
    }
}
