//! In-memory backend.
//!
//! [`MemoryStore`] holds committed tables. A [`MemorySession`] copies each
//! table the first time it touches it and logs every row it inserts,
//! updates, or deletes. Commit replays that log, keyed by identifying key,
//! onto the tables as committed at that moment, so rows committed by other
//! sessions in the meantime survive. A replayed insert whose key now exists
//! fails the whole commit with [`RepositoryError::Conflict`] and leaves the
//! store untouched.
//!
//! The engine enforces what a relational table would: known columns, column
//! types, NOT NULL, and key uniqueness. Integer keys marked
//! [`Generated::AutoIncrement`] come from a per-table sequence shared by all
//! sessions; like a database sequence it is never rolled back.
//! [`Generated::Now`] timestamps are filled in.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::entity::{Entity, Field, FieldType, Generated, Record};
use crate::query::{Delete, Filter, Order, Query, Update};
use crate::session::{BlockingSession, Session};
use crate::{FieldMap, RepositoryError, Value, time};

#[derive(Debug, Clone, Default)]
struct Table {
    rows: Vec<Record>,
    /// Highest key handed out or stored; the next generated key is one more.
    last_id: i64,
}

impl Table {
    fn position(&self, key_field: &str, key: &Value) -> Option<usize> {
        self.rows
            .iter()
            .position(|row| row.get(key_field).is_some_and(|v| v.matches(key)))
    }

    fn observe_key(&mut self, key: &Value) {
        if let Value::Int(id) = key {
            self.last_id = self.last_id.max(*id);
        }
    }
}

type Tables = HashMap<String, Table>;

/// Shared committed state. Cloning shares the same tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a session against this store.
    pub fn session(&self) -> MemorySession {
        MemorySession {
            store: self.clone(),
            working: HashMap::new(),
            changes: Vec::new(),
        }
    }

    /// Number of committed rows in `table`.
    pub fn committed_rows(&self, table: &str) -> Result<usize, RepositoryError> {
        let tables = self.lock()?;
        Ok(tables.get(table).map_or(0, |t| t.rows.len()))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, RepositoryError> {
        self.tables
            .lock()
            .map_err(|_| RepositoryError::Storage("memory store lock poisoned".to_string()))
    }

    fn snapshot(&self, table: &str) -> Result<Table, RepositoryError> {
        Ok(self.lock()?.get(table).cloned().unwrap_or_default())
    }

    /// Next value of the table's key sequence.
    fn next_id(&self, table: &str) -> Result<i64, RepositoryError> {
        let mut tables = self.lock()?;
        let table = tables.entry(table.to_string()).or_default();
        table.last_id += 1;
        Ok(table.last_id)
    }

    /// Keep the sequence ahead of an explicitly supplied key.
    fn reserve_id(&self, table: &str, key: &Value) -> Result<(), RepositoryError> {
        if matches!(key, Value::Int(_)) {
            self.lock()?
                .entry(table.to_string())
                .or_default()
                .observe_key(key);
        }
        Ok(())
    }
}

#[derive(Debug)]
enum Op {
    Insert(Record),
    /// `key` is the row's key before the update.
    Update { key: Value, row: Record },
    Delete(Value),
}

/// One logged row write.
#[derive(Debug)]
struct Change {
    table: &'static str,
    entity: &'static str,
    key_field: &'static str,
    op: Op,
}

impl Change {
    fn new<T: Entity>(op: Op) -> Self {
        Self {
            table: T::table_name(),
            entity: T::entity_name(),
            key_field: T::key_field(),
            op,
        }
    }

    /// Replay onto a committed table.
    fn apply(self, table: &mut Table) -> Result<(), RepositoryError> {
        let Change {
            entity,
            key_field,
            op,
            ..
        } = self;
        let conflict = |key: &Value| RepositoryError::Conflict {
            entity: entity.to_string(),
            key: key.to_string(),
        };

        match op {
            Op::Insert(row) => {
                let key = row.get(key_field).cloned().unwrap_or(Value::Null);
                if table.position(key_field, &key).is_some() {
                    return Err(conflict(&key));
                }
                table.observe_key(&key);
                table.rows.push(row);
            }
            Op::Update { key, row } => {
                let new_key = row.get(key_field).cloned().unwrap_or(Value::Null);
                if !new_key.matches(&key) && table.position(key_field, &new_key).is_some() {
                    return Err(conflict(&new_key));
                }
                // A row deleted by a concurrent commit stays deleted.
                if let Some(idx) = table.position(key_field, &key) {
                    table.observe_key(&new_key);
                    table.rows[idx] = row;
                }
            }
            Op::Delete(key) => {
                table
                    .rows
                    .retain(|row| !row.get(key_field).is_some_and(|v| v.matches(&key)));
            }
        }
        Ok(())
    }
}

/// A unit of work over a [`MemoryStore`].
#[derive(Debug)]
pub struct MemorySession {
    store: MemoryStore,
    working: HashMap<&'static str, Table>,
    changes: Vec<Change>,
}

fn storage_error(message: String) -> RepositoryError {
    RepositoryError::Storage(message)
}

fn column<T: Entity>(name: &str) -> Result<&'static Field, RepositoryError> {
    T::field(name).ok_or_else(|| {
        storage_error(format!(
            "column \"{}\" of relation \"{}\" does not exist",
            name,
            T::table_name()
        ))
    })
}

/// Check a value against a column's type, widening integers for float columns.
fn coerce<T: Entity>(field: &Field, value: Value) -> Result<Value, RepositoryError> {
    let value = match (field.field_type, value) {
        (_, Value::Null) => Value::Null,
        (FieldType::Integer, v @ Value::Int(_))
        | (FieldType::Float, v @ Value::Float(_))
        | (FieldType::Boolean, v @ Value::Bool(_))
        | (FieldType::Text, v @ Value::Text(_))
        | (FieldType::Timestamp, v @ Value::Timestamp(_)) => v,
        (FieldType::Float, Value::Int(n)) => Value::Float(n as f64),
        (field_type, other) => {
            return Err(storage_error(format!(
                "column \"{}\" is of type {} but expression is {:?}",
                field.name, field_type, other
            )));
        }
    };

    if value.is_null() && !field.nullable {
        return Err(storage_error(format!(
            "null value in column \"{}\" of relation \"{}\" violates not-null constraint",
            field.name,
            T::table_name()
        )));
    }
    Ok(value)
}

fn row_matches(row: &Record, filters: &[Filter]) -> bool {
    filters.iter().all(|filter| match filter {
        Filter::Eq(field, value) => row.get(field).is_some_and(|v| v.matches(value)),
        Filter::IsNull(field) => row.get(field).is_none_or(Value::is_null),
    })
}

fn check_filters<T: Entity>(filters: &[Filter]) -> Result<(), RepositoryError> {
    for filter in filters {
        column::<T>(filter.field())?;
    }
    Ok(())
}

fn compare_rows(a: &Record, b: &Record, order_by: &[(String, Order)]) -> Ordering {
    for (field, order) in order_by {
        let left = a.get(field).unwrap_or(&Value::Null);
        let right = b.get(field).unwrap_or(&Value::Null);
        let ordering = match order {
            Order::Asc => left.compare(right),
            Order::Desc => right.compare(left),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn key_of<T: Entity>(row: &Record) -> Value {
    row.get(T::key_field()).cloned().unwrap_or(Value::Null)
}

fn conflict<T: Entity>(key: &Value) -> RepositoryError {
    RepositoryError::Conflict {
        entity: T::entity_name().to_string(),
        key: key.to_string(),
    }
}

impl MemorySession {
    fn table<T: Entity>(&mut self) -> Result<&mut Table, RepositoryError> {
        let name = T::table_name();
        if !self.working.contains_key(name) {
            let snapshot = self.store.snapshot(name)?;
            self.working.insert(name, snapshot);
        }
        self.working
            .get_mut(name)
            .ok_or_else(|| storage_error(format!("table \"{}\" not loaded", name)))
    }

    fn run_fetch<T: Entity>(&mut self, query: Query<T>) -> Result<Vec<T>, RepositoryError> {
        check_filters::<T>(&query.filters)?;
        for (field, _) in &query.order_by {
            column::<T>(field)?;
        }

        let table = self.table::<T>()?;
        let mut rows: Vec<&Record> = table
            .rows
            .iter()
            .filter(|row| row_matches(row, &query.filters))
            .collect();
        rows.sort_by(|a, b| compare_rows(a, b, &query.order_by));

        let offset = usize::try_from(query.offset.unwrap_or(0)).unwrap_or(usize::MAX);
        let limit = query
            .limit
            .map_or(usize::MAX, |l| usize::try_from(l).unwrap_or(usize::MAX));

        rows.into_iter()
            .skip(offset)
            .take(limit)
            .map(|row| row.clone().into_entity::<T>())
            .collect()
    }

    fn run_count<T: Entity>(&mut self, query: Query<T>) -> Result<u64, RepositoryError> {
        check_filters::<T>(&query.filters)?;
        let table = self.table::<T>()?;
        let count = table
            .rows
            .iter()
            .filter(|row| row_matches(row, &query.filters))
            .count();
        Ok(count as u64)
    }

    fn run_insert<T: Entity>(&mut self, values: FieldMap) -> Result<T, RepositoryError> {
        for (name, _) in values.iter() {
            column::<T>(name)?;
        }

        let mut record = Record::new();
        for field in T::fields() {
            let provided = values.get(field.name).cloned().unwrap_or(Value::Null);
            let value = match (provided, field.generated) {
                (Value::Null, Some(Generated::AutoIncrement)) => {
                    Value::Int(self.store.next_id(T::table_name())?)
                }
                (Value::Null, Some(Generated::Now)) => Value::Timestamp(time::now()),
                (value, _) => value,
            };
            record.set(field.name, coerce::<T>(field, value)?);
        }

        let key = key_of::<T>(&record);
        let table = self.table::<T>()?;
        if table.position(T::key_field(), &key).is_some() {
            return Err(conflict::<T>(&key));
        }
        table.rows.push(record.clone());
        self.store.reserve_id(T::table_name(), &key)?;
        self.changes.push(Change::new::<T>(Op::Insert(record.clone())));
        record.into_entity()
    }

    fn run_update<T: Entity>(&mut self, update: Update<T>) -> Result<Option<T>, RepositoryError> {
        check_filters::<T>(&update.filters)?;
        let mut assignments = Vec::with_capacity(update.assignments.len());
        for (name, value) in update.assignments.iter() {
            let field = column::<T>(name)?;
            assignments.push((field, coerce::<T>(field, value.clone())?));
        }

        let table = self.table::<T>()?;
        let mut staged = Vec::new();
        for (idx, row) in table.rows.iter().enumerate() {
            if !row_matches(row, &update.filters) {
                continue;
            }
            let mut updated = row.clone();
            for (field, value) in &assignments {
                updated.set(field.name, value.clone());
            }
            let new_key = key_of::<T>(&updated);
            if table
                .position(T::key_field(), &new_key)
                .is_some_and(|other| other != idx)
            {
                return Err(conflict::<T>(&new_key));
            }
            staged.push((idx, key_of::<T>(row), updated));
        }

        let first = match staged.first() {
            Some((_, _, row)) => Some(row.clone().into_entity()?),
            None => None,
        };
        let mut logged = Vec::with_capacity(staged.len());
        for (idx, key, row) in staged {
            table.rows[idx] = row.clone();
            logged.push(Change::new::<T>(Op::Update { key, row }));
        }
        self.changes.extend(logged);
        Ok(first)
    }

    fn run_delete<T: Entity>(&mut self, delete: Delete<T>) -> Result<u64, RepositoryError> {
        check_filters::<T>(&delete.filters)?;
        let table = self.table::<T>()?;
        let mut removed = Vec::new();
        table.rows.retain(|row| {
            let hit = row_matches(row, &delete.filters);
            if hit {
                removed.push(key_of::<T>(row));
            }
            !hit
        });

        let count = removed.len() as u64;
        self.changes
            .extend(removed.into_iter().map(|key| Change::new::<T>(Op::Delete(key))));
        Ok(count)
    }

    /// Replay the log onto copies of the committed tables, then publish them.
    ///
    /// Either every change lands or none does. The session is reset in both
    /// cases, like a database transaction that failed to commit.
    fn run_commit(&mut self) -> Result<(), RepositoryError> {
        self.working.clear();
        let changes = std::mem::take(&mut self.changes);
        if changes.is_empty() {
            return Ok(());
        }

        let mut tables = self.store.lock()?;
        let mut staged: HashMap<&'static str, Table> = HashMap::new();
        for change in changes {
            let name = change.table;
            let table = staged
                .entry(name)
                .or_insert_with(|| tables.get(name).cloned().unwrap_or_default());
            change.apply(table)?;
        }

        for (name, table) in staged {
            tables.insert(name.to_string(), table);
        }
        Ok(())
    }

    fn run_rollback(&mut self) {
        self.working.clear();
        self.changes.clear();
    }
}

impl BlockingSession for MemorySession {
    fn fetch<T: Entity>(&mut self, query: Query<T>) -> Result<Vec<T>, RepositoryError> {
        self.run_fetch(query)
    }

    fn count<T: Entity>(&mut self, query: Query<T>) -> Result<u64, RepositoryError> {
        self.run_count(query)
    }

    fn insert<T: Entity>(&mut self, values: FieldMap) -> Result<T, RepositoryError> {
        self.run_insert(values)
    }

    fn update<T: Entity>(&mut self, update: Update<T>) -> Result<Option<T>, RepositoryError> {
        self.run_update(update)
    }

    fn delete<T: Entity>(&mut self, delete: Delete<T>) -> Result<u64, RepositoryError> {
        self.run_delete(delete)
    }

    fn commit(&mut self) -> Result<(), RepositoryError> {
        self.run_commit()
    }

    fn rollback(&mut self) -> Result<(), RepositoryError> {
        self.run_rollback();
        Ok(())
    }
}

#[async_trait]
impl Session for MemorySession {
    async fn fetch<T: Entity>(&mut self, query: Query<T>) -> Result<Vec<T>, RepositoryError> {
        self.run_fetch(query)
    }

    async fn count<T: Entity>(&mut self, query: Query<T>) -> Result<u64, RepositoryError> {
        self.run_count(query)
    }

    async fn insert<T: Entity>(&mut self, values: FieldMap) -> Result<T, RepositoryError> {
        self.run_insert(values)
    }

    async fn update<T: Entity>(&mut self, update: Update<T>) -> Result<Option<T>, RepositoryError> {
        self.run_update(update)
    }

    async fn delete<T: Entity>(&mut self, delete: Delete<T>) -> Result<u64, RepositoryError> {
        self.run_delete(delete)
    }

    async fn commit(&mut self) -> Result<(), RepositoryError> {
        self.run_commit()
    }

    async fn rollback(&mut self) -> Result<(), RepositoryError> {
        self.run_rollback();
        Ok(())
    }
}
