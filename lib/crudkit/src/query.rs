//! Database-agnostic query builders.
//!
//! Builders carry table, predicates, ordering and paging; each backend
//! translates them into its own dialect.

use std::marker::PhantomData;
use std::str::FromStr;

use crate::entity::Entity;
use crate::{FieldMap, RepositoryError, Value};

/// Filter conditions for queries. Conditions are combined with AND.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// field = value
    Eq(String, Value),
    /// field IS NULL
    IsNull(String),
}

impl Filter {
    /// Equality predicate; a null value becomes `IS NULL`.
    pub fn equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        match value.into() {
            Value::Null => Filter::IsNull(field.into()),
            value => Filter::Eq(field.into(), value),
        }
    }

    pub fn field(&self) -> &str {
        match self {
            Filter::Eq(field, _) | Filter::IsNull(field) => field,
        }
    }
}

/// Sort order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
    Asc,
    #[default]
    Desc,
}

impl Order {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Order::Asc => "ASC",
            Order::Desc => "DESC",
        }
    }
}

impl FromStr for Order {
    type Err = RepositoryError;

    /// Accepts `asc` or `desc` in any case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "asc" => Ok(Order::Asc),
            "desc" => Ok(Order::Desc),
            _ => Err(RepositoryError::InvalidOrder {
                order: s.to_string(),
            }),
        }
    }
}

fn filters_from(values: FieldMap) -> Vec<Filter> {
    values
        .into_iter()
        .map(|(field, value)| Filter::equals(field, value))
        .collect()
}

/// A SELECT query builder.
#[derive(Debug, Clone)]
pub struct Query<T> {
    /// The table to query.
    pub table: String,
    /// Filter conditions.
    pub filters: Vec<Filter>,
    /// Order by clauses.
    pub order_by: Vec<(String, Order)>,
    /// Maximum number of results.
    pub limit: Option<u64>,
    /// Offset for pagination.
    pub offset: Option<u64>,
    pub(crate) _marker: PhantomData<T>,
}

impl<T: Entity> Query<T> {
    /// Create a new query for the type's table.
    pub fn new() -> Self {
        Self {
            table: T::table_name().to_string(),
            filters: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
            _marker: PhantomData,
        }
    }

    /// Add a filter condition.
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Add an equality filter (shorthand for [`Filter::equals`]).
    pub fn eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(Filter::equals(field, value))
    }

    /// Add one equality filter per entry of an already-cast map.
    pub fn matching(mut self, values: FieldMap) -> Self {
        self.filters.extend(filters_from(values));
        self
    }

    /// Add an order-by clause.
    pub fn order_by(mut self, field: impl Into<String>, order: Order) -> Self {
        self.order_by.push((field.into(), order));
        self
    }

    /// Set the maximum number of results.
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Set the offset for pagination.
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Same predicates, without ordering or paging. Used for counts.
    pub fn unpaged(&self) -> Self {
        Self {
            table: self.table.clone(),
            filters: self.filters.clone(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
            _marker: PhantomData,
        }
    }
}

impl<T: Entity> Default for Query<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// An UPDATE builder: assignments applied to rows matching the filters.
#[derive(Debug, Clone)]
pub struct Update<T> {
    pub table: String,
    pub assignments: FieldMap,
    pub filters: Vec<Filter>,
    pub(crate) _marker: PhantomData<T>,
}

impl<T: Entity> Update<T> {
    pub fn new() -> Self {
        Self {
            table: T::table_name().to_string(),
            assignments: FieldMap::new(),
            filters: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Assign a value to a column.
    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.assignments.insert(field, value);
        self
    }

    /// Assign every entry of an already-cast map.
    pub fn set_all(mut self, values: FieldMap) -> Self {
        for (field, value) in values {
            self.assignments.insert(field, value);
        }
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(Filter::equals(field, value))
    }
}

impl<T: Entity> Default for Update<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A DELETE query builder.
#[derive(Debug, Clone)]
pub struct Delete<T> {
    /// The table to delete from.
    pub table: String,
    /// Filter conditions.
    pub filters: Vec<Filter>,
    pub(crate) _marker: PhantomData<T>,
}

impl<T: Entity> Delete<T> {
    /// Create a new delete query for the type's table.
    pub fn new() -> Self {
        Self {
            table: T::table_name().to_string(),
            filters: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Add a filter condition.
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Add an equality filter (shorthand).
    pub fn eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(Filter::equals(field, value))
    }
}

impl<T: Entity> Default for Delete<T> {
    fn default() -> Self {
        Self::new()
    }
}
