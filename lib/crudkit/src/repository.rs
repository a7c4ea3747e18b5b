//! Generic CRUD repository.
//!
//! [`Repository<T>`] works for any [`Entity`]. It holds no state beyond the
//! identifying key name, never caches rows, and never owns a session: each
//! call borrows the caller's session for its duration.
//!
//! Every operation exists twice with the same semantics: an `async` method
//! taking a [`Session`](crate::Session) and a `_blocking` method taking a
//! [`BlockingSession`](crate::BlockingSession).
//!
//! # Commit policy
//!
//! - `create` and `update` commit the session after writing.
//! - `delete` and `soft_delete` never commit; the caller's unit of work does.
//! - An absent key is reported as `None`/`false`, in both modes.
//!   [`require_by_key`](Repository::require_by_key) is the one path that turns
//!   absence into [`RepositoryError::NotFound`].

mod asynchronous;
mod blocking;

use std::marker::PhantomData;

use crate::entity::{DELETED_AT, Entity, UPDATED_AT};
use crate::query::{Delete, Order, Query, Update};
use crate::{FieldMap, RepositoryError, Value, cast, time};

/// Default page size for [`Repository::get_list`].
pub const DEFAULT_LIMIT: u64 = 100;

/// Paging and ordering for list queries.
///
/// `skip` is a page index, not a row count: rows are offset by
/// `skip * limit`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListParams {
    pub skip: u64,
    pub limit: u64,
    /// `"asc"` or `"desc"`, any case. Validated when the query is built.
    pub order: String,
    /// Column to sort by; the identifying key when `None`.
    pub order_by: Option<String>,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            skip: 0,
            limit: DEFAULT_LIMIT,
            order: "desc".to_string(),
            order_by: None,
        }
    }
}

impl ListParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = skip;
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    pub fn order(mut self, order: impl Into<String>) -> Self {
        self.order = order.into();
        self
    }

    pub fn order_by(mut self, field: impl Into<String>) -> Self {
        self.order_by = Some(field.into());
        self
    }

    pub fn offset(&self) -> u64 {
        self.skip.saturating_mul(self.limit)
    }
}

/// Queries prepared for a list call.
struct ListPlan<T> {
    count: Query<T>,
    items: Option<Query<T>>,
}

/// Generic repository over one entity type.
#[derive(Debug, Clone)]
pub struct Repository<T> {
    key_field: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Entity> Default for Repository<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity> Repository<T> {
    pub fn new() -> Self {
        Self {
            key_field: T::key_field(),
            _marker: PhantomData,
        }
    }

    /// Column name of the identifying key.
    pub fn key_field(&self) -> &'static str {
        self.key_field
    }

    /// Cast a key to the key field's type so `"7"` finds an integer key.
    fn key_value(&self, key: Value) -> Result<Value, RepositoryError> {
        let filters = FieldMap::new().with(self.key_field, key);
        let mut casted = cast::<T>(&filters)?.into_iter();
        Ok(casted.next().map(|(_, value)| value).unwrap_or(Value::Null))
    }

    fn by_key(&self, key: Value) -> Result<Query<T>, RepositoryError> {
        Ok(Query::new().eq(self.key_field, self.key_value(key)?).limit(1))
    }

    fn matching(&self, filters: &FieldMap) -> Result<Query<T>, RepositoryError> {
        Ok(Query::new().matching(cast::<T>(filters)?))
    }

    /// Validate ordering, cast filters and build both queries.
    ///
    /// Everything that can fail on bad input fails here, before any query
    /// reaches the session.
    fn list_plan(
        &self,
        params: &ListParams,
        filters: &FieldMap,
    ) -> Result<ListPlan<T>, RepositoryError> {
        let order: Order = params.order.parse()?;
        let order_by = match params.order_by.as_deref() {
            Some(field) => T::field(field)
                .ok_or_else(|| RepositoryError::UnknownField {
                    entity: T::entity_name().to_string(),
                    field: field.to_string(),
                })?
                .name,
            None => self.key_field,
        };

        let base = self.matching(filters)?;
        let items = (params.limit > 0).then(|| {
            base.clone()
                .order_by(order_by, order)
                .offset(params.offset())
                .limit(params.limit)
        });

        Ok(ListPlan {
            count: base.unpaged(),
            items,
        })
    }

    /// Cast the payload and stamp `updated_at` when the entity declares it.
    fn update_plan(&self, key: Value, fields: &FieldMap) -> Result<Update<T>, RepositoryError> {
        let key = self.key_value(key)?;
        let mut update = Update::new().set_all(cast::<T>(fields)?);
        if T::tracks_updates() {
            update = update.set(UPDATED_AT, time::now());
        }
        Ok(update.eq(self.key_field, key))
    }

    fn soft_delete_plan(&self, key: Value) -> Result<Update<T>, RepositoryError> {
        Ok(Update::new()
            .set(DELETED_AT, time::now())
            .eq(self.key_field, self.key_value(key)?))
    }

    fn delete_plan(&self, key: Value) -> Result<Delete<T>, RepositoryError> {
        Ok(Delete::new().eq(self.key_field, self.key_value(key)?))
    }

    fn not_found(&self, key: &Value) -> RepositoryError {
        RepositoryError::NotFound {
            entity: T::entity_name().to_string(),
            key: key.to_string(),
        }
    }

    fn log_missing(&self, key: &Value) {
        tracing::warn!(
            entity = T::entity_name(),
            key = %key,
            "object with key `{}` not found in {}",
            key,
            T::entity_name()
        );
    }

    fn log_no_soft_delete(&self) {
        tracing::warn!(
            entity = T::entity_name(),
            "entity `{}` does not support soft delete",
            T::entity_name()
        );
    }
}
