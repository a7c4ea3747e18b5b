//! Transactional session traits.
//!
//! A session is a caller-owned unit of work. Writes made through it are
//! visible to later reads on the same session and become durable on
//! [`commit`](Session::commit). Dropping a session without committing
//! discards them.
//!
//! [`Session`] is the suspending form and [`BlockingSession`] the blocking
//! one; backends implement whichever they can drive.

use async_trait::async_trait;

use crate::entity::Entity;
use crate::query::{Delete, Query, Update};
use crate::{FieldMap, RepositoryError};

/// Asynchronous session over one backend connection or transaction.
#[async_trait]
pub trait Session: Send {
    /// Execute a SELECT query and return results.
    async fn fetch<T: Entity>(&mut self, query: Query<T>) -> Result<Vec<T>, RepositoryError>;

    /// Execute a SELECT query and return at most one result.
    async fn fetch_optional<T: Entity>(
        &mut self,
        query: Query<T>,
    ) -> Result<Option<T>, RepositoryError> {
        let results = self.fetch(query.limit(1)).await?;
        Ok(results.into_iter().next())
    }

    /// Count rows matching the query's filters, ignoring ordering and paging.
    async fn count<T: Entity>(&mut self, query: Query<T>) -> Result<u64, RepositoryError>;

    /// Insert a row and return it as stored, generated columns included.
    async fn insert<T: Entity>(&mut self, values: FieldMap) -> Result<T, RepositoryError>;

    /// Apply an update and return the first affected row as stored afterwards.
    async fn update<T: Entity>(&mut self, update: Update<T>) -> Result<Option<T>, RepositoryError>;

    /// Execute a DELETE query and return the number of rows affected.
    async fn delete<T: Entity>(&mut self, delete: Delete<T>) -> Result<u64, RepositoryError>;

    /// Make every write so far durable.
    async fn commit(&mut self) -> Result<(), RepositoryError>;

    /// Discard every write since the last commit.
    async fn rollback(&mut self) -> Result<(), RepositoryError>;
}

/// Blocking counterpart of [`Session`] with identical semantics.
pub trait BlockingSession {
    fn fetch<T: Entity>(&mut self, query: Query<T>) -> Result<Vec<T>, RepositoryError>;

    fn fetch_optional<T: Entity>(&mut self, query: Query<T>) -> Result<Option<T>, RepositoryError> {
        let results = self.fetch(query.limit(1))?;
        Ok(results.into_iter().next())
    }

    fn count<T: Entity>(&mut self, query: Query<T>) -> Result<u64, RepositoryError>;

    fn insert<T: Entity>(&mut self, values: FieldMap) -> Result<T, RepositoryError>;

    fn update<T: Entity>(&mut self, update: Update<T>) -> Result<Option<T>, RepositoryError>;

    fn delete<T: Entity>(&mut self, delete: Delete<T>) -> Result<u64, RepositoryError>;

    fn commit(&mut self) -> Result<(), RepositoryError>;

    fn rollback(&mut self) -> Result<(), RepositoryError>;
}
