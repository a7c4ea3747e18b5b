//! PostgreSQL implementation of Session.

use std::ops::Deref;
use std::time::Duration;

use async_trait::async_trait;
use crudkit::{
    DatabaseConfig, Delete, Entity, FieldMap, Query, RepositoryError, Session, Update, Value,
};
use sqlx::postgres::{PgArguments, PgPoolOptions};
use sqlx::{Postgres, Row, Transaction};

use crate::bind::{bind_fields, bind_filters, decode_row};
use crate::sql::{count_sql, delete_sql, insert_sql, select_sql, update_sql};

const DEFAULT_MAX_CONNECTIONS: u32 = 16;

/// SQLSTATE for `unique_violation`.
const UNIQUE_VIOLATION: &str = "23505";

pub(crate) fn pool_options(config: &DatabaseConfig) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
}

/// Map a failed INSERT or UPDATE, surfacing unique violations as conflicts.
///
/// `key` is the identifying key the statement wrote, when known; otherwise
/// the violated constraint names the conflict.
fn write_error<T: Entity>(err: sqlx::Error, key: Option<&Value>) -> RepositoryError {
    let Some(db) = err.as_database_error() else {
        return RepositoryError::backend(err);
    };
    if db.code().as_deref() != Some(UNIQUE_VIOLATION) {
        return RepositoryError::backend(err);
    }

    let key = match key {
        Some(key) => key.to_string(),
        None => db.constraint().unwrap_or("unknown").to_string(),
    };
    tracing::warn!(entity = T::entity_name(), %key, "unique violation");
    RepositoryError::Conflict {
        entity: T::entity_name().to_string(),
        key,
    }
}

/// Wrapper around sqlx::PgPool that hands out sessions.
#[derive(Clone, Debug)]
pub struct PgPool(sqlx::PgPool);

impl PgPool {
    /// Create a new PgPool from an sqlx PgPool.
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self(pool)
    }

    /// Connect to a PostgreSQL database.
    pub async fn connect(url: &str) -> Result<Self, RepositoryError> {
        let config = DatabaseConfig {
            writer_url: url.to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            ..DatabaseConfig::default()
        };
        Self::connect_url(&config, url).await
    }

    /// Connect to the configured writer.
    pub async fn connect_with(config: &DatabaseConfig) -> Result<Self, RepositoryError> {
        Self::connect_url(config, &config.writer_url).await
    }

    /// Connect to the configured read replica, or the writer when none is set.
    pub async fn connect_reader(config: &DatabaseConfig) -> Result<Self, RepositoryError> {
        Self::connect_url(config, config.reader_url()).await
    }

    async fn connect_url(config: &DatabaseConfig, url: &str) -> Result<Self, RepositoryError> {
        let pool = pool_options(config)
            .connect(url)
            .await
            .map_err(RepositoryError::backend)?;
        tracing::info!(max_connections = config.max_connections, "connected to postgres");
        Ok(Self(pool))
    }

    /// Open a session. The transaction begins on first use.
    pub fn session(&self) -> PgSession {
        PgSession {
            pool: self.0.clone(),
            tx: None,
        }
    }

    /// Get the inner sqlx::PgPool.
    pub fn inner(&self) -> &sqlx::PgPool {
        &self.0
    }
}

impl Deref for PgPool {
    type Target = sqlx::PgPool;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// A unit of work over one PostgreSQL transaction.
///
/// Dropping the session with a transaction open rolls it back.
pub struct PgSession {
    pool: sqlx::PgPool,
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgSession {
    /// Detach the open transaction, if any. Dropping it rolls back.
    pub(crate) fn take_transaction(&mut self) -> Option<Transaction<'static, Postgres>> {
        self.tx.take()
    }

    async fn transaction(&mut self) -> Result<&mut Transaction<'static, Postgres>, RepositoryError> {
        if self.tx.is_none() {
            let tx = self.pool.begin().await.map_err(RepositoryError::backend)?;
            self.tx = Some(tx);
        }
        self.tx
            .as_mut()
            .ok_or_else(|| RepositoryError::Storage("transaction not started".to_string()))
    }
}

#[async_trait]
impl Session for PgSession {
    async fn fetch<T: Entity>(&mut self, query: Query<T>) -> Result<Vec<T>, RepositoryError> {
        let sql = select_sql(&query);
        let mut args = PgArguments::default();
        bind_filters::<T>(&mut args, &query.filters)?;
        tracing::debug!(%sql, "fetch");

        let tx = self.transaction().await?;
        let rows = sqlx::query_with(&sql, args)
            .fetch_all(&mut **tx)
            .await
            .map_err(RepositoryError::backend)?;

        rows.iter().map(decode_row::<T>).collect()
    }

    async fn count<T: Entity>(&mut self, query: Query<T>) -> Result<u64, RepositoryError> {
        let sql = count_sql(&query);
        let mut args = PgArguments::default();
        bind_filters::<T>(&mut args, &query.filters)?;
        tracing::debug!(%sql, "count");

        let tx = self.transaction().await?;
        let row = sqlx::query_with(&sql, args)
            .fetch_one(&mut **tx)
            .await
            .map_err(RepositoryError::backend)?;
        let count: i64 = row.try_get(0).map_err(RepositoryError::backend)?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn insert<T: Entity>(&mut self, values: FieldMap) -> Result<T, RepositoryError> {
        let columns: Vec<&str> = values.iter().map(|(column, _)| column).collect();
        let sql = insert_sql(T::table_name(), &columns);
        let mut args = PgArguments::default();
        bind_fields::<T>(&mut args, &values)?;
        tracing::debug!(%sql, "insert");

        let key = values.get(T::key_field());
        let tx = self.transaction().await?;
        let row = sqlx::query_with(&sql, args)
            .fetch_one(&mut **tx)
            .await
            .map_err(|e| write_error::<T>(e, key))?;
        decode_row(&row)
    }

    async fn update<T: Entity>(&mut self, update: Update<T>) -> Result<Option<T>, RepositoryError> {
        let sql = update_sql(&update);
        let mut args = PgArguments::default();
        bind_fields::<T>(&mut args, &update.assignments)?;
        bind_filters::<T>(&mut args, &update.filters)?;
        tracing::debug!(%sql, "update");

        let key = update.assignments.get(T::key_field());
        let tx = self.transaction().await?;
        let rows = sqlx::query_with(&sql, args)
            .fetch_all(&mut **tx)
            .await
            .map_err(|e| write_error::<T>(e, key))?;
        rows.first().map(decode_row::<T>).transpose()
    }

    async fn delete<T: Entity>(&mut self, delete: Delete<T>) -> Result<u64, RepositoryError> {
        let sql = delete_sql(&delete);
        let mut args = PgArguments::default();
        bind_filters::<T>(&mut args, &delete.filters)?;
        tracing::debug!(%sql, "delete");

        let tx = self.transaction().await?;
        let result = sqlx::query_with(&sql, args)
            .execute(&mut **tx)
            .await
            .map_err(RepositoryError::backend)?;
        Ok(result.rows_affected())
    }

    async fn commit(&mut self) -> Result<(), RepositoryError> {
        match self.tx.take() {
            Some(tx) => tx.commit().await.map_err(RepositoryError::backend),
            None => Ok(()),
        }
    }

    async fn rollback(&mut self) -> Result<(), RepositoryError> {
        match self.tx.take() {
            Some(tx) => tx.rollback().await.map_err(RepositoryError::backend),
            None => Ok(()),
        }
    }
}
