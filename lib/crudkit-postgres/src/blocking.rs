//! Blocking PostgreSQL pool and session.

use std::sync::Arc;

use crudkit::{
    BlockingSession, DatabaseConfig, Delete, Entity, FieldMap, Query, RepositoryError, Session,
    Update,
};
use tokio::runtime::{Builder, Runtime};

use crate::PgPool;
use crate::executor::{PgSession, pool_options};

fn runtime() -> Result<Runtime, RepositoryError> {
    Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(RepositoryError::backend)
}

/// A [`PgPool`] and the runtime that drives it, for synchronous callers.
///
/// Build one per process and open a session per unit of work; sessions
/// share both the connections and the runtime.
pub struct BlockingPgPool {
    // Dropped before the runtime.
    pool: PgPool,
    runtime: Arc<Runtime>,
}

impl BlockingPgPool {
    /// Connect to a PostgreSQL database.
    pub fn connect(url: &str) -> Result<Self, RepositoryError> {
        let runtime = runtime()?;
        let pool = runtime.block_on(PgPool::connect(url))?;
        Ok(Self::from_parts(pool, runtime))
    }

    /// Connect to the configured writer.
    pub fn connect_with(config: &DatabaseConfig) -> Result<Self, RepositoryError> {
        let runtime = runtime()?;
        let pool = runtime.block_on(PgPool::connect_with(config))?;
        Ok(Self::from_parts(pool, runtime))
    }

    /// Build the pool without connecting; connections open on first use.
    pub fn connect_lazy(config: &DatabaseConfig) -> Result<Self, RepositoryError> {
        let runtime = runtime()?;
        let pool = {
            let _guard = runtime.enter();
            pool_options(config)
                .connect_lazy(&config.writer_url)
                .map_err(RepositoryError::backend)?
        };
        Ok(Self::from_parts(PgPool::new(pool), runtime))
    }

    fn from_parts(pool: PgPool, runtime: Runtime) -> Self {
        Self {
            pool,
            runtime: Arc::new(runtime),
        }
    }

    /// Open a session. The transaction begins on first use.
    pub fn session(&self) -> BlockingPgSession {
        BlockingPgSession {
            runtime: Arc::clone(&self.runtime),
            inner: self.pool.session(),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// A [`PgSession`] driven on its pool's current-thread runtime.
///
/// Must not be used from inside an async context; block_on would panic there.
pub struct BlockingPgSession {
    runtime: Arc<Runtime>,
    inner: PgSession,
}

impl Drop for BlockingPgSession {
    fn drop(&mut self) {
        // Returning the connection to the pool spawns onto the runtime.
        let _guard = self.runtime.enter();
        drop(self.inner.take_transaction());
    }
}

impl BlockingSession for BlockingPgSession {
    fn fetch<T: Entity>(&mut self, query: Query<T>) -> Result<Vec<T>, RepositoryError> {
        self.runtime.block_on(Session::fetch(&mut self.inner, query))
    }

    fn count<T: Entity>(&mut self, query: Query<T>) -> Result<u64, RepositoryError> {
        self.runtime.block_on(Session::count(&mut self.inner, query))
    }

    fn insert<T: Entity>(&mut self, values: FieldMap) -> Result<T, RepositoryError> {
        self.runtime
            .block_on(Session::insert::<T>(&mut self.inner, values))
    }

    fn update<T: Entity>(&mut self, update: Update<T>) -> Result<Option<T>, RepositoryError> {
        self.runtime.block_on(Session::update(&mut self.inner, update))
    }

    fn delete<T: Entity>(&mut self, delete: Delete<T>) -> Result<u64, RepositoryError> {
        self.runtime.block_on(Session::delete(&mut self.inner, delete))
    }

    fn commit(&mut self) -> Result<(), RepositoryError> {
        self.runtime.block_on(Session::commit(&mut self.inner))
    }

    fn rollback(&mut self) -> Result<(), RepositoryError> {
        self.runtime.block_on(Session::rollback(&mut self.inner))
    }
}
