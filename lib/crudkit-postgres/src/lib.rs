//! PostgreSQL sessions for crudkit repositories.
//!
//! [`PgSession`] implements [`crudkit::Session`] over one lazily-begun
//! transaction. [`BlockingPgPool`] owns a pool and a runtime and hands out
//! [`BlockingPgSession`]s for [`crudkit::BlockingSession`] callers.
//! Entities need nothing beyond `#[derive(Entity)]`: values bind by the
//! declared column types and rows decode through the entity's serde impl.
//!
//! # Usage
//!
//! ```text
//! use crudkit::{FieldMap, Repository, Settings};
//! use crudkit_postgres::PgPool;
//!
//! let settings = Settings::load()?;
//! let pool = PgPool::connect_with(&settings.database).await?;
//! let mut session = pool.session();
//! let repo = Repository::<Sample>::new();
//! let created = repo.create(&mut session, &FieldMap::new().with("name", "alpha")).await?;
//! ```

#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::unwrap_in_result,
        clippy::panic
    )
)]

mod bind;
mod blocking;
mod executor;
pub mod sql;

pub use bind::{bind_value, decode_row};
pub use blocking::{BlockingPgPool, BlockingPgSession};
pub use executor::{PgPool, PgSession};
