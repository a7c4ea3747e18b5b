//! Crudkit - Generic typed CRUD repositories with string filter coercion.
//!
//! This crate provides one repository implementation that works for any
//! entity type, plus a caster that turns loosely-typed filter values (as they
//! arrive from query strings) into the typed values each column expects.
//!
//! # Core Concepts
//!
//! - **Entity**: a record type with a table, declared fields, and one
//!   identifying key. Usually derived with `#[derive(Entity)]`.
//! - **Session**: a caller-owned unit of work against a backend. Repositories
//!   borrow it per call and never hold on to it.
//! - **Cast**: string → integer/float/boolean/timestamp coercion driven by the
//!   entity's field types, with null tokens (`"null"`, `"none"`, ...) mapping
//!   to [`Value::Null`].
//!
//! # Traits
//!
//! - [`Entity`]: field metadata for a record type
//! - [`Session`]: asynchronous storage backend
//! - [`BlockingSession`]: blocking storage backend
//!
//! # Example
//!
//! ```ignore
//! use crudkit::{Entity, FieldMap, ListParams, MemoryStore, Repository};
//!
//! #[derive(Debug, Clone, serde::Serialize, serde::Deserialize, Entity)]
//! #[entity(table = "samples")]
//! struct Sample {
//!     id: i64,
//!     name: String,
//! }
//!
//! let store = MemoryStore::new();
//! let mut session = store.session();
//! let repo = Repository::<Sample>::new();
//! let filters = FieldMap::new().with("id", "7");
//! let (total, items) = repo.get_list(&mut session, &ListParams::new(), &filters).await?;
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

mod cast;
pub mod config;
mod entity;
mod error;
pub mod memory;
mod query;
mod repository;
mod session;
pub mod telemetry;
pub mod time;
mod value;

pub use cast::{cast, cast_field, cast_fields};
pub use config::{ConfigError, DatabaseConfig, Environment, LogFormat, LoggingConfig, Settings};
pub use entity::{DELETED_AT, Entity, Field, FieldType, Generated, Record, UPDATED_AT};
pub use error::{BackendError, ErrorKind, RepositoryError};
pub use memory::{MemorySession, MemoryStore};
pub use query::{Delete, Filter, Order, Query, Update};
pub use repository::{DEFAULT_LIMIT, ListParams, Repository};
pub use session::{BlockingSession, Session};
pub use telemetry::{TelemetryError, init_tracing, shutdown_tracing};
pub use value::{FieldMap, Value};

// Re-export derive macro
pub use crudkit_derive::Entity;
