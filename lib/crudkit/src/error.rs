use thiserror::Error;

/// Boxed error raised by a storage backend.
pub type BackendError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("Filter key '{field}' does not exist in entity '{entity}'.")]
    UnknownField { entity: String, field: String },

    #[error("Invalid value for '{field}'. Please check the format.")]
    InvalidValue { field: String },

    #[error("Invalid order: `{order}`. Use 'asc' or 'desc'.")]
    InvalidOrder { order: String },

    #[error("Object with key `{key}` not found in {entity}.")]
    NotFound { entity: String, key: String },

    #[error("Object with key `{key}` already exists in {entity}.")]
    Conflict { entity: String, key: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Backend(BackendError),
}

/// Broad classification used by callers to pick a response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad filter, payload or ordering argument. Not retried.
    ClientInput,
    /// The referenced entity does not exist.
    NotFound,
    /// A write collided with an existing identifying key.
    Conflict,
    /// Anything raised below the repository.
    Backend,
}

impl RepositoryError {
    /// Wrap a backend fault without altering it.
    pub fn backend(err: impl Into<BackendError>) -> Self {
        RepositoryError::Backend(err.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            RepositoryError::UnknownField { .. }
            | RepositoryError::InvalidValue { .. }
            | RepositoryError::InvalidOrder { .. } => ErrorKind::ClientInput,
            RepositoryError::NotFound { .. } => ErrorKind::NotFound,
            RepositoryError::Conflict { .. } => ErrorKind::Conflict,
            RepositoryError::Serialization(_)
            | RepositoryError::Storage(_)
            | RepositoryError::Backend(_) => ErrorKind::Backend,
        }
    }

    pub fn is_client_error(&self) -> bool {
        self.kind() == ErrorKind::ClientInput
    }
}
