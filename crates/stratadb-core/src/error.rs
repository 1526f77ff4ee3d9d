use crate::{
    backend::{BackendError, BackendKind},
    connection::ConnectionError,
    executor::MaterializeError,
    field::ValidationError,
    query::compile::CompileError,
    schema::{Schema, SchemaError},
};
use thiserror::Error as ThisError;

///
/// Error
///
/// The top-level error surface. Validation and compilation failures are
/// detected locally, before any I/O; backend-reported failures arrive
/// wrapped with backend-identifying context. Nothing here is retried
/// automatically; retry policy belongs to the caller.
///

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("collection '{collection}' ({backend}): {source}")]
    Validation {
        collection: String,
        backend: BackendKind,
        #[source]
        source: ValidationError,
    },

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Materialize(#[from] MaterializeError),

    #[error("collection '{collection}' has no field '{field}'")]
    UnknownField { collection: String, field: String },

    #[error("document in '{collection}' has no identity; it was never persisted")]
    MissingIdentity { collection: String },

    #[error(
        "schema '{collection}' targets the {expected} backend but the connection is {found}"
    )]
    BackendMismatch {
        collection: String,
        expected: BackendKind,
        found: BackendKind,
    },
}

impl Error {
    /// Attach entity and backend context to a field validation failure.
    pub(crate) fn validation(schema: &Schema, source: ValidationError) -> Self {
        Self::Validation {
            collection: schema.collection().to_string(),
            backend: schema.backend(),
            source,
        }
    }
}
