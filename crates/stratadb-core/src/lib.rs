//! StrataDB engine: the translation and abstraction layer that stores one
//! schema-bearing document model against three structurally different
//! database families (graph/document, columnar analytical, key-value).
//!
//! ## Crate layout
//! - `value`: closed runtime value model and its canonical wire codec.
//! - `field`: typed, validating, serializable attribute declarations.
//! - `schema`: the schema compiler, option validation, and the process-wide
//!   entity-type cache.
//! - `document`: runtime entity instances with dirty tracking.
//! - `connection`: the registry that owns every live backend connection.
//! - `driver`: the narrow seam to external database clients.
//! - `backend`: the capability interface and its three dialect
//!   implementations.
//! - `query`: the immutable expression tree, the lazy QuerySet builder, and
//!   the per-backend query compilers with their fingerprint cache.
//! - `executor`: execution and lazy row-to-document materialization.
//! - `config`: TOML connection profiles consumed by the bootstrap layer.
//! - `testing`: the recording stub driver used by the test suites.

pub mod backend;
pub mod config;
pub mod connection;
pub mod document;
pub mod driver;
pub mod error;
pub mod executor;
pub mod field;
pub mod query;
pub mod record;
pub mod schema;
pub mod testing;
pub mod value;

pub use error::Error;

/// Workspace version re-export for downstream tooling/tests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

///
/// Prelude
///
/// Domain vocabulary only. Executors, drivers, caches, and error internals
/// stay one module level down.
///

pub mod prelude {
    pub use crate::{
        backend::{Backend, BackendKind, Capability},
        connection::{Connection, ConnectionRegistry},
        document::Document,
        error::Error,
        field::{FieldDef, FieldKind},
        query::{Predicate, QuerySet, predicate},
        record::RecordId,
        schema::{IndexSpec, Model, Schema, SchemaBuilder, schema_of},
        value::Value,
    };
}
