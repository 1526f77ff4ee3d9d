pub mod columnar;
pub mod graph;
pub mod kv;

use crate::{
    driver::{Driver, DriverError, RowStream},
    query::compile::CompiledOp,
    record::RecordId,
    schema::Schema,
    value::WireRow,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr, sync::Arc};
use thiserror::Error as ThisError;

pub use columnar::ColumnarBackend;
pub use graph::GraphBackend;
pub use kv::KeyValueBackend;

pub(crate) use crate::query::compile::columnar_ident;

///
/// BackendKind
///
/// Closed tag identifying which concrete database family a schema or
/// connection targets. Every schema resolves to exactly one kind.
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Graph/document store (SurrealDB family).
    Graph,
    /// Columnar analytical store (ClickHouse family).
    Columnar,
    /// Key-value store (Redis family).
    KeyValue,
}

impl BackendKind {
    pub const ALL: [Self; 3] = [Self::Graph, Self::Columnar, Self::KeyValue];

    #[must_use]
    pub const fn tag(self) -> u8 {
        match self {
            Self::Graph => 0x01,
            Self::Columnar => 0x02,
            Self::KeyValue => 0x03,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Graph => "graph",
            Self::Columnar => "columnar",
            Self::KeyValue => "key_value",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = UnknownBackendKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "graph" => Ok(Self::Graph),
            "columnar" => Ok(Self::Columnar),
            "key_value" | "key-value" => Ok(Self::KeyValue),
            other => Err(UnknownBackendKind {
                name: other.to_string(),
            }),
        }
    }
}

///
/// UnknownBackendKind
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
#[error("unknown backend kind '{name}' (expected graph, columnar, or key_value)")]
pub struct UnknownBackendKind {
    pub name: String,
}

///
/// Capability
///
/// Enumerated features a backend may or may not support. Probed via
/// `Backend::supports`; absent capabilities fail fast, they are never
/// silently degraded.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Capability {
    Transactions,
    GraphRelations,
    PartialUpdate,
    Ttl,
    MaterializedViews,
    ArrayContainment,
}

impl Capability {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Transactions => "transactions",
            Self::GraphRelations => "graph_relations",
            Self::PartialUpdate => "partial_update",
            Self::Ttl => "ttl",
            Self::MaterializedViews => "materialized_views",
            Self::ArrayContainment => "array_containment",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

///
/// BackendError
///

#[derive(Debug, ThisError)]
pub enum BackendError {
    #[error("{backend}: operation '{operation}' is not supported on {collection}")]
    Unsupported {
        backend: BackendKind,
        collection: String,
        operation: &'static str,
    },

    #[error("{backend}: driver failure on {collection}: {source}")]
    Driver {
        backend: BackendKind,
        collection: String,
        #[source]
        source: DriverError,
    },

    #[error("{backend}: insert into {collection} was not acknowledged with an identity")]
    MissingAck {
        backend: BackendKind,
        collection: String,
    },
}

impl BackendError {
    pub(crate) fn driver(backend: BackendKind, collection: &str, source: DriverError) -> Self {
        Self::Driver {
            backend,
            collection: collection.to_string(),
            source,
        }
    }

    pub(crate) fn unsupported(
        backend: BackendKind,
        collection: &str,
        operation: &'static str,
    ) -> Self {
        Self::Unsupported {
            backend,
            collection: collection.to_string(),
            operation,
        }
    }
}

///
/// Backend
///
/// The capability interface implemented once per concrete database family.
/// Each implementation is a thin dialect layer over an externally supplied
/// `Driver`; all suspension happens at this boundary. Operations outside a
/// backend's model return `BackendError::Unsupported` rather than degrading.
///
/// `select` returns a lazy, single-pass, non-restartable row stream so large
/// result sets never require full materialization up front.
///

#[async_trait]
pub trait Backend: Send + Sync {
    fn kind(&self) -> BackendKind;

    fn supports(&self, capability: Capability) -> bool;

    async fn create_collection(&self, schema: &Schema) -> Result<(), BackendError>;

    async fn drop_collection(&self, schema: &Schema) -> Result<(), BackendError>;

    async fn insert(&self, schema: &Schema, row: WireRow) -> Result<RecordId, BackendError>;

    async fn insert_many(
        &self,
        schema: &Schema,
        rows: Vec<WireRow>,
    ) -> Result<Vec<RecordId>, BackendError>;

    async fn select(&self, schema: &Schema, op: &CompiledOp) -> Result<RowStream, BackendError>;

    async fn count(&self, schema: &Schema, op: &CompiledOp) -> Result<u64, BackendError>;

    async fn update(
        &self,
        schema: &Schema,
        id: &RecordId,
        changed: WireRow,
    ) -> Result<(), BackendError>;

    async fn delete(&self, schema: &Schema, id: &RecordId) -> Result<(), BackendError>;
}

/// Construct the dialect backend for a kind over an external driver handle.
#[must_use]
pub fn for_kind(kind: BackendKind, driver: Arc<dyn Driver>) -> Arc<dyn Backend> {
    match kind {
        BackendKind::Graph => Arc::new(GraphBackend::new(driver)),
        BackendKind::Columnar => Arc::new(ColumnarBackend::new(driver)),
        BackendKind::KeyValue => Arc::new(KeyValueBackend::new(driver)),
    }
}
