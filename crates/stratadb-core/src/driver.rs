use crate::{query::compile::NativeOp, value::WireRow};
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use thiserror::Error as ThisError;

///
/// Driver
///
/// The narrow seam to an external database client. A driver knows nothing
/// about schemas or documents; it executes one native operation (a query
/// string, a command sequence, or a key-access plan) and streams back rows
/// as loosely typed mappings.
///
/// Concrete drivers live outside this crate and are supplied by the
/// bootstrap layer at registration time. The in-tree `testing::RecordingDriver`
/// is the reference implementation for tests.
///

#[async_trait]
pub trait Driver: Send + Sync {
    /// Execute one native operation and return its response.
    async fn request(&self, op: NativeOp) -> Result<DriverResponse, DriverError>;

    /// Release the underlying client handle. Called once, at registry
    /// teardown or when a connection is explicitly closed.
    async fn close(&self) -> Result<(), DriverError>;
}

/// Lazy, single-pass stream of raw rows. Not restartable; dropping it
/// abandons the remainder of the result set.
pub type RowStream = BoxStream<'static, Result<WireRow, DriverError>>;

///
/// DriverResponse
///

pub struct DriverResponse {
    /// Result rows, streamed lazily.
    pub rows: RowStream,

    /// Rows affected by a mutation, when the backend reports it.
    pub affected: u64,

    /// Backend-assigned identity for an insert, when the backend reports it.
    pub assigned_id: Option<String>,
}

impl DriverResponse {
    /// An acknowledgement with no rows.
    #[must_use]
    pub fn ack(affected: u64) -> Self {
        Self {
            rows: Box::pin(futures_util::stream::empty()),
            affected,
            assigned_id: None,
        }
    }
}

///
/// DriverError
///
/// Backend-native failure payload, wrapped with backend context at the
/// capability-interface boundary before it reaches callers.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
#[error("{message}")]
pub struct DriverError {
    pub message: String,

    /// Backend-native error code, when one exists.
    pub code: Option<String>,
}

impl DriverError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}
