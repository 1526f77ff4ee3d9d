
use crate::{
    backend::{self, Backend, BackendKind},
    driver::{Driver, DriverError},
    error::Error,
    schema::Schema,
};
use parking_lot::RwLock;
use std::{collections::BTreeMap, sync::Arc};
use thiserror::Error as ThisError;

///
/// Connection
///
/// A live handle to one backend: an alias, the backend kind it was created
/// for, and the dialect layer over the externally supplied driver. The
/// registry exclusively owns connections; schemas, documents and querysets
/// refer to them only by alias or kind, resolved at call time.
///

pub struct Connection {
    alias: String,
    kind: BackendKind,
    backend: Arc<dyn Backend>,
    driver: Arc<dyn Driver>,
}

impl Connection {
    fn new(alias: String, kind: BackendKind, driver: Arc<dyn Driver>) -> Self {
        Self {
            alias,
            kind,
            backend: backend::for_kind(kind, driver.clone()),
            driver,
        }
    }

    #[must_use]
    pub fn alias(&self) -> &str {
        &self.alias
    }

    #[must_use]
    pub const fn kind(&self) -> BackendKind {
        self.kind
    }

    #[must_use]
    pub const fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    /// Reject a schema compiled for a different backend kind.
    pub(crate) fn check_kind(&self, schema: &Schema) -> Result<(), Error> {
        if self.kind == schema.backend() {
            Ok(())
        } else {
            Err(Error::BackendMismatch {
                collection: schema.collection().to_string(),
                expected: schema.backend(),
                found: self.kind,
            })
        }
    }

    async fn close(&self) -> Result<(), DriverError> {
        self.driver.close().await
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("alias", &self.alias)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

///
/// ConnectionRegistry
///
/// The only shared, mutable, process-wide structure in the core. Created
/// empty by the bootstrap layer, mutated through `register`, and torn down
/// explicitly at shutdown so backend resources are released.
///
/// At most one connection is the default per backend kind; registering a
/// new default supersedes the previous one (last writer wins) without
/// closing it. Superseded connections stay resolvable by alias and remain
/// the caller's responsibility to release.
///

#[derive(Default)]
pub struct ConnectionRegistry {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    by_alias: BTreeMap<String, Arc<Connection>>,
    defaults: BTreeMap<BackendKind, String>,
}

impl ConnectionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and store a connection. `default` additionally makes it the
    /// kind-level default.
    pub fn register(
        &self,
        alias: impl Into<String>,
        kind: BackendKind,
        driver: Arc<dyn Driver>,
        default: bool,
    ) -> Arc<Connection> {
        let alias = alias.into();
        let connection = Arc::new(Connection::new(alias.clone(), kind, driver));

        let mut inner = self.inner.write();
        if inner.by_alias.insert(alias.clone(), connection.clone()).is_some() {
            tracing::warn!(alias, "replacing previously registered connection");
        }
        if default {
            if let Some(previous) = inner.defaults.insert(kind, alias.clone())
                && previous != alias
            {
                tracing::info!(
                    kind = %kind,
                    superseded = previous,
                    alias,
                    "default connection superseded"
                );
            }
        }
        drop(inner);

        tracing::info!(alias = connection.alias(), kind = %kind, "connection registered");

        connection
    }

    /// Resolve a connection by its explicit alias.
    pub fn resolve(&self, alias: &str) -> Result<Arc<Connection>, ConnectionError> {
        self.inner
            .read()
            .by_alias
            .get(alias)
            .cloned()
            .ok_or_else(|| ConnectionError::AliasNotFound {
                alias: alias.to_string(),
            })
    }

    /// Resolve the default connection for a backend kind.
    pub fn resolve_kind(&self, kind: BackendKind) -> Result<Arc<Connection>, ConnectionError> {
        let inner = self.inner.read();
        inner
            .defaults
            .get(&kind)
            .and_then(|alias| inner.by_alias.get(alias))
            .cloned()
            .ok_or(ConnectionError::NoDefaultForKind { kind })
    }

    #[must_use]
    pub fn aliases(&self) -> Vec<String> {
        self.inner.read().by_alias.keys().cloned().collect()
    }

    /// Close and remove one connection.
    pub async fn close(&self, alias: &str) -> Result<(), ConnectionError> {
        let connection = {
            let mut inner = self.inner.write();
            let connection = inner.by_alias.remove(alias).ok_or_else(|| {
                ConnectionError::AliasNotFound {
                    alias: alias.to_string(),
                }
            })?;
            inner.defaults.retain(|_, default| default != alias);
            connection
        };

        connection
            .close()
            .await
            .map_err(|source| ConnectionError::Close {
                alias: alias.to_string(),
                source,
            })
    }

    /// Close every owned connection. Called once at process shutdown; the
    /// registry is empty afterwards even if some closes failed.
    pub async fn teardown(&self) -> Result<(), ConnectionError> {
        let connections: Vec<Arc<Connection>> = {
            let mut inner = self.inner.write();
            inner.defaults.clear();
            std::mem::take(&mut inner.by_alias).into_values().collect()
        };

        let mut first_failure = None;
        for connection in connections {
            if let Err(source) = connection.close().await {
                tracing::warn!(alias = connection.alias(), error = %source, "close failed");
                first_failure.get_or_insert(ConnectionError::Close {
                    alias: connection.alias().to_string(),
                    source,
                });
            } else {
                tracing::info!(alias = connection.alias(), "connection closed");
            }
        }

        match first_failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

///
/// ConnectionError
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum ConnectionError {
    #[error("no connection registered under alias '{alias}'")]
    AliasNotFound { alias: String },

    #[error("no default connection registered for the {kind} backend")]
    NoDefaultForKind { kind: BackendKind },

    #[error("closing connection '{alias}' failed: {source}")]
    Close {
        alias: String,
        #[source]
        source: DriverError,
    },
}
