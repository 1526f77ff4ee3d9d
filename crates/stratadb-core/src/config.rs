//! Connection configuration.
//!
//! The bootstrap layer loads one `Config` at startup, builds a driver from
//! each profile, and registers the result with the `ConnectionRegistry`. The
//! core never reads connection parameters implicitly.
//!
//! Profiles are declared in TOML under `[connections.<alias>]`:
//!
//! ```toml
//! [connections.analytics]
//! backend = "columnar"
//! endpoint = "http://localhost:8123"
//! database = "default"
//! default = true
//! ```
//!
//! Environment variables of the form `STRATADB_<ALIAS>_<FIELD>` override the
//! matching profile field, so credentials can stay out of checked-in files.

use crate::backend::BackendKind;
use serde::Deserialize;
use std::{collections::BTreeMap, path::Path};
use thiserror::Error as ThisError;

///
/// Config
///

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub connections: BTreeMap<String, ConnectionProfile>,
}

///
/// ConnectionProfile
///
/// Parameters for one backend connection, keyed by alias.
///

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ConnectionProfile {
    pub backend: BackendKind,
    pub endpoint: String,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// Graph-store namespace.
    #[serde(default)]
    pub namespace: Option<String>,

    #[serde(default)]
    pub database: Option<String>,

    /// Register this connection as the default for its backend kind.
    #[serde(default)]
    pub default: bool,
}

impl Config {
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse { source })
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;

        Self::from_toml(&text)
    }

    #[must_use]
    pub fn profile(&self, alias: &str) -> Option<&ConnectionProfile> {
        self.connections.get(alias)
    }

    /// Aliases of the profiles targeting one backend kind, declaration order.
    #[must_use]
    pub fn aliases_for(&self, kind: BackendKind) -> Vec<&str> {
        self.connections
            .iter()
            .filter(|(_, profile)| profile.backend == kind)
            .map(|(alias, _)| alias.as_str())
            .collect()
    }

    /// Apply `STRATADB_<ALIAS>_<FIELD>` overrides from the process
    /// environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(std::env::vars());
    }

    /// Apply overrides from an explicit variable set. Unknown aliases and
    /// fields are ignored; only declared profiles can be overridden.
    pub fn apply_overrides(&mut self, vars: impl IntoIterator<Item = (String, String)>) {
        for (key, value) in vars {
            let Some(rest) = key.strip_prefix("STRATADB_") else {
                continue;
            };
            let Some((alias, field)) = rest.rsplit_once('_') else {
                continue;
            };
            let Some(profile) = self.connections.get_mut(&alias.to_lowercase()) else {
                continue;
            };

            match field {
                "ENDPOINT" => profile.endpoint = value,
                "USERNAME" => profile.username = Some(value),
                "PASSWORD" => profile.password = Some(value),
                "NAMESPACE" => profile.namespace = Some(value),
                "DATABASE" => profile.database = Some(value),
                _ => {}
            }
        }
    }
}

///
/// ConfigError
///

#[derive(Debug, ThisError)]
pub enum ConfigError {
    #[error("unreadable config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed config: {source}")]
    Parse {
        #[source]
        source: toml::de::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE: &str = r#"
        [connections.main]
        backend = "graph"
        endpoint = "ws://localhost:8000"
        namespace = "app"
        database = "app"
        default = true

        [connections.analytics]
        backend = "columnar"
        endpoint = "http://localhost:8123"

        [connections.cache]
        backend = "key_value"
        endpoint = "redis://localhost:6379"
    "#;

    #[test]
    fn profiles_parse_with_defaults() {
        let config = Config::from_toml(EXAMPLE).unwrap();

        let main = config.profile("main").unwrap();
        assert_eq!(main.backend, BackendKind::Graph);
        assert!(main.default);
        assert_eq!(main.namespace.as_deref(), Some("app"));

        let cache = config.profile("cache").unwrap();
        assert_eq!(cache.backend, BackendKind::KeyValue);
        assert!(!cache.default);
        assert!(cache.username.is_none());
    }

    #[test]
    fn env_overrides_replace_declared_fields() {
        let mut config = Config::from_toml(EXAMPLE).unwrap();
        config.apply_overrides([
            (
                "STRATADB_ANALYTICS_ENDPOINT".to_string(),
                "http://ch.internal:8123".to_string(),
            ),
            (
                "STRATADB_ANALYTICS_PASSWORD".to_string(),
                "hunter2".to_string(),
            ),
            ("STRATADB_UNKNOWN_ENDPOINT".to_string(), "x".to_string()),
            ("UNRELATED".to_string(), "y".to_string()),
        ]);

        let analytics = config.profile("analytics").unwrap();
        assert_eq!(analytics.endpoint, "http://ch.internal:8123");
        assert_eq!(analytics.password.as_deref(), Some("hunter2"));
    }

    #[test]
    fn unknown_backend_kind_is_a_parse_error() {
        let err = Config::from_toml(
            "[connections.bad]\nbackend = \"sqlite\"\nendpoint = \"x\"\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
