use crate::{backend::BackendKind, value::Value};
use std::collections::BTreeMap;

///
/// BackendOptions
///
/// The backend-specific storage option bag attached to a compiled schema.
/// Keys are validated against the resolved backend's accepted set at
/// compile time; executing layers can therefore trust every entry.
///

#[derive(Clone, Debug, Default, PartialEq)]
pub struct BackendOptions {
    entries: BTreeMap<String, Value>,
}

impl BackendOptions {
    pub(crate) fn from_entries(entries: BTreeMap<String, Value>) -> Self {
        Self { entries }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub(crate) fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.entries.insert(key.into(), value);
    }

    ///
    /// TYPED ACCESSORS
    ///

    /// Columnar table engine, e.g. `MergeTree`.
    #[must_use]
    pub fn engine(&self) -> Option<&str> {
        self.get("engine").and_then(Value::as_text)
    }

    #[must_use]
    pub fn engine_params(&self) -> Vec<&str> {
        match self.get("engine_params") {
            Some(Value::List(items)) => items.iter().filter_map(Value::as_text).collect(),
            _ => Vec::new(),
        }
    }

    /// Columnar sort key. Always present after compilation (inferred when
    /// not declared).
    #[must_use]
    pub fn order_by(&self) -> Vec<&str> {
        match self.get("order_by") {
            Some(Value::List(items)) => items.iter().filter_map(Value::as_text).collect(),
            Some(Value::Text(single)) => vec![single.as_str()],
            _ => Vec::new(),
        }
    }

    #[must_use]
    pub fn partition_by(&self) -> Option<&str> {
        self.get("partition_by").and_then(Value::as_text)
    }

    /// Columnar TTL clause, verbatim.
    #[must_use]
    pub fn ttl(&self) -> Option<&str> {
        self.get("ttl").and_then(Value::as_text)
    }

    #[must_use]
    pub fn settings(&self) -> Vec<(&str, &Value)> {
        match self.get("settings") {
            Some(Value::Object(entries)) => {
                entries.iter().map(|(k, v)| (k.as_str(), v)).collect()
            }
            _ => Vec::new(),
        }
    }

    /// Graph table mode; schemaless tables skip field definitions.
    #[must_use]
    pub fn schemafull(&self) -> bool {
        match self.get("schemafull") {
            Some(Value::Bool(v)) => *v,
            _ => true,
        }
    }

    /// Key-value expiry applied on every write.
    #[must_use]
    pub fn ttl_seconds(&self) -> Option<i64> {
        match self.get("ttl_seconds") {
            Some(Value::Int(n)) => Some(*n),
            _ => None,
        }
    }

    /// Key-value namespace prefix. Defaults to the crate name.
    #[must_use]
    pub fn key_prefix(&self) -> &str {
        self.get("key_prefix")
            .and_then(Value::as_text)
            .unwrap_or("strata")
    }
}

/// Option keys each backend accepts; anything else is a compile error.
pub(crate) const fn accepted_keys(kind: BackendKind) -> &'static [&'static str] {
    match kind {
        BackendKind::Graph => &["schemafull"],
        BackendKind::Columnar => &[
            "engine",
            "engine_params",
            "order_by",
            "partition_by",
            "settings",
            "ttl",
        ],
        BackendKind::KeyValue => &["key_prefix", "ttl_seconds"],
    }
}

/// The value shape a known option key expects, for compile-time checks.
pub(crate) fn expected_shape(key: &str, value: &Value) -> Result<(), &'static str> {
    let ok = match key {
        "engine" | "partition_by" | "ttl" | "key_prefix" => {
            matches!(value, Value::Text(_))
        }
        "engine_params" => matches!(value, Value::List(_)),
        "order_by" => matches!(value, Value::List(_) | Value::Text(_)),
        "settings" => matches!(value, Value::Object(_)),
        "schemafull" => matches!(value, Value::Bool(_)),
        "ttl_seconds" => matches!(value, Value::Int(_)),
        _ => true,
    };

    if ok {
        Ok(())
    } else {
        Err(match key {
            "engine" | "partition_by" | "ttl" | "key_prefix" => "a text value",
            "engine_params" => "a list of values",
            "order_by" => "a list of field names or a single field name",
            "settings" => "an object of setting pairs",
            "schemafull" => "a bool",
            "ttl_seconds" => "an integer number of seconds",
            _ => "a supported value",
        })
    }
}
