mod cache;
mod infer;
mod options;

#[cfg(test)]
mod tests;

use crate::{
    backend::BackendKind,
    field::{FieldDef, Pattern},
    value::Value,
};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error as ThisError;

pub use cache::{Model, schema_of};
pub use options::BackendOptions;

///
/// Schema
///
/// The compiled, immutable descriptor of an entity type. Field order is the
/// declaration order and is significant for deterministic DDL and wire
/// output. Exactly one backend kind per schema; unknown storage options are
/// rejected here, never at execution time.
///

#[derive(Clone, Debug, PartialEq)]
pub struct Schema {
    entity: String,
    collection: String,
    backend: BackendKind,
    fields: Vec<(String, FieldDef)>,
    primary_key: String,
    options: BackendOptions,
    indexes: Vec<IndexSpec>,
}

impl Schema {
    /// Start a declaration for an entity type.
    #[must_use]
    pub fn builder(entity: impl Into<String>, backend: BackendKind) -> SchemaBuilder {
        SchemaBuilder {
            entity: entity.into(),
            collection: None,
            backend,
            fields: Vec::new(),
            primary_key: None,
            options: Vec::new(),
            indexes: Vec::new(),
        }
    }

    #[must_use]
    pub fn entity(&self) -> &str {
        &self.entity
    }

    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    #[must_use]
    pub const fn backend(&self) -> BackendKind {
        self.backend
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldDef)> {
        self.fields.iter().map(|(name, def)| (name.as_str(), def))
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, def)| def)
    }

    #[must_use]
    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    /// The primary key's field definition. Present by construction.
    #[must_use]
    pub fn pk_field(&self) -> &FieldDef {
        self.field(&self.primary_key)
            .expect("schema invariant: primary key is a declared field")
    }

    #[must_use]
    pub const fn options(&self) -> &BackendOptions {
        &self.options
    }

    #[must_use]
    pub fn indexes(&self) -> &[IndexSpec] {
        &self.indexes
    }
}

///
/// SchemaBuilder
///
/// Ordered field declarations plus configuration, compiled exactly once per
/// entity type into a `Schema`.
///

#[derive(Clone, Debug)]
pub struct SchemaBuilder {
    entity: String,
    collection: Option<String>,
    backend: BackendKind,
    fields: Vec<(String, FieldDef)>,
    primary_key: Option<String>,
    options: Vec<(String, Value)>,
    indexes: Vec<IndexSpec>,
}

impl SchemaBuilder {
    /// Override the logical collection/table name. Defaults to the
    /// lowercased entity name.
    #[must_use]
    pub fn collection(mut self, name: impl Into<String>) -> Self {
        self.collection = Some(name.into());
        self
    }

    #[must_use]
    pub fn field(mut self, name: impl Into<String>, def: FieldDef) -> Self {
        self.fields.push((name.into(), def));
        self
    }

    #[must_use]
    pub fn primary_key(mut self, name: impl Into<String>) -> Self {
        self.primary_key = Some(name.into());
        self
    }

    /// Attach a backend-specific storage option. Keys are validated against
    /// the resolved backend's accepted set at compile time.
    #[must_use]
    pub fn option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn index(mut self, index: IndexSpec) -> Self {
        self.indexes.push(index);
        self
    }

    /// Compile the declaration into an immutable schema.
    ///
    /// Deterministic: compiling the same declaration twice yields
    /// structurally equal schemas.
    pub fn compile(self) -> Result<Schema, SchemaError> {
        let entity = self.entity;
        let collection = match self.collection {
            Some(name) => name,
            None => entity.to_lowercase(),
        };
        if collection.is_empty() {
            return Err(SchemaError::EmptyCollection { entity });
        }

        let mut fields = self.fields;

        // duplicate field names
        let mut seen = BTreeSet::new();
        for (name, _) in &fields {
            if !seen.insert(name.clone()) {
                return Err(SchemaError::DuplicateField {
                    entity,
                    field: name.clone(),
                });
            }
        }

        // patterns that failed to compile surface here, not at call time
        for (name, def) in &fields {
            if let Some(Pattern::Invalid { raw, error }) = &def.constraints().pattern {
                return Err(SchemaError::InvalidPattern {
                    entity,
                    field: name.clone(),
                    pattern: raw.clone(),
                    error: error.clone(),
                });
            }
        }

        // primary key: declared, else a declared `id` field, else a
        // synthetic ulid `id`
        let primary_key = match self.primary_key {
            Some(pk) => {
                if !seen.contains(&pk) {
                    return Err(SchemaError::UnknownPrimaryKey { entity, field: pk });
                }
                pk
            }
            None => {
                if !seen.contains("id") {
                    fields.insert(0, ("id".to_string(), FieldDef::ulid()));
                }
                "id".to_string()
            }
        };

        let pk_kind = fields
            .iter()
            .find(|(name, _)| *name == primary_key)
            .map(|(_, def)| def.kind().clone())
            .expect("primary key resolved above");
        if !pk_kind.is_keyable() {
            return Err(SchemaError::UnkeyablePrimaryKey {
                entity,
                field: primary_key,
                kind: pk_kind.to_string(),
            });
        }

        // option keys and value shapes, against the resolved backend only
        let accepted = options::accepted_keys(self.backend);
        let mut entries = BTreeMap::new();
        for (key, value) in self.options {
            if !accepted.contains(&key.as_str()) {
                return Err(SchemaError::UnknownOption {
                    entity,
                    backend: self.backend,
                    key,
                });
            }
            if let Err(expected) = options::expected_shape(&key, &value) {
                return Err(SchemaError::InvalidOption {
                    entity,
                    key,
                    expected,
                });
            }
            entries.insert(key, value);
        }
        let mut options = BackendOptions::from_entries(entries);

        if self.backend == BackendKind::Columnar {
            if options.engine().is_none() {
                return Err(SchemaError::MissingOption {
                    entity,
                    backend: self.backend,
                    key: "engine",
                });
            }
            if options.order_by().is_empty() {
                let inferred = infer::infer_order_by(&fields);
                options.insert("order_by", Value::list(inferred));
            }
        }

        // index fields must exist
        for index in &self.indexes {
            for field in &index.fields {
                if !seen.contains(field) && field != &primary_key {
                    return Err(SchemaError::UnknownIndexField {
                        entity,
                        index: index.name.clone(),
                        field: field.clone(),
                    });
                }
            }
        }

        Ok(Schema {
            entity,
            collection,
            backend: self.backend,
            fields,
            primary_key,
            options,
            indexes: self.indexes,
        })
    }
}

///
/// IndexSpec
///

#[derive(Clone, Debug, PartialEq)]
pub struct IndexSpec {
    pub name: String,
    pub fields: Vec<String>,
    pub unique: bool,
    pub columnar: Option<ColumnarIndex>,
}

impl IndexSpec {
    pub fn new<I, S>(name: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            fields: fields.into_iter().map(Into::into).collect(),
            unique: false,
            columnar: None,
        }
    }

    #[must_use]
    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Columnar bloom-filter skip index.
    #[must_use]
    pub const fn bloom_filter(mut self, false_positive_rate: f64) -> Self {
        self.columnar = Some(ColumnarIndex {
            shape: ColumnarIndexShape::BloomFilter {
                false_positive_rate,
            },
            granularity: ColumnarIndex::DEFAULT_GRANULARITY,
        });
        self
    }

    /// Columnar set skip index bounded at `max_values` distinct values.
    #[must_use]
    pub const fn set(mut self, max_values: u32) -> Self {
        self.columnar = Some(ColumnarIndex {
            shape: ColumnarIndexShape::Set { max_values },
            granularity: ColumnarIndex::DEFAULT_GRANULARITY,
        });
        self
    }

    /// Columnar minmax skip index.
    #[must_use]
    pub const fn minmax(mut self) -> Self {
        self.columnar = Some(ColumnarIndex {
            shape: ColumnarIndexShape::MinMax,
            granularity: ColumnarIndex::DEFAULT_GRANULARITY,
        });
        self
    }

    #[must_use]
    pub const fn granularity(mut self, granularity: u32) -> Self {
        if let Some(columnar) = &mut self.columnar {
            columnar.granularity = granularity;
        }
        self
    }
}

///
/// ColumnarIndex
///

#[derive(Clone, Debug, PartialEq)]
pub struct ColumnarIndex {
    pub shape: ColumnarIndexShape,
    pub granularity: u32,
}

impl ColumnarIndex {
    pub const DEFAULT_GRANULARITY: u32 = 3;
}

#[derive(Clone, Debug, PartialEq)]
pub enum ColumnarIndexShape {
    BloomFilter { false_positive_rate: f64 },
    Set { max_values: u32 },
    MinMax,
}

///
/// SchemaError
///
/// Malformed entity declaration. Raised when the declaration compiles,
/// never at call time.
///

#[derive(Clone, Debug, PartialEq, ThisError)]
pub enum SchemaError {
    #[error("entity '{entity}' declares field '{field}' more than once")]
    DuplicateField { entity: String, field: String },

    #[error("entity '{entity}': option '{key}' is not accepted by the {backend} backend")]
    UnknownOption {
        entity: String,
        backend: BackendKind,
        key: String,
    },

    #[error("entity '{entity}': option '{key}' expects {expected}")]
    InvalidOption {
        entity: String,
        key: String,
        expected: &'static str,
    },

    #[error("entity '{entity}': the {backend} backend requires option '{key}'")]
    MissingOption {
        entity: String,
        backend: BackendKind,
        key: &'static str,
    },

    #[error("entity '{entity}': primary key '{field}' is not a declared field")]
    UnknownPrimaryKey { entity: String, field: String },

    #[error("entity '{entity}': primary key '{field}' has unkeyable kind {kind}")]
    UnkeyablePrimaryKey {
        entity: String,
        field: String,
        kind: String,
    },

    #[error("entity '{entity}': field '{field}' has invalid pattern '{pattern}': {error}")]
    InvalidPattern {
        entity: String,
        field: String,
        pattern: String,
        error: String,
    },

    #[error("entity '{entity}': index '{index}' references unknown field '{field}'")]
    UnknownIndexField {
        entity: String,
        index: String,
        field: String,
    },

    #[error("entity '{entity}' has an empty collection name")]
    EmptyCollection { entity: String },
}
