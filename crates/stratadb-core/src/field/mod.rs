pub mod codec;

#[cfg(test)]
mod tests;

use crate::{
    backend::BackendKind,
    value::{Float64, Value, ValueKind, WireDecodeError, WireValue},
};
use regex::Regex;
use std::fmt;
use thiserror::Error as ThisError;
use time::UtcOffset;

///
/// FieldKind
///
/// Closed set of declarable field types. Mirrors the value model, with
/// typed list elements.
///

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum FieldKind {
    Bool,
    Int,
    Float,
    Text,
    DateTime,
    Uuid,
    Ulid,
    List(Box<FieldKind>),
    Object,
}

impl FieldKind {
    /// Whether values of this kind may serve as a primary key.
    #[must_use]
    pub const fn is_keyable(&self) -> bool {
        matches!(self, Self::Int | Self::Text | Self::Uuid | Self::Ulid)
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool => f.write_str("bool"),
            Self::Int => f.write_str("int"),
            Self::Float => f.write_str("float"),
            Self::Text => f.write_str("text"),
            Self::DateTime => f.write_str("datetime"),
            Self::Uuid => f.write_str("uuid"),
            Self::Ulid => f.write_str("ulid"),
            Self::List(elem) => write!(f, "list<{elem}>"),
            Self::Object => f.write_str("object"),
        }
    }
}

///
/// StorageClass
///
/// Columnar storage hint. `LowCardinality` maps to dictionary-encoded
/// columns on the columnar store and is a plain string everywhere else.
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum StorageClass {
    #[default]
    Plain,
    LowCardinality,
}

///
/// FieldDefault
///

#[derive(Clone, Debug, PartialEq)]
pub enum FieldDefault {
    Static(Value),
    /// Lazily computed at materialization/save time (e.g. generated ids,
    /// current timestamps).
    Computed(fn() -> Value),
}

impl FieldDefault {
    #[must_use]
    pub fn produce(&self) -> Value {
        match self {
            Self::Static(value) => value.clone(),
            Self::Computed(f) => f(),
        }
    }
}

///
/// Pattern
///
/// A regex constraint. Compilation happens when the declaration is built;
/// an invalid pattern is carried until schema compilation, which rejects
/// it with a `SchemaError` so field builders stay infallible.
///

#[derive(Clone, Debug)]
pub enum Pattern {
    Compiled { raw: String, regex: Regex },
    Invalid { raw: String, error: String },
}

impl Pattern {
    fn new(raw: &str) -> Self {
        match Regex::new(raw) {
            Ok(regex) => Self::Compiled {
                raw: raw.to_string(),
                regex,
            },
            Err(err) => Self::Invalid {
                raw: raw.to_string(),
                error: err.to_string(),
            },
        }
    }

    #[must_use]
    pub fn raw(&self) -> &str {
        match self {
            Self::Compiled { raw, .. } | Self::Invalid { raw, .. } => raw,
        }
    }

    fn is_match(&self, text: &str) -> bool {
        match self {
            Self::Compiled { regex, .. } => regex.is_match(text),
            // unreachable after schema compilation; fail closed
            Self::Invalid { .. } => false,
        }
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.raw() == other.raw()
    }
}

///
/// Constraints
///

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Constraints {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub choices: Vec<Value>,
    pub pattern: Option<Pattern>,
}

///
/// FieldCodec
///
/// One backend-specific serialize/deserialize override pair. Plain function
/// pointers keep field declarations immutable, comparable, and freely
/// shareable across threads.
///

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FieldCodec {
    pub serialize: fn(&Value) -> WireValue,
    pub deserialize: fn(&WireValue) -> Result<Value, WireDecodeError>,
}

///
/// CodecTable
///
/// Fixed dispatch table of per-backend codec overrides, indexed by the
/// backend-kind tag. Never consulted via reflection; a missing slot falls
/// back to the canonical wire encoding.
///

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CodecTable([Option<FieldCodec>; 3]);

impl CodecTable {
    const fn slot(kind: BackendKind) -> usize {
        match kind {
            BackendKind::Graph => 0,
            BackendKind::Columnar => 1,
            BackendKind::KeyValue => 2,
        }
    }

    #[must_use]
    pub const fn get(&self, kind: BackendKind) -> Option<&FieldCodec> {
        self.0[Self::slot(kind)].as_ref()
    }

    fn set(&mut self, kind: BackendKind, codec: FieldCodec) {
        self.0[Self::slot(kind)] = Some(codec);
    }
}

///
/// FieldDef
///
/// One typed, validating, serializable attribute declaration. Created once
/// at schema-declaration time and immutable thereafter; shared by every
/// instance of the owning entity type.
///

#[derive(Clone, Debug, PartialEq)]
pub struct FieldDef {
    kind: FieldKind,
    required: bool,
    unique: bool,
    default: Option<FieldDefault>,
    constraints: Constraints,
    storage: StorageClass,
    materialized: Option<String>,
    overrides: CodecTable,
}

impl FieldDef {
    #[must_use]
    pub const fn new(kind: FieldKind) -> Self {
        Self {
            kind,
            required: false,
            unique: false,
            default: None,
            constraints: Constraints {
                min: None,
                max: None,
                min_length: None,
                max_length: None,
                choices: Vec::new(),
                pattern: None,
            },
            storage: StorageClass::Plain,
            materialized: None,
            overrides: CodecTable([None, None, None]),
        }
    }

    ///
    /// CONSTRUCTORS
    ///

    #[must_use]
    pub const fn bool() -> Self {
        Self::new(FieldKind::Bool)
    }

    #[must_use]
    pub const fn int() -> Self {
        Self::new(FieldKind::Int)
    }

    #[must_use]
    pub const fn float() -> Self {
        Self::new(FieldKind::Float)
    }

    #[must_use]
    pub const fn text() -> Self {
        Self::new(FieldKind::Text)
    }

    #[must_use]
    pub const fn datetime() -> Self {
        Self::new(FieldKind::DateTime)
    }

    #[must_use]
    pub const fn uuid() -> Self {
        Self::new(FieldKind::Uuid)
    }

    #[must_use]
    pub const fn ulid() -> Self {
        Self::new(FieldKind::Ulid)
    }

    #[must_use]
    pub fn list(elem: FieldKind) -> Self {
        Self::new(FieldKind::List(Box::new(elem)))
    }

    #[must_use]
    pub const fn object() -> Self {
        Self::new(FieldKind::Object)
    }

    ///
    /// BUILDER
    ///

    #[must_use]
    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    #[must_use]
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(FieldDefault::Static(value.into()));
        self
    }

    #[must_use]
    pub fn default_with(mut self, f: fn() -> Value) -> Self {
        self.default = Some(FieldDefault::Computed(f));
        self
    }

    #[must_use]
    pub const fn min(mut self, min: f64) -> Self {
        self.constraints.min = Some(min);
        self
    }

    #[must_use]
    pub const fn max(mut self, max: f64) -> Self {
        self.constraints.max = Some(max);
        self
    }

    #[must_use]
    pub const fn min_length(mut self, len: usize) -> Self {
        self.constraints.min_length = Some(len);
        self
    }

    #[must_use]
    pub const fn max_length(mut self, len: usize) -> Self {
        self.constraints.max_length = Some(len);
        self
    }

    #[must_use]
    pub fn choices<I, T>(mut self, choices: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        self.constraints.choices = choices.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn pattern(mut self, raw: &str) -> Self {
        self.constraints.pattern = Some(Pattern::new(raw));
        self
    }

    /// Columnar dictionary encoding for enum-like text columns.
    #[must_use]
    pub const fn low_cardinality(mut self) -> Self {
        self.storage = StorageClass::LowCardinality;
        self
    }

    /// Columnar materialized column computed from the given expression.
    /// Materialized columns are never written by inserts.
    #[must_use]
    pub fn materialized(mut self, expr: impl Into<String>) -> Self {
        self.materialized = Some(expr.into());
        self
    }

    /// Install a backend-specific codec override.
    #[must_use]
    pub fn with_codec(mut self, kind: BackendKind, codec: FieldCodec) -> Self {
        self.overrides.set(kind, codec);
        self
    }

    ///
    /// ACCESSORS
    ///

    #[must_use]
    pub const fn kind(&self) -> &FieldKind {
        &self.kind
    }

    #[must_use]
    pub const fn is_required(&self) -> bool {
        self.required
    }

    #[must_use]
    pub const fn is_unique(&self) -> bool {
        self.unique
    }

    #[must_use]
    pub const fn default(&self) -> Option<&FieldDefault> {
        self.default.as_ref()
    }

    #[must_use]
    pub const fn constraints(&self) -> &Constraints {
        &self.constraints
    }

    #[must_use]
    pub const fn storage(&self) -> StorageClass {
        self.storage
    }

    #[must_use]
    pub fn materialized_expr(&self) -> Option<&str> {
        self.materialized.as_deref()
    }

    ///
    /// VALIDATION
    ///

    /// Coerce a raw value into this field's kind and enforce the declared
    /// constraints. Runs before any serialization; never touches a backend.
    pub fn validate(&self, field: &str, raw: Value) -> Result<Value, ValidationError> {
        if raw.is_null() {
            if self.required {
                return Err(ValidationError::Missing {
                    field: field.to_string(),
                });
            }
            return Ok(Value::Null);
        }

        let value = coerce(&self.kind, field, raw)?;
        self.check_constraints(field, &value)?;

        Ok(value)
    }

    fn check_constraints(&self, field: &str, value: &Value) -> Result<(), ValidationError> {
        let c = &self.constraints;

        if let Some(n) = value.as_f64() {
            if let Some(min) = c.min
                && n < min
            {
                return Err(ValidationError::BelowMin {
                    field: field.to_string(),
                    value: n,
                    min,
                });
            }
            if let Some(max) = c.max
                && n > max
            {
                return Err(ValidationError::AboveMax {
                    field: field.to_string(),
                    value: n,
                    max,
                });
            }
        }

        let len = match value {
            Value::Text(s) => Some(s.chars().count()),
            Value::List(items) => Some(items.len()),
            _ => None,
        };
        if let Some(len) = len {
            if let Some(min) = c.min_length
                && len < min
            {
                return Err(ValidationError::TooShort {
                    field: field.to_string(),
                    len,
                    min,
                });
            }
            if let Some(max) = c.max_length
                && len > max
            {
                return Err(ValidationError::TooLong {
                    field: field.to_string(),
                    len,
                    max,
                });
            }
        }

        if !c.choices.is_empty() && !c.choices.contains(value) {
            return Err(ValidationError::NotAChoice {
                field: field.to_string(),
            });
        }

        if let Some(pattern) = &c.pattern
            && let Value::Text(text) = value
            && !pattern.is_match(text)
        {
            return Err(ValidationError::PatternMismatch {
                field: field.to_string(),
                pattern: pattern.raw().to_string(),
            });
        }

        Ok(())
    }

    ///
    /// SERIALIZATION
    ///

    /// Convert a validated value to its wire form for a backend kind.
    /// Pure; selected through the fixed override table, falling back to the
    /// canonical encoding.
    #[must_use]
    pub fn serialize(&self, value: &Value, backend: BackendKind) -> WireValue {
        match self.overrides.get(backend) {
            Some(codec) => (codec.serialize)(value),
            None => value.to_wire(backend),
        }
    }

    /// Convert a wire value back into the runtime value model.
    /// Inverse of `serialize` for every validated value.
    pub fn deserialize(
        &self,
        wire: &WireValue,
        backend: BackendKind,
    ) -> Result<Value, WireDecodeError> {
        match self.overrides.get(backend) {
            Some(codec) => (codec.deserialize)(wire),
            None => codec::decode(&self.kind, wire, backend),
        }
    }
}

/// Kind coercion: exact match, int-to-float widening, text parses for
/// identifier and datetime kinds, millisecond truncation for datetimes.
fn coerce(kind: &FieldKind, field: &str, value: Value) -> Result<Value, ValidationError> {
    let found = value.kind();

    match (kind, value) {
        (FieldKind::Bool, v @ Value::Bool(_))
        | (FieldKind::Int, v @ Value::Int(_))
        | (FieldKind::Text, v @ Value::Text(_))
        | (FieldKind::Float, v @ Value::Float(_))
        | (FieldKind::Uuid, v @ Value::Uuid(_))
        | (FieldKind::Ulid, v @ Value::Ulid(_))
        | (FieldKind::Object, v @ Value::Object(_)) => Ok(v),

        #[allow(clippy::cast_precision_loss)]
        (FieldKind::Float, Value::Int(n)) => Float64::try_new(n as f64)
            .map(Value::Float)
            .ok_or_else(|| ValidationError::Unparsable {
                field: field.to_string(),
                expected: "float",
                text: n.to_string(),
            }),

        (FieldKind::Uuid, Value::Text(text)) => text.parse().map(Value::Uuid).map_err(|_| {
            ValidationError::Unparsable {
                field: field.to_string(),
                expected: "uuid",
                text,
            }
        }),

        (FieldKind::Ulid, Value::Text(text)) => text.parse().map(Value::Ulid).map_err(|_| {
            ValidationError::Unparsable {
                field: field.to_string(),
                expected: "ulid",
                text,
            }
        }),

        (FieldKind::DateTime, Value::DateTime(dt)) => Ok(Value::DateTime(canonical_datetime(dt))),

        (FieldKind::DateTime, Value::Text(text)) => {
            time::OffsetDateTime::parse(&text, &time::format_description::well_known::Rfc3339)
                .map(|dt| Value::DateTime(canonical_datetime(dt)))
                .map_err(|_| ValidationError::Unparsable {
                    field: field.to_string(),
                    expected: "datetime",
                    text,
                })
        }

        (FieldKind::List(elem), Value::List(items)) => {
            let coerced = items
                .into_iter()
                .map(|item| coerce(elem, field, item))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::List(coerced))
        }

        (expected, _) => Err(ValidationError::WrongKind {
            field: field.to_string(),
            expected: expected.to_string(),
            found,
        }),
    }
}

/// UTC, truncated to millisecond precision (the finest precision every
/// backend wire encoding preserves).
fn canonical_datetime(dt: time::OffsetDateTime) -> time::OffsetDateTime {
    let utc = dt.to_offset(UtcOffset::UTC);
    let millis = utc.nanosecond() / 1_000_000;
    utc.replace_nanosecond(millis * 1_000_000)
        .unwrap_or(utc)
}

///
/// ValidationError
///
/// A raw value failed its field's declared constraints. Always surfaced
/// before any backend call is attempted.
///

#[derive(Clone, Debug, PartialEq, ThisError)]
pub enum ValidationError {
    #[error("field '{field}' is required")]
    Missing { field: String },

    #[error("field '{field}' expects {expected}, got {found}")]
    WrongKind {
        field: String,
        expected: String,
        found: ValueKind,
    },

    #[error("field '{field}' value {value} is below the minimum {min}")]
    BelowMin { field: String, value: f64, min: f64 },

    #[error("field '{field}' value {value} is above the maximum {max}")]
    AboveMax { field: String, value: f64, max: f64 },

    #[error("field '{field}' length {len} is below the minimum {min}")]
    TooShort { field: String, len: usize, min: usize },

    #[error("field '{field}' length {len} is above the maximum {max}")]
    TooLong { field: String, len: usize, max: usize },

    #[error("field '{field}' value is not one of the declared choices")]
    NotAChoice { field: String },

    #[error("field '{field}' does not match pattern '{pattern}'")]
    PatternMismatch { field: String, pattern: String },

    #[error("field '{field}' has unparsable {expected} value '{text}'")]
    Unparsable {
        field: String,
        expected: &'static str,
        text: String,
    },
}

impl ValidationError {
    /// The field the failure names.
    #[must_use]
    pub fn field(&self) -> &str {
        match self {
            Self::Missing { field }
            | Self::WrongKind { field, .. }
            | Self::BelowMin { field, .. }
            | Self::AboveMax { field, .. }
            | Self::TooShort { field, .. }
            | Self::TooLong { field, .. }
            | Self::NotAChoice { field }
            | Self::PatternMismatch { field, .. }
            | Self::Unparsable { field, .. } => field,
        }
    }
}
