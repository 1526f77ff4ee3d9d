use crate::{backend::BackendKind, value::Value};
use std::collections::BTreeMap;
use thiserror::Error as ThisError;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

///
/// Wire projection
///
/// Drivers stream rows back as loosely typed JSON mappings. This module
/// defines the canonical encoding of runtime values into that wire shape,
/// selected by backend kind. Decoding is field-kind directed and lives in
/// `field::codec`; the primitives here are shared by both directions.
///
/// Datetimes: RFC 3339 text on graph and key-value stores, unix millisecond
/// integers on the columnar store (millisecond precision is the validated
/// canonical precision, so the round trip is exact).
///

pub type WireValue = serde_json::Value;

/// One raw row as streamed back by a driver. BTreeMap keeps column order
/// deterministic for fingerprints and test assertions.
pub type WireRow = BTreeMap<String, WireValue>;

///
/// WireDecodeError
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum WireDecodeError {
    #[error("expected {expected}, found {found}")]
    Mismatch { expected: &'static str, found: String },

    #[error("unparsable datetime payload: {0}")]
    BadDateTime(String),

    #[error("unparsable uuid payload: {0}")]
    BadUuid(String),

    #[error("unparsable ulid payload: {0}")]
    BadUlid(String),

    #[error("non-finite number on the wire")]
    NonFinite,
}

impl Value {
    /// Canonical wire encoding for a backend kind.
    ///
    /// Pure and total: every validated value has exactly one encoding per
    /// backend kind.
    #[must_use]
    pub fn to_wire(&self, backend: BackendKind) -> WireValue {
        match self {
            Self::Null => WireValue::Null,
            // The columnar store has no native bool; 0/1 is its canonical form.
            Self::Bool(v) => match backend {
                BackendKind::Columnar => WireValue::from(i64::from(*v)),
                BackendKind::Graph | BackendKind::KeyValue => WireValue::Bool(*v),
            },
            Self::Int(v) => WireValue::from(*v),
            Self::Float(v) => {
                serde_json::Number::from_f64(v.get()).map_or(WireValue::Null, WireValue::Number)
            }
            Self::Text(v) => WireValue::String(v.clone()),
            Self::DateTime(v) => datetime_to_wire(*v, backend),
            Self::Uuid(v) => WireValue::String(v.to_string()),
            Self::Ulid(v) => WireValue::String(v.to_string()),
            Self::List(items) => {
                WireValue::Array(items.iter().map(|v| v.to_wire(backend)).collect())
            }
            Self::Object(entries) => WireValue::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_wire(backend)))
                    .collect(),
            ),
        }
    }
}

pub(crate) fn datetime_to_wire(value: OffsetDateTime, backend: BackendKind) -> WireValue {
    match backend {
        BackendKind::Columnar => WireValue::from(unix_millis(value)),
        BackendKind::Graph | BackendKind::KeyValue => value
            .format(&Rfc3339)
            .map_or_else(|_| WireValue::from(unix_millis(value)), WireValue::String),
    }
}

pub(crate) fn datetime_from_wire(wire: &WireValue) -> Result<OffsetDateTime, WireDecodeError> {
    match wire {
        WireValue::String(text) => OffsetDateTime::parse(text, &Rfc3339)
            .map_err(|_| WireDecodeError::BadDateTime(text.clone())),
        WireValue::Number(n) => {
            let millis = n
                .as_i64()
                .ok_or_else(|| WireDecodeError::BadDateTime(n.to_string()))?;
            OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000)
                .map_err(|_| WireDecodeError::BadDateTime(millis.to_string()))
        }
        other => Err(WireDecodeError::Mismatch {
            expected: "datetime",
            found: wire_kind_name(other).to_string(),
        }),
    }
}

#[allow(clippy::cast_possible_truncation)]
pub(crate) fn unix_millis(value: OffsetDateTime) -> i64 {
    (value.unix_timestamp_nanos() / 1_000_000) as i64
}

pub(crate) const fn wire_kind_name(wire: &WireValue) -> &'static str {
    match wire {
        WireValue::Null => "null",
        WireValue::Bool(_) => "bool",
        WireValue::Number(_) => "number",
        WireValue::String(_) => "string",
        WireValue::Array(_) => "array",
        WireValue::Object(_) => "object",
    }
}
