//! Canonical wire decoding, directed by the declared field kind.
//!
//! Encoding lives on `Value::to_wire`; this module is its inverse. The pair
//! must round-trip exactly for every value that passes validation, for every
//! backend kind.

use crate::{
    backend::BackendKind,
    field::FieldKind,
    value::{Float64, Value, WireDecodeError, WireValue},
    value::wire::{datetime_from_wire, wire_kind_name},
};
use std::collections::BTreeMap;

/// Decode a wire value into the runtime value model for a field kind.
pub fn decode(
    kind: &FieldKind,
    wire: &WireValue,
    backend: BackendKind,
) -> Result<Value, WireDecodeError> {
    if wire.is_null() {
        return Ok(Value::Null);
    }

    match kind {
        FieldKind::Bool => decode_bool(wire),
        FieldKind::Int => wire.as_i64().map(Value::Int).ok_or_else(|| mismatch("int", wire)),
        FieldKind::Float => decode_float(wire),
        FieldKind::Text => wire
            .as_str()
            .map(|s| Value::Text(s.to_string()))
            .ok_or_else(|| mismatch("text", wire)),
        FieldKind::DateTime => datetime_from_wire(wire).map(Value::DateTime),
        FieldKind::Uuid => {
            let text = wire.as_str().ok_or_else(|| mismatch("uuid", wire))?;
            text.parse()
                .map(Value::Uuid)
                .map_err(|_| WireDecodeError::BadUuid(text.to_string()))
        }
        FieldKind::Ulid => {
            let text = wire.as_str().ok_or_else(|| mismatch("ulid", wire))?;
            text.parse()
                .map(Value::Ulid)
                .map_err(|_| WireDecodeError::BadUlid(text.to_string()))
        }
        FieldKind::List(elem) => {
            let items = wire.as_array().ok_or_else(|| mismatch("list", wire))?;
            items
                .iter()
                .map(|item| decode(elem, item, backend))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List)
        }
        FieldKind::Object => decode_any(wire),
    }
}

fn decode_bool(wire: &WireValue) -> Result<Value, WireDecodeError> {
    match wire {
        WireValue::Bool(v) => Ok(Value::Bool(*v)),
        // columnar stores encode bools as 0/1
        WireValue::Number(n) => match n.as_i64() {
            Some(0) => Ok(Value::Bool(false)),
            Some(1) => Ok(Value::Bool(true)),
            _ => Err(mismatch("bool", wire)),
        },
        _ => Err(mismatch("bool", wire)),
    }
}

fn decode_float(wire: &WireValue) -> Result<Value, WireDecodeError> {
    let n = wire.as_f64().ok_or_else(|| mismatch("float", wire))?;
    Float64::try_new(n)
        .map(Value::Float)
        .ok_or(WireDecodeError::NonFinite)
}

/// Structure-directed decoding for object interiors, where no declared
/// element kind exists.
fn decode_any(wire: &WireValue) -> Result<Value, WireDecodeError> {
    match wire {
        WireValue::Null => Ok(Value::Null),
        WireValue::Bool(v) => Ok(Value::Bool(*v)),
        WireValue::Number(n) => n.as_i64().map_or_else(|| decode_float(wire), |i| Ok(Value::Int(i))),
        WireValue::String(s) => Ok(Value::Text(s.clone())),
        WireValue::Array(items) => items
            .iter()
            .map(decode_any)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List),
        WireValue::Object(entries) => entries
            .iter()
            .map(|(k, v)| decode_any(v).map(|v| (k.clone(), v)))
            .collect::<Result<BTreeMap<_, _>, _>>()
            .map(Value::Object),
    }
}

fn mismatch(expected: &'static str, wire: &WireValue) -> WireDecodeError {
    WireDecodeError::Mismatch {
        expected,
        found: wire_kind_name(wire).to_string(),
    }
}
