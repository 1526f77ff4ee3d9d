//! Deterministic structural fingerprints for compiled operations.
//!
//! Tagged sha2 hashing over the backend kind, collection, expression tree,
//! and directives. Equal fingerprints imply structurally identical queries,
//! which keys the process-wide compiled-op cache.
#![allow(clippy::cast_possible_truncation)]

use crate::{
    query::{
        compile::OpShape,
        predicate::{ComparePredicate, Predicate},
        queryset::{OrderDirection, QuerySet},
    },
    value::Value,
};
use sha2::{Digest, Sha256};

///
/// OpFingerprint
///

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct OpFingerprint([u8; 32]);

impl OpFingerprint {
    #[must_use]
    pub fn as_hex(&self) -> String {
        use std::fmt::Write as _;

        let mut out = String::with_capacity(64);
        for byte in self.0 {
            let _ = write!(out, "{byte:02x}");
        }
        out
    }
}

impl std::fmt::Display for OpFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.as_hex())
    }
}

pub(crate) fn fingerprint(query: &QuerySet, shape: OpShape) -> OpFingerprint {
    let mut hasher = Sha256::new();
    hasher.update(b"opfp:v1");

    let schema = query.schema();
    write_tag(&mut hasher, schema.backend().tag());
    write_str(&mut hasher, schema.collection());
    write_tag(&mut hasher, shape.tag());

    // schema facets that feed compilation: the primary key drives the
    // ordering tie-break, the option bag drives key layout
    write_tag(&mut hasher, 0x01);
    write_str(&mut hasher, schema.primary_key());
    for (key, value) in schema.options().iter() {
        write_str(&mut hasher, key);
        hash_value(&mut hasher, value);
    }

    write_tag(&mut hasher, 0x02);
    match query.predicate() {
        Some(predicate) => hash_predicate(&mut hasher, predicate),
        None => write_tag(&mut hasher, 0x00),
    }

    write_tag(&mut hasher, 0x03);
    write_u32(&mut hasher, query.order().len() as u32);
    for (field, direction) in query.order() {
        write_str(&mut hasher, field);
        write_tag(
            &mut hasher,
            match direction {
                OrderDirection::Asc => 0x01,
                OrderDirection::Desc => 0x02,
            },
        );
    }

    write_tag(&mut hasher, 0x04);
    match query.limit_value() {
        Some(limit) => {
            write_tag(&mut hasher, 0x01);
            write_u64(&mut hasher, limit);
        }
        None => write_tag(&mut hasher, 0x00),
    }
    write_u64(&mut hasher, query.offset_value());

    write_tag(&mut hasher, 0x05);
    write_u32(&mut hasher, query.group().len() as u32);
    for field in query.group() {
        write_str(&mut hasher, field);
    }

    write_tag(&mut hasher, 0x06);
    match query.projection() {
        Some(projection) => {
            write_u32(&mut hasher, projection.len() as u32);
            for field in projection {
                write_str(&mut hasher, field);
            }
        }
        None => write_tag(&mut hasher, 0x00),
    }

    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    OpFingerprint(out)
}

fn hash_predicate(hasher: &mut Sha256, predicate: &Predicate) {
    match predicate {
        Predicate::And(children) => {
            write_tag(hasher, 0x10);
            write_u32(hasher, children.len() as u32);
            for child in children {
                hash_predicate(hasher, child);
            }
        }
        Predicate::Or(children) => {
            write_tag(hasher, 0x11);
            write_u32(hasher, children.len() as u32);
            for child in children {
                hash_predicate(hasher, child);
            }
        }
        Predicate::Not(inner) => {
            write_tag(hasher, 0x12);
            hash_predicate(hasher, inner);
        }
        Predicate::Compare(ComparePredicate { field, op, value }) => {
            write_tag(hasher, 0x13);
            write_str(hasher, field);
            write_tag(hasher, op.tag());
            hash_value(hasher, value);
        }
        Predicate::IsNull { field } => {
            write_tag(hasher, 0x14);
            write_str(hasher, field);
        }
    }
}

fn hash_value(hasher: &mut Sha256, value: &Value) {
    match value {
        Value::Null => write_tag(hasher, 0x20),
        Value::Bool(v) => {
            write_tag(hasher, 0x21);
            write_tag(hasher, u8::from(*v));
        }
        Value::Int(v) => {
            write_tag(hasher, 0x22);
            hasher.update(v.to_be_bytes());
        }
        Value::Float(v) => {
            write_tag(hasher, 0x23);
            hasher.update(v.to_be_bytes());
        }
        Value::Text(v) => {
            write_tag(hasher, 0x24);
            write_str(hasher, v);
        }
        Value::DateTime(v) => {
            write_tag(hasher, 0x25);
            hasher.update(v.unix_timestamp_nanos().to_be_bytes());
        }
        Value::Uuid(v) => {
            write_tag(hasher, 0x26);
            hasher.update(v.as_bytes());
        }
        Value::Ulid(v) => {
            write_tag(hasher, 0x27);
            hasher.update(v.0.to_be_bytes());
        }
        Value::List(items) => {
            write_tag(hasher, 0x28);
            write_u32(hasher, items.len() as u32);
            for item in items {
                hash_value(hasher, item);
            }
        }
        Value::Object(entries) => {
            write_tag(hasher, 0x29);
            write_u32(hasher, entries.len() as u32);
            for (key, item) in entries {
                write_str(hasher, key);
                hash_value(hasher, item);
            }
        }
    }
}

fn write_str(hasher: &mut Sha256, value: &str) {
    write_u32(hasher, value.len() as u32);
    hasher.update(value.as_bytes());
}

#[allow(clippy::cast_possible_truncation)]
fn write_u32(hasher: &mut Sha256, value: u32) {
    hasher.update(value.to_be_bytes());
}

fn write_u64(hasher: &mut Sha256, value: u64) {
    hasher.update(value.to_be_bytes());
}

fn write_tag(hasher: &mut Sha256, tag: u8) {
    hasher.update([tag]);
}
