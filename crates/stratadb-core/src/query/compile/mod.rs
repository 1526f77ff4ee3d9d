mod cache;
mod columnar;
mod fingerprint;
mod graph;
mod kv;

#[cfg(test)]
mod tests;

use crate::{
    backend::BackendKind,
    field::FieldKind,
    query::{
        predicate::{CompareOp, ComparePredicate, Predicate},
        queryset::{OrderDirection, QuerySet},
    },
    schema::Schema,
    value::{Value, ValueKind},
};
use std::sync::Arc;
use thiserror::Error as ThisError;

pub use cache::{CacheStats, cache_stats, clear_cache};
pub use fingerprint::OpFingerprint;

// literal/identifier renderers shared with the columnar backend's DDL
pub(crate) use columnar::{format_value as columnar_literal, ident as columnar_ident};

///
/// Query compilation
///
/// Walks the backend-agnostic expression tree and renders a backend-native
/// operation. Pure in (schema, tree): identical inputs always produce the
/// identical native operation, which makes compiled operations cacheable by
/// a structural fingerprint.
///
/// Unsupported operator/field combinations are rejected here with an error
/// naming the combination. Compilation never degrades to an application
/// level post-filter.
///

///
/// NativeOp
///
/// One backend-native operation: a query/DDL statement, a command
/// sequence, or a direct key-access plan.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum NativeOp {
    Statement(String),
    Commands(Vec<Command>),
    KeyPlan(KeyPlan),
}

///
/// Command
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Command {
    pub name: String,
    pub args: Vec<String>,
}

impl Command {
    pub fn new<I, S>(name: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

///
/// KeyPlan
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum KeyPlan {
    /// Point or multi-point lookup, in operand order.
    Get { keys: Vec<String> },
    /// Full keyspace scan under the collection's key pattern.
    Scan { pattern: String, limit: Option<u64> },
}

///
/// OpShape
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OpShape {
    Select,
    Count,
}

impl OpShape {
    const fn tag(self) -> u8 {
        match self {
            Self::Select => 0x01,
            Self::Count => 0x02,
        }
    }
}

///
/// CompiledOp
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CompiledOp {
    pub backend: BackendKind,
    pub collection: String,
    pub shape: OpShape,
    pub op: NativeOp,
    pub fingerprint: OpFingerprint,
}

/// Whether a backend can express an operator at all. Declared here, ahead
/// of compilation; the key-value backend additionally requires the operand
/// field to be the primary key (checked by its compiler).
#[must_use]
pub const fn supports_operator(backend: BackendKind, op: CompareOp) -> bool {
    match backend {
        BackendKind::Graph | BackendKind::Columnar => true,
        BackendKind::KeyValue => matches!(op, CompareOp::Eq | CompareOp::In),
    }
}

/// Compile the select form of a queryset for its schema's backend.
pub fn compile(query: &QuerySet) -> Result<Arc<CompiledOp>, CompileError> {
    compile_shape(query, OpShape::Select)
}

/// Compile the count form of a queryset.
pub fn compile_count(query: &QuerySet) -> Result<Arc<CompiledOp>, CompileError> {
    compile_shape(query, OpShape::Count)
}

fn compile_shape(query: &QuerySet, shape: OpShape) -> Result<Arc<CompiledOp>, CompileError> {
    let schema = query.schema();

    validate(schema, query)?;

    let fingerprint = fingerprint::fingerprint(query, shape);
    if let Some(cached) = cache::get(&fingerprint) {
        cache::record_hit();
        return Ok(cached);
    }
    cache::record_miss();

    let op = match schema.backend() {
        BackendKind::Graph => graph::compile(schema, query, shape),
        BackendKind::Columnar => columnar::compile(schema, query, shape),
        BackendKind::KeyValue => kv::compile(schema, query, shape)?,
    };

    tracing::debug!(
        backend = %schema.backend(),
        collection = schema.collection(),
        fingerprint = %fingerprint,
        "compiled query"
    );

    let compiled = Arc::new(CompiledOp {
        backend: schema.backend(),
        collection: schema.collection().to_string(),
        shape,
        op,
        fingerprint,
    });
    cache::insert(fingerprint, compiled.clone());

    Ok(compiled)
}

/// Append the primary key ascending to any explicit ordering so row order
/// is deterministic for pagination. Count queries carry no ordering.
pub(crate) fn effective_order(
    schema: &Schema,
    query: &QuerySet,
) -> Vec<(String, OrderDirection)> {
    let pk = schema.primary_key();
    let mut order = query.order().to_vec();
    if !order.iter().any(|(field, _)| field == pk) {
        order.push((pk.to_string(), OrderDirection::Asc));
    }
    order
}

///
/// VALIDATION
///
/// Schema-aware checks shared by every backend compiler: fields must be
/// declared, operands must fit the field kind, and the backend must have
/// declared support for the operator.
///

fn validate(schema: &Schema, query: &QuerySet) -> Result<(), CompileError> {
    if let Some(predicate) = query.predicate() {
        validate_predicate(schema, predicate)?;
    }

    for (field, _) in query.order() {
        require_field(schema, field)?;
    }
    for field in query.group() {
        require_field(schema, field)?;
    }
    if let Some(projection) = query.projection() {
        for field in projection {
            require_field(schema, field)?;
        }
    }

    if schema.backend() == BackendKind::KeyValue {
        kv::validate_directives(schema, query)?;
    }

    Ok(())
}

fn validate_predicate(schema: &Schema, predicate: &Predicate) -> Result<(), CompileError> {
    match predicate {
        Predicate::And(children) | Predicate::Or(children) => {
            for child in children {
                validate_predicate(schema, child)?;
            }
            Ok(())
        }
        Predicate::Not(inner) => validate_predicate(schema, inner),
        Predicate::IsNull { field } => {
            require_field(schema, field)?;
            if schema.backend() == BackendKind::KeyValue {
                return Err(CompileError::UnsupportedPredicate {
                    backend: schema.backend(),
                    construct: "is_null",
                });
            }
            Ok(())
        }
        Predicate::Compare(cmp) => validate_compare(schema, cmp),
    }
}

fn validate_compare(schema: &Schema, cmp: &ComparePredicate) -> Result<(), CompileError> {
    let def = require_field(schema, &cmp.field)?;
    let kind = def.kind();

    if !supports_operator(schema.backend(), cmp.op) {
        return Err(CompileError::UnsupportedOperator {
            backend: schema.backend(),
            op: cmp.op,
            field: cmp.field.clone(),
            kind: kind.to_string(),
        });
    }

    if cmp.value.is_null() {
        return Err(CompileError::NullOperand {
            field: cmp.field.clone(),
            op: cmp.op,
        });
    }

    match cmp.op {
        CompareOp::Eq | CompareOp::Ne => check_operand(kind, &cmp.field, cmp.op, &cmp.value),

        CompareOp::Lt | CompareOp::Lte | CompareOp::Gt | CompareOp::Gte => {
            if !orderable(kind) {
                return Err(CompileError::UnsupportedOperator {
                    backend: schema.backend(),
                    op: cmp.op,
                    field: cmp.field.clone(),
                    kind: kind.to_string(),
                });
            }
            check_operand(kind, &cmp.field, cmp.op, &cmp.value)
        }

        CompareOp::In | CompareOp::NotIn => match &cmp.value {
            Value::List(items) => {
                for item in items {
                    check_operand(kind, &cmp.field, cmp.op, item)?;
                }
                Ok(())
            }
            other => Err(CompileError::OperandMismatch {
                field: cmp.field.clone(),
                op: cmp.op,
                expected: "a list of values".to_string(),
                found: other.kind(),
            }),
        },

        CompareOp::Contains => match kind {
            FieldKind::Text => check_operand(&FieldKind::Text, &cmp.field, cmp.op, &cmp.value),
            FieldKind::List(elem) => check_operand(elem, &cmp.field, cmp.op, &cmp.value),
            other => Err(CompileError::UnsupportedOperator {
                backend: schema.backend(),
                op: cmp.op,
                field: cmp.field.clone(),
                kind: other.to_string(),
            }),
        },
    }
}

fn require_field<'a>(
    schema: &'a Schema,
    field: &str,
) -> Result<&'a crate::field::FieldDef, CompileError> {
    schema.field(field).ok_or_else(|| CompileError::UnknownField {
        collection: schema.collection().to_string(),
        field: field.to_string(),
    })
}

const fn orderable(kind: &FieldKind) -> bool {
    matches!(
        kind,
        FieldKind::Int
            | FieldKind::Float
            | FieldKind::Text
            | FieldKind::DateTime
            | FieldKind::Uuid
            | FieldKind::Ulid
    )
}

fn check_operand(
    kind: &FieldKind,
    field: &str,
    op: CompareOp,
    value: &Value,
) -> Result<(), CompileError> {
    if operand_fits(kind, value) {
        Ok(())
    } else {
        Err(CompileError::OperandMismatch {
            field: field.to_string(),
            op,
            expected: kind.to_string(),
            found: value.kind(),
        })
    }
}

/// Operand compatibility: exact kind, int/float interchange, and canonical
/// text forms for identifier kinds.
fn operand_fits(kind: &FieldKind, value: &Value) -> bool {
    match (kind, value) {
        (FieldKind::Bool, Value::Bool(_))
        | (FieldKind::Int, Value::Int(_))
        | (FieldKind::Float, Value::Float(_) | Value::Int(_))
        | (FieldKind::Text, Value::Text(_))
        | (FieldKind::DateTime, Value::DateTime(_))
        | (FieldKind::Uuid, Value::Uuid(_) | Value::Text(_))
        | (FieldKind::Ulid, Value::Ulid(_) | Value::Text(_))
        | (FieldKind::Object, Value::Object(_)) => true,
        (FieldKind::List(elem), Value::List(items)) => {
            items.iter().all(|item| operand_fits(elem, item))
        }
        _ => false,
    }
}

///
/// CompileError
///
/// The expression tree uses a construct the resolved backend cannot
/// express, or references the schema incorrectly. Always surfaced before
/// any network call.
///

#[derive(Clone, Debug, PartialEq, ThisError)]
pub enum CompileError {
    #[error("collection '{collection}' has no field '{field}'")]
    UnknownField { collection: String, field: String },

    #[error("{backend} backend cannot express operator '{op}' on field '{field}' ({kind})")]
    UnsupportedOperator {
        backend: BackendKind,
        op: CompareOp,
        field: String,
        kind: String,
    },

    #[error("operator '{op}' on field '{field}' expects {expected}, got {found}")]
    OperandMismatch {
        field: String,
        op: CompareOp,
        expected: String,
        found: ValueKind,
    },

    #[error(
        "{backend} backend only supports key predicates; field '{field}' is not the primary key '{primary_key}'"
    )]
    NonKeyPredicate {
        backend: BackendKind,
        field: String,
        primary_key: String,
    },

    #[error("{backend} backend cannot express {construct} predicates")]
    UnsupportedPredicate {
        backend: BackendKind,
        construct: &'static str,
    },

    #[error("{backend} backend cannot express the '{directive}' directive")]
    UnsupportedDirective {
        backend: BackendKind,
        directive: &'static str,
    },

    #[error("operator '{op}' on field '{field}' cannot take a null operand; use is_null")]
    NullOperand { field: String, op: CompareOp },
}
