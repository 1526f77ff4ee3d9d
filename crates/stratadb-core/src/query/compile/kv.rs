//! Key-value store dialect.
//!
//! The key-value backend expresses exactly two query shapes: direct key
//! access (primary-key `eq` and `in` predicates) and a full keyspace scan
//! (no predicate). Everything else is refused at compilation with an error
//! naming the combination; there is no application-level post-filter.

use crate::{
    backend::BackendKind,
    query::{
        compile::{CompileError, KeyPlan, NativeOp, OpShape},
        predicate::{CompareOp, Predicate},
        queryset::QuerySet,
    },
    schema::Schema,
    value::Value,
};

pub(crate) fn compile(
    schema: &Schema,
    query: &QuerySet,
    _shape: OpShape,
) -> Result<NativeOp, CompileError> {
    // count runs the same plan; the executor counts acknowledged rows
    let plan = match query.predicate() {
        None => KeyPlan::Scan {
            pattern: format!(
                "{}:{}:*",
                schema.options().key_prefix(),
                schema.collection()
            ),
            limit: query.limit_value(),
        },
        Some(predicate) => key_plan(schema, predicate)?,
    };

    Ok(NativeOp::KeyPlan(plan))
}

fn key_plan(schema: &Schema, predicate: &Predicate) -> Result<KeyPlan, CompileError> {
    let Predicate::Compare(cmp) = predicate else {
        return Err(CompileError::UnsupportedPredicate {
            backend: BackendKind::KeyValue,
            construct: "boolean combination",
        });
    };

    if cmp.field != schema.primary_key() {
        return Err(CompileError::NonKeyPredicate {
            backend: BackendKind::KeyValue,
            field: cmp.field.clone(),
            primary_key: schema.primary_key().to_string(),
        });
    }

    let keys = match (cmp.op, &cmp.value) {
        (CompareOp::Eq, value) => vec![storage_key(schema, &cmp.field, cmp.op, value)?],
        (CompareOp::In, Value::List(items)) => items
            .iter()
            .map(|item| storage_key(schema, &cmp.field, cmp.op, item))
            .collect::<Result<Vec<_>, _>>()?,
        // unreachable past shared validation; fail closed
        (op, _) => {
            return Err(CompileError::UnsupportedOperator {
                backend: BackendKind::KeyValue,
                op,
                field: cmp.field.clone(),
                kind: schema.pk_field().kind().to_string(),
            });
        }
    };

    Ok(KeyPlan::Get { keys })
}

/// Full storage key for one primary-key operand.
pub(crate) fn storage_key(
    schema: &Schema,
    field: &str,
    op: CompareOp,
    value: &Value,
) -> Result<String, CompileError> {
    let key = key_text(value).ok_or_else(|| CompileError::OperandMismatch {
        field: field.to_string(),
        op,
        expected: schema.pk_field().kind().to_string(),
        found: value.kind(),
    })?;

    Ok(format!(
        "{}:{}:{key}",
        schema.options().key_prefix(),
        schema.collection()
    ))
}

fn key_text(value: &Value) -> Option<String> {
    match value {
        Value::Text(s) => Some(s.clone()),
        Value::Int(n) => Some(n.to_string()),
        Value::Uuid(u) => Some(u.to_string()),
        Value::Ulid(u) => Some(u.to_string()),
        _ => None,
    }
}

/// Directives the key-value backend cannot express. Refused deterministically
/// at compile time, before any command is issued.
pub(crate) fn validate_directives(
    _schema: &Schema,
    query: &QuerySet,
) -> Result<(), CompileError> {
    if !query.order().is_empty() {
        return Err(CompileError::UnsupportedDirective {
            backend: BackendKind::KeyValue,
            directive: "order_by",
        });
    }
    if !query.group().is_empty() {
        return Err(CompileError::UnsupportedDirective {
            backend: BackendKind::KeyValue,
            directive: "group_by",
        });
    }
    if query.offset_value() > 0 {
        return Err(CompileError::UnsupportedDirective {
            backend: BackendKind::KeyValue,
            directive: "offset",
        });
    }
    if query.projection().is_some() {
        return Err(CompileError::UnsupportedDirective {
            backend: BackendKind::KeyValue,
            directive: "projection",
        });
    }

    Ok(())
}
