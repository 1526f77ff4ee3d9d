//! Columnar analytical store dialect (ClickHouse-family SQL).

use crate::{
    field::FieldKind,
    query::{
        compile::{NativeOp, OpShape, effective_order},
        predicate::{CompareOp, ComparePredicate, Predicate},
        queryset::QuerySet,
    },
    schema::Schema,
    value::Value,
};
use time::{format_description::BorrowedFormatItem, macros::format_description};

/// Millisecond-precision literal format, matching the canonical datetime
/// precision.
const DATETIME_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3]");

pub(crate) fn compile(schema: &Schema, query: &QuerySet, shape: OpShape) -> NativeOp {
    let statement = match shape {
        OpShape::Select => render_select(schema, query),
        OpShape::Count => render_count(schema, query),
    };

    NativeOp::Statement(statement)
}

fn render_select(schema: &Schema, query: &QuerySet) -> String {
    let projection = match query.projection() {
        Some(fields) => {
            let cols: Vec<String> = fields.iter().map(|f| ident(f)).collect();
            cols.join(", ")
        }
        None => "*".to_string(),
    };

    let mut out = format!("SELECT {projection} FROM {}", schema.collection());

    if let Some(predicate) = query.predicate() {
        out.push_str(" WHERE ");
        out.push_str(&render_predicate(schema, predicate));
    }

    if !query.group().is_empty() {
        let cols: Vec<String> = query.group().iter().map(|f| ident(f)).collect();
        out.push_str(" GROUP BY ");
        out.push_str(&cols.join(", "));
    }

    let order = effective_order(schema, query);
    let rendered: Vec<String> = order
        .iter()
        .map(|(field, direction)| format!("{} {}", ident(field), direction.keyword()))
        .collect();
    out.push_str(" ORDER BY ");
    out.push_str(&rendered.join(", "));

    if let Some(limit) = query.limit_value() {
        out.push_str(&format!(" LIMIT {limit}"));
    }
    if query.offset_value() > 0 {
        out.push_str(&format!(" OFFSET {}", query.offset_value()));
    }

    out
}

fn render_count(schema: &Schema, query: &QuerySet) -> String {
    let mut out = format!("SELECT count(*) FROM {}", schema.collection());

    if let Some(predicate) = query.predicate() {
        out.push_str(" WHERE ");
        out.push_str(&render_predicate(schema, predicate));
    }

    out
}

fn render_predicate(schema: &Schema, predicate: &Predicate) -> String {
    match predicate {
        Predicate::And(children) => {
            let parts: Vec<String> = children
                .iter()
                .map(|c| render_predicate(schema, c))
                .collect();
            format!("({})", parts.join(" AND "))
        }
        Predicate::Or(children) => {
            let parts: Vec<String> = children
                .iter()
                .map(|c| render_predicate(schema, c))
                .collect();
            format!("({})", parts.join(" OR "))
        }
        Predicate::Not(inner) => format!("NOT ({})", render_predicate(schema, inner)),
        Predicate::IsNull { field } => format!("{} IS NULL", ident(field)),
        Predicate::Compare(cmp) => render_compare(schema, cmp),
    }
}

fn render_compare(schema: &Schema, cmp: &ComparePredicate) -> String {
    let field = ident(&cmp.field);
    let value = format_value(&cmp.value);

    match cmp.op {
        CompareOp::Eq => format!("{field} = {value}"),
        CompareOp::Ne => format!("{field} != {value}"),
        CompareOp::Lt => format!("{field} < {value}"),
        CompareOp::Lte => format!("{field} <= {value}"),
        CompareOp::Gt => format!("{field} > {value}"),
        CompareOp::Gte => format!("{field} >= {value}"),
        CompareOp::In => format!("{field} IN {}", in_list(&cmp.value)),
        CompareOp::NotIn => format!("{field} NOT IN {}", in_list(&cmp.value)),
        // element containment on array columns, LIKE with escaped wildcards
        // on text columns; validation pinned the field kind already
        CompareOp::Contains => match schema.field(&cmp.field).map(crate::field::FieldDef::kind) {
            Some(FieldKind::List(_)) => format!("has({field}, {value})"),
            _ => {
                let needle = match &cmp.value {
                    Value::Text(text) => text.clone(),
                    other => format_value(other),
                };
                let escaped = needle.replace('%', "\\%").replace('_', "\\_");
                format!("{field} LIKE {}", quote(&format!("%{escaped}%")))
            }
        },
    }
}

fn in_list(value: &Value) -> String {
    match value {
        Value::List(items) => {
            let parts: Vec<String> = items.iter().map(format_value).collect();
            format!("({})", parts.join(", "))
        }
        other => format!("({})", format_value(other)),
    }
}

pub(crate) fn ident(field: &str) -> String {
    format!("`{field}`")
}

pub(crate) fn format_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(v) => if *v { "1" } else { "0" }.to_string(),
        Value::Int(v) => v.to_string(),
        Value::Float(v) => v.to_string(),
        Value::Text(v) => quote(v),
        Value::DateTime(v) => quote(&datetime_text(*v)),
        Value::Uuid(v) => quote(&v.to_string()),
        Value::Ulid(v) => quote(&v.to_string()),
        Value::List(items) => {
            let parts: Vec<String> = items.iter().map(format_value).collect();
            format!("[{}]", parts.join(", "))
        }
        // objects are stored as JSON text columns
        Value::Object(_) => quote(
            &serde_json::to_string(&value.to_wire(crate::backend::BackendKind::Columnar))
                .unwrap_or_default(),
        ),
    }
}

fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\\', "\\\\").replace('\'', "\\'"))
}

pub(crate) fn datetime_text(value: time::OffsetDateTime) -> String {
    value
        .format(&DATETIME_FORMAT)
        .unwrap_or_else(|_| crate::value::wire::unix_millis(value).to_string())
}
