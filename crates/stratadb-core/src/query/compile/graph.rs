//! Graph/document store dialect (SurrealQL family).

use crate::{
    query::{
        compile::{NativeOp, OpShape, effective_order},
        predicate::{CompareOp, ComparePredicate, Predicate},
        queryset::QuerySet,
    },
    schema::Schema,
    value::Value,
};
use time::format_description::well_known::Rfc3339;

pub(crate) fn compile(schema: &Schema, query: &QuerySet, shape: OpShape) -> NativeOp {
    let statement = match shape {
        OpShape::Select => render_select(schema, query),
        OpShape::Count => render_count(schema, query),
    };

    NativeOp::Statement(statement)
}

fn render_select(schema: &Schema, query: &QuerySet) -> String {
    let projection = match query.projection() {
        Some(fields) => fields.join(", "),
        None => "*".to_string(),
    };

    let mut out = format!("SELECT {projection} FROM {}", schema.collection());

    if let Some(predicate) = query.predicate() {
        out.push_str(" WHERE ");
        out.push_str(&render_predicate(predicate));
    }

    if !query.group().is_empty() {
        out.push_str(" GROUP BY ");
        out.push_str(&query.group().join(", "));
    }

    let order = effective_order(schema, query);
    let rendered: Vec<String> = order
        .iter()
        .map(|(field, direction)| format!("{field} {}", direction.keyword()))
        .collect();
    out.push_str(" ORDER BY ");
    out.push_str(&rendered.join(", "));

    if let Some(limit) = query.limit_value() {
        out.push_str(&format!(" LIMIT {limit}"));
    }
    if query.offset_value() > 0 {
        out.push_str(&format!(" START {}", query.offset_value()));
    }

    out
}

fn render_count(schema: &Schema, query: &QuerySet) -> String {
    let mut out = format!("SELECT count() FROM {}", schema.collection());

    if let Some(predicate) = query.predicate() {
        out.push_str(" WHERE ");
        out.push_str(&render_predicate(predicate));
    }
    out.push_str(" GROUP ALL");

    out
}

fn render_predicate(predicate: &Predicate) -> String {
    match predicate {
        Predicate::And(children) => {
            let parts: Vec<String> = children.iter().map(|c| render_predicate(c)).collect();
            format!("({})", parts.join(" AND "))
        }
        Predicate::Or(children) => {
            let parts: Vec<String> = children.iter().map(|c| render_predicate(c)).collect();
            format!("({})", parts.join(" OR "))
        }
        Predicate::Not(inner) => format!("!({})", render_predicate(inner)),
        Predicate::IsNull { field } => format!("{field} IS NONE"),
        Predicate::Compare(cmp) => render_compare(cmp),
    }
}

fn render_compare(cmp: &ComparePredicate) -> String {
    let field = &cmp.field;
    let value = format_value(&cmp.value);

    match cmp.op {
        CompareOp::Eq => format!("{field} = {value}"),
        CompareOp::Ne => format!("{field} != {value}"),
        CompareOp::Lt => format!("{field} < {value}"),
        CompareOp::Lte => format!("{field} <= {value}"),
        CompareOp::Gt => format!("{field} > {value}"),
        CompareOp::Gte => format!("{field} >= {value}"),
        CompareOp::In => format!("{field} INSIDE {value}"),
        CompareOp::NotIn => format!("{field} NOT INSIDE {value}"),
        CompareOp::Contains => format!("{field} CONTAINS {value}"),
    }
}

pub(crate) fn format_value(value: &Value) -> String {
    match value {
        Value::Null => "NONE".to_string(),
        Value::Bool(v) => v.to_string(),
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
        Value::Object(entries) => {
            let parts: Vec<String> = entries
                .iter()
                .map(|(k, v)| format!("{k}: {}", format_value(v)))
                .collect();
            format!("{{ {} }}", parts.join(", "))
        }
    }
}

fn quote(text: &str) -> String {
    format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
}

pub(crate) fn datetime_text(value: time::OffsetDateTime) -> String {
    value
        .format(&Rfc3339)
        .unwrap_or_else(|_| crate::value::wire::unix_millis(value).to_string())
}
