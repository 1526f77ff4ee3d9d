
use crate::{
    backend::{Backend as _, BackendError, BackendKind},
    connection::Connection,
    document::Document,
    error::Error,
    query::{compile::CompiledOp, predicate::Predicate, queryset::QuerySet},
    record::RecordId,
    schema::Schema,
    value::{Value, WireRow, WireValue},
};
use futures_util::{StreamExt, stream::BoxStream};
use std::{collections::BTreeMap, sync::Arc};
use thiserror::Error as ThisError;

///
/// Execution and materialization
///
/// Submits compiled operations through the backend capability interface and
/// converts raw rows back into documents. The returned stream is lazy and
/// single-pass; a malformed row aborts it with the offending field name and
/// row position, so consumers never observe a silently truncated result
/// set.
///

pub type DocumentStream = BoxStream<'static, Result<Document, Error>>;

/// Execute a compiled select and lazily materialize each row.
pub async fn execute(
    conn: &Connection,
    schema: Arc<Schema>,
    op: &CompiledOp,
) -> Result<DocumentStream, Error> {
    let rows = conn.backend().select(&schema, op).await?;
    let backend = schema.backend();

    let stream = rows
        .enumerate()
        .map(move |(index, item)| match item {
            Ok(row) => materialize(&schema, row, index).map_err(Error::from),
            Err(source) => Err(Error::Backend(BackendError::Driver {
                backend,
                collection: schema.collection().to_string(),
                source,
            })),
        })
        .scan(false, |aborted, item| {
            if *aborted {
                return std::future::ready(None);
            }
            *aborted = item.is_err();
            std::future::ready(Some(item))
        });

    Ok(Box::pin(stream))
}

/// Execute the count form and return the scalar.
pub async fn count(conn: &Connection, schema: &Schema, op: &CompiledOp) -> Result<u64, Error> {
    let n = conn.backend().count(schema, op).await?;
    Ok(n)
}

/// Fetch one document by identity, through the normal compile path so the
/// key-value backend resolves it as a key plan.
pub async fn fetch(
    conn: &Connection,
    schema: &Arc<Schema>,
    id: &RecordId,
) -> Result<Option<Document>, Error> {
    conn.check_kind(schema)?;

    let pk = schema.primary_key();
    let key_value = pk_operand(schema, id.key());
    let query = QuerySet::new(schema.clone()).filter(Predicate::compare(
        pk,
        crate::query::predicate::CompareOp::Eq,
        key_value,
    ));

    let mut stream = execute(conn, schema.clone(), &*query.compile()?).await?;
    match stream.next().await {
        Some(document) => document.map(Some),
        None => Ok(None),
    }
}

/// Bulk insert. Every document must be unpersisted and share the same
/// schema as the first; identities are assigned in order, only after the
/// backend acknowledges the batch.
pub async fn insert_many(conn: &Connection, docs: &mut [Document]) -> Result<(), Error> {
    let Some(first) = docs.first() else {
        return Ok(());
    };
    let schema = first.schema().clone();
    conn.check_kind(&schema)?;

    let mut validated_all = Vec::with_capacity(docs.len());
    let mut rows = Vec::with_capacity(docs.len());
    for doc in docs.iter() {
        let validated = doc.validate()?;
        rows.push(doc.serialize_row(&validated));
        validated_all.push(validated);
    }

    let ids = conn.backend().insert_many(&schema, rows).await?;

    for ((doc, validated), id) in docs.iter_mut().zip(validated_all).zip(ids) {
        *doc = Document::materialized(schema.clone(), validated, None);
        doc.apply_identity(&id);
        doc.set_id(id);
        doc.clear_dirty();
    }

    Ok(())
}

/// Convert one raw row into a document.
///
/// Unknown columns are ignored; missing non-required fields take their
/// declared default; a missing or undecodable required field aborts with
/// the field name and row position.
pub(crate) fn materialize(
    schema: &Arc<Schema>,
    row: WireRow,
    row_index: usize,
) -> Result<Document, MaterializeError> {
    let backend = schema.backend();
    let mut values = BTreeMap::new();

    for (name, def) in schema.fields() {
        let wire = row.get(name).filter(|wire| !wire.is_null());

        let value = match wire {
            Some(wire) => {
                if name == schema.primary_key() {
                    pk_from_wire(schema, wire)
                } else {
                    def.deserialize(wire, backend)
                        .map_err(|source| MaterializeError::Field {
                            collection: schema.collection().to_string(),
                            backend,
                            field: name.to_string(),
                            row_index,
                            source,
                        })?
                }
            }
            None if def.is_required() => {
                return Err(MaterializeError::MissingRequired {
                    collection: schema.collection().to_string(),
                    backend,
                    field: name.to_string(),
                    row_index,
                });
            }
            None => def
                .default()
                .map_or(Value::Null, crate::field::FieldDefault::produce),
        };

        values.insert(name.to_string(), value);
    }

    let id = identity_of(schema, &values);
    Ok(Document::materialized(schema.clone(), values, id))
}

/// The primary key column may come back qualified (`collection:key`) from
/// the graph store; strip the qualifier before decoding.
fn pk_from_wire(schema: &Schema, wire: &WireValue) -> Value {
    let kind = schema.pk_field().kind();

    if let WireValue::String(text) = wire {
        let key = text
            .strip_prefix(&format!("{}:", schema.collection()))
            .unwrap_or(text);
        return crate::document::pk_value_from_key(kind, key);
    }

    if let Some(n) = wire.as_i64() {
        return Value::Int(n);
    }

    Value::Null
}

fn identity_of(schema: &Schema, values: &BTreeMap<String, Value>) -> Option<RecordId> {
    let key = values.get(schema.primary_key())?;
    let key = match key {
        Value::Text(s) => s.clone(),
        Value::Int(n) => n.to_string(),
        Value::Uuid(u) => u.to_string(),
        Value::Ulid(u) => u.to_string(),
        _ => return None,
    };

    Some(RecordId::new(schema.collection(), key))
}

/// Primary-key operand for fetch-by-identity queries, in the key's
/// declared kind.
fn pk_operand(schema: &Schema, key: &str) -> Value {
    crate::document::pk_value_from_key(schema.pk_field().kind(), key)
}

///
/// MaterializeError
///
/// A returned row could not be converted back into a document. Aborts the
/// in-flight execution; partial result sets are never silently returned.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum MaterializeError {
    #[error("row {row_index} in '{collection}' ({backend}): field '{field}': {source}")]
    Field {
        collection: String,
        backend: BackendKind,
        field: String,
        row_index: usize,
        #[source]
        source: crate::value::WireDecodeError,
    },

    #[error("row {row_index} in '{collection}' ({backend}): required field '{field}' is missing")]
    MissingRequired {
        collection: String,
        backend: BackendKind,
        field: String,
        row_index: usize,
    },
}
