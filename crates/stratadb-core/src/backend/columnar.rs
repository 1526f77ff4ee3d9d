//! Columnar analytical store backend (ClickHouse-family dialect).

use crate::{
    backend::{Backend, BackendError, BackendKind, Capability},
    driver::{Driver, DriverResponse, RowStream},
    field::{FieldDef, FieldKind, StorageClass},
    query::compile::{CompiledOp, NativeOp},
    record::RecordId,
    schema::{ColumnarIndexShape, Schema},
    value::{WireRow, WireValue},
};
use async_trait::async_trait;
use futures_util::StreamExt;
use std::sync::Arc;
use uuid::Uuid;

///
/// ColumnarBackend
///
/// Mutations ride the store's asynchronous mutation machinery
/// (`ALTER TABLE ... UPDATE/DELETE`); inserts are append-only batches.
///

pub struct ColumnarBackend {
    driver: Arc<dyn Driver>,
}

impl ColumnarBackend {
    #[must_use]
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        Self { driver }
    }

    async fn run(&self, schema: &Schema, statement: String) -> Result<DriverResponse, BackendError> {
        tracing::trace!(collection = schema.collection(), %statement, "columnar request");

        self.driver
            .request(NativeOp::Statement(statement))
            .await
            .map_err(|source| {
                BackendError::driver(BackendKind::Columnar, schema.collection(), source)
            })
    }

    fn render_insert(schema: &Schema, rows: &[(String, WireRow)]) -> String {
        let columns: Vec<&str> = insert_columns(schema);
        let column_list: Vec<String> = columns
            .iter()
            .map(|c| super::columnar_ident(c))
            .collect();

        let mut tuples = Vec::with_capacity(rows.len());
        for (key, row) in rows {
            let values: Vec<String> = columns
                .iter()
                .map(|column| {
                    if *column == schema.primary_key() && !row.contains_key(*column) {
                        sql_literal(&WireValue::String(key.clone()))
                    } else {
                        row.get(*column).map_or_else(
                            || "NULL".to_string(),
                            sql_literal,
                        )
                    }
                })
                .collect();
            tuples.push(format!("({})", values.join(", ")));
        }

        format!(
            "INSERT INTO {} ({}) VALUES {}",
            schema.collection(),
            column_list.join(", "),
            tuples.join(", ")
        )
    }
}

#[async_trait]
impl Backend for ColumnarBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Columnar
    }

    fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::Ttl | Capability::MaterializedViews | Capability::ArrayContainment => true,
            Capability::Transactions | Capability::GraphRelations | Capability::PartialUpdate => {
                false
            }
        }
    }

    async fn create_collection(&self, schema: &Schema) -> Result<(), BackendError> {
        self.run(schema, render_create_table(schema)).await?;

        for index in schema.indexes() {
            self.run(schema, render_add_index(schema, index)).await?;
        }

        Ok(())
    }

    async fn drop_collection(&self, schema: &Schema) -> Result<(), BackendError> {
        self.run(schema, format!("DROP TABLE IF EXISTS {}", schema.collection()))
            .await?;

        Ok(())
    }

    async fn insert(&self, schema: &Schema, row: WireRow) -> Result<RecordId, BackendError> {
        let key = row_key(schema, &row);
        let statement = Self::render_insert(schema, &[(key.clone(), row)]);
        self.run(schema, statement).await?;

        Ok(RecordId::new(schema.collection(), key))
    }

    async fn insert_many(
        &self,
        schema: &Schema,
        rows: Vec<WireRow>,
    ) -> Result<Vec<RecordId>, BackendError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let keyed: Vec<(String, WireRow)> = rows
            .into_iter()
            .map(|row| (row_key(schema, &row), row))
            .collect();
        let statement = Self::render_insert(schema, &keyed);
        self.run(schema, statement).await?;

        Ok(keyed
            .into_iter()
            .map(|(key, _)| RecordId::new(schema.collection(), key))
            .collect())
    }

    async fn select(&self, schema: &Schema, op: &CompiledOp) -> Result<RowStream, BackendError> {
        let response = self
            .driver
            .request(op.op.clone())
            .await
            .map_err(|source| {
                BackendError::driver(BackendKind::Columnar, schema.collection(), source)
            })?;

        Ok(response.rows)
    }

    async fn count(&self, schema: &Schema, op: &CompiledOp) -> Result<u64, BackendError> {
        let response = self
            .driver
            .request(op.op.clone())
            .await
            .map_err(|source| {
                BackendError::driver(BackendKind::Columnar, schema.collection(), source)
            })?;

        let mut rows = response.rows;
        let Some(row) = rows.next().await else {
            return Ok(0);
        };
        let row = row.map_err(|source| {
            BackendError::driver(BackendKind::Columnar, schema.collection(), source)
        })?;

        // single scalar row; accept numeric or stringified counts
        let count = row
            .values()
            .next()
            .and_then(|value| match value {
                WireValue::Number(n) => n.as_u64(),
                WireValue::String(s) => s.parse().ok(),
                _ => None,
            })
            .unwrap_or_default();

        Ok(count)
    }

    async fn update(
        &self,
        schema: &Schema,
        id: &RecordId,
        changed: WireRow,
    ) -> Result<(), BackendError> {
        let assignments: Vec<String> = changed
            .iter()
            .map(|(column, value)| {
                format!("{} = {}", super::columnar_ident(column), sql_literal(value))
            })
            .collect();
        let statement = format!(
            "ALTER TABLE {} UPDATE {} WHERE {} = {}",
            schema.collection(),
            assignments.join(", "),
            super::columnar_ident(schema.primary_key()),
            key_literal(id.key())
        );
        self.run(schema, statement).await?;

        Ok(())
    }

    async fn delete(&self, schema: &Schema, id: &RecordId) -> Result<(), BackendError> {
        let statement = format!(
            "ALTER TABLE {} DELETE WHERE {} = {}",
            schema.collection(),
            super::columnar_ident(schema.primary_key()),
            key_literal(id.key())
        );
        self.run(schema, statement).await?;

        Ok(())
    }
}

fn render_create_table(schema: &Schema) -> String {
    let options = schema.options();
    let mut columns = Vec::new();

    for (name, def) in schema.fields() {
        let column = super::columnar_ident(name);
        let ty = columnar_type(def);

        if let Some(expr) = def.materialized_expr() {
            columns.push(format!("    {column} {ty} MATERIALIZED ({expr})"));
        } else if def.is_required() || name == schema.primary_key() {
            columns.push(format!("    {column} {ty}"));
        } else {
            columns.push(format!("    {column} Nullable({ty})"));
        }
    }

    let mut out = format!(
        "CREATE TABLE IF NOT EXISTS {} (\n{}\n)",
        schema.collection(),
        columns.join(",\n")
    );

    let engine = options.engine().unwrap_or("MergeTree");
    let params: Vec<String> = options
        .engine_params()
        .iter()
        .map(|p| super::columnar_ident(p))
        .collect();
    out.push_str(&format!(" ENGINE = {engine}({})", params.join(", ")));

    if let Some(partition) = options.partition_by() {
        out.push_str(&format!("\nPARTITION BY {partition}"));
    }

    let order_by: Vec<String> = options
        .order_by()
        .iter()
        .map(|f| super::columnar_ident(f))
        .collect();
    out.push_str(&format!("\nORDER BY ({})", order_by.join(", ")));

    if let Some(ttl) = options.ttl() {
        out.push_str(&format!("\nTTL {ttl}"));
    }

    let settings = options.settings();
    if !settings.is_empty() {
        let rendered: Vec<String> = settings
            .iter()
            .map(|(key, value)| format!("{key}={}", sql_setting(value)))
            .collect();
        out.push_str(&format!("\nSETTINGS {}", rendered.join(", ")));
    }

    out
}

fn render_add_index(schema: &Schema, index: &crate::schema::IndexSpec) -> String {
    let (ty, granularity) = index.columnar.as_ref().map_or_else(
        || ("bloom_filter(0.01)".to_string(), 3),
        |columnar| {
            let ty = match &columnar.shape {
                ColumnarIndexShape::BloomFilter {
                    false_positive_rate,
                } => format!("bloom_filter({false_positive_rate})"),
                ColumnarIndexShape::Set { max_values } => format!("set({max_values})"),
                ColumnarIndexShape::MinMax => "minmax".to_string(),
            };
            (ty, columnar.granularity)
        },
    );

    format!(
        "ALTER TABLE {} ADD INDEX {} {} TYPE {ty} GRANULARITY {granularity}",
        schema.collection(),
        index.name,
        index.fields.join(", ")
    )
}

/// Insertable columns, in declaration order. Materialized columns are
/// computed by the store and excluded.
fn insert_columns(schema: &Schema) -> Vec<&str> {
    schema
        .fields()
        .filter(|(_, def)| def.materialized_expr().is_none())
        .map(|(name, _)| name)
        .collect()
}

/// The row's primary key, or a fresh uuid when identity was left to the
/// layer (the columnar store assigns nothing itself).
fn row_key(schema: &Schema, row: &WireRow) -> String {
    match row.get(schema.primary_key()) {
        Some(WireValue::String(key)) => key.clone(),
        Some(WireValue::Number(n)) => n.to_string(),
        _ => Uuid::new_v4().to_string(),
    }
}

fn columnar_type(def: &FieldDef) -> String {
    let base = match def.kind() {
        FieldKind::Bool => "UInt8".to_string(),
        FieldKind::Int => "Int64".to_string(),
        FieldKind::Float => "Float64".to_string(),
        FieldKind::Text => match def.constraints().max_length {
            Some(len) if def.constraints().min_length == Some(len) => {
                format!("FixedString({len})")
            }
            _ => "String".to_string(),
        },
        FieldKind::DateTime => "DateTime64(3)".to_string(),
        FieldKind::Uuid => "UUID".to_string(),
        FieldKind::Ulid => "String".to_string(),
        FieldKind::List(elem) => format!(
            "Array({})",
            columnar_type(&FieldDef::new((**elem).clone()))
        ),
        FieldKind::Object => "String".to_string(),
    };

    match def.storage() {
        StorageClass::LowCardinality => format!("LowCardinality({base})"),
        StorageClass::Plain => base,
    }
}

fn sql_literal(value: &WireValue) -> String {
    match value {
        WireValue::Null => "NULL".to_string(),
        WireValue::Bool(v) => if *v { "1" } else { "0" }.to_string(),
        WireValue::Number(n) => n.to_string(),
        WireValue::String(s) => quote(s),
        WireValue::Array(items) => {
            let parts: Vec<String> = items.iter().map(sql_literal).collect();
            format!("[{}]", parts.join(", "))
        }
        WireValue::Object(_) => quote(&value.to_string()),
    }
}

fn sql_setting(value: &crate::value::Value) -> String {
    match value {
        crate::value::Value::Text(s) => quote(s),
        other => crate::query::compile::columnar_literal(other),
    }
}

fn key_literal(key: &str) -> String {
    key.parse::<i64>()
        .map_or_else(|_| quote(key), |n| n.to_string())
}

fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\\', "\\\\").replace('\'', "\\'"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        schema::IndexSpec,
        testing::RecordingDriver,
        value::WireRow,
    };

    fn listing_schema() -> Schema {
        Schema::builder("Listing", BackendKind::Columnar)
            .collection("listings")
            .field("collected_at", FieldDef::datetime().required())
            .field("brand", FieldDef::text().required().low_cardinality())
            .field("price", FieldDef::float())
            .field(
                "day",
                FieldDef::datetime().materialized("toDate(collected_at)"),
            )
            .option("engine", "MergeTree")
            .option("partition_by", "toYYYYMM(collected_at)")
            .option("ttl", "collected_at + INTERVAL 90 DAY")
            .compile()
            .unwrap()
    }

    #[test]
    fn create_table_renders_types_engine_and_ordering() {
        let ddl = render_create_table(&listing_schema());

        assert!(ddl.contains("`collected_at` DateTime64(3)"));
        assert!(ddl.contains("`brand` LowCardinality(String)"));
        assert!(ddl.contains("`price` Nullable(Float64)"));
        assert!(ddl.contains("`day` DateTime64(3) MATERIALIZED (toDate(collected_at))"));
        assert!(ddl.contains("ENGINE = MergeTree()"));
        assert!(ddl.contains("PARTITION BY toYYYYMM(collected_at)"));
        assert!(ddl.contains("ORDER BY (`collected_at`, `brand`)"));
        assert!(ddl.contains("TTL collected_at + INTERVAL 90 DAY"));
    }

    #[test]
    fn skip_indexes_render_their_shape_and_granularity() {
        let schema = listing_schema();
        let index = IndexSpec::new("by_brand", ["brand"]).set(100).granularity(4);

        assert_eq!(
            render_add_index(&schema, &index),
            "ALTER TABLE listings ADD INDEX by_brand brand TYPE set(100) GRANULARITY 4"
        );
    }

    #[test]
    fn materialized_columns_are_never_inserted() {
        let schema = listing_schema();
        assert!(!insert_columns(&schema).contains(&"day"));
    }

    #[tokio::test]
    async fn updates_ride_the_mutation_machinery() {
        let driver = RecordingDriver::new();
        let backend = ColumnarBackend::new(driver.clone());
        let schema = listing_schema();

        let mut changed = WireRow::new();
        changed.insert("price".to_string(), WireValue::from(3.5));
        backend
            .update(&schema, &RecordId::new("listings", "k1"), changed)
            .await
            .unwrap();

        let ops = driver.recorded();
        let NativeOp::Statement(sql) = &ops[0] else {
            panic!("expected statement");
        };
        assert_eq!(
            sql,
            "ALTER TABLE listings UPDATE `price` = 3.5 WHERE `id` = 'k1'"
        );
    }
}
