//! Graph/document store backend (SurrealQL-family dialect).

use crate::{
    backend::{Backend, BackendError, BackendKind, Capability},
    driver::{Driver, DriverResponse, RowStream},
    field::FieldKind,
    query::compile::{CompiledOp, NativeOp},
    record::RecordId,
    schema::Schema,
    value::{WireRow, WireValue},
};
use async_trait::async_trait;
use futures_util::StreamExt;
use std::sync::Arc;
use ulid::Ulid;

///
/// GraphBackend
///

pub struct GraphBackend {
    driver: Arc<dyn Driver>,
}

impl GraphBackend {
    #[must_use]
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        Self { driver }
    }

    async fn run(&self, schema: &Schema, statement: String) -> Result<DriverResponse, BackendError> {
        tracing::trace!(collection = schema.collection(), %statement, "graph request");

        self.driver
            .request(NativeOp::Statement(statement))
            .await
            .map_err(|source| BackendError::driver(BackendKind::Graph, schema.collection(), source))
    }
}

#[async_trait]
impl Backend for GraphBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Graph
    }

    fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::Transactions
            | Capability::GraphRelations
            | Capability::PartialUpdate
            | Capability::MaterializedViews
            | Capability::ArrayContainment => true,
            Capability::Ttl => false,
        }
    }

    async fn create_collection(&self, schema: &Schema) -> Result<(), BackendError> {
        let collection = schema.collection();
        let mode = if schema.options().schemafull() {
            "SCHEMAFULL"
        } else {
            "SCHEMALESS"
        };
        self.run(schema, format!("DEFINE TABLE {collection} {mode}"))
            .await?;

        if schema.options().schemafull() {
            for (name, def) in schema.fields() {
                if name == schema.primary_key() {
                    continue;
                }
                let mut statement = format!(
                    "DEFINE FIELD {name} ON {collection} TYPE {}",
                    graph_type(def.kind())
                );
                if def.is_required() {
                    statement.push_str(" ASSERT $value != NONE");
                }
                self.run(schema, statement).await?;
            }
        }

        for index in schema.indexes() {
            let mut statement = format!(
                "DEFINE INDEX {} ON {collection} COLUMNS {}",
                index.name,
                index.fields.join(", ")
            );
            if index.unique {
                statement.push_str(" UNIQUE");
            }
            self.run(schema, statement).await?;
        }

        Ok(())
    }

    async fn drop_collection(&self, schema: &Schema) -> Result<(), BackendError> {
        self.run(
            schema,
            format!("REMOVE TABLE IF EXISTS {}", schema.collection()),
        )
        .await?;

        Ok(())
    }

    async fn insert(&self, schema: &Schema, row: WireRow) -> Result<RecordId, BackendError> {
        let (key, content) = split_key(schema, row);
        let statement = format!(
            "CREATE {}:{key} CONTENT {}",
            schema.collection(),
            render_content(&content)
        );

        let response = self.run(schema, statement).await?;

        // the acknowledged identity wins over the candidate key
        let key = response
            .assigned_id
            .as_deref()
            .and_then(|id| id.rsplit_once(':').map(|(_, key)| key.to_string()))
            .or(response.assigned_id)
            .unwrap_or(key);

        Ok(RecordId::new(schema.collection(), key))
    }

    async fn insert_many(
        &self,
        schema: &Schema,
        rows: Vec<WireRow>,
    ) -> Result<Vec<RecordId>, BackendError> {
        let mut ids = Vec::with_capacity(rows.len());
        for row in rows {
            ids.push(self.insert(schema, row).await?);
        }

        Ok(ids)
    }

    async fn select(&self, schema: &Schema, op: &CompiledOp) -> Result<RowStream, BackendError> {
        let response = self
            .driver
            .request(op.op.clone())
            .await
            .map_err(|source| {
                BackendError::driver(BackendKind::Graph, schema.collection(), source)
            })?;

        Ok(response.rows)
    }

    async fn count(&self, schema: &Schema, op: &CompiledOp) -> Result<u64, BackendError> {
        let response = self
            .driver
            .request(op.op.clone())
            .await
            .map_err(|source| {
                BackendError::driver(BackendKind::Graph, schema.collection(), source)
            })?;

        // one count row per group; the total is their sum
        let mut total = 0u64;
        let mut rows = response.rows;
        while let Some(row) = rows.next().await {
            let row = row.map_err(|source| {
                BackendError::driver(BackendKind::Graph, schema.collection(), source)
            })?;
            total += row
                .get("count")
                .and_then(WireValue::as_u64)
                .unwrap_or_default();
        }

        Ok(total)
    }

    async fn update(
        &self,
        schema: &Schema,
        id: &RecordId,
        changed: WireRow,
    ) -> Result<(), BackendError> {
        let statement = format!(
            "UPDATE {}:{} MERGE {} RETURN NONE",
            schema.collection(),
            id.key(),
            render_content(&changed)
        );
        self.run(schema, statement).await?;

        Ok(())
    }

    async fn delete(&self, schema: &Schema, id: &RecordId) -> Result<(), BackendError> {
        self.run(schema, format!("DELETE {}:{}", schema.collection(), id.key()))
            .await?;

        Ok(())
    }
}

/// Pull the key out of the wire row, generating one when the declaration
/// left identity to the store.
fn split_key(schema: &Schema, mut row: WireRow) -> (String, WireRow) {
    let key = match row.remove(schema.primary_key()) {
        Some(WireValue::String(key)) => key,
        Some(WireValue::Number(n)) => n.to_string(),
        _ => Ulid::new().to_string(),
    };

    (key, row)
}

fn render_content(row: &WireRow) -> String {
    let object: serde_json::Map<String, WireValue> = row
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    serde_json::Value::Object(object).to_string()
}

fn graph_type(kind: &FieldKind) -> String {
    match kind {
        FieldKind::Bool => "bool".to_string(),
        FieldKind::Int => "int".to_string(),
        FieldKind::Float => "float".to_string(),
        FieldKind::Text | FieldKind::Ulid => "string".to_string(),
        FieldKind::DateTime => "datetime".to_string(),
        FieldKind::Uuid => "uuid".to_string(),
        FieldKind::List(_) => "array".to_string(),
        FieldKind::Object => "object".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{field::FieldDef, schema::IndexSpec, testing::RecordingDriver};

    fn user_schema() -> Schema {
        Schema::builder("User", BackendKind::Graph)
            .collection("users")
            .field("name", FieldDef::text().required())
            .field("age", FieldDef::int())
            .index(IndexSpec::new("by_name", ["name"]).unique())
            .compile()
            .unwrap()
    }

    fn statements(driver: &RecordingDriver) -> Vec<String> {
        driver
            .recorded()
            .into_iter()
            .map(|op| match op {
                NativeOp::Statement(sql) => sql,
                other => panic!("expected statement, got {other:?}"),
            })
            .collect()
    }

    #[tokio::test]
    async fn schemafull_tables_define_fields_and_indexes() {
        let driver = RecordingDriver::new();
        let backend = GraphBackend::new(driver.clone());

        backend.create_collection(&user_schema()).await.unwrap();

        let statements = statements(&driver);
        assert_eq!(statements[0], "DEFINE TABLE users SCHEMAFULL");
        assert!(
            statements
                .iter()
                .any(|s| s == "DEFINE FIELD name ON users TYPE string ASSERT $value != NONE")
        );
        assert!(statements.iter().any(|s| s == "DEFINE FIELD age ON users TYPE int"));
        assert!(
            statements
                .iter()
                .any(|s| s == "DEFINE INDEX by_name ON users COLUMNS name UNIQUE")
        );
    }

    #[tokio::test]
    async fn inserts_create_with_a_generated_key_and_merge_on_update() {
        let driver = RecordingDriver::new();
        let backend = GraphBackend::new(driver.clone());
        let schema = user_schema();

        let mut row = WireRow::new();
        row.insert("name".to_string(), WireValue::from("Ada"));
        let id = backend.insert(&schema, row).await.unwrap();
        assert_eq!(id.collection(), "users");
        assert!(!id.key().is_empty());

        let mut changed = WireRow::new();
        changed.insert("age".to_string(), WireValue::from(31));
        backend.update(&schema, &id, changed).await.unwrap();

        let statements = statements(&driver);
        assert!(statements[0].starts_with(&format!("CREATE users:{} CONTENT ", id.key())));
        assert_eq!(
            statements[1],
            format!("UPDATE users:{} MERGE {{\"age\":31}} RETURN NONE", id.key())
        );
    }

    #[tokio::test]
    async fn a_store_assigned_identity_wins_over_the_candidate() {
        use crate::testing::ScriptedResponse;

        let driver = RecordingDriver::new();
        driver.push(ScriptedResponse::assigned("users:store-key"));
        let backend = GraphBackend::new(driver.clone());

        let mut row = WireRow::new();
        row.insert("name".to_string(), WireValue::from("Ada"));
        let id = backend.insert(&user_schema(), row).await.unwrap();

        assert_eq!(id.key(), "store-key");
    }
}
