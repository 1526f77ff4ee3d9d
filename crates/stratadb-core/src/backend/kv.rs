//! Key-value store backend (Redis-family dialect).
//!
//! Documents live as JSON payloads under `prefix:collection:key`. The driver
//! receives command sequences (`SET`/`GET`/`MGET`/`SCAN`/`DEL`/`EXPIRE`) and
//! streams stored documents back as parsed rows. Collections are implicit in
//! the key namespace; there is no DDL. Partial update is read-merge-write,
//! since the store has no server-side merge.

use crate::{
    backend::{Backend, BackendError, BackendKind, Capability},
    driver::{Driver, DriverError, DriverResponse, RowStream},
    query::compile::{Command, CompiledOp, KeyPlan, NativeOp},
    record::RecordId,
    schema::Schema,
    value::{WireRow, WireValue},
};
use async_trait::async_trait;
use futures_util::StreamExt;
use std::sync::Arc;
use ulid::Ulid;

///
/// KeyValueBackend
///

pub struct KeyValueBackend {
    driver: Arc<dyn Driver>,
}

impl KeyValueBackend {
    #[must_use]
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        Self { driver }
    }

    async fn run(
        &self,
        schema: &Schema,
        commands: Vec<Command>,
    ) -> Result<DriverResponse, BackendError> {
        tracing::trace!(
            collection = schema.collection(),
            commands = commands.len(),
            "key-value request"
        );

        self.driver
            .request(NativeOp::Commands(commands))
            .await
            .map_err(|source| {
                BackendError::driver(BackendKind::KeyValue, schema.collection(), source)
            })
    }

    fn storage_key(schema: &Schema, key: &str) -> String {
        format!(
            "{}:{}:{key}",
            schema.options().key_prefix(),
            schema.collection()
        )
    }

    /// `SET` plus the expiry the schema declares, if any.
    fn write_commands(schema: &Schema, key: &str, row: &WireRow) -> Vec<Command> {
        let storage_key = Self::storage_key(schema, key);
        let mut commands = vec![Command::new("SET", [storage_key.clone(), render_document(row)])];

        if let Some(seconds) = schema.options().ttl_seconds() {
            commands.push(Command::new("EXPIRE", [storage_key, seconds.to_string()]));
        }

        commands
    }

    /// Translate a compiled key plan into its command sequence. Statement
    /// operations never target this backend; fail fast if one arrives.
    fn plan_commands(schema: &Schema, op: &CompiledOp) -> Result<Vec<Command>, BackendError> {
        match &op.op {
            NativeOp::KeyPlan(KeyPlan::Get { keys }) => Ok(vec![match keys.as_slice() {
                [key] => Command::new("GET", [key.clone()]),
                keys => Command::new("MGET", keys.to_vec()),
            }]),
            NativeOp::KeyPlan(KeyPlan::Scan { pattern, limit }) => {
                let mut args = vec!["MATCH".to_string(), pattern.clone()];
                if let Some(limit) = limit {
                    args.extend(["COUNT".to_string(), limit.to_string()]);
                }
                Ok(vec![Command::new("SCAN", args)])
            }
            NativeOp::Statement(_) | NativeOp::Commands(_) => Err(BackendError::unsupported(
                BackendKind::KeyValue,
                schema.collection(),
                "statement execution",
            )),
        }
    }
}

#[async_trait]
impl Backend for KeyValueBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::KeyValue
    }

    fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::Ttl | Capability::PartialUpdate => true,
            Capability::Transactions
            | Capability::GraphRelations
            | Capability::MaterializedViews
            | Capability::ArrayContainment => false,
        }
    }

    /// Keyspaces are implicit; there is nothing to create.
    async fn create_collection(&self, schema: &Schema) -> Result<(), BackendError> {
        tracing::debug!(collection = schema.collection(), "keyspace is implicit");

        Ok(())
    }

    /// Scan the collection's key pattern and delete every stored document.
    async fn drop_collection(&self, schema: &Schema) -> Result<(), BackendError> {
        let pattern = format!(
            "{}:{}:*",
            schema.options().key_prefix(),
            schema.collection()
        );
        let response = self
            .run(schema, vec![Command::new("SCAN", ["MATCH".to_string(), pattern])])
            .await?;

        let mut keys = Vec::new();
        let mut rows = response.rows;
        while let Some(row) = rows.next().await {
            let row = row.map_err(|source| {
                BackendError::driver(BackendKind::KeyValue, schema.collection(), source)
            })?;
            if let Some(key) = row_key_text(&row, schema.primary_key()) {
                keys.push(Self::storage_key(schema, &key));
            }
        }

        if !keys.is_empty() {
            self.run(schema, vec![Command::new("DEL", keys)]).await?;
        }

        Ok(())
    }

    async fn insert(&self, schema: &Schema, row: WireRow) -> Result<RecordId, BackendError> {
        let key = row_key_text(&row, schema.primary_key())
            .unwrap_or_else(|| Ulid::new().to_string());

        let response = self.run(schema, Self::write_commands(schema, &key, &row)).await?;

        // an explicit store-side identity wins over the candidate key
        let key = response
            .assigned_id
            .as_deref()
            .and_then(|id| id.rsplit(':').next().map(ToString::to_string))
            .unwrap_or(key);

        Ok(RecordId::new(schema.collection(), key))
    }

    async fn insert_many(
        &self,
        schema: &Schema,
        rows: Vec<WireRow>,
    ) -> Result<Vec<RecordId>, BackendError> {
        let mut ids = Vec::with_capacity(rows.len());
        let mut commands = Vec::with_capacity(rows.len());
        for row in &rows {
            let key = row_key_text(row, schema.primary_key())
                .unwrap_or_else(|| Ulid::new().to_string());
            commands.extend(Self::write_commands(schema, &key, row));
            ids.push(RecordId::new(schema.collection(), key));
        }

        if !commands.is_empty() {
            self.run(schema, commands).await?;
        }

        Ok(ids)
    }

    async fn select(&self, schema: &Schema, op: &CompiledOp) -> Result<RowStream, BackendError> {
        let commands = Self::plan_commands(schema, op)?;
        let response = self.run(schema, commands).await?;

        Ok(response.rows)
    }

    async fn count(&self, schema: &Schema, op: &CompiledOp) -> Result<u64, BackendError> {
        let commands = Self::plan_commands(schema, op)?;
        let response = self.run(schema, commands).await?;

        // no scalar count command over documents; count streamed rows
        let mut total = 0u64;
        let mut rows = response.rows;
        while let Some(row) = rows.next().await {
            row.map_err(|source| {
                BackendError::driver(BackendKind::KeyValue, schema.collection(), source)
            })?;
            total += 1;
        }

        Ok(total)
    }

    async fn update(
        &self,
        schema: &Schema,
        id: &RecordId,
        changed: WireRow,
    ) -> Result<(), BackendError> {
        let storage_key = Self::storage_key(schema, id.key());
        let response = self
            .run(schema, vec![Command::new("GET", [storage_key.clone()])])
            .await?;

        let mut rows = response.rows;
        let current = match rows.next().await {
            Some(row) => row.map_err(|source| {
                BackendError::driver(BackendKind::KeyValue, schema.collection(), source)
            })?,
            None => {
                return Err(BackendError::driver(
                    BackendKind::KeyValue,
                    schema.collection(),
                    DriverError::new(format!("key '{storage_key}' not found")),
                ));
            }
        };
        drop(rows);

        let mut merged = current;
        merged.extend(changed);

        self.run(schema, Self::write_commands(schema, id.key(), &merged))
            .await?;

        Ok(())
    }

    async fn delete(&self, schema: &Schema, id: &RecordId) -> Result<(), BackendError> {
        let storage_key = Self::storage_key(schema, id.key());
        self.run(schema, vec![Command::new("DEL", [storage_key])])
            .await?;

        Ok(())
    }
}

fn render_document(row: &WireRow) -> String {
    let object: serde_json::Map<String, WireValue> =
        row.iter().map(|(k, v)| (k.clone(), v.clone())).collect();

    serde_json::Value::Object(object).to_string()
}

fn row_key_text(row: &WireRow, primary_key: &str) -> Option<String> {
    match row.get(primary_key) {
        Some(WireValue::String(key)) => Some(key.clone()),
        Some(WireValue::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        field::FieldDef,
        query::queryset::QuerySet,
        testing::{RecordingDriver, ScriptedResponse},
    };
    use std::collections::BTreeMap;

    fn account_schema() -> Schema {
        Schema::builder("Account", BackendKind::KeyValue)
            .collection("accounts")
            .field("name", FieldDef::text().required())
            .field("age", FieldDef::int())
            .option("ttl_seconds", 60)
            .compile()
            .unwrap()
    }

    fn row(entries: &[(&str, WireValue)]) -> WireRow {
        entries
            .iter()
            .map(|(name, value)| ((*name).to_string(), value.clone()))
            .collect()
    }

    #[tokio::test]
    async fn inserts_set_the_document_and_its_expiry() {
        let driver = RecordingDriver::new();
        let backend = KeyValueBackend::new(driver.clone());
        let schema = account_schema();

        let id = backend
            .insert(&schema, row(&[("name", WireValue::from("Ada"))]))
            .await
            .unwrap();
        assert_eq!(id.collection(), "accounts");

        let ops = driver.recorded();
        let NativeOp::Commands(commands) = &ops[0] else {
            panic!("expected commands");
        };
        assert_eq!(commands[0].name, "SET");
        assert!(commands[0].args[0].starts_with("strata:accounts:"));
        assert!(commands[0].args[1].contains("\"name\":\"Ada\""));
        assert_eq!(commands[1].name, "EXPIRE");
        assert_eq!(commands[1].args[1], "60");
    }

    #[tokio::test]
    async fn updates_read_merge_and_write_back() {
        let driver = RecordingDriver::new();
        driver.push(ScriptedResponse::rows(vec![row(&[
            ("name", WireValue::from("Ada")),
            ("age", WireValue::from(30)),
        ])]));
        let backend = KeyValueBackend::new(driver.clone());
        let schema = account_schema();

        let mut changed = BTreeMap::new();
        changed.insert("age".to_string(), WireValue::from(31));
        backend
            .update(&schema, &RecordId::new("accounts", "k1"), changed)
            .await
            .unwrap();

        let ops = driver.recorded();
        let NativeOp::Commands(read) = &ops[0] else {
            panic!("expected commands");
        };
        assert_eq!(read[0].name, "GET");
        assert_eq!(read[0].args[0], "strata:accounts:k1");

        let NativeOp::Commands(write) = &ops[1] else {
            panic!("expected commands");
        };
        assert_eq!(write[0].name, "SET");
        assert!(write[0].args[1].contains("\"age\":31"));
        assert!(write[0].args[1].contains("\"name\":\"Ada\""));
    }

    #[tokio::test]
    async fn statement_operations_are_refused() {
        let graph_schema = Schema::builder("User", BackendKind::Graph)
            .field("name", FieldDef::text())
            .compile()
            .unwrap();
        let statement_op = QuerySet::new(Arc::new(graph_schema)).compile().unwrap();

        let backend = KeyValueBackend::new(RecordingDriver::new());
        let err = match backend.select(&account_schema(), &statement_op).await {
            Err(err) => err,
            Ok(_) => panic!("expected an error"),
        };
        assert!(matches!(err, BackendError::Unsupported { .. }));
    }

    #[tokio::test]
    async fn deletes_issue_a_single_del() {
        let driver = RecordingDriver::new();
        let backend = KeyValueBackend::new(driver.clone());

        backend
            .delete(&account_schema(), &RecordId::new("accounts", "k1"))
            .await
            .unwrap();

        let ops = driver.recorded();
        let NativeOp::Commands(commands) = &ops[0] else {
            panic!("expected commands");
        };
        assert_eq!(commands[0].name, "DEL");
        assert_eq!(commands[0].args, ["strata:accounts:k1"]);
    }
}
