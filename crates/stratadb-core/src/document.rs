use crate::{
    backend::Backend as _,
    connection::Connection,
    error::Error,
    field::FieldKind,
    record::RecordId,
    schema::Schema,
    value::{Value, WireRow},
};
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

///
/// Document
///
/// A runtime entity instance bound to a compiled schema: one value per
/// declared field, the set of fields changed since the last persisted
/// state, and an identity once persisted.
///
/// Lifecycle: constructed (no identity) → validated → persisted (identity
/// assigned only after the backend acknowledges, dirty set cleared) →
/// mutated (dirty set grows) → re-persisted (only dirty fields are sent) →
/// deleted (identity cleared).
///

#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    schema: Arc<Schema>,
    values: BTreeMap<String, Value>,
    dirty: BTreeSet<String>,
    id: Option<RecordId>,
}

impl Document {
    #[must_use]
    pub const fn new(schema: Arc<Schema>) -> Self {
        Self {
            schema,
            values: BTreeMap::new(),
            dirty: BTreeSet::new(),
            id: None,
        }
    }

    /// Rebuild an instance from materialized backend state. Clean and
    /// persisted by construction.
    pub(crate) const fn materialized(
        schema: Arc<Schema>,
        values: BTreeMap<String, Value>,
        id: Option<RecordId>,
    ) -> Self {
        Self {
            schema,
            values,
            dirty: BTreeSet::new(),
            id,
        }
    }

    #[must_use]
    pub const fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    #[must_use]
    pub const fn id(&self) -> Option<&RecordId> {
        self.id.as_ref()
    }

    #[must_use]
    pub const fn is_persisted(&self) -> bool {
        self.id.is_some()
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    /// Fields changed since the last persisted state.
    #[must_use]
    pub const fn dirty(&self) -> &BTreeSet<String> {
        &self.dirty
    }

    /// Set a field value. The raw value is held as-is and validated on
    /// `validate`/`save`; the field joins the dirty set immediately.
    pub fn set(&mut self, field: &str, value: impl Into<Value>) -> Result<(), Error> {
        if self.schema.field(field).is_none() {
            return Err(Error::UnknownField {
                collection: self.schema.collection().to_string(),
                field: field.to_string(),
            });
        }

        self.values.insert(field.to_string(), value.into());
        self.dirty.insert(field.to_string());

        Ok(())
    }

    /// Validate every declared field: held values are coerced and checked,
    /// missing fields take their declared default, missing required fields
    /// fail. Returns the full validated value map without mutating the
    /// instance.
    pub fn validate(&self) -> Result<BTreeMap<String, Value>, Error> {
        let mut validated = BTreeMap::new();

        for (name, def) in self.schema.fields() {
            let raw = match self.values.get(name) {
                Some(value) => value.clone(),
                None => def.default().map_or(Value::Null, crate::field::FieldDefault::produce),
            };

            // the primary key may be absent before the first save
            if name == self.schema.primary_key() && raw.is_null() && self.id.is_none() {
                validated.insert(name.to_string(), Value::Null);
                continue;
            }

            let value = def.validate(name, raw).map_err(|err| {
                Error::validation(self.schema.as_ref(), err)
            })?;
            validated.insert(name.to_string(), value);
        }

        Ok(validated)
    }

    /// Persist the instance: insert when no identity exists, otherwise a
    /// partial update carrying only the dirty fields.
    ///
    /// The identity is assigned strictly after the backend acknowledges an
    /// insert; a call cancelled mid-flight leaves the instance without one.
    pub async fn save(&mut self, conn: &Connection) -> Result<(), Error> {
        conn.check_kind(&self.schema)?;

        if self.id.is_none() {
            self.insert(conn).await
        } else {
            self.update(conn).await
        }
    }

    async fn insert(&mut self, conn: &Connection) -> Result<(), Error> {
        let validated = self.validate()?;
        let row = self.serialize_row(&validated);

        let id = conn.backend().insert(&self.schema, row).await?;

        tracing::debug!(collection = self.schema.collection(), id = %id, "document inserted");

        self.values = validated;
        self.apply_identity(&id);
        self.id = Some(id);
        self.dirty.clear();

        Ok(())
    }

    async fn update(&mut self, conn: &Connection) -> Result<(), Error> {
        if self.dirty.is_empty() {
            return Ok(());
        }

        let id = self.id.clone().ok_or_else(|| Error::MissingIdentity {
            collection: self.schema.collection().to_string(),
        })?;

        let mut validated = BTreeMap::new();
        let mut changed = WireRow::new();
        for name in &self.dirty {
            let def = self.schema.field(name).ok_or_else(|| Error::UnknownField {
                collection: self.schema.collection().to_string(),
                field: name.clone(),
            })?;
            let raw = self.values.get(name).cloned().unwrap_or(Value::Null);
            let value = def
                .validate(name, raw)
                .map_err(|err| Error::validation(self.schema.as_ref(), err))?;
            changed.insert(name.clone(), def.serialize(&value, self.schema.backend()));
            validated.insert(name.clone(), value);
        }

        conn.backend().update(&self.schema, &id, changed).await?;

        tracing::debug!(
            collection = self.schema.collection(),
            id = %id,
            fields = self.dirty.len(),
            "document updated"
        );

        self.values.extend(validated);
        self.dirty.clear();

        Ok(())
    }

    /// Delete the persisted row. Clears the identity; the values remain so
    /// a later `save` re-inserts.
    pub async fn delete(&mut self, conn: &Connection) -> Result<(), Error> {
        conn.check_kind(&self.schema)?;

        let id = self.id.clone().ok_or_else(|| Error::MissingIdentity {
            collection: self.schema.collection().to_string(),
        })?;

        conn.backend().delete(&self.schema, &id).await?;

        tracing::debug!(collection = self.schema.collection(), id = %id, "document deleted");

        self.id = None;
        self.dirty = self.values.keys().cloned().collect();

        Ok(())
    }

    /// Serialize a validated value map into a wire row. Materialized
    /// columns are computed by the store and never written; an absent
    /// primary key is left for the backend to assign.
    pub(crate) fn serialize_row(&self, validated: &BTreeMap<String, Value>) -> WireRow {
        let mut row = WireRow::new();

        for (name, def) in self.schema.fields() {
            if def.materialized_expr().is_some() {
                continue;
            }
            let Some(value) = validated.get(name) else {
                continue;
            };
            if name == self.schema.primary_key() && value.is_null() {
                continue;
            }
            row.insert(name.to_string(), def.serialize(value, self.schema.backend()));
        }

        row
    }

    /// Reflect an acknowledged identity back into the primary-key field.
    pub(crate) fn apply_identity(&mut self, id: &RecordId) {
        let pk = self.schema.primary_key().to_string();
        let current = self.values.get(&pk);
        if current.is_none_or(Value::is_null) {
            let kind = self.schema.pk_field().kind().clone();
            self.values.insert(pk, pk_value_from_key(&kind, id.key()));
        }
    }

    pub(crate) fn clear_dirty(&mut self) {
        self.dirty.clear();
    }

    pub(crate) fn set_id(&mut self, id: RecordId) {
        self.id = Some(id);
    }
}

/// Coerce an acknowledged key back into the primary key's declared kind,
/// falling back to text when it does not parse.
pub(crate) fn pk_value_from_key(kind: &FieldKind, key: &str) -> Value {
    match kind {
        FieldKind::Int => key
            .parse::<i64>()
            .map_or_else(|_| Value::Text(key.to_string()), Value::Int),
        FieldKind::Uuid => key
            .parse()
            .map_or_else(|_| Value::Text(key.to_string()), Value::Uuid),
        FieldKind::Ulid => key
            .parse()
            .map_or_else(|_| Value::Text(key.to_string()), Value::Ulid),
        _ => Value::Text(key.to_string()),
    }
}
