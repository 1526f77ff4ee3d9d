use crate::core::{
    backend::Backend as _,
    connection::{Connection, ConnectionRegistry},
    document::Document,
    error::Error,
    executor::{self, DocumentStream},
    query::{Predicate, QuerySet},
    record::RecordId,
    schema::{Model, Schema, schema_of},
};
use futures_util::TryStreamExt;
use std::sync::Arc;

///
/// Session
///
/// The ergonomic application surface. A session holds the connection
/// registry and resolves the default connection for each schema's backend
/// kind at call time, so entity code never handles connections directly.
/// Sessions are cheap to clone and freely shared.
///

#[derive(Clone)]
pub struct Session {
    registry: Arc<ConnectionRegistry>,
}

impl Session {
    #[must_use]
    pub const fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    #[must_use]
    pub const fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    fn connection(&self, schema: &Schema) -> Result<Arc<Connection>, Error> {
        Ok(self.registry.resolve_kind(schema.backend())?)
    }

    /// A new, unpersisted instance of an entity type.
    pub fn document<T: Model>(&self) -> Result<Document, Error> {
        Ok(Document::new(schema_of::<T>()?))
    }

    /// A lazy query over an entity type. Nothing executes until a terminal
    /// call on the returned query.
    pub fn query<T: Model>(&self) -> Result<SessionQuery<'_>, Error> {
        Ok(SessionQuery {
            session: self,
            query: QuerySet::new(schema_of::<T>()?),
        })
    }

    /// Create the backing collection/table for an entity type.
    pub async fn create_collection<T: Model>(&self) -> Result<(), Error> {
        let schema = schema_of::<T>()?;
        let conn = self.connection(&schema)?;
        conn.backend().create_collection(&schema).await?;

        tracing::info!(collection = schema.collection(), "collection created");

        Ok(())
    }

    /// Drop the backing collection/table for an entity type.
    pub async fn drop_collection<T: Model>(&self) -> Result<(), Error> {
        let schema = schema_of::<T>()?;
        let conn = self.connection(&schema)?;
        conn.backend().drop_collection(&schema).await?;

        Ok(())
    }

    /// Persist a document: insert when unpersisted, otherwise a partial
    /// update of its dirty fields.
    pub async fn save(&self, document: &mut Document) -> Result<(), Error> {
        let conn = self.connection(document.schema())?;
        document.save(&conn).await
    }

    /// Bulk insert. Identities are assigned in order, only after the
    /// backend acknowledges the batch.
    pub async fn save_many(&self, documents: &mut [Document]) -> Result<(), Error> {
        let Some(first) = documents.first() else {
            return Ok(());
        };
        let conn = self.connection(first.schema())?;

        executor::insert_many(&conn, documents).await
    }

    /// Delete a persisted document and clear its identity.
    pub async fn delete(&self, document: &mut Document) -> Result<(), Error> {
        let conn = self.connection(document.schema())?;
        document.delete(&conn).await
    }

    /// Fetch one document by identity.
    pub async fn fetch<T: Model>(&self, id: &RecordId) -> Result<Option<Document>, Error> {
        let schema = schema_of::<T>()?;
        let conn = self.connection(&schema)?;

        executor::fetch(&conn, &schema, id).await
    }

    /// Re-read a persisted document from its backend. Returns `false` when
    /// the row no longer exists; the document is left untouched in that case.
    pub async fn refresh(&self, document: &mut Document) -> Result<bool, Error> {
        let schema = document.schema().clone();
        let id = document
            .id()
            .cloned()
            .ok_or_else(|| Error::MissingIdentity {
                collection: schema.collection().to_string(),
            })?;

        let conn = self.connection(&schema)?;
        match executor::fetch(&conn, &schema, &id).await? {
            Some(fresh) => {
                *document = fresh;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").finish_non_exhaustive()
    }
}

///
/// SessionQuery
///
/// A session-bound lazy query: the QuerySet builder surface plus terminal
/// calls that resolve the connection and execute. Builder calls consume and
/// return the query; the underlying QuerySet stays immutable and can be
/// taken out with `query_set` for forking.
///

#[must_use]
pub struct SessionQuery<'a> {
    session: &'a Session,
    query: QuerySet,
}

impl SessionQuery<'_> {
    #[must_use]
    pub const fn query_set(&self) -> &QuerySet {
        &self.query
    }

    /// Add a filter, implicitly AND-ed with any existing predicate.
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.query = self.query.filter(predicate);
        self
    }

    /// Add a negated filter.
    pub fn exclude(mut self, predicate: Predicate) -> Self {
        self.query = self.query.exclude(predicate);
        self
    }

    /// Append an ascending sort key.
    pub fn order_by(mut self, field: impl Into<String>) -> Self {
        self.query = self.query.order_by(field);
        self
    }

    /// Append a descending sort key.
    pub fn order_by_desc(mut self, field: impl Into<String>) -> Self {
        self.query = self.query.order_by_desc(field);
        self
    }

    pub fn limit(mut self, n: u64) -> Self {
        self.query = self.query.limit(n);
        self
    }

    pub fn offset(mut self, n: u64) -> Self {
        self.query = self.query.offset(n);
        self
    }

    pub fn group_by<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.query = self.query.group_by(fields);
        self
    }

    /// Restrict the selected columns.
    pub fn project<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.query = self.query.project(fields);
        self
    }

    //
    // Terminals
    //

    /// Execute and stream materialized documents lazily.
    pub async fn stream(&self) -> Result<DocumentStream, Error> {
        let conn = self.session.connection(self.query.schema())?;
        self.query.stream(&conn).await
    }

    /// Execute and collect every materialized document.
    pub async fn all(&self) -> Result<Vec<Document>, Error> {
        let conn = self.session.connection(self.query.schema())?;
        self.query.all(&conn).await
    }

    /// Execute with a limit of one and return the first document, if any.
    pub async fn first(&self) -> Result<Option<Document>, Error> {
        let conn = self.session.connection(self.query.schema())?;
        let mut stream = self.query.limit(1).stream(&conn).await?;
        stream.try_next().await
    }

    /// Execute the count form and return the scalar.
    pub async fn count(&self) -> Result<u64, Error> {
        let conn = self.session.connection(self.query.schema())?;
        self.query.count(&conn).await
    }
}
