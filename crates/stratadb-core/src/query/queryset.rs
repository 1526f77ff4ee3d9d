use crate::{
    connection::Connection,
    document::Document,
    error::Error,
    executor::{self, DocumentStream},
    query::{
        compile::{self, CompiledOp},
        predicate::Predicate,
    },
    schema::Schema,
};
use std::sync::Arc;

///
/// OrderDirection
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OrderDirection {
    Asc,
    Desc,
}

impl OrderDirection {
    #[must_use]
    pub const fn keyword(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

///
/// QuerySet
///
/// Immutable, lazily built query over one schema. Every builder method
/// returns a new QuerySet that shares unchanged state with its parent;
/// nothing here touches a backend. Execution happens through the terminal
/// calls, which compile the expression tree for the schema's resolved
/// backend and submit it over a connection.
///

#[derive(Clone, Debug, PartialEq)]
pub struct QuerySet {
    schema: Arc<Schema>,
    predicate: Option<Arc<Predicate>>,
    order: Vec<(String, OrderDirection)>,
    limit: Option<u64>,
    offset: u64,
    group: Vec<String>,
    projection: Option<Vec<String>>,
}

impl QuerySet {
    #[must_use]
    pub const fn new(schema: Arc<Schema>) -> Self {
        Self {
            schema,
            predicate: None,
            order: Vec::new(),
            limit: None,
            offset: 0,
            group: Vec::new(),
            projection: None,
        }
    }

    ///
    /// BUILDER
    ///

    /// Add a filter, implicitly AND-ed with any existing predicate.
    #[must_use]
    pub fn filter(&self, predicate: Predicate) -> Self {
        let predicate = match &self.predicate {
            Some(existing) => existing.and_with(predicate),
            None => Arc::new(predicate),
        };

        Self {
            predicate: Some(predicate),
            ..self.clone()
        }
    }

    /// Add a negated filter.
    #[must_use]
    pub fn exclude(&self, predicate: Predicate) -> Self {
        self.filter(Predicate::not(predicate))
    }

    /// Append an ascending sort key.
    #[must_use]
    pub fn order_by(&self, field: impl Into<String>) -> Self {
        self.push_order(field.into(), OrderDirection::Asc)
    }

    /// Append a descending sort key.
    #[must_use]
    pub fn order_by_desc(&self, field: impl Into<String>) -> Self {
        self.push_order(field.into(), OrderDirection::Desc)
    }

    fn push_order(&self, field: String, direction: OrderDirection) -> Self {
        let mut order = self.order.clone();
        order.push((field, direction));

        Self {
            order,
            ..self.clone()
        }
    }

    #[must_use]
    pub fn limit(&self, n: u64) -> Self {
        Self {
            limit: Some(n),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn offset(&self, n: u64) -> Self {
        Self {
            offset: n,
            ..self.clone()
        }
    }

    #[must_use]
    pub fn group_by<I, S>(&self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut group = self.group.clone();
        group.extend(fields.into_iter().map(Into::into));

        Self {
            group,
            ..self.clone()
        }
    }

    /// Restrict the selected columns. Materialization still applies
    /// defaults for unselected non-required fields.
    #[must_use]
    pub fn project<I, S>(&self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            projection: Some(fields.into_iter().map(Into::into).collect()),
            ..self.clone()
        }
    }

    ///
    /// ACCESSORS
    ///

    #[must_use]
    pub const fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    #[must_use]
    pub const fn predicate(&self) -> Option<&Arc<Predicate>> {
        self.predicate.as_ref()
    }

    #[must_use]
    pub fn order(&self) -> &[(String, OrderDirection)] {
        &self.order
    }

    #[must_use]
    pub const fn limit_value(&self) -> Option<u64> {
        self.limit
    }

    #[must_use]
    pub const fn offset_value(&self) -> u64 {
        self.offset
    }

    #[must_use]
    pub fn group(&self) -> &[String] {
        &self.group
    }

    #[must_use]
    pub fn projection(&self) -> Option<&[String]> {
        self.projection.as_deref()
    }

    ///
    /// COMPILATION
    ///

    /// Compile the expression tree for the schema's resolved backend.
    /// Pure; surfaced errors never reach a backend.
    pub fn compile(&self) -> Result<Arc<CompiledOp>, compile::CompileError> {
        compile::compile(self)
    }

    /// Compile the count form of this query.
    pub fn compile_count(&self) -> Result<Arc<CompiledOp>, compile::CompileError> {
        compile::compile_count(self)
    }

    ///
    /// TERMINALS
    ///

    /// Execute and stream materialized documents lazily.
    pub async fn stream(&self, conn: &Connection) -> Result<DocumentStream, Error> {
        conn.check_kind(&self.schema)?;
        let op = self.compile()?;
        executor::execute(conn, self.schema.clone(), &op).await
    }

    /// Execute and collect every materialized document.
    pub async fn all(&self, conn: &Connection) -> Result<Vec<Document>, Error> {
        use futures_util::TryStreamExt;

        let stream = self.stream(conn).await?;
        stream.try_collect().await
    }

    /// Execute the count form and return the scalar.
    pub async fn count(&self, conn: &Connection) -> Result<u64, Error> {
        conn.check_kind(&self.schema)?;
        let op = self.compile_count()?;
        executor::count(conn, &self.schema, &op).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backend::BackendKind,
        field::FieldDef,
        query::predicate::{eq, gt},
    };

    fn schema() -> Arc<Schema> {
        Arc::new(
            Schema::builder("User", BackendKind::Graph)
                .field("name", FieldDef::text().required())
                .field("age", FieldDef::int())
                .compile()
                .unwrap(),
        )
    }

    #[test]
    fn builder_calls_never_mutate_the_receiver() {
        let base = QuerySet::new(schema()).filter(eq("name", "ada"));
        let snapshot = base.clone();

        let _extended = base
            .filter(gt("age", 10))
            .order_by("name")
            .limit(5)
            .offset(2)
            .group_by(["age"])
            .project(["name"]);

        assert_eq!(base, snapshot);
    }

    #[test]
    fn forks_share_the_unchanged_predicate_subtree() {
        let base = QuerySet::new(schema()).filter(eq("name", "ada"));
        let fork = base.filter(gt("age", 10));

        let Predicate::And(children) = fork.predicate().unwrap().as_ref() else {
            panic!("expected and node");
        };
        assert!(Arc::ptr_eq(&children[0], base.predicate().unwrap()));
    }

    #[test]
    fn exclude_wraps_the_predicate_in_not() {
        let query = QuerySet::new(schema()).exclude(eq("name", "ada"));
        assert!(matches!(
            query.predicate().unwrap().as_ref(),
            Predicate::Not(_)
        ));
    }

    #[test]
    fn directives_accumulate_in_call_order() {
        let query = QuerySet::new(schema())
            .order_by("name")
            .order_by_desc("age")
            .limit(7);

        assert_eq!(
            query.order(),
            [
                ("name".to_string(), OrderDirection::Asc),
                ("age".to_string(), OrderDirection::Desc)
            ]
        );
        assert_eq!(query.limit_value(), Some(7));
    }
}
