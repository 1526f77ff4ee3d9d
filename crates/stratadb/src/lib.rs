//! StrataDB — a schema-first document layer that compiles one typed query
//! model onto graph, columnar, and key-value storage engines.
//!
//! This crate is the public facade over `stratadb-core`: the `Session`
//! surface that resolves connections for you, plus the prelude. The engine
//! itself (field system, schema compiler, query compilers, executor) lives
//! in the core crate and is re-exported as [`core`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use stratadb::prelude::*;
//!
//! struct User;
//!
//! impl Model for User {
//!     fn declare() -> SchemaBuilder {
//!         Schema::builder("User", BackendKind::Graph)
//!             .field("name", FieldDef::text().required())
//!             .field("age", FieldDef::int().min(0.0))
//!     }
//! }
//!
//! # async fn demo(registry: Arc<ConnectionRegistry>) -> Result<(), Error> {
//! let session = Session::new(registry);
//!
//! let mut user = session.document::<User>()?;
//! user.set("name", "Ada")?;
//! user.set("age", 30)?;
//! session.save(&mut user).await?;
//!
//! let adults = session
//!     .query::<User>()?
//!     .filter(predicate::gte("age", 18))
//!     .order_by("name")
//!     .all()
//!     .await?;
//! # let _ = adults;
//! # Ok(())
//! # }
//! ```

pub use stratadb_core as core;

mod session;

pub use session::{Session, SessionQuery};
pub use stratadb_core::Error;

/// Workspace version re-export for downstream tooling/tests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

///
/// Prelude
///

pub mod prelude {
    pub use crate::{
        Session, SessionQuery,
        core::{
            backend::{Backend, BackendKind, Capability},
            connection::{Connection, ConnectionRegistry},
            document::Document,
            driver::{Driver, DriverError, DriverResponse},
            error::Error,
            field::{FieldDef, FieldKind},
            query::{Predicate, QuerySet, predicate},
            record::RecordId,
            schema::{IndexSpec, Model, Schema, SchemaBuilder, schema_of},
            value::Value,
        },
    };
}
