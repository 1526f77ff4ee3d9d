//! Process-wide schema cache keyed by entity type identity.
//!
//! Declarations compile exactly once per entity type; every later
//! `schema_of::<T>()` returns the same shared descriptor.

use crate::schema::{Schema, SchemaBuilder, SchemaError};
use parking_lot::Mutex;
use std::{
    any::TypeId,
    collections::BTreeMap,
    sync::{Arc, OnceLock},
};

///
/// Model
///
/// Implemented by application entity types. `declare` names the fields and
/// configuration; compilation and caching are handled here.
///

pub trait Model: 'static {
    fn declare() -> SchemaBuilder;
}

static CACHE: OnceLock<Mutex<BTreeMap<TypeId, Arc<Schema>>>> = OnceLock::new();

fn cache() -> &'static Mutex<BTreeMap<TypeId, Arc<Schema>>> {
    CACHE.get_or_init(|| Mutex::new(BTreeMap::new()))
}

/// Resolve the compiled schema for an entity type, compiling on first use.
///
/// Compilation failures are not cached; a failing declaration fails the
/// same way on every call.
pub fn schema_of<T: Model>() -> Result<Arc<Schema>, SchemaError> {
    let key = TypeId::of::<T>();
    let mut cache = cache().lock();

    if let Some(schema) = cache.get(&key) {
        return Ok(schema.clone());
    }

    let schema = Arc::new(T::declare().compile()?);
    cache.insert(key, schema.clone());

    Ok(schema)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{backend::BackendKind, field::FieldDef};

    struct Person;

    impl Model for Person {
        fn declare() -> SchemaBuilder {
            Schema::builder("Person", BackendKind::Graph)
                .field("name", FieldDef::text().required())
                .field("age", FieldDef::int().min(0.0))
        }
    }

    #[test]
    fn schema_is_compiled_once_and_shared() {
        let first = schema_of::<Person>().unwrap();
        let second = schema_of::<Person>().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.collection(), "person");
    }
}
