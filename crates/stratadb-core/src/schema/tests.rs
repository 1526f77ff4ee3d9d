use crate::{
    backend::BackendKind,
    field::{FieldDef, FieldKind},
    schema::{IndexSpec, Schema, SchemaError},
    value::Value,
};

fn person() -> crate::schema::SchemaBuilder {
    Schema::builder("Person", BackendKind::Graph)
        .field("name", FieldDef::text().required())
        .field("age", FieldDef::int().min(0.0))
}

#[test]
fn compiling_twice_is_deterministic() {
    let a = person().compile().unwrap();
    let b = person().compile().unwrap();
    assert_eq!(a, b);
}

#[test]
fn collection_defaults_to_the_lowercased_entity() {
    let schema = person().compile().unwrap();
    assert_eq!(schema.collection(), "person");

    let schema = person().collection("people").compile().unwrap();
    assert_eq!(schema.collection(), "people");
}

#[test]
fn field_order_is_declaration_order() {
    let schema = person().compile().unwrap();
    let names: Vec<&str> = schema.fields().map(|(name, _)| name).collect();
    assert_eq!(names, ["id", "name", "age"]);
}

#[test]
fn duplicate_fields_are_rejected() {
    let err = person()
        .field("name", FieldDef::text())
        .compile()
        .unwrap_err();
    assert!(matches!(
        err,
        SchemaError::DuplicateField { ref field, .. } if field == "name"
    ));
}

#[test]
fn synthetic_ulid_id_is_injected_when_no_key_is_declared() {
    let schema = person().compile().unwrap();
    assert_eq!(schema.primary_key(), "id");
    assert_eq!(schema.pk_field().kind(), &FieldKind::Ulid);
}

#[test]
fn a_declared_id_field_becomes_the_key() {
    let schema = Schema::builder("Person", BackendKind::Graph)
        .field("id", FieldDef::text())
        .field("name", FieldDef::text())
        .compile()
        .unwrap();
    assert_eq!(schema.primary_key(), "id");
    assert_eq!(schema.pk_field().kind(), &FieldKind::Text);
    assert_eq!(schema.fields().count(), 2);
}

#[test]
fn explicit_primary_keys_must_exist() {
    let err = person().primary_key("nope").compile().unwrap_err();
    assert!(matches!(err, SchemaError::UnknownPrimaryKey { .. }));
}

#[test]
fn unkeyable_primary_keys_are_rejected() {
    let err = person()
        .field("flag", FieldDef::bool())
        .primary_key("flag")
        .compile()
        .unwrap_err();
    assert!(matches!(err, SchemaError::UnkeyablePrimaryKey { .. }));
}

#[test]
fn options_are_validated_against_the_resolved_backend_only() {
    // ttl_seconds belongs to the key-value backend
    let err = person().option("ttl_seconds", 60).compile().unwrap_err();
    assert!(matches!(
        err,
        SchemaError::UnknownOption { backend: BackendKind::Graph, .. }
    ));

    let schema = Schema::builder("Account", BackendKind::KeyValue)
        .field("name", FieldDef::text())
        .option("ttl_seconds", 60)
        .compile()
        .unwrap();
    assert_eq!(schema.options().ttl_seconds(), Some(60));
}

#[test]
fn option_value_shapes_are_checked() {
    let err = Schema::builder("Event", BackendKind::Columnar)
        .field("kind", FieldDef::text())
        .option("engine", 1)
        .compile()
        .unwrap_err();
    assert!(matches!(err, SchemaError::InvalidOption { .. }));
}

#[test]
fn the_columnar_backend_requires_an_engine() {
    let err = Schema::builder("Event", BackendKind::Columnar)
        .field("kind", FieldDef::text())
        .compile()
        .unwrap_err();
    assert!(matches!(
        err,
        SchemaError::MissingOption { key: "engine", .. }
    ));
}

#[test]
fn columnar_ordering_is_inferred_when_absent() {
    let schema = Schema::builder("Event", BackendKind::Columnar)
        .field("created_at", FieldDef::datetime())
        .field(
            "category",
            FieldDef::text().required().low_cardinality(),
        )
        .field("amount", FieldDef::float())
        .option("engine", "MergeTree")
        .compile()
        .unwrap();
    assert_eq!(schema.options().order_by(), ["created_at", "category"]);
}

#[test]
fn declared_columnar_ordering_wins() {
    let schema = Schema::builder("Event", BackendKind::Columnar)
        .field("created_at", FieldDef::datetime())
        .field("amount", FieldDef::float())
        .option("engine", "MergeTree")
        .option("order_by", Value::list(["amount"]))
        .compile()
        .unwrap();
    assert_eq!(schema.options().order_by(), ["amount"]);
}

#[test]
fn invalid_patterns_surface_at_compile_time() {
    let err = Schema::builder("Person", BackendKind::Graph)
        .field("slug", FieldDef::text().pattern("["))
        .compile()
        .unwrap_err();
    assert!(matches!(
        err,
        SchemaError::InvalidPattern { ref field, .. } if field == "slug"
    ));
}

#[test]
fn index_fields_must_exist() {
    let err = person()
        .index(IndexSpec::new("by_email", ["email"]))
        .compile()
        .unwrap_err();
    assert!(matches!(err, SchemaError::UnknownIndexField { .. }));

    let schema = person()
        .index(IndexSpec::new("by_name", ["name"]).unique())
        .compile()
        .unwrap();
    assert!(schema.indexes()[0].unique);
}
