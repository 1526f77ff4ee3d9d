use super::*;
use crate::{
    field::FieldDef,
    query::predicate::{contains, eq, gt, gte, in_, is_null},
    value::Value,
};
use std::sync::Arc;

const ULID: &str = "01ARZ3NDEKTSV4RRFFQ69G5FAV";

fn graph_schema() -> Arc<Schema> {
    Arc::new(
        Schema::builder("User", BackendKind::Graph)
            .collection("users")
            .field("name", FieldDef::text().required())
            .field("age", FieldDef::int())
            .field("tags", FieldDef::list(FieldKind::Text))
            .compile()
            .unwrap(),
    )
}

fn columnar_schema() -> Arc<Schema> {
    Arc::new(
        Schema::builder("Event", BackendKind::Columnar)
            .collection("events")
            .field("kind", FieldDef::text().required().low_cardinality())
            .field("name", FieldDef::text())
            .field("amount", FieldDef::float())
            .field("tags", FieldDef::list(FieldKind::Text))
            .option("engine", "MergeTree")
            .compile()
            .unwrap(),
    )
}

fn kv_schema() -> Arc<Schema> {
    Arc::new(
        Schema::builder("Account", BackendKind::KeyValue)
            .collection("accounts")
            .field("name", FieldDef::text().required())
            .field("age", FieldDef::int().min(0.0))
            .compile()
            .unwrap(),
    )
}

#[test]
fn graph_selects_render_with_the_key_tie_break() {
    let query = QuerySet::new(graph_schema())
        .filter(gte("age", 18))
        .order_by("name")
        .limit(10)
        .offset(5);

    let op = query.compile().unwrap();
    let NativeOp::Statement(sql) = &op.op else {
        panic!("expected statement");
    };
    assert_eq!(
        sql,
        "SELECT * FROM users WHERE age >= 18 ORDER BY name ASC, id ASC LIMIT 10 START 5"
    );
}

#[test]
fn an_explicit_key_ordering_is_not_duplicated() {
    let query = QuerySet::new(graph_schema()).order_by_desc("id");

    let op = query.compile().unwrap();
    let NativeOp::Statement(sql) = &op.op else {
        panic!("expected statement");
    };
    assert_eq!(sql, "SELECT * FROM users ORDER BY id DESC");
}

#[test]
fn graph_boolean_nodes_and_null_tests_render() {
    let query = QuerySet::new(graph_schema())
        .filter(eq("name", "ada") | is_null("age"))
        .exclude(contains("tags", "beta"));

    let op = query.compile().unwrap();
    let NativeOp::Statement(sql) = &op.op else {
        panic!("expected statement");
    };
    assert_eq!(
        sql,
        "SELECT * FROM users WHERE ((name = \"ada\" OR age IS NONE) AND !(tags CONTAINS \"beta\")) ORDER BY id ASC"
    );
}

#[test]
fn graph_counts_group_all() {
    let query = QuerySet::new(graph_schema()).filter(gt("age", 18));

    let op = query.compile_count().unwrap();
    let NativeOp::Statement(sql) = &op.op else {
        panic!("expected statement");
    };
    assert_eq!(sql, "SELECT count() FROM users WHERE age > 18 GROUP ALL");
}

#[test]
fn columnar_text_contains_escapes_like_wildcards() {
    let query = QuerySet::new(columnar_schema()).filter(contains("name", "50%_off"));

    let op = query.compile().unwrap();
    let NativeOp::Statement(sql) = &op.op else {
        panic!("expected statement");
    };
    assert_eq!(
        sql,
        "SELECT * FROM events WHERE `name` LIKE '%50\\\\%\\\\_off%' ORDER BY `id` ASC"
    );
}

#[test]
fn columnar_membership_and_array_containment() {
    let query = QuerySet::new(columnar_schema())
        .filter(in_("kind", ["listing", "sale"]))
        .filter(contains("tags", "featured"));

    let op = query.compile().unwrap();
    let NativeOp::Statement(sql) = &op.op else {
        panic!("expected statement");
    };
    assert!(sql.contains("`kind` IN ('listing', 'sale')"));
    assert!(sql.contains("has(`tags`, 'featured')"));
}

#[test]
fn columnar_grouping_and_projection_render() {
    let query = QuerySet::new(columnar_schema())
        .project(["kind", "amount"])
        .group_by(["kind"]);

    let op = query.compile().unwrap();
    let NativeOp::Statement(sql) = &op.op else {
        panic!("expected statement");
    };
    assert!(sql.starts_with("SELECT `kind`, `amount` FROM events"));
    assert!(sql.contains("GROUP BY `kind`"));
}

#[test]
fn kv_key_equality_compiles_to_a_point_get() {
    let query = QuerySet::new(kv_schema()).filter(eq("id", ULID));

    let op = query.compile().unwrap();
    assert_eq!(
        op.op,
        NativeOp::KeyPlan(KeyPlan::Get {
            keys: vec![format!("strata:accounts:{ULID}")],
        })
    );
}

#[test]
fn kv_membership_compiles_to_a_multi_get() {
    let query = QuerySet::new(kv_schema()).filter(in_("id", ["a", "b"]));

    let op = query.compile().unwrap();
    assert_eq!(
        op.op,
        NativeOp::KeyPlan(KeyPlan::Get {
            keys: vec!["strata:accounts:a".to_string(), "strata:accounts:b".to_string()],
        })
    );
}

#[test]
fn kv_without_a_predicate_scans_the_keyspace() {
    let query = QuerySet::new(kv_schema()).limit(3);

    let op = query.compile().unwrap();
    assert_eq!(
        op.op,
        NativeOp::KeyPlan(KeyPlan::Scan {
            pattern: "strata:accounts:*".to_string(),
            limit: Some(3),
        })
    );
}

#[test]
fn kv_range_operators_are_refused_by_name() {
    let err = QuerySet::new(kv_schema())
        .filter(gte("age", 18))
        .compile()
        .unwrap_err();

    assert!(matches!(
        err,
        CompileError::UnsupportedOperator { op: CompareOp::Gte, .. }
    ));
    assert!(err.to_string().contains("gte"));
}

#[test]
fn kv_non_key_fields_are_refused() {
    let err = QuerySet::new(kv_schema())
        .filter(eq("name", "ada"))
        .compile()
        .unwrap_err();

    assert!(matches!(
        err,
        CompileError::NonKeyPredicate { ref field, .. } if field == "name"
    ));
}

#[test]
fn kv_directives_are_refused() {
    let err = QuerySet::new(kv_schema())
        .order_by("age")
        .compile()
        .unwrap_err();
    assert!(matches!(
        err,
        CompileError::UnsupportedDirective { directive: "order_by", .. }
    ));

    let err = QuerySet::new(kv_schema())
        .group_by(["age"])
        .compile()
        .unwrap_err();
    assert!(matches!(
        err,
        CompileError::UnsupportedDirective { directive: "group_by", .. }
    ));
}

#[test]
fn unknown_fields_fail_before_any_io() {
    let err = QuerySet::new(graph_schema())
        .filter(eq("nope", 1))
        .compile()
        .unwrap_err();
    assert!(matches!(
        err,
        CompileError::UnknownField { ref field, .. } if field == "nope"
    ));
}

#[test]
fn operand_kinds_must_fit_the_field() {
    let err = QuerySet::new(graph_schema())
        .filter(eq("age", "eighteen"))
        .compile()
        .unwrap_err();
    assert!(matches!(err, CompileError::OperandMismatch { .. }));
}

#[test]
fn null_operands_are_rejected_outright() {
    let err = QuerySet::new(graph_schema())
        .filter(Predicate::compare("age", CompareOp::Eq, Value::Null))
        .compile()
        .unwrap_err();
    assert!(matches!(err, CompileError::NullOperand { .. }));
}

#[test]
fn compilation_is_deterministic_and_cached() {
    let query = QuerySet::new(graph_schema()).filter(eq("name", "ada"));

    let first = query.compile().unwrap();
    let second = query.compile().unwrap();

    assert_eq!(first.fingerprint, second.fingerprint);
    assert_eq!(first.op, second.op);
    // the second compilation is the cached operation itself
    assert!(Arc::ptr_eq(&first, &second));

    let other = query.filter(gt("age", 1)).compile().unwrap();
    assert_ne!(first.fingerprint, other.fingerprint);
}
