use crate::{
    backend::BackendKind,
    field::{FieldCodec, FieldDef, FieldKind, ValidationError},
    value::{Float64, Value, WireDecodeError, WireValue},
};
use proptest::prelude::*;
use std::collections::BTreeMap;
use time::macros::datetime;
use ulid::Ulid;

#[test]
fn required_rejects_null() {
    let def = FieldDef::text().required();
    let err = def.validate("name", Value::Null).unwrap_err();
    assert!(matches!(err, ValidationError::Missing { .. }));
    assert_eq!(err.field(), "name");
}

#[test]
fn optional_null_passes_through() {
    let def = FieldDef::int();
    assert_eq!(def.validate("age", Value::Null).unwrap(), Value::Null);
}

#[test]
fn numeric_bounds_are_enforced() {
    let def = FieldDef::int().min(0.0).max(10.0);
    assert!(def.validate("n", Value::Int(5)).is_ok());
    assert!(matches!(
        def.validate("n", Value::Int(-1)),
        Err(ValidationError::BelowMin { .. })
    ));
    assert!(matches!(
        def.validate("n", Value::Int(11)),
        Err(ValidationError::AboveMax { .. })
    ));
}

#[test]
fn length_bounds_count_chars_and_elements() {
    let def = FieldDef::text().min_length(2).max_length(4);
    assert!(def.validate("s", Value::from("abc")).is_ok());
    assert!(matches!(
        def.validate("s", Value::from("a")),
        Err(ValidationError::TooShort { .. })
    ));
    assert!(matches!(
        def.validate("s", Value::from("abcde")),
        Err(ValidationError::TooLong { .. })
    ));

    let def = FieldDef::list(FieldKind::Int).max_length(2);
    assert!(matches!(
        def.validate("l", Value::list([1i64, 2, 3])),
        Err(ValidationError::TooLong { .. })
    ));
}

#[test]
fn choices_close_the_value_set() {
    let def = FieldDef::text().choices(["open", "closed"]);
    assert!(def.validate("status", Value::from("open")).is_ok());
    assert!(matches!(
        def.validate("status", Value::from("ajar")),
        Err(ValidationError::NotAChoice { .. })
    ));
}

#[test]
fn patterns_match_full_text_constraints() {
    let def = FieldDef::text().pattern("^[a-z]+$");
    assert!(def.validate("slug", Value::from("abc")).is_ok());
    assert!(matches!(
        def.validate("slug", Value::from("Abc")),
        Err(ValidationError::PatternMismatch { .. })
    ));
}

#[test]
fn ints_widen_to_float() {
    let def = FieldDef::float();
    assert_eq!(
        def.validate("x", Value::Int(2)).unwrap(),
        Value::Float(Float64::try_new(2.0).unwrap())
    );
}

#[test]
fn identifier_kinds_parse_canonical_text() {
    let def = FieldDef::uuid();
    let parsed = def
        .validate("id", Value::from("f47ac10b-58cc-4372-a567-0e02b2c3d479"))
        .unwrap();
    assert!(matches!(parsed, Value::Uuid(_)));

    assert!(matches!(
        def.validate("id", Value::from("not-a-uuid")),
        Err(ValidationError::Unparsable { .. })
    ));

    let def = FieldDef::ulid();
    assert!(matches!(
        def.validate("id", Value::from("01ARZ3NDEKTSV4RRFFQ69G5FAV"))
            .unwrap(),
        Value::Ulid(_)
    ));
}

#[test]
fn datetimes_canonicalize_to_millisecond_utc() {
    let def = FieldDef::datetime();
    let raw = datetime!(2024-06-01 12:30:45.123456789 UTC);

    let Value::DateTime(stored) = def.validate("at", Value::DateTime(raw)).unwrap() else {
        panic!("expected datetime");
    };
    assert_eq!(stored.nanosecond(), 123_000_000);

    let Value::DateTime(parsed) = def
        .validate("at", Value::from("2024-06-01T12:30:45.123Z"))
        .unwrap()
    else {
        panic!("expected datetime");
    };
    assert_eq!(parsed, stored);
}

#[test]
fn wrong_kinds_name_both_sides() {
    let def = FieldDef::int();
    let err = def.validate("age", Value::from("x")).unwrap_err();
    let ValidationError::WrongKind {
        expected, found, ..
    } = err
    else {
        panic!("expected wrong-kind error");
    };
    assert_eq!(expected, "int");
    assert_eq!(found.as_str(), "text");
}

#[test]
fn every_kind_round_trips_on_every_backend() {
    let dt = datetime!(2024-06-01 12:30:45.123 UTC);
    let cases: Vec<(FieldDef, Value)> = vec![
        (FieldDef::bool(), Value::Bool(true)),
        (FieldDef::int(), Value::Int(-7)),
        (
            FieldDef::float(),
            Value::Float(Float64::try_new(2.5).unwrap()),
        ),
        (FieldDef::text(), Value::from("ada")),
        (FieldDef::datetime(), Value::DateTime(dt)),
        (
            FieldDef::uuid(),
            Value::Uuid("f47ac10b-58cc-4372-a567-0e02b2c3d479".parse().unwrap()),
        ),
        (
            FieldDef::ulid(),
            Value::Ulid("01ARZ3NDEKTSV4RRFFQ69G5FAV".parse().unwrap()),
        ),
        (FieldDef::list(FieldKind::Int), Value::list([1i64, 2, 3])),
        (
            FieldDef::list(FieldKind::DateTime),
            Value::List(vec![Value::DateTime(dt)]),
        ),
        (
            FieldDef::object(),
            Value::Object(BTreeMap::from([
                ("a".to_string(), Value::Int(1)),
                ("b".to_string(), Value::from("x")),
            ])),
        ),
    ];

    for (def, value) in cases {
        for backend in BackendKind::ALL {
            let validated = def.validate("f", value.clone()).unwrap();
            let wire = def.serialize(&validated, backend);
            let back = def.deserialize(&wire, backend).unwrap();
            assert_eq!(back, validated, "{} on {backend}", def.kind());
        }
    }
}

fn reversed_serialize(value: &Value) -> WireValue {
    WireValue::String(value.as_text().unwrap_or_default().chars().rev().collect())
}

fn reversed_deserialize(wire: &WireValue) -> Result<Value, WireDecodeError> {
    Ok(Value::Text(
        wire.as_str().unwrap_or_default().chars().rev().collect(),
    ))
}

#[test]
fn codec_overrides_dispatch_by_backend_kind() {
    let def = FieldDef::text().with_codec(
        BackendKind::KeyValue,
        FieldCodec {
            serialize: reversed_serialize,
            deserialize: reversed_deserialize,
        },
    );
    let value = Value::from("strata");

    assert_eq!(
        def.serialize(&value, BackendKind::KeyValue),
        WireValue::from("atarts")
    );
    // other backends keep the canonical encoding
    assert_eq!(
        def.serialize(&value, BackendKind::Graph),
        WireValue::from("strata")
    );

    // the override pair still round-trips
    let wire = def.serialize(&value, BackendKind::KeyValue);
    assert_eq!(
        def.deserialize(&wire, BackendKind::KeyValue).unwrap(),
        value
    );
}

#[test]
fn defaults_produce_static_and_computed_values() {
    let def = FieldDef::int().default_value(7);
    assert_eq!(def.default().unwrap().produce(), Value::Int(7));

    let def = FieldDef::ulid().default_with(|| Value::Ulid(Ulid::new()));
    assert!(matches!(def.default().unwrap().produce(), Value::Ulid(_)));
}

proptest! {
    #[test]
    fn int_round_trip(n in any::<i64>()) {
        let def = FieldDef::int();
        for backend in BackendKind::ALL {
            let wire = def.serialize(&Value::Int(n), backend);
            prop_assert_eq!(def.deserialize(&wire, backend).unwrap(), Value::Int(n));
        }
    }

    #[test]
    fn text_round_trip(s in ".*") {
        let def = FieldDef::text();
        let value = Value::Text(s);
        for backend in BackendKind::ALL {
            let wire = def.serialize(&value, backend);
            prop_assert_eq!(&def.deserialize(&wire, backend).unwrap(), &value);
        }
    }

    #[test]
    fn float_round_trip(raw in any::<f64>().prop_filter("finite", |v| v.is_finite())) {
        let def = FieldDef::float();
        let value = Value::Float(Float64::try_new(raw).unwrap());
        for backend in BackendKind::ALL {
            let wire = def.serialize(&value, backend);
            prop_assert_eq!(&def.deserialize(&wire, backend).unwrap(), &value);
        }
    }
}
