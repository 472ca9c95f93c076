//! Typed values through the service and back

use crate::common::*;

/// Save `value` under `field` on a new Thing, then read a fresh copy
fn round_trip(env: &TestEnv, field: &str, value: impl Into<Value>) -> Value {
    let thing = env.class("Thing").create();
    thing.set(field, value).unwrap();
    env.store.save(&thing).unwrap();
    let copy = env.store.get("Thing", &thing.id().unwrap()).unwrap();
    copy.get(field).unwrap()
}

// ============================================================================
// Built-in types
// ============================================================================

#[test]
fn geo_point_round_trip() {
    let env = TestEnv::new();
    let value = round_trip(&env, "location", GeoPoint::new(40.7128, -74.006));
    assert_eq!(value.as_geo_point(), Some(GeoPoint::new(40.7128, -74.006)));
}

#[test]
fn date_round_trip_keeps_milliseconds() {
    let env = TestEnv::new();
    let date = Date::from_iso("2015-03-01T12:30:45.123Z").unwrap();
    let value = round_trip(&env, "opened", date);
    assert_eq!(value.as_date(), Some(date));
    assert_eq!(value.as_date().unwrap().to_iso(), "2015-03-01T12:30:45.123Z");

    let create = env.service.requests()[0].clone();
    assert_eq!(
        body_of(&create)["opened"],
        json!({"__type": "Date", "iso": "2015-03-01T12:30:45.123Z"})
    );
}

#[test]
fn bytes_round_trip() {
    let env = TestEnv::new();
    let payload = Binary::from_bytes(b"\x00\x01binary\xff".to_vec());
    let value = round_trip(&env, "blob", TypedValue::binary(payload.clone()));
    let decoded = value.as_typed().unwrap().binary_data().unwrap();
    assert_eq!(decoded.as_bytes(), payload.as_bytes());
    assert_eq!(decoded.encoded(), payload.encoded());
}

#[test]
fn pointer_round_trip() {
    let env = TestEnv::new();
    let target = Pointer::new("City", "abc123");
    let value = round_trip(&env, "home", TypedValue::pointer(target.clone()));
    assert_eq!(value.as_typed().unwrap().pointer_data(), Some(target));
}

#[test]
fn acl_round_trip_without_type_tag() {
    let env = TestEnv::new();
    let acl = TypedValue::acl();
    acl.set_read_access(PUBLIC_ACCESS, true).unwrap();
    acl.set_write_access("role:admin", true).unwrap();
    let value = round_trip(&env, "ACL", &acl);

    let decoded = value.as_typed().unwrap();
    assert_eq!(decoded.tag(), ACL_TAG);
    assert!(decoded.read_access(PUBLIC_ACCESS));
    assert!(!decoded.write_access(PUBLIC_ACCESS));
    assert!(decoded.write_access("role:admin"));

    let sent = body_of(&env.service.requests()[0]);
    assert!(sent["ACL"].get("__type").is_none());
}

#[test]
fn plain_structures_round_trip() {
    let env = TestEnv::new();
    let tags = Value::from(vec![Value::from("a"), Value::from(2), Value::Null]);
    let value = round_trip(&env, "tags", tags.clone());
    assert_eq!(value, tags);

    let mut nested = std::collections::BTreeMap::new();
    nested.insert("open".to_string(), Value::from(true));
    nested.insert("rating".to_string(), Value::from(4.5));
    let value = round_trip(&env, "meta", Value::from(nested.clone()));
    assert_eq!(value.as_object(), Some(&nested));
}

#[test]
fn timestamps_decode_as_dates() {
    let env = TestEnv::new();
    let city = env.saved_city("Lyon");
    let copy = env.store.get("City", &city.id().unwrap()).unwrap();
    assert_eq!(copy.created_at(), city.created_at());
    assert!(copy.updated_at().is_some());
    assert!(!copy.contains("createdAt"));
}

// ============================================================================
// Unknown and custom types
// ============================================================================

#[test]
fn unknown_type_tag_fails_the_whole_read() {
    let env = TestEnv::new();
    let city = env.saved_city("Nice");
    let id = city.id().unwrap();
    env.service.patch(
        "City",
        &id,
        json!({"shape": {"__type": "Polygon", "points": []}, "name": "Nizza"}),
    );

    let err = env.store.fetch(&city).unwrap_err();
    assert_eq!(
        err,
        Error::UnknownType {
            name: "Polygon".to_string()
        }
    );
    assert_eq!(city.get("name").unwrap(), Value::from("Nice"));
    assert!(!city.contains("shape"));
}

#[test]
fn registered_custom_type_round_trip() {
    let env = TestEnv::new();
    env.registry.register_value_type("Money");

    let price = TypedValue::custom("Money");
    price.set_field("currency", "EUR").unwrap();
    price.set_field("cents", 1999).unwrap();
    let value = round_trip(&env, "price", &price);

    let decoded = value.as_typed().unwrap();
    assert_eq!(decoded.tag(), "Money");
    assert_eq!(decoded.field("currency"), Some(Value::from("EUR")));
    assert_eq!(decoded.field("cents"), Some(Value::from(1999)));
    assert_eq!(decoded, &price);
    assert!(!decoded.ptr_eq(&price));
}

#[test]
fn custom_type_nests_built_in_types() {
    let env = TestEnv::new();
    env.registry.register_value_type("Venue");

    let venue = TypedValue::custom("Venue");
    venue.set_field("at", GeoPoint::new(1.5, 2.5)).unwrap();
    venue.set_field("since", Date::from_iso("2020-01-02T03:04:05.006Z").unwrap()).unwrap();
    let thing = env.class("Thing").create();
    thing.set("venue", &venue).unwrap();
    env.store.save(&thing).unwrap();

    env.store.fetch(&thing).unwrap();
    let fetched = thing.get("venue").unwrap();
    let fetched = fetched.as_typed().unwrap();
    assert_eq!(
        fetched.field("at").and_then(|v| v.as_geo_point()),
        Some(GeoPoint::new(1.5, 2.5))
    );

    let since = fetched.field("since").unwrap();
    since
        .as_typed()
        .unwrap()
        .set_date(Date::from_iso("2021-01-01T00:00:00.000Z").unwrap())
        .unwrap();
    assert_eq!(dirty(&thing), ["venue"]);
}

#[test]
fn record_class_cannot_decode_as_value() {
    let env = TestEnv::new();
    env.class("City");
    let city = env.saved_city("Metz");
    env.service.patch(
        "City",
        &city.id().unwrap(),
        json!({"twin": {"__type": "City", "x": 1}}),
    );
    let err = env.store.fetch(&city).unwrap_err();
    assert!(matches!(err, Error::WrongKind { .. }));
}

#[test]
fn non_finite_numbers_are_rejected_on_save() {
    let env = TestEnv::new();
    let thing = env.class("Thing").create();
    thing.set("location", GeoPoint::new(f64::NAN, 0.0)).unwrap();
    let err = env.store.save(&thing).unwrap_err();
    assert!(matches!(err, Error::Serialization { .. }));
    assert_eq!(env.service.request_count(), 0);
}
