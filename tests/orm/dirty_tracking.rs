//! Dirty tracking through nested typed values

use crate::common::*;

fn persisted(env: &TestEnv, class: &str) -> Record {
    let record = env.class(class).create();
    env.store.save(&record).unwrap();
    assert!(dirty(&record).is_empty());
    record
}

// ============================================================================
// Upward propagation
// ============================================================================

#[test]
fn geo_point_mutation_dirties_holding_record() {
    let env = TestEnv::new();
    let city = persisted(&env, "City");
    let location = TypedValue::geo_point(40.7, -74.0);
    city.set("location", &location).unwrap();
    env.store.save(&city).unwrap();
    assert!(dirty(&city).is_empty());

    location.set_latitude(41.0).unwrap();
    assert_eq!(dirty(&city), ["location"]);

    env.store.save(&city).unwrap();
    let stored = env.service.stored("City", &city.id().unwrap()).unwrap();
    assert_eq!(stored["location"]["latitude"], json!(41.0));
}

#[test]
fn propagation_reaches_record_through_nested_containers() {
    let env = TestEnv::new();
    let venue = persisted(&env, "Venue");

    let point = TypedValue::geo_point(1.0, 2.0);
    let inner = TypedValue::custom("Area");
    inner.set_field("center", &point).unwrap();
    let outer = TypedValue::custom("Region");
    outer.set_field("area", &inner).unwrap();
    venue.set("region", &outer).unwrap();
    env.store.save(&venue).unwrap();
    assert!(dirty(&venue).is_empty());

    point.set_longitude(3.0).unwrap();
    assert_eq!(dirty(&venue), ["region"]);
}

#[test]
fn propagation_survives_repeated_saves() {
    let env = TestEnv::new();
    let city = persisted(&env, "City");
    let founded = TypedValue::date(Date::from_iso("1624-01-01T00:00:00.000Z").unwrap());
    city.set("founded", &founded).unwrap();

    for year in ["1625", "1626", "1627"] {
        env.store.save(&city).unwrap();
        assert!(dirty(&city).is_empty());
        let iso = format!("{}-01-01T00:00:00.000Z", year);
        founded.set_date(Date::from_iso(&iso).unwrap()).unwrap();
        assert_eq!(dirty(&city), ["founded"]);
    }
}

#[test]
fn typed_values_inside_arrays_propagate() {
    let env = TestEnv::new();
    let route = persisted(&env, "Route");
    let a = TypedValue::geo_point(0.0, 0.0);
    let b = TypedValue::geo_point(1.0, 1.0);
    route
        .set("path", vec![Value::from(&a), Value::from(&b)])
        .unwrap();
    env.store.save(&route).unwrap();

    b.set_latitude(2.0).unwrap();
    assert_eq!(dirty(&route), ["path"]);
}

#[test]
fn one_value_held_by_two_records_dirties_both() {
    let env = TestEnv::new();
    let home = persisted(&env, "City");
    let office = persisted(&env, "Office");
    let point = TypedValue::geo_point(5.0, 5.0);
    home.set("location", &point).unwrap();
    office.set("location", &point).unwrap();
    env.store.save(&home).unwrap();
    env.store.save(&office).unwrap();
    assert_eq!(point.parent_count(), 2);

    point.set_latitude(6.0).unwrap();
    assert_eq!(dirty(&home), ["location"]);
    assert_eq!(dirty(&office), ["location"]);
}

#[test]
fn acl_changes_dirty_the_acl_field() {
    let env = TestEnv::new();
    let doc = persisted(&env, "Document");
    let acl = TypedValue::acl();
    acl.set_read_access(PUBLIC_ACCESS, true).unwrap();
    doc.set("ACL", &acl).unwrap();
    env.store.save(&doc).unwrap();

    acl.set_write_access("user-1", true).unwrap();
    assert_eq!(dirty(&doc), ["ACL"]);

    env.store.save(&doc).unwrap();
    let stored = env.service.stored("Document", &doc.id().unwrap()).unwrap();
    assert_eq!(
        stored["ACL"],
        json!({"*": {"read": true}, "user-1": {"write": true}})
    );
}

// ============================================================================
// Boundaries
// ============================================================================

#[test]
fn records_do_not_propagate_to_records_holding_them() {
    let env = TestEnv::new();
    let country = env.saved_city("Portugal");
    let city = persisted(&env, "City");
    city.set("country", &country).unwrap();
    env.store.save(&city).unwrap();

    country.set("name", "Portuguese Republic").unwrap();
    assert_eq!(dirty(&country), ["name"]);
    assert!(dirty(&city).is_empty());
}

#[test]
fn protected_user_fields_never_dirty() {
    let env = TestEnv::new();
    let user = env.store.new_user().unwrap();
    user.set("username", "ada").unwrap();
    user.set("sessionToken", "r:abc").unwrap();
    user.set("emailVerified", true).unwrap();
    assert!(dirty(&user).is_empty());
    assert_eq!(user.get("username").unwrap(), Value::from("ada"));
}

#[test]
fn reserved_fields_are_rejected() {
    let env = TestEnv::new();
    let city = env.class("City").create();
    for name in RESERVED_FIELDS {
        let err = city.set(name, "x").unwrap_err();
        assert_eq!(
            err,
            Error::ProtectedField {
                name: name.to_string()
            }
        );
    }
    assert!(dirty(&city).is_empty());
}

// ============================================================================
// Stale links
// ============================================================================

#[test]
fn replaced_value_no_longer_dirties_record() {
    let env = TestEnv::new();
    let city = persisted(&env, "City");
    let old = TypedValue::geo_point(0.0, 0.0);
    let new = TypedValue::geo_point(1.0, 1.0);
    city.set("location", &old).unwrap();
    city.set("location", &new).unwrap();
    env.store.save(&city).unwrap();
    assert_eq!(old.parent_count(), 0);

    old.set_latitude(9.0).unwrap();
    assert!(dirty(&city).is_empty());
}

#[test]
fn dropped_record_link_is_pruned() {
    let env = TestEnv::new();
    let point = TypedValue::geo_point(0.0, 0.0);
    {
        let city = env.class("City").create();
        city.set("location", &point).unwrap();
        assert_eq!(point.parent_count(), 1);
    }
    assert_eq!(point.parent_count(), 0);
    point.set_latitude(1.0).unwrap();
    assert_eq!(point.geo_point_data().unwrap().latitude, 1.0);
}

#[test]
fn fetch_replaces_values_and_detaches_old_ones() {
    let env = TestEnv::new();
    let city = persisted(&env, "City");
    let point = TypedValue::geo_point(10.0, 10.0);
    city.set("location", &point).unwrap();
    env.store.save(&city).unwrap();

    env.store.fetch(&city).unwrap();
    let fetched = city.get("location").unwrap();
    assert!(!fetched.as_typed().unwrap().ptr_eq(&point));
    assert_eq!(fetched.as_geo_point(), Some(GeoPoint::new(10.0, 10.0)));

    point.set_latitude(11.0).unwrap();
    assert!(dirty(&city).is_empty());

    fetched.as_typed().unwrap().set_latitude(12.0).unwrap();
    assert_eq!(dirty(&city), ["location"]);
}

#[test]
fn value_removed_from_container_detaches() {
    let env = TestEnv::new();
    let venue = persisted(&env, "Venue");
    let point = TypedValue::geo_point(1.0, 1.0);
    let area = TypedValue::custom("Area");
    area.set_field("center", &point).unwrap();
    venue.set("area", &area).unwrap();
    env.store.save(&venue).unwrap();

    area.remove_field("center").unwrap();
    assert_eq!(dirty(&venue), ["area"]);
    env.store.save(&venue).unwrap();

    point.set_latitude(2.0).unwrap();
    assert!(dirty(&venue).is_empty());
}
