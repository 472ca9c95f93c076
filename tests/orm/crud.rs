//! Record lifecycle against the service
//!
//! Unsaved -> Persisted&Loaded -> Persisted&Dirty -> Persisted&Loaded -> Deleted

use crate::common::*;

// ============================================================================
// Lifecycle
// ============================================================================

#[test]
fn city_lifecycle_end_to_end() {
    let env = TestEnv::new();
    let city = env
        .class("City")
        .create_with([("name", "New York")])
        .unwrap();
    assert_eq!(dirty(&city), ["name"]);
    assert!(city.id().is_none());
    assert!(!city.is_loaded());

    env.store.save(&city).unwrap();
    assert!(city.id().is_some());
    assert!(dirty(&city).is_empty());
    assert!(city.is_loaded());
    assert!(city.created_at().is_some());
    assert_eq!(city.created_at(), city.updated_at());

    city.set("name", "NYC").unwrap();
    assert_eq!(dirty(&city), ["name"]);
    assert!(city.is_loaded());

    env.store.fetch(&city).unwrap();
    assert_eq!(city.get("name").unwrap(), Value::from("New York"));
    assert!(dirty(&city).is_empty());
    assert!(city.is_loaded());
}

#[test]
fn update_sends_only_dirty_fields() {
    let env = TestEnv::new();
    let city = env.class("City").create();
    city.set("name", "Boston").unwrap();
    city.set("population", 650_000).unwrap();
    env.store.save(&city).unwrap();

    city.set("population", 675_000).unwrap();
    env.store.save(&city).unwrap();

    let requests = env.service.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].method, Method::Post);
    assert_eq!(requests[1].method, Method::Put);
    assert_eq!(body_of(&requests[1]), json!({"population": 675_000}));

    let stored = env.service.stored("City", &city.id().unwrap()).unwrap();
    assert_eq!(stored["name"], json!("Boston"));
    assert_eq!(stored["population"], json!(675_000));
}

#[test]
fn unset_field_is_removed_remotely() {
    let env = TestEnv::new();
    let city = env.saved_city("Boston");
    city.set("nickname", "Beantown").unwrap();
    env.store.save(&city).unwrap();

    city.unset("nickname").unwrap();
    assert_eq!(dirty(&city), ["nickname"]);
    env.store.save(&city).unwrap();

    let last = env.service.requests().pop().unwrap();
    assert_eq!(body_of(&last), json!({"nickname": {"__op": "Delete"}}));
    let stored = env.service.stored("City", &city.id().unwrap()).unwrap();
    assert!(!stored.contains_key("nickname"));
}

#[test]
fn fetch_picks_up_remote_changes() {
    let env = TestEnv::new();
    let city = env.saved_city("Boston");
    let id = city.id().unwrap();
    assert!(env.service.patch("City", &id, json!({"mayor": "Wu"})));

    env.store.fetch(&city).unwrap();
    assert_eq!(city.get("mayor").unwrap(), Value::from("Wu"));
    assert!(city.updated_at() >= city.created_at());
}

// ============================================================================
// Get / NotFound
// ============================================================================

#[test]
fn get_returns_loaded_record() {
    let env = TestEnv::new();
    let city = env.saved_city("Paris");

    let copy = env.store.get("City", &city.id().unwrap()).unwrap();
    assert!(copy.is_loaded());
    assert!(!copy.ptr_eq(&city));
    assert_eq!(copy.get("name").unwrap(), Value::from("Paris"));
    assert_eq!(copy.created_at(), city.created_at());
}

#[test]
fn get_missing_id_is_not_found() {
    let env = TestEnv::new();
    env.class("City");
    let err = env.store.get("City", "missing").unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn get_unregistered_class_fails_closed() {
    let env = TestEnv::new();
    let err = env.store.get("Nowhere", "abc").unwrap_err();
    assert_eq!(
        err,
        Error::UnknownType {
            name: "Nowhere".to_string()
        }
    );
    assert_eq!(env.service.request_count(), 0);
}

#[test]
fn fetch_without_id_fails_before_sending() {
    let env = TestEnv::new();
    let city = env.class("City").create();
    let err = env.store.fetch(&city).unwrap_err();
    assert!(matches!(err, Error::MissingIdentifier { .. }));
    assert_eq!(env.service.request_count(), 0);
}

// ============================================================================
// Delete
// ============================================================================

#[test]
fn deleted_record_keeps_local_state() {
    let env = TestEnv::new();
    let city = env.saved_city("Atlantis");
    let id = city.id().unwrap();

    env.store.delete(&city).unwrap();
    assert_eq!(env.service.object_count("City"), 0);
    assert_eq!(city.id(), Some(id));
    assert_eq!(city.get("name").unwrap(), Value::from("Atlantis"));
}

#[test]
fn remote_operations_after_delete_are_not_found() {
    let env = TestEnv::new();
    let city = env.saved_city("Atlantis");
    env.store.delete(&city).unwrap();

    assert!(env.store.fetch(&city).unwrap_err().is_not_found());
    assert!(env.store.delete(&city).unwrap_err().is_not_found());
    assert!(city.is_deleted());
    assert!(dirty(&city).is_empty());
    assert!(env.store.save(&city).unwrap_err().is_not_found());

    city.set("name", "Sunk").unwrap();
    assert!(env.store.save(&city).unwrap_err().is_not_found());
    assert_eq!(dirty(&city), ["name"]);
}

// ============================================================================
// Pointers
// ============================================================================

#[test]
fn pointer_load_then_fetch() {
    let env = TestEnv::new();
    let city = env.saved_city("Lisbon");

    let pointer = env.store.to_pointer(&city).unwrap();
    let loaded = pointer.load(&env.registry).unwrap();
    assert_eq!(loaded.class_name(), "City");
    assert_eq!(loaded.id(), city.id());
    assert!(!loaded.is_loaded());
    assert!(!loaded.contains("name"));

    env.store.fetch(&loaded).unwrap();
    assert!(loaded.is_loaded());
    assert_eq!(loaded.get("name").unwrap(), Value::from("Lisbon"));
}

#[test]
fn to_pointer_saves_unsaved_record() {
    let env = TestEnv::new();
    let city = env.class("City").create();
    city.set("name", "Oslo").unwrap();

    let pointer = env.store.to_pointer(&city).unwrap();
    assert_eq!(Some(pointer.object_id().to_string()), city.id());
    assert_eq!(env.service.object_count("City"), 1);
    assert!(!city.is_dirty());
}

#[test]
fn referenced_records_are_saved_first_and_sent_as_pointers() {
    let env = TestEnv::new();
    let country = env.class("Country").create();
    country.set("code", "PT").unwrap();
    let city = env.class("City").create();
    city.set("name", "Porto").unwrap();
    city.set("country", &country).unwrap();

    env.store.save(&city).unwrap();

    let country_id = country.id().expect("country saved first");
    let requests = env.service.requests();
    assert_eq!(requests[0].path, "classes/Country");
    assert_eq!(
        body_of(&requests[1])["country"],
        json!({"__type": "Pointer", "className": "Country", "objectId": country_id})
    );
}

#[test]
fn records_in_arrays_become_pointers() {
    let env = TestEnv::new();
    let a = env.saved_city("A");
    let b = env.saved_city("B");
    let route = env.class("Route").create();
    route
        .set("stops", vec![Value::from(&a), Value::from(&b)])
        .unwrap();
    env.store.save(&route).unwrap();

    let fetched = env.store.get("Route", &route.id().unwrap()).unwrap();
    let stops = fetched.get("stops").unwrap();
    let stops = stops.as_array().unwrap();
    let first = stops[0].as_typed().unwrap().pointer_data().unwrap();
    assert_eq!(Some(first.object_id().to_string()), a.id());
}

#[test]
fn unsaved_records_referencing_each_other_fail() {
    let env = TestEnv::new();
    let class = env.class("City");
    let a = class.create();
    let b = class.create();
    a.set("twin", &b).unwrap();
    b.set("twin", &a).unwrap();

    let err = env.store.save(&a).unwrap_err();
    assert!(matches!(err, Error::CircularReference { .. }));
    assert!(a.id().is_none());
    assert!(b.id().is_none());
    assert_eq!(env.service.request_count(), 0);

    // break the cycle so both records can be dropped
    b.unset("twin").unwrap();
    env.store.save(&a).unwrap();
    assert!(b.id().is_some());
}

// ============================================================================
// Failure handling
// ============================================================================

#[test]
fn transient_failures_are_retried() {
    let env = TestEnv::new();
    let city = env.class("City").create();
    city.set("name", "Rome").unwrap();

    env.service.fail_next(2);
    env.store.save(&city).unwrap();
    assert!(city.id().is_some());
    assert_eq!(env.service.request_count(), 3);
}

#[test]
fn exhausted_retries_leave_record_unchanged() {
    let env = TestEnv::with_config(ClientConfig::new("app", "rest").with_max_attempts(3));
    let city = env.saved_city("Rome");
    let before = city.updated_at();
    city.set("name", "Roma").unwrap();

    env.service.fail_next(3);
    let err = env.store.save(&city).unwrap_err();
    assert!(matches!(err, Error::Transport { .. }));
    assert_eq!(dirty(&city), ["name"]);
    assert_eq!(city.updated_at(), before);

    env.store.save(&city).unwrap();
    assert!(dirty(&city).is_empty());
}

#[test]
fn clean_record_save_is_elided() {
    let env = TestEnv::new();
    let city = env.saved_city("Rome");
    env.service.clear_log();

    env.store.save(&city).unwrap();
    assert_eq!(env.service.request_count(), 0);
}
