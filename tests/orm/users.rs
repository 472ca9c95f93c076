//! Accounts, sessions and credentials

use crate::common::*;

fn token_of(user: &Record) -> String {
    RecordStore::session_token(user).expect("user has a session")
}

// ============================================================================
// Signup and login
// ============================================================================

#[test]
fn signup_creates_logged_in_user() {
    let env = TestEnv::new();
    let user = env.store.signup("ada", "lovelace").unwrap();

    assert_eq!(user.class_name(), USER_CLASS);
    assert!(user.id().is_some());
    assert!(user.is_loaded());
    assert!(!token_of(&user).is_empty());
    assert!(dirty(&user).is_empty());

    let request = &env.service.requests()[0];
    assert_eq!(request.path, "users");
    assert_eq!(
        body_of(request),
        json!({"username": "ada", "password": "lovelace"})
    );
    let stored = env.service.stored(USER_CLASS, &user.id().unwrap()).unwrap();
    assert_eq!(stored["username"], json!("ada"));
}

#[test]
fn signup_sends_extra_fields() {
    let env = TestEnv::new();
    let user = env.store.new_user().unwrap();
    user.set("email", "ada@example.com").unwrap();
    env.store.signup_user(&user, "ada", "pw").unwrap();

    let stored = env.service.stored(USER_CLASS, &user.id().unwrap()).unwrap();
    assert_eq!(stored["email"], json!("ada@example.com"));
    assert!(dirty(&user).is_empty());
}

#[test]
fn signup_twice_with_same_record_is_rejected() {
    let env = TestEnv::new();
    let user = env.store.signup("ada", "pw").unwrap();
    let err = env.store.signup_user(&user, "ada2", "pw").unwrap_err();
    assert!(matches!(err, Error::InvalidQuery { .. }));
}

#[test]
fn signup_errors_carry_service_codes() {
    let env = TestEnv::new();
    env.store.signup("ada", "pw").unwrap();

    assert_eq!(env.store.signup("ada", "pw").unwrap_err().code(), Some(202));
    assert_eq!(env.store.signup("", "pw").unwrap_err().code(), Some(200));
}

#[test]
fn login_returns_user_with_fresh_session() {
    let env = TestEnv::new();
    let signed_up = env.store.signup("ada", "pw").unwrap();

    let user = env.store.login("ada", "pw").unwrap();
    assert_eq!(user.id(), signed_up.id());
    assert!(user.is_loaded());
    assert_eq!(user.get("username").unwrap(), Value::from("ada"));
    assert!(!user.contains("password"));
    assert_ne!(token_of(&user), token_of(&signed_up));

    let request = env.service.requests().pop().unwrap();
    assert_eq!(request.method, Method::Get);
    assert_eq!(request.path, "login");
    assert_eq!(request.query_param("username"), Some("ada"));
}

#[test]
fn login_with_wrong_password_fails() {
    let env = TestEnv::new();
    env.store.signup("ada", "pw").unwrap();
    let err = env.store.login("ada", "wrong").unwrap_err();
    assert_eq!(err.code(), Some(OBJECT_NOT_FOUND));
}

// ============================================================================
// Sessions
// ============================================================================

#[test]
fn become_user_resumes_session() {
    let env = TestEnv::new();
    let user = env.store.signup("ada", "pw").unwrap();
    let token = token_of(&user);

    let resumed = env.store.become_user(&token).unwrap();
    assert_eq!(resumed.id(), user.id());
    assert_eq!(token_of(&resumed), token);

    let request = env.service.requests().pop().unwrap();
    assert_eq!(request.path, "users/me");
    assert_eq!(request.header("X-Parse-Session-Token"), Some(token.as_str()));
}

#[test]
fn become_user_with_unknown_token_fails() {
    let env = TestEnv::new();
    let err = env.store.become_user("r:bogus").unwrap_err();
    assert_eq!(err.code(), Some(209));
}

#[test]
fn logout_invalidates_session() {
    let env = TestEnv::new();
    let user = env.store.signup("ada", "pw").unwrap();
    let token = token_of(&user);

    env.store.logout(&user).unwrap();
    assert!(RecordStore::session_token(&user).is_none());
    assert!(dirty(&user).is_empty());
    assert_eq!(env.store.become_user(&token).unwrap_err().code(), Some(209));

    let err = env.store.logout(&user).unwrap_err();
    assert!(matches!(err, Error::InvalidQuery { .. }));
}

// ============================================================================
// Authorization
// ============================================================================

#[test]
fn user_saves_under_own_session() {
    let env = TestEnv::new();
    let user = env.store.signup("ada", "pw").unwrap();
    user.set("bio", "mathematician").unwrap();
    env.store.save(&user).unwrap();

    let request = env.service.requests().pop().unwrap();
    assert_eq!(request.method, Method::Put);
    assert_eq!(
        request.header("X-Parse-Session-Token"),
        Some(token_of(&user).as_str())
    );
    assert_eq!(body_of(&request), json!({"bio": "mathematician"}));
}

#[test]
fn saving_another_user_is_unauthorized() {
    let env = TestEnv::new();
    let ada = env.store.signup("ada", "pw").unwrap();
    let copy = env.store.get(USER_CLASS, &ada.id().unwrap()).unwrap();
    assert!(RecordStore::session_token(&copy).is_none());

    copy.set("bio", "impostor").unwrap();
    let err = env.store.save(&copy).unwrap_err();
    assert_eq!(err.code(), Some(206));
    assert_eq!(dirty(&copy), ["bio"]);
}

#[test]
fn scoped_session_authorizes_other_records() {
    let env = TestEnv::new();
    let ada = env.store.signup("ada", "pw").unwrap();
    let copy = env.store.get(USER_CLASS, &ada.id().unwrap()).unwrap();
    copy.set("bio", "scoped").unwrap();
    {
        let _session = env
            .store
            .client()
            .scoped(Credential::Session(token_of(&ada)));
        env.store.save(&copy).unwrap();
    }
    assert!(dirty(&copy).is_empty());

    copy.set("bio", "outside scope").unwrap();
    assert_eq!(env.store.save(&copy).unwrap_err().code(), Some(206));
}

#[test]
fn master_key_overrides_user_checks() {
    let env = TestEnv::with_config(ClientConfig::new("app", "rest").with_master_key("master"));
    let ada = env.store.signup("ada", "pw").unwrap();
    let copy = env.store.get(USER_CLASS, &ada.id().unwrap()).unwrap();
    copy.set("bio", "edited by admin").unwrap();
    env.store.save(&copy).unwrap();

    let request = env.service.requests().pop().unwrap();
    assert_eq!(request.header("X-Parse-Master-Key"), Some("master"));
    assert_eq!(request.header("X-Parse-Session-Token"), None);

    env.store.delete(&copy).unwrap();
    assert_eq!(env.service.object_count(USER_CLASS), 0);
}

#[test]
fn session_token_wins_over_master_key() {
    let env = TestEnv::with_config(ClientConfig::new("app", "rest").with_master_key("master"));
    let ada = env.store.signup("ada", "pw").unwrap();
    ada.set("bio", "own session").unwrap();
    env.store.save(&ada).unwrap();

    let request = env.service.requests().pop().unwrap();
    assert!(request.header("X-Parse-Session-Token").is_some());
    assert_eq!(request.header("X-Parse-Master-Key"), None);
}
