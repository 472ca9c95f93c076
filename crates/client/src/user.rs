//! User accounts and sessions
//!
//! Users are `_User` records served from the `users` route. `username`,
//! `sessionToken` and `emailVerified` are written by the service only: they
//! are stored on the record but never dirtied, so a save never sends them.
//! A user record with a session token saves, fetches and deletes under that
//! session.

use parsel_core::{Error, Record, Result, Value, USER_CLASS};
use serde_json::Value as JsonValue;
use tracing::info;

use crate::client::{Request, Route};
use crate::credentials::Credential;
use crate::store::{as_payload, endpoint, session_of, RecordStore, SESSION_TOKEN_FIELD};
use crate::transport::Method;

impl RecordStore {
    /// New, unsaved user record
    pub fn new_user(&self) -> Result<Record> {
        Ok(self.registry().resolve_class(USER_CLASS)?.create())
    }

    /// Create an account and log it in
    pub fn signup(&self, username: &str, password: &str) -> Result<Record> {
        let user = self.new_user()?;
        self.signup_user(&user, username, password)?;
        Ok(user)
    }

    /// Create an account from an unsaved user record, sending its dirty
    /// fields along
    pub fn signup_user(&self, user: &Record, username: &str, password: &str) -> Result<()> {
        if user.id().is_some() {
            return Err(Error::InvalidQuery {
                reason: "user is already signed up".to_string(),
            });
        }
        let mut body = user.marshal_dirty(&mut |nested: &Record| self.to_pointer(nested))?;
        body.insert("username".to_string(), JsonValue::from(username));
        body.insert("password".to_string(), JsonValue::from(password));

        let request = endpoint(USER_CLASS, None, Method::Post).body(JsonValue::Object(body));
        let response = self.client().request(&request)?;
        user.apply_save(self.registry(), as_payload(&response)?)?;
        user.set("username", username)?;
        info!(target: "parsel::store", id = ?user.id(), "Signed up user");
        Ok(())
    }

    /// Log in, returning the loaded user with its session token
    pub fn login(&self, username: &str, password: &str) -> Result<Record> {
        let request = Request::new(Route::Login, Method::Get)
            .param("username", username)
            .param("password", password);
        let response = self.client().request(&request)?;
        let user = self.new_user()?;
        user.refresh(self.registry(), as_payload(&response)?)?;
        info!(target: "parsel::store", id = ?user.id(), "Logged in");
        Ok(user)
    }

    /// Resume the session identified by `session_token`
    pub fn become_user(&self, session_token: &str) -> Result<Record> {
        let response = {
            let _session = self
                .client()
                .scoped(Credential::Session(session_token.to_string()));
            self.client()
                .request(&endpoint(USER_CLASS, Some("me"), Method::Get))?
        };
        let user = self.new_user()?;
        user.refresh(self.registry(), as_payload(&response)?)?;
        if user.try_get(SESSION_TOKEN_FIELD).is_none() {
            user.set(SESSION_TOKEN_FIELD, session_token)?;
        }
        Ok(user)
    }

    /// End the user's session and forget its token
    pub fn logout(&self, user: &Record) -> Result<()> {
        let credential = session_of(user).ok_or_else(|| Error::InvalidQuery {
            reason: "user has no session token".to_string(),
        })?;
        let request = Request::new(Route::Logout, Method::Post).credential(Some(credential));
        self.client().request(&request)?;
        user.unset(SESSION_TOKEN_FIELD)?;
        info!(target: "parsel::store", id = ?user.id(), "Logged out");
        Ok(())
    }

    /// Session token of a user record
    pub fn session_token(user: &Record) -> Option<String> {
        match user.try_get(SESSION_TOKEN_FIELD) {
            Some(Value::String(token)) => Some(token),
            _ => None,
        }
    }
}
