//! In-process emulation of the remote service
//!
//! [`MemoryTransport`] answers the same REST calls the real service does,
//! from an in-memory object table. It covers what the client issues:
//!
//! - `classes/<class>[/<id>]`: create, read, update (`{"__op":"Delete"}`
//!   removes a field), delete and query
//! - query parameters `where`, `order`, `limit`, `skip`, `keys`, `include`
//!   and `count`
//! - `users` signup, `login`, `logout` and `users/me`, with session tokens
//!
//! Errors use the service's codes: 101 (object not found or bad login),
//! 102 (invalid query), 200/201 (missing username/password), 202 (username
//! taken), 206 (user not modifiable without its session), 209 (invalid
//! session token).
//!
//! `fail_next(n)` makes the next `n` sends fail at the transport level, and
//! every request is kept in a log for inspection.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

use parking_lot::Mutex;
use parsel_core::wire::{is_delete_op, JsonMap, OBJECT_TAG, TYPE_KEY};
use parsel_core::{Date, USER_CLASS};
use serde_json::{json, Value as JsonValue};
use tracing::debug;
use uuid::Uuid;

use crate::client::{HEADER_MASTER_KEY, HEADER_SESSION_TOKEN};
use crate::transport::{HttpRequest, HttpResponse, Method, Transport, TransportError};

/// Default page size of a query without `limit`
pub const DEFAULT_LIMIT: usize = 100;

const META_FIELDS: [&str; 3] = ["objectId", "createdAt", "updatedAt"];

/// Application error reply
#[derive(Debug)]
struct Failure {
    status: u16,
    code: i64,
    message: String,
}

impl Failure {
    fn new(status: u16, code: i64, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    fn not_found() -> Self {
        Self::new(404, 101, "object not found")
    }

    fn invalid_query(message: impl Into<String>) -> Self {
        Self::new(400, 102, message)
    }

    fn invalid_session() -> Self {
        Self::new(400, 209, "invalid session token")
    }
}

type Reply = Result<(u16, JsonValue), Failure>;

#[derive(Default)]
struct ServerState {
    classes: HashMap<String, Vec<JsonMap>>,
    /// session token -> user objectId
    sessions: HashMap<String, String>,
}

/// In-memory stand-in for the remote service
#[derive(Default)]
pub struct MemoryTransport {
    state: Mutex<ServerState>,
    pending_failures: AtomicUsize,
    log: Mutex<Vec<HttpRequest>>,
}

impl MemoryTransport {
    /// Empty service
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` sends with a transport error
    pub fn fail_next(&self, n: usize) {
        self.pending_failures.store(n, AtomicOrdering::SeqCst);
    }

    /// Every request received so far, oldest first
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.log.lock().clone()
    }

    /// Number of requests received so far
    pub fn request_count(&self) -> usize {
        self.log.lock().len()
    }

    /// Forget the request log
    pub fn clear_log(&self) {
        self.log.lock().clear();
    }

    /// Stored form of an object, as the service holds it
    pub fn stored(&self, class_name: &str, object_id: &str) -> Option<JsonMap> {
        let state = self.state.lock();
        state
            .objects(class_name)
            .iter()
            .find(|o| id_of(o) == Some(object_id))
            .cloned()
    }

    /// Number of stored objects of a class
    pub fn object_count(&self, class_name: &str) -> usize {
        self.state.lock().objects(class_name).len()
    }

    /// Overwrite fields of a stored object, as another client would
    pub fn patch(&self, class_name: &str, object_id: &str, fields: JsonValue) -> bool {
        let mut state = self.state.lock();
        let object = state
            .classes
            .get_mut(class_name)
            .and_then(|objects| objects.iter_mut().find(|o| id_of(o) == Some(object_id)));
        match (object, fields) {
            (Some(object), JsonValue::Object(fields)) => {
                object.extend(fields);
                object.insert("updatedAt".to_string(), json!(now()));
                true
            }
            _ => false,
        }
    }

    fn take_failure(&self) -> bool {
        self.pending_failures
            .fetch_update(AtomicOrdering::SeqCst, AtomicOrdering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn dispatch(&self, request: &HttpRequest) -> Reply {
        let body = match request.body.as_deref() {
            Some(text) => match serde_json::from_str::<JsonValue>(text) {
                Ok(JsonValue::Object(map)) => map,
                _ => return Err(Failure::new(400, 107, "invalid JSON body")),
            },
            None => JsonMap::new(),
        };

        let segments: Vec<&str> = request.path.split('/').collect();
        let mut state = self.state.lock();
        match (request.method, segments.as_slice()) {
            (Method::Get, ["classes", class]) => state.query(class, request),
            (Method::Post, ["classes", class]) => state.create(class, body),
            (Method::Get, ["classes", class, id]) => state.read(class, id, request),
            (Method::Put, ["classes", class, id]) => state.update(class, id, body),
            (Method::Delete, ["classes", class, id]) => state.delete(class, id),
            (Method::Post, ["users"]) => state.signup(body),
            (Method::Get, ["users"]) => state.query(USER_CLASS, request),
            (Method::Get, ["users", "me"]) => state.me(request),
            (Method::Get, ["users", id]) => state.read(USER_CLASS, id, request),
            (Method::Put, ["users", id]) => {
                state.authorize_user(id, request)?;
                state.update(USER_CLASS, id, body)
            }
            (Method::Delete, ["users", id]) => {
                state.authorize_user(id, request)?;
                let reply = state.delete(USER_CLASS, id)?;
                state.sessions.retain(|_, user| user.as_str() != *id);
                Ok(reply)
            }
            (Method::Get, ["login"]) => state.login(request),
            (Method::Post, ["logout"]) => state.logout(request),
            (method, _) => Err(Failure::new(
                404,
                1,
                format!("unsupported route: {} {}", method, request.path),
            )),
        }
    }
}

impl Transport for MemoryTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        self.log.lock().push(request.clone());
        if self.take_failure() {
            debug!(target: "parsel::memory", path = %request.path, "Injected transport failure");
            return Err(TransportError::new("injected transport failure"));
        }

        let response = match self.dispatch(request) {
            Ok((status, body)) => HttpResponse::json(status, &body),
            Err(failure) => HttpResponse::json(
                failure.status,
                &json!({"code": failure.code, "error": failure.message}),
            ),
        };
        debug!(
            target: "parsel::memory",
            method = %request.method,
            path = %request.path,
            status = response.status,
            "Handled request"
        );
        Ok(response)
    }
}

// =============================================================================
// Object table
// =============================================================================

impl ServerState {
    fn objects(&self, class_name: &str) -> &[JsonMap] {
        self.classes
            .get(class_name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn find(&self, class_name: &str, id: &str) -> Option<&JsonMap> {
        self.objects(class_name).iter().find(|o| id_of(o) == Some(id))
    }

    fn find_mut(&mut self, class_name: &str, id: &str) -> Option<&mut JsonMap> {
        self.classes
            .get_mut(class_name)?
            .iter_mut()
            .find(|o| id_of(o) == Some(id))
    }

    fn insert(&mut self, class_name: &str, fields: JsonMap) -> JsonMap {
        let mut object = JsonMap::new();
        apply_fields(&mut object, fields);
        let stamp = now();
        object.insert("objectId".to_string(), json!(new_object_id()));
        object.insert("createdAt".to_string(), json!(stamp));
        object.insert("updatedAt".to_string(), json!(stamp));
        self.classes
            .entry(class_name.to_string())
            .or_default()
            .push(object.clone());
        object
    }

    fn create(&mut self, class_name: &str, body: JsonMap) -> Reply {
        let object = self.insert(class_name, body);
        Ok((
            201,
            json!({"objectId": object["objectId"], "createdAt": object["createdAt"]}),
        ))
    }

    fn read(&self, class_name: &str, id: &str, request: &HttpRequest) -> Reply {
        let object = self.find(class_name, id).ok_or_else(Failure::not_found)?;
        let keys = request.query_param("keys").map(|_| list_param(request, "keys"));
        let include = list_param(request, "include");
        Ok((200, JsonValue::Object(self.render(object, keys.as_deref(), &include))))
    }

    fn update(&mut self, class_name: &str, id: &str, body: JsonMap) -> Reply {
        let object = self.find_mut(class_name, id).ok_or_else(Failure::not_found)?;
        apply_fields(object, body);
        let stamp = now();
        object.insert("updatedAt".to_string(), json!(stamp));
        Ok((200, json!({"updatedAt": stamp})))
    }

    fn delete(&mut self, class_name: &str, id: &str) -> Reply {
        let objects = self
            .classes
            .get_mut(class_name)
            .ok_or_else(Failure::not_found)?;
        let index = objects
            .iter()
            .position(|o| id_of(o) == Some(id))
            .ok_or_else(Failure::not_found)?;
        objects.remove(index);
        Ok((200, json!({})))
    }

    /// Client-visible form: no password, optional projection, included pointers
    fn render(&self, object: &JsonMap, keys: Option<&[String]>, include: &[String]) -> JsonMap {
        let mut out = object.clone();
        out.remove("password");
        if let Some(keys) = keys {
            out.retain(|k, _| META_FIELDS.contains(&k.as_str()) || keys.contains(k));
        }
        for field in include {
            let target = out.get(field).and_then(pointer_target);
            if let Some((class_name, id)) = target {
                if let Some(found) = self.find(&class_name, &id) {
                    let mut embedded = self.render(found, None, &[]);
                    embedded.insert(TYPE_KEY.to_string(), json!(OBJECT_TAG));
                    embedded.insert("className".to_string(), json!(class_name));
                    out.insert(field.clone(), JsonValue::Object(embedded));
                }
            }
        }
        out
    }

    // =========================================================================
    // Queries
    // =========================================================================

    fn query(&self, class_name: &str, request: &HttpRequest) -> Reply {
        let constraints = match request.query_param("where") {
            Some(text) => match serde_json::from_str::<JsonValue>(text) {
                Ok(JsonValue::Object(map)) => map,
                _ => return Err(Failure::invalid_query("where must be a JSON object")),
            },
            None => JsonMap::new(),
        };

        let mut matched = Vec::new();
        for object in self.objects(class_name) {
            if matches(object, &constraints)? {
                matched.push(object);
            }
        }

        if let Some(order) = request.query_param("order") {
            let fields: Vec<(&str, bool)> = order
                .split(',')
                .filter(|f| !f.is_empty())
                .map(|f| match f.strip_prefix('-') {
                    Some(name) => (name, true),
                    None => (f, false),
                })
                .collect();
            matched.sort_by(|a, b| {
                for (field, descending) in &fields {
                    let ord = order_values(a.get(*field), b.get(*field));
                    let ord = if *descending { ord.reverse() } else { ord };
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            });
        }

        let total = matched.len();
        let skip = usize_param(request, "skip")?.unwrap_or(0);
        let limit = usize_param(request, "limit")?.unwrap_or(DEFAULT_LIMIT);
        let keys = request.query_param("keys").map(|_| list_param(request, "keys"));
        let include = list_param(request, "include");

        let results: Vec<JsonValue> = matched
            .into_iter()
            .skip(skip)
            .take(limit)
            .map(|o| JsonValue::Object(self.render(o, keys.as_deref(), &include)))
            .collect();

        let mut reply = json!({ "results": results });
        if request.query_param("count") == Some("1") {
            reply["count"] = json!(total);
        }
        Ok((200, reply))
    }

    // =========================================================================
    // Users and sessions
    // =========================================================================

    fn open_session(&mut self, user_id: &str) -> String {
        let token = format!("r:{}", Uuid::new_v4().simple());
        self.sessions.insert(token.clone(), user_id.to_string());
        token
    }

    fn session_user(&self, request: &HttpRequest) -> Result<String, Failure> {
        request
            .header(HEADER_SESSION_TOKEN)
            .and_then(|token| self.sessions.get(token))
            .cloned()
            .ok_or_else(Failure::invalid_session)
    }

    fn signup(&mut self, body: JsonMap) -> Reply {
        let username = match body.get("username").and_then(JsonValue::as_str) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => return Err(Failure::new(400, 200, "bad or missing username")),
        };
        if !body.get("password").map_or(false, JsonValue::is_string) {
            return Err(Failure::new(400, 201, "password is required"));
        }
        let taken = self
            .objects(USER_CLASS)
            .iter()
            .any(|u| u.get("username").and_then(JsonValue::as_str) == Some(username.as_str()));
        if taken {
            return Err(Failure::new(
                400,
                202,
                format!("username {} already taken", username),
            ));
        }

        let user = self.insert(USER_CLASS, body);
        let id = id_of(&user).unwrap_or_default().to_string();
        let token = self.open_session(&id);
        Ok((
            201,
            json!({
                "objectId": id,
                "createdAt": user["createdAt"],
                "sessionToken": token
            }),
        ))
    }

    fn login(&mut self, request: &HttpRequest) -> Reply {
        let username = request.query_param("username");
        let password = request.query_param("password");
        let user = self
            .objects(USER_CLASS)
            .iter()
            .find(|u| {
                u.get("username").and_then(JsonValue::as_str) == username
                    && u.get("password").and_then(JsonValue::as_str) == password
            })
            .cloned()
            .ok_or_else(|| Failure::new(404, 101, "invalid username/password"))?;

        let id = id_of(&user).unwrap_or_default().to_string();
        let token = self.open_session(&id);
        let mut out = self.render(&user, None, &[]);
        out.insert("sessionToken".to_string(), json!(token));
        Ok((200, JsonValue::Object(out)))
    }

    fn me(&self, request: &HttpRequest) -> Reply {
        let id = self.session_user(request)?;
        let user = self
            .find(USER_CLASS, &id)
            .ok_or_else(Failure::invalid_session)?;
        let mut out = self.render(user, None, &[]);
        if let Some(token) = request.header(HEADER_SESSION_TOKEN) {
            out.insert("sessionToken".to_string(), json!(token));
        }
        Ok((200, JsonValue::Object(out)))
    }

    fn logout(&mut self, request: &HttpRequest) -> Reply {
        let token = request
            .header(HEADER_SESSION_TOKEN)
            .ok_or_else(Failure::invalid_session)?;
        self.sessions
            .remove(token)
            .ok_or_else(Failure::invalid_session)?;
        Ok((200, json!({})))
    }

    fn authorize_user(&self, id: &str, request: &HttpRequest) -> Result<(), Failure> {
        if request.header(HEADER_MASTER_KEY).is_some() {
            return Ok(());
        }
        if request.header(HEADER_SESSION_TOKEN).is_none() {
            return Err(Failure::new(400, 206, format!("cannot modify user {}", id)));
        }
        if self.session_user(request)? != id {
            return Err(Failure::new(400, 206, format!("cannot modify user {}", id)));
        }
        Ok(())
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn now() -> String {
    Date::now().to_iso()
}

fn new_object_id() -> String {
    Uuid::new_v4().simple().to_string()[..10].to_string()
}

fn id_of(object: &JsonMap) -> Option<&str> {
    object.get("objectId").and_then(JsonValue::as_str)
}

fn apply_fields(object: &mut JsonMap, fields: JsonMap) {
    for (key, value) in fields {
        if META_FIELDS.contains(&key.as_str()) {
            continue;
        }
        if is_delete_op(&value) {
            object.remove(&key);
        } else {
            object.insert(key, value);
        }
    }
}

fn list_param(request: &HttpRequest, name: &str) -> Vec<String> {
    request
        .query_param(name)
        .map(|v| {
            v.split(',')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn usize_param(request: &HttpRequest, name: &str) -> Result<Option<usize>, Failure> {
    request
        .query_param(name)
        .map(|v| {
            v.parse::<usize>()
                .map_err(|_| Failure::invalid_query(format!("{} must be a non-negative integer", name)))
        })
        .transpose()
}

fn pointer_target(value: &JsonValue) -> Option<(String, String)> {
    let map = value.as_object()?;
    if map.get(TYPE_KEY).and_then(JsonValue::as_str) != Some("Pointer") {
        return None;
    }
    let class_name = map.get("className")?.as_str()?;
    let id = map.get("objectId")?.as_str()?;
    Some((class_name.to_string(), id.to_string()))
}

// =============================================================================
// Constraint evaluation
// =============================================================================

fn matches(object: &JsonMap, constraints: &JsonMap) -> Result<bool, Failure> {
    for (field, condition) in constraints {
        let actual = object.get(field);
        let operators = condition
            .as_object()
            .filter(|ops| ops.keys().any(|k| k.starts_with('$')));
        let ok = match operators {
            Some(ops) => {
                let mut all = true;
                for (op, arg) in ops {
                    if !evaluate(op, actual, arg)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            None => equals(actual, condition),
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn evaluate(op: &str, actual: Option<&JsonValue>, arg: &JsonValue) -> Result<bool, Failure> {
    let candidates = |arg: &JsonValue| {
        arg.as_array()
            .cloned()
            .ok_or_else(|| Failure::invalid_query(format!("{} expects an array", op)))
    };
    Ok(match op {
        "$ne" => !equals(actual, arg),
        "$gt" => compare(actual, arg) == Some(Ordering::Greater),
        "$gte" => matches!(compare(actual, arg), Some(Ordering::Greater | Ordering::Equal)),
        "$lt" => compare(actual, arg) == Some(Ordering::Less),
        "$lte" => matches!(compare(actual, arg), Some(Ordering::Less | Ordering::Equal)),
        "$in" => candidates(arg)?.iter().any(|v| equals(actual, v)),
        "$nin" => !candidates(arg)?.iter().any(|v| equals(actual, v)),
        "$exists" => {
            let wanted = arg
                .as_bool()
                .ok_or_else(|| Failure::invalid_query("$exists expects a boolean"))?;
            actual.is_some() == wanted
        }
        other => return Err(Failure::invalid_query(format!("unsupported operator {}", other))),
    })
}

fn json_eq(a: &JsonValue, b: &JsonValue) -> bool {
    match (a, b) {
        (JsonValue::Number(x), JsonValue::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// Equality as the service applies it: arrays match any of their elements
fn equals(actual: Option<&JsonValue>, expected: &JsonValue) -> bool {
    match actual {
        None => expected.is_null(),
        Some(JsonValue::Array(items)) if !expected.is_array() => {
            items.iter().any(|item| json_eq(item, expected))
        }
        Some(value) => json_eq(value, expected),
    }
}

enum SortKey {
    Number(f64),
    Text(String),
}

fn sort_key(value: &JsonValue) -> Option<SortKey> {
    match value {
        JsonValue::Number(n) => n.as_f64().map(SortKey::Number),
        JsonValue::String(s) => Some(SortKey::Text(s.clone())),
        JsonValue::Bool(b) => Some(SortKey::Number(if *b { 1.0 } else { 0.0 })),
        JsonValue::Object(map) if map.get(TYPE_KEY).and_then(JsonValue::as_str) == Some("Date") => {
            map.get("iso").and_then(JsonValue::as_str).map(|s| SortKey::Text(s.to_string()))
        }
        _ => None,
    }
}

fn compare(actual: Option<&JsonValue>, arg: &JsonValue) -> Option<Ordering> {
    match (sort_key(actual?)?, sort_key(arg)?) {
        (SortKey::Number(a), SortKey::Number(b)) => a.partial_cmp(&b),
        (SortKey::Text(a), SortKey::Text(b)) => Some(a.cmp(&b)),
        _ => None,
    }
}

/// Missing values sort first
fn order_values(a: Option<&JsonValue>, b: Option<&JsonValue>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => compare(Some(x), y).unwrap_or(Ordering::Equal),
    }
}
