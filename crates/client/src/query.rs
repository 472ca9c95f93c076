//! Query builder
//!
//! A [`Query`] collects constraints for one class and turns them into the
//! `where`, `order`, `limit`, `skip`, `keys`, `include` and `count`
//! parameters. Results come back as a [`QuerySet`] that builds records as it
//! is iterated.
//!
//! A query restricted with [`Query::keys`] yields records that are not
//! loaded: reading a field that was not requested fails with
//! [`Error::AttributeNotFound`].

use std::collections::VecDeque;

use parsel_core::wire::{self, JsonMap};
use parsel_core::{Error, Pointer, Record, RecordClass, Result, TypeRegistry, Value};
use serde_json::{json, Value as JsonValue};
use tracing::debug;

use crate::store::{as_payload, endpoint, RecordStore};
use crate::transport::Method;

/// Filter, sort and paging for one class
#[derive(Debug, Clone)]
pub struct Query<'a> {
    store: &'a RecordStore,
    class: RecordClass,
    constraints: JsonMap,
    order: Vec<String>,
    limit: Option<usize>,
    skip: Option<usize>,
    keys: Option<Vec<String>>,
    include: Vec<String>,
}

impl RecordStore {
    /// Start a query on a class
    pub fn query(&self, class: &RecordClass) -> Query<'_> {
        Query {
            store: self,
            class: class.clone(),
            constraints: JsonMap::new(),
            order: Vec::new(),
            limit: None,
            skip: None,
            keys: None,
            include: Vec::new(),
        }
    }
}

/// Values in a filter must not need a save
fn encode_filter_value(value: &Value) -> Result<JsonValue> {
    let mut pointer_for = |record: &Record| -> Result<Pointer> {
        record.pointer().ok_or_else(|| Error::InvalidQuery {
            reason: format!("unsaved {} record cannot be used in a filter", record.class_name()),
        })
    };
    wire::encode_value(value, &mut pointer_for)
}

impl<'a> Query<'a> {
    /// Attribute equals `value`
    pub fn equal_to(mut self, attribute: &str, value: impl Into<Value>) -> Result<Self> {
        if self.constraints.contains_key(attribute) {
            return Err(Error::InvalidQuery {
                reason: format!("{} is already constrained", attribute),
            });
        }
        let encoded = encode_filter_value(&value.into())?;
        self.constraints.insert(attribute.to_string(), encoded);
        Ok(self)
    }

    /// Attribute differs from `value`
    pub fn not_equal_to(self, attribute: &str, value: impl Into<Value>) -> Result<Self> {
        let encoded = encode_filter_value(&value.into())?;
        self.operator(attribute, "$ne", encoded)
    }

    /// Attribute is greater than `value`
    pub fn greater_than(self, attribute: &str, value: impl Into<Value>) -> Result<Self> {
        let encoded = encode_filter_value(&value.into())?;
        self.operator(attribute, "$gt", encoded)
    }

    /// Attribute is greater than or equal to `value`
    pub fn greater_than_or_equal_to(self, attribute: &str, value: impl Into<Value>) -> Result<Self> {
        let encoded = encode_filter_value(&value.into())?;
        self.operator(attribute, "$gte", encoded)
    }

    /// Attribute is less than `value`
    pub fn less_than(self, attribute: &str, value: impl Into<Value>) -> Result<Self> {
        let encoded = encode_filter_value(&value.into())?;
        self.operator(attribute, "$lt", encoded)
    }

    /// Attribute is less than or equal to `value`
    pub fn less_than_or_equal_to(self, attribute: &str, value: impl Into<Value>) -> Result<Self> {
        let encoded = encode_filter_value(&value.into())?;
        self.operator(attribute, "$lte", encoded)
    }

    /// Attribute is one of `values`
    pub fn contained_in(self, attribute: &str, values: Vec<Value>) -> Result<Self> {
        let encoded = encode_filter_value(&Value::Array(values))?;
        self.operator(attribute, "$in", encoded)
    }

    /// Attribute is none of `values`
    pub fn not_contained_in(self, attribute: &str, values: Vec<Value>) -> Result<Self> {
        let encoded = encode_filter_value(&Value::Array(values))?;
        self.operator(attribute, "$nin", encoded)
    }

    /// Attribute is set
    pub fn exists(self, attribute: &str) -> Result<Self> {
        self.operator(attribute, "$exists", json!(true))
    }

    /// Attribute is not set
    pub fn does_not_exist(self, attribute: &str) -> Result<Self> {
        self.operator(attribute, "$exists", json!(false))
    }

    fn operator(mut self, attribute: &str, op: &str, argument: JsonValue) -> Result<Self> {
        let entry = self
            .constraints
            .entry(attribute.to_string())
            .or_insert_with(|| JsonValue::Object(JsonMap::new()));
        let operators = entry
            .as_object_mut()
            .filter(|ops| ops.keys().all(|k| k.starts_with('$')))
            .ok_or_else(|| Error::InvalidQuery {
                reason: format!("{} already has an equality constraint", attribute),
            })?;
        operators.insert(op.to_string(), argument);
        Ok(self)
    }

    /// Sort ascending by `attribute` (after earlier sort keys)
    pub fn order_by(mut self, attribute: &str) -> Self {
        self.order.push(attribute.to_string());
        self
    }

    /// Sort descending by `attribute` (after earlier sort keys)
    pub fn order_by_descending(mut self, attribute: &str) -> Self {
        self.order.push(format!("-{}", attribute));
        self
    }

    /// At most `limit` results
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skip the first `skip` results
    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = Some(skip);
        self
    }

    /// Only return these attributes; results will not be loaded
    pub fn keys<S: AsRef<str>>(mut self, keys: &[S]) -> Self {
        self.keys = Some(keys.iter().map(|k| k.as_ref().to_string()).collect());
        self
    }

    /// Return the record a pointer attribute refers to, fully embedded
    pub fn include(mut self, attribute: &str) -> Self {
        self.include.push(attribute.to_string());
        self
    }

    fn params(&self) -> Vec<(String, String)> {
        let mut params = Vec::new();
        if !self.constraints.is_empty() {
            params.push((
                "where".to_string(),
                JsonValue::Object(self.constraints.clone()).to_string(),
            ));
        }
        if !self.order.is_empty() {
            params.push(("order".to_string(), self.order.join(",")));
        }
        if let Some(limit) = self.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        if let Some(skip) = self.skip {
            params.push(("skip".to_string(), skip.to_string()));
        }
        if let Some(keys) = &self.keys {
            params.push(("keys".to_string(), keys.join(",")));
        }
        if !self.include.is_empty() {
            params.push(("include".to_string(), self.include.join(",")));
        }
        params
    }

    fn run(&self, extra: &[(&str, String)]) -> Result<JsonValue> {
        let mut request = endpoint(self.class.name(), None, Method::Get);
        for (name, value) in self.params() {
            request = request.param(name, value);
        }
        for (name, value) in extra {
            request = request.param(*name, value.clone());
        }
        debug!(target: "parsel::store", class = self.class.name(), params = ?request.params, "Running query");
        self.store.client().request(&request)
    }

    /// Run the query
    pub fn find(&self) -> Result<QuerySet<'a>> {
        let response = self.run(&[])?;
        let rows = as_payload(&response)?
            .get("results")
            .and_then(JsonValue::as_array)
            .ok_or_else(|| Error::invalid_wire("query response is missing 'results'"))?
            .iter()
            .map(|row| {
                row.as_object()
                    .cloned()
                    .ok_or_else(|| Error::invalid_wire("query result is not an object"))
            })
            .collect::<Result<VecDeque<_>>>()?;

        Ok(QuerySet {
            registry: self.store.registry(),
            class: self.class.clone(),
            loaded: self.keys.is_none(),
            rows,
        })
    }

    /// First result, if any
    pub fn first(&self) -> Result<Option<Record>> {
        let mut results = self.clone().limit(1).find()?;
        results.next().transpose()
    }

    /// Number of matching records, ignoring `limit` and `skip`
    pub fn count(&self) -> Result<usize> {
        let mut counting = self.clone();
        counting.skip = None;
        counting.limit = None;
        let response = counting.run(&[("count", "1".to_string()), ("limit", "0".to_string())])?;
        as_payload(&response)?
            .get("count")
            .and_then(JsonValue::as_u64)
            .map(|n| n as usize)
            .ok_or_else(|| Error::invalid_wire("count response is missing 'count'"))
    }

    /// Read one record by id, honoring `keys` and `include`
    pub fn get(&self, object_id: &str) -> Result<Record> {
        let mut request = endpoint(self.class.name(), Some(object_id), Method::Get);
        for (name, value) in self.params() {
            if name == "keys" || name == "include" {
                request = request.param(name, value);
            }
        }
        let response = self.store.client().request(&request)?;
        let record = self.class.create();
        record.unmarshal(self.store.registry(), as_payload(&response)?, self.keys.is_none())?;
        Ok(record)
    }
}

/// Query results, turned into records as they are iterated
#[derive(Debug)]
pub struct QuerySet<'a> {
    registry: &'a TypeRegistry,
    class: RecordClass,
    loaded: bool,
    rows: VecDeque<JsonMap>,
}

impl QuerySet<'_> {
    /// Results not yet consumed
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether every result has been consumed
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Whether records come out loaded
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }
}

impl Iterator for QuerySet<'_> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        let row = self.rows.pop_front()?;
        let record = self.class.create();
        Some(
            record
                .unmarshal(self.registry, &row, self.loaded)
                .map(|()| record),
        )
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.rows.len(), Some(self.rows.len()))
    }
}
