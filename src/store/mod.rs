//! Store contract the registry dispatches to, plus identifier helpers shared by implementations.
//!
//! Criteria semantics every store must honour:
//! - a scalar criterion matches records whose field equals it (identifiers compare loosely, see [`same_id`]);
//! - a list criterion matches records whose field equals any element;
//! - a null criterion matches records where the field is null or absent.
//!
//! `update` merges the given values into the stored record. Population replaces a singular
//! relation id with the target record (null when missing) and a plural id list with at most
//! `limit` target records.

mod memory;

pub use memory::{MemoryStore, Operation};

use crate::config::{Association, Model};
use crate::error::StoreError;
use async_trait::async_trait;
use serde_json::{Map, Value};

pub type Record = Map<String, Value>;
pub type Criteria = Map<String, Value>;

#[derive(Clone, Debug, PartialEq)]
pub enum Sort {
    /// e.g. `"name DESC, age"`
    Raw(String),
    /// e.g. `{ "name": -1, "age": "asc" }`
    Fields(Map<String, Value>),
}

/// Resolve one association to its target record(s) when reading.
#[derive(Clone, Debug, PartialEq)]
pub struct Populate {
    pub alias: String,
    pub target: String,
    pub plural: bool,
    pub limit: u64,
}

impl Populate {
    pub fn new(association: &Association, limit: u64) -> Self {
        Populate {
            alias: association.alias.clone(),
            target: association.target.clone(),
            plural: association.nature.is_plural(),
            limit,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Query {
    pub criteria: Criteria,
    pub limit: Option<u64>,
    pub skip: u64,
    pub sort: Option<Sort>,
    pub populate: Vec<Populate>,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn find(&self, model: &Model, query: &Query) -> Result<Vec<Record>, StoreError>;

    /// Assigns a primary key when `values` has none.
    async fn create(&self, model: &Model, values: Record) -> Result<Record, StoreError>;

    async fn update(&self, model: &Model, id: &Value, values: Record) -> Result<Option<Record>, StoreError>;

    async fn destroy(&self, model: &Model, id: &Value) -> Result<Option<Record>, StoreError>;
}

/// Canonical text form of an identifier; `None` for values that cannot be identifiers.
pub fn id_key(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// `7` and `"7"` name the same record.
pub fn same_id(a: &Value, b: &Value) -> bool {
    match (id_key(a), id_key(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

/// Identifier held in a relation slot: a raw id, or a populated record's primary key.
pub fn slot_id<'a>(slot: &'a Value, target_pk: &str) -> Option<&'a Value> {
    match slot {
        Value::Null => None,
        Value::Object(record) => record.get(target_pk).filter(|v| !v.is_null()),
        other => Some(other),
    }
}

/// Identifiers held by a plural relation value (raw or populated).
pub fn relation_ids(value: &Value, target_pk: &str) -> Vec<Value> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| slot_id(item, target_pk).cloned())
            .collect(),
        other => slot_id(other, target_pk).cloned().into_iter().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ids_compare_loosely() {
        assert!(same_id(&json!(7), &json!("7")));
        assert!(!same_id(&json!(7), &json!(8)));
        assert!(same_id(&Value::Null, &Value::Null));
    }

    #[test]
    fn relation_ids_accept_raw_and_populated() {
        let v = json!([1, { "id": 2, "name": "b" }, null]);
        assert_eq!(relation_ids(&v, "id"), vec![json!(1), json!(2)]);
        assert_eq!(relation_ids(&json!({ "id": 5 }), "id"), vec![json!(5)]);
        assert!(relation_ids(&Value::Null, "id").is_empty());
    }
}
