//! In-memory [`Store`]: one table per model, rows in insertion order.

use super::{id_key, relation_ids, same_id, slot_id, Populate, Query, Record, Sort, Store};
use crate::config::{Model, PkType};
use crate::error::StoreError;
use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    Find,
    Create,
    Update,
    Destroy,
}

#[derive(Debug, Default)]
struct Table {
    primary_key: String,
    rows: Vec<Record>,
}

impl Table {
    fn position(&self, id: &Value) -> Option<usize> {
        self.rows
            .iter()
            .position(|r| r.get(&self.primary_key).is_some_and(|v| same_id(v, id)))
    }

    fn get(&self, id: &Value) -> Option<&Record> {
        self.position(id).map(|i| &self.rows[i])
    }

    fn next_int_id(&self) -> i64 {
        self.rows
            .iter()
            .filter_map(|r| r.get(&self.primary_key).and_then(Value::as_i64))
            .max()
            .unwrap_or(0)
            + 1
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, Table>>,
    failures: std::sync::Mutex<HashSet<(String, Operation)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `op` on `model` fail with [`StoreError::Backend`] until [`clear_failures`](Self::clear_failures).
    pub fn inject_failure(&self, model: &str, op: Operation) {
        if let Ok(mut f) = self.failures.lock() {
            f.insert((model.to_string(), op));
        }
    }

    pub fn clear_failures(&self) {
        if let Ok(mut f) = self.failures.lock() {
            f.clear();
        }
    }

    /// Number of rows currently stored for `model`.
    pub async fn count(&self, model: &str) -> usize {
        self.tables.read().await.get(model).map_or(0, |t| t.rows.len())
    }

    fn check(&self, model: &str, op: Operation) -> Result<(), StoreError> {
        let failing = self
            .failures
            .lock()
            .map(|f| f.contains(&(model.to_string(), op)))
            .unwrap_or(false);
        if failing {
            return Err(StoreError::Backend(format!("injected {:?} failure on {}", op, model)));
        }
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn find(&self, model: &Model, query: &Query) -> Result<Vec<Record>, StoreError> {
        self.check(&model.name, Operation::Find)?;
        tracing::debug!(model = %model.name, criteria = ?query.criteria, "find");
        let tables = self.tables.read().await;
        let Some(table) = tables.get(&model.name) else {
            return Ok(Vec::new());
        };

        let mut rows: Vec<Record> = table
            .rows
            .iter()
            .filter(|r| matches_criteria(r, &query.criteria))
            .cloned()
            .collect();
        if let Some(sort) = &query.sort {
            let keys = sort_keys(sort);
            rows.sort_by(|a, b| compare_rows(a, b, &keys));
        }
        let limit = query.limit.map_or(usize::MAX, |l| l as usize);
        let mut rows: Vec<Record> = rows.into_iter().skip(query.skip as usize).take(limit).collect();

        for populate in &query.populate {
            for row in rows.iter_mut() {
                populate_row(row, populate, &tables);
            }
        }
        Ok(rows)
    }

    async fn create(&self, model: &Model, mut values: Record) -> Result<Record, StoreError> {
        self.check(&model.name, Operation::Create)?;
        tracing::debug!(model = %model.name, "create");
        let mut tables = self.tables.write().await;
        let table = tables.entry(model.name.clone()).or_insert_with(|| Table {
            primary_key: model.primary_key.clone(),
            rows: Vec::new(),
        });

        let pk = &model.primary_key;
        match values.get(pk) {
            Some(id) if !id.is_null() => {
                if table.position(id).is_some() {
                    return Err(StoreError::Conflict(format!("{} {} already exists", model.name, id)));
                }
            }
            _ => {
                let id = match model.pk_type {
                    PkType::Int => Value::from(table.next_int_id()),
                    PkType::Text | PkType::Uuid => Value::String(uuid::Uuid::new_v4().to_string()),
                };
                values.insert(pk.clone(), id);
            }
        }

        let now = Value::String(chrono::Utc::now().to_rfc3339());
        values.entry("created_at").or_insert_with(|| now.clone());
        values.insert("updated_at".into(), now);
        table.rows.push(values.clone());
        Ok(values)
    }

    async fn update(&self, model: &Model, id: &Value, values: Record) -> Result<Option<Record>, StoreError> {
        self.check(&model.name, Operation::Update)?;
        tracing::debug!(model = %model.name, id = %id, "update");
        let mut tables = self.tables.write().await;
        let Some(table) = tables.get_mut(&model.name) else {
            return Ok(None);
        };
        let Some(i) = table.position(id) else {
            return Ok(None);
        };
        let row = &mut table.rows[i];
        for (k, v) in values {
            if k != model.primary_key {
                row.insert(k, v);
            }
        }
        row.insert("updated_at".into(), Value::String(chrono::Utc::now().to_rfc3339()));
        Ok(Some(row.clone()))
    }

    async fn destroy(&self, model: &Model, id: &Value) -> Result<Option<Record>, StoreError> {
        self.check(&model.name, Operation::Destroy)?;
        tracing::debug!(model = %model.name, id = %id, "destroy");
        let mut tables = self.tables.write().await;
        let Some(table) = tables.get_mut(&model.name) else {
            return Ok(None);
        };
        Ok(table.position(id).map(|i| table.rows.remove(i)))
    }
}

fn matches_criteria(row: &Record, criteria: &super::Criteria) -> bool {
    criteria.iter().all(|(field, expected)| {
        let actual = row.get(field).unwrap_or(&Value::Null);
        match expected {
            Value::Null => actual.is_null(),
            Value::Array(options) => options.iter().any(|o| field_eq(actual, o)),
            other => field_eq(actual, other),
        }
    })
}

fn field_eq(actual: &Value, expected: &Value) -> bool {
    if id_key(actual).is_some() && id_key(expected).is_some() {
        same_id(actual, expected)
    } else {
        actual == expected
    }
}

fn sort_keys(sort: &Sort) -> Vec<(String, bool)> {
    match sort {
        Sort::Raw(s) => s
            .split(',')
            .filter_map(|part| {
                let mut it = part.split_whitespace();
                let field = it.next()?;
                let desc = it.next().is_some_and(|d| d.eq_ignore_ascii_case("desc"));
                Some((field.to_string(), desc))
            })
            .collect(),
        Sort::Fields(fields) => fields
            .iter()
            .map(|(field, dir)| {
                let desc = match dir {
                    Value::Number(n) => n.as_i64().is_some_and(|n| n < 0),
                    Value::String(s) => s.eq_ignore_ascii_case("desc"),
                    _ => false,
                };
                (field.clone(), desc)
            })
            .collect(),
    }
}

fn compare_rows(a: &Record, b: &Record, keys: &[(String, bool)]) -> Ordering {
    for (field, desc) in keys {
        let ord = compare_values(a.get(field), b.get(field));
        let ord = if *desc { ord.reverse() } else { ord };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None | Some(Value::Null), None | Some(Value::Null)) => Ordering::Equal,
        (None | Some(Value::Null), _) => Ordering::Less,
        (_, None | Some(Value::Null)) => Ordering::Greater,
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
    }
}

fn populate_row(row: &mut Record, populate: &Populate, tables: &HashMap<String, Table>) {
    let target = tables.get(&populate.target);
    let current = row.get(&populate.alias).cloned().unwrap_or(Value::Null);
    let target_pk = target.map_or("id", |t| t.primary_key.as_str());

    let populated = if populate.plural {
        let records = relation_ids(&current, target_pk)
            .iter()
            .filter_map(|id| target.and_then(|t| t.get(id)))
            .take(populate.limit as usize)
            .cloned()
            .map(Value::Object)
            .collect();
        Value::Array(records)
    } else {
        slot_id(&current, target_pk)
            .and_then(|id| target.and_then(|t| t.get(id)))
            .cloned()
            .map_or(Value::Null, Value::Object)
    };
    row.insert(populate.alias.clone(), populated);
}
