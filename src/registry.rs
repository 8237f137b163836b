//! Model registry: model handles keyed by name, each bound to the shared store.

use crate::config::{Association, Model};
use crate::error::StoreError;
use crate::store::{Criteria, Populate, Query, Record, Sort, Store};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

pub struct ModelRegistry {
    models: HashMap<String, Arc<Model>>,
    store: Arc<dyn Store>,
}

impl ModelRegistry {
    pub fn new(models: Vec<Model>, store: Arc<dyn Store>) -> Self {
        let models = models
            .into_iter()
            .map(|m| (m.name.clone(), Arc::new(m)))
            .collect();
        ModelRegistry { models, store }
    }

    pub fn lookup(&self, name: &str) -> Option<ModelHandle> {
        self.models.get(name).map(|model| ModelHandle {
            model: Arc::clone(model),
            store: Arc::clone(&self.store),
        })
    }

    pub fn models(&self) -> impl Iterator<Item = &Model> {
        self.models.values().map(|m| m.as_ref())
    }
}

/// A model plus the store its records live in. Cheap to clone.
#[derive(Clone)]
pub struct ModelHandle {
    model: Arc<Model>,
    store: Arc<dyn Store>,
}

impl std::fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHandle").field("model", &self.model.name).finish()
    }
}

impl ModelHandle {
    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn name(&self) -> &str {
        &self.model.name
    }

    pub fn primary_key(&self) -> &str {
        &self.model.primary_key
    }

    pub fn associations(&self) -> &[Association] {
        &self.model.associations
    }

    pub fn find(&self, criteria: Criteria) -> Find {
        Find {
            handle: self.clone(),
            query: Query {
                criteria,
                ..Query::default()
            },
        }
    }

    pub fn find_one(&self, id: &Value) -> FindOne {
        let mut criteria = Criteria::new();
        criteria.insert(self.model.primary_key.clone(), id.clone());
        FindOne {
            inner: self.find(criteria).limit(1),
        }
    }

    pub async fn create(&self, values: Record) -> Result<Record, StoreError> {
        self.store.create(&self.model, values).await
    }

    pub async fn update(&self, id: &Value, values: Record) -> Result<Option<Record>, StoreError> {
        self.store.update(&self.model, id, values).await
    }

    pub async fn destroy(&self, id: &Value) -> Result<Option<Record>, StoreError> {
        self.store.destroy(&self.model, id).await
    }
}

/// Query builders that can carry population directives.
pub trait Populatable: Sized {
    fn populate(self, populate: Populate) -> Self;
}

#[must_use]
pub struct Find {
    handle: ModelHandle,
    query: Query,
}

impl Find {
    pub fn limit(mut self, n: u64) -> Self {
        self.query.limit = Some(n);
        self
    }

    pub fn skip(mut self, n: u64) -> Self {
        self.query.skip = n;
        self
    }

    pub fn sort(mut self, sort: Option<Sort>) -> Self {
        self.query.sort = sort;
        self
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub async fn exec(self) -> Result<Vec<Record>, StoreError> {
        self.handle.store.find(&self.handle.model, &self.query).await
    }
}

impl Populatable for Find {
    fn populate(mut self, populate: Populate) -> Self {
        self.query.populate.push(populate);
        self
    }
}

#[must_use]
pub struct FindOne {
    inner: Find,
}

impl FindOne {
    pub fn query(&self) -> &Query {
        self.inner.query()
    }

    pub async fn exec(self) -> Result<Option<Record>, StoreError> {
        Ok(self.inner.exec().await?.into_iter().next())
    }
}

impl Populatable for FindOne {
    fn populate(mut self, populate: Populate) -> Self {
        self.inner = self.inner.populate(populate);
        self
    }
}
