#![allow(dead_code)]

use blueprint_sdk::{resolve, Blueprint, BlueprintConfig, MemoryStore, ModelDefinition, ModelRegistry, Record, RequestContext};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub struct Harness {
    pub blueprint: Blueprint,
    pub registry: Arc<ModelRegistry>,
    pub store: Arc<MemoryStore>,
}

pub fn definitions() -> Vec<ModelDefinition> {
    serde_json::from_value(json!([
        {
            "name": "user",
            "attributes": [{ "name": "name", "required": true }],
            "associations": [
                { "alias": "profile", "model": "profile", "via": "owner" },
                { "alias": "posts", "collection": "post", "via": "author" },
                { "alias": "groups", "collection": "group", "via": "members" },
                { "alias": "avatar", "model": "image" }
            ]
        },
        {
            "name": "profile",
            "attributes": [{ "name": "bio", "max_length": 40 }],
            "associations": [{ "alias": "owner", "model": "user", "via": "profile" }]
        },
        {
            "name": "post",
            "attributes": [{ "name": "title", "required": true }],
            "associations": [{ "alias": "author", "model": "user", "via": "posts" }]
        },
        {
            "name": "group",
            "attributes": [{ "name": "name" }],
            "associations": [{ "alias": "members", "collection": "user", "via": "groups" }]
        },
        { "name": "image", "attributes": [{ "name": "url" }] },
        {
            "name": "ticket",
            "attributes": [{ "name": "title" }],
            "associations": [{ "alias": "attachment", "model": "image", "required": true }]
        }
    ]))
    .unwrap()
}

pub fn harness() -> Harness {
    harness_with(BlueprintConfig::default())
}

pub fn harness_with(config: BlueprintConfig) -> Harness {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let registry = Arc::new(ModelRegistry::new(resolve(&definitions()).unwrap(), store.clone()));
    Harness {
        blueprint: Blueprint::new(Arc::clone(&registry), config),
        registry,
        store,
    }
}

impl Harness {
    pub async fn create(&self, model: &str, body: Value) -> Value {
        let mut ctx = RequestContext::for_model(model).with_body(body);
        let created = self.blueprint.create(&mut ctx).await.unwrap();
        assert_eq!(ctx.status, 201);
        created
    }

    pub async fn update(&self, model: &str, id: Value, body: Value) -> Value {
        let mut ctx = RequestContext::for_model(model).with_param("id", id).with_body(body);
        self.blueprint.update(&mut ctx).await.unwrap()
    }

    /// Stored record, without population.
    pub async fn raw(&self, model: &str, id: Value) -> Option<Record> {
        self.registry.lookup(model).unwrap().find_one(&id).exec().await.unwrap()
    }

    pub async fn field(&self, model: &str, id: Value, field: &str) -> Value {
        let record = self.raw(model, id).await.unwrap();
        record.get(field).cloned().unwrap_or(Value::Null)
    }
}

/// Context for add/remove on `parent_model` `parent_id`'s `relation`.
pub fn relation_ctx(parent_model: &str, parent_id: Value, relation: &str) -> RequestContext {
    RequestContext::for_model(parent_model)
        .with_param("parentId", parent_id)
        .with_param("relation", relation)
}
