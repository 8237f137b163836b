//! Per-call request carrier handed to every action.

use crate::store::{Criteria, Sort};
use serde_json::{Map, Value};

/// Settings a route can pin, plus what `find` resolved.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RouteOptions {
    /// Overrides the global populate flag for this route.
    pub populate: Option<bool>,
    /// Association alias for add/remove when the route has no `relation` param.
    pub relation: Option<String>,
    /// Written by `find`.
    pub pagination: Option<Pagination>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Pagination {
    pub criteria: Criteria,
    pub limit: u64,
    pub skip: u64,
    pub sort: Option<Sort>,
}

#[derive(Clone, Debug, Default)]
pub struct RequestContext {
    /// Explicit model name; wins over `params.model`.
    pub model: Option<String>,
    /// Route parameters (`model`, `id`, `relation`, `parentId`).
    pub params: Map<String, Value>,
    pub query: Map<String, Value>,
    pub body: Option<Value>,
    /// Outcome status, set once from the action's result.
    pub status: u16,
    pub options: RouteOptions,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_model(model: impl Into<String>) -> Self {
        RequestContext {
            model: Some(model.into()),
            ..Self::default()
        }
    }

    pub fn with_param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    pub fn with_query(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.query.insert(key.to_string(), value.into());
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_relation(mut self, alias: impl Into<String>) -> Self {
        self.options.relation = Some(alias.into());
        self
    }

    /// Look a parameter up in route params, then query, then body.
    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params
            .get(name)
            .or_else(|| self.query.get(name))
            .or_else(|| self.body.as_ref().and_then(|b| b.get(name)))
            .filter(|v| !v.is_null())
    }
}
