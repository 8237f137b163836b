//! Query parameter resolution: model, payload, criteria, primary key, paging and population from a request context.

use crate::config::{BlueprintConfig, Model};
use crate::context::RequestContext;
use crate::error::BlueprintError;
use crate::registry::{ModelHandle, ModelRegistry, Populatable};
use crate::store::{Criteria, Populate, Record, Sort};
use serde_json::Value;

/// Keys that steer the query itself and never become filter criteria or creation values.
pub const CRITERIA_BLACKLIST: &[&str] = &["limit", "skip", "sort", "populate", "where"];

pub fn resolve_model(ctx: &RequestContext, registry: &ModelRegistry) -> Result<ModelHandle, BlueprintError> {
    let name = ctx
        .model
        .as_deref()
        .or_else(|| ctx.params.get("model").and_then(Value::as_str))
        .ok_or_else(|| BlueprintError::ModelResolution("no model in request".into()))?;
    registry
        .lookup(name)
        .ok_or_else(|| BlueprintError::ModelResolution(format!("model '{}' is not registered", name)))
}

/// Request body, or the query parameters when there is no body.
pub fn resolve_values(ctx: &RequestContext) -> Result<Record, BlueprintError> {
    match &ctx.body {
        Some(Value::Object(body)) => Ok(body.clone()),
        None | Some(Value::Null) => Ok(ctx.query.clone()),
        Some(_) => Err(BlueprintError::InvalidParameter("body must be a JSON object".into())),
    }
}

/// Values minus query-steering keys; the payload for creating a record.
pub fn creation_values(ctx: &RequestContext) -> Result<Record, BlueprintError> {
    let mut values = resolve_values(ctx)?;
    values.retain(|k, _| !CRITERIA_BLACKLIST.contains(&k.as_str()));
    Ok(values)
}

/// Explicit `where` (JSON-decoded when a string), else the payload minus [`CRITERIA_BLACKLIST`] and null fields.
pub fn resolve_criteria(ctx: &RequestContext) -> Result<Criteria, BlueprintError> {
    if let Some(raw) = ctx.param("where") {
        let decoded = match raw {
            Value::String(s) => serde_json::from_str(s)
                .map_err(|e| BlueprintError::InvalidParameter(format!("where: {}", e)))?,
            other => other.clone(),
        };
        return match decoded {
            Value::Object(criteria) => Ok(criteria),
            _ => Err(BlueprintError::InvalidParameter("where must be an object".into())),
        };
    }
    let mut criteria = creation_values(ctx)?;
    criteria.retain(|_, v| !v.is_null());
    Ok(criteria)
}

/// `where.id` when present, else `params.id`. An object is not a primary key.
pub fn resolve_primary_key(ctx: &RequestContext) -> Option<Value> {
    let from_where = ctx.param("where").and_then(|w| match w {
        Value::Object(m) => m.get("id").cloned(),
        Value::String(s) => serde_json::from_str::<Value>(s)
            .ok()
            .and_then(|v| v.get("id").cloned()),
        _ => None,
    });
    match from_where.or_else(|| ctx.params.get("id").cloned()) {
        None | Some(Value::Null) | Some(Value::Object(_)) => None,
        Some(pk) => Some(pk),
    }
}

/// Primary key coerced to the model's key type.
pub fn require_primary_key(ctx: &RequestContext, model: &Model) -> Result<Value, BlueprintError> {
    let pk = resolve_primary_key(ctx).ok_or_else(|| {
        BlueprintError::MissingPrimaryKey(format!("{} requires a primary key", model.name))
    })?;
    model.pk_type.coerce(&pk)
}

/// JSON object sort, or the raw string (e.g. `"name DESC"`) when it is not JSON.
pub fn resolve_sort(ctx: &RequestContext) -> Option<Sort> {
    match ctx.param("sort")? {
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Object(fields)) => Some(Sort::Fields(fields)),
            _ => Some(Sort::Raw(s.clone())),
        },
        Value::Object(fields) => Some(Sort::Fields(fields.clone())),
        other => {
            tracing::warn!(sort = %other, "ignoring unsupported sort");
            None
        }
    }
}

pub fn resolve_limit(ctx: &RequestContext, config: &BlueprintConfig) -> u64 {
    ctx.param("limit").and_then(as_count).unwrap_or(config.default_limit)
}

pub fn resolve_skip(ctx: &RequestContext) -> u64 {
    ctx.param("skip").and_then(as_count).unwrap_or(0)
}

fn as_count(v: &Value) -> Option<u64> {
    match v {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

enum PopulateFilter {
    Flag(bool),
    Only(Vec<String>),
}

fn population_filter(ctx: &RequestContext, config: &BlueprintConfig) -> PopulateFilter {
    let default = PopulateFilter::Flag(ctx.options.populate.unwrap_or(config.populate));
    match ctx.param("populate") {
        Some(Value::Bool(b)) => PopulateFilter::Flag(*b),
        Some(Value::String(s)) if s == "true" || s == "false" => PopulateFilter::Flag(s == "true"),
        Some(Value::String(s)) => PopulateFilter::Only(
            s.replace(['[', ']'], "")
                .split(',')
                .map(|a| a.trim().trim_matches('"').to_string())
                .filter(|a| !a.is_empty())
                .collect(),
        ),
        Some(Value::Array(items)) => {
            PopulateFilter::Only(items.iter().filter_map(Value::as_str).map(String::from).collect())
        }
        _ => default,
    }
}

/// Attach population for each association allowed by the caller's list, or by the populate flag when no list is given.
pub fn apply_population<Q: Populatable>(
    mut query: Q,
    ctx: &RequestContext,
    model: &Model,
    config: &BlueprintConfig,
) -> Q {
    let filter = population_filter(ctx, config);
    for association in &model.associations {
        let wanted = match &filter {
            PopulateFilter::Flag(all) => *all,
            PopulateFilter::Only(aliases) => aliases.iter().any(|a| *a == association.alias),
        };
        if wanted {
            query = query.populate(Populate::new(association, config.populate_limit));
        }
    }
    query
}

/// Populate every association regardless of flags.
pub fn populate_all<Q: Populatable>(mut query: Q, model: &Model, config: &BlueprintConfig) -> Q {
    for association in &model.associations {
        query = query.populate(Populate::new(association, config.populate_limit));
    }
    query
}
