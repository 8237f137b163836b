//! The seven blueprint actions over any registered model.

use crate::config::{Association, BlueprintConfig, Nature};
use crate::context::{Pagination, RequestContext};
use crate::error::{BlueprintError, StoreError, STATUS_CREATED, STATUS_OK};
use crate::params::{
    apply_population, creation_values, populate_all, require_primary_key, resolve_criteria, resolve_limit,
    resolve_model, resolve_primary_key, resolve_skip, resolve_sort,
};
use crate::registry::{ModelHandle, ModelRegistry};
use crate::service::integrity::{exists_in_target, lookup, push_id, remove_id, settle, Integrity};
use crate::service::unit_of_work::{lock_key, RelationLocks, UnitOfWork};
use crate::service::validation::AttributeValidator;
use crate::store::{relation_ids, same_id, slot_id, Record};
use serde_json::Value;
use std::sync::Arc;
use tokio::task::JoinSet;

pub struct Blueprint {
    registry: Arc<ModelRegistry>,
    config: BlueprintConfig,
    locks: Arc<RelationLocks>,
}

impl Blueprint {
    pub fn new(registry: Arc<ModelRegistry>, config: BlueprintConfig) -> Self {
        Blueprint {
            registry,
            config,
            locks: Arc::new(RelationLocks::new()),
        }
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn config(&self) -> &BlueprintConfig {
        &self.config
    }

    fn integrity(&self, uow: &UnitOfWork) -> Integrity {
        Integrity::new(Arc::clone(&self.registry), Arc::clone(&self.locks), uow.clone())
    }

    /// List records, or a single one when a primary key is given.
    #[tracing::instrument(skip_all, fields(model = ?ctx.model))]
    pub async fn find(&self, ctx: &mut RequestContext) -> Result<Value, BlueprintError> {
        let result = if resolve_primary_key(ctx).is_some() {
            self.find_one_inner(ctx).await
        } else {
            self.find_inner(ctx).await
        };
        finish(ctx, result, STATUS_OK)
    }

    #[tracing::instrument(skip_all, fields(model = ?ctx.model))]
    pub async fn find_one(&self, ctx: &mut RequestContext) -> Result<Value, BlueprintError> {
        let result = self.find_one_inner(ctx).await;
        finish(ctx, result, STATUS_OK)
    }

    #[tracing::instrument(skip_all, fields(model = ?ctx.model))]
    pub async fn create(&self, ctx: &mut RequestContext) -> Result<Value, BlueprintError> {
        let result = self.create_inner(ctx).await;
        finish(ctx, result, STATUS_CREATED)
    }

    #[tracing::instrument(skip_all, fields(model = ?ctx.model))]
    pub async fn update(&self, ctx: &mut RequestContext) -> Result<Value, BlueprintError> {
        let result = self.update_inner(ctx).await;
        finish(ctx, result, STATUS_OK)
    }

    #[tracing::instrument(skip_all, fields(model = ?ctx.model))]
    pub async fn destroy(&self, ctx: &mut RequestContext) -> Result<Value, BlueprintError> {
        let result = self.destroy_inner(ctx).await;
        finish(ctx, result, STATUS_OK)
    }

    /// Add a child to a parent's relation, creating the child when it does not exist yet.
    #[tracing::instrument(skip_all, fields(model = ?ctx.model))]
    pub async fn add(&self, ctx: &mut RequestContext) -> Result<Value, BlueprintError> {
        let result = self.add_inner(ctx).await;
        finish(ctx, result, STATUS_OK)
    }

    /// Remove a child from a parent's relation. The child record itself is kept.
    #[tracing::instrument(skip_all, fields(model = ?ctx.model))]
    pub async fn remove(&self, ctx: &mut RequestContext) -> Result<Value, BlueprintError> {
        let result = self.remove_inner(ctx).await;
        finish(ctx, result, STATUS_OK)
    }

    async fn find_inner(&self, ctx: &mut RequestContext) -> Result<Value, BlueprintError> {
        let handle = resolve_model(ctx, &self.registry)?;
        let criteria = resolve_criteria(ctx)?;
        let limit = resolve_limit(ctx, &self.config);
        let skip = resolve_skip(ctx);
        let sort = resolve_sort(ctx);
        ctx.options.pagination = Some(Pagination {
            criteria: criteria.clone(),
            limit,
            skip,
            sort: sort.clone(),
        });
        let query = handle.find(criteria).limit(limit).skip(skip).sort(sort);
        let records = apply_population(query, ctx, handle.model(), &self.config).exec().await?;
        tracing::debug!(count = records.len(), "find");
        Ok(Value::Array(records.into_iter().map(Value::Object).collect()))
    }

    async fn find_one_inner(&self, ctx: &RequestContext) -> Result<Value, BlueprintError> {
        let handle = resolve_model(ctx, &self.registry)?;
        let id = require_primary_key(ctx, handle.model())?;
        self.read_back(&handle, &id, ctx).await
    }

    async fn create_inner(&self, ctx: &RequestContext) -> Result<Value, BlueprintError> {
        let handle = resolve_model(ctx, &self.registry)?;
        let values = creation_values(ctx)?;
        let uow = UnitOfWork::new();
        let (id, _) = self.insert(&handle, values, &uow).await?;
        self.read_back(&handle, &id, ctx).await
    }

    async fn update_inner(&self, ctx: &RequestContext) -> Result<Value, BlueprintError> {
        let handle = resolve_model(ctx, &self.registry)?;
        let id = require_primary_key(ctx, handle.model())?;
        let mut values = creation_values(ctx)?;
        let pk = handle.primary_key().to_string();
        if let Some(given) = values.get(&pk).filter(|given| !same_id(given, &id)) {
            tracing::warn!(given = %given, id = %id, "primary key in payload ignored");
        }
        values.insert(pk, id.clone());
        self.normalize_relations(&handle, &mut values)?;

        let existing = exists_in_target(&handle, &id).await?;
        AttributeValidator::validate_partial(&values, handle.model())?;
        self.check_targets_exist(&handle, &values, true).await?;

        let uow = UnitOfWork::new();
        uow.update(&handle, &id, &existing, values.clone())
            .await?
            .ok_or_else(|| BlueprintError::NotFound(format!("{} {}", handle.name(), id)))?;
        if let Err(e) = self.sync_relations(&self.integrity(&uow), &handle, &id, Some(&existing), &values).await {
            let failed = uow.rollback().await;
            tracing::warn!(error = %e, failed, "update rolled back");
            return Err(e);
        }
        self.read_back(&handle, &id, ctx).await
    }

    async fn destroy_inner(&self, ctx: &RequestContext) -> Result<Value, BlueprintError> {
        let handle = resolve_model(ctx, &self.registry)?;
        let id = require_primary_key(ctx, handle.model())?;
        let snapshot = self.read_back(&handle, &id, ctx).await?;
        let raw = exists_in_target(&handle, &id).await?;
        let mut cleanup = Vec::new();
        for association in handle.associations() {
            if association.via.is_some() && association.nature != Nature::OneWay {
                cleanup.push((association.clone(), lookup(&self.registry, &association.target)?));
            }
        }
        handle
            .destroy(&id)
            .await?
            .ok_or_else(|| BlueprintError::NotFound(format!("{} {}", handle.name(), id)))?;

        let integrity = self.integrity(&UnitOfWork::new());
        let mut set = JoinSet::new();
        for (association, target) in cleanup {
            let Some(via) = association.via else {
                continue;
            };
            let integrity = integrity.clone();
            let id = id.clone();
            match association.nature {
                Nature::OneToOne | Nature::OneToMany => {
                    set.spawn(async move { integrity.clear_inverse_holders(&target, &via, &id).await.map(|_| ()) });
                }
                Nature::ManyToOne | Nature::ManyToMany => {
                    let held = raw
                        .get(&association.alias)
                        .map(|v| relation_ids(v, target.primary_key()))
                        .unwrap_or_default();
                    set.spawn(async move { integrity.detach_from_plural_inverse(&target, &via, &id, held).await });
                }
                Nature::OneWay => {}
            }
        }
        if let Err(e) = settle(set).await {
            tracing::warn!(error = %e, "destroy committed, relation cleanup incomplete");
            return Err(BlueprintError::IntegrityDegraded {
                committed: snapshot,
                source: Box::new(e),
            });
        }
        Ok(snapshot)
    }

    async fn add_inner(&self, ctx: &RequestContext) -> Result<Value, BlueprintError> {
        let handle = resolve_model(ctx, &self.registry)?;
        let association = relation(ctx, &handle)?.clone();
        let parent_id = parent_id(ctx, &handle)?;
        let target = lookup(&self.registry, &association.target)?;
        exists_in_target(&handle, &parent_id).await?;
        if association.nature.is_singular() {
            return Err(BlueprintError::NotFound(format!(
                "{}.{} is not a collection",
                handle.name(),
                association.alias
            )));
        }

        let uow = UnitOfWork::new();
        let integrity = self.integrity(&uow);
        let result = async {
            let child_id = self.resolve_child(ctx, &target, &uow).await?;
            let added = integrity
                .edit_list(&handle, &parent_id, &association.alias, |ids| push_id(ids, &child_id))
                .await;
            match added {
                Err(BlueprintError::InternalStore(StoreError::Conflict(m))) => {
                    tracing::debug!(conflict = %m, "child already linked");
                }
                other => other?,
            }
            integrity.link_inverse(&handle, &association, &parent_id, &child_id).await
        }
        .await;
        if let Err(e) = result {
            let failed = uow.rollback().await;
            tracing::warn!(error = %e, failed, "add rolled back");
            return Err(e);
        }
        self.read_back_full(&handle, &parent_id).await
    }

    /// Existing child id, or the id of a child created from the payload.
    async fn resolve_child(
        &self,
        ctx: &RequestContext,
        target: &ModelHandle,
        uow: &UnitOfWork,
    ) -> Result<Value, BlueprintError> {
        let mut values = creation_values(ctx)?;
        match resolve_primary_key(ctx) {
            Some(pk) => {
                let pk = target.model().pk_type.coerce(&pk)?;
                if target.find_one(&pk).exec().await?.is_some() {
                    return Ok(pk);
                }
                values.insert(target.primary_key().to_string(), pk);
            }
            None if values.is_empty() => {
                return Err(BlueprintError::MissingChildIdentifier(
                    "provide a child primary key or the values of a new child".into(),
                ))
            }
            None => {}
        }
        let (id, _) = self.insert(target, values, uow).await?;
        tracing::debug!(model = target.name(), id = %id, "child created");
        Ok(id)
    }

    async fn remove_inner(&self, ctx: &RequestContext) -> Result<Value, BlueprintError> {
        let handle = resolve_model(ctx, &self.registry)?;
        let association = relation(ctx, &handle)?.clone();
        let target = lookup(&self.registry, &association.target)?;
        let child_id = resolve_primary_key(ctx)
            .ok_or_else(|| BlueprintError::MissingChildIdentifier("child primary key is required".into()))?;
        let child_id = target.model().pk_type.coerce(&child_id)?;
        let parent_id = parent_id(ctx, &handle)?;

        let uow = UnitOfWork::new();
        {
            let _guard = self.locks.acquire(vec![lock_key(handle.name(), &parent_id)]).await;
            let parent = exists_in_target(&handle, &parent_id).await?;
            let current = parent
                .get(&association.alias)
                .filter(|v| !v.is_null())
                .ok_or_else(|| {
                    BlueprintError::NotFound(format!("{}.{} is empty", handle.name(), association.alias))
                })?;
            let not_member = || {
                BlueprintError::NotFound(format!(
                    "{} {} is not in {}.{}",
                    target.name(),
                    child_id,
                    handle.name(),
                    association.alias
                ))
            };
            let remaining = if association.nature.is_singular() {
                if !slot_id(current, target.primary_key()).is_some_and(|held| same_id(held, &child_id)) {
                    return Err(not_member());
                }
                Value::Null
            } else {
                let mut ids = relation_ids(current, target.primary_key());
                if !remove_id(&mut ids, &child_id) {
                    return Err(not_member());
                }
                Value::Array(ids)
            };
            let mut values = Record::new();
            values.insert(association.alias.clone(), remaining);
            uow.update(&handle, &parent_id, &parent, values).await?;
        }

        let integrity = self.integrity(&uow);
        if let Err(e) = integrity.unlink_inverse(&handle, &association, &parent_id, &child_id).await {
            let failed = uow.rollback().await;
            tracing::warn!(error = %e, failed, "remove rolled back");
            return Err(e);
        }
        self.read_back_full(&handle, &parent_id).await
    }

    /// Validate, create and wire up a new record. Rolls back its own writes on failure.
    async fn insert(
        &self,
        handle: &ModelHandle,
        mut values: Record,
        uow: &UnitOfWork,
    ) -> Result<(Value, Record), BlueprintError> {
        self.normalize_relations(handle, &mut values)?;
        AttributeValidator::validate(&values, handle.model())?;
        self.check_targets_exist(handle, &values, false).await?;

        let created = handle.create(values).await?;
        let id = created
            .get(handle.primary_key())
            .filter(|v| !v.is_null())
            .cloned()
            .ok_or_else(|| BlueprintError::InternalStore(StoreError::Backend("created record has no primary key".into())))?;
        uow.record_created(handle, &id);
        if let Err(e) = self.sync_relations(&self.integrity(uow), handle, &id, None, &created).await {
            let failed = uow.rollback().await;
            tracing::warn!(error = %e, failed, "create rolled back");
            return Err(e);
        }
        Ok((id, created))
    }

    /// Replace populated relation values with plain identifiers.
    fn normalize_relations(&self, handle: &ModelHandle, values: &mut Record) -> Result<(), BlueprintError> {
        for association in handle.associations() {
            let Some(value) = values.get_mut(&association.alias) else {
                continue;
            };
            let target = lookup(&self.registry, &association.target)?;
            let tpk = target.primary_key();
            *value = if association.nature.is_singular() {
                slot_id(value, tpk).cloned().unwrap_or(Value::Null)
            } else if value.is_null() {
                Value::Array(Vec::new())
            } else {
                Value::Array(relation_ids(value, tpk))
            };
        }
        Ok(())
    }

    /// Every relation identifier being written must name an existing record, whatever the nature.
    /// `partial` checks only the aliases present in `values`.
    async fn check_targets_exist(
        &self,
        handle: &ModelHandle,
        values: &Record,
        partial: bool,
    ) -> Result<(), BlueprintError> {
        let mut set = JoinSet::new();
        for association in handle.associations() {
            let value = values.get(&association.alias);
            if partial && value.is_none() {
                continue;
            }
            let target = lookup(&self.registry, &association.target)?;
            let ids = match value {
                Some(v) if association.nature.is_plural() => relation_ids(v, target.primary_key()),
                Some(v) => slot_id(v, target.primary_key()).cloned().into_iter().collect(),
                None => Vec::new(),
            };
            if ids.is_empty() && association.required && association.nature.is_singular() {
                return Err(BlueprintError::Validation(format!("{} is required", association.alias)));
            }
            for id in ids {
                let target = target.clone();
                set.spawn(async move { exists_in_target(&target, &id).await.map(|_| ()) });
            }
        }
        settle(set).await.map(|_| ()).map_err(|e| match e {
            BlueprintError::NotFound(what) => BlueprintError::Validation(format!("referenced record does not exist: {}", what)),
            other => other,
        })
    }

    /// Apply inverse maintenance for every association present in `values`.
    async fn sync_relations(
        &self,
        integrity: &Integrity,
        handle: &ModelHandle,
        id: &Value,
        before: Option<&Record>,
        values: &Record,
    ) -> Result<(), BlueprintError> {
        for association in handle.associations() {
            let Some(after) = values.get(&association.alias) else {
                continue;
            };
            let prior = before.and_then(|b| b.get(&association.alias)).unwrap_or(&Value::Null);
            integrity.sync_relation(handle, association, id, prior, after).await?;
        }
        Ok(())
    }

    async fn read_back(&self, handle: &ModelHandle, id: &Value, ctx: &RequestContext) -> Result<Value, BlueprintError> {
        let query = apply_population(handle.find_one(id), ctx, handle.model(), &self.config);
        query
            .exec()
            .await?
            .map(Value::Object)
            .ok_or_else(|| BlueprintError::NotFound(format!("{} {}", handle.name(), id)))
    }

    async fn read_back_full(&self, handle: &ModelHandle, id: &Value) -> Result<Value, BlueprintError> {
        let query = populate_all(handle.find_one(id), handle.model(), &self.config);
        query
            .exec()
            .await?
            .map(Value::Object)
            .ok_or_else(|| BlueprintError::NotFound(format!("{} {}", handle.name(), id)))
    }
}

fn finish(ctx: &mut RequestContext, result: Result<Value, BlueprintError>, success: u16) -> Result<Value, BlueprintError> {
    ctx.status = match &result {
        Ok(_) => success,
        Err(e) => e.status(),
    };
    result
}

/// Association named by the `relation` route param or route option.
fn relation<'h>(ctx: &RequestContext, handle: &'h ModelHandle) -> Result<&'h Association, BlueprintError> {
    let alias = ctx
        .params
        .get("relation")
        .and_then(Value::as_str)
        .or(ctx.options.relation.as_deref())
        .ok_or_else(|| BlueprintError::MissingRouteOption("relation".into()))?;
    handle.model().association(alias).ok_or_else(|| {
        BlueprintError::MissingRouteOption(format!("'{}' is not an association of {}", alias, handle.name()))
    })
}

fn parent_id(ctx: &RequestContext, handle: &ModelHandle) -> Result<Value, BlueprintError> {
    let raw = ctx
        .param("parentId")
        .ok_or_else(|| BlueprintError::MissingPrimaryKey("parentId is required".into()))?;
    handle.model().pk_type.coerce(raw)
}
