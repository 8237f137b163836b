//! Relational integrity maintenance.
//!
//! Every association with a `via` has an inverse field on the target model. Writes through the
//! blueprint actions keep both sides pointing at each other:
//! - oneToOne: owner.alias = T implies T.via = owner, and no other record on either side holds the pair;
//! - oneToMany / manyToOne: the child's scalar field and the parent's id list agree;
//! - manyToMany: both id lists contain each other.
//!
//! All writes go through the action's [`UnitOfWork`] so a failed action can be compensated.

use crate::config::{Association, Nature};
use crate::error::{BlueprintError, StoreError};
use crate::registry::{ModelHandle, ModelRegistry};
use crate::service::unit_of_work::{lock_key, RelationLocks, UnitOfWork};
use crate::store::{relation_ids, same_id, slot_id, Record};
use serde_json::Value;
use std::sync::Arc;
use tokio::task::JoinSet;

/// Wait for every task; the first failure wins once all have finished.
pub(crate) async fn settle<T: Send + 'static>(
    mut set: JoinSet<Result<T, BlueprintError>>,
) -> Result<Vec<T>, BlueprintError> {
    let mut out = Vec::with_capacity(set.len());
    let mut first_err = None;
    while let Some(joined) = set.join_next().await {
        let result = joined.unwrap_or_else(|e| {
            Err(BlueprintError::InternalStore(StoreError::Backend(format!("task failed: {}", e))))
        });
        match result {
            Ok(v) => out.push(v),
            Err(e) => {
                first_err.get_or_insert(e);
            }
        }
    }
    match first_err {
        Some(e) => Err(e),
        None => Ok(out),
    }
}

pub(crate) fn lookup(registry: &ModelRegistry, name: &str) -> Result<ModelHandle, BlueprintError> {
    registry
        .lookup(name)
        .ok_or_else(|| BlueprintError::ModelResolution(format!("model '{}' is not registered", name)))
}

fn single(field: &str, value: Value) -> Record {
    let mut r = Record::new();
    r.insert(field.to_string(), value);
    r
}

/// Load one record or fail with `NotFound`.
pub async fn exists_in_target(target: &ModelHandle, id: &Value) -> Result<Record, BlueprintError> {
    target
        .find_one(id)
        .exec()
        .await?
        .ok_or_else(|| BlueprintError::NotFound(format!("{} {}", target.name(), id)))
}

/// Relation maintenance bound to one action's journal.
#[derive(Clone)]
pub struct Integrity {
    registry: Arc<ModelRegistry>,
    locks: Arc<RelationLocks>,
    uow: UnitOfWork,
}

impl Integrity {
    pub fn new(registry: Arc<ModelRegistry>, locks: Arc<RelationLocks>, uow: UnitOfWork) -> Self {
        Integrity { registry, locks, uow }
    }

    pub fn unit_of_work(&self) -> &UnitOfWork {
        &self.uow
    }

    /// Null `field` on every `target` record holding `owner_id` there. Returns the records as they were.
    #[tracing::instrument(skip(self, target), fields(target = target.name()))]
    pub async fn clear_inverse_holders(
        &self,
        target: &ModelHandle,
        field: &str,
        owner_id: &Value,
    ) -> Result<Vec<Record>, BlueprintError> {
        let criteria = single(field, owner_id.clone());
        let holders = target.find(criteria).exec().await?;
        self.null_field(target, field, holders).await
    }

    /// Null `alias` on every `owner` record other than `owner_id` that holds `target_id`.
    #[tracing::instrument(skip(self, owner), fields(owner = owner.name()))]
    pub async fn clear_other_owner(
        &self,
        owner: &ModelHandle,
        alias: &str,
        owner_id: &Value,
        target_id: &Value,
    ) -> Result<Vec<Record>, BlueprintError> {
        let criteria = single(alias, target_id.clone());
        let pk = owner.primary_key().to_string();
        let others: Vec<Record> = owner
            .find(criteria)
            .exec()
            .await?
            .into_iter()
            .filter(|r| r.get(&pk).map_or(true, |id| !same_id(id, owner_id)))
            .collect();
        self.null_field(owner, alias, others).await
    }

    async fn null_field(
        &self,
        handle: &ModelHandle,
        field: &str,
        records: Vec<Record>,
    ) -> Result<Vec<Record>, BlueprintError> {
        let mut set = JoinSet::new();
        for record in records {
            let Some(id) = record.get(handle.primary_key()).cloned() else {
                continue;
            };
            let handle = handle.clone();
            let uow = self.uow.clone();
            let values = single(field, Value::Null);
            set.spawn(async move {
                uow.update(&handle, &id, &record, values).await?;
                Ok::<_, BlueprintError>(record)
            });
        }
        settle(set).await
    }

    /// Make `owner_id` and `target_id` each other's only partner across a oneToOne association.
    /// `None` only releases whatever target still points back at the owner.
    #[tracing::instrument(skip(self, owner, association), fields(owner = owner.name(), alias = %association.alias))]
    pub async fn reassign_singular_relation(
        &self,
        owner: &ModelHandle,
        association: &Association,
        owner_id: &Value,
        target_id: Option<&Value>,
    ) -> Result<(), BlueprintError> {
        let target = lookup(&self.registry, &association.target)?;
        let mut keys = vec![lock_key(owner.name(), owner_id)];
        if let Some(t) = target_id {
            keys.push(lock_key(target.name(), t));
        }
        let _guard = self.locks.acquire(keys).await;

        let release = async {
            match &association.via {
                Some(via) => self.clear_inverse_holders(&target, via, owner_id).await.map(|_| ()),
                None => Ok(()),
            }
        };
        let exclusive = async {
            match target_id {
                Some(t) => self.clear_other_owner(owner, &association.alias, owner_id, t).await.map(|_| ()),
                None => Ok(()),
            }
        };
        let (released, excluded) = tokio::join!(release, exclusive);
        released?;
        excluded?;

        if let (Some(t), Some(via)) = (target_id, &association.via) {
            let before = exists_in_target(&target, t).await?;
            self.uow.update(&target, t, &before, single(via, owner_id.clone())).await?;
        }
        tracing::debug!(owner_id = %owner_id, target_id = ?target_id, "singular relation reassigned");
        Ok(())
    }

    /// Point the inverse side of `association` at the owner after `child_id` joined it.
    #[tracing::instrument(skip(self, owner, association), fields(owner = owner.name(), alias = %association.alias))]
    pub async fn link_inverse(
        &self,
        owner: &ModelHandle,
        association: &Association,
        owner_id: &Value,
        child_id: &Value,
    ) -> Result<(), BlueprintError> {
        let Some(via) = &association.via else {
            return Ok(());
        };
        let target = lookup(&self.registry, &association.target)?;
        match association.nature {
            Nature::OneToOne => self.reassign_singular_relation(owner, association, owner_id, Some(child_id)).await,
            Nature::OneToMany => {
                let child = exists_in_target(&target, child_id).await?;
                let previous = child
                    .get(via)
                    .and_then(|v| slot_id(v, owner.primary_key()))
                    .filter(|p| !same_id(p, owner_id))
                    .cloned();
                if let Some(previous) = previous {
                    self.edit_list(owner, &previous, &association.alias, |ids| remove_id(ids, child_id))
                        .await?;
                }
                self.uow.update(&target, child_id, &child, single(via, owner_id.clone())).await?;
                Ok(())
            }
            Nature::ManyToOne | Nature::ManyToMany => {
                self.edit_list(&target, child_id, via, |ids| push_id(ids, owner_id)).await
            }
            Nature::OneWay => Ok(()),
        }
    }

    /// Drop the owner from the inverse side of `association` after `child_id` left it.
    #[tracing::instrument(skip(self, owner, association), fields(owner = owner.name(), alias = %association.alias))]
    pub async fn unlink_inverse(
        &self,
        owner: &ModelHandle,
        association: &Association,
        owner_id: &Value,
        child_id: &Value,
    ) -> Result<(), BlueprintError> {
        let Some(via) = &association.via else {
            return Ok(());
        };
        let target = lookup(&self.registry, &association.target)?;
        match association.nature {
            Nature::OneToOne => self.clear_inverse_holders(&target, via, owner_id).await.map(|_| ()),
            Nature::OneToMany => {
                let Some(child) = target.find_one(child_id).exec().await? else {
                    return Ok(());
                };
                let points_here = child
                    .get(via)
                    .and_then(|v| slot_id(v, owner.primary_key()))
                    .is_some_and(|p| same_id(p, owner_id));
                if points_here {
                    self.uow.update(&target, child_id, &child, single(via, Value::Null)).await?;
                }
                Ok(())
            }
            Nature::ManyToOne | Nature::ManyToMany => {
                self.edit_list(&target, child_id, via, |ids| remove_id(ids, owner_id)).await
            }
            Nature::OneWay => Ok(()),
        }
    }

    /// Remove `owner_id` from the `field` list of each listed `target` record.
    #[tracing::instrument(skip(self, target, candidates), fields(target = target.name()))]
    pub async fn detach_from_plural_inverse(
        &self,
        target: &ModelHandle,
        field: &str,
        owner_id: &Value,
        candidates: Vec<Value>,
    ) -> Result<(), BlueprintError> {
        let mut set = JoinSet::new();
        for candidate in candidates {
            let this = self.clone();
            let target = target.clone();
            let field = field.to_string();
            let owner_id = owner_id.clone();
            set.spawn(async move {
                this.edit_list(&target, &candidate, &field, |ids| remove_id(ids, &owner_id))
                    .await
            });
        }
        settle(set).await.map(|_| ())
    }

    /// Bring the inverse side in line after `owner_id`'s `association` changed from `before` to `after`.
    pub async fn sync_relation(
        &self,
        owner: &ModelHandle,
        association: &Association,
        owner_id: &Value,
        before: &Value,
        after: &Value,
    ) -> Result<(), BlueprintError> {
        let target = lookup(&self.registry, &association.target)?;
        let tpk = target.primary_key();
        match association.nature {
            Nature::OneWay => Ok(()),
            Nature::OneToOne => {
                let new = slot_id(after, tpk);
                if new.is_none() && slot_id(before, tpk).is_none() {
                    return Ok(());
                }
                self.reassign_singular_relation(owner, association, owner_id, new).await
            }
            Nature::ManyToOne => {
                let (old, new) = (slot_id(before, tpk), slot_id(after, tpk));
                if let (Some(o), Some(n)) = (old, new) {
                    if same_id(o, n) {
                        return Ok(());
                    }
                }
                if let Some(o) = old {
                    self.unlink_inverse(owner, association, owner_id, o).await?;
                }
                if let Some(n) = new {
                    self.link_inverse(owner, association, owner_id, n).await?;
                }
                Ok(())
            }
            Nature::OneToMany | Nature::ManyToMany => {
                let old = relation_ids(before, tpk);
                let new = relation_ids(after, tpk);
                for gone in old.iter().filter(|o| !new.iter().any(|n| same_id(n, o))) {
                    self.unlink_inverse(owner, association, owner_id, gone).await?;
                }
                for added in new.iter().filter(|n| !old.iter().any(|o| same_id(n, o))) {
                    self.link_inverse(owner, association, owner_id, added).await?;
                }
                Ok(())
            }
        }
    }

    /// Read-modify-write of an id list under the record's lock. A missing record is left alone.
    pub async fn edit_list<F>(&self, handle: &ModelHandle, id: &Value, field: &str, edit: F) -> Result<(), BlueprintError>
    where
        F: FnOnce(&mut Vec<Value>) -> bool,
    {
        let _guard = self.locks.acquire(vec![lock_key(handle.name(), id)]).await;
        let Some(record) = handle.find_one(id).exec().await? else {
            tracing::debug!(model = handle.name(), id = %id, "list owner missing, nothing to edit");
            return Ok(());
        };
        let mut ids = record.get(field).map(|v| relation_ids(v, "")).unwrap_or_default();
        if edit(&mut ids) {
            self.uow.update(handle, id, &record, single(field, Value::Array(ids))).await?;
        }
        Ok(())
    }
}

pub(crate) fn push_id(ids: &mut Vec<Value>, id: &Value) -> bool {
    if ids.iter().any(|i| same_id(i, id)) {
        return false;
    }
    ids.push(id.clone());
    true
}

pub(crate) fn remove_id(ids: &mut Vec<Value>, id: &Value) -> bool {
    let before = ids.len();
    ids.retain(|i| !same_id(i, id));
    ids.len() != before
}
