//! Compensation journal for the writes of one action, and per-record relation locks.

use crate::error::StoreError;
use crate::registry::ModelHandle;
use crate::store::{id_key, Record};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;

enum Compensation {
    /// Put back the prior values of the fields a write changed.
    Restore { handle: ModelHandle, id: Value, fields: Record },
    /// Remove a record created by the action.
    Remove { handle: ModelHandle, id: Value },
}

/// Journal of compensations. Clones share the same journal, so spawned tasks can record into it.
#[derive(Clone, Default)]
pub struct UnitOfWork {
    journal: Arc<Mutex<Vec<Compensation>>>,
}

impl UnitOfWork {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, c: Compensation) {
        self.journal.lock().unwrap_or_else(|e| e.into_inner()).push(c);
    }

    pub fn record_created(&self, handle: &ModelHandle, id: &Value) {
        self.push(Compensation::Remove {
            handle: handle.clone(),
            id: id.clone(),
        });
    }

    /// Update through the journal: on success, the prior values (taken from `before`) of every written field are kept.
    pub async fn update(
        &self,
        handle: &ModelHandle,
        id: &Value,
        before: &Record,
        values: Record,
    ) -> Result<Option<Record>, StoreError> {
        let fields: Record = values
            .keys()
            .filter(|k| k.as_str() != handle.primary_key())
            .map(|k| (k.clone(), before.get(k).cloned().unwrap_or(Value::Null)))
            .collect();
        let updated = handle.update(id, values).await?;
        if updated.is_some() {
            self.push(Compensation::Restore {
                handle: handle.clone(),
                id: id.clone(),
                fields,
            });
        }
        Ok(updated)
    }

    pub fn len(&self) -> usize {
        self.journal.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Apply compensations newest first. Best effort: failures are logged and counted.
    pub async fn rollback(&self) -> usize {
        let entries = std::mem::take(&mut *self.journal.lock().unwrap_or_else(|e| e.into_inner()));
        let mut failed = 0;
        for entry in entries.into_iter().rev() {
            let result = match &entry {
                Compensation::Restore { handle, id, fields } => handle.update(id, fields.clone()).await.map(|_| ()),
                Compensation::Remove { handle, id } => handle.destroy(id).await.map(|_| ()),
            };
            if let Err(e) = result {
                failed += 1;
                let (model, id) = match &entry {
                    Compensation::Restore { handle, id, .. } | Compensation::Remove { handle, id } => (handle.name(), id),
                };
                tracing::error!(model, id = %id, error = %e, "compensation failed");
            }
        }
        failed
    }
}

/// Lock key for one record.
pub fn lock_key(model: &str, id: &Value) -> String {
    format!("{}:{}", model, id_key(id).unwrap_or_else(|| id.to_string()))
}

/// Per-record async locks serializing relation changes that touch the same records.
#[derive(Default)]
pub struct RelationLocks {
    entries: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

#[must_use]
pub struct RelationGuard {
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl RelationLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock every key, in sorted order. Idle entries are pruned on the way.
    pub async fn acquire(&self, mut keys: Vec<String>) -> RelationGuard {
        keys.sort();
        keys.dedup();
        let mutexes: Vec<_> = {
            let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
            entries.retain(|_, m| Arc::strong_count(m) > 1);
            keys.into_iter()
                .map(|k| Arc::clone(entries.entry(k).or_default()))
                .collect()
        };
        let mut guards = Vec::with_capacity(mutexes.len());
        for m in mutexes {
            guards.push(m.lock_owned().await);
        }
        RelationGuard { _guards: guards }
    }

    pub fn tracked(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
