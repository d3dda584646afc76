//! Trigger scheduler contract and an in-memory implementation.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use gatherer_types::TriggerId;

use crate::error::{self, StoreError};

/// Creates and removes scheduled triggers on the host.
///
/// `name` describes the schedule (e.g. `"recurring"`, `"on_edit"`);
/// `handler` names the entry point the host invokes when it fires.
#[async_trait]
pub trait TriggerScheduler: Send + Sync {
    /// Register a trigger and return its host-assigned id.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the host refuses the trigger.
    async fn create_trigger(&self, name: &str, handler: &str) -> error::Result<TriggerId>;

    /// Remove a trigger.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::TriggerNotFound`] for unknown ids.
    async fn delete_trigger(&self, id: &TriggerId) -> error::Result<()>;
}

/// A trigger registered with [`MemoryScheduler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledTrigger {
    pub id: TriggerId,
    pub name: String,
    pub handler: String,
}

/// Scheduler that keeps triggers in a map and hands out sequential ids.
#[derive(Default)]
pub struct MemoryScheduler {
    next_id: AtomicU64,
    triggers: Mutex<BTreeMap<TriggerId, ScheduledTrigger>>,
}

impl MemoryScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Currently registered triggers, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::LockPoisoned`] if the lock is poisoned.
    pub fn triggers(&self) -> error::Result<Vec<ScheduledTrigger>> {
        Ok(self.lock()?.values().cloned().collect())
    }

    /// Number of live triggers bound to `handler`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::LockPoisoned`] if the lock is poisoned.
    pub fn count_for_handler(&self, handler: &str) -> error::Result<usize> {
        Ok(self.lock()?.values().filter(|t| t.handler == handler).count())
    }

    fn lock(&self) -> error::Result<MutexGuard<'_, BTreeMap<TriggerId, ScheduledTrigger>>> {
        self.triggers.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

#[async_trait]
impl TriggerScheduler for MemoryScheduler {
    async fn create_trigger(&self, name: &str, handler: &str) -> error::Result<TriggerId> {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let id = TriggerId::new(format!("trigger-{n}"));
        self.lock()?.insert(
            id.clone(),
            ScheduledTrigger {
                id: id.clone(),
                name: name.to_string(),
                handler: handler.to_string(),
            },
        );
        tracing::debug!(trigger = %id, name, handler, "Trigger created");
        Ok(id)
    }

    async fn delete_trigger(&self, id: &TriggerId) -> error::Result<()> {
        self.lock()?
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::TriggerNotFound(id.to_string()))
    }
}
