//! Append-only audit log
//!
//! Every pipeline stage records its input and output here, success or
//! rejection alike. Writes are fire-and-forget: a persistence failure goes
//! to the operational log and never blocks the business flow.

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::error;

use common::AuditEntry;

/// Storage backend for audit entries. Append-only: no update or delete in
/// normal operation, queryable per user.
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn append(&self, entry: AuditEntry) -> Result<()>;
    async fn entries_for_user(&self, user_id: &str) -> Result<Vec<AuditEntry>>;
}

/// In-memory audit store (tests and development).
pub struct InMemoryAuditStore {
    entries: RwLock<Vec<AuditEntry>>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryAuditStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn append(&self, entry: AuditEntry) -> Result<()> {
        self.entries.write().await.push(entry);
        Ok(())
    }

    async fn entries_for_user(&self, user_id: &str) -> Result<Vec<AuditEntry>> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect())
    }
}

/// Recording handle shared by all pipeline stages.
#[derive(Clone)]
pub struct AuditLog {
    store: Arc<dyn AuditStore>,
}

impl AuditLog {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> Arc<dyn AuditStore> {
        self.store.clone()
    }

    /// Record one stage invocation. Serialization or write failures are
    /// reported operationally and swallowed.
    pub async fn record<I, O>(&self, action: &str, input: &I, output: &O, user_id: &str)
    where
        I: Serialize + ?Sized,
        O: Serialize + ?Sized,
    {
        let input = to_value_or_null(input, action);
        let output = to_value_or_null(output, action);
        let entry = AuditEntry::new(action, input, output, user_id);

        if let Err(e) = self.store.append(entry).await {
            error!(action, user_id, error = %e, "audit write failed");
        }
    }
}

fn to_value_or_null<T: Serialize + ?Sized>(value: &T, action: &str) -> serde_json::Value {
    match serde_json::to_value(value) {
        Ok(v) => v,
        Err(e) => {
            error!(action, error = %e, "audit payload not serializable");
            serde_json::Value::Null
        }
    }
}
