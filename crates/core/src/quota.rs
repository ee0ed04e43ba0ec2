//! Free-trial message quota, counted per business against an injected
//! key-value store.
//!
//! The counter is advisory: it lives wherever the caller keeps the store
//! (browser-local storage in the original product, a SQLite table behind the
//! HTTP API here) and a visitor who clears that state starts over. It gates
//! convenience, not security.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

use crate::domain::conversation::BusinessId;

/// Messages a visitor may send to a business before signup is required.
pub const MAX_FREE_MESSAGES: u32 = 3;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("counter store failure: {0}")]
pub struct CounterStoreError(pub String);

/// Key-value capability backing the quota counter. Injected so tests can use
/// an in-memory map and production a durable store without touching the
/// tracker logic.
#[async_trait]
pub trait CounterStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<i64>, CounterStoreError>;
    async fn set(&self, key: &str, value: i64) -> Result<(), CounterStoreError>;
}

pub fn quota_key(business_id: &BusinessId) -> String {
    format!("chat_count_{business_id}")
}

pub struct QuotaTracker {
    limit: u32,
    store: Arc<dyn CounterStore>,
}

impl QuotaTracker {
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self::with_limit(MAX_FREE_MESSAGES, store)
    }

    pub fn with_limit(limit: u32, store: Arc<dyn CounterStore>) -> Self {
        Self { limit, store }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Messages the visitor may still send to this business. Absent state
    /// yields the full allowance; so does a store failure, since an advisory
    /// counter must never block the chat on its own outage.
    pub async fn remaining(&self, business_id: &BusinessId) -> u32 {
        let consumed = match self.store.get(&quota_key(business_id)).await {
            Ok(value) => value.unwrap_or(0).max(0) as u64,
            Err(error) => {
                warn!(
                    event_name = "quota.counter_read_failed",
                    business_id = %business_id,
                    error = %error,
                    "treating counter read failure as zero consumption"
                );
                0
            }
        };

        u64::from(self.limit).saturating_sub(consumed) as u32
    }

    /// Record one consumed message. Deliberately not idempotent: every call
    /// counts, and the caller invokes it at most once per accepted message.
    pub async fn increment(&self, business_id: &BusinessId) {
        let key = quota_key(business_id);
        let consumed = match self.store.get(&key).await {
            Ok(value) => value.unwrap_or(0).max(0),
            Err(error) => {
                warn!(
                    event_name = "quota.counter_read_failed",
                    business_id = %business_id,
                    error = %error,
                    "treating counter read failure as zero consumption"
                );
                0
            }
        };

        if let Err(error) = self.store.set(&key, consumed + 1).await {
            warn!(
                event_name = "quota.counter_write_failed",
                business_id = %business_id,
                error = %error,
                "dropping quota increment"
            );
        }
    }
}
