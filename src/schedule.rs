//! One-shot triggers that re-invoke a named handler later.
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::clock::Clock;
use crate::db::{self, Pool};

/// Continues the invitation campaign.
pub const INVITATION_BATCH_HANDLER: &str = "send_invitation_batch";
/// Sends class reminders to every registrant.
pub const REMINDER_HANDLER: &str = "send_reminders";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerHandle {
    pub id: String,
    pub handler: String,
    pub due_at: DateTime<Utc>,
}

#[async_trait]
pub trait Scheduler: Send + Sync {
    async fn schedule_once(&self, handler: &str, delay: Duration) -> Result<TriggerHandle>;

    /// Drop every pending trigger for `handler`; returns how many existed.
    async fn cancel(&self, handler: &str) -> Result<u64>;

    async fn is_scheduled(&self, handler: &str) -> Result<bool>;
}

/// Triggers persisted in the `triggers` table and fired by the worker loop.
#[derive(Clone)]
pub struct SqliteScheduler {
    pool: Pool,
    clock: Arc<dyn Clock>,
}

impl SqliteScheduler {
    pub fn new(pool: Pool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    pub async fn pending(&self, handler: &str) -> Result<Vec<TriggerHandle>> {
        Ok(db::triggers_for(&self.pool, handler)
            .await?
            .into_iter()
            .map(|t| TriggerHandle {
                id: t.id,
                handler: t.handler,
                due_at: t.due_at,
            })
            .collect())
    }
}

#[async_trait]
impl Scheduler for SqliteScheduler {
    #[instrument(skip_all, fields(handler = %handler))]
    async fn schedule_once(&self, handler: &str, delay: Duration) -> Result<TriggerHandle> {
        let delay = chrono::Duration::from_std(delay).context("trigger delay out of range")?;
        let handle = TriggerHandle {
            id: Uuid::new_v4().to_string(),
            handler: handler.to_string(),
            due_at: self.clock.now() + delay,
        };
        db::insert_trigger(&self.pool, &handle.id, handler, handle.due_at).await?;
        debug!(id = %handle.id, due_at = %handle.due_at, "trigger scheduled");
        Ok(handle)
    }

    async fn cancel(&self, handler: &str) -> Result<u64> {
        db::delete_triggers_for(&self.pool, handler).await
    }

    async fn is_scheduled(&self, handler: &str) -> Result<bool> {
        Ok(!db::triggers_for(&self.pool, handler).await?.is_empty())
    }
}
