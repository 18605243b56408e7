use crate::campaign;
use crate::clock::Clock;
use crate::config::Config;
use crate::db::{self, Pool};
use crate::notify::Notifier;
use crate::reminder;
use crate::settings;
use crate::schedule::{Scheduler, INVITATION_BATCH_HANDLER, REMINDER_HANDLER};
use anyhow::Result;
use chrono::{FixedOffset, Offset, Utc};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// Everything a fired trigger may need. `notifier` carries the class details
/// read at startup; each trigger refreshes them from the settings store.
#[derive(Clone)]
pub struct WorkerContext {
    pub pool: Pool,
    pub notifier: Notifier,
    pub scheduler: Arc<dyn Scheduler>,
    pub clock: Arc<dyn Clock>,
    pub config: Config,
}

impl WorkerContext {
    pub fn utc_offset(&self) -> FixedOffset {
        utc_offset(&self.config)
    }
}

pub fn utc_offset(cfg: &Config) -> FixedOffset {
    FixedOffset::east_opt(cfg.app.utc_offset_hours * 3600)
        .unwrap_or_else(|| Utc.fix())
}

/// Fire the earliest due trigger, if any. Returns whether one was claimed.
#[instrument(skip_all)]
pub async fn process_next_trigger(ctx: &WorkerContext) -> Result<bool> {
    let Some(trigger) = db::next_due_trigger(&ctx.pool, ctx.clock.now()).await? else {
        return Ok(false);
    };
    if !db::delete_trigger(&ctx.pool, &trigger.id).await? {
        // Claimed by someone else between the read and the delete.
        return Ok(true);
    }

    // Class details may have changed since the worker started.
    let notifier = match settings::load_class_info(&ctx.pool).await {
        Ok(class) => ctx.notifier.with_class(class),
        Err(err) => {
            warn!(?err, "could not reload class info; using startup copy");
            ctx.notifier.clone()
        }
    };

    match trigger.handler.as_str() {
        INVITATION_BATCH_HANDLER => {
            match campaign::run_tick(
                &ctx.pool,
                &notifier,
                ctx.scheduler.as_ref(),
                ctx.clock.as_ref(),
                &ctx.config.campaign,
            )
            .await
            {
                Ok(report) => info!(id = %trigger.id, ?report, "invitation continuation ran"),
                Err(err) => error!(?err, id = %trigger.id, "invitation continuation failed"),
            }
        }
        REMINDER_HANDLER => {
            match reminder::send_reminders(
                &ctx.pool,
                &notifier,
                ctx.clock.as_ref(),
                ctx.utc_offset(),
            )
            .await
            {
                Ok(summary) => info!(id = %trigger.id, ?summary, "scheduled reminders ran"),
                Err(err) => error!(?err, id = %trigger.id, "scheduled reminders failed"),
            }
        }
        other => warn!(id = %trigger.id, handler = other, "unknown trigger handler; dropped"),
    }
    Ok(true)
}
