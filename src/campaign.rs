//! Invitation campaign driven in bounded ticks.
//!
//! Each tick sends to at most `batch_size` pending rows, then either
//! schedules exactly one continuation or, once nothing is left, removes it.
//! Row statuses are the source of truth; the counters in the properties
//! store are a running sum kept only for progress reports.
use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::config;
use crate::db::{self, InvitationCounts, Pool};
use crate::identity::{is_valid_email, normalize_email, standardize_name};
use crate::model::{truncate_chars, CampaignProgress, InvitationStatus};
use crate::notify::{Notification, Notifier};
use crate::schedule::{Scheduler, INVITATION_BATCH_HANDLER};

pub const LOCK_NAME: &str = "invitation_batch";
/// Row error text is cut to this many characters.
pub const ERROR_TEXT_LIMIT: usize = 200;

pub const TOTAL_SENT_KEY: &str = "INVITE_TOTAL_SENT";
pub const TOTAL_FAILED_KEY: &str = "INVITE_TOTAL_FAILED";
pub const UPDATED_AT_KEY: &str = "INVITE_UPDATED_AT";

fn lock_ttl() -> chrono::Duration {
    chrono::Duration::minutes(5)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub sent: usize,
    pub failed: usize,
    /// Pending rows whose email does not validate. They stay pending.
    pub skipped_invalid: usize,
    /// Sendable rows left for a later tick.
    pub remaining: usize,
    pub continuation_scheduled: bool,
}

/// Run one tick. `None` means another tick holds the lock and nothing was done.
#[instrument(skip_all)]
pub async fn run_tick(
    pool: &Pool,
    notifier: &Notifier,
    scheduler: &dyn Scheduler,
    clock: &dyn Clock,
    cfg: &config::Campaign,
) -> Result<Option<TickReport>> {
    let holder = Uuid::new_v4().to_string();
    if !db::try_acquire_lock(pool, LOCK_NAME, &holder, clock.now(), lock_ttl()).await? {
        warn!("another invitation tick is running; skipping");
        return Ok(None);
    }

    let result = tick(pool, notifier, scheduler, clock, cfg).await;
    if let Err(err) = db::release_lock(pool, LOCK_NAME, &holder).await {
        warn!(?err, "failed to release invitation lock");
    }
    result.map(Some)
}

async fn tick(
    pool: &Pool,
    notifier: &Notifier,
    scheduler: &dyn Scheduler,
    clock: &dyn Clock,
    cfg: &config::Campaign,
) -> Result<TickReport> {
    let rows = db::list_invitations(pool).await?;
    let mut report = TickReport::default();
    let mut attempted = 0usize;
    // Set when a row outcome could not be stored; later rows wait for the
    // continuation instead of being sent.
    let mut storage_err: Option<anyhow::Error> = None;

    for row in rows {
        // `sent` is final; `error` waits for an operator reset.
        if row.status != InvitationStatus::Pending {
            continue;
        }
        let email = normalize_email(&row.email);
        if !is_valid_email(&email) {
            report.skipped_invalid += 1;
            continue;
        }
        if attempted >= cfg.batch_size || storage_err.is_some() {
            report.remaining += 1;
            continue;
        }

        if attempted > 0 && !cfg.send_delay().is_zero() {
            tokio::time::sleep(cfg.send_delay()).await;
        }
        attempted += 1;

        let notification = Notification::Invitation {
            name: standardize_name(&row.name),
        };
        let stored = match notifier.send(&email, &notification).await {
            Ok(()) => db::mark_invitation_sent(pool, row.id, clock.now())
                .await
                .map(|()| report.sent += 1),
            Err(err) => {
                let text = truncate_chars(&err.to_string(), ERROR_TEXT_LIMIT);
                warn!(row_id = row.id, email = %email, error = %text, "invitation failed");
                db::mark_invitation_error(pool, row.id, &text)
                    .await
                    .map(|()| report.failed += 1)
            }
        };
        if let Err(err) = stored {
            error!(?err, row_id = row.id, "could not store invitation outcome; halting tick");
            report.remaining += 1;
            storage_err = Some(err);
        }
    }

    // Replace rather than add, so two continuations never race.
    scheduler.cancel(INVITATION_BATCH_HANDLER).await?;
    if report.remaining > 0 {
        scheduler
            .schedule_once(INVITATION_BATCH_HANDLER, cfg.continuation_delay())
            .await?;
        report.continuation_scheduled = true;
    }

    record_progress(pool, report.sent as i64, report.failed as i64, clock.now()).await?;
    if let Some(err) = storage_err {
        return Err(err.context(format!(
            "invitation tick halted after {} sent, {} failed",
            report.sent, report.failed
        )));
    }
    info!(
        sent = report.sent,
        failed = report.failed,
        remaining = report.remaining,
        skipped_invalid = report.skipped_invalid,
        continuation = report.continuation_scheduled,
        "invitation tick finished"
    );
    Ok(report)
}

async fn read_counter(pool: &Pool, key: &str) -> Result<i64> {
    Ok(db::get_property(pool, key)
        .await?
        .and_then(|v| v.parse().ok())
        .unwrap_or(0))
}

/// Add this tick's numbers to the stored running totals.
pub async fn record_progress(pool: &Pool, sent: i64, failed: i64, at: DateTime<Utc>) -> Result<()> {
    let total_sent = read_counter(pool, TOTAL_SENT_KEY).await? + sent;
    let total_failed = read_counter(pool, TOTAL_FAILED_KEY).await? + failed;
    db::set_property(pool, TOTAL_SENT_KEY, &total_sent.to_string()).await?;
    db::set_property(pool, TOTAL_FAILED_KEY, &total_failed.to_string()).await?;
    db::set_property(pool, UPDATED_AT_KEY, &at.to_rfc3339()).await?;
    Ok(())
}

pub async fn load_progress(pool: &Pool) -> Result<CampaignProgress> {
    let updated_at = db::get_property(pool, UPDATED_AT_KEY)
        .await?
        .and_then(|v| DateTime::parse_from_rfc3339(&v).ok())
        .map(|dt| dt.with_timezone(&Utc));
    Ok(CampaignProgress {
        total_sent: read_counter(pool, TOTAL_SENT_KEY).await?,
        total_failed: read_counter(pool, TOTAL_FAILED_KEY).await?,
        updated_at,
    })
}

pub async fn reset_progress(pool: &Pool) -> Result<()> {
    for key in [TOTAL_SENT_KEY, TOTAL_FAILED_KEY, UPDATED_AT_KEY] {
        db::delete_property(pool, key).await?;
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CampaignState {
    /// A continuation trigger is registered.
    Running,
    Idle,
    /// Idle with no pending rows left.
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressView {
    pub progress: CampaignProgress,
    pub rows: InvitationCounts,
    pub state: CampaignState,
}

pub async fn progress(pool: &Pool, scheduler: &dyn Scheduler) -> Result<ProgressView> {
    let rows = db::invitation_counts(pool).await?;
    let state = if scheduler.is_scheduled(INVITATION_BATCH_HANDLER).await? {
        CampaignState::Running
    } else if rows.pending == 0 {
        CampaignState::Done
    } else {
        CampaignState::Idle
    };
    Ok(ProgressView {
        progress: load_progress(pool).await?,
        rows,
        state,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[tokio::test]
    async fn progress_counters_accumulate_across_ticks() {
        let pool = db::init_memory_pool().await.unwrap();
        let t0 = Utc.with_ymd_and_hms(2025, 10, 1, 8, 0, 0).unwrap();
        record_progress(&pool, 20, 1, t0).await.unwrap();
        record_progress(&pool, 4, 0, t0 + chrono::Duration::minutes(1)).await.unwrap();

        let p = load_progress(&pool).await.unwrap();
        assert_eq!(p.total_sent, 24);
        assert_eq!(p.total_failed, 1);
        assert_eq!(p.updated_at, Some(t0 + chrono::Duration::minutes(1)));

        reset_progress(&pool).await.unwrap();
        assert_eq!(load_progress(&pool).await.unwrap(), CampaignProgress::default());
    }
}
