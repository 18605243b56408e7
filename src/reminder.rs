//! Class reminders: send now, or schedule at fixed offsets before class.
use anyhow::Result;
use chrono::FixedOffset;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::class_time::{parse_class_start, time_remaining};
use crate::clock::Clock;
use crate::db::{self, Pool};
use crate::identity::{is_valid_email, normalize_email};
use crate::notify::{Notification, Notifier};
use crate::schedule::{Scheduler, TriggerHandle, REMINDER_HANDLER};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReminderSummary {
    pub sent: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Remind every registrant once. Refuses to send anything when the class
/// time cannot be parsed.
#[instrument(skip_all)]
pub async fn send_reminders(
    pool: &Pool,
    notifier: &Notifier,
    clock: &dyn Clock,
    offset: FixedOffset,
) -> Result<ReminderSummary> {
    let start = parse_class_start(&notifier.class().time, offset)?;
    let remaining = time_remaining(clock.now(), start);

    let mut summary = ReminderSummary::default();
    let mut seen = HashSet::new();
    for registrant in db::list_registrants(pool).await? {
        let email = normalize_email(&registrant.email);
        if !is_valid_email(&email) || !seen.insert(email.clone()) {
            summary.skipped += 1;
            continue;
        }
        let notification = Notification::ClassReminder {
            name: registrant.name.clone(),
            join_url: registrant.join_url.clone(),
            remaining,
        };
        match notifier.send(&email, &notification).await {
            Ok(()) => summary.sent += 1,
            Err(err) => {
                warn!(?err, email = %email, "reminder failed");
                summary.failed += 1;
            }
        }
    }
    info!(
        sent = summary.sent,
        failed = summary.failed,
        skipped = summary.skipped,
        phrase = %remaining.phrase(),
        "reminders sent"
    );
    Ok(summary)
}

/// Replace the reminder triggers with one per offset that is still ahead.
#[instrument(skip_all)]
pub async fn schedule_reminders(
    scheduler: &dyn Scheduler,
    clock: &dyn Clock,
    class_time: &str,
    offset: FixedOffset,
    offsets_minutes: &[u64],
) -> Result<Vec<TriggerHandle>> {
    let start = parse_class_start(class_time, offset)?;
    let now = clock.now();

    scheduler.cancel(REMINDER_HANDLER).await?;
    let mut handles = Vec::new();
    for minutes in offsets_minutes {
        let fire_at = start - chrono::Duration::minutes(*minutes as i64);
        if fire_at <= now {
            info!(minutes, "reminder offset already passed; skipping");
            continue;
        }
        let delay = (fire_at - now).to_std().unwrap_or(Duration::ZERO);
        handles.push(scheduler.schedule_once(REMINDER_HANDLER, delay).await?);
    }
    info!(count = handles.len(), "reminders scheduled");
    Ok(handles)
}
