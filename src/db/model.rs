//! Row views used by repositories.

use chrono::{DateTime, Utc};

/// A persisted one-shot trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerRow {
    pub id: String,
    pub handler: String,
    pub due_at: DateTime<Utc>,
}

/// Per-status row counts of the invitation sheet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InvitationCounts {
    pub pending: i64,
    pub sent: i64,
    pub error: i64,
}
