use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One row of the registrant sheet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Registrant {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub phone: String,
    pub join_url: Option<String>,
}

/// Aggregated presence for one email across all report entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttendanceRecord {
    pub duration: i64,
    pub join_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AttendanceStatus {
    Attended,
    Absent,
}

impl AttendanceStatus {
    /// Label written into the status column.
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Attended => "Đã tham gia",
            AttendanceStatus::Absent => "Vắng",
        }
    }
}

/// Result columns written back to a registrant row by an attendance sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendanceCells {
    pub status: AttendanceStatus,
    pub duration: i64,
    pub time_in: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum InvitationStatus {
    Pending,
    Sent,
    Error,
}

impl InvitationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvitationStatus::Pending => "pending",
            InvitationStatus::Sent => "sent",
            InvitationStatus::Error => "error",
        }
    }

    /// Unknown or blank cells count as pending, like a freshly pasted row.
    pub fn parse_status(s: &str) -> InvitationStatus {
        match s.trim().to_ascii_lowercase().as_str() {
            "sent" => InvitationStatus::Sent,
            "error" => InvitationStatus::Error,
            _ => InvitationStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InvitationRow {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub status: InvitationStatus,
    pub sent_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Reporting-only counters kept in the properties store.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CampaignProgress {
    pub total_sent: i64,
    pub total_failed: i64,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Entry imported into the invitation sheet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewInvitation {
    pub email: String,
    #[serde(default)]
    pub name: String,
}

/// Cut `s` to at most `max` characters without splitting a code point.
pub fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parsing_defaults_to_pending() {
        assert_eq!(InvitationStatus::parse_status("sent"), InvitationStatus::Sent);
        assert_eq!(InvitationStatus::parse_status(" ERROR "), InvitationStatus::Error);
        assert_eq!(InvitationStatus::parse_status(""), InvitationStatus::Pending);
        assert_eq!(InvitationStatus::parse_status("weird"), InvitationStatus::Pending);
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("ngày", 3), "ngà");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }
}
