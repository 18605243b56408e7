//! Post-class attendance: fold report entries per email and write the
//! result columns back to the registrant sheet.
//!
//! Repeated entries for one email are treated as rejoins: durations add up
//! and the earliest join wins. The provider may also report duplicates for a
//! single session, which this double-counts; true interval coverage is not
//! reconstructed.
use anyhow::{bail, Result};
use chrono::FixedOffset;
use std::collections::HashMap;
use tracing::{info, instrument};

use crate::db::{self, Pool};
use crate::identity::normalize_email;
use crate::model::{AttendanceCells, AttendanceRecord, AttendanceStatus, Registrant};
use crate::settings::Settings;
use crate::zoom::{MeetingProvider, Participant};

/// Entries without an email cannot be matched to a row and are dropped.
pub fn aggregate_by_email(entries: &[Participant]) -> HashMap<String, AttendanceRecord> {
    let mut map: HashMap<String, AttendanceRecord> = HashMap::new();
    for entry in entries {
        let email = normalize_email(&entry.user_email);
        if email.is_empty() {
            continue;
        }
        map.entry(email)
            .and_modify(|rec| {
                rec.duration += entry.duration;
                if let Some(joined) = entry.join_time {
                    if rec.join_time.map_or(true, |current| joined < current) {
                        rec.join_time = Some(joined);
                    }
                }
            })
            .or_insert(AttendanceRecord {
                duration: entry.duration,
                join_time: entry.join_time,
            });
    }
    map
}

/// Result cells for each registrant row, in row order.
pub fn attendance_rows(
    registrants: &[Registrant],
    report: &HashMap<String, AttendanceRecord>,
    offset: FixedOffset,
) -> Vec<(i64, AttendanceCells)> {
    registrants
        .iter()
        .map(|r| {
            let cells = match report.get(&normalize_email(&r.email)) {
                Some(rec) => AttendanceCells {
                    status: AttendanceStatus::Attended,
                    duration: rec.duration,
                    time_in: rec
                        .join_time
                        .map(|t| t.with_timezone(&offset).format("%H:%M").to_string())
                        .unwrap_or_default(),
                },
                None => AttendanceCells {
                    status: AttendanceStatus::Absent,
                    duration: 0,
                    time_in: String::new(),
                },
            };
            (r.id, cells)
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSummary {
    pub rows: usize,
    pub attended: usize,
}

/// Fetch the report, aggregate it and overwrite every row's result columns.
#[instrument(skip_all)]
pub async fn sync_attendance(
    pool: &Pool,
    provider: &dyn MeetingProvider,
    settings: &Settings,
    offset: FixedOffset,
) -> Result<SyncSummary> {
    let registrants = db::list_registrants(pool).await?;
    if registrants.is_empty() {
        bail!("no registrant rows to sync");
    }

    let entries = provider.fetch_all_participants(&settings.meeting_id).await;
    let report = aggregate_by_email(&entries);
    let rows = attendance_rows(&registrants, &report, offset);
    let attended = rows
        .iter()
        .filter(|(_, c)| c.status == AttendanceStatus::Attended)
        .count();

    db::write_attendance(pool, &rows).await?;
    info!(rows = rows.len(), attended, entries = entries.len(), "attendance synced");
    Ok(SyncSummary {
        rows: rows.len(),
        attended,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn entry(email: &str, duration: i64, join: Option<DateTime<Utc>>) -> Participant {
        Participant {
            name: String::new(),
            user_email: email.into(),
            duration,
            join_time: join,
        }
    }

    #[test]
    fn sums_duration_and_keeps_earliest_join() {
        let t0 = Utc.with_ymd_and_hms(2025, 10, 22, 12, 30, 0).unwrap();
        let entries = vec![
            entry("e@x.co", 10, Some(t0)),
            entry("e@x.co", 5, Some(t0 + Duration::minutes(5))),
        ];
        let map = aggregate_by_email(&entries);
        assert_eq!(map.len(), 1);
        assert_eq!(
            map["e@x.co"],
            AttendanceRecord {
                duration: 15,
                join_time: Some(t0)
            }
        );
    }

    #[test]
    fn later_entry_with_earlier_join_replaces() {
        let t0 = Utc.with_ymd_and_hms(2025, 10, 22, 12, 30, 0).unwrap();
        let entries = vec![
            entry("E@x.co ", 7, Some(t0 + Duration::minutes(9))),
            entry("e@x.co", 3, None),
            entry("e@x.co", 2, Some(t0)),
            entry("", 99, Some(t0)),
        ];
        let map = aggregate_by_email(&entries);
        assert_eq!(map.len(), 1);
        assert_eq!(map["e@x.co"].duration, 12);
        assert_eq!(map["e@x.co"].join_time, Some(t0));
    }

    #[test]
    fn entries_without_email_are_dropped() {
        let t0 = Utc.with_ymd_and_hms(2025, 10, 22, 12, 30, 0).unwrap();
        let entries = vec![
            entry("", 600, Some(t0)),
            entry("   ", 300, None),
            entry("b@x.co", 40, None),
        ];
        let map = aggregate_by_email(&entries);
        assert_eq!(map.len(), 1);
        assert_eq!(
            map["b@x.co"],
            AttendanceRecord {
                duration: 40,
                join_time: None
            }
        );
    }

    #[test]
    fn rows_get_attended_or_absent_cells() {
        let t0 = Utc.with_ymd_and_hms(2025, 10, 22, 12, 31, 0).unwrap();
        let report = aggregate_by_email(&[entry("a@x.co", 3600, Some(t0))]);
        let registrants = vec![
            Registrant {
                id: 1,
                email: "A@x.co".into(),
                name: "A".into(),
                phone: String::new(),
                join_url: None,
            },
            Registrant {
                id: 2,
                email: "b@x.co".into(),
                name: "B".into(),
                phone: String::new(),
                join_url: None,
            },
        ];
        let offset = FixedOffset::east_opt(7 * 3600).unwrap();
        let rows = attendance_rows(&registrants, &report, offset);
        assert_eq!(
            rows[0].1,
            AttendanceCells {
                status: AttendanceStatus::Attended,
                duration: 3600,
                time_in: "19:31".into()
            }
        );
        assert_eq!(
            rows[1].1,
            AttendanceCells {
                status: AttendanceStatus::Absent,
                duration: 0,
                time_in: String::new()
            }
        );
    }
}
