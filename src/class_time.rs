//! Class start parsing and the coarse "how long until class" bucket.
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::ValidationError;

// "19:30 - 21:30 | Thứ Tư, ngày 22/10/2025"
static CLASS_TIME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(\d{1,2}):(\d{2})\s*-\s*\d{1,2}:\d{2}\s*\|.*?(\d{1,2})/(\d{1,2})/(\d{4})\s*$")
        .expect("valid class time regex")
});

/// Start instant of the class described by `raw`, read in `offset`.
pub fn parse_class_start(raw: &str, offset: FixedOffset) -> Result<DateTime<Utc>, ValidationError> {
    let invalid = || ValidationError::ClassTime(raw.to_string());
    let caps = CLASS_TIME_RE.captures(raw).ok_or_else(invalid)?;
    let num = |i: usize| caps[i].parse::<u32>().map_err(|_| invalid());

    let time = NaiveTime::from_hms_opt(num(1)?, num(2)?, 0).ok_or_else(invalid)?;
    let year = caps[5].parse::<i32>().map_err(|_| invalid())?;
    let date = NaiveDate::from_ymd_opt(year, num(4)?, num(3)?).ok_or_else(invalid)?;

    offset
        .from_local_datetime(&NaiveDateTime::new(date, time))
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(invalid)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeRemaining {
    Started,
    Days(i64),
    FewHours,
    FewMinutes,
    Now,
}

impl TimeRemaining {
    pub fn phrase(&self) -> String {
        match self {
            TimeRemaining::Started => "đã bắt đầu".to_string(),
            TimeRemaining::Days(n) => format!("còn {} ngày nữa", n),
            TimeRemaining::FewHours => "chỉ còn vài giờ nữa".to_string(),
            TimeRemaining::FewMinutes => "chỉ còn vài phút nữa".to_string(),
            TimeRemaining::Now => "sẽ bắt đầu ngay bây giờ".to_string(),
        }
    }
}

pub fn time_remaining(now: DateTime<Utc>, start: DateTime<Utc>) -> TimeRemaining {
    let left = start - now;
    if left < chrono::Duration::zero() {
        TimeRemaining::Started
    } else if left.num_days() >= 1 {
        TimeRemaining::Days(left.num_days())
    } else if left.num_hours() >= 1 {
        TimeRemaining::FewHours
    } else if left.num_minutes() > 10 {
        TimeRemaining::FewMinutes
    } else {
        TimeRemaining::Now
    }
}
