use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

#[derive(Deserialize, Debug)]
pub struct TokenResp {
    pub access_token: Option<String>,
}

/// Error shape shared by provider endpoints.
#[derive(Deserialize, Debug, Default)]
pub struct ErrorResp {
    pub code: Option<i64>,
    pub message: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct ReportPage {
    /// `None` when the field is absent or null; entries that are not objects
    /// are dropped without failing the page.
    #[serde(default, deserialize_with = "entries_skipping_bad")]
    pub participants: Option<Vec<Participant>>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// One attendance report entry. A participant who rejoins shows up once per
/// session. Guests come back with null or empty fields, so every field
/// accepts any JSON value and falls back to its default.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub user_email: String,
    #[serde(default, deserialize_with = "lenient_seconds")]
    pub duration: i64,
    #[serde(default, deserialize_with = "lenient_time")]
    pub join_time: Option<DateTime<Utc>>,
}

fn entries_skipping_bad<'de, D: Deserializer<'de>>(
    d: D,
) -> Result<Option<Vec<Participant>>, D::Error> {
    let raw: Option<Vec<Value>> = Option::deserialize(d)?;
    Ok(raw.map(|items| {
        items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect()
    }))
}

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::String(s) => s,
        _ => String::new(),
    })
}

fn lenient_seconds<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    })
}

fn lenient_time<'de, D: Deserializer<'de>>(d: D) -> Result<Option<DateTime<Utc>>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|t| t.with_timezone(&Utc)),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn odd_entries_keep_the_page_parseable() {
        let body = r#"{
            "next_page_token": "p2",
            "participants": [
                {"name": "An", "user_email": "a@x.co", "duration": 600, "join_time": "2025-10-22T12:31:00Z"},
                {"name": null, "user_email": null, "duration": 60, "join_time": ""},
                {"user_email": "", "duration": "30"},
                null,
                {"name": "Guest", "duration": 12.0, "join_time": null}
            ]
        }"#;
        let page: ReportPage = serde_json::from_str(body).unwrap();
        let entries = page.participants.unwrap();
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[0].user_email, "a@x.co");
        assert_eq!(
            entries[0].join_time,
            Some(Utc.with_ymd_and_hms(2025, 10, 22, 12, 31, 0).unwrap())
        );
        assert_eq!(entries[1].name, "");
        assert_eq!(entries[1].user_email, "");
        assert_eq!(entries[1].join_time, None);
        assert_eq!(entries[2].duration, 30);
        assert_eq!(entries[3].duration, 12);
        assert_eq!(page.next_page_token.as_deref(), Some("p2"));
    }

    #[test]
    fn missing_participants_field_is_none() {
        let page: ReportPage =
            serde_json::from_str(r#"{"code": 3001, "message": "Meeting does not exist"}"#).unwrap();
        assert!(page.participants.is_none());
    }
}
