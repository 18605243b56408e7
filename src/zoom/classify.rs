//! All provider-specific matching of registration responses lives here.
use super::model::ErrorResp;
use serde_json::Value;

/// Error code the provider uses for "too many registrations today".
pub const DAILY_RATE_LIMIT_CODE: i64 = 4300;

/// Outcome of one registration POST, derived only from status and body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationOutcome {
    Success { join_url: String },
    RateLimited,
    Transient { status: u16, body: String },
    Malformed { status: u16, body: String },
}

pub fn classify_registration(status: u16, body: &str) -> RegistrationOutcome {
    let json: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(_) => {
            return RegistrationOutcome::Malformed {
                status,
                body: body.to_string(),
            }
        }
    };

    if status == 429 || is_daily_rate_limit(&json) {
        return RegistrationOutcome::RateLimited;
    }

    match json.get("join_url").and_then(Value::as_str) {
        Some(url) if !url.is_empty() => RegistrationOutcome::Success {
            join_url: url.to_string(),
        },
        _ => RegistrationOutcome::Transient {
            status,
            body: body.to_string(),
        },
    }
}

fn is_daily_rate_limit(json: &Value) -> bool {
    let err: ErrorResp = serde_json::from_value(json.clone()).unwrap_or_default();
    err.code == Some(DAILY_RATE_LIMIT_CODE)
        && err
            .message
            .map(|m| m.to_lowercase().contains("rate limit"))
            .unwrap_or(false)
}
