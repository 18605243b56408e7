//! Configuration loader and validator for the class roster tool.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
    #[error("Missing settings: {}", .0.join(", "))]
    MissingSettings(Vec<String>),
}

/// Deployment config. Per-class values (credentials, meeting id, class
/// details) are not here; they live in the settings store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub zoom: Zoom,
    #[serde(default)]
    pub form: Form,
    pub mail: Mail,
    #[serde(default)]
    pub campaign: Campaign,
    #[serde(default)]
    pub reminders: Reminders,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    pub poll_interval_ms: u64,
    /// Offset of the class's local time zone, used for "time in" and class times.
    #[serde(default = "default_utc_offset_hours")]
    pub utc_offset_hours: i32,
}

/// Meeting provider endpoints. Credentials live in the settings store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Zoom {
    pub api_base: String,
    pub oauth_base: String,
}

/// Column offsets of the submission payload (0-based).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Form {
    pub email_column: usize,
    pub name_column: usize,
    pub phone_column: usize,
}

impl Default for Form {
    fn default() -> Self {
        Self {
            email_column: 1,
            name_column: 2,
            phone_column: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MailProvider {
    Console,
    Http,
}

/// Outgoing mail settings; sender and reply-to are fixed for every message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Mail {
    pub provider: MailProvider,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: String,
    pub sender_email: String,
    pub sender_name: String,
    pub reply_to: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Campaign {
    pub batch_size: usize,
    pub send_delay_ms: u64,
    pub continuation_delay_secs: u64,
}

impl Default for Campaign {
    fn default() -> Self {
        Self {
            batch_size: 20,
            send_delay_ms: 500,
            continuation_delay_secs: 60,
        }
    }
}

impl Campaign {
    pub fn send_delay(&self) -> Duration {
        Duration::from_millis(self.send_delay_ms)
    }

    pub fn continuation_delay(&self) -> Duration {
        Duration::from_secs(self.continuation_delay_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Reminders {
    /// Minutes before class start at which scheduled reminders fire.
    pub offsets_minutes: Vec<u64>,
}

impl Default for Reminders {
    fn default() -> Self {
        Self {
            offsets_minutes: vec![1440, 60],
        }
    }
}

fn default_utc_offset_hours() -> i32 {
    7
}

impl Config {
    /// Create `app.data_dir` so the default database file has a home.
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }

    /// `DATABASE_URL` wins; otherwise a sqlite file inside `app.data_dir`.
    pub fn database_url(&self) -> String {
        std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| format!("sqlite://{}/roster.db", self.app.data_dir))
    }
}

/// Read and validate a YAML config; `None` means `./config.yaml`.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Reject values that would make a later run misbehave rather than fail.
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.app.poll_interval_ms == 0 {
        return Err(ConfigError::Invalid("app.poll_interval_ms must be > 0"));
    }
    if !(-12..=14).contains(&cfg.app.utc_offset_hours) {
        return Err(ConfigError::Invalid("app.utc_offset_hours must be within -12..=14"));
    }

    if cfg.zoom.api_base.trim().is_empty() {
        return Err(ConfigError::Invalid("zoom.api_base must be non-empty"));
    }
    if cfg.zoom.oauth_base.trim().is_empty() {
        return Err(ConfigError::Invalid("zoom.oauth_base must be non-empty"));
    }

    if cfg.mail.sender_email.trim().is_empty() {
        return Err(ConfigError::Invalid("mail.sender_email must be non-empty"));
    }
    if cfg.mail.reply_to.trim().is_empty() {
        return Err(ConfigError::Invalid("mail.reply_to must be non-empty"));
    }
    if cfg.mail.provider == MailProvider::Http {
        if cfg.mail.endpoint.trim().is_empty() {
            return Err(ConfigError::Invalid("mail.endpoint must be non-empty for the http provider"));
        }
        if cfg.mail.api_key.trim().is_empty() {
            return Err(ConfigError::Invalid("mail.api_key must be non-empty for the http provider"));
        }
    }

    if cfg.campaign.batch_size == 0 {
        return Err(ConfigError::Invalid("campaign.batch_size must be > 0"));
    }
    if cfg.campaign.continuation_delay_secs == 0 {
        return Err(ConfigError::Invalid("campaign.continuation_delay_secs must be > 0"));
    }

    Ok(())
}

/// Returns the example YAML content.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  poll_interval_ms: 1000
  utc_offset_hours: 7

zoom:
  api_base: "https://api.zoom.us/"
  oauth_base: "https://zoom.us/"

form:
  email_column: 1
  name_column: 2
  phone_column: 3

mail:
  provider: "console"
  endpoint: "https://api.sendgrid.com/v3/mail/send"
  api_key: ""
  sender_email: "trong@hovantrong.com"
  sender_name: "Hồ Văn Trọng"
  reply_to: "trong@hovantrong.com"

campaign:
  batch_size: 20
  send_delay_ms: 500
  continuation_delay_secs: 60

reminders:
  offsets_minutes:
    - 1440
    - 60
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parse_example_ok() {
        let cfg: Config = serde_yaml::from_str(example()).unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.campaign.batch_size, 20);
        assert_eq!(cfg.campaign.send_delay(), Duration::from_millis(500));
        assert_eq!(cfg.mail.provider, MailProvider::Console);
    }

    #[test]
    fn optional_sections_default() {
        let yaml = r#"app:
  data_dir: "./data"
  poll_interval_ms: 500
zoom:
  api_base: "https://api.zoom.us/"
  oauth_base: "https://zoom.us/"
mail:
  provider: "console"
  sender_email: "a@b.co"
  sender_name: "A"
  reply_to: "a@b.co"
"#;
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.app.utc_offset_hours, 7);
        assert_eq!(cfg.form, Form::default());
        assert_eq!(cfg.campaign, Campaign::default());
        assert_eq!(cfg.reminders.offsets_minutes, vec![1440, 60]);
    }

    #[test]
    fn http_provider_requires_key() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.mail.provider = MailProvider::Http;
        cfg.mail.api_key = "".into();
        let err = validate(&cfg).unwrap_err();
        match err { ConfigError::Invalid(msg) => assert!(msg.contains("mail.api_key")), _ => panic!("wrong error") }
    }

    #[test]
    fn invalid_campaign_values() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.campaign.batch_size = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.campaign.continuation_delay_secs = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn invalid_endpoints() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.zoom.api_base = " ".into();
        let err = validate(&cfg).unwrap_err();
        match err { ConfigError::Invalid(msg) => assert!(msg.contains("zoom.api_base")), _ => panic!("wrong error") }
    }

    #[test]
    fn missing_settings_message_lists_every_key() {
        let err = ConfigError::MissingSettings(vec!["ZOOM_CLIENT_ID".into(), "MEETING_ID".into()]);
        assert_eq!(err.to_string(), "Missing settings: ZOOM_CLIENT_ID, MEETING_ID");
    }

    #[test]
    fn ensure_dirs_creates_data_dir() {
        let td = tempdir().unwrap();
        let data_path = td.path().join("data");
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.data_dir = data_path.to_string_lossy().to_string();
        cfg.ensure_dirs().unwrap();
        assert!(data_path.exists());
    }

    #[test]
    fn load_from_file_ok() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.yaml");
        fs::write(&p, example()).unwrap();
        let cfg = load(Some(&p)).unwrap();
        assert_eq!(cfg.reminders.offsets_minutes, vec![1440, 60]);
    }
}
