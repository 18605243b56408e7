//! Provider credentials and class metadata from the properties store.
use crate::config::ConfigError;
use crate::db::{self, Pool};
use anyhow::Result;
use std::collections::HashMap;
use std::fmt;

pub const ACCOUNT_ID: &str = "ZOOM_ACCOUNT_ID";
pub const CLIENT_ID: &str = "ZOOM_CLIENT_ID";
pub const CLIENT_SECRET: &str = "ZOOM_CLIENT_SECRET";
pub const MEETING_ID: &str = "MEETING_ID";

pub const CLASS_NAME: &str = "CLASS_NAME";
pub const CLASS_TIME: &str = "CLASS_TIME";
pub const CLASS_FORMAT: &str = "CLASS_FORMAT";
pub const CLASS_INSTRUCTOR: &str = "CLASS_INSTRUCTOR";
pub const CLASS_CONTACT: &str = "CLASS_CONTACT";

pub const REQUIRED_KEYS: [&str; 4] = [ACCOUNT_ID, CLIENT_ID, CLIENT_SECRET, MEETING_ID];

/// Loaded once per run and passed by reference.
#[derive(Clone, PartialEq, Eq)]
pub struct Settings {
    pub account_id: String,
    pub client_id: String,
    pub client_secret: String,
    pub meeting_id: String,
    pub class: ClassInfo,
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("account_id", &self.account_id)
            .field("client_id", &self.client_id)
            .field("meeting_id", &self.meeting_id)
            .field("class", &self.class)
            .finish_non_exhaustive()
    }
}

/// Optional class metadata used in email content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassInfo {
    pub name: String,
    /// Shaped like `19:30 - 21:30 | Thứ Tư, ngày 22/10/2025`.
    pub time: String,
    pub format: String,
    pub instructor: String,
    pub contact: String,
}

impl Settings {
    /// Build from raw key/value pairs. Every missing or blank required key is
    /// reported in a single error.
    pub fn from_map(props: &HashMap<String, String>) -> Result<Settings, ConfigError> {
        let value = |key: &str| {
            props
                .get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let missing: Vec<String> = REQUIRED_KEYS
            .iter()
            .filter(|key| value(key).is_none())
            .map(|key| key.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::MissingSettings(missing));
        }

        Ok(Settings {
            account_id: value(ACCOUNT_ID).unwrap_or_default(),
            client_id: value(CLIENT_ID).unwrap_or_default(),
            client_secret: value(CLIENT_SECRET).unwrap_or_default(),
            meeting_id: value(MEETING_ID).unwrap_or_default(),
            class: ClassInfo::from_map(props),
        })
    }
}

impl ClassInfo {
    pub fn from_map(props: &HashMap<String, String>) -> ClassInfo {
        let value = |key: &str| props.get(key).map(|v| v.trim().to_string()).unwrap_or_default();
        ClassInfo {
            name: value(CLASS_NAME),
            time: value(CLASS_TIME),
            format: value(CLASS_FORMAT),
            instructor: value(CLASS_INSTRUCTOR),
            contact: value(CLASS_CONTACT),
        }
    }
}

/// Read settings from the properties table.
pub async fn load(pool: &Pool) -> Result<Settings> {
    let props = db::all_properties(pool).await?;
    Ok(Settings::from_map(&props)?)
}

/// Class metadata alone; commands that never touch the provider do not
/// need credentials.
pub async fn load_class_info(pool: &Pool) -> Result<ClassInfo> {
    let props = db::all_properties(pool).await?;
    Ok(ClassInfo::from_map(&props))
}

/// Whether a property holds a secret that must not be echoed.
pub fn is_secret(key: &str) -> bool {
    key == CLIENT_SECRET
}
