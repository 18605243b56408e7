use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use crate::config;
use crate::model::truncate_chars;
use crate::settings::Settings;

pub mod classify;
pub mod model;
pub mod token;

pub use classify::{classify_registration, RegistrationOutcome};
pub use model::Participant;
pub use token::{token_ttl, MemoryTokenStore, TokenStore};

use model::{ReportPage, TokenResp};

/// Page size requested from the report endpoint.
pub const REPORT_PAGE_SIZE: u32 = 300;
/// Provider bodies are cut to this many characters before logging.
pub const LOG_BODY_LIMIT: usize = 400;

/// What a registration attempt produced when it did not simply fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    Joined {
        join_url: String,
    },
    /// Carries the inputs back so the caller can write to the person.
    RateLimited {
        email: String,
        first_name: String,
        last_name: String,
    },
}

/// The meeting provider as seen by the submission and sync flows.
#[async_trait]
pub trait MeetingProvider: Send + Sync {
    /// `None` means the attempt failed and was logged; nothing is retried.
    async fn register_registrant(
        &self,
        email: &str,
        first_name: &str,
        last_name: &str,
    ) -> Option<Registration>;

    /// Every report entry reachable before the first bad page.
    async fn fetch_all_participants(&self, meeting_id: &str) -> Vec<Participant>;
}

#[derive(Clone)]
pub struct ZoomClient {
    http: Client,
    api_base: Url,
    oauth_base: Url,
    settings: Settings,
    tokens: Arc<dyn TokenStore>,
}

impl fmt::Debug for ZoomClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZoomClient")
            .field("api_base", &self.api_base)
            .field("oauth_base", &self.oauth_base)
            .finish_non_exhaustive()
    }
}

fn parse_base(raw: &str) -> Result<Url> {
    let with_slash = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{}/", raw)
    };
    Url::parse(&with_slash).with_context(|| format!("invalid base URL: {}", raw))
}

impl ZoomClient {
    pub fn new(cfg: &config::Zoom, settings: Settings, tokens: Arc<dyn TokenStore>) -> Result<Self> {
        let http = Client::builder()
            .user_agent("class-roster/0.1")
            .build()
            .context("reqwest client")?;
        Ok(Self {
            http,
            api_base: parse_base(&cfg.api_base)?,
            oauth_base: parse_base(&cfg.oauth_base)?,
            settings,
            tokens,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Cached bearer token, or a fresh client-credentials exchange. `None`
    /// means "cannot proceed"; callers must not loop on it.
    #[instrument(skip_all)]
    pub async fn access_token(&self) -> Option<String> {
        if let Some(token) = self.tokens.get() {
            return Some(token);
        }

        let url = match self.oauth_base.join("oauth/token") {
            Ok(url) => url,
            Err(err) => {
                error!(?err, "invalid oauth base URL");
                return None;
            }
        };
        let res = self
            .http
            .post(url)
            .query(&[
                ("grant_type", "account_credentials"),
                ("account_id", self.settings.account_id.as_str()),
            ])
            .basic_auth(&self.settings.client_id, Some(&self.settings.client_secret))
            .send()
            .await;
        let res = match res {
            Ok(res) => res,
            Err(err) => {
                error!(?err, "token request failed");
                return None;
            }
        };

        let status = res.status();
        let body = res.text().await.unwrap_or_default();
        match serde_json::from_str::<TokenResp>(&body) {
            Ok(TokenResp {
                access_token: Some(token),
            }) if !token.is_empty() => {
                self.tokens.put(token.clone(), token_ttl());
                info!("obtained provider access token");
                Some(token)
            }
            _ => {
                error!(
                    status = status.as_u16(),
                    body = %truncate_chars(&body, LOG_BODY_LIMIT),
                    "token exchange returned no access token"
                );
                None
            }
        }
    }

    /// Forget the cached token before its TTL.
    pub fn reset_token(&self) {
        self.tokens.evict();
    }

    #[instrument(skip_all, fields(email = %email))]
    pub async fn register_registrant(
        &self,
        email: &str,
        first_name: &str,
        last_name: &str,
    ) -> Option<Registration> {
        let token = self.access_token().await?;

        let url = match self
            .api_base
            .join(&format!("v2/meetings/{}/registrants", self.settings.meeting_id))
        {
            Ok(url) => url,
            Err(err) => {
                error!(?err, "invalid registration URL");
                return None;
            }
        };
        let payload = json!({
            "email": email,
            "first_name": first_name,
            "last_name": last_name,
            "auto_approve": true,
        });

        let res = match self.http.post(url).bearer_auth(&token).json(&payload).send().await {
            Ok(res) => res,
            Err(err) => {
                error!(?err, "registration request failed");
                return None;
            }
        };
        let status = res.status().as_u16();
        let body = res.text().await.unwrap_or_default();

        match classify_registration(status, &body) {
            RegistrationOutcome::Success { join_url } => {
                info!(status, "registrant registered");
                Some(Registration::Joined { join_url })
            }
            RegistrationOutcome::RateLimited => {
                warn!(status, body = %truncate_chars(&body, LOG_BODY_LIMIT), "registration rate limited");
                Some(Registration::RateLimited {
                    email: email.to_string(),
                    first_name: first_name.to_string(),
                    last_name: last_name.to_string(),
                })
            }
            RegistrationOutcome::Malformed { status, body } => {
                error!(status, body = %truncate_chars(&body, LOG_BODY_LIMIT), "registration response unparseable");
                None
            }
            RegistrationOutcome::Transient { status, body } => {
                error!(status, body = %truncate_chars(&body, LOG_BODY_LIMIT), "registration failed");
                None
            }
        }
    }

    #[instrument(skip_all, fields(meeting_id = %meeting_id))]
    pub async fn fetch_all_participants(&self, meeting_id: &str) -> Vec<Participant> {
        let mut all = Vec::new();
        let Some(token) = self.access_token().await else {
            return all;
        };
        let url = match self
            .api_base
            .join(&format!("v2/report/meetings/{}/participants", meeting_id))
        {
            Ok(url) => url,
            Err(err) => {
                error!(?err, "invalid report URL");
                return all;
            }
        };

        let page_size = REPORT_PAGE_SIZE.to_string();
        let mut next_page_token = String::new();
        loop {
            let mut req = self
                .http
                .get(url.clone())
                .bearer_auth(&token)
                .query(&[("page_size", page_size.as_str())]);
            if !next_page_token.is_empty() {
                req = req.query(&[("next_page_token", next_page_token.as_str())]);
            }

            let res = match req.send().await {
                Ok(res) => res,
                Err(err) => {
                    error!(?err, fetched = all.len(), "report request failed; stopping");
                    break;
                }
            };
            let status = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();

            match serde_json::from_str::<ReportPage>(&body) {
                Ok(ReportPage {
                    participants: Some(page),
                    next_page_token: next,
                }) => {
                    all.extend(page);
                    next_page_token = next.unwrap_or_default();
                    if next_page_token.is_empty() {
                        break;
                    }
                }
                _ => {
                    error!(
                        status,
                        fetched = all.len(),
                        body = %truncate_chars(&body, LOG_BODY_LIMIT),
                        "report page unusable; stopping pagination"
                    );
                    break;
                }
            }
        }
        info!(count = all.len(), "fetched report entries");
        all
    }
}

#[async_trait]
impl MeetingProvider for ZoomClient {
    async fn register_registrant(
        &self,
        email: &str,
        first_name: &str,
        last_name: &str,
    ) -> Option<Registration> {
        ZoomClient::register_registrant(self, email, first_name, last_name).await
    }

    async fn fetch_all_participants(&self, meeting_id: &str) -> Vec<Participant> {
        ZoomClient::fetch_all_participants(self, meeting_id).await
    }
}
