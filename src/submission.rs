//! Handling of one sign-up form submission.
use anyhow::Result;
use tracing::{error, info, instrument, warn};

use crate::config::Form;
use crate::db::{self, Pool};
use crate::error::ValidationError;
use crate::identity::{display_name_parts, is_valid_email, normalize_email, standardize_name, suffix_from_phone};
use crate::notify::{Notification, Notifier};
use crate::zoom::{MeetingProvider, Registration};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionOutcome {
    InvalidEmail,
    Registered { join_url: String, emailed: bool },
    RateLimited { notified: bool },
    /// Registration failed or storage broke; details are in the log.
    Failed,
}

/// Never fails: every problem degrades to a logged outcome so the caller's
/// trigger keeps running.
#[instrument(skip_all)]
pub async fn handle_submission(
    pool: &Pool,
    provider: &dyn MeetingProvider,
    notifier: &Notifier,
    form: &Form,
    values: &[String],
) -> SubmissionOutcome {
    match process(pool, provider, notifier, form, values).await {
        Ok(outcome) => outcome,
        Err(err) => {
            error!(?err, "submission handling failed");
            SubmissionOutcome::Failed
        }
    }
}

async fn process(
    pool: &Pool,
    provider: &dyn MeetingProvider,
    notifier: &Notifier,
    form: &Form,
    values: &[String],
) -> Result<SubmissionOutcome> {
    let field = |i: usize| values.get(i).map(String::as_str);

    let raw_email = field(form.email_column).unwrap_or_default();
    let email = normalize_email(raw_email);
    let clean_name = standardize_name(field(form.name_column).unwrap_or_default());
    let phone = field(form.phone_column).map(str::trim).unwrap_or_default();

    let row_id = db::insert_registrant(pool, &email, &clean_name, phone).await?;

    if !is_valid_email(&email) {
        warn!(row_id, error = %ValidationError::InvalidEmail(raw_email.to_string()), "skipping submission");
        return Ok(SubmissionOutcome::InvalidEmail);
    }

    let suffix = suffix_from_phone(Some(phone));
    let (first_name, last_name) = display_name_parts(&suffix, &clean_name);

    match provider.register_registrant(&email, &first_name, &last_name).await {
        Some(Registration::Joined { join_url }) => {
            db::set_join_url(pool, row_id, &join_url).await?;
            let notification = Notification::Confirmation {
                name: clean_name,
                join_url: join_url.clone(),
                suffix,
            };
            let emailed = match notifier.send(&email, &notification).await {
                Ok(()) => true,
                Err(err) => {
                    error!(?err, row_id, "registered but confirmation email failed");
                    false
                }
            };
            info!(row_id, emailed, "registrant confirmed");
            Ok(SubmissionOutcome::Registered { join_url, emailed })
        }
        Some(Registration::RateLimited { email, .. }) => {
            let notification = Notification::RateLimitNotice { name: clean_name };
            let notified = match notifier.send(&email, &notification).await {
                Ok(()) => true,
                Err(err) => {
                    error!(?err, row_id, "rate limit notice failed");
                    false
                }
            };
            Ok(SubmissionOutcome::RateLimited { notified })
        }
        None => Ok(SubmissionOutcome::Failed),
    }
}
