use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use class_roster::attendance;
use class_roster::campaign::{self, CampaignState};
use class_roster::class_time::{parse_class_start, time_remaining};
use class_roster::clock::{Clock, SystemClock};
use class_roster::config::{self, Config};
use class_roster::db::{self, Pool};
use class_roster::model::NewInvitation;
use class_roster::notify::{mailer, Notification, Notifier};
use class_roster::reminder;
use class_roster::schedule::{Scheduler, SqliteScheduler, INVITATION_BATCH_HANDLER};
use class_roster::settings::{self, ClassInfo};
use class_roster::submission::{self, SubmissionOutcome};
use class_roster::worker::utc_offset;
use class_roster::zoom::{MemoryTokenStore, ZoomClient};

#[derive(Debug, Parser)]
#[command(author, version, about = "Class registration, attendance and email campaigns")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print an example config file
    ExampleConfig,
    /// Handle one form submission given its ordered field values
    Submit { values: Vec<String> },
    /// Pull the attendance report and write it into the registrant rows
    SyncAttendance,
    #[command(subcommand)]
    Invitations(InvitationCmd),
    #[command(subcommand)]
    Reminders(ReminderCmd),
    /// Send one sample email of the given kind
    TestEmail {
        kind: TestEmailKind,
        /// Recipient; defaults to the reply-to address
        #[arg(long)]
        to: Option<String>,
    },
    #[command(subcommand)]
    Token(TokenCmd),
    #[command(subcommand)]
    Settings(SettingsCmd),
}

#[derive(Debug, Subcommand)]
enum InvitationCmd {
    /// Append rows from a YAML list of {email, name}
    Import { file: PathBuf },
    /// Run one batch now
    Send,
    /// Show counters and row statuses
    Progress,
    /// Remove the scheduled continuation
    Stop,
    /// Put every `error` row back to `pending`
    ResetErrors,
    /// Zero the progress counters
    ResetProgress,
}

#[derive(Debug, Subcommand)]
enum ReminderCmd {
    /// Remind every registrant now
    Send,
    /// Schedule reminders at the configured offsets before class
    Schedule,
}

#[derive(Debug, Subcommand)]
enum TokenCmd {
    /// Fetch a fresh token and report whether it worked
    Test,
}

#[derive(Debug, Subcommand)]
enum SettingsCmd {
    Set { key: String, value: String },
    Show,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TestEmailKind {
    Confirmation,
    RateLimit,
    Reminder,
    Invitation,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    if let Command::ExampleConfig = args.command {
        print!("{}", config::example());
        return Ok(());
    }

    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;
    let pool = db::connect(&cfg.database_url()).await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    match args.command {
        Command::ExampleConfig => {}
        Command::Submit { values } => {
            let settings = settings::load(&pool).await?;
            let zoom = zoom_client(&cfg, settings.clone(), clock.clone())?;
            let notifier = notifier(&cfg, settings.class.clone());
            let outcome =
                submission::handle_submission(&pool, &zoom, &notifier, &cfg.form, &values).await;
            match outcome {
                SubmissionOutcome::Registered { join_url, emailed } => {
                    println!("Registered: {} (confirmation emailed: {})", join_url, emailed)
                }
                SubmissionOutcome::RateLimited { notified } => {
                    println!("Rate limited by provider (notice emailed: {})", notified)
                }
                SubmissionOutcome::InvalidEmail => println!("Invalid email; submission skipped"),
                SubmissionOutcome::Failed => println!("Registration failed; see log"),
            }
        }
        Command::SyncAttendance => {
            let settings = settings::load(&pool).await?;
            let zoom = zoom_client(&cfg, settings.clone(), clock.clone())?;
            let summary =
                attendance::sync_attendance(&pool, &zoom, &settings, utc_offset(&cfg)).await?;
            println!(
                "Synced {} registrants ({} attended)",
                summary.rows, summary.attended
            );
        }
        Command::Invitations(cmd) => invitations(&cfg, &pool, clock, cmd).await?,
        Command::Reminders(cmd) => {
            let class = settings::load_class_info(&pool).await?;
            match cmd {
                ReminderCmd::Send => {
                    let notifier = notifier(&cfg, class);
                    let summary = reminder::send_reminders(
                        &pool,
                        &notifier,
                        clock.as_ref(),
                        utc_offset(&cfg),
                    )
                    .await?;
                    println!(
                        "Reminders sent: {}, failed: {}, skipped: {}",
                        summary.sent, summary.failed, summary.skipped
                    );
                }
                ReminderCmd::Schedule => {
                    let scheduler = SqliteScheduler::new(pool.clone(), clock.clone());
                    let handles = reminder::schedule_reminders(
                        &scheduler,
                        clock.as_ref(),
                        &class.time,
                        utc_offset(&cfg),
                        &cfg.reminders.offsets_minutes,
                    )
                    .await?;
                    println!("Scheduled {} reminder(s)", handles.len());
                    for h in handles {
                        println!("  {}", h.due_at);
                    }
                }
            }
        }
        Command::TestEmail { kind, to } => {
            let class = settings::load_class_info(&pool).await?;
            let to = to.unwrap_or_else(|| cfg.mail.reply_to.clone());
            let notification = sample_notification(kind, &class, &cfg, clock.as_ref())?;
            notifier(&cfg, class).send(&to, &notification).await?;
            println!("Sent {} test email to {}", notification.kind(), to);
        }
        Command::Token(TokenCmd::Test) => {
            let settings = settings::load(&pool).await?;
            let zoom = zoom_client(&cfg, settings, clock.clone())?;
            zoom.reset_token();
            match zoom.access_token().await {
                Some(_) => println!("Token OK"),
                None => bail!("Token FAIL"),
            }
        }
        Command::Settings(SettingsCmd::Set { key, value }) => {
            db::set_property(&pool, &key, &value).await?;
            info!(key = %key, "setting stored");
            println!("Stored {}", key);
        }
        Command::Settings(SettingsCmd::Show) => {
            let mut props: Vec<_> = db::all_properties(&pool).await?.into_iter().collect();
            props.sort();
            for (key, value) in props {
                let shown = if settings::is_secret(&key) { "********".to_string() } else { value };
                println!("{} = {}", key, shown);
            }
            if let Err(err) = settings::load(&pool).await {
                println!("! {}", err);
            }
        }
    }
    Ok(())
}

async fn invitations(
    cfg: &Config,
    pool: &Pool,
    clock: Arc<dyn Clock>,
    cmd: InvitationCmd,
) -> Result<()> {
    let scheduler = SqliteScheduler::new(pool.clone(), clock.clone());
    match cmd {
        InvitationCmd::Import { file } => {
            let content = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("failed to read {}", file.display()))?;
            let rows: Vec<NewInvitation> =
                serde_yaml::from_str(&content).context("invitation file must be a YAML list")?;
            let count = db::insert_invitations(pool, &rows).await?;
            println!("Imported {} invitation row(s)", count);
        }
        InvitationCmd::Send => {
            let notifier = notifier(cfg, settings::load_class_info(pool).await?);
            match campaign::run_tick(pool, &notifier, &scheduler, clock.as_ref(), &cfg.campaign)
                .await?
            {
                Some(r) => println!(
                    "Sent {}, failed {}, remaining {}{}",
                    r.sent,
                    r.failed,
                    r.remaining,
                    if r.continuation_scheduled { " (continuing in background)" } else { "" }
                ),
                None => println!("Another batch is running; try again shortly"),
            }
        }
        InvitationCmd::Progress => {
            let view = campaign::progress(pool, &scheduler).await?;
            let state = match view.state {
                CampaignState::Running => "running",
                CampaignState::Idle => "idle",
                CampaignState::Done => "done",
            };
            println!("State: {}", state);
            println!(
                "Rows: {} pending, {} sent, {} error",
                view.rows.pending, view.rows.sent, view.rows.error
            );
            println!(
                "Totals: {} sent, {} failed (updated {})",
                view.progress.total_sent,
                view.progress.total_failed,
                view.progress
                    .updated_at
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "never".into())
            );
        }
        InvitationCmd::Stop => {
            let removed = scheduler.cancel(INVITATION_BATCH_HANDLER).await?;
            println!("Removed {} continuation trigger(s)", removed);
        }
        InvitationCmd::ResetErrors => {
            let n = db::reset_error_invitations(pool).await?;
            println!("Reset {} row(s) to pending", n);
        }
        InvitationCmd::ResetProgress => {
            campaign::reset_progress(pool).await?;
            println!("Progress counters cleared");
        }
    }
    Ok(())
}

fn zoom_client(cfg: &Config, settings: settings::Settings, clock: Arc<dyn Clock>) -> Result<ZoomClient> {
    ZoomClient::new(&cfg.zoom, settings, Arc::new(MemoryTokenStore::new(clock)))
}

fn notifier(cfg: &Config, class: ClassInfo) -> Notifier {
    Notifier::new(Arc::from(mailer::from_config(&cfg.mail)), class)
}

fn sample_notification(
    kind: TestEmailKind,
    class: &ClassInfo,
    cfg: &Config,
    clock: &dyn Clock,
) -> Result<Notification> {
    let name = "Học Viên Mẫu".to_string();
    let join_url = "https://zoom.us/w/0000000000?tk=sample".to_string();
    Ok(match kind {
        TestEmailKind::Confirmation => Notification::Confirmation {
            name,
            join_url,
            suffix: "00".into(),
        },
        TestEmailKind::RateLimit => Notification::RateLimitNotice { name },
        TestEmailKind::Reminder => {
            let start = parse_class_start(&class.time, utc_offset(cfg))?;
            Notification::ClassReminder {
                name,
                join_url: Some(join_url),
                remaining: time_remaining(clock.now(), start),
            }
        }
        TestEmailKind::Invitation => Notification::Invitation { name },
    })
}
