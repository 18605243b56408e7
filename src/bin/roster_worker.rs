use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use class_roster::clock::{Clock, SystemClock};
use class_roster::config;
use class_roster::db;
use class_roster::notify::{mailer, Notifier};
use class_roster::schedule::SqliteScheduler;
use class_roster::settings;
use class_roster::worker::{self, WorkerContext};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Fire scheduled invitation continuations and reminders as they come due"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Exit once no trigger is due instead of polling forever
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let pool = db::connect(&cfg.database_url()).await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let class = settings::load_class_info(&pool).await?;
    let notifier = Notifier::new(Arc::from(mailer::from_config(&cfg.mail)), class);
    let poll_sleep = Duration::from_millis(cfg.app.poll_interval_ms);

    let ctx = WorkerContext {
        pool: pool.clone(),
        notifier,
        scheduler: Arc::new(SqliteScheduler::new(pool, clock.clone())),
        clock,
        config: cfg,
    };

    info!("starting trigger worker");
    loop {
        match worker::process_next_trigger(&ctx).await {
            Ok(true) => {}
            Ok(false) => {
                if args.once {
                    info!("no due triggers; exiting");
                    break;
                }
                tokio::time::sleep(poll_sleep).await;
            }
            Err(err) => {
                error!(?err, "trigger worker error");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
    Ok(())
}
