use super::model::{InvitationCounts, TriggerRow};
use crate::model::{AttendanceCells, InvitationRow, InvitationStatus, NewInvitation, Registrant};
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::str::FromStr;
use tracing::instrument;

pub type Pool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let options = SqliteConnectOptions::from_str(&normalized)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new().connect_with(options).await?;
    // Worker and CLI may share the file.
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous=FULL;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// Single-connection in-memory database with migrations applied.
pub async fn init_memory_pool() -> Result<Pool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    run_migrations(&pool).await?;
    Ok(pool)
}

/// File-backed URLs get `~/` expanded and their directory created, since
/// sqlite only creates the file itself. Memory URLs pass through.
fn prepare_sqlite_url(url: &str) -> String {
    let Some(rest) = url.strip_prefix("sqlite:") else {
        return url.to_string();
    };
    if rest.starts_with(":memory") {
        return url.to_string();
    }
    let rest = rest.strip_prefix("//").unwrap_or(rest);
    let (file, params) = rest.split_once('?').unwrap_or((rest, ""));
    if file.is_empty() {
        return url.to_string();
    }

    let file = match (file.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(tail), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), tail),
        _ => file.to_string(),
    };
    if let Some(dir) = std::path::Path::new(&file).parent().filter(|d| !d.as_os_str().is_empty()) {
        let _ = std::fs::create_dir_all(dir);
    }

    if params.is_empty() {
        format!("sqlite://{}", file)
    } else {
        format!("sqlite://{}?{}", file, params)
    }
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Open the store and bring the schema up to date.
pub async fn connect(database_url: &str) -> Result<Pool> {
    let pool = init_pool(database_url).await?;
    run_migrations(&pool).await?;
    Ok(pool)
}

// --- registrant sheet -------------------------------------------------------

#[instrument(skip_all)]
pub async fn insert_registrant(pool: &Pool, email: &str, name: &str, phone: &str) -> Result<i64> {
    let rec = sqlx::query(
        "INSERT INTO registrants (email, name, phone) VALUES (?, ?, ?) RETURNING id",
    )
    .bind(email)
    .bind(name)
    .bind(phone)
    .fetch_one(pool)
    .await?;
    Ok(rec.get::<i64, _>("id"))
}

#[instrument(skip_all)]
pub async fn set_join_url(pool: &Pool, registrant_id: i64, join_url: &str) -> Result<()> {
    sqlx::query("UPDATE registrants SET join_url = ? WHERE id = ?")
        .bind(join_url)
        .bind(registrant_id)
        .execute(pool)
        .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn list_registrants(pool: &Pool) -> Result<Vec<Registrant>> {
    let rows = sqlx::query("SELECT id, email, name, phone, join_url FROM registrants ORDER BY id")
        .fetch_all(pool)
        .await?;
    Ok(rows
        .into_iter()
        .map(|row| Registrant {
            id: row.get("id"),
            email: row.get("email"),
            name: row.get("name"),
            phone: row.get("phone"),
            join_url: row.get("join_url"),
        })
        .collect())
}

/// Write all result columns in one transaction so a sync never leaves the
/// sheet half-updated.
#[instrument(skip_all)]
pub async fn write_attendance(pool: &Pool, results: &[(i64, AttendanceCells)]) -> Result<()> {
    let mut tx = pool.begin().await?;
    for (id, cells) in results {
        sqlx::query(
            "UPDATE registrants SET attendance_status = ?, duration = ?, time_in = ? WHERE id = ?",
        )
        .bind(cells.status.as_str())
        .bind(cells.duration)
        .bind(&cells.time_in)
        .bind(id)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
}

/// Result columns of one registrant row: (status, duration, time_in).
pub async fn attendance_cells(
    pool: &Pool,
    registrant_id: i64,
) -> Result<Option<(Option<String>, Option<i64>, Option<String>)>> {
    let row = sqlx::query(
        "SELECT attendance_status, duration, time_in FROM registrants WHERE id = ?",
    )
    .bind(registrant_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|r| (r.get("attendance_status"), r.get("duration"), r.get("time_in"))))
}

// --- invitation sheet -------------------------------------------------------

#[instrument(skip_all)]
pub async fn insert_invitations(pool: &Pool, rows: &[NewInvitation]) -> Result<usize> {
    let mut tx = pool.begin().await?;
    for row in rows {
        sqlx::query("INSERT INTO invitations (email, name, status) VALUES (?, ?, ?)")
            .bind(&row.email)
            .bind(&row.name)
            .bind(InvitationStatus::Pending.as_str())
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    Ok(rows.len())
}

fn invitation_from_row(row: SqliteRow) -> InvitationRow {
    let status: String = row.get("status");
    InvitationRow {
        id: row.get("id"),
        email: row.get("email"),
        name: row.get("name"),
        status: InvitationStatus::parse_status(&status),
        sent_at: row.get("sent_at"),
        last_error: row.get("last_error"),
    }
}

#[instrument(skip_all)]
pub async fn list_invitations(pool: &Pool) -> Result<Vec<InvitationRow>> {
    let rows = sqlx::query(
        "SELECT id, email, name, status, sent_at, last_error FROM invitations ORDER BY id",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(invitation_from_row).collect())
}

#[instrument(skip_all)]
pub async fn mark_invitation_sent(pool: &Pool, id: i64, sent_at: DateTime<Utc>) -> Result<()> {
    sqlx::query("UPDATE invitations SET status = ?, sent_at = ?, last_error = NULL WHERE id = ?")
        .bind(InvitationStatus::Sent.as_str())
        .bind(sent_at)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn mark_invitation_error(pool: &Pool, id: i64, error: &str) -> Result<()> {
    sqlx::query("UPDATE invitations SET status = ?, last_error = ? WHERE id = ?")
        .bind(InvitationStatus::Error.as_str())
        .bind(error)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Operator reset: every `error` row goes back to `pending`.
#[instrument(skip_all)]
pub async fn reset_error_invitations(pool: &Pool) -> Result<u64> {
    let res = sqlx::query("UPDATE invitations SET status = ?, last_error = NULL WHERE status = ?")
        .bind(InvitationStatus::Pending.as_str())
        .bind(InvitationStatus::Error.as_str())
        .execute(pool)
        .await?;
    Ok(res.rows_affected())
}

pub async fn invitation_counts(pool: &Pool) -> Result<InvitationCounts> {
    let mut counts = InvitationCounts::default();
    for row in list_invitations(pool).await? {
        match row.status {
            InvitationStatus::Pending => counts.pending += 1,
            InvitationStatus::Sent => counts.sent += 1,
            InvitationStatus::Error => counts.error += 1,
        }
    }
    Ok(counts)
}

// --- properties -------------------------------------------------------------

pub async fn get_property(pool: &Pool, key: &str) -> Result<Option<String>> {
    let value = sqlx::query_scalar::<_, String>("SELECT value FROM properties WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await?;
    Ok(value)
}

pub async fn set_property(pool: &Pool, key: &str, value: &str) -> Result<()> {
    sqlx::query(
        "INSERT INTO properties (key, value) VALUES (?, ?) ON CONFLICT(key) DO UPDATE SET value = excluded.value",
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn delete_property(pool: &Pool, key: &str) -> Result<()> {
    sqlx::query("DELETE FROM properties WHERE key = ?")
        .bind(key)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn all_properties(pool: &Pool) -> Result<HashMap<String, String>> {
    let rows: Vec<(String, String)> = sqlx::query_as("SELECT key, value FROM properties")
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().collect())
}

// --- triggers ---------------------------------------------------------------

#[instrument(skip_all)]
pub async fn insert_trigger(
    pool: &Pool,
    id: &str,
    handler: &str,
    due_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query("INSERT INTO triggers (id, handler, due_at) VALUES (?, ?, ?)")
        .bind(id)
        .bind(handler)
        .bind(due_at)
        .execute(pool)
        .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn delete_triggers_for(pool: &Pool, handler: &str) -> Result<u64> {
    let res = sqlx::query("DELETE FROM triggers WHERE handler = ?")
        .bind(handler)
        .execute(pool)
        .await?;
    Ok(res.rows_affected())
}

/// Returns whether the trigger still existed; a `false` means another
/// worker already claimed it.
#[instrument(skip_all)]
pub async fn delete_trigger(pool: &Pool, id: &str) -> Result<bool> {
    let res = sqlx::query("DELETE FROM triggers WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(res.rows_affected() == 1)
}

pub async fn triggers_for(pool: &Pool, handler: &str) -> Result<Vec<TriggerRow>> {
    let rows = sqlx::query("SELECT id, handler, due_at FROM triggers WHERE handler = ? ORDER BY datetime(due_at)")
        .bind(handler)
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().map(trigger_from_row).collect())
}

#[instrument(skip_all)]
pub async fn next_due_trigger(pool: &Pool, now: DateTime<Utc>) -> Result<Option<TriggerRow>> {
    let row = sqlx::query(
        "SELECT id, handler, due_at FROM triggers WHERE datetime(due_at) <= datetime(?) ORDER BY datetime(due_at) ASC LIMIT 1",
    )
    .bind(now)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(trigger_from_row))
}

fn trigger_from_row(row: SqliteRow) -> TriggerRow {
    TriggerRow {
        id: row.get("id"),
        handler: row.get("handler"),
        due_at: row.get("due_at"),
    }
}

// --- locks ------------------------------------------------------------------

/// Take the named lease unless someone else holds an unexpired one.
#[instrument(skip_all)]
pub async fn try_acquire_lock(
    pool: &Pool,
    name: &str,
    holder: &str,
    now: DateTime<Utc>,
    ttl: Duration,
) -> Result<bool> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM locks WHERE name = ? AND datetime(expires_at) <= datetime(?)")
        .bind(name)
        .bind(now)
        .execute(&mut *tx)
        .await?;
    let res = sqlx::query("INSERT OR IGNORE INTO locks (name, holder, expires_at) VALUES (?, ?, ?)")
        .bind(name)
        .bind(holder)
        .bind(now + ttl)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(res.rows_affected() == 1)
}

#[instrument(skip_all)]
pub async fn release_lock(pool: &Pool, name: &str, holder: &str) -> Result<()> {
    sqlx::query("DELETE FROM locks WHERE name = ? AND holder = ?")
        .bind(name)
        .bind(holder)
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn prepare_sqlite_url_passes_memory_through() {
        assert_eq!(prepare_sqlite_url("sqlite::memory:"), "sqlite::memory:");
        assert_eq!(prepare_sqlite_url("postgres://x"), "postgres://x");
    }

    #[test]
    fn prepare_sqlite_url_normalizes_prefix() {
        let td = tempfile::tempdir().unwrap();
        let path = td.path().join("nested/roster.db");
        let url = format!("sqlite:{}", path.display());
        assert_eq!(prepare_sqlite_url(&url), format!("sqlite://{}", path.display()));
        assert!(td.path().join("nested").exists());
    }

    #[tokio::test]
    async fn properties_upsert() {
        let pool = init_memory_pool().await.unwrap();
        assert_eq!(get_property(&pool, "K").await.unwrap(), None);
        set_property(&pool, "K", "1").await.unwrap();
        set_property(&pool, "K", "2").await.unwrap();
        assert_eq!(get_property(&pool, "K").await.unwrap().as_deref(), Some("2"));
        delete_property(&pool, "K").await.unwrap();
        assert!(all_properties(&pool).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn lock_is_exclusive_until_expiry() {
        let pool = init_memory_pool().await.unwrap();
        let t0 = Utc.with_ymd_and_hms(2025, 10, 1, 8, 0, 0).unwrap();
        let ttl = Duration::minutes(5);
        assert!(try_acquire_lock(&pool, "batch", "a", t0, ttl).await.unwrap());
        assert!(!try_acquire_lock(&pool, "batch", "b", t0, ttl).await.unwrap());
        assert!(try_acquire_lock(&pool, "batch", "b", t0 + Duration::minutes(6), ttl)
            .await
            .unwrap());
        release_lock(&pool, "batch", "b").await.unwrap();
        assert!(try_acquire_lock(&pool, "batch", "c", t0, ttl).await.unwrap());
    }

    #[tokio::test]
    async fn due_triggers_respect_time() {
        let pool = init_memory_pool().await.unwrap();
        let t0 = Utc.with_ymd_and_hms(2025, 10, 1, 8, 0, 0).unwrap();
        insert_trigger(&pool, "t1", "h", t0 + Duration::minutes(1)).await.unwrap();
        assert!(next_due_trigger(&pool, t0).await.unwrap().is_none());
        let due = next_due_trigger(&pool, t0 + Duration::minutes(2)).await.unwrap().unwrap();
        assert_eq!(due.id, "t1");
        assert_eq!(due.due_at, t0 + Duration::minutes(1));
        assert!(delete_trigger(&pool, "t1").await.unwrap());
        assert!(!delete_trigger(&pool, "t1").await.unwrap());
    }
}
