use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use driftnet_core::{FrontierStatus, FrontierUrl, Origin};
use sqlx::PgPool;

#[derive(sqlx::FromRow)]
struct FrontierRow {
    id: String,
    normalized_url: String,
    host: String,
    origin: String,
    status: String,
    priority: i32,
    next_fetch_at: DateTime<Utc>,
    retry_count: i32,
    last_error: Option<String>,
    claim_token: Option<String>,
    claimed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<FrontierRow> for FrontierUrl {
    type Error = anyhow::Error;

    fn try_from(r: FrontierRow) -> Result<Self> {
        Ok(FrontierUrl {
            id: r.id,
            normalized_url: r.normalized_url,
            host: r.host,
            origin: Origin::parse(&r.origin).ok_or_else(|| anyhow!("bad origin: {}", r.origin))?,
            status: FrontierStatus::parse(&r.status)
                .ok_or_else(|| anyhow!("bad status: {}", r.status))?,
            priority: r.priority,
            next_fetch_at: r.next_fetch_at,
            retry_count: r.retry_count.max(0) as u32,
            last_error: r.last_error,
            claim_token: r.claim_token,
            claimed_at: r.claimed_at,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

const SELECT_COLUMNS: &str = "id, normalized_url, host, origin, status, priority, \
     next_fetch_at, retry_count, last_error, claim_token, claimed_at, created_at, updated_at";

/// `Insert`: (hash) is unique; duplicate inserts are silent no-ops (§3 ii).
pub async fn insert(
    pool: &PgPool,
    id: &str,
    normalized_url: &str,
    host: &str,
    origin: Origin,
    priority: i32,
) -> Result<bool> {
    let result = sqlx::query(
        "INSERT INTO frontier_urls (id, normalized_url, host, origin, status, priority) \
         VALUES ($1, $2, $3, $4, 'pending', $5) \
         ON CONFLICT (id) DO NOTHING",
    )
    .bind(id)
    .bind(normalized_url)
    .bind(host)
    .bind(origin.as_str())
    .bind(priority)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Claims up to `n` pending rows whose `next_fetch_at` has passed, ordered
/// by priority then next-fetch time (§4.C "priority tie-breaks next-fetch
/// ordering"). Uses `SELECT ... FOR UPDATE SKIP LOCKED` so concurrent
/// workers never double-claim a row (§5 "outbox state transitions" applies
/// equally to the frontier's claim protocol).
pub async fn claim(pool: &PgPool, n: i64, claim_token: &str) -> Result<Vec<FrontierUrl>> {
    let rows: Vec<FrontierRow> = sqlx::query_as(&format!(
        "WITH claimed AS ( \
            SELECT id FROM frontier_urls \
            WHERE status = 'pending' AND next_fetch_at <= now() \
            ORDER BY priority ASC, next_fetch_at ASC \
            LIMIT $1 \
            FOR UPDATE SKIP LOCKED \
         ) \
         UPDATE frontier_urls SET status = 'fetching', claim_token = $2, claimed_at = now(), updated_at = now() \
         WHERE id IN (SELECT id FROM claimed) \
         RETURNING {SELECT_COLUMNS}"
    ))
    .bind(n)
    .bind(claim_token)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(FrontierUrl::try_from).collect()
}

/// `Complete(id, success)`: `fetching` -> `fetched`.
pub async fn complete_success(pool: &PgPool, id: &str) -> Result<()> {
    sqlx::query(
        "UPDATE frontier_urls SET status = 'fetched', claim_token = NULL, claimed_at = NULL, \
         last_error = NULL, updated_at = now() WHERE id = $1",
    )
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

/// `Complete(id, failure, last_error)`: `fetching` -> `failed` ->
/// `pending` (with backoff) or `dead` once the retry cap is hit (§4.C).
pub async fn complete_failure(
    pool: &PgPool,
    id: &str,
    last_error: &str,
    base_backoff_secs: i64,
    max_backoff_secs: i64,
    max_retries: i32,
) -> Result<()> {
    sqlx::query(
        "UPDATE frontier_urls SET \
            retry_count = retry_count + 1, \
            last_error = $2, \
            claim_token = NULL, \
            claimed_at = NULL, \
            status = CASE WHEN retry_count + 1 > $5 THEN 'dead' ELSE 'pending' END, \
            next_fetch_at = now() + (LEAST($3 * POWER(2, retry_count), $4) * INTERVAL '1 second'), \
            updated_at = now() \
         WHERE id = $1",
    )
    .bind(id)
    .bind(last_error)
    .bind(base_backoff_secs as f64)
    .bind(max_backoff_secs as f64)
    .bind(max_retries)
    .execute(pool)
    .await?;
    Ok(())
}

/// `Reset(id)`: any `dead` record may be explicitly reset back to `pending`.
pub async fn reset(pool: &PgPool, id: &str) -> Result<()> {
    sqlx::query(
        "UPDATE frontier_urls SET status = 'pending', retry_count = 0, last_error = NULL, \
         next_fetch_at = now(), claim_token = NULL, claimed_at = NULL, updated_at = now() \
         WHERE id = $1",
    )
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn delete(pool: &PgPool, id: &str) -> Result<()> {
    sqlx::query("DELETE FROM frontier_urls WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Returns claims older than `stale_age_secs` back to `pending` (crash
/// recovery, §4.C "worker that does not complete within a stale-claim age").
pub async fn recover_stale_claims(pool: &PgPool, stale_age_secs: i64) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE frontier_urls SET status = 'pending', claim_token = NULL, claimed_at = NULL, updated_at = now() \
         WHERE status = 'fetching' AND claimed_at < now() - ($1 * INTERVAL '1 second')",
    )
    .bind(stale_age_secs as f64)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

pub async fn get(pool: &PgPool, id: &str) -> Result<Option<FrontierUrl>> {
    let row: Option<FrontierRow> =
        sqlx::query_as(&format!("SELECT {SELECT_COLUMNS} FROM frontier_urls WHERE id = $1"))
            .bind(id)
            .fetch_optional(pool)
            .await?;
    row.map(FrontierUrl::try_from).transpose()
}
