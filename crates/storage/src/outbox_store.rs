use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use driftnet_core::{OutboxEntry, OutboxState, OutboxStats};
use sqlx::{PgExecutor, PgPool};

#[derive(sqlx::FromRow)]
struct OutboxRow {
    id: String,
    content_id: String,
    source: String,
    routing_key: String,
    payload: Vec<u8>,
    state: String,
    retry_count: i32,
    claim_token: Option<String>,
    claimed_at: Option<DateTime<Utc>>,
    published_at: Option<DateTime<Utc>>,
    next_retry_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<OutboxRow> for OutboxEntry {
    type Error = anyhow::Error;

    fn try_from(r: OutboxRow) -> Result<Self> {
        Ok(OutboxEntry {
            id: r.id,
            content_id: r.content_id,
            source: r.source,
            routing_key: r.routing_key,
            payload: r.payload,
            state: OutboxState::parse(&r.state).ok_or_else(|| anyhow!("bad state: {}", r.state))?,
            retry_count: r.retry_count,
            claim_token: r.claim_token,
            claimed_at: r.claimed_at,
            published_at: r.published_at,
            next_retry_at: r.next_retry_at,
            last_error: r.last_error,
            created_at: r.created_at,
        })
    }
}

const SELECT_COLUMNS: &str = "id, content_id, source, routing_key, payload, state, retry_count, \
     claim_token, claimed_at, published_at, next_retry_at, last_error, created_at";

/// `Enqueue(content_id, source, routing_key, payload)`: callable within the
/// caller's own transaction (§6), hence a generic `PgExecutor` rather than
/// a bound `&PgPool`.
pub async fn enqueue<'e, E>(
    executor: E,
    id: &str,
    content_id: &str,
    source: &str,
    routing_key: &str,
    payload: &[u8],
) -> Result<()>
where
    E: PgExecutor<'e>,
{
    sqlx::query(
        "INSERT INTO outbox (id, content_id, source, routing_key, payload, state) \
         VALUES ($1, $2, $3, $4, $5, 'pending')",
    )
    .bind(id)
    .bind(content_id)
    .bind(source)
    .bind(routing_key)
    .bind(payload)
    .execute(executor)
    .await?;
    Ok(())
}

/// Primary poller: up to `batch_size` `pending` rows ordered by creation
/// time, atomically marked `publishing` (§4.D).
pub async fn claim_pending(pool: &PgPool, batch_size: i64, claim_token: &str) -> Result<Vec<OutboxEntry>> {
    let rows: Vec<OutboxRow> = sqlx::query_as(&format!(
        "WITH claimed AS ( \
            SELECT id FROM outbox WHERE state = 'pending' \
            ORDER BY created_at ASC LIMIT $1 FOR UPDATE SKIP LOCKED \
         ) \
         UPDATE outbox SET state = 'publishing', claim_token = $2, claimed_at = now() \
         WHERE id IN (SELECT id FROM claimed) \
         RETURNING {SELECT_COLUMNS}"
    ))
    .bind(batch_size)
    .bind(claim_token)
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(OutboxEntry::try_from).collect()
}

/// Secondary poller: at most `batch_size/2` `failed-retryable` rows whose
/// `next_retry_at` is past due (§4.D).
pub async fn claim_retryable(pool: &PgPool, batch_size: i64, claim_token: &str) -> Result<Vec<OutboxEntry>> {
    let half = (batch_size / 2).max(1);
    let rows: Vec<OutboxRow> = sqlx::query_as(&format!(
        "WITH claimed AS ( \
            SELECT id FROM outbox \
            WHERE state = 'failed-retryable' AND next_retry_at <= now() \
            ORDER BY next_retry_at ASC LIMIT $1 FOR UPDATE SKIP LOCKED \
         ) \
         UPDATE outbox SET state = 'publishing', claim_token = $2, claimed_at = now() \
         WHERE id IN (SELECT id FROM claimed) \
         RETURNING {SELECT_COLUMNS}"
    ))
    .bind(half)
    .bind(claim_token)
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(OutboxEntry::try_from).collect()
}

pub async fn mark_published(pool: &PgPool, id: &str) -> Result<()> {
    sqlx::query(
        "UPDATE outbox SET state = 'published', published_at = now(), claim_token = NULL, \
         claimed_at = NULL, last_error = NULL WHERE id = $1",
    )
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

/// On publish failure: increment retry count, schedule exponential
/// backoff, or move to `failed-exhausted` once the ceiling is crossed
/// (§4.D, §7 "Poisoned").
pub async fn mark_failed(
    pool: &PgPool,
    id: &str,
    error: &str,
    base_backoff_secs: i64,
    max_retries: i32,
    max_backoff_secs: i64,
) -> Result<bool> {
    let row: (String, i32) = sqlx::query_as(
        "UPDATE outbox SET \
            retry_count = retry_count + 1, \
            last_error = $2, \
            claim_token = NULL, \
            claimed_at = NULL, \
            state = CASE WHEN retry_count + 1 > $4 THEN 'failed-exhausted' ELSE 'failed-retryable' END, \
            next_retry_at = now() + (LEAST($3 * POWER(2, retry_count), $5) * INTERVAL '1 second') \
         WHERE id = $1 \
         RETURNING state, retry_count",
    )
    .bind(id)
    .bind(error)
    .bind(base_backoff_secs as f64)
    .bind(max_retries)
    .bind(max_backoff_secs as f64)
    .fetch_one(pool)
    .await?;

    Ok(row.0 == "failed-exhausted")
}

/// Resets any `publishing` row whose claim is older than `stale_age_secs`
/// back to `pending` (§4.D recovery task).
pub async fn recover_stale_claims(pool: &PgPool, stale_age_secs: i64) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE outbox SET state = 'pending', claim_token = NULL, claimed_at = NULL \
         WHERE state = 'publishing' AND claimed_at < now() - ($1 * INTERVAL '1 second')",
    )
    .bind(stale_age_secs as f64)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Deletes `published` rows older than the retention window (§4.D cleanup).
pub async fn cleanup_published(pool: &PgPool, retention_secs: i64) -> Result<u64> {
    let result = sqlx::query(
        "DELETE FROM outbox WHERE state = 'published' AND published_at < now() - ($1 * INTERVAL '1 second')",
    )
    .bind(retention_secs as f64)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

pub async fn stats(pool: &PgPool) -> Result<OutboxStats> {
    let counts: Vec<(String, i64)> =
        sqlx::query_as("SELECT state, COUNT(*) FROM outbox GROUP BY state")
            .fetch_all(pool)
            .await?;

    let mut stats = OutboxStats::default();
    for (state, count) in counts {
        match state.as_str() {
            "pending" => stats.pending = count,
            "publishing" => stats.publishing = count,
            "published" => stats.published = count,
            "failed-retryable" => stats.failed_retryable = count,
            "failed-exhausted" => stats.failed_exhausted = count,
            _ => {}
        }
    }

    let lag: Option<f64> = sqlx::query_scalar(
        "SELECT AVG(EXTRACT(EPOCH FROM (published_at - created_at))) FROM outbox WHERE state = 'published'",
    )
    .fetch_one(pool)
    .await?;
    stats.avg_publish_lag_seconds = lag.unwrap_or(0.0);

    Ok(stats)
}
