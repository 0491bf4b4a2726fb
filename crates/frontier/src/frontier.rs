use anyhow::Result;
use driftnet_core::{ErrTooManyRedirects, FrontierConfig, FrontierUrl, Origin};
use driftnet_storage::frontier_store;
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use crate::normalize::{normalize, url_hash};

/// §4.C URL Frontier: Postgres-backed dedup/lifecycle core. Claims use
/// `FOR UPDATE SKIP LOCKED` under the hood (`driftnet_storage::frontier_store`)
/// so any number of crawl workers can share one frontier without
/// double-claiming a row.
pub struct Frontier {
    pool: PgPool,
    config: FrontierConfig,
}

impl Frontier {
    pub fn new(pool: PgPool, config: FrontierConfig) -> Self {
        Self { pool, config }
    }

    /// `Submit(raw_url, origin, priority)`: normalizes, hashes, and
    /// inserts. Returns `false` if the hash already exists (§3 ii: `Insert`
    /// is a silent no-op on duplicate hash).
    pub async fn submit(&self, raw_url: &str, origin: Origin, priority: i32) -> Result<bool> {
        let canonical = normalize(raw_url).map_err(|e| anyhow::anyhow!(e))?;
        let hash = url_hash(raw_url).map_err(|e| anyhow::anyhow!(e))?;
        let host = url::Url::parse(&canonical)?
            .host_str()
            .ok_or_else(|| anyhow::anyhow!("normalized URL has no host"))?
            .to_string();

        let inserted = frontier_store::insert(&self.pool, &hash, &canonical, &host, origin, priority).await?;
        if inserted {
            debug!(hash, host, "submitted URL to frontier");
        }
        Ok(inserted)
    }

    /// `Claim(n)`: up to `n` ready rows, priority then next-fetch order.
    pub async fn claim(&self, n: i64) -> Result<Vec<FrontierUrl>> {
        let claim_token = Uuid::new_v4().to_string();
        frontier_store::claim(&self.pool, n, &claim_token).await
    }

    /// `Complete(id, success)`.
    pub async fn complete_success(&self, id: &str) -> Result<()> {
        frontier_store::complete_success(&self.pool, id).await
    }

    /// `Complete(id, failure, last_error)`: exponential backoff capped at
    /// `frontier.max_backoff_secs`; transitions to `dead` once `retry_count`
    /// exceeds `frontier.max_retries` (§4.C).
    pub async fn complete_failure(&self, id: &str, last_error: &str) -> Result<()> {
        frontier_store::complete_failure(
            &self.pool,
            id,
            last_error,
            self.config.base_backoff_secs as i64,
            self.config.max_backoff_secs as i64,
            self.config.max_retries as i32,
        )
        .await
    }

    /// Records a redirect-chain failure with the canonical
    /// `too_many_redirects` last-error string (§4.C).
    pub async fn complete_too_many_redirects(&self, id: &str) -> Result<()> {
        self.complete_failure(id, ErrTooManyRedirects::LAST_ERROR).await
    }

    /// `Reset(id)`: explicit `dead` -> `pending` transition.
    pub async fn reset(&self, id: &str) -> Result<()> {
        frontier_store::reset(&self.pool, id).await
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        frontier_store::delete(&self.pool, id).await
    }

    /// Returns stale `fetching` claims to `pending` (crash recovery).
    pub async fn recover_stale_claims(&self) -> Result<u64> {
        frontier_store::recover_stale_claims(&self.pool, self.config.stale_claim_age_secs as i64).await
    }

    pub async fn get(&self, id: &str) -> Result<Option<FrontierUrl>> {
        frontier_store::get(&self.pool, id).await
    }

    /// Fails a fetch job that has exceeded `frontier.max_redirects` hops.
    /// Callers track hop count themselves (the frontier has no notion of
    /// an in-flight redirect chain); this simply validates the budget and
    /// returns the sentinel error used to drive `complete_failure`.
    pub fn check_redirect_budget(&self, hops: usize) -> Result<(), ErrTooManyRedirects> {
        check_redirect_budget(hops, self.config.max_redirects)
    }
}

fn check_redirect_budget(hops: usize, max_redirects: usize) -> Result<(), ErrTooManyRedirects> {
    if hops >= max_redirects {
        Err(ErrTooManyRedirects { limit: max_redirects })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redirect_budget_rejects_at_and_beyond_limit() {
        assert!(check_redirect_budget(2, 3).is_ok());
        assert!(check_redirect_budget(3, 3).is_err());
        assert!(check_redirect_budget(4, 3).is_err());
    }
}
