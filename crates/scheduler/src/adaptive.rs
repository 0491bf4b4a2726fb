use chrono::{DateTime, Utc};
use driftnet_core::{AdaptiveConfig, HashState};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use sha2::{Digest, Sha256};
use tracing::debug;

fn redis_key(source_id: &str) -> String {
    format!("crawler:adaptive:{source_id}")
}

pub fn hash_content(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// §4.E adaptive per-source poll scheduler. A single writer owns each
/// source's key: concurrent observers of the same source would race, but
/// the design assumes one fetch worker per source, so a plain `SET`
/// (no compare-and-swap) is sufficient.
pub struct AdaptiveScheduler {
    conn: ConnectionManager,
    config: AdaptiveConfig,
}

impl AdaptiveScheduler {
    pub fn new(conn: ConnectionManager, config: AdaptiveConfig) -> Self {
        Self { conn, config }
    }

    async fn load(&mut self, source_id: &str) -> anyhow::Result<Option<HashState>> {
        let raw: Option<String> = self.conn.get(redis_key(source_id)).await?;
        Ok(match raw {
            Some(json) => Some(serde_json::from_str(&json)?),
            None => None,
        })
    }

    async fn save(&mut self, source_id: &str, state: &HashState) -> anyhow::Result<()> {
        let json = serde_json::to_string(state)?;
        self.conn.set::<_, _, ()>(redis_key(source_id), json).await?;
        Ok(())
    }

    /// `Record(source_id, content_hash)`: compares against the last
    /// observed hash and recomputes the interval per §4.E's exponential
    /// backoff formula:
    /// `current_interval = min(baseline * base^unchanged_count, max_interval)`,
    /// truncated to whole seconds after the cap is applied. The very first
    /// observation for a source always reports `changed = true`.
    pub async fn record(&mut self, source_id: &str, content_hash: &str, now: DateTime<Utc>) -> anyhow::Result<(HashState, bool)> {
        let previous = self.load(source_id).await?;

        let (state, changed) = match previous {
            None => (
                HashState {
                    last_hash: content_hash.to_string(),
                    last_change_at: now,
                    unchanged_count: 0,
                    current_interval_secs: self.config.baseline_secs,
                },
                true,
            ),
            Some(prev) if prev.last_hash == content_hash => {
                let unchanged_count = prev.unchanged_count + 1;
                let interval = compute_interval(
                    self.config.baseline_secs,
                    self.config.base,
                    unchanged_count,
                    self.config.max_interval_secs,
                );
                (
                    HashState {
                        last_hash: content_hash.to_string(),
                        last_change_at: prev.last_change_at,
                        unchanged_count,
                        current_interval_secs: interval,
                    },
                    false,
                )
            }
            Some(_) => (
                HashState {
                    last_hash: content_hash.to_string(),
                    last_change_at: now,
                    unchanged_count: 0,
                    current_interval_secs: self.config.baseline_secs,
                },
                true,
            ),
        };

        self.save(source_id, &state).await?;
        debug!(source_id, changed, interval_secs = state.current_interval_secs, "adaptive interval recorded");
        Ok((state, changed))
    }

    pub async fn next_fetch_at(&mut self, source_id: &str, now: DateTime<Utc>) -> anyhow::Result<DateTime<Utc>> {
        let state = self.load(source_id).await?.unwrap_or_default();
        Ok(now + chrono::Duration::seconds(state.current_interval_secs.max(self.config.baseline_secs)))
    }
}

/// `min(baseline * base^unchanged_count, max_interval)`, float multiply
/// then truncate, cap applied before truncation.
fn compute_interval(baseline_secs: i64, base: f64, unchanged_count: u32, max_interval_secs: i64) -> i64 {
    let raw = baseline_secs as f64 * base.powi(unchanged_count as i32);
    let capped = raw.min(max_interval_secs as f64);
    capped as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AdaptiveConfig {
        AdaptiveConfig {
            baseline_secs: 3600,
            max_interval_secs: 24 * 3600,
            base: 2.0,
        }
    }

    #[test]
    fn interval_doubles_per_unchanged_observation() {
        let c = config();
        assert_eq!(compute_interval(c.baseline_secs, c.base, 0, c.max_interval_secs), 3600);
        assert_eq!(compute_interval(c.baseline_secs, c.base, 1, c.max_interval_secs), 7200);
        assert_eq!(compute_interval(c.baseline_secs, c.base, 2, c.max_interval_secs), 14400);
        assert_eq!(compute_interval(c.baseline_secs, c.base, 3, c.max_interval_secs), 28800);
    }

    #[test]
    fn interval_is_capped_at_max() {
        let c = config();
        let interval = compute_interval(c.baseline_secs, c.base, 10, c.max_interval_secs);
        assert_eq!(interval, c.max_interval_secs);
    }

    #[test]
    fn hash_content_is_deterministic_and_64_hex_chars() {
        let a = hash_content(b"<html>same</html>");
        let b = hash_content(b"<html>same</html>");
        let c = hash_content(b"<html>different</html>");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }
}
