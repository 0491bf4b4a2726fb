use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use texting_robots::Robot;
use tracing::warn;

/// Cached robots.txt verdict for one host (§3 ownership: lives in the
/// frontier crate, not `driftnet-core`, since nothing outside this crate
/// needs the parsed robot).
struct RobotsEntry {
    robot: Option<Robot>,
    fetched_at: Instant,
}

/// §4.C "Respect robots.txt": fetches, parses and caches `robots.txt` per
/// host. Any fetch/parse failure degrades to allow-all rather than blocking
/// the frontier on a broken host (§4.C "graceful degradation").
pub struct RobotsCache {
    client: reqwest::Client,
    cache: DashMap<String, Arc<RobotsEntry>>,
    ttl: Duration,
    user_agent: String,
}

impl RobotsCache {
    pub fn new(user_agent: impl Into<String>, ttl: Duration, fetch_timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(fetch_timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            cache: DashMap::new(),
            ttl,
            user_agent: user_agent.into(),
        }
    }

    /// Returns `true` if `path` on `host` (scheme included, e.g.
    /// `https://example.com`) may be fetched under `robots.txt`.
    pub async fn is_allowed(&self, scheme_and_host: &str, path: &str) -> bool {
        let entry = self.entry_for(scheme_and_host).await;
        match entry.robot.as_ref() {
            Some(robot) => robot.allowed(path),
            None => true,
        }
    }

    /// Crawl-delay hint from `robots.txt`, if any.
    pub async fn crawl_delay(&self, scheme_and_host: &str) -> Option<Duration> {
        let entry = self.entry_for(scheme_and_host).await;
        entry.robot.as_ref().and_then(|r| r.delay).map(Duration::from_secs_f32)
    }

    async fn entry_for(&self, scheme_and_host: &str) -> Arc<RobotsEntry> {
        if let Some(cached) = self.cache.get(scheme_and_host) {
            if cached.fetched_at.elapsed() < self.ttl {
                return cached.clone();
            }
        }

        let robot = self.fetch(scheme_and_host).await;
        let entry = Arc::new(RobotsEntry {
            robot,
            fetched_at: Instant::now(),
        });
        self.cache.insert(scheme_and_host.to_string(), entry.clone());
        entry
    }

    async fn fetch(&self, scheme_and_host: &str) -> Option<Robot> {
        let url = format!("{scheme_and_host}/robots.txt");
        let response = match self.client.get(&url).send().await {
            Ok(r) => r,
            Err(err) => {
                warn!(scheme_and_host, %err, "robots.txt fetch failed, allowing all");
                return None;
            }
        };

        if !response.status().is_success() {
            return None;
        }

        let body = match response.bytes().await {
            Ok(b) => b,
            Err(err) => {
                warn!(scheme_and_host, %err, "robots.txt body read failed, allowing all");
                return None;
            }
        };

        match Robot::new(&self.user_agent, &body) {
            Ok(robot) => Some(robot),
            Err(err) => {
                warn!(scheme_and_host, ?err, "robots.txt parse failed, allowing all");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_host_degrades_to_allow_all() {
        let cache = RobotsCache::new("driftnet-bot", Duration::from_secs(60), Duration::from_millis(50));
        let allowed = cache.is_allowed("http://127.0.0.1:1", "/anything").await;
        assert!(allowed);
    }
}
