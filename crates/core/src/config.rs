use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub bus: BusConfig,
    pub redis: RedisConfig,
    pub click: ClickConfig,
    pub ratelimit: RateLimitConfig,
    pub frontier: FrontierConfig,
    pub robots: RobotsConfig,
    pub outbox: OutboxConfig,
    pub adaptive: AdaptiveConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub postgres_url: String,
    #[serde(default = "default_pool_size")]
    pub max_connections: u32,
}

fn default_pool_size() -> u32 {
    20
}

#[derive(Debug, Deserialize, Clone)]
pub struct BusConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClickConfig {
    /// `(required)`: absence fails startup (`ErrMissingSecret`).
    #[serde(default)]
    pub hmac_secret: Option<String>,
    #[serde(default = "default_signature_length")]
    pub signature_length: usize,
    #[serde(default = "default_max_timestamp_age_secs")]
    pub max_timestamp_age_secs: u64,
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,
    #[serde(default = "default_flush_threshold")]
    pub flush_threshold: usize,
    #[serde(default = "default_insert_batch_size")]
    pub insert_batch_size: usize,
    #[serde(default = "default_flush_timeout_secs")]
    pub flush_timeout_secs: u64,
}

impl ClickConfig {
    pub fn max_timestamp_age(&self) -> Duration {
        Duration::from_secs(self.max_timestamp_age_secs)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }

    pub fn flush_timeout(&self) -> Duration {
        Duration::from_secs(self.flush_timeout_secs)
    }
}

fn default_signature_length() -> usize {
    12
}
fn default_max_timestamp_age_secs() -> u64 {
    24 * 3600
}
fn default_buffer_size() -> usize {
    1000
}
fn default_flush_interval_secs() -> u64 {
    1
}
fn default_flush_threshold() -> usize {
    500
}
fn default_insert_batch_size() -> usize {
    50
}
fn default_flush_timeout_secs() -> u64 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct RateLimitConfig {
    #[serde(default = "default_max_per_minute")]
    pub max_per_minute: u32,
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

fn default_max_per_minute() -> u32 {
    10
}
fn default_window_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct FrontierConfig {
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
    #[serde(default = "default_base_backoff_secs")]
    pub base_backoff_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,
    #[serde(default = "default_claim_batch")]
    pub claim_batch: usize,
    #[serde(default = "default_stale_claim_age_secs")]
    pub stale_claim_age_secs: u64,
}

impl FrontierConfig {
    pub fn stale_claim_age(&self) -> Duration {
        Duration::from_secs(self.stale_claim_age_secs)
    }
}

fn default_max_redirects() -> usize {
    10
}
fn default_base_backoff_secs() -> u64 {
    60
}
fn default_max_retries() -> u32 {
    5
}
fn default_max_backoff_secs() -> u64 {
    6 * 3600
}
fn default_claim_batch() -> usize {
    50
}
fn default_stale_claim_age_secs() -> u64 {
    600
}

#[derive(Debug, Deserialize, Clone)]
pub struct RobotsConfig {
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
}

impl RobotsConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

fn default_cache_ttl_secs() -> u64 {
    24 * 3600
}
fn default_fetch_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutboxConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_outbox_batch_size")]
    pub batch_size: i64,
    #[serde(default = "default_publish_timeout_secs")]
    pub publish_timeout_secs: u64,
    #[serde(default = "default_stale_age_secs")]
    pub stale_age_secs: i64,
    #[serde(default = "default_retention_secs")]
    pub retention_secs: i64,
    #[serde(default = "default_recovery_interval_secs")]
    pub recovery_interval_secs: u64,
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
    #[serde(default = "default_outbox_max_retries")]
    pub max_retries: i32,
    #[serde(default = "default_outbox_max_backoff_secs")]
    pub max_backoff_secs: i64,
}

impl OutboxConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_secs(self.publish_timeout_secs)
    }

    pub fn recovery_interval(&self) -> Duration {
        Duration::from_secs(self.recovery_interval_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

fn default_poll_interval_secs() -> u64 {
    5
}
fn default_outbox_batch_size() -> i64 {
    100
}
fn default_publish_timeout_secs() -> u64 {
    10
}
fn default_stale_age_secs() -> i64 {
    5 * 60
}
fn default_retention_secs() -> i64 {
    7 * 24 * 3600
}
fn default_recovery_interval_secs() -> u64 {
    60
}
fn default_cleanup_interval_secs() -> u64 {
    3600
}
fn default_outbox_max_retries() -> i32 {
    8
}
fn default_outbox_max_backoff_secs() -> i64 {
    3600
}

#[derive(Debug, Deserialize, Clone)]
pub struct AdaptiveConfig {
    #[serde(default = "default_baseline_secs")]
    pub baseline_secs: i64,
    #[serde(default = "default_max_interval_secs")]
    pub max_interval_secs: i64,
    #[serde(default = "default_adaptive_base")]
    pub base: f64,
}

fn default_baseline_secs() -> i64 {
    3600
}
fn default_max_interval_secs() -> i64 {
    24 * 3600
}
fn default_adaptive_base() -> f64 {
    2.0
}
