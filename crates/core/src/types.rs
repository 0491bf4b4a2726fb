use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// §3 ClickEvent. Created on successful verification, never mutated,
/// destroyed only by retention policy after persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClickEvent {
    pub query_id: String,
    pub result_id: String,
    pub position: u32,
    pub page: u32,
    pub destination_url: String,
    pub destination_hash: String,
    pub user_agent_hash: String,
    pub generated_at: DateTime<Utc>,
    pub clicked_at: DateTime<Utc>,
    pub session_id: Option<String>,
}

/// §3 FrontierURL lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrontierStatus {
    Pending,
    Fetching,
    Fetched,
    Failed,
    Dead,
}

impl FrontierStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FrontierStatus::Pending => "pending",
            FrontierStatus::Fetching => "fetching",
            FrontierStatus::Fetched => "fetched",
            FrontierStatus::Failed => "failed",
            FrontierStatus::Dead => "dead",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(FrontierStatus::Pending),
            "fetching" => Some(FrontierStatus::Fetching),
            "fetched" => Some(FrontierStatus::Fetched),
            "failed" => Some(FrontierStatus::Failed),
            "dead" => Some(FrontierStatus::Dead),
            _ => None,
        }
    }
}

/// Origin tag for a frontier URL: where the URL came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Feed,
    Sitemap,
    Spider,
    Manual,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::Feed => "feed",
            Origin::Sitemap => "sitemap",
            Origin::Spider => "spider",
            Origin::Manual => "manual",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "feed" => Some(Origin::Feed),
            "sitemap" => Some(Origin::Sitemap),
            "spider" => Some(Origin::Spider),
            "manual" => Some(Origin::Manual),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontierUrl {
    pub id: String,
    pub normalized_url: String,
    pub host: String,
    pub origin: Origin,
    pub status: FrontierStatus,
    pub priority: i32,
    pub next_fetch_at: DateTime<Utc>,
    pub retry_count: u32,
    pub last_error: Option<String>,
    pub claim_token: Option<String>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// §3 OutboxEntry lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxState {
    Pending,
    Publishing,
    Published,
    FailedRetryable,
    FailedExhausted,
}

impl OutboxState {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxState::Pending => "pending",
            OutboxState::Publishing => "publishing",
            OutboxState::Published => "published",
            OutboxState::FailedRetryable => "failed-retryable",
            OutboxState::FailedExhausted => "failed-exhausted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(OutboxState::Pending),
            "publishing" => Some(OutboxState::Publishing),
            "published" => Some(OutboxState::Published),
            "failed-retryable" => Some(OutboxState::FailedRetryable),
            "failed-exhausted" => Some(OutboxState::FailedExhausted),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxEntry {
    pub id: String,
    pub content_id: String,
    pub source: String,
    pub routing_key: String,
    pub payload: Vec<u8>,
    pub state: OutboxState,
    pub retry_count: i32,
    pub claim_token: Option<String>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub published_at: Option<DateTime<Utc>>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutboxStats {
    pub pending: i64,
    pub publishing: i64,
    pub published: i64,
    pub failed_retryable: i64,
    pub failed_exhausted: i64,
    pub avg_publish_lag_seconds: f64,
}

/// §3 HashState: per-source adaptive scheduling state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HashState {
    #[serde(default)]
    pub last_hash: String,
    pub last_change_at: DateTime<Utc>,
    #[serde(default)]
    pub unchanged_count: u32,
    pub current_interval_secs: i64,
}

impl Default for HashState {
    fn default() -> Self {
        Self {
            last_hash: String::new(),
            last_change_at: DateTime::<Utc>::UNIX_EPOCH,
            unchanged_count: 0,
            current_interval_secs: 0,
        }
    }
}

/// §3 PublishedClickRow: normalized tuple written in batches.
#[derive(Debug, Clone)]
pub struct PublishedClickRow {
    pub query_id: String,
    pub result_id: String,
    pub position: u32,
    pub page: u32,
    pub destination_hash: String,
    pub session_id: Option<String>,
    pub user_agent_hash: String,
    pub generated_at: DateTime<Utc>,
    pub clicked_at: DateTime<Utc>,
}

impl From<&ClickEvent> for PublishedClickRow {
    fn from(e: &ClickEvent) -> Self {
        Self {
            query_id: e.query_id.clone(),
            result_id: e.result_id.clone(),
            position: e.position,
            page: e.page,
            destination_hash: e.destination_hash.clone(),
            session_id: e.session_id.clone(),
            user_agent_hash: e.user_agent_hash.clone(),
            generated_at: e.generated_at,
            clicked_at: e.clicked_at,
        }
    }
}
