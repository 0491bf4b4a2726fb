pub mod adaptive;

pub use adaptive::{hash_content, AdaptiveScheduler};

use redis::aio::ConnectionManager;

/// Establishes the shared Redis connection manager used by the adaptive
/// scheduler (auto-reconnecting, safe to clone and hand to multiple
/// workers).
pub async fn connect(redis_url: &str) -> anyhow::Result<ConnectionManager> {
    let client = redis::Client::open(redis_url)?;
    let conn = client.get_connection_manager().await?;
    Ok(conn)
}
