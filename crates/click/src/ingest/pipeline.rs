use std::net::IpAddr;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use driftnet_core::ClickEvent;
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::signer::ClickSigner;

use super::bot_filter;
use super::buffer::ClickBuffer;
use super::rate_limiter::RateLimiter;

/// Raw, already-split query parameters from `GET /click` (§6). Parsing
/// query-string syntax itself is the HTTP adapter's job (out of scope,
/// §1); everything from here down is the pipeline.
#[derive(Debug, Clone)]
pub struct ClickParams {
    pub query_id: Option<String>,
    pub result_id: Option<String>,
    pub position: Option<u32>,
    pub page: Option<u32>,
    pub timestamp: Option<i64>,
    pub destination_url: Option<String>,
    pub signature: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
    /// 302-equivalent.
    Redirect { destination_url: String },
    /// 400-equivalent.
    BadRequest(&'static str),
    /// 403-equivalent.
    SignatureMismatch,
    /// 410-equivalent.
    Expired,
    /// 429-equivalent.
    RateLimited,
}

pub struct IngestPipeline {
    signer: ClickSigner,
    rate_limiter: Arc<RateLimiter>,
    buffer: Arc<ClickBuffer>,
    max_age: chrono::Duration,
}

impl IngestPipeline {
    pub fn new(
        signer: ClickSigner,
        rate_limiter: Arc<RateLimiter>,
        buffer: Arc<ClickBuffer>,
        max_age: std::time::Duration,
    ) -> Self {
        Self {
            signer,
            rate_limiter,
            buffer,
            max_age: chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::hours(24)),
        }
    }

    /// Runs the full §4.B request path. `now` is injected so tests can
    /// control freshness/rate-limit windows deterministically (§8 scenario
    /// 7). The redirect is issued regardless of buffer outcome: "user
    /// experience is never degraded by backpressure" (§4.B step 7).
    pub fn handle(
        &self,
        ip: IpAddr,
        user_agent: Option<&str>,
        params: &ClickParams,
        now: DateTime<Utc>,
    ) -> ClickOutcome {
        let is_bot = bot_filter::is_bot(user_agent);

        // Rate limiting applies before parameter parsing per §4.B ordering.
        if !self.rate_limiter.check(ip, now) {
            return ClickOutcome::RateLimited;
        }

        let Some(query_id) = params.query_id.as_deref().filter(|s| !s.is_empty()) else {
            return ClickOutcome::BadRequest("missing query_id");
        };
        let Some(result_id) = params.result_id.as_deref().filter(|s| !s.is_empty()) else {
            return ClickOutcome::BadRequest("missing result_id");
        };
        let Some(position) = params.position.filter(|&p| p >= 1) else {
            return ClickOutcome::BadRequest("missing or invalid position");
        };
        let page = match params.page {
            Some(p) if p >= 1 => p,
            _ => 1,
        };
        let Some(timestamp) = params.timestamp else {
            return ClickOutcome::BadRequest("missing timestamp");
        };
        let Some(destination_url) = params.destination_url.as_deref().filter(|s| !s.is_empty())
        else {
            return ClickOutcome::BadRequest("missing destination_url");
        };
        let Some(signature) = params.signature.as_deref().filter(|s| !s.is_empty()) else {
            return ClickOutcome::BadRequest("missing signature");
        };

        let message = ClickSigner::canonical_message(
            query_id,
            result_id,
            position,
            page,
            timestamp,
            destination_url,
        );
        if !self.signer.verify(&message, signature) {
            return ClickOutcome::SignatureMismatch;
        }

        let Some(generated_at) = Utc.timestamp_opt(timestamp, 0).single() else {
            return ClickOutcome::BadRequest("invalid timestamp");
        };

        if now - generated_at > self.max_age {
            return ClickOutcome::Expired;
        }

        // Bots get redirected but never enqueued (§4.B step 1, §7
        // "For bot user-agents the pipeline redirects silently").
        if !is_bot {
            let event = ClickEvent {
                query_id: query_id.to_string(),
                result_id: result_id.to_string(),
                position,
                page,
                destination_hash: sha256_hex(destination_url),
                user_agent_hash: user_agent_hash(user_agent),
                generated_at,
                clicked_at: now,
                session_id: None,
                destination_url: destination_url.to_string(),
            };
            if !self.buffer.send(event) {
                warn!(query_id, result_id, "click buffer full, dropping event");
            }
        }

        ClickOutcome::Redirect {
            destination_url: destination_url.to_string(),
        }
    }
}

fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// First 12 hex chars of SHA-256 of the UA string; empty if UA absent (§3).
fn user_agent_hash(user_agent: Option<&str>) -> String {
    match user_agent {
        Some(ua) if !ua.is_empty() => sha256_hex(ua)[..12].to_string(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};
    use std::time::Duration;

    fn ip() -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1))
    }

    fn pipeline() -> IngestPipeline {
        IngestPipeline::new(
            ClickSigner::new("test-secret-key", 12).unwrap(),
            Arc::new(RateLimiter::new(100, Duration::from_secs(60))),
            Arc::new(ClickBuffer::new(10)),
            Duration::from_secs(24 * 3600),
        )
    }

    fn valid_params(signer: &ClickSigner, now: i64) -> ClickParams {
        let message = ClickSigner::canonical_message("q_abc", "r_doc", 3, 1, now, "https://example.com/article");
        ClickParams {
            query_id: Some("q_abc".into()),
            result_id: Some("r_doc".into()),
            position: Some(3),
            page: Some(1),
            timestamp: Some(now),
            destination_url: Some("https://example.com/article".into()),
            signature: Some(signer.sign(&message)),
        }
    }

    #[test]
    fn valid_click_redirects_and_enqueues() {
        let p = pipeline();
        let now = Utc::now();
        let params = valid_params(&ClickSigner::new("test-secret-key", 12).unwrap(), now.timestamp());
        let outcome = p.handle(ip(), Some("Mozilla/5.0"), &params, now);
        assert_eq!(
            outcome,
            ClickOutcome::Redirect {
                destination_url: "https://example.com/article".into()
            }
        );
        assert_eq!(p.buffer.len(), 1);
    }

    #[test]
    fn invalid_signature_is_forbidden_and_not_enqueued() {
        let p = pipeline();
        let now = Utc::now();
        let mut params = valid_params(&ClickSigner::new("test-secret-key", 12).unwrap(), now.timestamp());
        params.signature = Some("000000000000".into());
        let outcome = p.handle(ip(), Some("Mozilla/5.0"), &params, now);
        assert_eq!(outcome, ClickOutcome::SignatureMismatch);
        assert_eq!(p.buffer.len(), 0);
    }

    #[test]
    fn expired_click_is_410() {
        let p = pipeline();
        let now = Utc::now();
        let old = now - chrono::Duration::hours(25);
        let params = valid_params(&ClickSigner::new("test-secret-key", 12).unwrap(), old.timestamp());
        let outcome = p.handle(ip(), Some("Mozilla/5.0"), &params, now);
        assert_eq!(outcome, ClickOutcome::Expired);
    }

    #[test]
    fn bot_click_redirects_without_enqueue() {
        let p = pipeline();
        let now = Utc::now();
        let params = valid_params(&ClickSigner::new("test-secret-key", 12).unwrap(), now.timestamp());
        let outcome = p.handle(
            ip(),
            Some("Googlebot/2.1 (+http://www.google.com/bot.html)"),
            &params,
            now,
        );
        assert_eq!(
            outcome,
            ClickOutcome::Redirect {
                destination_url: "https://example.com/article".into()
            }
        );
        assert_eq!(p.buffer.len(), 0);
    }

    #[test]
    fn missing_params_is_bad_request() {
        let p = pipeline();
        let now = Utc::now();
        let params = ClickParams {
            query_id: Some("abc".into()),
            result_id: None,
            position: None,
            page: None,
            timestamp: None,
            destination_url: None,
            signature: None,
        };
        let outcome = p.handle(ip(), Some("Mozilla/5.0"), &params, now);
        assert!(matches!(outcome, ClickOutcome::BadRequest(_)));
    }

    #[test]
    fn page_defaults_to_one_when_absent_or_zero() {
        let signer = ClickSigner::new("test-secret-key", 12).unwrap();
        let now = Utc::now();
        let message = ClickSigner::canonical_message("q", "r", 1, 1, now.timestamp(), "https://example.com");
        let params = ClickParams {
            query_id: Some("q".into()),
            result_id: Some("r".into()),
            position: Some(1),
            page: None,
            timestamp: Some(now.timestamp()),
            destination_url: Some("https://example.com".into()),
            signature: Some(signer.sign(&message)),
        };
        let p = IngestPipeline::new(
            signer,
            Arc::new(RateLimiter::new(100, Duration::from_secs(60))),
            Arc::new(ClickBuffer::new(10)),
            Duration::from_secs(24 * 3600),
        );
        let outcome = p.handle(ip(), Some("Mozilla/5.0"), &params, now);
        assert!(matches!(outcome, ClickOutcome::Redirect { .. }));
    }

    #[test]
    fn rate_limit_exceeded_is_429() {
        let p = IngestPipeline::new(
            ClickSigner::new("test-secret-key", 12).unwrap(),
            Arc::new(RateLimiter::new(3, Duration::from_secs(60))),
            Arc::new(ClickBuffer::new(10)),
            Duration::from_secs(24 * 3600),
        );
        let signer = ClickSigner::new("test-secret-key", 12).unwrap();
        let now = Utc::now();
        let params = valid_params(&signer, now.timestamp());
        for _ in 0..3 {
            assert!(matches!(p.handle(ip(), Some("Mozilla/5.0"), &params, now), ClickOutcome::Redirect { .. }));
        }
        assert_eq!(p.handle(ip(), Some("Mozilla/5.0"), &params, now), ClickOutcome::RateLimited);
    }
}
