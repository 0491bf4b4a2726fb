use thiserror::Error;

/// Error taxonomy shared across components (§7). Variants are kinds, not
/// per-component type names: the HTTP adapter maps these to status codes,
/// the outbox router maps `Transient`/`Poisoned` to retry/terminal states.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Missing or malformed input. Never retried; surfaced as 4xx.
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    /// Signature didn't match. Distinct from `ValidationFailed` so callers
    /// can log it at `warn` and map it to 403 specifically.
    #[error("signature mismatch")]
    SignatureMismatch,

    /// Timestamp outside max-age.
    #[error("request expired")]
    Expired,

    /// Per-IP rate limit exceeded. Not logged per-hit.
    #[error("rate limited")]
    RateLimited,

    /// Network, timeout, bus-unavailable. Retried where applicable
    /// (outbox), dropped otherwise (ingest).
    #[error("transient error: {0}")]
    Transient(String),

    /// Retry count exceeded the ceiling. Terminal until explicit reset.
    #[error("poisoned after {retries} retries: {reason}")]
    Poisoned { retries: u32, reason: String },

    /// Missing required config, unreachable database at init, migration
    /// failure. Process exits non-zero.
    #[error("fatal: {0}")]
    Fatal(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Startup failure when no HMAC secret is configured (§4.A).
#[derive(Error, Debug)]
#[error("click.hmac_secret is not configured")]
pub struct ErrMissingSecret;

/// Sentinel returned by the frontier's redirect policy when a fetch chain
/// exceeds `frontier.max_redirects`. Callers map this to the canonical
/// last-error string `too_many_redirects` (§4.C).
#[derive(Error, Debug)]
#[error("too many redirects (limit {limit})")]
pub struct ErrTooManyRedirects {
    pub limit: usize,
}

impl ErrTooManyRedirects {
    pub const LAST_ERROR: &'static str = "too_many_redirects";
}
