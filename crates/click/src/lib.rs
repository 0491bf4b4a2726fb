pub mod ingest;
pub mod signer;

pub use ingest::{Batcher, ClickBuffer, ClickOutcome, ClickParams, ClickSink, IngestPipeline, RateLimiter};
pub use signer::{ClickSigner, ErrMissingSecret};
