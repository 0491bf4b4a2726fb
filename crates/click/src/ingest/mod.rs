pub mod batcher;
pub mod bot_filter;
pub mod buffer;
pub mod pipeline;
pub mod rate_limiter;

pub use batcher::{Batcher, ClickSink};
pub use buffer::ClickBuffer;
pub use pipeline::{ClickOutcome, ClickParams, IngestPipeline};
pub use rate_limiter::RateLimiter;
