pub mod config;
pub mod error;
pub mod types;

pub use config::{
    AdaptiveConfig, AppConfig, BusConfig, ClickConfig, DatabaseConfig, FrontierConfig,
    OutboxConfig, RateLimitConfig, RedisConfig, RobotsConfig,
};
pub use error::{CoreError, ErrMissingSecret, ErrTooManyRedirects};
pub use types::*;
