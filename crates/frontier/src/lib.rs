pub mod frontier;
pub mod normalize;
pub mod robots;

pub use frontier::Frontier;
pub use normalize::{normalize, url_hash, NormalizeError};
pub use robots::RobotsCache;
