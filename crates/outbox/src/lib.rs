pub mod bus;
pub mod router;

pub use bus::{Bus, NatsBus};
pub use router::Router;
