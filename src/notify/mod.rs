// src/notify/mod.rs
pub mod payload;
pub mod queue;

pub use payload::{build_payload, Destination, DeliveryJob};
pub use queue::{jitter_delay, DeliveryQueue};
