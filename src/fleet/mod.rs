//! Fleet liveness tracking.
//!
//! - [`config`]: which sensors belong to the fleet
//! - [`store`]: where their latest readings come from
//! - [`aggregator`]: per-sensor state machine and fleet verdict
//! - [`monitor`]: poll cycles and scheduling
//! - [`presence`]: which sensors were heard over the radio recently
//! - [`upload`]: pushing the newest local readings to the remote store

pub mod aggregator;
pub mod config;
#[cfg(feature = "http")]
pub mod http;
pub mod monitor;
pub mod presence;
pub mod store;
pub mod upload;
