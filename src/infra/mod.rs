//! Infrastructure adapters: bus transports and host schedulers.

pub mod bus;
pub mod host;

pub use bus::LocalBus;
pub use host::{InMemoryHost, ScheduledBuild};
