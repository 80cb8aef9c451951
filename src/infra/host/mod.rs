//! Host scheduler adapters.

pub mod memory;

pub use memory::{InMemoryHost, ScheduledBuild};
