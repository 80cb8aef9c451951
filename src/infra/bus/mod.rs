//! Message bus transports.

pub mod memory;

pub use memory::LocalBus;
