//! Configuration models for bus addresses, timeouts and dispatch sizing.

pub mod bridge;

pub use bridge::{BridgeConfig, ENV_PREFIX, MAX_SERIALIZER_DEPTH};
