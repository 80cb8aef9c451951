//! Builders to construct bridge components from configuration.

pub mod bridge_builder;

pub use bridge_builder::{build_bridge, build_runtime};
