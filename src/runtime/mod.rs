//! Runtime wiring: one object owning every bus-facing component.

pub mod plugin;

pub use plugin::{BridgeRuntime, RuntimeState};
