//! Shared utilities.

pub mod clock;
pub mod telemetry;
pub mod url;

pub use clock::*;
pub use telemetry::*;
pub use url::*;
