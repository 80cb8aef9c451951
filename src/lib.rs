//! # Bus Admission
//!
//! Synchronous admission checks for a host scheduler, answered by an external
//! decision service over an asynchronous message bus.
//!
//! The host asks "may this queued item run now?" and expects an immediate
//! answer. The decision service lives on the other side of a publish/subscribe
//! bus whose replies arrive through callbacks. This crate turns one into the
//! other: each check becomes a request/reply exchange with a hard ceiling on
//! how long the host waits, and every failure resolves to "yes".
//!
//! ## Key Features
//!
//! - **Fail-open admission**: no registered service, no reply, a refused send
//!   or a saturated dispatch pool all let the item run
//! - **Bounded latency**: the ceiling is measured from the start of the check
//!   and holds even when every dispatch worker is busy
//! - **Dynamic registration**: a decision service registers and unregisters
//!   itself over the bus at runtime
//! - **Bus RPC**: schedule builds and list items or the queue over the bus
//! - **Lifecycle broadcasts**: item and build events published as documents
//! - **Total serializer**: depth-bounded object-to-document conversion that
//!   turns cycles, encoding failures and panics into inline error documents
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use bus_admission::builders::build_runtime;
//! use bus_admission::config::BridgeConfig;
//! use bus_admission::infra::{InMemoryHost, LocalBus};
//!
//! let bus = Arc::new(LocalBus::new()?);
//! let host = Arc::new(InMemoryHost::default());
//! let runtime = build_runtime(BridgeConfig::from_env()?, bus, host)?;
//!
//! // Host side, for each queued item:
//! if let Some(blockage) = runtime.bridge().can_run(&item) {
//!     println!("held back: {blockage}");
//! }
//!
//! runtime.stop();
//! ```
//!
//! For complete scenarios, see `tests/admission_bridge_test.rs`.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Admission bridging, bus-facing RPC, and the depth-bounded serializer.
pub mod core;
/// Configuration models for bus addresses, timeouts and dispatch sizing.
pub mod config;
/// Builders to construct bridge components from configuration.
pub mod builders;
/// Infrastructure adapters: bus transports and host schedulers.
pub mod infra;
/// Runtime wiring and start/stop lifecycle.
pub mod runtime;
/// Shared utilities.
pub mod util;
