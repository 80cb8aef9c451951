//! Builders to construct the bridge and its runtime from configuration.

use std::sync::Arc;

use anyhow::Context;

use crate::config::BridgeConfig;
use crate::core::{AdmissionBridge, AppResult, BridgeError, HostScheduler, MessageBus};
use crate::runtime::BridgeRuntime;

/// Build an admission bridge with its control handler attached.
///
/// # Errors
///
/// Returns [`BridgeError::InvalidConfig`] if `cfg` fails validation, or
/// [`BridgeError::Internal`] if the dispatch workers cannot be started.
pub fn build_bridge(
    cfg: &BridgeConfig,
    bus: Arc<dyn MessageBus>,
    host: Arc<dyn HostScheduler>,
) -> Result<Arc<AdmissionBridge>, BridgeError> {
    cfg.validate()
        .map_err(|e| BridgeError::InvalidConfig(format!("config invalid: {e}")))?;
    let bridge = Arc::new(AdmissionBridge::new(cfg, bus, host)?);
    bridge.init();
    Ok(bridge)
}

/// Validate `cfg`, wire every component and start the runtime.
///
/// # Errors
///
/// Fails on invalid configuration, worker start-up failure, or if the
/// `started` announcement cannot be published.
pub fn build_runtime(
    cfg: BridgeConfig,
    bus: Arc<dyn MessageBus>,
    host: Arc<dyn HostScheduler>,
) -> AppResult<BridgeRuntime> {
    cfg.validate()
        .map_err(|e| BridgeError::InvalidConfig(format!("config invalid: {e}")))?;
    let runtime = BridgeRuntime::new(cfg, bus, host).context("failed to wire bridge runtime")?;
    if let Err(err) = runtime.start() {
        runtime.stop();
        return Err(err.context("failed to start bridge runtime"));
    }
    Ok(runtime)
}
