//! Start/stop lifecycle for the bridge and its bus handlers.

use std::sync::Arc;

use anyhow::{bail, Context};
use parking_lot::Mutex;
use serde_json::json;
use tracing::{info, warn};

use crate::config::BridgeConfig;
use crate::core::{
    ActionHandler, AdmissionBridge, AppResult, BridgeError, HostScheduler, ItemNotifier,
    MessageBus, RunNotifier, Serializer,
};

/// Where a [`BridgeRuntime`] is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeState {
    /// Constructed, nothing attached to the bus.
    Idle,
    /// Handlers attached; `started` was announced.
    Running,
    /// Handlers detached and workers stopped. Terminal.
    Stopped,
}

/// Owns the admission bridge, the RPC handler and the lifecycle notifiers.
pub struct BridgeRuntime {
    config: BridgeConfig,
    bus: Arc<dyn MessageBus>,
    bridge: Arc<AdmissionBridge>,
    actions: ActionHandler,
    items: ItemNotifier,
    runs: RunNotifier,
    state: Mutex<RuntimeState>,
}

impl std::fmt::Debug for BridgeRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeRuntime")
            .field("config", &self.config)
            .field("state", &*self.state.lock())
            .field("bridge", &self.bridge)
            .field("actions", &self.actions)
            .finish_non_exhaustive()
    }
}

impl BridgeRuntime {
    /// Wire every component against `bus` and `host`.
    ///
    /// # Errors
    ///
    /// Propagates [`AdmissionBridge::new`] failures.
    pub fn new(
        config: BridgeConfig,
        bus: Arc<dyn MessageBus>,
        host: Arc<dyn HostScheduler>,
    ) -> Result<Self, BridgeError> {
        let serializer = Serializer::new(config.serializer_depth);
        let bridge = Arc::new(AdmissionBridge::new(&config, Arc::clone(&bus), Arc::clone(&host))?);
        let actions = ActionHandler::new(Arc::clone(&bus), host, serializer);
        let items = ItemNotifier::new(Arc::clone(&bus), config.item_address.clone(), serializer);
        let runs = RunNotifier::new(Arc::clone(&bus), config.run_address.clone(), serializer);
        Ok(Self {
            config,
            bus,
            bridge,
            actions,
            items,
            runs,
            state: Mutex::new(RuntimeState::Idle),
        })
    }

    /// Attach every handler and announce `started`.
    ///
    /// Calling it while running is a no-op.
    ///
    /// # Errors
    ///
    /// Fails if the runtime was already stopped or the announcement cannot
    /// be published. In the latter case every handler attached by this call
    /// is detached again and the state stays [`RuntimeState::Idle`].
    pub fn start(&self) -> AppResult<()> {
        let mut state = self.state.lock();
        match *state {
            RuntimeState::Running => return Ok(()),
            RuntimeState::Stopped => bail!("bridge runtime already stopped"),
            RuntimeState::Idle => {}
        }

        self.bridge.init();
        self.actions.install(&self.config.dispatch_address);

        if let Err(err) = self
            .bus
            .publish(&self.config.lifecycle_address, json!({ "action": "started" }))
        {
            // Leave nothing attached; the runtime stays Idle and may be retried.
            self.actions.close();
            self.bridge.close();
            return Err(err)
                .with_context(|| format!("failed to announce start on {}", self.config.lifecycle_address));
        }
        *state = RuntimeState::Running;
        info!(
            control = %self.config.control_address,
            dispatch = %self.config.dispatch_address,
            "bridge runtime started"
        );
        Ok(())
    }

    /// Detach every handler, announce `stopped` and stop the dispatch
    /// workers. Idempotent.
    pub fn stop(&self) {
        let mut state = self.state.lock();
        if *state == RuntimeState::Stopped {
            return;
        }
        let was_running = *state == RuntimeState::Running;
        *state = RuntimeState::Stopped;

        self.actions.close();
        self.bridge.shutdown();
        if was_running {
            if let Err(err) = self
                .bus
                .publish(&self.config.lifecycle_address, json!({ "action": "stopped" }))
            {
                warn!(error = %err, "unable to announce stop");
            }
        }
        info!("bridge runtime stopped");
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> RuntimeState {
        *self.state.lock()
    }

    /// Configuration in effect.
    #[must_use]
    pub const fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// The admission bridge the host should consult.
    #[must_use]
    pub const fn bridge(&self) -> &Arc<AdmissionBridge> {
        &self.bridge
    }

    /// The RPC handler.
    #[must_use]
    pub const fn actions(&self) -> &ActionHandler {
        &self.actions
    }

    /// Item lifecycle notifier for the host's item listener.
    #[must_use]
    pub const fn items(&self) -> &ItemNotifier {
        &self.items
    }

    /// Run lifecycle notifier for the host's build listener.
    #[must_use]
    pub const fn runs(&self) -> &RunNotifier {
        &self.runs
    }
}
