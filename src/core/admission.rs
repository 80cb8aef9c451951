//! Admission bridge: synchronous `can_run` answered over the bus.
//!
//! The host asks [`AdmissionBridge::can_run`] whether a queued item may start.
//! With no decision service registered the answer is an immediate "yes". With
//! one registered, the item is serialized into a `canRun` request, handed to
//! the [`DispatchPool`](super::dispatcher::DispatchPool) for delivery, and the
//! caller blocks on a single-slot reply until the check's deadline. Every
//! failure on that path (timeout, send failure, saturation, shutdown) resolves
//! to "yes" with a warning, so an absent or broken service can never stall the
//! host queue.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::config::BridgeConfig;
use crate::util::url::encode_url;

use super::bus::{HandlerId, MessageBus};
use super::dispatcher::{DispatchJob, DispatchPool, DispatchStats};
use super::error::BridgeError;
use super::host::HostScheduler;
use super::model::{CauseOfBlockage, QueueItem};
use super::protocol::{Verdict, ACTION_CAN_RUN};
use super::registry::{ControlHandler, HandlerRegistry};
use super::reply::reply_slot;
use super::serializer::Serializer;

/// Blocking admission check backed by an external decision service.
pub struct AdmissionBridge {
    control_address: String,
    reply_timeout: Duration,
    registry: Arc<HandlerRegistry>,
    bus: Arc<dyn MessageBus>,
    host: Arc<dyn HostScheduler>,
    serializer: Serializer,
    pool: DispatchPool,
    control_id: Mutex<Option<HandlerId>>,
    next_check: AtomicU64,
}

impl std::fmt::Debug for AdmissionBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionBridge")
            .field("control_address", &self.control_address)
            .field("reply_timeout", &self.reply_timeout)
            .field("registered", &self.registry.snapshot())
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

impl AdmissionBridge {
    /// Create a bridge and start its dispatch workers.
    ///
    /// The control handler is not attached until [`AdmissionBridge::init`].
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InvalidConfig`] if `config` fails validation,
    /// or [`BridgeError::Internal`] if a dispatch worker cannot be spawned.
    pub fn new(
        config: &BridgeConfig,
        bus: Arc<dyn MessageBus>,
        host: Arc<dyn HostScheduler>,
    ) -> Result<Self, BridgeError> {
        config.validate().map_err(BridgeError::InvalidConfig)?;
        let pool = DispatchPool::new(
            Arc::clone(&bus),
            config.dispatch_workers,
            config.max_pending_checks,
            config.thread_stack_size,
        )?;
        Ok(Self {
            control_address: config.control_address.clone(),
            reply_timeout: Duration::from_millis(config.reply_timeout_ms),
            registry: Arc::new(HandlerRegistry::new()),
            bus,
            host,
            serializer: Serializer::new(config.serializer_depth),
            pool,
            control_id: Mutex::new(None),
            next_check: AtomicU64::new(0),
        })
    }

    /// Attach the control handler. Calling it twice is a no-op.
    pub fn init(&self) {
        let mut control_id = self.control_id.lock();
        if control_id.is_some() {
            return;
        }
        let handler = Arc::new(ControlHandler::new(Arc::clone(&self.registry)));
        let id = self.bus.register_handler(&self.control_address, handler);
        info!(address = %self.control_address, handler_id = %id, "admission control listening");
        *control_id = Some(id);
    }

    /// Detach the control handler. The registration itself is kept.
    pub fn close(&self) {
        if let Some(id) = self.control_id.lock().take() {
            if !self.bus.unregister_handler(&id) {
                debug!(handler_id = %id, "control handler already gone");
            }
        }
    }

    /// The decision-service registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    /// Dispatch counters.
    #[must_use]
    pub fn stats(&self) -> DispatchStats {
        self.pool.stats()
    }

    /// Upper bound on one check.
    #[must_use]
    pub const fn reply_timeout(&self) -> Duration {
        self.reply_timeout
    }

    /// Decide whether `item` may start. `None` means it may.
    ///
    /// Never fails and never blocks past the configured reply timeout,
    /// measured from the start of this call.
    pub fn can_run(&self, item: &QueueItem) -> Option<CauseOfBlockage> {
        let started = Instant::now();
        let Some(address) = self.registry.snapshot() else {
            debug!(item_id = item.id, "no decision service registered; allowing");
            return None;
        };
        let deadline = started + self.reply_timeout;
        let check_id = self.next_check.fetch_add(1, Ordering::Relaxed);

        let (slot, waiter) = reply_slot();
        let job = DispatchJob {
            check_id,
            address: address.clone(),
            request: self.build_request(item),
            slot,
            deadline,
        };
        if let Err(err) = self.pool.submit(job) {
            warn!(handler = %address, check_id, error = %err, "unable to dispatch canRun; allowing");
            return None;
        }

        match waiter.wait_until(deadline) {
            Ok(reply) => {
                let blockage = Verdict::from_reply(&reply).into_blockage();
                debug!(
                    handler = %address,
                    check_id,
                    blocked = blockage.is_some(),
                    elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                    "canRun answered"
                );
                blockage
            }
            // The worker already logged the send failure.
            Err(BridgeError::SendFailed(_)) => None,
            Err(err) => {
                warn!(handler = %address, check_id, error = %err, "no canRun verdict; allowing");
                None
            }
        }
    }

    /// Run [`AdmissionBridge::can_run`] on tokio's blocking pool.
    #[cfg(feature = "tokio-runtime")]
    pub async fn can_run_async(self: &Arc<Self>, item: QueueItem) -> Option<CauseOfBlockage> {
        let bridge = Arc::clone(self);
        match tokio::task::spawn_blocking(move || bridge.can_run(&item)).await {
            Ok(blockage) => blockage,
            Err(err) => {
                warn!(error = %err, "canRun task failed; allowing");
                None
            }
        }
    }

    /// Build the `canRun` request for `item`.
    ///
    /// The task URL is made absolute against the host root and escaped, and
    /// each action is serialized on its own, so one failing action cannot
    /// hide the rest.
    #[must_use]
    pub fn build_request(&self, item: &QueueItem) -> Value {
        let actions: Vec<Value> = item
            .actions
            .iter()
            .filter_map(|action| self.serializer.serialize_action(Some(&**action)))
            .collect();

        let mut doc = Map::new();
        doc.insert("id".into(), json!(item.id));
        doc.insert("blocked".into(), json!(item.blocked));
        doc.insert("buildable".into(), json!(item.buildable));
        doc.insert("stuck".into(), json!(item.stuck));
        doc.insert("inQueueSince".into(), json!(item.in_queue_since_ms));
        item.write_state(&mut doc);
        doc.insert("params".into(), json!(item.params));
        doc.insert(
            "task".into(),
            json!({
                "name": item.task.name,
                "url": encode_url(&format!("{}{}", self.host.root_url(), item.task.url)),
            }),
        );
        doc.insert("actions".into(), Value::Array(actions));

        json!({ "action": ACTION_CAN_RUN, "item": doc })
    }

    /// Detach the control handler and stop the dispatch workers.
    pub fn shutdown(&self) {
        self.close();
        self.pool.shutdown();
    }
}
