//! Registry of the single external decision service.
//!
//! At most one address is registered at a time. Registering over a live
//! registration replaces it (logged as a conflict); unregistering requires the
//! exact address currently held. Two services racing to register is resolved
//! by last-writer-wins.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{info, warn};

use super::bus::{Message, MessageHandler};
use super::error::BridgeError;
use super::protocol::{
    action_of, required_str, Reply, ACTION_REGISTER, ACTION_UNREGISTER, HANDLER_ADDRESS_FIELD,
};

/// Slot holding the active decision-service address.
#[derive(Debug, Default)]
pub struct HandlerRegistry {
    slot: Mutex<Option<String>>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `address`, returning the address it replaced, if any.
    pub fn register(&self, address: &str) -> Option<String> {
        let mut slot = self.slot.lock();
        let previous = slot.replace(address.to_string());
        match &previous {
            Some(existing) => {
                warn!(existing = %existing, replacement = %address, "replacing existing handler");
            }
            None => info!(handler = %address, "decision service registered"),
        }
        previous
    }

    /// Clear the registration if `address` matches it exactly.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::HandlerMismatch`] if `address` is not the
    /// registered one (including when nothing is registered); the registry
    /// is left unchanged.
    pub fn unregister(&self, address: &str) -> Result<(), BridgeError> {
        let mut slot = self.slot.lock();
        if slot.as_deref() == Some(address) {
            *slot = None;
            info!(handler = %address, "decision service unregistered");
            Ok(())
        } else {
            Err(BridgeError::HandlerMismatch)
        }
    }

    /// Copy of the current registration.
    #[must_use]
    pub fn snapshot(&self) -> Option<String> {
        self.slot.lock().clone()
    }

    /// Whether no service is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slot.lock().is_none()
    }
}

/// Bus handler serving `register` / `unregister` on the control address.
#[derive(Debug, Clone)]
pub struct ControlHandler {
    registry: Arc<HandlerRegistry>,
}

impl ControlHandler {
    /// Serve control requests against `registry`.
    #[must_use]
    pub const fn new(registry: Arc<HandlerRegistry>) -> Self {
        Self { registry }
    }

    /// Apply one control request and build its reply.
    #[must_use]
    pub fn process(&self, body: &Value) -> Reply {
        let outcome = action_of(body).and_then(|action| match action {
            ACTION_REGISTER => {
                let address = required_str(body, HANDLER_ADDRESS_FIELD)?;
                self.registry.register(address);
                Ok(Reply::ok())
            }
            ACTION_UNREGISTER => {
                let address = required_str(body, HANDLER_ADDRESS_FIELD)?;
                self.registry.unregister(address)?;
                Ok(Reply::ok())
            }
            other => Err(BridgeError::UnknownAction(other.to_string())),
        });
        if let Err(err) = &outcome {
            tracing::error!(error = %err, "control request failed");
        }
        Reply::from(outcome)
    }
}

impl MessageHandler for ControlHandler {
    fn handle(&self, msg: Message) {
        let reply = self.process(msg.body());
        msg.reply(reply.to_document());
    }
}
