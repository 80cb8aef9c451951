//! Single-slot correlation between one admission check and its reply.
//!
//! [`reply_slot`] returns a fulfil side, cloned into every party that may
//! answer (the bus reply callback, the dispatch worker on send failure), and
//! a wait side owned by the checking thread. The slot accepts one outcome;
//! later fulfilments, including replies arriving after the waiter gave up,
//! are dropped without effect.

use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use serde_json::Value;
use tracing::debug;

use super::error::BridgeError;

/// What a pending request resolves to.
pub type PendingOutcome = Result<Value, BridgeError>;

/// Create a connected slot/waiter pair.
#[must_use]
pub fn reply_slot() -> (ReplySlot, ReplyWaiter) {
    let (tx, rx) = bounded(1);
    (ReplySlot { tx }, ReplyWaiter { rx })
}

/// Fulfil side of a pending request.
#[derive(Debug, Clone)]
pub struct ReplySlot {
    tx: Sender<PendingOutcome>,
}

impl ReplySlot {
    /// Offer an outcome. Returns `true` only for the first accepted outcome
    /// while the waiter is still present.
    pub fn fulfil(&self, outcome: PendingOutcome) -> bool {
        match self.tx.try_send(outcome) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!("reply slot already fulfilled; dropping duplicate");
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                debug!("waiter gone; dropping late reply");
                false
            }
        }
    }
}

/// Wait side of a pending request.
#[derive(Debug)]
pub struct ReplyWaiter {
    rx: Receiver<PendingOutcome>,
}

impl ReplyWaiter {
    /// Block until an outcome arrives or `deadline` passes.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Timeout`] at the deadline, or
    /// [`BridgeError::NoReply`] if every slot was dropped unfulfilled;
    /// otherwise passes the fulfilled outcome through.
    pub fn wait_until(self, deadline: Instant) -> PendingOutcome {
        match self.rx.recv_deadline(deadline) {
            Ok(outcome) => outcome,
            Err(RecvTimeoutError::Timeout) => Err(BridgeError::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(BridgeError::NoReply),
        }
    }

    /// Block for at most `timeout`.
    ///
    /// # Errors
    ///
    /// See [`ReplyWaiter::wait_until`].
    pub fn wait_for(self, timeout: Duration) -> PendingOutcome {
        self.wait_until(Instant::now() + timeout)
    }
}
