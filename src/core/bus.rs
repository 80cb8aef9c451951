//! Message bus abstraction.
//!
//! The bridge only needs four primitives from the transport: fire-and-forget
//! publish, request/reply send with a callback, and handler registration and
//! removal. Replies are delivered through the callback whenever (if ever) the
//! receiving handler answers; nothing here blocks.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

/// Callback invoked with the reply body of a request/reply send.
pub type ReplyCallback = Box<dyn FnOnce(Value) + Send + 'static>;

/// Errors raised by bus primitives.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    /// Nothing is registered at the target address.
    #[error("no handlers for address {0}")]
    NoHandlers(String),
    /// The bus has been shut down.
    #[error("bus is closed")]
    Closed,
    /// The transport could not be started.
    #[error("failed to start bus: {0}")]
    Start(String),
}

/// A message delivered to a handler.
pub struct Message {
    address: String,
    body: Value,
    reply_to: Option<ReplyCallback>,
}

impl Message {
    /// Create a message; `reply_to` is set for request/reply sends.
    pub fn new(address: impl Into<String>, body: Value, reply_to: Option<ReplyCallback>) -> Self {
        Self {
            address: address.into(),
            body,
            reply_to,
        }
    }

    /// Address the message was sent to.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Message body.
    #[must_use]
    pub const fn body(&self) -> &Value {
        &self.body
    }

    /// Whether the sender is waiting for a reply.
    #[must_use]
    pub const fn expects_reply(&self) -> bool {
        self.reply_to.is_some()
    }

    /// Answer the sender. Returns `false` for published messages, which
    /// have nobody to answer.
    pub fn reply(self, body: Value) -> bool {
        match self.reply_to {
            Some(callback) => {
                callback(body);
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("address", &self.address)
            .field("body", &self.body)
            .field("expects_reply", &self.expects_reply())
            .finish()
    }
}

/// Receives messages sent or published to an address.
pub trait MessageHandler: Send + Sync {
    /// Handle one message.
    fn handle(&self, msg: Message);
}

impl<F> MessageHandler for F
where
    F: Fn(Message) + Send + Sync,
{
    fn handle(&self, msg: Message) {
        self(msg);
    }
}

/// Identifies one handler registration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HandlerId(String);

impl HandlerId {
    /// Mint a fresh id for a registration at `address`.
    #[must_use]
    pub fn generate(address: &str) -> Self {
        Self(format!("{address}#{}", uuid::Uuid::new_v4()))
    }

    /// String form of the id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Address-based publish/subscribe transport with request/reply.
pub trait MessageBus: Send + Sync {
    /// Deliver `body` to every handler registered at `address`.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Closed`] once the bus is shut down.
    fn publish(&self, address: &str, body: Value) -> Result<(), BusError>;

    /// Deliver `body` to one handler at `address`; `on_reply` runs if and
    /// when that handler replies.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::NoHandlers`] when nothing listens at `address`,
    /// or [`BusError::Closed`] once the bus is shut down.
    fn send(&self, address: &str, body: Value, on_reply: ReplyCallback) -> Result<(), BusError>;

    /// Attach a handler to `address`.
    fn register_handler(&self, address: &str, handler: Arc<dyn MessageHandler>) -> HandlerId;

    /// Detach a previously registered handler. Returns `false` if unknown.
    fn unregister_handler(&self, id: &HandlerId) -> bool;
}
