//! Broadcasts of item and run lifecycle events.
//!
//! Notifiers are called from host listener callbacks, so publish failures are
//! logged and swallowed: a closed bus must not break item or build handling.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::bus::MessageBus;
use super::model::{Project, Run};
use super::protocol::ACTION_FIELD;
use super::serializer::Serializer;

#[derive(Clone)]
struct Broadcaster {
    bus: Arc<dyn MessageBus>,
    address: String,
}

impl Broadcaster {
    fn publish(&self, action: &str, fields: Vec<(&str, Value)>) -> bool {
        let mut body = Map::new();
        body.insert(ACTION_FIELD.into(), Value::String(action.into()));
        for (name, value) in fields {
            body.insert(name.into(), value);
        }
        match self.bus.publish(&self.address, Value::Object(body)) {
            Ok(()) => {
                debug!(address = %self.address, action, "lifecycle event published");
                true
            }
            Err(err) => {
                warn!(address = %self.address, action, error = %err, "unable to publish lifecycle event");
                false
            }
        }
    }
}

/// Publishes item (project) lifecycle events.
#[derive(Clone)]
pub struct ItemNotifier {
    out: Broadcaster,
    serializer: Serializer,
}

impl std::fmt::Debug for ItemNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ItemNotifier")
            .field("address", &self.out.address)
            .finish_non_exhaustive()
    }
}

impl ItemNotifier {
    /// Publish to `address` using `serializer` for item documents.
    pub fn new(bus: Arc<dyn MessageBus>, address: impl Into<String>, serializer: Serializer) -> Self {
        Self {
            out: Broadcaster {
                bus,
                address: address.into(),
            },
            serializer,
        }
    }

    fn item(&self, project: &Project) -> Value {
        self.serializer.serialize_item(Some(project)).unwrap_or(Value::Null)
    }

    /// Every item has been loaded.
    pub fn on_loaded(&self) -> bool {
        self.out.publish("allLoaded", Vec::new())
    }

    /// An item was created.
    pub fn on_created(&self, item: &Project) -> bool {
        self.out.publish("created", vec![("item", self.item(item))])
    }

    /// An item's configuration changed.
    pub fn on_updated(&self, item: &Project) -> bool {
        self.out.publish("updated", vec![("item", self.item(item))])
    }

    /// `item` was created as a copy of `src`.
    pub fn on_copied(&self, src: &Project, item: &Project) -> bool {
        self.out.publish(
            "copied",
            vec![("src", self.item(src)), ("item", self.item(item))],
        )
    }

    /// An item was renamed.
    pub fn on_renamed(&self, item: &Project, old_name: &str, new_name: &str) -> bool {
        self.out.publish(
            "renamed",
            vec![
                ("item", self.item(item)),
                ("oldName", Value::String(old_name.into())),
                ("newName", Value::String(new_name.into())),
            ],
        )
    }

    /// An item was deleted.
    pub fn on_deleted(&self, item: &Project) -> bool {
        self.out.publish("deleted", vec![("item", self.item(item))])
    }
}

/// Publishes build lifecycle events as `{action, run}`.
#[derive(Clone)]
pub struct RunNotifier {
    out: Broadcaster,
    serializer: Serializer,
}

impl std::fmt::Debug for RunNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunNotifier")
            .field("address", &self.out.address)
            .finish_non_exhaustive()
    }
}

impl RunNotifier {
    /// Publish to `address` using `serializer` for run documents.
    pub fn new(bus: Arc<dyn MessageBus>, address: impl Into<String>, serializer: Serializer) -> Self {
        Self {
            out: Broadcaster {
                bus,
                address: address.into(),
            },
            serializer,
        }
    }

    fn emit(&self, action: &str, run: &Run) -> bool {
        let doc = self.serializer.serialize_run(Some(run)).unwrap_or(Value::Null);
        self.out.publish(action, vec![("run", doc)])
    }

    /// A build started.
    pub fn on_started(&self, run: &Run) -> bool {
        self.emit("started", run)
    }

    /// A build finished running.
    pub fn on_completed(&self, run: &Run) -> bool {
        self.emit("completed", run)
    }

    /// A build's record is complete.
    pub fn on_finalized(&self, run: &Run) -> bool {
        self.emit("finalized", run)
    }

    /// A build was deleted.
    pub fn on_deleted(&self, run: &Run) -> bool {
        self.emit("deleted", run)
    }
}
