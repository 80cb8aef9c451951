//! Named RPC operations served over the bus.
//!
//! `scheduleBuild` asks the host to queue a build; `getAllItems` and
//! `getQueue` return serialized snapshots. Every request gets exactly one
//! reply in the standard envelope.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use tracing::{debug, error, info};

use super::bus::{HandlerId, Message, MessageBus, MessageHandler};
use super::error::BridgeError;
use super::host::HostScheduler;
use super::model::{Action, ExternalCause, ParametersAction, StringParameter};
use super::protocol::{
    action_of, required_str, Reply, ACTION_GET_ALL_ITEMS, ACTION_GET_QUEUE, ACTION_SCHEDULE_BUILD,
};
use super::serializer::Serializer;

/// Stateless request processor; this is what sits on the bus.
struct RpcDispatcher {
    host: Arc<dyn HostScheduler>,
    serializer: Serializer,
}

impl RpcDispatcher {
    fn process(&self, body: &Value) -> Reply {
        let outcome = action_of(body).and_then(|action| match action {
            ACTION_SCHEDULE_BUILD => self.schedule_build(body),
            ACTION_GET_ALL_ITEMS => Ok(self.get_all_items()),
            ACTION_GET_QUEUE => Ok(self.get_queue()),
            other => Err(BridgeError::UnknownAction(other.to_string())),
        });
        if let Err(err) = &outcome {
            error!(error = %err, "bus request failed");
        }
        Reply::from(outcome)
    }

    fn schedule_build(&self, body: &Value) -> Result<Reply, BridgeError> {
        let data = body
            .get("data")
            .filter(|data| data.is_object())
            .ok_or(BridgeError::MissingField("job data"))?;
        let name = required_str(data, "projectName")?;
        let project = self.host.find_project(name).ok_or(BridgeError::NotFound)?;

        let parameters = match data.get("params") {
            None | Some(Value::Null) => None,
            Some(Value::Object(params)) => Some(flatten_params(params)),
            Some(_) => return Err(BridgeError::InvalidField("params")),
        };
        let quiet_period = match data.get("quietPeriod") {
            None | Some(Value::Null) => 0,
            Some(value) => value
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .ok_or(BridgeError::InvalidField("quietPeriod"))?,
        };
        let cause = ExternalCause::new(data.get("cause").filter(|c| !c.is_null()).cloned());

        let actions: Vec<Arc<dyn Action>> = parameters
            .map(|params| vec![Arc::new(ParametersAction::new(params)) as Arc<dyn Action>])
            .unwrap_or_default();

        if self.host.schedule_build(&project, quiet_period, cause, actions) {
            info!(project = %project.full_name, quiet_period, "build scheduled");
            Ok(Reply::ok())
        } else {
            Err(BridgeError::SchedulingFailure)
        }
    }

    fn get_all_items(&self) -> Reply {
        let items = self.host.items();
        let docs = self.serializer.serialize_many(items.iter().map(|item| &**item));
        Reply::ok_with(json!({ "items": docs }))
    }

    fn get_queue(&self) -> Reply {
        let queue = self.host.queue();
        let docs = self.serializer.serialize_many(&queue);
        Reply::ok_with(json!({ "items": docs }))
    }
}

impl MessageHandler for RpcDispatcher {
    fn handle(&self, msg: Message) {
        let reply = self.process(msg.body());
        if !msg.reply(reply.to_document()) {
            debug!("published request has nobody to answer");
        }
    }
}

/// Flatten a `params` object into string parameters.
///
/// Strings are taken verbatim; any other value uses its JSON text.
fn flatten_params(params: &Map<String, Value>) -> Vec<StringParameter> {
    params
        .iter()
        .map(|(name, value)| match value {
            Value::String(s) => StringParameter::new(name.as_str(), s.as_str()),
            other => StringParameter::new(name.as_str(), other.to_string()),
        })
        .collect()
}

/// Serves the RPC address and tracks every handler it installs.
pub struct ActionHandler {
    bus: Arc<dyn MessageBus>,
    dispatcher: Arc<RpcDispatcher>,
    installed: Mutex<Vec<HandlerId>>,
}

impl std::fmt::Debug for ActionHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionHandler")
            .field("installed", &*self.installed.lock())
            .finish_non_exhaustive()
    }
}

impl ActionHandler {
    /// Create a handler; nothing is attached until [`ActionHandler::install`].
    pub fn new(bus: Arc<dyn MessageBus>, host: Arc<dyn HostScheduler>, serializer: Serializer) -> Self {
        Self {
            bus,
            dispatcher: Arc::new(RpcDispatcher { host, serializer }),
            installed: Mutex::new(Vec::new()),
        }
    }

    /// Attach the RPC handler at `address`.
    pub fn install(&self, address: &str) -> HandlerId {
        let handler: Arc<dyn MessageHandler> = self.dispatcher.clone();
        let id = self.bus.register_handler(address, handler);
        info!(address, handler_id = %id, "rpc handler listening");
        self.installed.lock().push(id.clone());
        id
    }

    /// Handlers currently attached.
    #[must_use]
    pub fn installed(&self) -> Vec<HandlerId> {
        self.installed.lock().clone()
    }

    /// Process one request body without going through the bus.
    #[must_use]
    pub fn process(&self, body: &Value) -> Reply {
        self.dispatcher.process(body)
    }

    /// Detach every installed handler.
    pub fn close(&self) {
        let ids: Vec<HandlerId> = self.installed.lock().drain(..).collect();
        for id in ids {
            if !self.bus.unregister_handler(&id) {
                debug!(handler_id = %id, "rpc handler already gone");
            }
        }
    }
}
