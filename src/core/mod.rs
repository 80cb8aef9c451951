//! Admission bridging, bus-facing RPC, and the depth-bounded serializer.

pub mod error;
pub mod document;
pub mod model;
pub mod serializer;
pub mod bus;
pub mod host;
pub mod protocol;
pub mod registry;
pub mod reply;
pub mod dispatcher;
pub mod admission;
pub mod actions;
pub mod lifecycle;

pub use error::{AppResult, BridgeError};
pub use document::{DocumentWriter, SerializeError, ToDocument, TYPE_KEY};
pub use model::{
    Action, Artifact, Cause, CauseAction, CauseOfBlockage, ExternalCause, ParametersAction, Project,
    ProjectRef, QueueItem, QueueItemState, Run, StringParameter, TaskDescriptor,
};
pub use serializer::{error_document, Serializer};
pub use bus::{BusError, HandlerId, Message, MessageBus, MessageHandler, ReplyCallback};
pub use host::HostScheduler;
pub use protocol::{Reply, Status, Verdict};
pub use registry::{ControlHandler, HandlerRegistry};
pub use reply::{reply_slot, PendingOutcome, ReplySlot, ReplyWaiter};
pub use dispatcher::{DispatchJob, DispatchPool, DispatchStats};
pub use admission::AdmissionBridge;
pub use actions::ActionHandler;
pub use lifecycle::{ItemNotifier, RunNotifier};
