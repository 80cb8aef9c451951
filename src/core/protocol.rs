//! Wire shapes shared by every bus operation.
//!
//! Every reply uses the envelope `{status: "ok"|"error", result?, message?}`.
//! Absent fields are omitted rather than written as `null`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::BridgeError;
use super::model::CauseOfBlockage;

/// Request field naming the operation.
pub const ACTION_FIELD: &str = "action";
/// Control request field carrying the decision-service address.
pub const HANDLER_ADDRESS_FIELD: &str = "handlerAddress";

/// Register a decision service.
pub const ACTION_REGISTER: &str = "register";
/// Unregister a decision service.
pub const ACTION_UNREGISTER: &str = "unregister";
/// Admission request sent to the decision service.
pub const ACTION_CAN_RUN: &str = "canRun";
/// Schedule a build.
pub const ACTION_SCHEDULE_BUILD: &str = "scheduleBuild";
/// List every item.
pub const ACTION_GET_ALL_ITEMS: &str = "getAllItems";
/// List the queue.
pub const ACTION_GET_QUEUE: &str = "getQueue";

/// Blockage description used when the decision service gives no reason.
pub const REASON_NOT_SPECIFIED: &str = "reason not specified";

/// Reply status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// The operation succeeded.
    Ok,
    /// The operation failed; `message` says why.
    Error,
}

/// Uniform reply envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    /// Outcome.
    pub status: Status,
    /// Operation result, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Failure description, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Reply {
    /// Success without a result.
    #[must_use]
    pub const fn ok() -> Self {
        Self {
            status: Status::Ok,
            result: None,
            message: None,
        }
    }

    /// Success carrying a result document.
    #[must_use]
    pub const fn ok_with(result: Value) -> Self {
        Self {
            status: Status::Ok,
            result: Some(result),
            message: None,
        }
    }

    /// Failure with a message.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            result: None,
            message: Some(message.into()),
        }
    }

    /// Whether this is a success reply.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }

    /// Render as a bus document.
    #[must_use]
    pub fn to_document(&self) -> Value {
        let mut doc = Map::new();
        let status = match self.status {
            Status::Ok => "ok",
            Status::Error => "error",
        };
        doc.insert("status".into(), Value::String(status.into()));
        if let Some(result) = &self.result {
            doc.insert("result".into(), result.clone());
        }
        if let Some(message) = &self.message {
            doc.insert("message".into(), Value::String(message.clone()));
        }
        Value::Object(doc)
    }
}

impl From<&BridgeError> for Reply {
    fn from(err: &BridgeError) -> Self {
        Self::error(err.to_string())
    }
}

impl From<Result<Self, BridgeError>> for Reply {
    fn from(outcome: Result<Self, BridgeError>) -> Self {
        outcome.unwrap_or_else(|err| Self::from(&err))
    }
}

/// Read the `action` field of a request.
///
/// # Errors
///
/// Returns [`BridgeError::NoAction`] if the field is absent or not a string.
pub fn action_of(body: &Value) -> Result<&str, BridgeError> {
    body.get(ACTION_FIELD)
        .and_then(Value::as_str)
        .ok_or(BridgeError::NoAction)
}

/// Read a required string field.
///
/// # Errors
///
/// Returns [`BridgeError::MissingField`] if the field is absent or not a string.
pub fn required_str<'a>(body: &'a Value, field: &'static str) -> Result<&'a str, BridgeError> {
    body.get(field)
        .and_then(Value::as_str)
        .ok_or(BridgeError::MissingField(field))
}

const fn default_can_run() -> bool {
    true
}

/// Decision returned by the external service for one admission check.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Verdict {
    /// Whether the item may run; defaults to `true`.
    #[serde(rename = "canRun", default = "default_can_run")]
    pub can_run: bool,
    /// Why not.
    #[serde(default)]
    pub reason: Option<String>,
}

impl Default for Verdict {
    fn default() -> Self {
        Self::allow()
    }
}

impl Verdict {
    /// The fail-open verdict.
    #[must_use]
    pub const fn allow() -> Self {
        Self {
            can_run: true,
            reason: None,
        }
    }

    /// Interpret a reply document.
    ///
    /// Replies that do not parse as a verdict resolve to [`Verdict::allow`].
    #[must_use]
    pub fn from_reply(reply: &Value) -> Self {
        match Self::deserialize(reply) {
            Ok(verdict) => verdict,
            Err(err) => {
                tracing::warn!(error = %err, "malformed canRun reply; allowing");
                Self::allow()
            }
        }
    }

    /// Convert into the host's representation: `None` means "may run".
    #[must_use]
    pub fn into_blockage(self) -> Option<CauseOfBlockage> {
        if self.can_run {
            None
        } else {
            Some(CauseOfBlockage::new(
                self.reason.unwrap_or_else(|| REASON_NOT_SPECIFIED.to_string()),
            ))
        }
    }
}
