//! Host-side domain objects seen by the bridge.
//!
//! These are read-only snapshots produced by the host scheduler. Every type
//! that travels over the bus implements [`ToDocument`].

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};

use super::document::{DocumentWriter, SerializeError, ToDocument};

/// Description of the work a queue item would run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDescriptor {
    /// Task (project) name.
    pub name: String,
    /// URL relative to the host root.
    pub url: String,
}

impl TaskDescriptor {
    /// Create a task descriptor.
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

impl ToDocument for TaskDescriptor {
    fn type_name(&self) -> &'static str {
        "TaskDescriptor"
    }

    fn write_fields(&self, out: &mut DocumentWriter<'_>) -> Result<(), SerializeError> {
        out.field("name", &self.name)?.field("url", &self.url)?;
        Ok(())
    }

    fn summary(&self) -> Option<Value> {
        Some(json!({ "name": self.name }))
    }
}

/// Metadata attached to a queue item or a build.
pub trait Action: ToDocument + fmt::Debug + Send + Sync {
    /// Build parameters carried by this action, if any.
    fn parameters(&self) -> &[StringParameter] {
        &[]
    }
}

/// A single string-valued build parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringParameter {
    /// Parameter name.
    pub name: String,
    /// Parameter value.
    pub value: String,
}

impl StringParameter {
    /// Create a parameter.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl ToDocument for StringParameter {
    fn type_name(&self) -> &'static str {
        "StringParameterValue"
    }

    fn write_fields(&self, out: &mut DocumentWriter<'_>) -> Result<(), SerializeError> {
        out.field("name", &self.name)?.field("value", &self.value)?;
        Ok(())
    }

    fn summary(&self) -> Option<Value> {
        Some(json!({ "name": self.name, "value": self.value }))
    }
}

/// Action carrying build parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParametersAction {
    parameters: Vec<StringParameter>,
}

impl ParametersAction {
    /// Wrap a parameter list.
    #[must_use]
    pub const fn new(parameters: Vec<StringParameter>) -> Self {
        Self { parameters }
    }
}

impl ToDocument for ParametersAction {
    fn type_name(&self) -> &'static str {
        "ParametersAction"
    }

    fn write_fields(&self, out: &mut DocumentWriter<'_>) -> Result<(), SerializeError> {
        out.objects("parameters", &self.parameters)?;
        Ok(())
    }
}

impl Action for ParametersAction {
    fn parameters(&self) -> &[StringParameter] {
        &self.parameters
    }
}

/// Cause attached to builds triggered over the bus.
///
/// Any two instances compare equal and hash alike, whatever their payload.
/// The host uses cause equality to fold duplicate triggers together, so two
/// externally triggered builds queued at once are treated as one trigger
/// source.
#[derive(Debug, Clone, Default)]
pub struct ExternalCause {
    payload: Option<Value>,
}

impl ExternalCause {
    /// Identifier of this cause type.
    pub const TYPE: &'static str = "event-bus";
    /// Human-readable description shown by the host.
    pub const SHORT_DESCRIPTION: &'static str = "triggered via event bus";

    /// Create a cause with an optional opaque payload.
    #[must_use]
    pub const fn new(payload: Option<Value>) -> Self {
        Self { payload }
    }

    /// Opaque payload supplied by the caller.
    #[must_use]
    pub const fn payload(&self) -> Option<&Value> {
        self.payload.as_ref()
    }

    /// Short description.
    #[must_use]
    pub const fn short_description(&self) -> &'static str {
        Self::SHORT_DESCRIPTION
    }
}

impl PartialEq for ExternalCause {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

impl Eq for ExternalCause {}

impl Hash for ExternalCause {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Self::TYPE.hash(state);
    }
}

/// Why a build was started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cause {
    /// Started by a user.
    User {
        /// User id, absent for anonymous users.
        user_id: Option<String>,
        /// Display name.
        user_name: String,
    },
    /// Started by another build.
    Upstream {
        /// Upstream project name.
        project: String,
        /// Upstream build number.
        build: u64,
    },
    /// Triggered over the bus.
    External(ExternalCause),
}

impl Cause {
    /// Host-facing description of the cause.
    #[must_use]
    pub fn short_description(&self) -> String {
        match self {
            Self::User { user_name, .. } => format!("Started by user {user_name}"),
            Self::Upstream { project, build } => {
                format!("Started by upstream project \"{project}\" build number {build}")
            }
            Self::External(cause) => cause.short_description().to_string(),
        }
    }
}

impl ToDocument for Cause {
    fn type_name(&self) -> &'static str {
        match self {
            Self::User { .. } => "UserIdCause",
            Self::Upstream { .. } => "UpstreamCause",
            Self::External(_) => "ExternalCause",
        }
    }

    fn write_fields(&self, out: &mut DocumentWriter<'_>) -> Result<(), SerializeError> {
        out.field("shortDescription", &self.short_description())?;
        match self {
            Self::User { user_id, user_name } => {
                out.field("userId", user_id)?.field("userName", user_name)?;
            }
            Self::Upstream { project, build } => {
                out.field("upstreamProject", project)?
                    .field("upstreamBuild", build)?;
            }
            Self::External(cause) => {
                out.field("type", ExternalCause::TYPE)?
                    .field("payload", &cause.payload)?;
            }
        }
        Ok(())
    }

    fn summary(&self) -> Option<Value> {
        Some(json!({ "shortDescription": self.short_description() }))
    }
}

/// Action listing the causes of a build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CauseAction {
    causes: Vec<Cause>,
}

impl CauseAction {
    /// Wrap a cause list.
    #[must_use]
    pub const fn new(causes: Vec<Cause>) -> Self {
        Self { causes }
    }

    /// Causes in trigger order.
    #[must_use]
    pub fn causes(&self) -> &[Cause] {
        &self.causes
    }
}

impl ToDocument for CauseAction {
    fn type_name(&self) -> &'static str {
        "CauseAction"
    }

    fn write_fields(&self, out: &mut DocumentWriter<'_>) -> Result<(), SerializeError> {
        out.objects("causes", &self.causes)?;
        Ok(())
    }
}

impl Action for CauseAction {}

/// Where a queue item stands in the host's scheduling lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueItemState {
    /// Not yet eligible; waiting for its quiet period to end.
    Waiting {
        /// When the item becomes eligible (ms since epoch).
        timestamp_ms: u64,
    },
    /// Eligible to run as soon as an executor is free.
    Buildable {
        /// When the item became eligible (ms since epoch).
        buildable_start_ms: u64,
    },
}

/// A unit of work waiting for the host scheduler.
#[derive(Debug, Clone)]
pub struct QueueItem {
    /// Host-assigned identity.
    pub id: u64,
    /// Blocked by the host (e.g. a concurrent build).
    pub blocked: bool,
    /// Eligible to run.
    pub buildable: bool,
    /// Waiting for an unusually long time.
    pub stuck: bool,
    /// Enqueue time (ms since epoch).
    pub in_queue_since_ms: u64,
    /// Rendered build parameters.
    pub params: String,
    /// Host explanation of why the item is still queued.
    pub why: Option<String>,
    /// The work to run.
    pub task: TaskDescriptor,
    /// Attached metadata.
    pub actions: Vec<Arc<dyn Action>>,
    /// Lifecycle state.
    pub state: QueueItemState,
}

impl QueueItem {
    /// Create a waiting item with no actions.
    pub fn waiting(id: u64, task: TaskDescriptor, in_queue_since_ms: u64, timestamp_ms: u64) -> Self {
        Self {
            id,
            blocked: false,
            buildable: false,
            stuck: false,
            in_queue_since_ms,
            params: String::new(),
            why: None,
            task,
            actions: Vec::new(),
            state: QueueItemState::Waiting { timestamp_ms },
        }
    }

    /// Create a buildable item with no actions.
    pub fn buildable(
        id: u64,
        task: TaskDescriptor,
        in_queue_since_ms: u64,
        buildable_start_ms: u64,
    ) -> Self {
        Self {
            buildable: true,
            state: QueueItemState::Buildable { buildable_start_ms },
            ..Self::waiting(id, task, in_queue_since_ms, 0)
        }
    }

    /// Attach an action.
    #[must_use]
    pub fn with_action(mut self, action: Arc<dyn Action>) -> Self {
        self.actions.push(action);
        self
    }

    /// Write the variant-specific timestamp field.
    pub(crate) fn write_state(&self, out: &mut serde_json::Map<String, Value>) {
        match self.state {
            QueueItemState::Waiting { timestamp_ms } => {
                out.insert("timestamp".into(), json!(timestamp_ms));
            }
            QueueItemState::Buildable { buildable_start_ms } => {
                out.insert("buildableStartMilliseconds".into(), json!(buildable_start_ms));
            }
        }
    }
}

impl ToDocument for QueueItem {
    fn type_name(&self) -> &'static str {
        match self.state {
            QueueItemState::Waiting { .. } => "WaitingItem",
            QueueItemState::Buildable { .. } => "BuildableItem",
        }
    }

    fn write_fields(&self, out: &mut DocumentWriter<'_>) -> Result<(), SerializeError> {
        out.field("id", &self.id)?
            .field("blocked", &self.blocked)?
            .field("buildable", &self.buildable)?
            .field("stuck", &self.stuck)?
            .field("inQueueSince", &self.in_queue_since_ms)?
            .field("params", &self.params)?
            .field("why", &self.why)?
            .object("task", Some(&self.task))?
            .objects("actions", self.actions.iter().map(|action| &**action))?;
        match self.state {
            QueueItemState::Waiting { timestamp_ms } => {
                out.field("timestamp", &timestamp_ms)?;
            }
            QueueItemState::Buildable { buildable_start_ms } => {
                out.field("buildableStartMilliseconds", &buildable_start_ms)?;
            }
        }
        Ok(())
    }

    fn summary(&self) -> Option<Value> {
        Some(json!({ "id": self.id, "task": self.task.name }))
    }
}

/// Lightweight reference to a project, as held by its builds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectRef {
    /// Short name.
    pub name: String,
    /// Name including enclosing folders.
    pub full_name: String,
    /// URL relative to the host root.
    pub url: String,
}

impl ToDocument for ProjectRef {
    fn type_name(&self) -> &'static str {
        "Project"
    }

    fn write_fields(&self, out: &mut DocumentWriter<'_>) -> Result<(), SerializeError> {
        out.field("name", &self.name)?
            .field("fullName", &self.full_name)?
            .field("url", &self.url)?;
        Ok(())
    }

    fn summary(&self) -> Option<Value> {
        Some(json!({ "name": self.name, "url": self.url }))
    }
}

/// A file archived by a build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    /// Path shown to users, shortened when unambiguous.
    pub display_path: String,
    /// Bare file name.
    pub file_name: String,
    /// Link relative to the build's artifact root.
    pub href: String,
}

impl Artifact {
    /// Artifact stored at `relative_path` under the build's artifact root.
    pub fn new(relative_path: impl Into<String>) -> Self {
        let href = relative_path.into();
        let file_name = href.rsplit('/').next().unwrap_or_default().to_string();
        Self {
            display_path: file_name.clone(),
            file_name,
            href,
        }
    }
}

/// A build record.
#[derive(Debug, Clone)]
pub struct Run {
    /// Build id.
    pub id: String,
    /// Build number.
    pub number: u64,
    /// Scheduled time (ms since epoch).
    pub timestamp_ms: u64,
    /// Duration in ms, 0 while running.
    pub duration_ms: u64,
    /// Result, absent while running.
    pub result: Option<String>,
    /// Still running.
    pub building: bool,
    /// URL relative to the host root.
    pub url: String,
    /// Owning project.
    pub parent: ProjectRef,
    /// Why the build started.
    pub causes: Vec<Cause>,
    /// Archived files.
    pub artifacts: Vec<Artifact>,
    /// Previous build of the same project.
    pub previous: Option<Arc<Run>>,
    /// Following build of the same project, once there is one.
    pub next: Option<Arc<Run>>,
}

impl Run {
    /// Display name including the project name.
    #[must_use]
    pub fn full_display_name(&self) -> String {
        format!("{} #{}", self.parent.full_name, self.number)
    }

    /// Stable identifier across host restarts.
    #[must_use]
    pub fn externalizable_id(&self) -> String {
        format!("{}#{}", self.parent.full_name, self.number)
    }
}

impl ToDocument for Run {
    fn type_name(&self) -> &'static str {
        "Run"
    }

    fn write_fields(&self, out: &mut DocumentWriter<'_>) -> Result<(), SerializeError> {
        out.field("id", &self.id)?
            .field("number", &self.number)?
            .field("timestamp", &self.timestamp_ms)?
            .field("duration", &self.duration_ms)?
            .field("result", &self.result)?
            .field("building", &self.building)?
            .field("url", &self.url)?
            .field("fullDisplayName", &self.full_display_name())?
            .field("externalizableId", &self.externalizable_id())?
            .object("parent", Some(&self.parent))?
            .objects("causes", &self.causes)?
            .field("artifacts", &self.artifacts)?
            .object("previousBuild", self.previous.as_deref())?
            .object("nextBuild", self.next.as_deref())?;
        Ok(())
    }

    fn summary(&self) -> Option<Value> {
        Some(json!({ "number": self.number, "url": self.url }))
    }
}

/// A project (job) known to the host.
#[derive(Debug, Clone)]
pub struct Project {
    /// Short name.
    pub name: String,
    /// Name including enclosing folders.
    pub full_name: String,
    /// URL relative to the host root.
    pub url: String,
    /// Free-form description.
    pub description: Option<String>,
    /// Whether new builds may be scheduled.
    pub buildable: bool,
    /// Number the next build will get.
    pub next_build_number: u64,
    /// Most recent build.
    pub last_build: Option<Arc<Run>>,
}

impl Project {
    /// Create a top-level buildable project with no builds.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            url: format!("job/{name}/"),
            full_name: name.clone(),
            name,
            description: None,
            buildable: true,
            next_build_number: 1,
            last_build: None,
        }
    }

    /// Reference held by this project's builds.
    #[must_use]
    pub fn to_ref(&self) -> ProjectRef {
        ProjectRef {
            name: self.name.clone(),
            full_name: self.full_name.clone(),
            url: self.url.clone(),
        }
    }
}

impl ToDocument for Project {
    fn type_name(&self) -> &'static str {
        "Project"
    }

    fn write_fields(&self, out: &mut DocumentWriter<'_>) -> Result<(), SerializeError> {
        out.field("name", &self.name)?
            .field("fullName", &self.full_name)?
            .field("url", &self.url)?
            .field("description", &self.description)?
            .field("buildable", &self.buildable)?
            .field("nextBuildNumber", &self.next_build_number)?
            .object("lastBuild", self.last_build.as_deref())?;
        Ok(())
    }

    fn summary(&self) -> Option<Value> {
        Some(json!({ "name": self.name, "url": self.url }))
    }
}

/// Explanation attached to a "cannot run" verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CauseOfBlockage {
    description: String,
}

impl CauseOfBlockage {
    /// Create a blockage with the given description.
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
        }
    }

    /// Short description shown by the host.
    #[must_use]
    pub fn short_description(&self) -> &str {
        &self.description
    }
}

impl fmt::Display for CauseOfBlockage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description)
    }
}
