//! Host scheduler boundary.

use std::sync::Arc;

use super::model::{Action, ExternalCause, Project, QueueItem};

/// The scheduler whose admission decisions are bridged to the bus.
///
/// Implementations are handed to the bridge at construction; nothing in this
/// crate reaches for a global host instance.
pub trait HostScheduler: Send + Sync {
    /// Absolute root URL, used to make task URLs absolute.
    fn root_url(&self) -> String;

    /// Look up a project by full name.
    fn find_project(&self, name: &str) -> Option<Arc<Project>>;

    /// Ask the host to schedule a build. Returns `false` if the host declined.
    fn schedule_build(
        &self,
        project: &Project,
        quiet_period: u32,
        cause: ExternalCause,
        actions: Vec<Arc<dyn Action>>,
    ) -> bool;

    /// Every item (project) the host knows about.
    fn items(&self) -> Vec<Arc<Project>>;

    /// Current queue snapshot.
    fn queue(&self) -> Vec<QueueItem>;
}
