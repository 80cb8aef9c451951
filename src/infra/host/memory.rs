//! In-memory host scheduler for development and testing.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::core::{Action, ExternalCause, HostScheduler, Project, QueueItem, StringParameter};
use crate::util::clock::now_ms;

/// One accepted (or declined) `schedule_build` call.
#[derive(Debug, Clone)]
pub struct ScheduledBuild {
    /// Full name of the project.
    pub project: String,
    /// Requested quiet period in seconds.
    pub quiet_period: u32,
    /// Cause attached by the caller.
    pub cause: ExternalCause,
    /// Parameters collected from the attached actions.
    pub parameters: Vec<StringParameter>,
    /// Whether the host accepted the request.
    pub accepted: bool,
    /// When the request arrived (ms since epoch).
    pub requested_at_ms: u64,
}

/// Host holding projects and a queue snapshot in memory.
#[derive(Debug)]
pub struct InMemoryHost {
    root_url: String,
    projects: RwLock<BTreeMap<String, Arc<Project>>>,
    queue: RwLock<Vec<QueueItem>>,
    scheduled: RwLock<Vec<ScheduledBuild>>,
    accepting: AtomicBool,
}

impl Default for InMemoryHost {
    fn default() -> Self {
        Self::new("http://localhost:8080/")
    }
}

impl InMemoryHost {
    /// Create an empty host rooted at `root_url`.
    pub fn new(root_url: impl Into<String>) -> Self {
        Self {
            root_url: root_url.into(),
            projects: RwLock::new(BTreeMap::new()),
            queue: RwLock::new(Vec::new()),
            scheduled: RwLock::new(Vec::new()),
            accepting: AtomicBool::new(true),
        }
    }

    /// Add or replace a project, keyed by full name.
    pub fn add_project(&self, project: Project) -> Arc<Project> {
        let project = Arc::new(project);
        self.projects
            .write()
            .insert(project.full_name.clone(), Arc::clone(&project));
        project
    }

    /// Replace the queue snapshot.
    pub fn set_queue(&self, items: Vec<QueueItem>) {
        *self.queue.write() = items;
    }

    /// Make `schedule_build` accept or decline.
    pub fn set_accepting(&self, accepting: bool) {
        self.accepting.store(accepting, Ordering::Release);
    }

    /// Every `schedule_build` call seen so far.
    #[must_use]
    pub fn scheduled(&self) -> Vec<ScheduledBuild> {
        self.scheduled.read().clone()
    }
}

impl HostScheduler for InMemoryHost {
    fn root_url(&self) -> String {
        self.root_url.clone()
    }

    fn find_project(&self, name: &str) -> Option<Arc<Project>> {
        self.projects.read().get(name).cloned()
    }

    fn schedule_build(
        &self,
        project: &Project,
        quiet_period: u32,
        cause: ExternalCause,
        actions: Vec<Arc<dyn Action>>,
    ) -> bool {
        let accepted = project.buildable && self.accepting.load(Ordering::Acquire);
        let parameters = actions
            .iter()
            .flat_map(|action| action.parameters().iter().cloned())
            .collect();
        self.scheduled.write().push(ScheduledBuild {
            project: project.full_name.clone(),
            quiet_period,
            cause,
            parameters,
            accepted,
            requested_at_ms: now_ms(),
        });
        accepted
    }

    fn items(&self) -> Vec<Arc<Project>> {
        self.projects.read().values().cloned().collect()
    }

    fn queue(&self) -> Vec<QueueItem> {
        self.queue.read().clone()
    }
}
