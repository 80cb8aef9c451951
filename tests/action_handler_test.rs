//! Integration tests for the bus RPC operations
//!
//! Requests go through the in-process bus to the installed handler and the
//! effects are checked on the in-memory host.

use std::sync::Arc;
use std::time::Duration;

use bus_admission::core::{
    ActionHandler, ExternalCause, MessageBus, Project, QueueItem, Serializer, StringParameter,
    TaskDescriptor,
};
use bus_admission::infra::{InMemoryHost, LocalBus};
use serde_json::{json, Value};

const RPC: &str = "scheduler";

struct Fixture {
    bus: Arc<LocalBus>,
    host: Arc<InMemoryHost>,
    handler: ActionHandler,
}

impl Fixture {
    fn new() -> Self {
        let bus = Arc::new(LocalBus::new().unwrap());
        let host = Arc::new(InMemoryHost::new("http://ci.example/"));
        host.add_project(Project::new("app"));
        let handler = ActionHandler::new(bus.clone(), host.clone(), Serializer::default());
        handler.install(RPC);
        Self { bus, host, handler }
    }

    fn call(&self, body: Value) -> Value {
        let (tx, rx) = crossbeam_channel::bounded(1);
        self.bus
            .send(
                RPC,
                body,
                Box::new(move |reply: Value| {
                    let _ = tx.send(reply);
                }),
            )
            .unwrap();
        rx.recv_timeout(Duration::from_secs(5)).unwrap()
    }

    fn shutdown(self) {
        self.handler.close();
        self.bus.close();
    }
}

// ============================================================================
// DISPATCH
// ============================================================================

#[test]
fn test_missing_action() {
    let f = Fixture::new();
    let reply = f.call(json!({ "data": {} }));
    assert_eq!(reply, json!({ "status": "error", "message": "no action provided" }));
    f.shutdown();
}

#[test]
fn test_unknown_action_is_named() {
    let f = Fixture::new();
    let reply = f.call(json!({ "action": "deleteEverything" }));
    assert_eq!(reply["status"], "error");
    assert_eq!(reply["message"], "unknown action deleteEverything");
    f.shutdown();
}

// ============================================================================
// scheduleBuild
// ============================================================================

#[test]
fn test_schedule_build_with_params() {
    let f = Fixture::new();
    let reply = f.call(json!({
        "action": "scheduleBuild",
        "data": { "projectName": "app", "params": { "x": "1" } }
    }));
    assert_eq!(reply, json!({ "status": "ok" }));

    let scheduled = f.host.scheduled();
    assert_eq!(scheduled.len(), 1);
    assert_eq!(scheduled[0].project, "app");
    assert_eq!(scheduled[0].quiet_period, 0);
    assert_eq!(scheduled[0].parameters, vec![StringParameter::new("x", "1")]);
    assert!(scheduled[0].accepted);
    f.shutdown();
}

#[test]
fn test_schedule_build_quiet_period_and_cause() {
    let f = Fixture::new();
    let reply = f.call(json!({
        "action": "scheduleBuild",
        "data": { "projectName": "app", "quietPeriod": 10, "cause": { "who": "deploy-bot" } }
    }));
    assert_eq!(reply["status"], "ok");

    let build = &f.host.scheduled()[0];
    assert_eq!(build.quiet_period, 10);
    assert!(build.parameters.is_empty());
    assert_eq!(build.cause.payload(), Some(&json!({ "who": "deploy-bot" })));
    assert_eq!(build.cause.short_description(), "triggered via event bus");
    // Causes compare equal whatever their payload.
    assert_eq!(build.cause, ExternalCause::new(None));
    f.shutdown();
}

#[test]
fn test_schedule_build_non_string_params_use_json_text() {
    let f = Fixture::new();
    f.call(json!({
        "action": "scheduleBuild",
        "data": { "projectName": "app", "params": { "n": 3 } }
    }));
    assert_eq!(f.host.scheduled()[0].parameters, vec![StringParameter::new("n", "3")]);
    f.shutdown();
}

#[test]
fn test_schedule_build_unknown_project() {
    let f = Fixture::new();
    let reply = f.call(json!({ "action": "scheduleBuild", "data": { "projectName": "nope" } }));
    assert_eq!(reply, json!({ "status": "error", "message": "no such project" }));
    assert!(f.host.scheduled().is_empty());
    f.shutdown();
}

#[test]
fn test_schedule_build_missing_data() {
    let f = Fixture::new();
    let reply = f.call(json!({ "action": "scheduleBuild" }));
    assert_eq!(reply["message"], "missing job data");
    f.shutdown();
}

#[test]
fn test_schedule_build_missing_project_name() {
    let f = Fixture::new();
    let reply = f.call(json!({ "action": "scheduleBuild", "data": {} }));
    assert_eq!(reply["message"], "missing projectName");
    f.shutdown();
}

#[test]
fn test_schedule_build_invalid_quiet_period() {
    let f = Fixture::new();
    let reply = f.call(json!({
        "action": "scheduleBuild",
        "data": { "projectName": "app", "quietPeriod": -5 }
    }));
    assert_eq!(reply["message"], "invalid quietPeriod");
    assert!(f.host.scheduled().is_empty());
    f.shutdown();
}

#[test]
fn test_schedule_build_declined() {
    let f = Fixture::new();
    f.host.set_accepting(false);
    let reply = f.call(json!({ "action": "scheduleBuild", "data": { "projectName": "app" } }));
    assert_eq!(reply, json!({ "status": "error", "message": "failed to schedule" }));
    assert!(!f.host.scheduled()[0].accepted);
    f.shutdown();
}

// ============================================================================
// LISTINGS
// ============================================================================

#[test]
fn test_get_all_items() {
    let f = Fixture::new();
    f.host.add_project(Project::new("lib"));
    let reply = f.call(json!({ "action": "getAllItems" }));
    assert_eq!(reply["status"], "ok");
    let items = reply["result"]["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["name"], "app");
    assert_eq!(items[0]["_class"], "Project");
    f.shutdown();
}

#[test]
fn test_get_queue() {
    let f = Fixture::new();
    f.host.set_queue(vec![
        QueueItem::waiting(1, TaskDescriptor::new("app", "job/app/"), 10, 20),
        QueueItem::buildable(2, TaskDescriptor::new("lib", "job/lib/"), 30, 40),
    ]);
    let reply = f.call(json!({ "action": "getQueue" }));
    let items = reply["result"]["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["_class"], "WaitingItem");
    assert_eq!(items[0]["timestamp"], 20);
    assert_eq!(items[1]["_class"], "BuildableItem");
    assert_eq!(items[1]["buildableStartMilliseconds"], 40);
    f.shutdown();
}

#[test]
fn test_empty_queue() {
    let f = Fixture::new();
    let reply = f.call(json!({ "action": "getQueue" }));
    assert_eq!(reply, json!({ "status": "ok", "result": { "items": [] } }));
    f.shutdown();
}

// ============================================================================
// TEARDOWN
// ============================================================================

#[test]
fn test_close_detaches_every_handler() {
    let f = Fixture::new();
    f.handler.install("scheduler.secondary");
    assert_eq!(f.handler.installed().len(), 2);
    assert_eq!(f.bus.handler_count(RPC), 1);

    f.handler.close();
    assert!(f.handler.installed().is_empty());
    assert_eq!(f.bus.handler_count(RPC), 0);
    assert_eq!(f.bus.handler_count("scheduler.secondary"), 0);
    f.bus.close();
}

#[test]
fn test_process_without_bus() {
    let f = Fixture::new();
    let reply = f.handler.process(&json!({ "action": "getAllItems" }));
    assert!(reply.is_ok());
    f.shutdown();
}
