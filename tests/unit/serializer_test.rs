//! Tests for the depth-bounded serializer

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use bus_admission::core::{
    Action, Cause, CauseAction, DocumentWriter, ExternalCause, Project, ProjectRef, QueueItem, Run,
    SerializeError, Serializer, StringParameter, ParametersAction, TaskDescriptor, ToDocument,
    TYPE_KEY,
};
use serde_json::json;

/// Node that can be made to point at itself.
struct Node {
    name: &'static str,
    next: OnceLock<Arc<Node>>,
}

impl ToDocument for Node {
    fn type_name(&self) -> &'static str {
        "Node"
    }

    fn write_fields(&self, out: &mut DocumentWriter<'_>) -> Result<(), SerializeError> {
        out.field("name", self.name)?
            .object("next", self.next.get().map(|n| &**n))?;
        Ok(())
    }
}

struct Refusing;

impl ToDocument for Refusing {
    fn type_name(&self) -> &'static str {
        "Refusing"
    }

    fn write_fields(&self, _out: &mut DocumentWriter<'_>) -> Result<(), SerializeError> {
        Err(SerializeError::Failed("not today".into()))
    }
}

struct Panicking;

impl ToDocument for Panicking {
    fn type_name(&self) -> &'static str {
        "Panicking"
    }

    fn write_fields(&self, _out: &mut DocumentWriter<'_>) -> Result<(), SerializeError> {
        panic!("cannot describe myself");
    }
}

/// Container with one failing child and a list of mixed children.
struct Folder {
    name: &'static str,
    pinned: Refusing,
    children: Vec<Box<dyn ToDocument>>,
}

impl ToDocument for Folder {
    fn type_name(&self) -> &'static str {
        "Folder"
    }

    fn write_fields(&self, out: &mut DocumentWriter<'_>) -> Result<(), SerializeError> {
        out.field("name", self.name)?
            .object("pinned", Some(&self.pinned))?
            .objects("children", self.children.iter().map(|c| &**c))?;
        Ok(())
    }
}

struct TupleKeys;

impl ToDocument for TupleKeys {
    fn type_name(&self) -> &'static str {
        "TupleKeys"
    }

    fn write_fields(&self, out: &mut DocumentWriter<'_>) -> Result<(), SerializeError> {
        let mut map = HashMap::new();
        map.insert((1, 2), "pair");
        out.field("map", &map)?;
        Ok(())
    }
}

fn run(number: u64, previous: Option<Arc<Run>>) -> Run {
    let project = Project::new("app");
    Run {
        id: format!("id-{number}"),
        number,
        timestamp_ms: 1_000 * number,
        duration_ms: 0,
        result: None,
        building: true,
        url: format!("job/app/{number}/"),
        parent: project.to_ref(),
        causes: vec![Cause::External(ExternalCause::new(Some(json!({ "who": "ci" }))))],
        artifacts: Vec::new(),
        previous,
        next: None,
    }
}

#[test]
fn test_null_in_null_out() {
    assert!(Serializer::default().serialize_item(None).is_none());
    assert!(Serializer::default().serialize_run(None).is_none());
}

#[test]
fn test_self_reference_is_reported_where_it_closes() {
    let node = Arc::new(Node {
        name: "loop",
        next: OnceLock::new(),
    });
    let _ = node.next.set(Arc::clone(&node));

    let doc = Serializer::new(4).serialize(Some(&*node)).unwrap();
    assert_eq!(doc[TYPE_KEY], "Node");
    assert_eq!(doc["name"], "loop");
    assert_eq!(doc["next"]["error"], "cycle");
    assert_eq!(doc["next"]["class"], "Node");
    assert!(doc["next"]["message"].as_str().unwrap().contains("Node"));
}

#[test]
fn test_failing_children_keep_parent_fields() {
    let folder = Folder {
        name: "tools",
        pinned: Refusing,
        children: vec![Box::new(Panicking), Box::new(Project::new("app"))],
    };

    let doc = Serializer::default().serialize(Some(&folder)).unwrap();
    assert_eq!(doc[TYPE_KEY], "Folder");
    assert_eq!(doc["name"], "tools");
    assert_eq!(
        doc["pinned"],
        json!({ "error": "failed", "message": "not today", "class": "Refusing" })
    );
    assert_eq!(doc["children"][0]["error"], "panic");
    assert_eq!(doc["children"][0]["class"], "Panicking");
    assert_eq!(doc["children"][1]["name"], "app");
}

#[test]
fn test_nested_panic_does_not_poison_later_siblings() {
    let folder = Folder {
        name: "outer",
        pinned: Refusing,
        children: vec![
            Box::new(Panicking),
            Box::new(Folder {
                name: "inner",
                pinned: Refusing,
                children: Vec::new(),
            }),
        ],
    };

    // The inner folder is only reachable after the panic unwound; it must
    // not be mistaken for part of a cycle.
    let doc = Serializer::new(2).serialize(Some(&folder)).unwrap();
    assert_eq!(doc["children"][1]["name"], "inner");
    assert_eq!(doc["children"][1]["pinned"]["class"], "Refusing");
}

#[test]
fn test_distinct_nodes_are_not_a_cycle() {
    let tail = Arc::new(Node {
        name: "tail",
        next: OnceLock::new(),
    });
    let head = Node {
        name: "head",
        next: OnceLock::new(),
    };
    let _ = head.next.set(tail);
    let doc = Serializer::new(2).serialize(Some(&head)).unwrap();
    assert_eq!(doc["next"]["name"], "tail");
    assert_eq!(doc["next"]["next"], serde_json::Value::Null);
}

#[test]
fn test_failing_object_becomes_error_document() {
    let doc = Serializer::default().serialize(Some(&Refusing)).unwrap();
    assert_eq!(doc, json!({ "error": "failed", "message": "not today", "class": "Refusing" }));
}

#[test]
fn test_unencodable_field_becomes_error_document() {
    let doc = Serializer::default().serialize(Some(&TupleKeys)).unwrap();
    assert_eq!(doc["error"], "field");
    assert_eq!(doc["class"], "TupleKeys");
}

#[test]
fn test_many_isolates_failures() {
    let values: Vec<&dyn ToDocument> = vec![&Refusing, &TupleKeys];
    let docs = Serializer::default().serialize_many(values);
    assert_eq!(docs.len(), 2);
    assert_eq!(docs[0]["class"], "Refusing");
    assert_eq!(docs[1]["class"], "TupleKeys");
}

#[test]
fn test_run_depth_pruning() {
    let first = Arc::new(run(1, None));
    let second = run(2, Some(first));

    let doc = Serializer::default().serialize_run(Some(&second)).unwrap();
    assert_eq!(doc[TYPE_KEY], "Run");
    assert_eq!(doc["fullDisplayName"], "app #2");
    // Depth 1: the previous build is expanded, its own children summarised.
    assert_eq!(doc["previousBuild"][TYPE_KEY], "Run");
    assert_eq!(doc["previousBuild"]["parent"], json!({ "name": "app", "url": "job/app/" }));
    assert_eq!(doc["causes"][0]["shortDescription"], "triggered via event bus");

    let shallow = Serializer::new(0).serialize_run(Some(&second)).unwrap();
    assert_eq!(shallow["previousBuild"], json!({ "number": 1, "url": "job/app/1/" }));
}

#[test]
fn test_project_document() {
    let mut project = Project::new("app");
    project.description = Some("the app".into());
    let doc = Serializer::default().serialize_item(Some(&project)).unwrap();
    assert_eq!(doc[TYPE_KEY], "Project");
    assert_eq!(doc["fullName"], "app");
    assert_eq!(doc["lastBuild"], serde_json::Value::Null);
}

#[test]
fn test_queue_item_document() {
    let item = QueueItem::buildable(3, TaskDescriptor::new("app", "job/app/"), 10, 20)
        .with_action(Arc::new(ParametersAction::new(vec![StringParameter::new("x", "1")])));
    let doc = Serializer::default().serialize_queue_item(Some(&item)).unwrap();
    assert_eq!(doc[TYPE_KEY], "BuildableItem");
    assert_eq!(doc["buildableStartMilliseconds"], 20);
    assert_eq!(doc["task"]["name"], "app");
    assert_eq!(doc["actions"][0][TYPE_KEY], "ParametersAction");
}

#[test]
fn test_action_children_always_expanded() {
    let action = CauseAction::new(vec![Cause::User {
        user_id: Some("alice".into()),
        user_name: "Alice".into(),
    }]);
    let doc = Serializer::new(0).serialize_action(Some(&action as &dyn Action)).unwrap();
    assert_eq!(doc[TYPE_KEY], "CauseAction");
    assert!(doc["causes"][0].get(TYPE_KEY).is_some());
}

#[test]
fn test_project_ref_document() {
    let doc = Serializer::default()
        .serialize(Some(&ProjectRef {
            name: "app".into(),
            full_name: "folder/app".into(),
            url: "job/folder/job/app/".into(),
        }))
        .unwrap();
    assert_eq!(doc["fullName"], "folder/app");
}
