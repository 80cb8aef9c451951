//! Generic, depth-bounded serializer.
//!
//! Converts any [`ToDocument`] into a bus document. Serialization never
//! fails from the caller's point of view: errors and panics raised while
//! walking an object are logged and turned into an error document of the
//! shape `{ "error", "message", "class" }`. This matters because the
//! serializer runs inside listener callbacks whose failure would otherwise
//! abort unrelated host processing.

use std::panic::{self, AssertUnwindSafe};

use serde_json::{json, Value};

use super::document::{panic_message, write_object, SerializeError, ToDocument};
use super::model::{Action, Project, QueueItem, Run};

/// Depth-bounded object-to-document converter.
#[derive(Debug, Clone, Copy)]
pub struct Serializer {
    max_depth: usize,
}

impl Default for Serializer {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DEPTH)
    }
}

impl Serializer {
    /// Levels below the root expanded by default.
    pub const DEFAULT_DEPTH: usize = 1;

    /// Create a serializer expanding `max_depth` levels below the root.
    #[must_use]
    pub const fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    /// Configured depth bound.
    #[must_use]
    pub const fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Serialize any object; `None` in, `None` out.
    pub fn serialize<T>(&self, value: Option<&T>) -> Option<Value>
    where
        T: ToDocument + ?Sized,
    {
        value.map(|v| self.serialize_with_depth(v, self.max_depth))
    }

    /// Serialize a project (work item).
    pub fn serialize_item(&self, project: Option<&Project>) -> Option<Value> {
        self.serialize(project)
    }

    /// Serialize a build record.
    pub fn serialize_run(&self, run: Option<&Run>) -> Option<Value> {
        self.serialize(run)
    }

    /// Serialize a queue entry.
    pub fn serialize_queue_item(&self, item: Option<&QueueItem>) -> Option<Value> {
        self.serialize(item)
    }

    /// Serialize an attached action.
    ///
    /// Actions are containers (causes, parameters), so their direct children
    /// are always expanded even when the configured depth is zero.
    pub fn serialize_action(&self, action: Option<&dyn Action>) -> Option<Value> {
        action.map(|a| self.serialize_with_depth(a, self.max_depth.max(1)))
    }

    /// Serialize every element of a sequence independently.
    ///
    /// A failing element yields an error document in its slot; the others are
    /// unaffected.
    pub fn serialize_many<'v, T, I>(&self, values: I) -> Vec<Value>
    where
        T: ToDocument + ?Sized + 'v,
        I: IntoIterator<Item = &'v T>,
    {
        values
            .into_iter()
            .map(|v| self.serialize_with_depth(v, self.max_depth))
            .collect()
    }

    fn serialize_with_depth<T>(&self, value: &T, depth: usize) -> Value
    where
        T: ToDocument + ?Sized,
    {
        let class = value.type_name();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            write_object(value, depth, &mut Vec::new())
        }));
        match outcome {
            Ok(Ok(document)) => document,
            Ok(Err(err)) => error_document(class, &err),
            Err(payload) => error_document(class, &SerializeError::Panicked(panic_message(&*payload))),
        }
    }
}

/// Build the inline document standing in for an object that failed to serialize.
#[must_use]
pub fn error_document(class: &str, err: &SerializeError) -> Value {
    tracing::error!(class = class, kind = err.kind(), error = %err, "error serializing");
    json!({
        "error": err.kind(),
        "message": err.to_string(),
        "class": class,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::document::{DocumentWriter, TYPE_KEY};
    use crate::core::model::{Cause, CauseAction, ProjectRef};
    use std::collections::HashMap;
    use std::sync::Arc;

    struct Exploding;

    impl ToDocument for Exploding {
        fn type_name(&self) -> &'static str {
            "Exploding"
        }

        fn write_fields(&self, _out: &mut DocumentWriter<'_>) -> Result<(), SerializeError> {
            panic!("boom");
        }
    }

    struct BadKeys;

    impl ToDocument for BadKeys {
        fn type_name(&self) -> &'static str {
            "BadKeys"
        }

        fn write_fields(&self, out: &mut DocumentWriter<'_>) -> Result<(), SerializeError> {
            let mut map = HashMap::new();
            map.insert((1, 2), "tuple keys cannot become JSON object keys");
            out.field("lookup", &map)?;
            Ok(())
        }
    }

    fn run(number: u64, previous: Option<Arc<Run>>) -> Run {
        Run {
            id: number.to_string(),
            number,
            timestamp_ms: 1_000,
            duration_ms: 0,
            result: None,
            building: true,
            url: format!("job/foo/{number}/"),
            parent: ProjectRef {
                name: "foo".into(),
                full_name: "foo".into(),
                url: "job/foo/".into(),
            },
            causes: vec![Cause::User {
                user_id: None,
                user_name: "anonymous".into(),
            }],
            artifacts: Vec::new(),
            previous,
            next: None,
        }
    }

    #[test]
    fn test_null_in_null_out() {
        let serializer = Serializer::default();
        assert!(serializer.serialize_run(None).is_none());
        assert!(serializer.serialize_action(None).is_none());
    }

    #[test]
    fn test_depth_one_prunes_grandchildren() {
        let first = Arc::new(run(1, None));
        let second = Arc::new(run(2, Some(Arc::clone(&first))));
        let third = run(3, Some(second));

        let doc = Serializer::default().serialize_run(Some(&third)).unwrap();
        assert_eq!(doc[TYPE_KEY], "Run");
        assert_eq!(doc["previousBuild"]["number"], 2);
        assert_eq!(doc["previousBuild"][TYPE_KEY], "Run");
        // two levels down only the summary survives
        assert_eq!(doc["previousBuild"]["previousBuild"], json!({ "number": 1, "url": "job/foo/1/" }));
    }

    #[test]
    fn test_panicking_object_yields_error_document() {
        let doc = Serializer::default().serialize(Some(&Exploding)).unwrap();
        assert_eq!(doc["error"], "panic");
        assert_eq!(doc["class"], "Exploding");
        assert!(doc["message"].as_str().unwrap().contains("boom"));
    }

    #[test]
    fn test_unencodable_field_yields_error_document() {
        let doc = Serializer::default().serialize(Some(&BadKeys)).unwrap();
        assert_eq!(doc["error"], "field");
        assert_eq!(doc["class"], "BadKeys");
        assert!(doc["message"].as_str().unwrap().contains("lookup"));
    }

    #[test]
    fn test_action_children_always_expanded() {
        let action = CauseAction::new(vec![Cause::User {
            user_id: Some("alice".into()),
            user_name: "Alice".into(),
        }]);
        let doc = Serializer::new(0).serialize_action(Some(&action)).unwrap();
        assert_eq!(doc["causes"][0]["userId"], "alice");
        assert_eq!(doc["causes"][0][TYPE_KEY], "UserIdCause");
    }

    #[test]
    fn test_many_isolates_failures() {
        let values: Vec<Box<dyn ToDocument>> = vec![Box::new(Exploding), Box::new(run(1, None))];
        let docs = Serializer::default().serialize_many(values.iter().map(|v| &**v));
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0]["error"], "panic");
        assert_eq!(docs[1]["number"], 1);
    }
}
