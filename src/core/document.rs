//! Depth-bounded document model for exposing domain objects on the bus.
//!
//! Entities implement [`ToDocument`] and write their fields through a
//! [`DocumentWriter`]. The writer tracks how many more levels of nested
//! objects may still be expanded; once the budget is spent a nested object is
//! replaced by its [`ToDocument::summary`] or left out entirely. A nested
//! object that cannot be written is replaced by an inline error document.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use super::serializer::error_document;

/// Reserved key holding the concrete type name of every emitted object.
pub const TYPE_KEY: &str = "_class";

/// Failure while building a document for an object.
#[derive(Debug, Error)]
pub enum SerializeError {
    /// A field value could not be encoded.
    #[error("unable to encode field `{field}`: {source}")]
    Field {
        /// Name of the offending field.
        field: String,
        /// Underlying encoder error.
        #[source]
        source: serde_json::Error,
    },
    /// The object was reached again through its own descendants.
    #[error("cycle detected at {type_name}")]
    Cycle {
        /// Type that closed the cycle.
        type_name: &'static str,
    },
    /// The object refused to describe itself.
    #[error("{0}")]
    Failed(String),
    /// Writing the object panicked.
    #[error("panicked while writing fields: {0}")]
    Panicked(String),
}

impl SerializeError {
    /// Short, stable label for the failure kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Field { .. } => "field",
            Self::Cycle { .. } => "cycle",
            Self::Failed(_) => "failed",
            Self::Panicked(_) => "panic",
        }
    }
}

/// An entity that can describe itself as a bus document.
pub trait ToDocument {
    /// Concrete type name, written under [`TYPE_KEY`].
    fn type_name(&self) -> &'static str;

    /// Write this object's fields.
    ///
    /// # Errors
    ///
    /// Returns [`SerializeError`] when a field cannot be encoded.
    fn write_fields(&self, out: &mut DocumentWriter<'_>) -> Result<(), SerializeError>;

    /// Compact form used once the depth budget is exhausted.
    ///
    /// `None` means the object is omitted at that depth.
    fn summary(&self) -> Option<Value> {
        None
    }
}

/// Identity of an object on the current traversal path.
type Ancestor = (usize, &'static str);

/// Collects the fields of one object.
pub struct DocumentWriter<'a> {
    fields: Map<String, Value>,
    remaining: usize,
    ancestors: &'a mut Vec<Ancestor>,
}

impl DocumentWriter<'_> {
    /// Levels of nested objects that may still be expanded below this one.
    #[must_use]
    pub const fn remaining_depth(&self) -> usize {
        self.remaining
    }

    /// Write a scalar or plain-data field.
    ///
    /// # Errors
    ///
    /// Returns [`SerializeError::Field`] if the value cannot be encoded, for
    /// example a map with non-string keys.
    pub fn field<T>(&mut self, name: &str, value: &T) -> Result<&mut Self, SerializeError>
    where
        T: Serialize + ?Sized,
    {
        let encoded = serde_json::to_value(value).map_err(|source| SerializeError::Field {
            field: name.to_string(),
            source,
        })?;
        self.fields.insert(name.to_string(), encoded);
        Ok(self)
    }

    /// Insert an already-built document.
    pub fn document(&mut self, name: &str, value: Value) -> &mut Self {
        self.fields.insert(name.to_string(), value);
        self
    }

    /// Write a nested object, pruned by depth.
    ///
    /// `None` is written as `null`. A nested object that fails (including a
    /// cycle back to one of its ancestors) is replaced in place by an error
    /// document, so the enclosing object keeps its other fields.
    ///
    /// # Errors
    ///
    /// Never fails; the `Result` keeps the call chainable with
    /// [`DocumentWriter::field`].
    pub fn object<T>(&mut self, name: &str, value: Option<&T>) -> Result<&mut Self, SerializeError>
    where
        T: ToDocument + ?Sized,
    {
        let Some(value) = value else {
            self.fields.insert(name.to_string(), Value::Null);
            return Ok(self);
        };
        if self.remaining == 0 {
            if let Some(summary) = value.summary() {
                self.fields.insert(name.to_string(), summary);
            }
            return Ok(self);
        }
        let nested = self.child(value);
        self.fields.insert(name.to_string(), nested);
        Ok(self)
    }

    /// Write a sequence of nested objects, pruned by depth.
    ///
    /// Past the depth budget each element is replaced by its summary; the
    /// field is left out when no element has one. A failing element becomes
    /// an error document in its own slot.
    ///
    /// # Errors
    ///
    /// Never fails; see [`DocumentWriter::object`].
    pub fn objects<'v, T, I>(&mut self, name: &str, values: I) -> Result<&mut Self, SerializeError>
    where
        T: ToDocument + ?Sized + 'v,
        I: IntoIterator<Item = &'v T>,
    {
        if self.remaining == 0 {
            let summaries: Vec<Value> = values.into_iter().filter_map(|v| v.summary()).collect();
            if !summaries.is_empty() {
                self.fields.insert(name.to_string(), Value::Array(summaries));
            }
            return Ok(self);
        }
        let out: Vec<Value> = values.into_iter().map(|value| self.child(value)).collect();
        self.fields.insert(name.to_string(), Value::Array(out));
        Ok(self)
    }

    fn child<T>(&mut self, value: &T) -> Value
    where
        T: ToDocument + ?Sized,
    {
        let class = value.type_name();
        let remaining = self.remaining - 1;
        let depth = self.ancestors.len();
        let ancestors = &mut *self.ancestors;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| write_object(value, remaining, ancestors)));
        // A panic skips the pop in write_object.
        self.ancestors.truncate(depth);
        match outcome {
            Ok(Ok(document)) => document,
            Ok(Err(err)) => error_document(class, &err),
            Err(payload) => error_document(class, &SerializeError::Panicked(panic_message(&*payload))),
        }
    }
}

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Write `value` as a tagged object, allowing `remaining` further levels.
///
/// # Errors
///
/// Returns [`SerializeError::Cycle`] if `value` is already on the traversal
/// path, or whatever `write_fields` fails with.
pub(crate) fn write_object<T>(
    value: &T,
    remaining: usize,
    ancestors: &mut Vec<Ancestor>,
) -> Result<Value, SerializeError>
where
    T: ToDocument + ?Sized,
{
    let type_name = value.type_name();
    let identity = (std::ptr::from_ref(value).cast::<()>() as usize, type_name);
    if ancestors.contains(&identity) {
        return Err(SerializeError::Cycle { type_name });
    }

    ancestors.push(identity);
    let mut writer = DocumentWriter {
        fields: Map::new(),
        remaining,
        ancestors: &mut *ancestors,
    };
    let written = value.write_fields(&mut writer);
    let mut fields = writer.fields;
    ancestors.pop();
    written?;

    fields.insert(TYPE_KEY.to_string(), Value::String(type_name.to_string()));
    Ok(Value::Object(fields))
}
