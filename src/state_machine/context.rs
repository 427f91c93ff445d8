//! Per-chat scratch storage carried across transitions.
//!
//! Backed by a `serde_json::Map` so it round-trips through both storage
//! backends unchanged: `snapshot()`/`load()` are the only two places
//! that touch the wire representation.

use serde_json::{Map, Value};

/// Arbitrary JSON-valued state a chat accumulates while moving through
/// the machine, e.g. form answers collected by a wizard. Cleared keys
/// are simply removed rather than set to `Value::Null`, so
/// `context.get("x").is_none()` and "never set" are indistinguishable,
/// matching the original dict-backed context.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Context {
    data: Map<String, Value>,
}

impl Context {
    pub fn new() -> Self {
        Self { data: Map::new() }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.data.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.data.remove(key)
    }

    /// Remove every key in `keys`, ignoring keys that aren't present.
    pub fn clear_keys<'a>(&mut self, keys: impl IntoIterator<Item = &'a str>) {
        for key in keys {
            self.data.remove(key);
        }
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Serialize to the `Value` persisted by storage backends.
    pub fn snapshot(&self) -> Value {
        Value::Object(self.data.clone())
    }

    /// Rebuild a context from a value previously produced by
    /// [`Context::snapshot`]. A missing row (first contact with a
    /// chat) is represented by `Value::Null` and yields an empty
    /// context rather than an error.
    pub fn load(value: Value) -> crate::util::error::Result<Self> {
        match value {
            Value::Null => Ok(Self::new()),
            Value::Object(data) => Ok(Self { data }),
            _ => Err(crate::util::error::StorageErrorKind::MalformedContext.into()),
        }
    }
}
