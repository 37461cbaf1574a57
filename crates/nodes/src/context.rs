//! The result set threaded from node to node during one run.
//!
//! A `Context` is owned by the orchestrator and passed to each executor by
//! value; the executor hands back a new context with (at most) one extra key.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// String-keyed map of JSON values accumulated across a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Context(Map<String, Value>);

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a starting context from a run payload.
    ///
    /// `null` yields an empty context; any other non-object value is rejected.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Null => Some(Self::new()),
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Resolve a path of segments, descending through objects by key and
    /// through arrays by numeric index. An empty path yields `None`.
    pub fn lookup<I, S>(&self, segments: I) -> Option<&Value>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut segments = segments.into_iter();
        let first = segments.next()?;
        let mut current = self.0.get(first.as_ref())?;
        for segment in segments {
            let segment = segment.as_ref();
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Dotted-path convenience over [`Context::lookup`], e.g. `"user.name"`.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        self.lookup(path.split('.'))
    }

    /// Insert a key, returning the value it replaced.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    /// Consume the context and return it with one key set.
    ///
    /// An existing key of the same name is replaced.
    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.insert(key, value);
        self
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for Context {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl From<Context> for Value {
    fn from(ctx: Context) -> Self {
        ctx.into_value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn from_value_accepts_objects_and_null_only() {
        assert_eq!(Context::from_value(Value::Null), Some(Context::new()));
        let ctx = Context::from_value(json!({ "a": 1 })).expect("object");
        assert_eq!(ctx.get("a"), Some(&json!(1)));
        assert!(Context::from_value(json!([1, 2])).is_none());
        assert!(Context::from_value(json!("text")).is_none());
    }

    #[test]
    fn lookup_descends_objects_and_arrays() {
        let ctx = Context::from_value(json!({
            "user": { "name": "Ana", "tags": ["x", "y"] }
        }))
        .unwrap();

        assert_eq!(ctx.get_path("user.name"), Some(&json!("Ana")));
        assert_eq!(ctx.get_path("user.tags.1"), Some(&json!("y")));
        assert_eq!(ctx.get_path("user.tags.9"), None);
        assert_eq!(ctx.get_path("user.name.first"), None);
        assert_eq!(ctx.get_path("missing"), None);
    }

    #[test]
    fn with_replaces_existing_key() {
        let ctx = Context::new()
            .with("resp", json!(1))
            .with("other", json!(true))
            .with("resp", json!(2));

        assert_eq!(ctx.len(), 2);
        assert_eq!(ctx.get("resp"), Some(&json!(2)));
    }

    #[test]
    fn serializes_as_a_plain_object() {
        let ctx = Context::new().with("k", json!("v"));
        assert_eq!(serde_json::to_value(&ctx).unwrap(), json!({ "k": "v" }));
        let back: Context = serde_json::from_value(json!({ "k": "v" })).unwrap();
        assert_eq!(back, ctx);
    }
}
