use std::sync::Arc;

use serde_json::{Map, Value};

/// Process-lifetime configuration handed to every resolver and error hook.
///
/// Cloning is cheap; the value is shared read-only across requests.
#[derive(Debug, Clone, PartialEq)]
pub struct AmbientContext(Arc<Value>);

impl AmbientContext {
    pub fn new(value: Value) -> Self {
        Self(Arc::new(value))
    }

    pub fn value(&self) -> &Value {
        &self.0
    }

    /// Look up a top-level key when the context is an object.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }
}

impl Default for AmbientContext {
    fn default() -> Self {
        Self::new(Value::Object(Map::new()))
    }
}

impl From<Value> for AmbientContext {
    fn from(value: Value) -> Self {
        Self::new(value)
    }
}
