//! Command descriptors and the shapes an effect script can suspend on.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A named, opaque instruction emitted by an effect script.
///
/// Only `name` is meaningful to the interpreter; it selects the resolver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    name: String,
    payload: Value,
}

impl Command {
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn into_parts(self) -> (String, Value) {
        (self.name, self.payload)
    }
}

/// What a script suspends on: one command or a composite group.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Single(Command),
    /// Resolved concurrently, resumed as a sequence in the same order.
    Sequence(Vec<Command>),
    /// Resolved concurrently, resumed as a mapping with the same keys.
    Mapping(IndexMap<String, Command>),
}

impl Effect {
    pub fn kind(&self) -> &'static str {
        match self {
            Effect::Single(_) => "single",
            Effect::Sequence(_) => "sequence",
            Effect::Mapping(_) => "mapping",
        }
    }

    /// Number of commands carried.
    pub fn len(&self) -> usize {
        match self {
            Effect::Single(_) => 1,
            Effect::Sequence(cmds) => cmds.len(),
            Effect::Mapping(cmds) => cmds.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Command> for Effect {
    fn from(cmd: Command) -> Self {
        Effect::Single(cmd)
    }
}

impl From<Vec<Command>> for Effect {
    fn from(cmds: Vec<Command>) -> Self {
        Effect::Sequence(cmds)
    }
}

impl From<IndexMap<String, Command>> for Effect {
    fn from(cmds: IndexMap<String, Command>) -> Self {
        Effect::Mapping(cmds)
    }
}

/// The value a script resumes with. Mirrors the shape of the `Effect`.
#[derive(Debug, Clone, PartialEq)]
pub enum Resumed {
    Single(Value),
    Sequence(Vec<Value>),
    Mapping(IndexMap<String, Value>),
}

impl Resumed {
    pub fn kind(&self) -> &'static str {
        match self {
            Resumed::Single(_) => "single",
            Resumed::Sequence(_) => "sequence",
            Resumed::Mapping(_) => "mapping",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn command_serializes_as_name_and_payload() {
        let cmd = Command::new("echo", json!("foo"));
        assert_eq!(
            serde_json::to_value(&cmd).unwrap(),
            json!({ "name": "echo", "payload": "foo" })
        );
    }

    #[test]
    fn effect_reports_kind_and_len() {
        let single: Effect = Command::new("echo", json!(1)).into();
        assert_eq!((single.kind(), single.len()), ("single", 1));

        let seq: Effect = vec![Command::new("a", json!(null)), Command::new("b", json!(null))].into();
        assert_eq!((seq.kind(), seq.len()), ("sequence", 2));

        let map: Effect = IndexMap::<String, Command>::new().into();
        assert!(map.is_empty());
    }
}
