use serde_json::{Map, Value};
use std::fmt::Display;

/// JSON reply sent back on the connection a message arrived on.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply(Map<String, Value>);

impl Reply {
    pub fn ok() -> Self {
        let mut map = Map::new();
        map.insert("success".to_string(), Value::Bool(true));
        Reply(map)
    }

    pub fn error(msg: impl Display) -> Self {
        let mut map = Map::new();
        map.insert("success".to_string(), Value::Bool(false));
        map.insert("error".to_string(), Value::String(msg.to_string()));
        Reply(map)
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn with_request_id(self, id: Option<Value>) -> Self {
        match id {
            Some(id) => self.with("requestId", id),
            None => self,
        }
    }

    pub fn is_success(&self) -> bool {
        self.0.get("success").and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    pub fn to_text(&self) -> String {
        Value::Object(self.0.clone()).to_string()
    }
}
