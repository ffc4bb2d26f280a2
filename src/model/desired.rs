use crate::model::ReplicaId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// DesiredState is what the orchestration source currently wants the managed store to look like.
/// It is re-fetched every time the source's watermark moves.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DesiredState {
    pub memory_limit_bytes: u64,
    pub options: HashMap<String, OptionValue>,
    // Other instances' endpoints. May contain ourselves if the topology source is sloppy.
    pub peers: Vec<PeerEndpoint>,
}

impl DesiredState {
    pub fn option(&self, key: &str) -> Option<&OptionValue> {
        self.options.get(key)
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PeerEndpoint {
    pub id: ReplicaId,
    pub host: String,
    pub port: u16,
}

/// Option values arrive either as JSON strings or JSON integers, depending on who wrote the
/// pod descriptor.
#[derive(Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Integer(i64),
    Text(String),
}

impl OptionValue {
    pub fn as_text(&self) -> String {
        match self {
            OptionValue::Integer(i) => i.to_string(),
            OptionValue::Text(s) => s.clone(),
        }
    }

    /// Returns None if the value is text that doesn't parse as an integer.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            OptionValue::Integer(i) => Some(*i),
            OptionValue::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl fmt::Debug for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Integer(i) => write!(f, "{}", i),
            OptionValue::Text(s) => write!(f, "{:?}", s),
        }
    }
}

impl From<&str> for OptionValue {
    fn from(s: &str) -> Self {
        OptionValue::Text(s.to_string())
    }
}

impl From<i64> for OptionValue {
    fn from(i: i64) -> Self {
        OptionValue::Integer(i)
    }
}
