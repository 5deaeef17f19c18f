use serde::{Deserialize, Serialize};
use std::fmt;

/// The two queues a training manager shares with remote workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueName {
    Tasks,
    Results,
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueName::Tasks => f.write_str("tasks"),
            QueueName::Results => f.write_str("results"),
        }
    }
}

/// Serializable reference to a shared queue.
///
/// Worker processes receive handles instead of live connections and
/// reconnect to the manager on their own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueHandle {
    pub address: String,
    pub name: QueueName,
}

impl QueueHandle {
    pub fn new(address: impl Into<String>, name: QueueName) -> Self {
        QueueHandle {
            address: address.into(),
            name,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }
}
