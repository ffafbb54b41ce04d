//! Chat topics as returned by the primary backend.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::debug;

/// A chat topic. The backend is loose about id types, so numeric ids are
/// kept in their decimal string form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub messages: Vec<Value>,
}

fn id_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(id) => Ok(id),
        Value::Number(id) => Ok(id.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "topic id must be a string or number, got {other}"
        ))),
    }
}

/// Pull topics out of a `/chat/topics` body: either a bare array or an
/// object with a `topics` or `data` array. Entries that don't decode are
/// skipped.
pub fn topics_from_value(body: &Value) -> Vec<Topic> {
    let list = match body {
        Value::Array(items) => Some(items),
        Value::Object(map) => ["topics", "data"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_array)),
        _ => None,
    };
    list.map(|items| {
        items
            .iter()
            .filter_map(|item| match serde_json::from_value::<Topic>(item.clone()) {
                Ok(topic) => Some(topic),
                Err(err) => {
                    debug!(error = %err, "Skipping malformed topic");
                    None
                }
            })
            .collect()
    })
    .unwrap_or_default()
}

/// Pull the created topic out of a `/chat/createTopic` body, either the
/// topic itself or wrapped in `data`.
pub fn topic_from_value(body: &Value) -> Option<Topic> {
    let candidate = body.get("data").filter(|data| data.is_object()).unwrap_or(body);
    serde_json::from_value(candidate.clone()).ok()
}

#[derive(Debug, Default)]
pub struct TopicStore {
    topics: Vec<Topic>,
    current: Option<String>,
}

impl TopicStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn topics(&self) -> &[Topic] {
        &self.topics
    }

    /// Replace the list. The current topic is kept only if it is still listed.
    pub fn set_topics(&mut self, topics: Vec<Topic>) {
        self.topics = topics;
        if let Some(current) = &self.current {
            if !self.topics.iter().any(|topic| &topic.id == current) {
                self.current = None;
            }
        }
    }

    /// Add or replace a single topic.
    pub fn upsert(&mut self, topic: Topic) {
        match self.topics.iter_mut().find(|existing| existing.id == topic.id) {
            Some(existing) => *existing = topic,
            None => self.topics.push(topic),
        }
    }

    pub fn select(&mut self, id: &str) -> bool {
        if self.topics.iter().any(|topic| topic.id == id) {
            self.current = Some(id.to_string());
            true
        } else {
            false
        }
    }

    pub fn current(&self) -> Option<&Topic> {
        let id = self.current.as_ref()?;
        self.topics.iter().find(|topic| &topic.id == id)
    }
}
