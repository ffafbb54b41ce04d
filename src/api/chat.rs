//! Topic and session calls on the primary backend. Bodies pass through
//! unchanged in both directions.

use crate::http::{ApiError, HttpClient};
use serde_json::Value;
use std::sync::Arc;

pub const HELLO_PATH: &str = "/chat/hello";
pub const CREATE_TOPIC_PATH: &str = "/chat/createTopic";
pub const TOPICS_PATH: &str = "/chat/topics";

#[derive(Clone)]
pub struct ChatApi {
    http: Arc<HttpClient>,
}

impl ChatApi {
    pub fn new(http: Arc<HttpClient>) -> Self {
        Self { http }
    }

    pub async fn say_hello(&self, body: &Value) -> Result<Value, ApiError> {
        self.http.post(HELLO_PATH, body).await
    }

    /// Creates a topic, which also opens a chat session for it.
    pub async fn create_topic(&self, body: &Value) -> Result<Value, ApiError> {
        self.http.post(CREATE_TOPIC_PATH, body).await
    }

    pub async fn list_topics(&self, body: &Value) -> Result<Value, ApiError> {
        self.http.post(TOPICS_PATH, body).await
    }
}
