//! Wire payloads for the primary chat backend and the OneAPI service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

pub mod chat;
pub mod models;
pub mod oneapi;
pub mod user;

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// User record returned by the primary backend. Only `username` is
/// interpreted; every other field is carried through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub username: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct LoginResponse {
    #[serde(default)]
    pub user: Option<UserProfile>,
    #[serde(default)]
    pub token: Option<String>,
}

/// OneAPI response wrapper: `{ success, data, message }`.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub success: bool,
    #[serde(default = "Option::default")]
    pub data: Option<T>,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum TokenStatus {
    Enabled,
    Disabled,
    Expired,
    Exhausted,
    Unknown(i64),
}

impl From<i64> for TokenStatus {
    fn from(code: i64) -> Self {
        match code {
            1 => TokenStatus::Enabled,
            2 => TokenStatus::Disabled,
            3 => TokenStatus::Expired,
            4 => TokenStatus::Exhausted,
            other => TokenStatus::Unknown(other),
        }
    }
}

impl From<TokenStatus> for i64 {
    fn from(status: TokenStatus) -> Self {
        match status {
            TokenStatus::Enabled => 1,
            TokenStatus::Disabled => 2,
            TokenStatus::Expired => 3,
            TokenStatus::Exhausted => 4,
            TokenStatus::Unknown(code) => code,
        }
    }
}

impl fmt::Display for TokenStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenStatus::Enabled => f.write_str("enabled"),
            TokenStatus::Disabled => f.write_str("disabled"),
            TokenStatus::Expired => f.write_str("expired"),
            TokenStatus::Exhausted => f.write_str("exhausted"),
            TokenStatus::Unknown(code) => write!(f, "unknown ({code})"),
        }
    }
}

fn never_expires() -> i64 {
    -1
}

/// An API key issued by OneAPI, as listed by `GET /api/token/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiToken {
    pub id: i64,
    #[serde(rename = "user_id", default)]
    pub owner_user_id: i64,
    #[serde(rename = "key", default)]
    pub secret_key: String,
    pub status: TokenStatus,
    #[serde(rename = "name", default)]
    pub display_name: String,
    #[serde(rename = "created_time", default)]
    pub created_at: i64,
    #[serde(rename = "accessed_time", default)]
    pub accessed_at: i64,
    /// Unix seconds, `-1` for a key that never expires.
    #[serde(rename = "expired_time", default = "never_expires")]
    pub expires_at: i64,
    #[serde(rename = "remain_quota", default)]
    pub remaining_quota: i64,
    #[serde(default)]
    pub unlimited_quota: bool,
    #[serde(default)]
    pub used_quota: i64,
    #[serde(rename = "models", with = "model_list", default)]
    pub allowed_models: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnet: Option<String>,
}

impl ApiToken {
    pub fn is_enabled(&self) -> bool {
        self.status == TokenStatus::Enabled
    }

    pub fn allows_model(&self, model: &str) -> bool {
        self.allowed_models.iter().any(|allowed| allowed == model)
    }

    pub fn created(&self) -> Option<DateTime<Utc>> {
        timestamp(self.created_at)
    }

    /// `None` when the key never expires.
    pub fn expires(&self) -> Option<DateTime<Utc>> {
        if self.expires_at < 0 {
            None
        } else {
            timestamp(self.expires_at)
        }
    }

    /// The key with everything but its last four characters hidden.
    pub fn masked_key(&self) -> String {
        let chars: Vec<char> = self.secret_key.chars().collect();
        if chars.len() <= 4 {
            return "*".repeat(chars.len());
        }
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("sk-…{tail}")
    }
}

fn timestamp(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
}

/// Split a comma separated model list, dropping blank entries.
pub fn parse_model_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|model| !model.is_empty())
        .map(str::to_string)
        .collect()
}

mod model_list {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(models: &[String], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&models.join(","))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<String>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(super::parse_model_list(raw.as_deref().unwrap_or_default()))
    }
}

/// Account fields from `GET /api/user/self`; quota fields may be absent.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AccountSelf {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub quota: Option<i64>,
    #[serde(default)]
    pub used_quota: Option<i64>,
    #[serde(default)]
    pub request_count: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub created: Option<u64>,
    pub owned_by: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelsResponse {
    #[serde(default)]
    pub data: Vec<ModelInfo>,
}
