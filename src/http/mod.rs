//! HTTP client adapter shared by the primary chat backend and OneAPI.
//!
//! Both variants attach a bearer credential, unwrap application-level
//! failures from 2xx bodies, and notify the user at the boundary so callers
//! only need to track their own loading/error flags. They differ in where
//! the credential comes from and in how a 401 is treated.

mod error;

pub use error::ApiError;

use crate::core::notify::{NoticeLevel, Notifier};
use crate::core::storage::{load_json, KeyValueStore};
use crate::router::{Navigator, RouteName};
use crate::utils::url::{construct_api_url, is_login_path};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub const NETWORK_FAILURE_MESSAGE: &str = "Network connection problem, please check your network";
pub const REQUEST_FAILED_MESSAGE: &str = "Request failed, please try again later";
pub const SESSION_EXPIRED_MESSAGE: &str = "Login expired, please log in again";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// The chat backend. A 401 ends the session and redirects to login.
    Primary,
    /// The OneAPI token service. A 401 is an ordinary rejection.
    OneApi,
}

/// Where an adapter gets its bearer token.
pub trait CredentialSource: Send + Sync {
    fn bearer_token(&self) -> Option<String>;

    /// End the session behind this credential.
    ///
    /// Returns `true` only for the call that actually ended a live session,
    /// so a batch of simultaneous 401s is reported once.
    fn revoke(&self) -> bool;
}

/// A bearer token kept under a fixed storage key.
pub struct StoredCredential {
    storage: Arc<dyn KeyValueStore>,
    key: &'static str,
}

impl StoredCredential {
    pub fn new(storage: Arc<dyn KeyValueStore>, key: &'static str) -> Self {
        Self { storage, key }
    }

    pub fn store(&self, token: &str) -> Result<(), crate::core::storage::StorageError> {
        self.storage.set(self.key, Value::String(token.to_string()))
    }
}

impl CredentialSource for StoredCredential {
    fn bearer_token(&self) -> Option<String> {
        match load_json::<String>(self.storage.as_ref(), self.key) {
            Ok(token) => token.filter(|token| !token.is_empty()),
            Err(err) => {
                warn!(key = self.key, error = %err, "Ignoring unreadable stored credential");
                None
            }
        }
    }

    fn revoke(&self) -> bool {
        let present = self.bearer_token().is_some();
        if let Err(err) = self.storage.remove(self.key) {
            warn!(key = self.key, error = %err, "Failed to remove stored credential");
        }
        present
    }
}

pub struct HttpClient {
    client: reqwest::Client,
    base_url: String,
    backend: Backend,
    credentials: Arc<dyn CredentialSource>,
    notifier: Arc<dyn Notifier>,
    navigator: Arc<dyn Navigator>,
}

impl HttpClient {
    pub fn new(
        backend: Backend,
        base_url: &str,
        timeout: Duration,
        credentials: Arc<dyn CredentialSource>,
        notifier: Arc<dyn Notifier>,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ApiError::Request(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.to_string(),
            backend,
            credentials,
            notifier,
            navigator,
        })
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let body = self.send(Method::GET, path, None).await?;
        decode(body)
    }

    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = serde_json::to_value(body).map_err(|err| ApiError::Request(err.to_string()))?;
        let response = self.send(Method::POST, path, Some(&body)).await?;
        decode(response)
    }

    pub async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, ApiError> {
        let url = construct_api_url(&self.base_url, path);
        let mut request = self
            .client
            .request(method.clone(), &url)
            .header(CONTENT_TYPE, "application/json");
        if let Some(token) = self.credentials.bearer_token() {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        debug!(backend = ?self.backend, %method, path, "Sending request");
        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => return Err(self.transport_failure(err)),
        };

        let status = response.status();
        let text = match response.text().await {
            Ok(text) => text,
            Err(err) => return Err(self.transport_failure(err)),
        };
        debug!(backend = ?self.backend, path, status = status.as_u16(), "Received response");

        if status == StatusCode::UNAUTHORIZED && self.backend == Backend::Primary {
            return Err(self.unauthorized(path));
        }

        let parsed = parse_body(&text);
        if !status.is_success() {
            let message = server_message(parsed.as_ref().ok())
                .unwrap_or_else(|| REQUEST_FAILED_MESSAGE.to_string());
            warn!(backend = ?self.backend, path, status = status.as_u16(), %message, "Request rejected");
            self.notifier.notify(NoticeLevel::Error, &message);
            return Err(ApiError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let body = parsed.map_err(|err| ApiError::Decode(err.to_string()))?;
        self.check_envelope(status, body)
    }

    fn check_envelope(&self, status: StatusCode, body: Value) -> Result<Value, ApiError> {
        let failed = match self.backend {
            Backend::Primary => body
                .get("status")
                .and_then(Value::as_u64)
                .is_some_and(|code| code != 200),
            Backend::OneApi => body.get("success").and_then(Value::as_bool) == Some(false),
        };
        if !failed {
            return Ok(body);
        }

        let message =
            server_message(Some(&body)).unwrap_or_else(|| REQUEST_FAILED_MESSAGE.to_string());
        warn!(backend = ?self.backend, %message, "Backend reported failure");
        self.notifier.notify(NoticeLevel::Error, &message);
        Err(ApiError::Rejected {
            status: status.as_u16(),
            message,
        })
    }

    fn transport_failure(&self, err: reqwest::Error) -> ApiError {
        if err.is_builder() {
            return ApiError::Request(err.to_string());
        }
        warn!(backend = ?self.backend, error = %err, "No response from backend");
        self.notifier.notify(NoticeLevel::Error, NETWORK_FAILURE_MESSAGE);
        ApiError::Network(err.to_string())
    }

    fn unauthorized(&self, path: &str) -> ApiError {
        if is_login_path(path) {
            return ApiError::Rejected {
                status: StatusCode::UNAUTHORIZED.as_u16(),
                message: "Invalid username or password".to_string(),
            };
        }
        if self.credentials.revoke() {
            warn!(path, "Session rejected by backend, signing out");
            self.notifier.notify(NoticeLevel::Error, SESSION_EXPIRED_MESSAGE);
            self.navigator.navigate(RouteName::Login);
        } else {
            debug!(path, "401 after session already ended");
        }
        ApiError::Unauthorized
    }
}

fn parse_body(text: &str) -> Result<Value, serde_json::Error> {
    if text.trim().is_empty() {
        Ok(Value::Null)
    } else {
        serde_json::from_str(text)
    }
}

fn server_message(body: Option<&Value>) -> Option<String> {
    let body = body?;
    ["message", "detail"]
        .iter()
        .filter_map(|field| body.get(field).and_then(Value::as_str))
        .map(str::trim)
        .find(|message| !message.is_empty())
        .map(str::to_string)
}

fn decode<T: DeserializeOwned>(body: Value) -> Result<T, ApiError> {
    serde_json::from_value(body).map_err(|err| ApiError::Decode(err.to_string()))
}
