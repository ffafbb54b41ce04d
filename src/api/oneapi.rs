use crate::api::models::sort_models;
use crate::api::{AccountSelf, ApiToken, Credentials, Envelope, ModelsResponse};
use crate::core::tokens::TokenSource;
use crate::http::{ApiError, HttpClient, StoredCredential};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

pub const LOGIN_PATH: &str = "/api/user/login";
pub const REGISTER_PATH: &str = "/api/user/register";
pub const TOKENS_PATH: &str = "/api/token/";
pub const SELF_PATH: &str = "/api/user/self";
pub const MODELS_PATH: &str = "/v1/models";

/// Calls against the OneAPI token service.
pub struct OneApi {
    http: Arc<HttpClient>,
    credential: Arc<StoredCredential>,
}

impl OneApi {
    pub fn new(http: Arc<HttpClient>, credential: Arc<StoredCredential>) -> Self {
        Self { http, credential }
    }

    /// Log in to OneAPI. When the account record carries an access token it
    /// becomes the bearer credential for later OneAPI calls.
    pub async fn login(&self, username: &str, password: &str) -> Result<Envelope<Value>, ApiError> {
        let envelope: Envelope<Value> = self
            .http
            .post(LOGIN_PATH, &Credentials::new(username, password))
            .await?;
        let access_token = envelope
            .data
            .as_ref()
            .and_then(|data| data.get("access_token"))
            .and_then(Value::as_str)
            .filter(|token| !token.is_empty());
        if let Some(token) = access_token {
            self.remember_access_token(token);
        }
        Ok(envelope)
    }

    pub async fn register(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Envelope<Value>, ApiError> {
        self.http
            .post(REGISTER_PATH, &Credentials::new(username, password))
            .await
    }

    pub fn remember_access_token(&self, token: &str) {
        match self.credential.store(token) {
            Ok(()) => debug!("Stored OneAPI access token"),
            Err(err) => warn!(error = %err, "Failed to store OneAPI access token"),
        }
    }

    pub async fn list_tokens(&self) -> Result<Vec<ApiToken>, ApiError> {
        let envelope: Envelope<Vec<ApiToken>> = self.http.get(TOKENS_PATH).await?;
        Ok(envelope.data.unwrap_or_default())
    }

    pub async fn account_self(&self) -> Result<AccountSelf, ApiError> {
        let envelope: Envelope<AccountSelf> = self.http.get(SELF_PATH).await?;
        Ok(envelope.data.unwrap_or_default())
    }

    /// The model catalogue, newest first.
    pub async fn list_models(&self) -> Result<ModelsResponse, ApiError> {
        let mut response: ModelsResponse = self.http.get(MODELS_PATH).await?;
        sort_models(&mut response.data);
        Ok(response)
    }
}

#[async_trait]
impl TokenSource for OneApi {
    async fn list_tokens(&self) -> Result<Vec<ApiToken>, ApiError> {
        OneApi::list_tokens(self).await
    }

    async fn account_quota(&self) -> Result<AccountSelf, ApiError> {
        self.account_self().await
    }
}
