use crate::api::{Credentials, LoginResponse};
use crate::core::session::AuthBackend;
use crate::http::{ApiError, HttpClient};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

pub const LOGIN_PATH: &str = "/user/login";
pub const REGISTER_PATH: &str = "/user/register";

/// Account endpoints of the primary backend.
#[derive(Clone)]
pub struct UserApi {
    http: Arc<HttpClient>,
}

impl UserApi {
    pub fn new(http: Arc<HttpClient>) -> Self {
        Self { http }
    }

    pub async fn login(&self, credentials: &Credentials) -> Result<LoginResponse, ApiError> {
        self.http.post(LOGIN_PATH, credentials).await
    }

    pub async fn register(&self, credentials: &Credentials) -> Result<Value, ApiError> {
        self.http.post(REGISTER_PATH, credentials).await
    }
}

#[async_trait]
impl AuthBackend for UserApi {
    async fn login(&self, credentials: &Credentials) -> Result<LoginResponse, ApiError> {
        UserApi::login(self, credentials).await
    }

    async fn register(&self, credentials: &Credentials) -> Result<Value, ApiError> {
        UserApi::register(self, credentials).await
    }
}
