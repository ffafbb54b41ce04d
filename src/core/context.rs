//! Wires the stores, adapters and router together for one process.

use crate::api::chat::ChatApi;
use crate::api::oneapi::OneApi;
use crate::api::user::UserApi;
use crate::core::config::Config;
use crate::core::notify::{ConsoleNotifier, Notifier};
use crate::core::session::{SessionState, SessionStore};
use crate::core::storage::{FileStore, KeyValueStore, ONEAPI_TOKEN_KEY};
use crate::core::tokens::TokenStore;
use crate::core::topic::TopicStore;
use crate::http::{ApiError, Backend, HttpClient, StoredCredential};
use crate::router::Router;
use std::sync::{Arc, Mutex};
use tracing::debug;

pub struct AppContext {
    pub config: Config,
    pub storage: Arc<dyn KeyValueStore>,
    pub notifier: Arc<dyn Notifier>,
    pub router: Arc<Router>,
    pub session: SessionStore,
    pub tokens: Arc<TokenStore>,
    pub topics: Mutex<TopicStore>,
    pub user_api: UserApi,
    pub chat_api: ChatApi,
    pub oneapi: Arc<OneApi>,
}

impl AppContext {
    pub fn new(
        config: Config,
        storage: Arc<dyn KeyValueStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, ApiError> {
        let session_state = Arc::new(SessionState::restore(storage.clone()));
        let router = Arc::new(Router::new(session_state.clone()));

        let primary = Arc::new(HttpClient::new(
            Backend::Primary,
            &config.base_url(),
            config.request_timeout(),
            session_state.clone(),
            notifier.clone(),
            router.clone(),
        )?);
        let oneapi_credential = Arc::new(StoredCredential::new(storage.clone(), ONEAPI_TOKEN_KEY));
        let oneapi_http = Arc::new(HttpClient::new(
            Backend::OneApi,
            &config.oneapi_base_url(),
            config.oneapi_timeout(),
            oneapi_credential.clone(),
            notifier.clone(),
            router.clone(),
        )?);

        let user_api = UserApi::new(primary.clone());
        let chat_api = ChatApi::new(primary);
        let oneapi = Arc::new(OneApi::new(oneapi_http, oneapi_credential));
        let session = SessionStore::new(session_state, Arc::new(user_api.clone()));
        let tokens = Arc::new(TokenStore::new(
            oneapi.clone(),
            storage.clone(),
            notifier.clone(),
            config.refresh_interval(),
        ));

        debug!(
            base_url = %config.base_url(),
            oneapi_base_url = %config.oneapi_base_url(),
            "Application context ready"
        );

        Ok(Self {
            config,
            storage,
            notifier,
            router,
            session,
            tokens,
            topics: Mutex::new(TopicStore::new()),
            user_api,
            chat_api,
            oneapi,
        })
    }

    /// File-backed storage under the configured directory and console notices.
    pub fn from_config(config: Config) -> Result<Self, ApiError> {
        let storage = Arc::new(FileStore::new(config.storage_dir()));
        Self::new(config, storage, Arc::new(ConsoleNotifier))
    }
}
