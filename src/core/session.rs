//! Auth session: who is signed in to the primary backend, with which token.
//!
//! [`SessionState`] is the shared state; the primary HTTP adapter reads the
//! bearer token from it and ends it on a 401, and the router reads the
//! authenticated flag. [`SessionStore`] runs the login/logout actions.

use crate::api::{Credentials, LoginResponse, UserProfile};
use crate::core::storage::{load_json, save_json, KeyValueStore, PRIMARY_TOKEN_KEY, SESSION_KEY};
use crate::http::{ApiError, CredentialSource};
use crate::router::AuthStatus;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::error::Error as StdError;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    pub authenticated: bool,
    pub user: Option<UserProfile>,
    pub token: Option<String>,
    pub loading: bool,
    pub error: Option<String>,
}

/// The part of [`Session`] that survives a restart.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedSession {
    #[serde(default)]
    is_authenticated: bool,
    #[serde(default)]
    user: Option<UserProfile>,
    #[serde(default)]
    token: Option<String>,
}

#[derive(Debug)]
pub enum SessionError {
    Api(ApiError),
    /// The backend answered without a user record.
    MissingUser,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Api(err) => write!(f, "{err}"),
            SessionError::MissingUser => write!(f, "Login response did not include a user"),
        }
    }
}

impl StdError for SessionError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            SessionError::Api(err) => Some(err),
            SessionError::MissingUser => None,
        }
    }
}

impl From<ApiError> for SessionError {
    fn from(err: ApiError) -> Self {
        SessionError::Api(err)
    }
}

#[async_trait]
pub trait AuthBackend: Send + Sync {
    async fn login(&self, credentials: &Credentials) -> Result<LoginResponse, ApiError>;
    async fn register(&self, credentials: &Credentials) -> Result<Value, ApiError>;
}

pub struct SessionState {
    storage: Arc<dyn KeyValueStore>,
    session: Mutex<Session>,
}

impl SessionState {
    /// Rehydrate from storage; unreadable snapshots start an empty session.
    pub fn restore(storage: Arc<dyn KeyValueStore>) -> Self {
        let persisted = match load_json::<PersistedSession>(storage.as_ref(), SESSION_KEY) {
            Ok(persisted) => persisted.unwrap_or_default(),
            Err(err) => {
                warn!(error = %err, "Discarding unreadable session snapshot");
                PersistedSession::default()
            }
        };
        let token = persisted.token.or_else(|| {
            load_json::<String>(storage.as_ref(), PRIMARY_TOKEN_KEY)
                .ok()
                .flatten()
        });

        let session = Session {
            authenticated: persisted.is_authenticated,
            user: persisted.user,
            token,
            loading: false,
            error: None,
        };
        debug!(authenticated = session.authenticated, "Session restored");
        Self {
            storage,
            session: Mutex::new(session),
        }
    }

    pub fn snapshot(&self) -> Session {
        self.lock().clone()
    }

    pub fn token(&self) -> Option<String> {
        self.lock().token.clone()
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.lock().user.clone()
    }

    /// End the session. Returns `true` when a live session was ended.
    pub fn clear(&self) -> bool {
        let was_live = {
            let mut session = self.lock();
            let was_live = session.authenticated || session.token.is_some();
            session.authenticated = false;
            session.user = None;
            session.token = None;
            session.error = None;
            was_live
        };
        if let Err(err) = self.storage.remove(PRIMARY_TOKEN_KEY) {
            warn!(error = %err, "Failed to remove persisted token");
        }
        self.persist();
        was_live
    }

    fn establish(&self, user: UserProfile, token: Option<String>) {
        {
            let mut session = self.lock();
            session.user = Some(user);
            session.token = token.clone();
            session.authenticated = true;
        }
        let stored = match token {
            Some(token) => save_json(self.storage.as_ref(), PRIMARY_TOKEN_KEY, &token),
            None => self.storage.remove(PRIMARY_TOKEN_KEY),
        };
        if let Err(err) = stored {
            warn!(error = %err, "Failed to persist token");
        }
        self.persist();
    }

    fn begin_action(&self) -> LoadingGuard<'_> {
        let mut session = self.lock();
        session.loading = true;
        session.error = None;
        LoadingGuard { state: self }
    }

    fn set_error(&self, message: String) {
        self.lock().error = Some(message);
    }

    fn persist(&self) {
        let snapshot = {
            let session = self.lock();
            PersistedSession {
                is_authenticated: session.authenticated,
                user: session.user.clone(),
                token: session.token.clone(),
            }
        };
        if let Err(err) = save_json(self.storage.as_ref(), SESSION_KEY, &snapshot) {
            warn!(error = %err, "Failed to persist session snapshot");
        }
    }

    fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CredentialSource for SessionState {
    fn bearer_token(&self) -> Option<String> {
        self.token()
    }

    fn revoke(&self) -> bool {
        self.clear()
    }
}

impl AuthStatus for SessionState {
    fn is_authenticated(&self) -> bool {
        self.lock().authenticated
    }
}

/// Clears the loading flag on every exit path.
struct LoadingGuard<'a> {
    state: &'a SessionState,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.state.lock().loading = false;
    }
}

pub struct SessionStore {
    state: Arc<SessionState>,
    backend: Arc<dyn AuthBackend>,
}

impl SessionStore {
    pub fn new(state: Arc<SessionState>, backend: Arc<dyn AuthBackend>) -> Self {
        Self { state, backend }
    }

    pub fn state(&self) -> &Arc<SessionState> {
        &self.state
    }

    pub fn snapshot(&self) -> Session {
        self.state.snapshot()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.is_authenticated()
    }

    /// Sign in and return the username.
    pub async fn login(&self, credentials: &Credentials) -> Result<String, SessionError> {
        let _loading = self.state.begin_action();

        let response = match self.backend.login(credentials).await {
            Ok(response) => response,
            Err(err) => {
                self.state.set_error(err.to_string());
                return Err(err.into());
            }
        };

        match response.user {
            Some(user) => {
                let username = user.username.clone();
                self.state.establish(user, response.token);
                info!(%username, "Signed in");
                Ok(username)
            }
            None => {
                let err = SessionError::MissingUser;
                self.state.set_error(err.to_string());
                Err(err)
            }
        }
    }

    /// Create an account. Does not sign in.
    pub async fn register(&self, credentials: &Credentials) -> Result<Value, SessionError> {
        let _loading = self.state.begin_action();
        match self.backend.register(credentials).await {
            Ok(body) => Ok(body),
            Err(err) => {
                self.state.set_error(err.to_string());
                Err(err.into())
            }
        }
    }

    /// Sign out. Safe to call repeatedly.
    pub fn logout(&self) {
        if self.state.clear() {
            info!("Signed out");
        }
    }
}
