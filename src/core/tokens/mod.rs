//! OneAPI token, model and quota state.
//!
//! The store keeps a local view of the account's API tokens, its quota and
//! the user's current token/model choice. The server is the source of truth
//! and can change at any time, so every refresh replaces the token list
//! wholesale and then repairs the selection against the new snapshot.
//!
//! Background refresh runs on a cancellable timer owned by the store. Timer
//! ticks do not wait for the previous refresh: overlapping refreshes are
//! allowed and the one that finishes last wins. Stopping the timer does not
//! cancel a refresh already in flight.

#[cfg(test)]
mod tests;

use crate::api::{AccountSelf, ApiToken};
use crate::core::notify::{NoticeLevel, Notifier};
use crate::core::quota::{format_quota, token_quota};
use crate::core::storage::{load_json, save_json, KeyValueStore, TOKEN_STORE_KEY};
use crate::http::ApiError;
use async_trait::async_trait;
use futures_util::future::join;
use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(10 * 60);
pub const TOKEN_REFRESH_FAILED: &str = "Failed to refresh the token list";
pub const QUOTA_REFRESH_FAILED: &str = "Failed to refresh the account quota";

/// The two fetches a refresh needs.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn list_tokens(&self) -> Result<Vec<ApiToken>, ApiError>;
    async fn account_quota(&self) -> Result<AccountSelf, ApiError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccountQuota {
    pub total_quota: i64,
    pub used_quota: i64,
}

impl AccountQuota {
    pub fn remaining(&self) -> i64 {
        self.total_quota.saturating_sub(self.used_quota)
    }
}

impl From<AccountSelf> for AccountQuota {
    fn from(account: AccountSelf) -> Self {
        Self {
            total_quota: account.quota.unwrap_or(0),
            used_quota: account.used_quota.unwrap_or(0),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenState {
    pub tokens: Vec<ApiToken>,
    pub selected_token: Option<ApiToken>,
    pub selected_model: Option<String>,
    pub quota: AccountQuota,
    pub loading: bool,
    pub error: Option<String>,
}

impl TokenState {
    pub fn valid_tokens(&self) -> Vec<ApiToken> {
        self.tokens
            .iter()
            .filter(|token| token.is_enabled())
            .cloned()
            .collect()
    }

    pub fn available_models(&self) -> Vec<String> {
        self.selected_token
            .as_ref()
            .map(|token| token.allowed_models.clone())
            .unwrap_or_default()
    }

    fn select(&mut self, token: ApiToken) {
        if let Some(model) = &self.selected_model {
            if !token.allows_model(model) {
                debug!(%model, token = token.id, "Dropping model not allowed by new token");
                self.selected_model = None;
            }
        }
        self.selected_token = Some(token);
    }

    fn clear_selection(&mut self) {
        self.selected_token = None;
        self.selected_model = None;
    }

    /// Point the selection at the current snapshot of the selected token, or
    /// at the first enabled token when it is gone or no longer enabled.
    fn reconcile_selection(&mut self) {
        let Some(selected_id) = self.selected_token.as_ref().map(|token| token.id) else {
            return;
        };
        let current = self
            .tokens
            .iter()
            .find(|token| token.id == selected_id && token.is_enabled())
            .or_else(|| self.tokens.iter().find(|token| token.is_enabled()))
            .cloned();
        match current {
            Some(token) => {
                if token.id != selected_id {
                    info!(
                        from = selected_id,
                        to = token.id,
                        "Selected token no longer usable, switching"
                    );
                }
                self.select(token);
            }
            None => {
                info!(token = selected_id, "No enabled token left, clearing selection");
                self.clear_selection();
            }
        }
    }

    /// Drop a restored selection that breaks the selection invariants.
    fn sanitize_selection(&mut self) {
        match self.selected_token.clone() {
            Some(token) if token.is_enabled() => self.select(token),
            Some(_) => self.clear_selection(),
            None => self.selected_model = None,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedTokens {
    #[serde(default)]
    token_list: Vec<ApiToken>,
    #[serde(default)]
    selected_token: Option<ApiToken>,
    #[serde(default)]
    selected_model: Option<String>,
}

/// Which halves of a refresh failed. At least one is set.
#[derive(Debug, Default)]
pub struct RefreshError {
    pub tokens: Option<ApiError>,
    pub quota: Option<ApiError>,
}

impl RefreshError {
    fn is_empty(&self) -> bool {
        self.tokens.is_none() && self.quota.is_none()
    }
}

impl fmt::Display for RefreshError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.tokens, &self.quota) {
            (Some(tokens), Some(quota)) => {
                write!(f, "token list: {tokens}; account quota: {quota}")
            }
            (Some(tokens), None) => write!(f, "token list: {tokens}"),
            (None, Some(quota)) => write!(f, "account quota: {quota}"),
            (None, None) => write!(f, "refresh failed"),
        }
    }
}

impl StdError for RefreshError {}

struct RefreshTimer {
    cancel: CancellationToken,
}

/// In-flight refreshes started since the last reset.
#[derive(Debug, Default)]
struct PendingRefreshes {
    generation: u64,
    count: usize,
}

pub struct TokenStore {
    source: Arc<dyn TokenSource>,
    storage: Arc<dyn KeyValueStore>,
    notifier: Arc<dyn Notifier>,
    refresh_interval: Duration,
    state: Mutex<TokenState>,
    pending_refreshes: Mutex<PendingRefreshes>,
    timer: Mutex<Option<RefreshTimer>>,
}

impl TokenStore {
    /// Build the store and restore the persisted token list and selection.
    pub fn new(
        source: Arc<dyn TokenSource>,
        storage: Arc<dyn KeyValueStore>,
        notifier: Arc<dyn Notifier>,
        refresh_interval: Duration,
    ) -> Self {
        let persisted = match load_json::<PersistedTokens>(storage.as_ref(), TOKEN_STORE_KEY) {
            Ok(persisted) => persisted.unwrap_or_default(),
            Err(err) => {
                warn!(error = %err, "Discarding unreadable token snapshot");
                PersistedTokens::default()
            }
        };
        let mut state = TokenState {
            tokens: persisted.token_list,
            selected_token: persisted.selected_token,
            selected_model: persisted.selected_model,
            ..TokenState::default()
        };
        state.sanitize_selection();

        Self {
            source,
            storage,
            notifier,
            refresh_interval,
            state: Mutex::new(state),
            pending_refreshes: Mutex::new(PendingRefreshes::default()),
            timer: Mutex::new(None),
        }
    }

    pub fn snapshot(&self) -> TokenState {
        let mut state = self.lock_state().clone();
        state.loading = self.is_loading();
        state
    }

    pub fn is_loading(&self) -> bool {
        self.lock_pending().count > 0
    }

    pub fn valid_tokens(&self) -> Vec<ApiToken> {
        self.lock_state().valid_tokens()
    }

    pub fn available_models(&self) -> Vec<String> {
        self.lock_state().available_models()
    }

    pub fn selected_token(&self) -> Option<ApiToken> {
        self.lock_state().selected_token.clone()
    }

    pub fn selected_model(&self) -> Option<String> {
        self.lock_state().selected_model.clone()
    }

    pub fn remaining_quota(&self) -> i64 {
        self.lock_state().quota.remaining()
    }

    pub fn formatted_quota(&self) -> String {
        format_quota(self.remaining_quota())
    }

    pub fn token_quota(&self, token: &ApiToken) -> String {
        token_quota(token)
    }

    /// Fetch the token list and the account quota concurrently and fold both
    /// results into the store. Both fetches always run to completion.
    pub async fn refresh(&self) -> Result<(), RefreshError> {
        let _loading = self.begin_refresh();

        let (tokens, quota) = join(self.source.list_tokens(), self.source.account_quota()).await;

        let mut failure = RefreshError::default();
        {
            let mut state = self.lock_state();
            match tokens {
                Ok(tokens) => {
                    debug!(count = tokens.len(), "Token list refreshed");
                    state.tokens = tokens;
                    state.reconcile_selection();
                }
                Err(err) => {
                    warn!(error = %err, "Token list refresh failed");
                    state.error = Some(err.to_string());
                    failure.tokens = Some(err);
                }
            }
            match quota {
                Ok(account) => state.quota = AccountQuota::from(account),
                Err(err) => {
                    warn!(error = %err, "Account quota refresh failed");
                    state.error = Some(err.to_string());
                    failure.quota = Some(err);
                }
            }
            if failure.is_empty() {
                state.error = None;
            }
            self.persist(&state);
        }

        let mut reported = false;
        if failure.tokens.is_some() {
            self.notifier.notify(NoticeLevel::Error, TOKEN_REFRESH_FAILED);
            reported = true;
        }
        if failure.quota.is_some() {
            if reported {
                debug!("Quota failure not reported, token failure already shown");
            } else {
                self.notifier.notify(NoticeLevel::Error, QUOTA_REFRESH_FAILED);
            }
        }

        if failure.is_empty() {
            Ok(())
        } else {
            Err(failure)
        }
    }

    /// Select `token`. Disabled tokens are ignored; returns whether the
    /// selection changed hands to `token`.
    pub fn select_token(&self, token: &ApiToken) -> bool {
        if !token.is_enabled() {
            debug!(
                token = token.id,
                status = %token.status,
                "Ignoring selection of unusable token"
            );
            return false;
        }
        let mut state = self.lock_state();
        state.select(token.clone());
        self.persist(&state);
        true
    }

    pub fn select_token_by_id(&self, id: i64) -> bool {
        let token = self
            .lock_state()
            .tokens
            .iter()
            .find(|token| token.id == id)
            .cloned();
        match token {
            Some(token) => self.select_token(&token),
            None => {
                debug!(token = id, "Ignoring selection of unknown token");
                false
            }
        }
    }

    /// Select `model` on the current token. Ignored when no token is selected
    /// or the token does not allow the model.
    pub fn select_model(&self, model: &str) -> bool {
        let mut state = self.lock_state();
        let allowed = state
            .selected_token
            .as_ref()
            .is_some_and(|token| token.allows_model(model));
        if !allowed {
            debug!(%model, "Ignoring selection of unavailable model");
            return false;
        }
        state.selected_model = Some(model.to_string());
        self.persist(&state);
        true
    }

    /// Load data if there is none, pick a token if none is picked, and start
    /// the periodic refresh. Must run inside a Tokio runtime.
    pub async fn initialize(self: &Arc<Self>) {
        let empty = self.lock_state().tokens.is_empty();
        if empty {
            if let Err(err) = self.refresh().await {
                debug!(error = %err, "Initial refresh incomplete");
            }
        }

        let first_valid = {
            let state = self.lock_state();
            if state.selected_token.is_none() {
                state.tokens.iter().find(|token| token.is_enabled()).cloned()
            } else {
                None
            }
        };
        if let Some(token) = first_valid {
            self.select_token(&token);
        }

        self.start_auto_refresh();
    }

    /// Start the periodic refresh, replacing any running timer.
    pub fn start_auto_refresh(self: &Arc<Self>) {
        let cancel = CancellationToken::new();
        let stopped = cancel.clone();
        let store: Weak<Self> = Arc::downgrade(self);
        let period = self.refresh_interval;

        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = stopped.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(store) = store.upgrade() else { break };
                        debug!("Periodic token refresh");
                        tokio::spawn(async move {
                            if let Err(err) = store.refresh().await {
                                debug!(error = %err, "Periodic refresh incomplete");
                            }
                        });
                    }
                }
            }
        });

        let previous = self.lock_timer().replace(RefreshTimer { cancel });
        if let Some(previous) = previous {
            previous.cancel.cancel();
        }
    }

    pub fn is_auto_refreshing(&self) -> bool {
        self.lock_timer().is_some()
    }

    /// Stop the periodic refresh. Safe to call with no timer running.
    pub fn dispose(&self) {
        if let Some(timer) = self.lock_timer().take() {
            timer.cancel.cancel();
            debug!("Periodic token refresh stopped");
        }
    }

    /// Forget everything, including the persisted snapshot, and stop the timer.
    ///
    /// Refreshes already in flight stop counting as loading but still apply
    /// and persist their result when they finish.
    pub fn reset(&self) {
        self.dispose();
        {
            let mut pending = self.lock_pending();
            pending.generation = pending.generation.wrapping_add(1);
            pending.count = 0;
        }
        *self.lock_state() = TokenState::default();
        if let Err(err) = self.storage.remove(TOKEN_STORE_KEY) {
            warn!(error = %err, "Failed to remove token snapshot");
        }
    }

    fn persist(&self, state: &TokenState) {
        let snapshot = PersistedTokens {
            token_list: state.tokens.clone(),
            selected_token: state.selected_token.clone(),
            selected_model: state.selected_model.clone(),
        };
        if let Err(err) = save_json(self.storage.as_ref(), TOKEN_STORE_KEY, &snapshot) {
            warn!(error = %err, "Failed to persist token snapshot");
        }
    }

    fn begin_refresh(&self) -> PendingRefresh<'_> {
        let mut pending = self.lock_pending();
        pending.count += 1;
        PendingRefresh {
            store: self,
            generation: pending.generation,
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, TokenState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_pending(&self) -> MutexGuard<'_, PendingRefreshes> {
        self.pending_refreshes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_timer(&self) -> MutexGuard<'_, Option<RefreshTimer>> {
        self.timer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for TokenStore {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Counts a refresh as in flight until dropped. A reset in between starts a
/// new generation, after which the guard no longer counts.
struct PendingRefresh<'a> {
    store: &'a TokenStore,
    generation: u64,
}

impl Drop for PendingRefresh<'_> {
    fn drop(&mut self) {
        let mut pending = self.store.lock_pending();
        if pending.generation == self.generation {
            pending.count = pending.count.saturating_sub(1);
        }
    }
}
