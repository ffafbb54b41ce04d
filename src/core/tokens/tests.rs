use super::*;
use crate::api::TokenStatus;
use crate::core::notify::RecordingNotifier;
use crate::core::storage::MemoryStore;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::oneshot;

fn token(id: i64, status: TokenStatus, models: &[&str]) -> ApiToken {
    ApiToken {
        id,
        owner_user_id: 1,
        secret_key: format!("secret-{id}"),
        status,
        display_name: format!("token-{id}"),
        created_at: 1_744_087_884,
        accessed_at: 1_744_087_884,
        expires_at: -1,
        remaining_quota: 500_000,
        unlimited_quota: false,
        used_quota: 0,
        allowed_models: models.iter().map(|m| m.to_string()).collect(),
        subnet: None,
    }
}

fn enabled(id: i64, models: &[&str]) -> ApiToken {
    token(id, TokenStatus::Enabled, models)
}

struct Step {
    result: Result<Vec<ApiToken>, ApiError>,
    gate: Option<oneshot::Receiver<()>>,
}

/// Replays scripted token lists in call order, then keeps answering with
/// `fallback`. Gated steps wait for their sender before answering.
struct FakeSource {
    steps: Mutex<VecDeque<Step>>,
    fallback: Mutex<Vec<ApiToken>>,
    quota: Mutex<Result<AccountSelf, ApiError>>,
    token_calls: AtomicUsize,
}

impl FakeSource {
    fn new() -> Self {
        Self {
            steps: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(Vec::new()),
            quota: Mutex::new(Ok(AccountSelf {
                quota: Some(1_000_000),
                used_quota: Some(250_000),
                ..AccountSelf::default()
            })),
            token_calls: AtomicUsize::new(0),
        }
    }

    fn push(&self, result: Result<Vec<ApiToken>, ApiError>) {
        self.steps
            .lock()
            .unwrap()
            .push_back(Step { result, gate: None });
    }

    fn push_gated(&self, tokens: Vec<ApiToken>) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.steps.lock().unwrap().push_back(Step {
            result: Ok(tokens),
            gate: Some(rx),
        });
        tx
    }

    fn set_fallback(&self, tokens: Vec<ApiToken>) {
        *self.fallback.lock().unwrap() = tokens;
    }

    fn set_quota(&self, quota: Result<AccountSelf, ApiError>) {
        *self.quota.lock().unwrap() = quota;
    }

    fn token_calls(&self) -> usize {
        self.token_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenSource for FakeSource {
    async fn list_tokens(&self) -> Result<Vec<ApiToken>, ApiError> {
        self.token_calls.fetch_add(1, Ordering::SeqCst);
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(Step { result, gate }) => {
                if let Some(gate) = gate {
                    let _ = gate.await;
                }
                result
            }
            None => Ok(self.fallback.lock().unwrap().clone()),
        }
    }

    async fn account_quota(&self) -> Result<AccountSelf, ApiError> {
        self.quota.lock().unwrap().clone()
    }
}

struct Harness {
    store: Arc<TokenStore>,
    source: Arc<FakeSource>,
    storage: Arc<MemoryStore>,
    notifier: Arc<RecordingNotifier>,
}

impl Harness {
    fn new() -> Self {
        Self::with_storage(Arc::new(MemoryStore::new()))
    }

    fn with_storage(storage: Arc<MemoryStore>) -> Self {
        let source = Arc::new(FakeSource::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let store = Arc::new(TokenStore::new(
            source.clone(),
            storage.clone(),
            notifier.clone(),
            Duration::from_secs(60),
        ));
        Self {
            store,
            source,
            storage,
            notifier,
        }
    }

    async fn load(&self, tokens: Vec<ApiToken>) {
        self.source.push(Ok(tokens));
        self.store.refresh().await.expect("refresh should succeed");
    }
}

fn network_error() -> ApiError {
    ApiError::Network("connection refused".to_string())
}

#[tokio::test]
async fn disabled_tokens_cannot_be_selected() {
    let h = Harness::new();
    let disabled = token(2, TokenStatus::Disabled, &["gpt-4o"]);
    h.load(vec![enabled(1, &["gpt-4o"]), disabled.clone()]).await;

    assert!(!h.store.select_token(&disabled));
    assert!(!h.store.select_token_by_id(2));
    assert!(!h.store.select_token_by_id(99));
    assert!(h.store.selected_token().is_none());

    assert!(h.store.select_token_by_id(1));
    assert_eq!(h.store.selected_token().map(|t| t.id), Some(1));
}

#[tokio::test]
async fn model_must_belong_to_selected_token() {
    let h = Harness::new();
    h.load(vec![
        enabled(1, &["gpt-4o", "claude"]),
        enabled(2, &["claude"]),
    ])
    .await;

    assert!(!h.store.select_model("gpt-4o"), "no token selected yet");

    h.store.select_token_by_id(1);
    assert_eq!(h.store.available_models(), vec!["gpt-4o", "claude"]);
    assert!(!h.store.select_model("gpt"));
    assert!(h.store.select_model("gpt-4o"));

    // The new token does not allow the current model.
    h.store.select_token_by_id(2);
    assert!(h.store.selected_model().is_none());

    assert!(h.store.select_model("claude"));
    h.store.select_token_by_id(1);
    assert_eq!(h.store.selected_model().as_deref(), Some("claude"));
}

#[tokio::test]
async fn valid_tokens_follow_each_refresh() {
    let h = Harness::new();
    h.load(vec![
        enabled(1, &[]),
        token(2, TokenStatus::Expired, &[]),
        token(3, TokenStatus::Unknown(9), &[]),
    ])
    .await;
    let ids: Vec<i64> = h.store.valid_tokens().iter().map(|t| t.id).collect();
    assert_eq!(ids, vec![1]);

    h.load(vec![token(1, TokenStatus::Exhausted, &[]), enabled(4, &[])])
        .await;
    let ids: Vec<i64> = h.store.valid_tokens().iter().map(|t| t.id).collect();
    assert_eq!(ids, vec![4]);
}

#[tokio::test]
async fn refresh_switches_away_from_a_disabled_selection() {
    let h = Harness::new();
    h.load(vec![enabled(1, &["a"]), enabled(2, &["a"]), enabled(3, &["b"])])
        .await;
    h.store.select_token_by_id(1);
    h.store.select_model("a");

    h.load(vec![
        token(1, TokenStatus::Disabled, &["a"]),
        enabled(2, &["a"]),
        enabled(3, &["b"]),
    ])
    .await;
    let state = h.store.snapshot();
    assert_eq!(state.selected_token.map(|t| t.id), Some(2));
    assert_eq!(state.selected_model.as_deref(), Some("a"));

    h.load(vec![token(2, TokenStatus::Expired, &["a"]), enabled(3, &["b"])])
        .await;
    let state = h.store.snapshot();
    assert_eq!(state.selected_token.map(|t| t.id), Some(3));
    assert!(state.selected_model.is_none(), "model not allowed by token 3");
}

#[tokio::test]
async fn refresh_moves_selection_when_the_token_is_gone() {
    let h = Harness::new();
    h.load(vec![enabled(1, &["a"]), enabled(2, &["a"])]).await;
    h.store.select_token_by_id(1);
    h.store.select_model("a");

    h.load(vec![token(5, TokenStatus::Disabled, &["a"]), enabled(2, &["a"])])
        .await;

    let state = h.store.snapshot();
    assert_eq!(state.selected_token.map(|t| t.id), Some(2));
    assert_eq!(state.selected_model.as_deref(), Some("a"));
}

#[tokio::test]
async fn refresh_clears_selection_when_the_token_is_gone_and_none_are_enabled() {
    let h = Harness::new();
    h.load(vec![enabled(1, &["a"])]).await;
    h.store.select_token_by_id(1);
    h.store.select_model("a");

    h.load(vec![
        token(5, TokenStatus::Disabled, &["a"]),
        token(6, TokenStatus::Exhausted, &["a"]),
    ])
    .await;

    let state = h.store.snapshot();
    assert!(state.selected_token.is_none());
    assert!(state.selected_model.is_none());
    assert_eq!(state.tokens.len(), 2);
}

#[tokio::test]
async fn refresh_clears_selection_when_nothing_is_enabled() {
    let h = Harness::new();
    h.load(vec![enabled(1, &["a"])]).await;
    h.store.select_token_by_id(1);
    h.store.select_model("a");

    h.load(vec![token(1, TokenStatus::Disabled, &["a"])]).await;

    let state = h.store.snapshot();
    assert!(state.selected_token.is_none());
    assert!(state.selected_model.is_none());
}

#[tokio::test]
async fn refresh_updates_the_selected_snapshot() {
    let h = Harness::new();
    h.load(vec![enabled(1, &["a"])]).await;
    h.store.select_token_by_id(1);

    let mut changed = enabled(1, &["a", "b"]);
    changed.used_quota = 123;
    h.load(vec![changed.clone()]).await;

    assert_eq!(h.store.selected_token(), Some(changed));
    assert_eq!(h.store.available_models(), vec!["a", "b"]);
}

#[tokio::test]
async fn failed_refresh_keeps_stale_data_and_notifies_once() {
    let h = Harness::new();
    h.load(vec![enabled(1, &[])]).await;
    h.store.select_token_by_id(1);

    h.source.push(Err(network_error()));
    h.source.set_quota(Err(network_error()));
    let err = h.store.refresh().await.expect_err("refresh should fail");

    assert!(err.tokens.is_some());
    assert!(err.quota.is_some());
    let state = h.store.snapshot();
    assert_eq!(state.tokens.len(), 1);
    assert_eq!(state.selected_token.map(|t| t.id), Some(1));
    assert!(state.error.is_some());
    assert!(!state.loading);
    assert_eq!(h.notifier.messages(), vec![TOKEN_REFRESH_FAILED.to_string()]);
}

#[tokio::test]
async fn quota_failure_alone_is_reported() {
    let h = Harness::new();
    h.source.set_quota(Err(ApiError::Rejected {
        status: 500,
        message: "boom".to_string(),
    }));
    h.source.push(Ok(vec![enabled(1, &[])]));

    let err = h.store.refresh().await.expect_err("quota should fail");
    assert!(err.tokens.is_none());
    assert_eq!(h.store.valid_tokens().len(), 1);
    assert_eq!(h.notifier.messages(), vec![QUOTA_REFRESH_FAILED.to_string()]);
}

#[tokio::test]
async fn successful_refresh_clears_previous_error() {
    let h = Harness::new();
    h.source.push(Err(network_error()));
    let _ = h.store.refresh().await;
    assert!(h.store.snapshot().error.is_some());

    h.load(vec![enabled(1, &[])]).await;
    assert!(h.store.snapshot().error.is_none());
}

#[tokio::test]
async fn missing_quota_fields_default_to_zero() {
    let h = Harness::new();
    h.source.set_quota(Ok(AccountSelf::default()));
    h.load(Vec::new()).await;

    let state = h.store.snapshot();
    assert_eq!(state.quota, AccountQuota::default());
    assert_eq!(h.store.remaining_quota(), 0);
    assert_eq!(h.store.formatted_quota(), "0");
}

#[tokio::test]
async fn remaining_quota_is_total_minus_used() {
    let h = Harness::new();
    h.load(Vec::new()).await;

    assert_eq!(h.store.remaining_quota(), 750_000);
    assert_eq!(h.store.formatted_quota(), "75W");
}

#[tokio::test]
async fn token_list_and_selection_survive_restart() {
    let h = Harness::new();
    h.load(vec![enabled(1, &["a"]), enabled(2, &["b"])]).await;
    h.store.select_token_by_id(2);
    h.store.select_model("b");

    let restored = Harness::with_storage(h.storage.clone());
    let state = restored.store.snapshot();
    assert_eq!(state.tokens.len(), 2);
    assert_eq!(state.selected_token.map(|t| t.id), Some(2));
    assert_eq!(state.selected_model.as_deref(), Some("b"));
    assert_eq!(state.quota, AccountQuota::default(), "quota is not persisted");
}

#[tokio::test]
async fn restore_drops_an_invalid_selection() {
    let storage = Arc::new(MemoryStore::new());
    let disabled = token(1, TokenStatus::Disabled, &["a"]);
    save_json(
        storage.as_ref(),
        TOKEN_STORE_KEY,
        &json!({
            "tokenList": [disabled.clone()],
            "selectedToken": disabled,
            "selectedModel": "a"
        }),
    )
    .expect("snapshot should save");

    let h = Harness::with_storage(storage);
    let state = h.store.snapshot();
    assert_eq!(state.tokens.len(), 1);
    assert!(state.selected_token.is_none());
    assert!(state.selected_model.is_none());
}

#[tokio::test]
async fn reset_forgets_everything() {
    let h = Harness::new();
    h.load(vec![enabled(1, &["a"])]).await;
    h.store.select_token_by_id(1);
    h.store.start_auto_refresh();
    assert!(h.storage.contains(TOKEN_STORE_KEY));

    h.store.reset();
    h.store.reset();

    assert_eq!(h.store.snapshot(), TokenState::default());
    assert!(!h.store.is_auto_refreshing());
    assert!(!h.storage.contains(TOKEN_STORE_KEY));
}

#[tokio::test]
async fn reset_during_refresh_clears_loading() {
    let h = Harness::new();
    let gate = h.source.push_gated(vec![enabled(1, &[])]);

    let store = h.store.clone();
    let in_flight = tokio::spawn(async move { store.refresh().await });
    while h.source.token_calls() < 1 {
        tokio::task::yield_now().await;
    }
    assert!(h.store.is_loading());

    h.store.reset();
    assert_eq!(h.store.snapshot(), TokenState::default());

    // A refresh started after the reset counts as loading again.
    let late_gate = h.source.push_gated(vec![enabled(2, &[])]);
    let store = h.store.clone();
    let late = tokio::spawn(async move { store.refresh().await });
    while h.source.token_calls() < 2 {
        tokio::task::yield_now().await;
    }
    assert!(h.store.is_loading());

    // The earlier refresh still lands, without touching the new count.
    gate.send(()).expect("gate should be open");
    in_flight.await.expect("task").expect("refresh");
    assert!(h.store.is_loading());
    assert_eq!(h.store.snapshot().tokens[0].id, 1);
    assert!(h.storage.contains(TOKEN_STORE_KEY));

    late_gate.send(()).expect("gate should be open");
    late.await.expect("task").expect("refresh");
    assert!(!h.store.is_loading());
    assert_eq!(h.store.snapshot().tokens[0].id, 2);
}

#[tokio::test]
async fn dispose_is_idempotent() {
    let h = Harness::new();
    h.store.dispose();
    h.store.start_auto_refresh();
    assert!(h.store.is_auto_refreshing());
    h.store.dispose();
    h.store.dispose();
    assert!(!h.store.is_auto_refreshing());
}

#[tokio::test]
async fn initialize_loads_and_selects_first_valid_token() {
    let h = Harness::new();
    h.source.set_fallback(vec![
        token(1, TokenStatus::Disabled, &[]),
        enabled(2, &[]),
        enabled(3, &[]),
    ]);

    h.store.initialize().await;

    assert_eq!(h.source.token_calls(), 1);
    assert_eq!(h.store.selected_token().map(|t| t.id), Some(2));
    assert!(h.store.is_auto_refreshing());
    h.store.dispose();
}

#[tokio::test]
async fn initialize_skips_fetch_when_data_is_present() {
    let storage = Arc::new(MemoryStore::new());
    {
        let h = Harness::with_storage(storage.clone());
        h.load(vec![enabled(1, &[]), enabled(2, &[])]).await;
        h.store.select_token_by_id(2);
    }

    let h = Harness::with_storage(storage);
    h.store.initialize().await;

    assert_eq!(h.source.token_calls(), 0);
    assert_eq!(h.store.selected_token().map(|t| t.id), Some(2));
    h.store.dispose();
}

#[tokio::test]
async fn overlapping_refreshes_keep_the_last_to_finish() {
    let h = Harness::new();
    let first = h.source.push_gated(vec![enabled(1, &[])]);
    let second = h.source.push_gated(vec![enabled(2, &[])]);

    let store = h.store.clone();
    let early = tokio::spawn(async move { store.refresh().await });
    while h.source.token_calls() < 1 {
        tokio::task::yield_now().await;
    }
    let store = h.store.clone();
    let late = tokio::spawn(async move { store.refresh().await });
    while h.source.token_calls() < 2 {
        tokio::task::yield_now().await;
    }
    assert!(h.store.is_loading());

    second.send(()).expect("gate should be open");
    late.await.expect("task").expect("refresh");
    assert!(h.store.is_loading(), "first refresh still in flight");
    assert_eq!(h.store.snapshot().tokens[0].id, 2);

    first.send(()).expect("gate should be open");
    early.await.expect("task").expect("refresh");
    assert!(!h.store.is_loading());
    assert_eq!(h.store.snapshot().tokens[0].id, 1);

    let persisted: PersistedTokens = load_json(h.storage.as_ref(), TOKEN_STORE_KEY)
        .expect("snapshot should load")
        .expect("snapshot should exist");
    assert_eq!(persisted.token_list[0].id, 1);
}

#[tokio::test(start_paused = true)]
async fn timer_refreshes_until_disposed() {
    let h = Harness::new();
    h.store.start_auto_refresh();

    tokio::time::sleep(Duration::from_secs(59)).await;
    assert_eq!(h.source.token_calls(), 0);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(h.source.token_calls(), 1);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(h.source.token_calls(), 2);

    h.store.dispose();
    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(h.source.token_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn restarting_the_timer_replaces_the_old_one() {
    let h = Harness::new();
    h.store.start_auto_refresh();
    h.store.start_auto_refresh();

    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(h.source.token_calls(), 1);
    h.store.dispose();
}
