//! Token lifecycle manager tests against a scripted token backend.
//!
//! All tests run on tokio's paused clock, so hour-long waits complete
//! instantly while `Instant` still reports the virtual time elapsed.

use async_trait::async_trait;
use keeper_common::RetryConfig;
use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use vault_keeper::{
    ErrorKind, LifecycleState, RenewalIncrement, RenewalPolicy, Termination, TokenAuth,
    TokenInfo, TokenLifecycleManager, VaultError, VaultResult,
};

const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, Copy)]
struct RenewCall {
    at: Instant,
    increment: Option<Duration>,
}

/// Token backend replaying scripted responses.
///
/// Once the renewal script runs out, further renewals hang until cancelled.
#[derive(Clone, Default)]
struct ScriptedAuth {
    lookup: Arc<Mutex<Option<VaultResult<TokenInfo>>>>,
    renewals: Arc<Mutex<VecDeque<VaultResult<TokenInfo>>>>,
    calls: Arc<Mutex<Vec<RenewCall>>>,
    lookups: Arc<AtomicUsize>,
}

impl ScriptedAuth {
    fn new(lookup: VaultResult<TokenInfo>) -> Self {
        let auth = Self::default();
        *auth.lookup.lock().unwrap() = Some(lookup);
        auth
    }

    fn then_renew(self, response: VaultResult<TokenInfo>) -> Self {
        self.renewals.lock().unwrap().push_back(response);
        self
    }

    fn calls(&self) -> Vec<RenewCall> {
        self.calls.lock().unwrap().clone()
    }

    fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenAuth for ScriptedAuth {
    async fn lookup_self(&self) -> VaultResult<TokenInfo> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.lookup
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| Err(VaultError::auth_failed("lookup called twice")))
    }

    async fn renew_self(&self, increment: Option<Duration>) -> VaultResult<TokenInfo> {
        self.calls.lock().unwrap().push(RenewCall {
            at: Instant::now(),
            increment,
        });
        let next = self.renewals.lock().unwrap().pop_front();
        match next {
            Some(response) => response,
            None => std::future::pending().await,
        }
    }
}

fn manager(auth: &ScriptedAuth) -> TokenLifecycleManager<ScriptedAuth> {
    TokenLifecycleManager::new(auth.clone(), RenewalPolicy::default())
}

fn assert_near(actual: Duration, expected: Duration) {
    assert!(
        actual >= expected && actual < expected + Duration::from_secs(1),
        "expected ~{expected:?}, got {actual:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn test_non_renewable_token_stops_without_timer() {
    let auth = ScriptedAuth::new(Ok(TokenInfo::non_renewable(Duration::ZERO)));
    let start = Instant::now();

    let result = manager(&auth).run(CancellationToken::new()).await;

    assert_eq!(result.unwrap(), Termination::NotRenewable);
    assert!(auth.calls().is_empty());
    assert_eq!(start.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_renewable_token_without_ttl_needs_no_renewal() {
    let auth = ScriptedAuth::new(Ok(TokenInfo::renewable(Duration::ZERO)));

    let result = manager(&auth).run(CancellationToken::new()).await;

    assert_eq!(result.unwrap(), Termination::NotRenewable);
    assert!(auth.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_lookup_rejection_is_returned_immediately() {
    let auth = ScriptedAuth::new(Err(VaultError::auth_failed(
        "auth/token/lookup-self: permission denied",
    )));
    let start = Instant::now();

    let err = manager(&auth).run(CancellationToken::new()).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Authentication);
    assert_eq!(auth.lookups(), 1);
    assert!(auth.calls().is_empty());
    assert_eq!(start.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_short_ttl_renews_at_midpoint_with_full_increment() {
    let auth = ScriptedAuth::new(Ok(TokenInfo::renewable(30 * MINUTE)))
        .then_renew(Ok(TokenInfo::renewable(30 * MINUTE)));
    let cancel = CancellationToken::new();
    let start = Instant::now();

    let task = manager(&auth).spawn(cancel.clone());
    sleep(16 * MINUTE).await;

    let calls = auth.calls();
    assert_eq!(calls.len(), 1);
    assert_near(calls[0].at - start, 15 * MINUTE);
    assert_eq!(calls[0].increment, Some(30 * MINUTE));

    cancel.cancel();
    assert_eq!(task.await.unwrap().unwrap(), Termination::Cancelled);
    assert_eq!(auth.lookups(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_long_ttl_wait_is_capped_at_one_hour() {
    let auth = ScriptedAuth::new(Ok(TokenInfo::renewable(3 * HOUR)))
        .then_renew(Ok(TokenInfo::renewable(3 * HOUR)));
    let cancel = CancellationToken::new();
    let start = Instant::now();

    let task = manager(&auth).spawn(cancel.clone());
    sleep(HOUR + MINUTE).await;

    let calls = auth.calls();
    assert_eq!(calls.len(), 1, "renewal should happen at 1h, not 90m");
    assert_near(calls[0].at - start, HOUR);
    assert_eq!(calls[0].increment, Some(3 * HOUR));

    cancel.cancel();
    assert_eq!(task.await.unwrap().unwrap(), Termination::Cancelled);
}

#[tokio::test(start_paused = true)]
async fn test_loop_keeps_renewing_from_renewal_response() {
    let auth = ScriptedAuth::new(Ok(TokenInfo::renewable(20 * MINUTE)))
        .then_renew(Ok(TokenInfo::renewable(40 * MINUTE)))
        .then_renew(Ok(TokenInfo::renewable(40 * MINUTE)));
    let cancel = CancellationToken::new();
    let start = Instant::now();

    let task = manager(&auth).spawn(cancel.clone());
    sleep(31 * MINUTE).await;

    let calls = auth.calls();
    assert_eq!(calls.len(), 2);
    assert_near(calls[0].at - start, 10 * MINUTE);
    assert_near(calls[1].at - start, 30 * MINUTE);
    assert_eq!(calls[1].increment, Some(40 * MINUTE));

    cancel.cancel();
    assert_eq!(task.await.unwrap().unwrap(), Termination::Cancelled);
    assert_eq!(auth.lookups(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_half_ttl_increment_policy() {
    let auth = ScriptedAuth::new(Ok(TokenInfo::renewable(30 * MINUTE)))
        .then_renew(Ok(TokenInfo::renewable(15 * MINUTE)));
    let cancel = CancellationToken::new();
    let policy = RenewalPolicy::default().with_increment(RenewalIncrement::HalfTtl);

    let task = TokenLifecycleManager::new(auth.clone(), policy).spawn(cancel.clone());
    sleep(16 * MINUTE).await;

    assert_eq!(auth.calls()[0].increment, Some(15 * MINUTE));

    cancel.cancel();
    task.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_zero_policy_still_waits_between_renewals() {
    let auth = ScriptedAuth::new(Ok(TokenInfo::renewable(2 * HOUR)))
        .then_renew(Ok(TokenInfo::renewable(2 * HOUR)))
        .then_renew(Ok(TokenInfo::renewable(2 * HOUR)));
    let cancel = CancellationToken::new();
    let policy = RenewalPolicy::new(Duration::ZERO, Duration::ZERO);
    let start = Instant::now();

    let task = TokenLifecycleManager::new(auth.clone(), policy).spawn(cancel.clone());
    sleep(Duration::from_millis(2500)).await;

    let calls = auth.calls();
    assert_eq!(calls.len(), 2);
    assert_near(calls[0].at - start, Duration::from_secs(1));
    assert_near(calls[1].at - calls[0].at, Duration::from_secs(1));

    cancel.cancel();
    assert_eq!(task.await.unwrap().unwrap(), Termination::Cancelled);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_before_timer_fires() {
    let auth = ScriptedAuth::new(Ok(TokenInfo::renewable(2 * HOUR)));
    let cancel = CancellationToken::new();

    let task = manager(&auth).spawn(cancel.clone());
    sleep(10 * MINUTE).await;

    let cancelled_at = Instant::now();
    cancel.cancel();

    assert_eq!(task.await.unwrap().unwrap(), Termination::Cancelled);
    assert_eq!(cancelled_at.elapsed(), Duration::ZERO);
    assert!(auth.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_while_renewal_in_flight() {
    let auth = ScriptedAuth::new(Ok(TokenInfo::renewable(10 * MINUTE)));
    let cancel = CancellationToken::new();
    let manager = manager(&auth);
    let state = manager.subscribe();

    let task = manager.spawn(cancel.clone());
    sleep(6 * MINUTE).await;

    assert_eq!(*state.borrow(), LifecycleState::Renewing);
    assert_eq!(auth.calls().len(), 1);

    cancel.cancel();
    assert_eq!(task.await.unwrap().unwrap(), Termination::Cancelled);
    assert_eq!(*state.borrow(), LifecycleState::Terminated);
}

#[tokio::test(start_paused = true)]
async fn test_already_cancelled_skips_lookup() {
    let auth = ScriptedAuth::new(Ok(TokenInfo::renewable(HOUR)));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = manager(&auth).run(cancel).await;

    assert_eq!(result.unwrap(), Termination::Cancelled);
    assert_eq!(auth.lookups(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_renewal_failure_is_fatal() {
    let auth = ScriptedAuth::new(Ok(TokenInfo::renewable(30 * MINUTE)))
        .then_renew(Err(VaultError::auth_failed("permission denied")));

    let err = manager(&auth).run(CancellationToken::new()).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Renewal);
    match err {
        VaultError::RenewalFailed { source } => {
            assert_eq!(source.kind(), ErrorKind::Authentication);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(auth.calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_transient_failure_is_fatal_without_retry() {
    let auth = ScriptedAuth::new(Ok(TokenInfo::renewable(30 * MINUTE)))
        .then_renew(Err(VaultError::unavailable("Vault is sealed")));

    let err = manager(&auth).run(CancellationToken::new()).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Renewal);
    assert_eq!(auth.calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_transient_failure_retried_when_enabled() {
    let auth = ScriptedAuth::new(Ok(TokenInfo::renewable(30 * MINUTE)))
        .then_renew(Err(VaultError::connection("connection reset")))
        .then_renew(Ok(TokenInfo::renewable(30 * MINUTE)));
    let cancel = CancellationToken::new();
    let retry = RetryConfig::default()
        .with_initial_delay(Duration::from_secs(2))
        .without_jitter();

    let task = manager(&auth).with_retry(retry).spawn(cancel.clone());
    sleep(16 * MINUTE).await;

    let calls = auth.calls();
    assert_eq!(calls.len(), 2);
    assert_near(calls[1].at - calls[0].at, Duration::from_secs(2));

    cancel.cancel();
    assert_eq!(task.await.unwrap().unwrap(), Termination::Cancelled);
}

#[tokio::test(start_paused = true)]
async fn test_retry_never_applies_to_auth_failures() {
    let auth = ScriptedAuth::new(Ok(TokenInfo::renewable(30 * MINUTE)))
        .then_renew(Err(VaultError::auth_failed("token revoked")));

    let err = manager(&auth)
        .with_retry(RetryConfig::default())
        .run(CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Renewal);
    assert_eq!(auth.calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_retry_stops_when_token_would_expire() {
    let auth = ScriptedAuth::new(Ok(TokenInfo::renewable(Duration::from_secs(10))))
        .then_renew(Err(VaultError::RateLimited));
    let retry = RetryConfig::default()
        .with_initial_delay(Duration::from_secs(30))
        .without_jitter();

    let err = manager(&auth)
        .with_retry(retry)
        .run(CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Renewal);
    assert_eq!(auth.calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_token_becoming_non_renewable_ends_loop() {
    let auth = ScriptedAuth::new(Ok(TokenInfo::renewable(10 * MINUTE)))
        .then_renew(Ok(TokenInfo::non_renewable(5 * MINUTE)));

    let result = manager(&auth).run(CancellationToken::new()).await;

    assert_eq!(result.unwrap(), Termination::NotRenewable);
    assert_eq!(auth.calls().len(), 1);
}
