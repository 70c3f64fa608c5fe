//! Background token renewal.
//!
//! [`TokenLifecycleManager`] looks the token up once, then alternates
//! between waiting and renewing until it is cancelled or Vault refuses.
//! Waiting follows [`RenewalPolicy`]: half the remaining TTL for short-lived
//! tokens, a fixed ceiling for long-lived ones, so renewal always happens
//! before expiry with room for one slow cycle.
//!
//! Failures are fatal by default. A failed lookup usually means the token
//! was revoked and no amount of retrying will help; the caller decides
//! whether to re-authenticate and start a new manager.

use crate::{
    client::VaultClient,
    error::{VaultError, VaultResult},
    provider::TokenAuth,
    token::TokenInfo,
};
use keeper_common::{RetryConfig, RetryPolicy};
use std::{future::Future, time::Duration};
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{Instant, sleep},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// TTL at or below which the wait is half the TTL.
pub const DEFAULT_RENEWAL_THRESHOLD: Duration = Duration::from_secs(60 * 60);

/// Longest wait between renewals.
pub const DEFAULT_RENEWAL_CEILING: Duration = Duration::from_secs(60 * 60);

/// Floor for the threshold and ceiling of a [`RenewalPolicy`].
pub const MIN_RENEWAL_CEILING: Duration = Duration::from_secs(1);

/// Increment requested from Vault on each renewal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenewalIncrement {
    /// Ask for the full TTL observed before the wait
    #[default]
    FullTtl,
    /// Ask for half the TTL observed before the wait
    HalfTtl,
    /// Ask for a fixed increment
    Fixed(Duration),
    /// Send no increment; Vault applies the token's period or default TTL
    ServerDefault,
}

impl RenewalIncrement {
    /// Increment to request given the last observed TTL.
    #[must_use]
    pub fn for_ttl(self, ttl: Duration) -> Option<Duration> {
        match self {
            Self::FullTtl => Some(ttl),
            Self::HalfTtl => Some(ttl / 2),
            Self::Fixed(increment) => Some(increment),
            Self::ServerDefault => None,
        }
    }
}

/// When to renew, and what to ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenewalPolicy {
    threshold: Duration,
    ceiling: Duration,
    increment: RenewalIncrement,
}

impl Default for RenewalPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RENEWAL_THRESHOLD, DEFAULT_RENEWAL_CEILING)
    }
}

impl RenewalPolicy {
    /// Create a policy.
    ///
    /// Both durations are raised to at least [`MIN_RENEWAL_CEILING`], then
    /// `ceiling` is clamped to `threshold`.
    #[must_use]
    pub const fn new(threshold: Duration, ceiling: Duration) -> Self {
        let threshold = max_duration(threshold, MIN_RENEWAL_CEILING);
        let ceiling = min_duration(max_duration(ceiling, MIN_RENEWAL_CEILING), threshold);
        Self {
            threshold,
            ceiling,
            increment: RenewalIncrement::FullTtl,
        }
    }

    /// Use a different renewal increment.
    #[must_use]
    pub const fn with_increment(mut self, increment: RenewalIncrement) -> Self {
        self.increment = increment;
        self
    }

    /// TTL at or below which the wait is half the TTL.
    #[must_use]
    pub const fn threshold(&self) -> Duration {
        self.threshold
    }

    /// Longest wait for TTLs above the threshold.
    #[must_use]
    pub const fn ceiling(&self) -> Duration {
        self.ceiling
    }

    /// Configured renewal increment.
    #[must_use]
    pub const fn increment(&self) -> RenewalIncrement {
        self.increment
    }

    /// Time to wait before renewing a token with `ttl` left.
    ///
    /// Strictly less than `ttl` whenever `ttl` is non-zero.
    #[must_use]
    pub fn renewal_delay(&self, ttl: Duration) -> Duration {
        if ttl <= self.threshold {
            ttl / 2
        } else {
            self.ceiling
        }
    }

    /// Increment to request when renewing a token last seen with `ttl`.
    #[must_use]
    pub fn increment_for(&self, ttl: Duration) -> Option<Duration> {
        self.increment.for_ttl(ttl)
    }
}

const fn max_duration(a: Duration, b: Duration) -> Duration {
    if a.as_nanos() >= b.as_nanos() { a } else { b }
}

const fn min_duration(a: Duration, b: Duration) -> Duration {
    if a.as_nanos() <= b.as_nanos() { a } else { b }
}

/// Where the manager is in its loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Looking at the current token descriptor
    Inspecting,
    /// The token cannot be renewed; about to stop
    IdleNotRenewable,
    /// Timer armed until the next renewal
    Waiting,
    /// Renewal request in flight
    Renewing,
    /// Loop exited
    Terminated,
}

/// Why a manager stopped without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The cancellation token fired
    Cancelled,
    /// The token is not renewable, or never expires
    NotRenewable,
}

/// Keeps a token alive by renewing it before it expires.
#[derive(Debug)]
pub struct TokenLifecycleManager<A = VaultClient> {
    auth: A,
    policy: RenewalPolicy,
    retry: Option<RetryPolicy>,
    state: watch::Sender<LifecycleState>,
}

impl<A: TokenAuth> TokenLifecycleManager<A> {
    /// Create a manager renewing through `auth`.
    pub fn new(auth: A, policy: RenewalPolicy) -> Self {
        let (state, _) = watch::channel(LifecycleState::Inspecting);
        Self {
            auth,
            policy,
            retry: None,
            state,
        }
    }

    /// Retry transient renewal failures with backoff instead of stopping.
    ///
    /// Authentication failures are still fatal, and no retry is scheduled
    /// past the point where the token would have expired.
    #[must_use]
    pub fn with_retry(mut self, config: RetryConfig) -> Self {
        self.retry = Some(RetryPolicy::new(config));
        self
    }

    /// Renewal policy in use.
    pub const fn policy(&self) -> &RenewalPolicy {
        &self.policy
    }

    /// Observe state transitions.
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Run until cancelled or until a lookup or renewal fails.
    ///
    /// # Errors
    ///
    /// The lookup error as returned by Vault, or
    /// [`VaultError::RenewalFailed`] wrapping the renewal error.
    pub async fn run(&self, cancel: CancellationToken) -> VaultResult<Termination> {
        let result = self.run_loop(&cancel).await;
        self.transition(LifecycleState::Terminated);

        match &result {
            Ok(reason) => info!(reason = ?reason, "Token lifecycle manager stopped"),
            Err(e) => error!(error = %e, "Token lifecycle manager failed"),
        }
        result
    }

    /// Run on a tokio task.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<VaultResult<Termination>>
    where
        A: 'static,
    {
        tokio::spawn(async move { self.run(cancel).await })
    }

    async fn run_loop(&self, cancel: &CancellationToken) -> VaultResult<Termination> {
        if cancel.is_cancelled() {
            return Ok(Termination::Cancelled);
        }

        self.transition(LifecycleState::Inspecting);
        let Some(lookup) = until_cancelled(cancel, self.auth.lookup_self()).await else {
            return Ok(Termination::Cancelled);
        };
        let mut token = lookup?;
        let mut observed_at = Instant::now();

        loop {
            if !token.renewable || token.ttl.is_zero() {
                self.transition(LifecycleState::IdleNotRenewable);
                debug!(
                    renewable = token.renewable,
                    ttl_secs = token.ttl.as_secs(),
                    "Vault token needs no renewal"
                );
                return Ok(Termination::NotRenewable);
            }

            let ttl = token.ttl;
            let delay = self.policy.renewal_delay(ttl);
            self.transition(LifecycleState::Waiting);
            debug!(
                ttl_secs = ttl.as_secs(),
                renew_in_secs = delay.as_secs(),
                "Waiting to renew Vault token"
            );

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Ok(Termination::Cancelled),
                () = sleep(delay) => {}
            }

            self.transition(LifecycleState::Renewing);
            let Some(renewed) = self.renew(cancel, ttl, observed_at + ttl).await? else {
                return Ok(Termination::Cancelled);
            };
            token = renewed;
            observed_at = Instant::now();

            if cancel.is_cancelled() {
                return Ok(Termination::Cancelled);
            }
            self.transition(LifecycleState::Inspecting);
        }
    }

    /// Renew once, retrying transient failures when configured.
    ///
    /// `Ok(None)` means cancellation won the race.
    async fn renew(
        &self,
        cancel: &CancellationToken,
        ttl: Duration,
        expires_at: Instant,
    ) -> VaultResult<Option<TokenInfo>> {
        let increment = self.policy.increment_for(ttl);
        let mut attempt = 0;

        loop {
            debug!(
                increment_secs = increment.map(|d| d.as_secs()),
                attempt, "Renewing Vault token"
            );

            let Some(result) = until_cancelled(cancel, self.auth.renew_self(increment)).await else {
                return Ok(None);
            };

            let err = match result {
                Ok(info) => {
                    info!(
                        ttl_secs = info.ttl.as_secs(),
                        renewable = info.renewable,
                        "Vault token renewed"
                    );
                    return Ok(Some(info));
                }
                Err(e) => e,
            };

            let Some(policy) = self.retry.as_ref().filter(|p| p.should_retry(&err, attempt)) else {
                return Err(VaultError::renewal(err));
            };

            let backoff = policy.delay_for_attempt(attempt);
            if Instant::now() + backoff >= expires_at {
                warn!(error = %err, "No time left to retry Vault token renewal");
                return Err(VaultError::renewal(err));
            }

            warn!(
                error = %err,
                attempt,
                retry_in_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
                "Vault token renewal failed, retrying"
            );

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Ok(None),
                () = sleep(backoff) => {}
            }
            attempt += 1;
        }
    }

    fn transition(&self, next: LifecycleState) {
        self.state.send_replace(next);
    }
}

/// Race `fut` against cancellation; `None` if cancellation wins.
async fn until_cancelled<T>(cancel: &CancellationToken, fut: impl Future<Output = T>) -> Option<T> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => None,
        out = fut => Some(out),
    }
}
