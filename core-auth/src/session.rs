//! # Session Manager
//!
//! Holds the credentials of the signed-in user and keeps the access token
//! fresh.
//!
//! ## Overview
//!
//! [`SessionManager`] owns the token triple, the verified [`UserProfile`] and
//! a single renewal timer. Storing tokens verifies them against the identity
//! endpoint and, on success, arms a timer that refreshes the access token
//! [`TOKEN_REFRESH_BUFFER`] before it expires. Each successful refresh re-arms
//! the timer; a failed refresh clears the session.
//!
//! ## Concurrency
//!
//! - Refreshes are single-flight. Callers that queue behind a refresh reuse
//!   its outcome instead of spending the refresh token again.
//! - Every `set_tokens` or `logout` starts a new session generation. Results of
//!   provider calls started under an older generation are discarded and the
//!   caller receives [`AuthError::SessionCleared`].
//! - At most one renewal timer exists. Arming a new one cancels the previous.
//!
//! ## Usage
//!
//! ```ignore
//! use core_auth::{SessionManager, SpotifyAccountsClient, TokenTriple};
//! use std::sync::Arc;
//!
//! let api = Arc::new(SpotifyAccountsClient::from_config(&config)?);
//! let session = SessionManager::new(api);
//!
//! session
//!     .set_tokens(TokenTriple::new(access_token, refresh_token, 3600))
//!     .await?;
//! assert!(session.is_authenticated());
//!
//! let profile = session.fetch_user_profile().await?;
//! ```

use crate::error::{AuthError, Result};
use crate::spotify::AccountsApi;
use crate::types::{SessionSnapshot, SessionState, TokenTriple, UserProfile};
use chrono::{DateTime, Utc};
use core_runtime::events::{AuthEvent, EventBus};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

/// How long before expiry the renewal timer fires.
pub const TOKEN_REFRESH_BUFFER: Duration = Duration::from_secs(300);

/// Profile fetch attempts, counting the retry after a 401-triggered refresh.
const MAX_PROFILE_ATTEMPTS: u32 = 2;

/// Timer horizon used when a lifetime does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Delay before renewing a token that lives `expires_in_seconds`.
///
/// Clamped at zero: tokens that live shorter than `buffer` renew right away.
///
/// ```
/// use core_auth::session::{renewal_delay, TOKEN_REFRESH_BUFFER};
/// use std::time::Duration;
///
/// assert_eq!(renewal_delay(3600, TOKEN_REFRESH_BUFFER), Duration::from_secs(3300));
/// assert_eq!(renewal_delay(120, TOKEN_REFRESH_BUFFER), Duration::ZERO);
/// ```
pub fn renewal_delay(expires_in_seconds: u64, buffer: Duration) -> Duration {
    Duration::from_secs(expires_in_seconds).saturating_sub(buffer)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefreshTrigger {
    Manual,
    Scheduled,
    ProfileRetry,
}

struct RenewalTimer {
    id: u64,
    delay: Duration,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct SessionInner {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: u64,
    expires_at: Option<DateTime<Utc>>,
    user: Option<UserProfile>,
    state: SessionState,
    /// Bumped by `set_tokens` and `logout`
    generation: u64,
    /// Bumped by every successful refresh
    refresh_epoch: u64,
    next_timer_id: u64,
    renewal: Option<RenewalTimer>,
}

impl SessionInner {
    fn cancel_renewal(&mut self) {
        if let Some(timer) = self.renewal.take() {
            timer.handle.abort();
        }
    }

    /// Wipes all session fields. Returns whether any credentials were held.
    fn clear(&mut self) -> bool {
        self.cancel_renewal();
        let had_credentials = self.access_token.is_some()
            || self.refresh_token.is_some()
            || self.user.is_some();

        self.access_token = None;
        self.refresh_token = None;
        self.expires_in = 0;
        self.expires_at = None;
        self.user = None;
        self.state = SessionState::Unauthenticated;
        self.generation += 1;

        had_credentials
    }
}

struct Shared {
    api: Arc<dyn AccountsApi>,
    event_bus: Option<EventBus>,
    refresh_buffer: Duration,
    inner: Mutex<SessionInner>,
    refresh_gate: tokio::sync::Mutex<()>,
}

impl Drop for Shared {
    fn drop(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(PoisonError::into_inner);
        inner.cancel_renewal();
    }
}

/// Builder for [`SessionManager`].
pub struct SessionManagerBuilder {
    api: Arc<dyn AccountsApi>,
    event_bus: Option<EventBus>,
    refresh_buffer: Duration,
}

impl SessionManagerBuilder {
    /// Publish session lifecycle events on `event_bus`.
    pub fn event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Override [`TOKEN_REFRESH_BUFFER`].
    pub fn refresh_buffer(mut self, buffer: Duration) -> Self {
        self.refresh_buffer = buffer;
        self
    }

    pub fn build(self) -> SessionManager {
        SessionManager {
            shared: Arc::new(Shared {
                api: self.api,
                event_bus: self.event_bus,
                refresh_buffer: self.refresh_buffer,
                inner: Mutex::new(SessionInner::default()),
                refresh_gate: tokio::sync::Mutex::new(()),
            }),
        }
    }
}

/// Credential session for a single signed-in user.
///
/// Cheap to clone; clones share the same session. The renewal timer only
/// holds a weak reference, so dropping the last handle cancels it.
///
/// Timers are spawned on the ambient Tokio runtime, so token-storing and
/// refresh operations must run inside one.
#[derive(Clone)]
pub struct SessionManager {
    shared: Arc<Shared>,
}

impl SessionManager {
    /// Creates an empty session using `api` for verification and refresh.
    pub fn new(api: Arc<dyn AccountsApi>) -> Self {
        Self::builder(api).build()
    }

    pub fn builder(api: Arc<dyn AccountsApi>) -> SessionManagerBuilder {
        SessionManagerBuilder {
            api,
            event_bus: None,
            refresh_buffer: TOKEN_REFRESH_BUFFER,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.shared
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: AuthEvent) {
        if let Some(bus) = &self.shared.event_bus {
            // No subscribers is fine
            let _ = bus.emit(event);
        }
    }

    /// Stores a token triple and verifies it against the identity endpoint.
    ///
    /// Fields are written before verification. On success the state becomes
    /// `Authenticated` and the renewal timer is armed. On failure the fields
    /// stay as written and no timer is armed; callers are expected to
    /// [`logout`](Self::logout).
    ///
    /// # Arguments
    ///
    /// * `tokens` - Triple obtained from the token gateway
    ///
    /// # Errors
    ///
    /// - `AuthError::TokenVerification` if the identity endpoint rejects the
    ///   token or cannot be reached
    /// - `AuthError::SessionCleared` if `logout` or another `set_tokens` ran
    ///   while verification was in flight
    #[instrument(skip(self, tokens), fields(expires_in = tokens.expires_in_seconds))]
    pub async fn set_tokens(&self, tokens: TokenTriple) -> Result<()> {
        let issued_at = Utc::now();
        let generation = {
            let mut inner = self.lock();
            inner.cancel_renewal();
            inner.generation += 1;
            inner.access_token = Some(tokens.access_token.clone());
            inner.refresh_token = Some(tokens.refresh_token.clone());
            inner.expires_in = tokens.expires_in_seconds;
            inner.expires_at = Some(tokens.expires_at(issued_at));
            inner.state = SessionState::Verifying;
            inner.generation
        };

        debug!("Tokens stored, verifying access token");
        self.emit(AuthEvent::SigningIn);

        let verification = self.shared.api.current_user(&tokens.access_token).await;

        let mut inner = self.lock();
        if inner.generation != generation {
            debug!("Session changed during verification, discarding result");
            return Err(AuthError::SessionCleared);
        }

        // A verified or unverified token is still held; only the timer differs.
        inner.state = SessionState::Authenticated;

        match verification {
            Ok(profile) => {
                let delay = self.arm_renewal(&mut inner);
                drop(inner);

                info!(
                    user_id = %profile.id,
                    renewal_in_secs = delay.as_secs(),
                    "Token verification successful"
                );
                self.emit(AuthEvent::SignedIn {
                    user_id: profile.id,
                });
                Ok(())
            }
            Err(err) => {
                drop(inner);

                error!(error = %err, "Token verification failed");
                self.emit(AuthEvent::AuthError {
                    message: err.to_string(),
                    recoverable: true,
                });
                Err(AuthError::TokenVerification(err.to_string()))
            }
        }
    }

    /// Exchanges the stored refresh token for a new access token.
    ///
    /// On success the access token and lifetime are replaced and the renewal
    /// timer is re-armed. On failure the session is cleared exactly as by
    /// [`logout`](Self::logout).
    ///
    /// # Errors
    ///
    /// - `AuthError::NotAuthenticated` if no refresh token is held
    /// - `AuthError::TokenRefreshFailed` if the provider rejected the refresh
    /// - `AuthError::SessionCleared` if the session changed mid-flight
    #[instrument(skip(self))]
    pub async fn refresh_access_token(&self) -> Result<()> {
        self.refresh(RefreshTrigger::Manual).await
    }

    /// Refreshes immediately, regardless of the timer.
    ///
    /// Returns `true` on success. Failures are logged and leave the session
    /// cleared.
    #[instrument(skip(self))]
    pub async fn force_refresh_token(&self) -> bool {
        info!("Forcing immediate token refresh");
        match self.refresh(RefreshTrigger::Manual).await {
            Ok(()) => {
                info!("Forced refresh completed");
                true
            }
            Err(err) => {
                error!(error = %err, "Forced refresh failed");
                false
            }
        }
    }

    /// Fetches and caches the current user's profile.
    ///
    /// A 401 triggers one refresh followed by one retry. Any other failure,
    /// or a second 401, is returned unchanged.
    ///
    /// # Errors
    ///
    /// - `AuthError::NotAuthenticated` if no access token is held
    /// - `AuthError::Unauthorized` if the retry after refresh was also rejected
    /// - Refresh errors from the recovery step
    #[instrument(skip(self))]
    pub async fn fetch_user_profile(&self) -> Result<UserProfile> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let (access_token, generation) = {
                let inner = self.lock();
                let token = inner
                    .access_token
                    .clone()
                    .ok_or(AuthError::NotAuthenticated)?;
                (token, inner.generation)
            };

            match self.shared.api.current_user(&access_token).await {
                Ok(profile) => {
                    let mut inner = self.lock();
                    if inner.generation != generation {
                        return Err(AuthError::SessionCleared);
                    }
                    inner.user = Some(profile.clone());
                    debug!(user_id = %profile.id, attempt, "Profile cached");
                    return Ok(profile);
                }
                Err(err) if err.is_unauthorized() && attempt < MAX_PROFILE_ATTEMPTS => {
                    warn!("Profile request unauthorized, refreshing token and retrying");
                    self.refresh(RefreshTrigger::ProfileRetry).await?;
                }
                Err(err) => {
                    error!(error = %err, attempt, "Failed to fetch user profile");
                    return Err(err);
                }
            }
        }
    }

    /// Clears every session field and cancels the renewal timer.
    ///
    /// Safe to call in any state, any number of times. In-flight
    /// verifications and refreshes are abandoned.
    #[instrument(skip(self))]
    pub fn logout(&self) {
        let had_credentials = self.lock().clear();
        info!("Logged out");
        if had_credentials {
            self.emit(AuthEvent::SignedOut);
        }
    }

    /// Whether an access token is held.
    pub fn is_authenticated(&self) -> bool {
        self.lock().access_token.is_some()
    }

    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    /// Current bearer token, for attaching to API requests.
    pub fn access_token(&self) -> Option<String> {
        self.lock().access_token.clone()
    }

    /// Cached profile from the last successful fetch.
    pub fn user(&self) -> Option<UserProfile> {
        self.lock().user.clone()
    }

    /// Lifetime of the current access token in seconds, 0 when signed out.
    pub fn expires_in(&self) -> u64 {
        self.lock().expires_in
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.lock().expires_at
    }

    pub fn has_pending_renewal(&self) -> bool {
        self.lock().renewal.is_some()
    }

    /// Delay the pending renewal timer was armed with.
    pub fn pending_renewal_delay(&self) -> Option<Duration> {
        self.lock().renewal.as_ref().map(|timer| timer.delay)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let inner = self.lock();
        SessionSnapshot {
            state: inner.state,
            authenticated: inner.access_token.is_some(),
            user: inner.user.clone(),
            expires_in: inner.expires_in,
            expires_at: inner.expires_at,
            renewal_pending: inner.renewal.is_some(),
        }
    }

    async fn refresh(&self, trigger: RefreshTrigger) -> Result<()> {
        let observed_epoch = self.lock().refresh_epoch;
        let _gate = self.shared.refresh_gate.lock().await;

        let (refresh_token, generation) = {
            let mut inner = self.lock();
            if inner.refresh_epoch != observed_epoch {
                debug!(?trigger, "Refresh completed while waiting, reusing result");
                return if inner.access_token.is_some() {
                    Ok(())
                } else {
                    Err(AuthError::NotAuthenticated)
                };
            }
            let Some(refresh_token) = inner.refresh_token.clone() else {
                warn!(?trigger, "No refresh token available");
                return Err(AuthError::NotAuthenticated);
            };
            inner.cancel_renewal();
            inner.state = SessionState::Refreshing;
            (refresh_token, inner.generation)
        };

        debug!(?trigger, "Refreshing access token");
        self.emit(AuthEvent::TokenRefreshing {
            scheduled: trigger == RefreshTrigger::Scheduled,
        });

        let result = self.shared.api.refresh_access_token(&refresh_token).await;

        let mut inner = self.lock();
        if inner.generation != generation {
            debug!("Session changed during refresh, discarding result");
            return Err(AuthError::SessionCleared);
        }

        match result {
            Ok(tokens) => {
                let issued_at = Utc::now();
                inner.expires_in = tokens.expires_in_seconds;
                inner.expires_at = Some(tokens.expires_at(issued_at));
                inner.access_token = Some(tokens.access_token);
                inner.refresh_epoch += 1;
                inner.state = SessionState::Authenticated;
                let delay = self.arm_renewal(&mut inner);
                drop(inner);

                info!(
                    expires_in = tokens.expires_in_seconds,
                    renewal_in_secs = delay.as_secs(),
                    "Token refresh successful"
                );
                self.emit(AuthEvent::TokenRefreshed {
                    expires_in: tokens.expires_in_seconds,
                });
                Ok(())
            }
            Err(err) => {
                let had_credentials = inner.clear();
                drop(inner);

                error!(error = %err, ?trigger, "Token refresh failed, session cleared");
                self.emit(AuthEvent::AuthError {
                    message: err.to_string(),
                    recoverable: false,
                });
                if had_credentials {
                    self.emit(AuthEvent::SignedOut);
                }
                Err(match err {
                    AuthError::TokenRefreshFailed(_) => err,
                    other => AuthError::TokenRefreshFailed(other.to_string()),
                })
            }
        }
    }

    /// Replaces any pending timer with one for the current lifetime.
    fn arm_renewal(&self, inner: &mut SessionInner) -> Duration {
        inner.cancel_renewal();

        let delay = renewal_delay(inner.expires_in, self.shared.refresh_buffer);
        inner.next_timer_id += 1;
        let id = inner.next_timer_id;
        let shared = Arc::downgrade(&self.shared);

        let deadline = renewal_deadline(Instant::now(), delay);
        let handle = tokio::spawn(run_renewal(shared, id, deadline));
        inner.renewal = Some(RenewalTimer { id, delay, handle });

        debug!(timer_id = id, delay_secs = delay.as_secs(), "Renewal timer armed");
        delay
    }
}

/// `now + delay`, saturating at [`FAR_FUTURE`] for lifetimes the clock cannot
/// represent.
fn renewal_deadline(now: Instant, delay: Duration) -> Instant {
    now.checked_add(delay).unwrap_or(now + FAR_FUTURE)
}

async fn run_renewal(shared: Weak<Shared>, id: u64, deadline: Instant) {
    tokio::time::sleep_until(deadline).await;

    let Some(shared) = shared.upgrade() else {
        return;
    };
    let session = SessionManager { shared };

    {
        let mut inner = session.lock();
        if inner.renewal.as_ref().map(|timer| timer.id) != Some(id) {
            return;
        }
        // Detach rather than abort; this task is the one running.
        inner.renewal = None;
    }

    info!(timer_id = id, "Renewal timer fired");
    if let Err(err) = session.refresh(RefreshTrigger::Scheduled).await {
        warn!(error = %err, "Scheduled token refresh did not complete");
    }
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("snapshot", &self.snapshot())
            .finish()
    }
}
