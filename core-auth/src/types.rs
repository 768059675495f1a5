use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

const MAX_LIFETIME_SECONDS: u64 = (i64::MAX / 1000) as u64;

/// Access token, refresh token and access-token lifetime, as issued by the
/// provider's token endpoint.
///
/// The wire name of the lifetime field is `expires_in`.
///
/// # Examples
///
/// ```
/// use core_auth::TokenTriple;
///
/// let tokens = TokenTriple::new("AT1", "RT1", 3600);
/// assert_eq!(tokens.expires_in_seconds, 3600);
///
/// // Debug output never includes the secrets
/// assert!(!format!("{:?}", tokens).contains("AT1"));
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenTriple {
    /// Short-lived bearer token
    pub access_token: String,
    /// Long-lived token used to mint new access tokens
    pub refresh_token: String,
    /// Access token lifetime in seconds
    #[serde(rename = "expires_in")]
    pub expires_in_seconds: u64,
}

impl TokenTriple {
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_in_seconds: u64,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            expires_in_seconds,
        }
    }

    /// Absolute expiry computed from `issued_at`.
    pub fn expires_at(&self, issued_at: DateTime<Utc>) -> DateTime<Utc> {
        // chrono panics above i64::MAX milliseconds
        let seconds = self.expires_in_seconds.min(MAX_LIFETIME_SECONDS) as i64;
        issued_at
            .checked_add_signed(chrono::Duration::seconds(seconds))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

impl fmt::Debug for TokenTriple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenTriple")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_in_seconds", &self.expires_in_seconds)
            .finish()
    }
}

/// Identity of the signed-in user as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Provider user id
    pub id: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    /// Profile image URLs, largest first as returned by the provider
    #[serde(default)]
    pub avatar_urls: Vec<String>,
}

/// Lifecycle state of the credential session.
///
/// # Examples
///
/// ```
/// use core_auth::SessionState;
///
/// assert!(!SessionState::Unauthenticated.has_credentials());
/// assert!(SessionState::Refreshing.has_credentials());
/// assert!(SessionState::Verifying.is_transitioning());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SessionState {
    /// No credentials held
    #[default]
    Unauthenticated,
    /// Tokens stored, waiting on the identity check
    Verifying,
    /// Tokens held
    Authenticated,
    /// Token refresh is in progress
    Refreshing,
}

impl SessionState {
    /// Whether an access token is held in this state.
    pub fn has_credentials(&self) -> bool {
        !matches!(self, SessionState::Unauthenticated)
    }

    /// Whether a provider round-trip is in progress.
    pub fn is_transitioning(&self) -> bool {
        matches!(self, SessionState::Verifying | SessionState::Refreshing)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Unauthenticated => write!(f, "Unauthenticated"),
            SessionState::Verifying => write!(f, "Verifying..."),
            SessionState::Authenticated => write!(f, "Authenticated"),
            SessionState::Refreshing => write!(f, "Refreshing Token..."),
        }
    }
}

/// Point-in-time view of a session, safe to log or serialize.
///
/// Carries no token material.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub authenticated: bool,
    pub user: Option<UserProfile>,
    /// Lifetime of the current access token in seconds, 0 when signed out
    pub expires_in: u64,
    pub expires_at: Option<DateTime<Utc>>,
    pub renewal_pending: bool,
}
