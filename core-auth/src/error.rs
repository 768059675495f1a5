use bridge_traits::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Token verification failed: {0}")]
    TokenVerification(String),

    #[error("Provider rejected the access token: {0}")]
    Unauthorized(String),

    #[error("Profile fetch failed with status {status}: {message}")]
    ProfileFetch { status: u16, message: String },

    #[error("Token refresh failed: {0}")]
    TokenRefreshFailed(String),

    #[error("Provider unreachable: {0}")]
    Network(String),

    #[error("Session was cleared while the operation was in flight")]
    SessionCleared,

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("{0}")]
    Other(String),
}

impl AuthError {
    /// Whether the provider answered 401 for the access token.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, AuthError::Unauthorized(_))
    }
}

impl From<BridgeError> for AuthError {
    fn from(err: BridgeError) -> Self {
        if err.is_transport() {
            AuthError::Network(err.to_string())
        } else {
            AuthError::Other(err.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
