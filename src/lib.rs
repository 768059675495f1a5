//! Workspace facade crate.
//!
//! Host applications can depend on `spotify-auth-workspace` and pick up the
//! session manager, runtime helpers and the desktop HTTP client from one place.
//! The `gateway` feature additionally exposes the token exchange gateway.

#[cfg(feature = "desktop-shims")]
pub use bridge_desktop::ReqwestHttpClient;
#[cfg(feature = "desktop-shims")]
pub use core_auth::{
    AccountsApi, AuthError, SessionManager, SessionSnapshot, SessionState, SpotifyAccountsClient,
    TokenTriple, UserProfile,
};
#[cfg(feature = "desktop-shims")]
pub use core_runtime::{config::SpotifyConfig, events::EventBus, logging};

#[cfg(feature = "gateway")]
pub use token_gateway::{GatewayError, TokenGateway, TokenResponse};
