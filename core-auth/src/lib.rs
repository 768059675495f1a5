//! # Authentication Module
//!
//! Credential session for a Spotify user.
//!
//! ## Overview
//!
//! Holds the token triple obtained from the token gateway, verifies it
//! against the Spotify identity endpoint and keeps the access token fresh
//! with a renewal timer. Profile fetches recover once from an expired token.
//!
//! ## Features
//!
//! - Token verification before the session is trusted
//! - Automatic token refresh before expiration
//! - Single-flight refresh shared by concurrent callers
//! - Session lifecycle event emission

pub mod error;
pub mod session;
pub mod spotify;
pub mod types;

pub use error::{AuthError, Result};
pub use session::{SessionManager, SessionManagerBuilder, TOKEN_REFRESH_BUFFER};
pub use spotify::{AccountsApi, SpotifyAccountsClient};
pub use types::{SessionSnapshot, SessionState, TokenTriple, UserProfile};
