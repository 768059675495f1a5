//! # Token Exchange Gateway
//!
//! Server-side half of the Spotify authorization-code flow.
//!
//! Clients post the authorization code they received on the redirect to
//! `POST /api/spotify/token`; the gateway adds the confidential client
//! credentials, performs a single exchange against the accounts service and
//! returns the provider's token JSON. Every failure is a 500 carrying
//! `{ "message": ... }`.

pub mod error;
pub mod exchange;
pub mod routes;
pub mod server;

pub use error::{GatewayError, Result};
pub use exchange::{TokenGateway, TokenResponse};
pub use routes::{router, ExchangeRequest, TOKEN_ROUTE};
