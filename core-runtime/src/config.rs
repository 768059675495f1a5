//! # Provider Configuration Module
//!
//! Configuration for talking to the Spotify accounts service and Web API.
//!
//! ## Overview
//!
//! [`SpotifyConfig`] holds the confidential client settings (client id, client
//! secret, redirect URI), the provider endpoints and the HTTP bridge used to
//! reach them. It is built with [`SpotifyConfigBuilder`] or read from the
//! deployment environment with [`SpotifyConfig::from_env`].
//!
//! Missing client settings are not a build error: a gateway can start without
//! them and report a configuration fault on every exchange attempt. Call
//! [`SpotifyConfig::credentials`] to get the validated triple.
//!
//! ## Environment
//!
//! | Variable                | Meaning                               |
//! |-------------------------|---------------------------------------|
//! | `SPOTIFY_CLIENT_ID`     | Confidential client id (required)     |
//! | `SPOTIFY_CLIENT_SECRET` | Confidential client secret (required) |
//! | `SPOTIFY_REDIRECT_URI`  | Registered redirect URI (required)    |
//! | `SPOTIFY_TOKEN_URL`     | Token endpoint override               |
//! | `SPOTIFY_API_BASE_URL`  | Web API base override                 |
//!
//! ## Usage
//!
//! ```
//! use core_runtime::config::SpotifyConfig;
//!
//! let config = SpotifyConfig::builder()
//!     .client_id("client-id")
//!     .client_secret("client-secret")
//!     .redirect_uri("http://localhost:3000/callback")
//!     .build()
//!     .expect("valid config");
//!
//! assert!(config.credentials().is_ok());
//! ```

use crate::error::{Error, Result};
use bridge_traits::HttpClient;
use std::fmt;
use std::sync::Arc;
use url::Url;

/// Spotify accounts token endpoint.
pub const DEFAULT_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";

/// Spotify Web API base URL.
pub const DEFAULT_API_BASE_URL: &str = "https://api.spotify.com/v1";

pub const ENV_CLIENT_ID: &str = "SPOTIFY_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "SPOTIFY_CLIENT_SECRET";
pub const ENV_REDIRECT_URI: &str = "SPOTIFY_REDIRECT_URI";
pub const ENV_TOKEN_URL: &str = "SPOTIFY_TOKEN_URL";
pub const ENV_API_BASE_URL: &str = "SPOTIFY_API_BASE_URL";

/// Validated confidential client credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

impl fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("redirect_uri", &self.redirect_uri)
            .finish()
    }
}

/// Configuration for the Spotify accounts service and Web API.
#[derive(Clone)]
pub struct SpotifyConfig {
    /// Confidential client id
    pub client_id: Option<String>,

    /// Confidential client secret
    pub client_secret: Option<String>,

    /// Redirect URI registered with the provider
    pub redirect_uri: Option<String>,

    /// Token endpoint used for code exchange and refresh
    pub token_url: String,

    /// Web API base URL used for identity calls
    pub api_base_url: String,

    /// HTTP client (optional with desktop default)
    pub http_client: Option<Arc<dyn HttpClient>>,
}

impl fmt::Debug for SpotifyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpotifyConfig")
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("redirect_uri", &self.redirect_uri)
            .field("token_url", &self.token_url)
            .field("api_base_url", &self.api_base_url)
            .field(
                "http_client",
                &self.http_client.as_ref().map(|_| "HttpClient { ... }"),
            )
            .finish()
    }
}

impl SpotifyConfig {
    /// Creates a new builder.
    pub fn builder() -> SpotifyConfigBuilder {
        SpotifyConfigBuilder::default()
    }

    /// Reads the configuration from the process environment.
    ///
    /// Absent client settings are kept as `None`; only malformed endpoint
    /// overrides fail here.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = Self::builder();

        if let Some(value) = lookup(ENV_CLIENT_ID) {
            builder = builder.client_id(value);
        }
        if let Some(value) = lookup(ENV_CLIENT_SECRET) {
            builder = builder.client_secret(value);
        }
        if let Some(value) = lookup(ENV_REDIRECT_URI) {
            builder = builder.redirect_uri(value);
        }
        if let Some(value) = lookup(ENV_TOKEN_URL) {
            builder = builder.token_url(value);
        }
        if let Some(value) = lookup(ENV_API_BASE_URL) {
            builder = builder.api_base_url(value);
        }

        builder.build()
    }

    /// Names of the required client settings that are absent.
    pub fn missing_settings(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.client_id.is_none() {
            missing.push(ENV_CLIENT_ID);
        }
        if self.client_secret.is_none() {
            missing.push(ENV_CLIENT_SECRET);
        }
        if self.redirect_uri.is_none() {
            missing.push(ENV_REDIRECT_URI);
        }
        missing
    }

    /// Returns the confidential client triple, or `Error::MissingSettings`.
    pub fn credentials(&self) -> Result<ClientCredentials> {
        match (&self.client_id, &self.client_secret, &self.redirect_uri) {
            (Some(client_id), Some(client_secret), Some(redirect_uri)) => Ok(ClientCredentials {
                client_id: client_id.clone(),
                client_secret: client_secret.clone(),
                redirect_uri: redirect_uri.clone(),
            }),
            _ => Err(Error::MissingSettings {
                names: self.missing_settings(),
            }),
        }
    }

    /// Returns the configured HTTP client, falling back to the desktop default.
    pub fn http_client(&self) -> Result<Arc<dyn HttpClient>> {
        match &self.http_client {
            Some(client) => Ok(Arc::clone(client)),
            None => provide_default_http_client(),
        }
    }

    /// Validates endpoint URLs.
    pub fn validate(&self) -> Result<()> {
        parse_endpoint("token_url", &self.token_url)?;
        parse_endpoint("api_base_url", &self.api_base_url)?;
        Ok(())
    }
}

/// Parses an endpoint URL, accepting only `http` and `https` with a host.
pub fn parse_endpoint(name: &str, value: &str) -> Result<Url> {
    let url = Url::parse(value)
        .map_err(|e| Error::Config(format!("Invalid {} '{}': {}", name, value, e)))?;

    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(Error::Config(format!(
            "{} must be an http(s) URL, got '{}'",
            name, value
        )));
    }

    Ok(url)
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    use bridge_desktop::ReqwestHttpClient;

    let client = ReqwestHttpClient::new()
        .map_err(|e| Error::Internal(format!("Failed to create default HttpClient: {}", e)))?;
    Ok(Arc::new(client))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    Err(Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: "No HTTP client implementation provided. \
                  Enable the `desktop-shims` feature or inject one with .http_client()."
            .to_string(),
    })
}

/// Builder for constructing [`SpotifyConfig`] instances.
///
/// Blank values are treated as absent.
#[derive(Default)]
pub struct SpotifyConfigBuilder {
    client_id: Option<String>,
    client_secret: Option<String>,
    redirect_uri: Option<String>,
    token_url: Option<String>,
    api_base_url: Option<String>,
    http_client: Option<Arc<dyn HttpClient>>,
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

impl SpotifyConfigBuilder {
    /// Sets the confidential client id.
    pub fn client_id(mut self, value: impl Into<String>) -> Self {
        self.client_id = non_blank(value.into());
        self
    }

    /// Sets the confidential client secret.
    pub fn client_secret(mut self, value: impl Into<String>) -> Self {
        self.client_secret = non_blank(value.into());
        self
    }

    /// Sets the redirect URI registered with the provider.
    pub fn redirect_uri(mut self, value: impl Into<String>) -> Self {
        self.redirect_uri = non_blank(value.into());
        self
    }

    /// Overrides the token endpoint.
    ///
    /// Default: [`DEFAULT_TOKEN_URL`]
    pub fn token_url(mut self, value: impl Into<String>) -> Self {
        self.token_url = non_blank(value.into());
        self
    }

    /// Overrides the Web API base URL.
    ///
    /// Default: [`DEFAULT_API_BASE_URL`]
    pub fn api_base_url(mut self, value: impl Into<String>) -> Self {
        self.api_base_url = non_blank(value.into());
        self
    }

    /// Injects the HTTP client.
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Builds the configuration and validates the endpoints.
    pub fn build(self) -> Result<SpotifyConfig> {
        let config = SpotifyConfig {
            client_id: self.client_id,
            client_secret: self.client_secret,
            redirect_uri: self.redirect_uri,
            token_url: self
                .token_url
                .unwrap_or_else(|| DEFAULT_TOKEN_URL.to_string()),
            api_base_url: self
                .api_base_url
                .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
            http_client: self.http_client,
        };

        config.validate()?;

        Ok(config)
    }
}
