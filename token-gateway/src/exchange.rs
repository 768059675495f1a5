//! Authorization-code exchange against the Spotify accounts service.
//!
//! The gateway holds the confidential client credentials so that callers
//! never see the client secret. One call to
//! [`TokenGateway::exchange_code`] makes at most one outbound request.

use crate::error::{GatewayError, Result};
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use core_auth::TokenTriple;
use core_runtime::config::SpotifyConfig;
use core_runtime::logging::redact_if_sensitive;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Token JSON as returned by the provider.
///
/// Fields the gateway does not interpret are kept in `extra` and
/// serialized back unchanged.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    pub refresh_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl TokenResponse {
    pub fn into_triple(self) -> TokenTriple {
        TokenTriple::new(self.access_token, self.refresh_token, self.expires_in)
    }
}

impl From<TokenResponse> for TokenTriple {
    fn from(response: TokenResponse) -> Self {
        response.into_triple()
    }
}

impl fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("refresh_token", &"[REDACTED]")
            .field("scope", &self.scope)
            .finish()
    }
}

#[derive(Serialize)]
struct AuthorizationCodeForm<'a> {
    grant_type: &'a str,
    code: &'a str,
    redirect_uri: &'a str,
}

#[derive(Deserialize)]
struct ProviderError {
    error: Option<String>,
    error_description: Option<String>,
}

/// Description of a rejected exchange, preferring `error_description`.
fn rejection_description(response: &HttpResponse) -> String {
    response
        .json::<ProviderError>()
        .ok()
        .and_then(|body| body.error_description.or(body.error))
        .filter(|description| !description.is_empty())
        .unwrap_or_else(|| "Unknown error".to_string())
}

/// Exchanges authorization codes for token triples.
pub struct TokenGateway {
    config: SpotifyConfig,
    http_client: Arc<dyn HttpClient>,
}

impl TokenGateway {
    /// Creates a gateway with an explicit HTTP client.
    ///
    /// Client settings may be incomplete; exchanges then fail with
    /// `GatewayError::Configuration` without contacting the provider.
    pub fn new(config: SpotifyConfig, http_client: Arc<dyn HttpClient>) -> Self {
        Self {
            config,
            http_client,
        }
    }

    /// Creates a gateway using the HTTP client carried by `config`, or the
    /// desktop default.
    pub fn from_config(config: SpotifyConfig) -> core_runtime::Result<Self> {
        let http_client = config.http_client()?;
        Ok(Self::new(config, http_client))
    }

    pub fn config(&self) -> &SpotifyConfig {
        &self.config
    }

    /// Exchanges a single-use authorization code for tokens.
    ///
    /// # Arguments
    ///
    /// * `code` - Authorization code from the consent redirect
    ///
    /// # Errors
    ///
    /// - `GatewayError::MissingCode` if `code` is blank
    /// - `GatewayError::Configuration` if client id, secret or redirect URI
    ///   is not configured
    /// - `GatewayError::InvalidCode` if the provider rejects the exchange
    /// - `GatewayError::UpstreamUnavailable` if the provider cannot be reached
    /// - `GatewayError::InvalidResponse` if the provider answers 2xx with a
    ///   body that is not a token response
    #[instrument(skip(self, code))]
    pub async fn exchange_code(&self, code: &str) -> Result<TokenResponse> {
        // Blank check only; the code is forwarded exactly as received
        if code.trim().is_empty() {
            warn!("Token exchange requested without an authorization code");
            return Err(GatewayError::MissingCode);
        }

        let credentials = self.config.credentials().map_err(|_| {
            error!(
                client_id = self.config.client_id.is_some(),
                client_secret = self.config.client_secret.is_some(),
                redirect_uri = self.config.redirect_uri.is_some(),
                "Missing client configuration"
            );
            GatewayError::Configuration
        })?;

        let form = AuthorizationCodeForm {
            grant_type: "authorization_code",
            code,
            redirect_uri: &credentials.redirect_uri,
        };
        let request = HttpRequest::new(HttpMethod::Post, self.config.token_url.clone())
            .basic_auth(&credentials.client_id, &credentials.client_secret)
            .form(&form)
            .map_err(|e| GatewayError::InvalidResponse(format!("Failed to encode form: {}", e)))?;

        debug!(
            client_id = %credentials.client_id,
            client_secret = %redact_if_sensitive("client_secret", &credentials.client_secret),
            code = %redact_if_sensitive("code", code),
            redirect_uri = %credentials.redirect_uri,
            "Token request prepared"
        );
        info!(token_url = %self.config.token_url, "Requesting token from Spotify");

        let response = self.http_client.execute(request).await.map_err(|e| {
            error!(error = %e, transport = e.is_transport(), "Token endpoint unreachable");
            GatewayError::UpstreamUnavailable(e.to_string())
        })?;

        if !response.is_success() {
            let description = rejection_description(&response);
            error!(
                status = response.status,
                error = %description,
                "Spotify rejected the token exchange"
            );
            return Err(GatewayError::InvalidCode(description));
        }

        let tokens: TokenResponse = response.json().map_err(|e| {
            error!(error = %e, "Token endpoint returned an unreadable body");
            GatewayError::InvalidResponse(e.to_string())
        })?;

        info!(expires_in = tokens.expires_in, "Successfully received token from Spotify");
        Ok(tokens)
    }
}

impl fmt::Debug for TokenGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenGateway")
            .field("token_url", &self.config.token_url)
            .field("configured", &self.config.missing_settings().is_empty())
            .finish()
    }
}
