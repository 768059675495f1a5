//! Spotify Web API calls made on behalf of a session.
//!
//! [`AccountsApi`] is the seam the [`SessionManager`](crate::SessionManager)
//! talks to. [`SpotifyAccountsClient`] implements it over the bridge
//! [`HttpClient`], so tests swap in a fake without touching the network.

use crate::error::{AuthError, Result};
use crate::types::{TokenTriple, UserProfile};
use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use core_runtime::config::{
    parse_endpoint, SpotifyConfig, DEFAULT_API_BASE_URL, DEFAULT_TOKEN_URL,
};
use core_runtime::logging::redact_if_sensitive;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use url::Url;

/// Provider operations needed to verify and renew a session.
#[async_trait]
pub trait AccountsApi: Send + Sync {
    /// Fetches the profile of the user owning `access_token`.
    ///
    /// # Errors
    ///
    /// - `AuthError::Unauthorized` when the provider answers 401
    /// - `AuthError::ProfileFetch` for any other non-success status
    /// - `AuthError::Network` when the provider is unreachable
    async fn current_user(&self, access_token: &str) -> Result<UserProfile>;

    /// Exchanges `refresh_token` for a new access token.
    ///
    /// When the provider does not rotate the refresh token, the returned
    /// triple carries the one passed in.
    ///
    /// # Errors
    ///
    /// - `AuthError::TokenRefreshFailed` when the provider rejects the grant
    /// - `AuthError::Network` when the provider is unreachable
    async fn refresh_access_token(&self, refresh_token: &str) -> Result<TokenTriple>;
}

#[derive(Deserialize)]
struct MeResponse {
    id: String,
    display_name: Option<String>,
    email: Option<String>,
    #[serde(default)]
    images: Vec<ImageObject>,
}

#[derive(Deserialize)]
struct ImageObject {
    url: String,
}

impl From<MeResponse> for UserProfile {
    fn from(me: MeResponse) -> Self {
        Self {
            id: me.id,
            display_name: me.display_name,
            email: me.email,
            avatar_urls: me.images.into_iter().map(|image| image.url).collect(),
        }
    }
}

#[derive(Serialize)]
struct RefreshForm<'a> {
    grant_type: &'a str,
    refresh_token: &'a str,
}

#[derive(Deserialize)]
struct RefreshResponse {
    access_token: String,
    expires_in: u64,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Deserialize)]
struct ProviderError {
    error: Option<serde_json::Value>,
    error_description: Option<String>,
}

/// Best-effort human message from a provider error body.
///
/// The accounts service answers `{"error": "...", "error_description": "..."}`
/// while the Web API nests `{"error": {"status": 401, "message": "..."}}`.
fn provider_message(response: &HttpResponse) -> String {
    let Ok(body) = response.json::<ProviderError>() else {
        return format!("HTTP {}", response.status);
    };
    if let Some(description) = body.error_description {
        return description;
    }
    match body.error {
        Some(serde_json::Value::String(error)) => error,
        Some(serde_json::Value::Object(error)) => error
            .get("message")
            .and_then(|message| message.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| format!("HTTP {}", response.status)),
        _ => format!("HTTP {}", response.status),
    }
}

/// [`AccountsApi`] backed by the Spotify accounts service and Web API.
#[derive(Clone)]
pub struct SpotifyAccountsClient {
    http_client: Arc<dyn HttpClient>,
    client_id: String,
    client_secret: String,
    token_url: String,
    api_base_url: String,
}

impl SpotifyAccountsClient {
    /// Creates a client against the production Spotify endpoints.
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            http_client,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
        }
    }

    /// Builds a client from runtime configuration.
    ///
    /// Only the client id and secret are required; the redirect URI is a
    /// gateway concern.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Configuration` if the client id or secret is
    /// missing or no HTTP client is available.
    pub fn from_config(config: &SpotifyConfig) -> Result<Self> {
        let (Some(client_id), Some(client_secret)) = (&config.client_id, &config.client_secret)
        else {
            return Err(AuthError::Configuration(
                "Spotify client id and secret are required".to_string(),
            ));
        };
        let http_client = config
            .http_client()
            .map_err(|e| AuthError::Configuration(e.to_string()))?;

        Ok(Self::new(http_client, client_id.clone(), client_secret.clone())
            .with_endpoints(config.token_url.clone(), config.api_base_url.clone()))
    }

    /// Overrides the token endpoint and Web API base URL.
    pub fn with_endpoints(
        mut self,
        token_url: impl Into<String>,
        api_base_url: impl Into<String>,
    ) -> Self {
        self.token_url = token_url.into();
        self.api_base_url = api_base_url.into();
        self
    }

    /// Resolves `path` against the Web API base, keeping the base path.
    fn api_url(&self, path: &str) -> Result<Url> {
        let mut base = parse_endpoint("api_base_url", &self.api_base_url)
            .map_err(|e| AuthError::Configuration(e.to_string()))?;
        if !base.path().ends_with('/') {
            let dir = format!("{}/", base.path());
            base.set_path(&dir);
        }
        base.join(path)
            .map_err(|e| AuthError::Configuration(format!("Invalid API path '{}': {}", path, e)))
    }
}

impl fmt::Debug for SpotifyAccountsClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpotifyAccountsClient")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("token_url", &self.token_url)
            .field("api_base_url", &self.api_base_url)
            .finish()
    }
}

#[async_trait]
impl AccountsApi for SpotifyAccountsClient {
    #[instrument(skip(self, access_token))]
    async fn current_user(&self, access_token: &str) -> Result<UserProfile> {
        let url = self.api_url("me")?;
        let request = HttpRequest::new(HttpMethod::Get, url.as_str()).bearer_token(access_token);

        let response = self.http_client.execute(request).await?;

        if response.is_unauthorized() {
            let message = provider_message(&response);
            warn!(status = response.status, "Profile request rejected");
            return Err(AuthError::Unauthorized(message));
        }

        if !response.is_success() {
            let message = provider_message(&response);
            warn!(status = response.status, error = %message, "Profile request failed");
            return Err(AuthError::ProfileFetch {
                status: response.status,
                message,
            });
        }

        let me: MeResponse = response.json().map_err(|e| AuthError::ProfileFetch {
            status: response.status,
            message: format!("Failed to parse profile: {}", e),
        })?;

        let email = me
            .email
            .as_deref()
            .map(|email| redact_if_sensitive("email", email))
            .unwrap_or_default();
        debug!(user_id = %me.id, email = %email, "Fetched user profile");
        Ok(me.into())
    }

    #[instrument(skip(self, refresh_token))]
    async fn refresh_access_token(&self, refresh_token: &str) -> Result<TokenTriple> {
        let form = RefreshForm {
            grant_type: "refresh_token",
            refresh_token,
        };
        let request = HttpRequest::new(HttpMethod::Post, self.token_url.clone())
            .basic_auth(&self.client_id, &self.client_secret)
            .form(&form)
            .map_err(|e| AuthError::Other(format!("Failed to encode refresh request: {}", e)))?;

        debug!("Refreshing access token");

        let response = self.http_client.execute(request).await?;

        if !response.is_success() {
            let message = provider_message(&response);
            warn!(status = response.status, error = %message, "Token refresh rejected");
            return Err(AuthError::TokenRefreshFailed(format!(
                "Token endpoint returned {}: {}",
                response.status, message
            )));
        }

        let refreshed: RefreshResponse = response.json().map_err(|e| {
            AuthError::TokenRefreshFailed(format!("Failed to parse token response: {}", e))
        })?;

        debug!(expires_in = refreshed.expires_in, "Access token refreshed");

        Ok(TokenTriple {
            access_token: refreshed.access_token,
            refresh_token: refreshed
                .refresh_token
                .unwrap_or_else(|| refresh_token.to_string()),
            expires_in_seconds: refreshed.expires_in,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use mockall::mock;

    mock! {
        HttpClient {}

        #[async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
        }
    }

    fn client(mock: MockHttpClient) -> SpotifyAccountsClient {
        SpotifyAccountsClient::new(Arc::new(mock), "test_client", "test_secret")
            .with_endpoints("https://accounts.test/api/token", "https://api.test/v1/")
    }

    #[tokio::test]
    async fn test_current_user_parses_profile() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute()
            .withf(|req| {
                req.method == HttpMethod::Get
                    && req.url == "https://api.test/v1/me"
                    && req.headers.get("Authorization").map(String::as_str) == Some("Bearer AT1")
            })
            .times(1)
            .returning(|_| {
                Ok(HttpResponse::new(
                    200,
                    r#"{"id":"u1","display_name":"Demo","email":"demo@example.com",
                        "images":[{"url":"https://i.test/a.jpg","height":300,"width":300}]}"#,
                ))
            });

        let profile = client(mock).current_user("AT1").await.unwrap();

        assert_eq!(profile.id, "u1");
        assert_eq!(profile.display_name.as_deref(), Some("Demo"));
        assert_eq!(profile.avatar_urls, vec!["https://i.test/a.jpg".to_string()]);
    }

    #[tokio::test]
    async fn test_current_user_unauthorized() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute().times(1).returning(|_| {
            Ok(HttpResponse::new(
                401,
                r#"{"error":{"status":401,"message":"The access token expired"}}"#,
            ))
        });

        let err = client(mock).current_user("stale").await.unwrap_err();

        assert!(err.is_unauthorized());
        assert!(err.to_string().contains("The access token expired"));
    }

    #[tokio::test]
    async fn test_current_user_server_error() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute()
            .times(1)
            .returning(|_| Ok(HttpResponse::new(503, "")));

        let err = client(mock).current_user("AT1").await.unwrap_err();

        assert!(matches!(err, AuthError::ProfileFetch { status: 503, .. }));
        assert!(!err.is_unauthorized());
    }

    #[tokio::test]
    async fn test_current_user_network_failure() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute()
            .times(1)
            .returning(|_| Err(BridgeError::Unreachable("connection refused".to_string())));

        let err = client(mock).current_user("AT1").await.unwrap_err();

        assert!(matches!(err, AuthError::Network(_)));
    }

    #[tokio::test]
    async fn test_refresh_sends_basic_auth_and_form() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute()
            .withf(|req| {
                // base64("test_client:test_secret")
                req.method == HttpMethod::Post
                    && req.url == "https://accounts.test/api/token"
                    && req.headers.get("Authorization").map(String::as_str)
                        == Some("Basic dGVzdF9jbGllbnQ6dGVzdF9zZWNyZXQ=")
                    && req.body_text()
                        == Some("grant_type=refresh_token&refresh_token=RT1")
            })
            .times(1)
            .returning(|_| {
                Ok(HttpResponse::new(
                    200,
                    r#"{"access_token":"AT2","token_type":"Bearer","expires_in":3600}"#,
                ))
            });

        let tokens = client(mock).refresh_access_token("RT1").await.unwrap();

        assert_eq!(tokens.access_token, "AT2");
        assert_eq!(tokens.refresh_token, "RT1");
        assert_eq!(tokens.expires_in_seconds, 3600);
    }

    #[tokio::test]
    async fn test_refresh_keeps_rotated_token() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute().times(1).returning(|_| {
            Ok(HttpResponse::new(
                200,
                r#"{"access_token":"AT2","refresh_token":"RT2","expires_in":1800}"#,
            ))
        });

        let tokens = client(mock).refresh_access_token("RT1").await.unwrap();

        assert_eq!(tokens.refresh_token, "RT2");
        assert_eq!(tokens.expires_in_seconds, 1800);
    }

    #[tokio::test]
    async fn test_refresh_rejected() {
        let mut mock = MockHttpClient::new();
        mock.expect_execute().times(1).returning(|_| {
            Ok(HttpResponse::new(
                400,
                r#"{"error":"invalid_grant","error_description":"Refresh token revoked"}"#,
            ))
        });

        let err = client(mock).refresh_access_token("RT1").await.unwrap_err();

        assert!(matches!(err, AuthError::TokenRefreshFailed(_)));
        assert!(err.to_string().contains("Refresh token revoked"));
    }

    #[test]
    fn test_api_url_keeps_base_path() {
        for base in ["https://api.test/v1", "https://api.test/v1/"] {
            let client = SpotifyAccountsClient::new(Arc::new(MockHttpClient::new()), "id", "secret")
                .with_endpoints(DEFAULT_TOKEN_URL, base);
            assert_eq!(client.api_url("me").unwrap().as_str(), "https://api.test/v1/me");
        }
    }

    #[tokio::test]
    async fn test_invalid_api_base_is_configuration_error() {
        // No expectations: any request would fail the test
        let client = SpotifyAccountsClient::new(Arc::new(MockHttpClient::new()), "id", "secret")
            .with_endpoints(DEFAULT_TOKEN_URL, "http://exa mple");

        let err = client.current_user("AT1").await.unwrap_err();

        assert!(matches!(err, AuthError::Configuration(_)));
    }

    #[test]
    fn test_from_config_requires_client_credentials() {
        let config = SpotifyConfig::builder()
            .client_id("id")
            .http_client(Arc::new(MockHttpClient::new()))
            .build()
            .unwrap();

        assert!(matches!(
            SpotifyAccountsClient::from_config(&config),
            Err(AuthError::Configuration(_))
        ));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let debug = format!("{:?}", client(MockHttpClient::new()));
        assert!(!debug.contains("test_secret"));
        assert!(debug.contains("test_client"));
    }
}
