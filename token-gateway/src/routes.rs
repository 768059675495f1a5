use crate::error::Result;
use crate::exchange::{TokenGateway, TokenResponse};
use axum::{
    extract::{rejection::JsonRejection, State},
    response::Json,
    routing::post,
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::warn;

pub const TOKEN_ROUTE: &str = "/api/spotify/token";

#[derive(Debug, Deserialize)]
pub struct ExchangeRequest {
    #[serde(default)]
    pub code: Option<String>,
}

/// Router exposing `POST /api/spotify/token`.
pub fn router(gateway: Arc<TokenGateway>) -> Router {
    Router::new()
        .route(TOKEN_ROUTE, post(exchange_token))
        .with_state(gateway)
}

async fn exchange_token(
    State(gateway): State<Arc<TokenGateway>>,
    payload: std::result::Result<Json<ExchangeRequest>, JsonRejection>,
) -> Result<Json<TokenResponse>> {
    // Unreadable bodies are treated as a missing code
    let code = match payload {
        Ok(Json(request)) => request.code.unwrap_or_default(),
        Err(rejection) => {
            warn!(error = %rejection, "Unreadable token request body");
            String::new()
        }
    };

    let tokens = gateway.exchange_code(&code).await?;
    Ok(Json(tokens))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
    use core_runtime::config::SpotifyConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    /// Answers every request with a fixed status and body.
    struct FixedResponse {
        status: u16,
        body: &'static str,
        calls: AtomicUsize,
    }

    impl FixedResponse {
        fn new(status: u16, body: &'static str) -> Arc<Self> {
            Arc::new(Self {
                status,
                body,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl HttpClient for FixedResponse {
        async fn execute(&self, _request: HttpRequest) -> BridgeResult<HttpResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.status == 0 {
                return Err(BridgeError::Unreachable("connection refused".to_string()));
            }
            Ok(HttpResponse::new(self.status, self.body))
        }
    }

    fn app(http: Arc<FixedResponse>, configured: bool) -> Router {
        let builder = SpotifyConfig::builder().token_url("https://accounts.test/api/token");
        let builder = if configured {
            builder
                .client_id("id")
                .client_secret("secret")
                .redirect_uri("http://localhost:3000/callback")
        } else {
            builder
        };
        let gateway = TokenGateway::new(builder.build().unwrap(), http);
        router(Arc::new(gateway))
    }

    fn post_json(body: &'static str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(TOKEN_ROUTE)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    async fn read_json(response: axum::response::Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_success_returns_provider_json() {
        let http = FixedResponse::new(
            200,
            r#"{"access_token":"AT1","token_type":"Bearer","expires_in":3600,"refresh_token":"RT1","scope":"user-read-email"}"#,
        );

        let response = app(http.clone(), true)
            .oneshot(post_json(r#"{"code":"abc123"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = read_json(response).await;
        assert_eq!(json["access_token"], "AT1");
        assert_eq!(json["refresh_token"], "RT1");
        assert_eq!(json["expires_in"], 3600);
        assert_eq!(json["scope"], "user-read-email");
        assert_eq!(http.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_code() {
        let http = FixedResponse::new(200, "{}");

        for body in [r#"{}"#, r#"{"code":""}"#, "not json"] {
            let response = app(http.clone(), true)
                .oneshot(post_json(body))
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
            let json = read_json(response).await;
            assert_eq!(json["message"], "No authorization code provided");
        }
        assert_eq!(http.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_configuration() {
        let http = FixedResponse::new(200, "{}");

        let response = app(http.clone(), false)
            .oneshot(post_json(r#"{"code":"abc123"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = read_json(response).await;
        assert_eq!(json["message"], "Server configuration error");
        assert_eq!(http.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_provider_rejection() {
        let http = FixedResponse::new(
            400,
            r#"{"error":"invalid_grant","error_description":"Invalid authorization code"}"#,
        );

        let response = app(http, true)
            .oneshot(post_json(r#"{"code":"used"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = read_json(response).await;
        assert_eq!(
            json["message"],
            "Spotify API error: Invalid authorization code"
        );
    }

    #[tokio::test]
    async fn test_provider_unreachable() {
        let http = FixedResponse::new(0, "");

        let response = app(http.clone(), true)
            .oneshot(post_json(r#"{"code":"abc123"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = read_json(response).await;
        assert_eq!(json["message"], "Failed to exchange code for token");
        assert_eq!(http.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_get_not_allowed() {
        let response = app(FixedResponse::new(200, "{}"), true)
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri(TOKEN_ROUTE)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
