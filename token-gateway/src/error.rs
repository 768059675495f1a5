use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Message returned when the provider could not be reached.
pub const EXCHANGE_FAILED_MESSAGE: &str = "Failed to exchange code for token";

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Server configuration error")]
    Configuration,

    #[error("No authorization code provided")]
    MissingCode,

    #[error("Spotify API error: {0}")]
    InvalidCode(String),

    #[error("Token endpoint unreachable: {0}")]
    UpstreamUnavailable(String),

    #[error("Invalid token response: {0}")]
    InvalidResponse(String),
}

impl GatewayError {
    /// Message exposed to HTTP callers.
    pub fn client_message(&self) -> String {
        match self {
            GatewayError::UpstreamUnavailable(_) | GatewayError::InvalidResponse(_) => {
                EXCHANGE_FAILED_MESSAGE.to_string()
            }
            other => other.to_string(),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

/// Every exchange failure is reported as a 500 with `{ "message": ... }`.
impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            message: self.client_message(),
        };
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_messages() {
        assert_eq!(
            GatewayError::Configuration.client_message(),
            "Server configuration error"
        );
        assert_eq!(
            GatewayError::MissingCode.client_message(),
            "No authorization code provided"
        );
        assert_eq!(
            GatewayError::InvalidCode("Invalid authorization code".to_string()).client_message(),
            "Spotify API error: Invalid authorization code"
        );
        assert_eq!(
            GatewayError::UpstreamUnavailable("dns failure".to_string()).client_message(),
            EXCHANGE_FAILED_MESSAGE
        );
    }

    #[test]
    fn test_into_response_is_500() {
        let response = GatewayError::MissingCode.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
