// ABOUTME: Application error type and structured JSON error responses
// ABOUTME: Maps domain errors to HTTP statuses and machine-readable codes

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;
use uuid::Uuid;

use crosspost_connections::ConnectionError;
use crosspost_storage::StorageError;

/// Main application error type that all handlers should return
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Connection error")]
    Connection(#[from] ConnectionError),

    #[error("Storage error")]
    Storage(#[from] StorageError),

    #[error("Authentication required")]
    Unauthenticated,

    #[error("Resource not found")]
    NotFound,

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

/// Structured error response format for API consistency
#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: ErrorDetail,
    request_id: String,
}

/// Error detail structure with machine-readable codes
#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
    /// Where the dashboard should land after showing the error
    #[serde(rename = "redirectTo", skip_serializing_if = "Option::is_none")]
    redirect_to: Option<String>,
}

impl AppError {
    /// Convert AppError to appropriate HTTP status code and error code
    fn to_status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Connection(e) => match e {
                ConnectionError::ProviderDenied(_) => (StatusCode::BAD_REQUEST, "PROVIDER_DENIED"),
                ConnectionError::MalformedCallback => {
                    (StatusCode::BAD_REQUEST, "MALFORMED_CALLBACK")
                }
                ConnectionError::StateMismatch => (StatusCode::BAD_REQUEST, "STATE_MISMATCH"),
                ConnectionError::TokenExchange(_) => {
                    (StatusCode::BAD_GATEWAY, "TOKEN_EXCHANGE_FAILED")
                }
                ConnectionError::NoAccountFound => (StatusCode::NOT_FOUND, "NO_ACCOUNT_FOUND"),
                ConnectionError::ProfileFetch(_) => {
                    (StatusCode::BAD_GATEWAY, "PROFILE_FETCH_FAILED")
                }
                ConnectionError::Unauthenticated => {
                    (StatusCode::UNAUTHORIZED, "UNAUTHENTICATED")
                }
                ConnectionError::Persistence(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "PERSISTENCE_FAILED")
                }
                ConnectionError::UnknownProvider(_) => {
                    (StatusCode::NOT_FOUND, "UNKNOWN_PROVIDER")
                }
                ConnectionError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                ConnectionError::Configuration(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "CONFIGURATION_ERROR")
                }
                ConnectionError::Database(_)
                | ConnectionError::Http(_)
                | ConnectionError::Json(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "UNEXPECTED_ERROR")
                }
            },
            AppError::Storage(e) => match e {
                StorageError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
            },
            AppError::Unauthenticated => (StatusCode::UNAUTHORIZED, "UNAUTHENTICATED"),
            AppError::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "UNEXPECTED_ERROR"),
        }
    }

    /// Get user-friendly error message (sanitized for external consumption)
    fn to_user_message(&self) -> String {
        match self {
            AppError::Connection(e) => match e {
                ConnectionError::ProviderDenied(reason) => {
                    format!("Authorization was denied: {}", reason)
                }
                ConnectionError::MalformedCallback => {
                    "The callback from the provider was incomplete".to_string()
                }
                ConnectionError::StateMismatch => {
                    "This connection attempt is no longer valid. Please try again".to_string()
                }
                ConnectionError::TokenExchange(_) => {
                    "Could not complete authorization with the provider".to_string()
                }
                ConnectionError::NoAccountFound => {
                    "No account was found for the authorized identity".to_string()
                }
                ConnectionError::ProfileFetch(_) => {
                    "Could not load the connected account's profile".to_string()
                }
                ConnectionError::Unauthenticated => "Authentication required".to_string(),
                ConnectionError::Persistence(_) => {
                    "Failed to save the connection".to_string()
                }
                ConnectionError::UnknownProvider(name) => {
                    format!("Unsupported platform: {}", name)
                }
                ConnectionError::NotFound(_) => "Connection not found".to_string(),
                ConnectionError::Configuration(_) => "Server configuration error".to_string(),
                ConnectionError::Database(_)
                | ConnectionError::Http(_)
                | ConnectionError::Json(_) => "An unexpected error occurred".to_string(),
            },
            AppError::Storage(StorageError::NotFound(resource)) => {
                format!("{} not found", resource)
            }
            AppError::Storage(_) => "Data storage error".to_string(),
            AppError::Unauthenticated => "Authentication required".to_string(),
            AppError::NotFound => "The requested resource was not found".to_string(),
            AppError::Internal(_) => "An internal server error occurred".to_string(),
        }
    }

    /// Connection-flow failures send the dashboard back to the connections
    /// page. Every `ConnectionError` carries the redirect so the callback
    /// page always has somewhere to route after showing the notification.
    fn redirect_to(&self) -> Option<String> {
        match self {
            AppError::Connection(_) => Some("/connections".to_string()),
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let request_id = Uuid::new_v4().to_string();
        let (status_code, error_code) = self.to_status_and_code();
        let user_message = self.to_user_message();

        // Log server-side failures with full context but don't expose details
        if status_code.is_server_error() {
            error!(
                request_id = %request_id,
                error = %self,
                error_code = %error_code,
                "API error response"
            );
        } else {
            tracing::info!(
                request_id = %request_id,
                error_code = %error_code,
                error = %self,
                "API error response"
            );
        }

        let error_response = ErrorResponse {
            success: false,
            error: ErrorDetail {
                code: error_code.to_string(),
                message: user_message,
                redirect_to: self.redirect_to(),
            },
            request_id,
        };

        let mut response = Json(error_response).into_response();
        *response.status_mut() = status_code;
        response
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, AppError>;
