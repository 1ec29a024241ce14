// ABOUTME: Error taxonomy for the OAuth connection handshake
// ABOUTME: Each variant maps to one distinguishable user-facing failure

use thiserror::Error;

pub type ConnectionResult<T> = Result<T, ConnectionError>;

#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("Provider denied the authorization request: {0}")]
    ProviderDenied(String),

    #[error("Callback is missing the authorization code or state parameter")]
    MalformedCallback,

    #[error("State mismatch: anti-forgery check failed")]
    StateMismatch,

    #[error("Token exchange failed: {0}")]
    TokenExchange(String),

    #[error("No account found for the authorized identity")]
    NoAccountFound,

    #[error("Profile fetch failed: {0}")]
    ProfileFetch(String),

    #[error("No authenticated user")]
    Unauthenticated,

    #[error("Failed to persist connection: {0}")]
    Persistence(String),

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("Connection not found: {0}")]
    NotFound(String),

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
