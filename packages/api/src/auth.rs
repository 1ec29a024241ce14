// ABOUTME: Authentication context for API requests
// ABOUTME: Resolves the bearer session token into the current user

use std::convert::Infallible;

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use tracing::warn;

use crosspost_storage::User;

use crate::AppState;

/// Current authenticated user, if the request carried a valid session.
///
/// Extraction never rejects; handlers decide whether anonymous access is
/// acceptable for their route.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Option<User>);

impl CurrentUser {
    pub fn require(self) -> Result<User, crate::error::AppError> {
        self.0.ok_or(crate::error::AppError::Unauthenticated)
    }
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .filter(|t| !t.is_empty());

        let user = match token {
            Some(token) => match state.users.verify_session(token).await {
                Ok(user) => user,
                Err(e) => {
                    // Storage trouble degrades to anonymous, but is logged
                    warn!("Session verification failed: {}", e);
                    None
                }
            },
            None => None,
        };

        Ok(Self(user))
    }
}
