// ABOUTME: HTTP request handlers for social platform connections
// ABOUTME: Endpoints for initiating, completing, listing, refreshing, and removing connections

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use tracing::info;

use crosspost_connections::{CallbackParams, Connection, Provider};

use crate::{
    auth::CurrentUser,
    error::{ApiResult, AppError},
    AppState,
};

/// Generic success envelope
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

pub fn ok<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        success: true,
        data,
    })
}

/// Connection record as exposed to the dashboard. Token material never
/// leaves the server.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionView {
    pub id: String,
    pub provider: String,
    pub provider_name: String,
    pub provider_id: String,
    pub expires_at: i64,
    pub expired: bool,
    pub metadata: serde_json::Value,
    pub created_at: i64,
    pub updated_at: i64,
}

impl From<Connection> for ConnectionView {
    fn from(c: Connection) -> Self {
        let expired = c.is_expired();
        Self {
            id: c.id,
            provider: c.provider,
            provider_name: c.provider_name,
            provider_id: c.provider_id,
            expires_at: c.expires_at,
            expired,
            metadata: c.metadata,
            created_at: c.created_at,
            updated_at: c.updated_at,
        }
    }
}

/// Response for the connect endpoint
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectResponse {
    pub provider: String,
    pub authorization_url: String,
}

/// Response for a completed callback: the new record plus where the
/// callback page should navigate next
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackResponse {
    pub connection: ConnectionView,
    pub redirect_to: String,
}

/// Catalog entry for a supported platform
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderView {
    pub id: String,
    pub name: String,
    pub scopes: Vec<String>,
    pub configured: bool,
}

/// List supported platforms and whether credentials are configured
pub async fn list_providers(State(state): State<AppState>) -> Json<ApiResponse<Vec<ProviderView>>> {
    let providers = Provider::all()
        .into_iter()
        .map(|p| ProviderView {
            id: p.to_string(),
            name: p.display_name().to_string(),
            scopes: p.scopes().iter().map(|s| s.to_string()).collect(),
            configured: state.manager.is_configured(p),
        })
        .collect();

    ok(providers)
}

/// Initiate the connect flow for a platform
pub async fn connect(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    user: CurrentUser,
) -> ApiResult<Json<ApiResponse<ConnectResponse>>> {
    let user = user.require()?;
    let provider: Provider = provider.parse().map_err(AppError::Connection)?;

    info!("User {} initiating {} connection", user.id, provider);

    let authorization_url = state.manager.begin(&user.id, provider).await?;
    Ok(ok(ConnectResponse {
        provider: provider.to_string(),
        authorization_url,
    }))
}

/// Complete the connect flow from callback parameters relayed by the
/// dashboard's callback page
pub async fn callback(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    user: CurrentUser,
    Json(params): Json<CallbackParams>,
) -> ApiResult<Json<ApiResponse<CallbackResponse>>> {
    let provider: Provider = provider.parse().map_err(AppError::Connection)?;
    let user_id = user.0.map(|u| u.id);

    let connection = state
        .manager
        .complete(provider, user_id.as_deref(), params)
        .await?;

    Ok(ok(CallbackResponse {
        connection: connection.into(),
        redirect_to: "/connections".to_string(),
    }))
}

/// List the current user's connections. Anonymous requests see an empty
/// list rather than an error.
pub async fn list_connections(
    State(state): State<AppState>,
    user: CurrentUser,
) -> ApiResult<Json<ApiResponse<Vec<ConnectionView>>>> {
    let connections = match user.0 {
        Some(user) => state
            .manager
            .list(&user.id)
            .await?
            .into_iter()
            .map(ConnectionView::from)
            .collect(),
        None => Vec::new(),
    };

    Ok(ok(connections))
}

/// Refresh an expired access token for one connection
pub async fn refresh_connection(
    State(state): State<AppState>,
    Path(id): Path<String>,
    user: CurrentUser,
) -> ApiResult<Json<ApiResponse<ConnectionView>>> {
    let user = user.require()?;
    let connection = state.manager.refresh(&user.id, &id).await?;
    Ok(ok(connection.into()))
}

/// Remove one connection
pub async fn disconnect(
    State(state): State<AppState>,
    Path(id): Path<String>,
    user: CurrentUser,
) -> ApiResult<Json<ApiResponse<serde_json::Value>>> {
    let user = user.require()?;

    if !state.manager.disconnect(&user.id, &id).await? {
        return Err(AppError::NotFound);
    }

    Ok(ok(serde_json::json!({ "message": "Disconnected" })))
}
