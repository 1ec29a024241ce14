// ABOUTME: Core type definitions for social platform connections
// ABOUTME: Connection records, pending authorizations, and provider wire formats

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// A connected external account owned by one application user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    pub id: String,
    pub user_id: String,
    /// Canonical lowercase provider key, e.g. "youtube"
    pub provider: String,
    /// Human label, e.g. "YouTube"
    pub provider_name: String,
    /// External account identity, e.g. the channel id
    pub provider_id: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Unix timestamp; the access token is expired once past this
    pub expires_at: i64,
    /// Provider-specific details: display name, thumbnail, counts
    pub metadata: serde_json::Value,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Connection {
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now().timestamp()
    }
}

/// An outstanding OAuth handshake, recorded at initiation and consumed
/// exactly once at callback time.
#[derive(Debug, Clone)]
pub struct PendingAuthorization {
    pub state: String,
    pub user_id: String,
    pub provider: String,
    pub created_at: i64,
}

impl PendingAuthorization {
    pub fn is_expired(&self, ttl_secs: i64) -> bool {
        self.created_at + ttl_secs <= Utc::now().timestamp()
    }
}

/// Query parameters the provider sends back to the callback route.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// Token exchange request body (form-encoded).
#[derive(Debug, Serialize)]
pub(crate) struct TokenExchangeRequest<'a> {
    pub code: &'a str,
    pub client_id: &'a str,
    pub client_secret: &'a str,
    pub redirect_uri: &'a str,
    pub grant_type: &'a str,
}

/// Token refresh request body (form-encoded).
#[derive(Debug, Serialize)]
pub(crate) struct RefreshTokenRequest<'a> {
    pub refresh_token: &'a str,
    pub client_id: &'a str,
    pub client_secret: &'a str,
    pub grant_type: &'a str,
}

/// Token endpoint response.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Seconds until the access token expires
    #[serde(default)]
    pub expires_in: i64,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
}

/// YouTube channels.list response ("my channel" lookup).
#[derive(Debug, Deserialize)]
pub struct ChannelListResponse {
    #[serde(default)]
    pub items: Vec<Channel>,
}

#[derive(Debug, Deserialize)]
pub struct Channel {
    pub id: String,
    pub snippet: Option<ChannelSnippet>,
    pub statistics: Option<ChannelStatistics>,
}

#[derive(Debug, Deserialize)]
pub struct ChannelSnippet {
    pub title: Option<String>,
    pub thumbnails: Option<Thumbnails>,
}

#[derive(Debug, Deserialize)]
pub struct Thumbnails {
    pub default: Option<Thumbnail>,
}

#[derive(Debug, Deserialize)]
pub struct Thumbnail {
    pub url: Option<String>,
}

/// YouTube statistics are serialized as strings by the API.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelStatistics {
    pub subscriber_count: Option<String>,
    pub video_count: Option<String>,
    pub view_count: Option<String>,
}

impl Channel {
    pub fn title(&self) -> &str {
        self.snippet
            .as_ref()
            .and_then(|s| s.title.as_deref())
            .unwrap_or("YouTube Channel")
    }

    pub fn thumbnail_url(&self) -> Option<&str> {
        self.snippet
            .as_ref()
            .and_then(|s| s.thumbnails.as_ref())
            .and_then(|t| t.default.as_ref())
            .and_then(|d| d.url.as_deref())
    }

    /// Build the metadata blob persisted with the connection record.
    pub fn metadata(&self) -> serde_json::Value {
        let stats = self.statistics.as_ref();
        serde_json::json!({
            "channel_id": self.id,
            "channel_title": self.title(),
            "channel_thumbnail": self.thumbnail_url(),
            "subscriber_count": stats.and_then(|s| s.subscriber_count.as_deref()),
            "video_count": stats.and_then(|s| s.video_count.as_deref()),
            "view_count": stats.and_then(|s| s.view_count.as_deref()),
            "connected_at": Utc::now().to_rfc3339(),
        })
    }
}
