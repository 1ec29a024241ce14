// ABOUTME: Social platform provider definitions and OAuth endpoint configuration
// ABOUTME: Adding a platform means adding a variant and its match arms

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{ConnectionError, ConnectionResult};

/// Supported social platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    YouTube,
}

impl Provider {
    /// Authorization (consent screen) endpoint for this provider
    pub fn auth_url(&self) -> &str {
        match self {
            Self::YouTube => "https://accounts.google.com/o/oauth2/v2/auth",
        }
    }

    /// Token exchange endpoint for this provider
    pub fn token_url(&self) -> &str {
        match self {
            Self::YouTube => "https://oauth2.googleapis.com/token",
        }
    }

    /// "My account" profile endpoint for this provider
    pub fn profile_url(&self) -> &str {
        match self {
            Self::YouTube => "https://www.googleapis.com/youtube/v3/channels",
        }
    }

    /// Permission scopes requested at consent time
    pub fn scopes(&self) -> &[&str] {
        match self {
            Self::YouTube => &[
                "https://www.googleapis.com/auth/youtube.upload",
                "https://www.googleapis.com/auth/youtube",
                "https://www.googleapis.com/auth/youtube.readonly",
            ],
        }
    }

    /// Human-readable platform label
    pub fn display_name(&self) -> &str {
        match self {
            Self::YouTube => "YouTube",
        }
    }

    /// Environment variable prefix for this provider's credentials
    fn env_prefix(&self) -> &str {
        match self {
            Self::YouTube => "YOUTUBE",
        }
    }

    /// All supported providers
    pub fn all() -> Vec<Self> {
        vec![Self::YouTube]
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::YouTube => write!(f, "youtube"),
        }
    }
}

impl FromStr for Provider {
    type Err = ConnectionError;

    fn from_str(s: &str) -> ConnectionResult<Self> {
        match s.to_lowercase().as_str() {
            "youtube" => Ok(Self::YouTube),
            _ => Err(ConnectionError::UnknownProvider(s.to_string())),
        }
    }
}

impl TryFrom<&str> for Provider {
    type Error = ConnectionError;

    fn try_from(s: &str) -> ConnectionResult<Self> {
        s.parse()
    }
}

/// Resolved OAuth configuration for one provider. Endpoint URLs default to
/// the provider's real endpoints but stay overridable for tests.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub provider: Provider,
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    /// Optional data-API key appended to profile requests
    pub api_key: Option<String>,
    pub auth_url: String,
    pub token_url: String,
    pub profile_url: String,
    pub scopes: Vec<String>,
}

impl ProviderConfig {
    pub fn new(provider: Provider, client_id: String, client_secret: String) -> Self {
        Self {
            provider,
            client_id,
            client_secret,
            redirect_uri: default_redirect_uri(),
            api_key: None,
            auth_url: provider.auth_url().to_string(),
            token_url: provider.token_url().to_string(),
            profile_url: provider.profile_url().to_string(),
            scopes: provider.scopes().iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Load credentials from `<PREFIX>_CLIENT_ID` / `<PREFIX>_CLIENT_SECRET`
    /// environment variables. The client secret never leaves this process.
    pub fn from_env(provider: Provider) -> ConnectionResult<Self> {
        let prefix = provider.env_prefix();

        let client_id = require_env(&format!("{}_CLIENT_ID", prefix))?;
        let client_secret = require_env(&format!("{}_CLIENT_SECRET", prefix))?;

        let mut config = Self::new(provider, client_id, client_secret);
        if let Ok(uri) = std::env::var(format!("{}_REDIRECT_URI", prefix)) {
            config.redirect_uri = uri;
        }
        config.api_key = std::env::var(format!("{}_API_KEY", prefix)).ok();

        Ok(config)
    }
}

fn default_redirect_uri() -> String {
    let origin = std::env::var("DASHBOARD_ORIGIN")
        .unwrap_or_else(|_| "http://localhost:5173".to_string());
    format!("{}/connections/callback", origin)
}

fn require_env(name: &str) -> ConnectionResult<String> {
    std::env::var(name)
        .map_err(|_| ConnectionError::Configuration(format!("{} is not set", name)))
}
