// ABOUTME: Connection manager orchestrating the OAuth handshake end to end
// ABOUTME: Handles initiation, callback completion, refresh, list, and disconnect

use std::collections::HashMap;

use chrono::Utc;
use rand::{distributions::Alphanumeric, Rng};
use reqwest::Client;
use sqlx::SqlitePool;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    error::{ConnectionError, ConnectionResult},
    provider::{Provider, ProviderConfig},
    storage::ConnectionStorage,
    types::{
        CallbackParams, Channel, ChannelListResponse, Connection, PendingAuthorization,
        RefreshTokenRequest, TokenExchangeRequest, TokenResponse,
    },
};

/// How long an initiated handshake stays valid before its state token is
/// rejected and purged.
pub const PENDING_TTL_SECS: i64 = 10 * 60;

/// Length of the anti-forgery state token.
const STATE_TOKEN_LEN: usize = 32;

pub struct ConnectionManager {
    storage: ConnectionStorage,
    client: Client,
    configs: HashMap<Provider, ProviderConfig>,
}

impl ConnectionManager {
    pub fn new(pool: SqlitePool, configs: impl IntoIterator<Item = ProviderConfig>) -> Self {
        Self {
            storage: ConnectionStorage::new(pool),
            client: Client::new(),
            configs: configs.into_iter().map(|c| (c.provider, c)).collect(),
        }
    }

    /// Build a manager from environment credentials. Providers without
    /// credentials are skipped with a warning and rejected at request time.
    pub fn from_env(pool: SqlitePool) -> Self {
        let mut configs = Vec::new();
        for provider in Provider::all() {
            match ProviderConfig::from_env(provider) {
                Ok(config) => configs.push(config),
                Err(e) => warn!("Provider {} is not configured: {}", provider, e),
            }
        }
        Self::new(pool, configs)
    }

    /// Whether credentials are configured for a provider.
    pub fn is_configured(&self, provider: Provider) -> bool {
        self.configs.contains_key(&provider)
    }

    fn config_for(&self, provider: Provider) -> ConnectionResult<&ProviderConfig> {
        self.configs.get(&provider).ok_or_else(|| {
            ConnectionError::Configuration(format!("Provider {} is not configured", provider))
        })
    }

    /// Begin the authorization-code flow: record a pending authorization and
    /// return the consent-screen URL the dashboard should navigate to.
    /// Nothing here talks to the provider; failures surface after redirect.
    pub async fn begin(&self, user_id: &str, provider: Provider) -> ConnectionResult<String> {
        let config = self.config_for(provider)?;

        self.storage.purge_expired_pending(PENDING_TTL_SECS).await?;

        let state = generate_state_token();
        let pending = PendingAuthorization {
            state: state.clone(),
            user_id: user_id.to_string(),
            provider: provider.to_string(),
            created_at: Utc::now().timestamp(),
        };
        self.storage.put_pending(&pending).await?;

        let auth_url = build_auth_url(config, &state)?;
        info!("Initiated {} connection for user {}", provider, user_id);
        Ok(auth_url)
    }

    /// Complete the handshake from the callback parameters.
    ///
    /// Validation order is fixed: provider error, malformed callback, state
    /// check, token exchange, profile fetch, identity binding, persistence.
    /// The pending row is consumed at the state check regardless of what
    /// happens afterwards.
    pub async fn complete(
        &self,
        provider: Provider,
        current_user: Option<&str>,
        params: CallbackParams,
    ) -> ConnectionResult<Connection> {
        if let Some(error) = params.error.filter(|e| !e.is_empty()) {
            return Err(ConnectionError::ProviderDenied(error));
        }

        let (code, state) = match (params.code, params.state) {
            (Some(code), Some(state)) if !code.is_empty() && !state.is_empty() => (code, state),
            _ => return Err(ConnectionError::MalformedCallback),
        };

        let pending = self
            .storage
            .take_pending(&state)
            .await?
            .ok_or(ConnectionError::StateMismatch)?;
        if pending.is_expired(PENDING_TTL_SECS) || pending.provider != provider.to_string() {
            return Err(ConnectionError::StateMismatch);
        }

        let config = self.config_for(provider)?;

        let token = self.exchange_code(config, &code).await?;
        let channel = self.fetch_profile(config, &token.access_token).await?;

        let user_id = current_user.ok_or(ConnectionError::Unauthenticated)?;
        if user_id != pending.user_id {
            return Err(ConnectionError::StateMismatch);
        }

        let now = Utc::now().timestamp();
        let connection = Connection {
            id: nanoid::nanoid!(),
            user_id: user_id.to_string(),
            provider: provider.to_string(),
            provider_name: provider.display_name().to_string(),
            provider_id: channel.id.clone(),
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at: now + token.expires_in,
            metadata: channel.metadata(),
            created_at: now,
            updated_at: now,
        };

        self.storage
            .store_connection(&connection)
            .await
            .map_err(|e| ConnectionError::Persistence(e.to_string()))?;

        info!(
            "Connected {} account {} for user {}",
            provider, connection.provider_id, user_id
        );
        Ok(connection)
    }

    /// Manually refresh an expired access token using the stored refresh
    /// token. The provider may omit the refresh token in its response, in
    /// which case the existing one is kept.
    pub async fn refresh(
        &self,
        user_id: &str,
        connection_id: &str,
    ) -> ConnectionResult<Connection> {
        let mut connection = self
            .storage
            .get_connection(user_id, connection_id)
            .await?
            .ok_or_else(|| ConnectionError::NotFound(connection_id.to_string()))?;

        let provider: Provider = connection.provider.parse()?;
        let config = self.config_for(provider)?;

        let refresh_token = connection.refresh_token.clone().ok_or_else(|| {
            ConnectionError::TokenExchange("No refresh token available".to_string())
        })?;

        debug!("Refreshing {} token for user {}", provider, user_id);

        let request = RefreshTokenRequest {
            refresh_token: &refresh_token,
            client_id: &config.client_id,
            client_secret: &config.client_secret,
            grant_type: "refresh_token",
        };

        let response = self
            .client
            .post(&config.token_url)
            .form(&request)
            .send()
            .await
            .map_err(|e| ConnectionError::TokenExchange(e.to_string()))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ConnectionError::TokenExchange(error_text));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| ConnectionError::TokenExchange(e.to_string()))?;
        if token.access_token.is_empty() {
            return Err(ConnectionError::TokenExchange(
                "No access token in response".to_string(),
            ));
        }

        connection.access_token = token.access_token;
        connection.refresh_token = token.refresh_token.or(Some(refresh_token));
        connection.expires_at = Utc::now().timestamp() + token.expires_in;

        self.storage
            .update_tokens(
                &connection.id,
                &connection.access_token,
                connection.refresh_token.as_deref(),
                connection.expires_at,
            )
            .await
            .map_err(|e| ConnectionError::Persistence(e.to_string()))?;

        info!("Refreshed {} token for user {}", provider, user_id);
        Ok(connection)
    }

    /// All connections owned by a user; empty when none exist.
    pub async fn list(&self, user_id: &str) -> ConnectionResult<Vec<Connection>> {
        self.storage.list_connections(user_id).await
    }

    /// Delete one connection. Returns whether a record was removed; nothing
    /// else is cascaded.
    pub async fn disconnect(&self, user_id: &str, connection_id: &str) -> ConnectionResult<bool> {
        let removed = self.storage.delete_connection(user_id, connection_id).await?;
        if removed {
            info!("Disconnected connection {} for user {}", connection_id, user_id);
        }
        Ok(removed)
    }

    /// Exchange the authorization code for tokens (server-to-server).
    async fn exchange_code(
        &self,
        config: &ProviderConfig,
        code: &str,
    ) -> ConnectionResult<TokenResponse> {
        let request = TokenExchangeRequest {
            code,
            client_id: &config.client_id,
            client_secret: &config.client_secret,
            redirect_uri: &config.redirect_uri,
            grant_type: "authorization_code",
        };

        let response = self
            .client
            .post(&config.token_url)
            .form(&request)
            .send()
            .await
            .map_err(|e| ConnectionError::TokenExchange(e.to_string()))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ConnectionError::TokenExchange(error_text));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| ConnectionError::TokenExchange(e.to_string()))?;
        if token.access_token.is_empty() {
            return Err(ConnectionError::TokenExchange(
                "No access token in response".to_string(),
            ));
        }

        Ok(token)
    }

    /// Fetch the authorized account's channel using the fresh access token.
    async fn fetch_profile(
        &self,
        config: &ProviderConfig,
        access_token: &str,
    ) -> ConnectionResult<Channel> {
        let mut query = vec![
            ("part", "snippet,contentDetails,statistics"),
            ("mine", "true"),
        ];
        if let Some(key) = config.api_key.as_deref() {
            query.push(("key", key));
        }

        let response = self
            .client
            .get(&config.profile_url)
            .query(&query)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| ConnectionError::ProfileFetch(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(ConnectionError::ProfileFetch(format!(
                "Profile request failed with status {}",
                status
            )));
        }

        let channels: ChannelListResponse = response
            .json()
            .await
            .map_err(|e| ConnectionError::ProfileFetch(e.to_string()))?;

        channels
            .items
            .into_iter()
            .next()
            .ok_or(ConnectionError::NoAccountFound)
    }
}

/// Random alphanumeric anti-forgery token, unique per initiation.
fn generate_state_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(STATE_TOKEN_LEN)
        .map(char::from)
        .collect()
}

/// Build the consent-screen URL: authorization code flow with offline
/// access and forced re-consent, so a refresh token is always issued.
fn build_auth_url(config: &ProviderConfig, state: &str) -> ConnectionResult<String> {
    let mut url = Url::parse(&config.auth_url)
        .map_err(|e| ConnectionError::Configuration(format!("Invalid auth URL: {}", e)))?;

    url.query_pairs_mut()
        .append_pair("client_id", &config.client_id)
        .append_pair("redirect_uri", &config.redirect_uri)
        .append_pair("response_type", "code")
        .append_pair("scope", &config.scopes.join(" "))
        .append_pair("state", state)
        .append_pair("access_type", "offline")
        .append_pair("prompt", "consent");

    Ok(url.to_string())
}
