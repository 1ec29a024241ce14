// ABOUTME: End-to-end handshake tests against a mock provider
// ABOUTME: Exercises initiation, callback validation order, refresh, and failures

use chrono::Utc;
use sqlx::SqlitePool;
use tempfile::TempDir;
use url::Url;
use wiremock::matchers::{body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crosspost_connections::{
    CallbackParams, Connection, ConnectionError, ConnectionManager, ConnectionStorage, Provider,
    ProviderConfig,
};
use crosspost_storage::{init_pool_at, NewUser, UserStorage};

async fn setup_test_db() -> (SqlitePool, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let pool = init_pool_at(temp_dir.path().join("test.db")).await.unwrap();
    (pool, temp_dir)
}

async fn seed_user(pool: &SqlitePool, email: &str) -> String {
    let users = UserStorage::new(pool.clone());
    users
        .create_user(NewUser {
            email: email.to_string(),
            name: "Test User".to_string(),
            avatar_url: None,
        })
        .await
        .unwrap()
        .id
}

/// Provider config with token and profile endpoints pointed at the mock.
fn mock_config(server: &MockServer) -> ProviderConfig {
    let mut config = ProviderConfig::new(
        Provider::YouTube,
        "test-client".to_string(),
        "test-secret".to_string(),
    );
    config.token_url = format!("{}/token", server.uri());
    config.profile_url = format!("{}/youtube/v3/channels", server.uri());
    config
}

fn state_from_auth_url(auth_url: &str) -> String {
    Url::parse(auth_url)
        .unwrap()
        .query_pairs()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v.to_string())
        .unwrap()
}

fn callback(code: &str, state: &str) -> CallbackParams {
    CallbackParams {
        code: Some(code.to_string()),
        state: Some(state.to_string()),
        error: None,
    }
}

fn token_body() -> serde_json::Value {
    serde_json::json!({
        "access_token": "fresh-access-token",
        "refresh_token": "fresh-refresh-token",
        "expires_in": 3600,
        "token_type": "Bearer"
    })
}

fn channel_body() -> serde_json::Value {
    serde_json::json!({
        "items": [{
            "id": "UC123",
            "snippet": {
                "title": "My Channel",
                "thumbnails": { "default": { "url": "https://yt.example/thumb.jpg" } }
            },
            "statistics": {
                "subscriberCount": "42",
                "videoCount": "7",
                "viewCount": "1234"
            }
        }]
    })
}

async fn mount_token_ok(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body()))
        .mount(server)
        .await;
}

async fn mount_profile_ok(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/youtube/v3/channels"))
        .and(query_param("mine", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(channel_body()))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_full_handshake_persists_connection() {
    let (pool, _temp_dir) = setup_test_db().await;
    let user = seed_user(&pool, "a@example.com").await;
    let server = MockServer::start().await;
    mount_token_ok(&server).await;
    mount_profile_ok(&server).await;

    let manager = ConnectionManager::new(pool, [mock_config(&server)]);

    let auth_url = manager.begin(&user, Provider::YouTube).await.unwrap();
    let state = state_from_auth_url(&auth_url);

    let before = Utc::now().timestamp();
    let connection = manager
        .complete(Provider::YouTube, Some(&user), callback("auth-code", &state))
        .await
        .unwrap();

    assert_eq!(connection.user_id, user);
    assert_eq!(connection.provider, "youtube");
    assert_eq!(connection.provider_name, "YouTube");
    assert_eq!(connection.provider_id, "UC123");
    assert_eq!(connection.access_token, "fresh-access-token");
    assert_eq!(connection.refresh_token.as_deref(), Some("fresh-refresh-token"));
    // expires_at derives from expires_in relative to now
    assert!(connection.expires_at >= before + 3600);
    assert!(connection.expires_at <= Utc::now().timestamp() + 3600);
    assert_eq!(connection.metadata["channel_title"], "My Channel");
    assert_eq!(connection.metadata["subscriber_count"], "42");

    let listed = manager.list(&user).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, connection.id);
}

#[tokio::test]
async fn test_unknown_state_blocks_token_exchange() {
    let (pool, _temp_dir) = setup_test_db().await;
    let user = seed_user(&pool, "b@example.com").await;
    let server = MockServer::start().await;

    // The token endpoint must never be contacted
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body()))
        .expect(0)
        .mount(&server)
        .await;

    let manager = ConnectionManager::new(pool, [mock_config(&server)]);
    manager.begin(&user, Provider::YouTube).await.unwrap();

    let err = manager
        .complete(Provider::YouTube, Some(&user), callback("auth-code", "forged-state"))
        .await
        .unwrap_err();
    assert!(matches!(err, ConnectionError::StateMismatch));
}

#[tokio::test]
async fn test_state_is_single_use_even_after_exchange_failure() {
    let (pool, _temp_dir) = setup_test_db().await;
    let user = seed_user(&pool, "c@example.com").await;
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_json(serde_json::json!({ "error": "invalid_grant" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let manager = ConnectionManager::new(pool, [mock_config(&server)]);
    let auth_url = manager.begin(&user, Provider::YouTube).await.unwrap();
    let state = state_from_auth_url(&auth_url);

    let err = manager
        .complete(Provider::YouTube, Some(&user), callback("bad-code", &state))
        .await
        .unwrap_err();
    assert!(matches!(err, ConnectionError::TokenExchange(ref body) if body.contains("invalid_grant")));

    // The pending row was consumed by the failed attempt; replaying the
    // same state never reaches the network again
    let err = manager
        .complete(Provider::YouTube, Some(&user), callback("bad-code", &state))
        .await
        .unwrap_err();
    assert!(matches!(err, ConnectionError::StateMismatch));
}

#[tokio::test]
async fn test_provider_error_takes_priority() {
    let (pool, _temp_dir) = setup_test_db().await;
    let user = seed_user(&pool, "d@example.com").await;
    let server = MockServer::start().await;

    let manager = ConnectionManager::new(pool, [mock_config(&server)]);
    let auth_url = manager.begin(&user, Provider::YouTube).await.unwrap();
    let state = state_from_auth_url(&auth_url);

    let params = CallbackParams {
        code: Some("auth-code".to_string()),
        state: Some(state),
        error: Some("access_denied".to_string()),
    };
    let err = manager
        .complete(Provider::YouTube, Some(&user), params)
        .await
        .unwrap_err();
    assert!(matches!(err, ConnectionError::ProviderDenied(ref e) if e == "access_denied"));
}

#[tokio::test]
async fn test_missing_code_is_malformed_callback() {
    let (pool, _temp_dir) = setup_test_db().await;
    let user = seed_user(&pool, "e@example.com").await;
    let server = MockServer::start().await;

    let manager = ConnectionManager::new(pool, [mock_config(&server)]);
    let auth_url = manager.begin(&user, Provider::YouTube).await.unwrap();
    let state = state_from_auth_url(&auth_url);

    let params = CallbackParams {
        code: None,
        state: Some(state),
        error: None,
    };
    let err = manager
        .complete(Provider::YouTube, Some(&user), params)
        .await
        .unwrap_err();
    assert!(matches!(err, ConnectionError::MalformedCallback));

    let params = CallbackParams {
        code: Some(String::new()),
        state: None,
        error: None,
    };
    let err = manager
        .complete(Provider::YouTube, Some(&user), params)
        .await
        .unwrap_err();
    assert!(matches!(err, ConnectionError::MalformedCallback));
}

#[tokio::test]
async fn test_expired_pending_is_rejected() {
    let (pool, _temp_dir) = setup_test_db().await;
    let user = seed_user(&pool, "f@example.com").await;
    let server = MockServer::start().await;

    // Plant a pending row well past the handshake TTL
    let storage = ConnectionStorage::new(pool.clone());
    storage
        .put_pending(&crosspost_connections::PendingAuthorization {
            state: "stale-state".to_string(),
            user_id: user.clone(),
            provider: "youtube".to_string(),
            created_at: Utc::now().timestamp() - 3600,
        })
        .await
        .unwrap();

    let manager = ConnectionManager::new(pool, [mock_config(&server)]);
    let err = manager
        .complete(Provider::YouTube, Some(&user), callback("auth-code", "stale-state"))
        .await
        .unwrap_err();
    assert!(matches!(err, ConnectionError::StateMismatch));
}

#[tokio::test]
async fn test_empty_channel_list_is_no_account() {
    let (pool, _temp_dir) = setup_test_db().await;
    let user = seed_user(&pool, "g@example.com").await;
    let server = MockServer::start().await;
    mount_token_ok(&server).await;

    Mock::given(method("GET"))
        .and(path("/youtube/v3/channels"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "items": [] })),
        )
        .mount(&server)
        .await;

    let manager = ConnectionManager::new(pool, [mock_config(&server)]);
    let auth_url = manager.begin(&user, Provider::YouTube).await.unwrap();
    let state = state_from_auth_url(&auth_url);

    let err = manager
        .complete(Provider::YouTube, Some(&user), callback("auth-code", &state))
        .await
        .unwrap_err();
    assert!(matches!(err, ConnectionError::NoAccountFound));

    assert!(manager.list(&user).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_profile_fetch_http_error() {
    let (pool, _temp_dir) = setup_test_db().await;
    let user = seed_user(&pool, "h@example.com").await;
    let server = MockServer::start().await;
    mount_token_ok(&server).await;

    Mock::given(method("GET"))
        .and(path("/youtube/v3/channels"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let manager = ConnectionManager::new(pool, [mock_config(&server)]);
    let auth_url = manager.begin(&user, Provider::YouTube).await.unwrap();
    let state = state_from_auth_url(&auth_url);

    let err = manager
        .complete(Provider::YouTube, Some(&user), callback("auth-code", &state))
        .await
        .unwrap_err();
    assert!(matches!(err, ConnectionError::ProfileFetch(_)));
}

#[tokio::test]
async fn test_unauthenticated_callback_is_rejected() {
    let (pool, _temp_dir) = setup_test_db().await;
    let user = seed_user(&pool, "i@example.com").await;
    let server = MockServer::start().await;
    mount_token_ok(&server).await;
    mount_profile_ok(&server).await;

    let manager = ConnectionManager::new(pool, [mock_config(&server)]);
    let auth_url = manager.begin(&user, Provider::YouTube).await.unwrap();
    let state = state_from_auth_url(&auth_url);

    let err = manager
        .complete(Provider::YouTube, None, callback("auth-code", &state))
        .await
        .unwrap_err();
    assert!(matches!(err, ConnectionError::Unauthenticated));

    assert!(manager.list(&user).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_callback_from_different_user_is_rejected() {
    let (pool, _temp_dir) = setup_test_db().await;
    let initiator = seed_user(&pool, "j@example.com").await;
    let intruder = seed_user(&pool, "k@example.com").await;
    let server = MockServer::start().await;
    mount_token_ok(&server).await;
    mount_profile_ok(&server).await;

    let manager = ConnectionManager::new(pool, [mock_config(&server)]);
    let auth_url = manager.begin(&initiator, Provider::YouTube).await.unwrap();
    let state = state_from_auth_url(&auth_url);

    let err = manager
        .complete(Provider::YouTube, Some(&intruder), callback("auth-code", &state))
        .await
        .unwrap_err();
    assert!(matches!(err, ConnectionError::StateMismatch));

    assert!(manager.list(&initiator).await.unwrap().is_empty());
    assert!(manager.list(&intruder).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_reinitiation_invalidates_earlier_state() {
    let (pool, _temp_dir) = setup_test_db().await;
    let user = seed_user(&pool, "l@example.com").await;
    let server = MockServer::start().await;
    mount_token_ok(&server).await;
    mount_profile_ok(&server).await;

    let manager = ConnectionManager::new(pool, [mock_config(&server)]);
    let first = state_from_auth_url(&manager.begin(&user, Provider::YouTube).await.unwrap());
    let second = state_from_auth_url(&manager.begin(&user, Provider::YouTube).await.unwrap());
    assert_ne!(first, second);

    let err = manager
        .complete(Provider::YouTube, Some(&user), callback("auth-code", &first))
        .await
        .unwrap_err();
    assert!(matches!(err, ConnectionError::StateMismatch));

    // The newest initiation still completes
    manager
        .complete(Provider::YouTube, Some(&user), callback("auth-code", &second))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_reconnect_replaces_stored_credential() {
    let (pool, _temp_dir) = setup_test_db().await;
    let user = seed_user(&pool, "m@example.com").await;
    let server = MockServer::start().await;
    mount_token_ok(&server).await;
    mount_profile_ok(&server).await;

    let manager = ConnectionManager::new(pool, [mock_config(&server)]);
    for _ in 0..2 {
        let state = state_from_auth_url(&manager.begin(&user, Provider::YouTube).await.unwrap());
        manager
            .complete(Provider::YouTube, Some(&user), callback("auth-code", &state))
            .await
            .unwrap();
    }

    assert_eq!(manager.list(&user).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_disconnect() {
    let (pool, _temp_dir) = setup_test_db().await;
    let user = seed_user(&pool, "n@example.com").await;
    let server = MockServer::start().await;
    mount_token_ok(&server).await;
    mount_profile_ok(&server).await;

    let manager = ConnectionManager::new(pool, [mock_config(&server)]);
    let state = state_from_auth_url(&manager.begin(&user, Provider::YouTube).await.unwrap());
    let connection = manager
        .complete(Provider::YouTube, Some(&user), callback("auth-code", &state))
        .await
        .unwrap();

    assert!(manager.disconnect(&user, &connection.id).await.unwrap());
    assert!(!manager.disconnect(&user, &connection.id).await.unwrap());
    assert!(manager.list(&user).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_refresh_preserves_refresh_token_when_omitted() {
    let (pool, _temp_dir) = setup_test_db().await;
    let user = seed_user(&pool, "o@example.com").await;
    let server = MockServer::start().await;

    // Refresh responses commonly omit the refresh token
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "rotated-access-token",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&server)
        .await;

    let storage = ConnectionStorage::new(pool.clone());
    let now = Utc::now().timestamp();
    let seeded = Connection {
        id: "conn-1".to_string(),
        user_id: user.clone(),
        provider: "youtube".to_string(),
        provider_name: "YouTube".to_string(),
        provider_id: "UC123".to_string(),
        access_token: "stale-access-token".to_string(),
        refresh_token: Some("long-lived-refresh".to_string()),
        expires_at: now - 10,
        metadata: serde_json::json!({}),
        created_at: now,
        updated_at: now,
    };
    storage.store_connection(&seeded).await.unwrap();

    let manager = ConnectionManager::new(pool, [mock_config(&server)]);
    let refreshed = manager.refresh(&user, "conn-1").await.unwrap();

    assert_eq!(refreshed.access_token, "rotated-access-token");
    assert_eq!(refreshed.refresh_token.as_deref(), Some("long-lived-refresh"));
    assert!(refreshed.expires_at > now);

    // Persisted as well
    let stored = storage.get_connection(&user, "conn-1").await.unwrap().unwrap();
    assert_eq!(stored.access_token, "rotated-access-token");
    assert_eq!(stored.refresh_token.as_deref(), Some("long-lived-refresh"));
}

#[tokio::test]
async fn test_refresh_without_refresh_token_fails() {
    let (pool, _temp_dir) = setup_test_db().await;
    let user = seed_user(&pool, "p@example.com").await;
    let server = MockServer::start().await;

    let storage = ConnectionStorage::new(pool.clone());
    let now = Utc::now().timestamp();
    let seeded = Connection {
        id: "conn-2".to_string(),
        user_id: user.clone(),
        provider: "youtube".to_string(),
        provider_name: "YouTube".to_string(),
        provider_id: "UC123".to_string(),
        access_token: "stale-access-token".to_string(),
        refresh_token: None,
        expires_at: now - 10,
        metadata: serde_json::json!({}),
        created_at: now,
        updated_at: now,
    };
    storage.store_connection(&seeded).await.unwrap();

    let manager = ConnectionManager::new(pool, [mock_config(&server)]);
    let err = manager.refresh(&user, "conn-2").await.unwrap_err();
    assert!(matches!(err, ConnectionError::TokenExchange(_)));
}

#[tokio::test]
async fn test_refresh_unknown_connection_is_not_found() {
    let (pool, _temp_dir) = setup_test_db().await;
    let user = seed_user(&pool, "q@example.com").await;
    let server = MockServer::start().await;

    let manager = ConnectionManager::new(pool, [mock_config(&server)]);
    let err = manager.refresh(&user, "missing").await.unwrap_err();
    assert!(matches!(err, ConnectionError::NotFound(_)));
}

#[tokio::test]
async fn test_unconfigured_provider_is_rejected_at_initiation() {
    let (pool, _temp_dir) = setup_test_db().await;
    let user = seed_user(&pool, "r@example.com").await;

    let manager = ConnectionManager::new(pool, Vec::<ProviderConfig>::new());
    let err = manager.begin(&user, Provider::YouTube).await.unwrap_err();
    assert!(matches!(err, ConnectionError::Configuration(_)));
}
