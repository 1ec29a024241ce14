// ABOUTME: User and session storage backed by SQLite
// ABOUTME: Resolves dashboard bearer tokens to application users

use chrono::Utc;
use rand::{distributions::Alphanumeric, Rng};
use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::error::StorageError;

/// Session lifetime in seconds (30 days).
const SESSION_TTL_SECS: i64 = 30 * 24 * 60 * 60;

/// Length of the plaintext session token handed to the dashboard.
const SESSION_TOKEN_LEN: usize = 48;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    pub avatar_url: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub avatar_url: Option<String>,
}

/// Issued session: the plaintext token is returned exactly once.
#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub user_id: String,
    pub expires_at: i64,
}

pub struct UserStorage {
    pool: SqlitePool,
}

impl UserStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create_user(&self, input: NewUser) -> Result<User, StorageError> {
        let id = nanoid::nanoid!();
        debug!("Creating user: {}", id);

        sqlx::query(
            r#"
            INSERT INTO users (id, email, name, avatar_url)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&input.email)
        .bind(&input.name)
        .bind(&input.avatar_url)
        .execute(&self.pool)
        .await?;

        self.get_user(&id).await
    }

    pub async fn get_user(&self, user_id: &str) -> Result<User, StorageError> {
        let row = sqlx::query(
            "SELECT id, email, name, avatar_url, created_at, updated_at FROM users WHERE id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StorageError::NotFound(format!("User {}", user_id)))?;

        row_to_user(&row)
    }

    /// Issue a bearer session for a user. Only the hash is persisted.
    pub async fn create_session(&self, user_id: &str) -> Result<Session, StorageError> {
        let token: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(SESSION_TOKEN_LEN)
            .map(char::from)
            .collect();
        let expires_at = Utc::now().timestamp() + SESSION_TTL_SECS;

        sqlx::query(
            r#"
            INSERT INTO sessions (token_hash, user_id, expires_at)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(hash_token(&token))
        .bind(user_id)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(Session {
            token,
            user_id: user_id.to_string(),
            expires_at,
        })
    }

    /// Resolve a bearer token to its user. Expired or unknown tokens
    /// resolve to `None`; they are not an error.
    pub async fn verify_session(&self, token: &str) -> Result<Option<User>, StorageError> {
        let row = sqlx::query(
            r#"
            SELECT u.id, u.email, u.name, u.avatar_url, u.created_at, u.updated_at
            FROM sessions s
            JOIN users u ON u.id = s.user_id
            WHERE s.token_hash = ? AND s.expires_at > ?
            "#,
        )
        .bind(hash_token(token))
        .bind(Utc::now().timestamp())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(row_to_user(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn delete_session(&self, token: &str) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM sessions WHERE token_hash = ?")
            .bind(hash_token(token))
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> Result<User, StorageError> {
    Ok(User {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        name: row.try_get("name")?,
        avatar_url: row.try_get("avatar_url")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// SHA-256 hex digest of a session token.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}
