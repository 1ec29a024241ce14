// ABOUTME: SQLite storage for connection records and pending authorizations
// ABOUTME: Pending rows are single-use and consumed atomically at callback time

use chrono::Utc;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::{
    error::ConnectionResult,
    types::{Connection, PendingAuthorization},
};

pub struct ConnectionStorage {
    pool: SqlitePool,
}

impl ConnectionStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Store a connection record. A repeat connect for the same
    /// (user, provider) replaces the earlier credential.
    pub async fn store_connection(&self, connection: &Connection) -> ConnectionResult<()> {
        debug!(
            "Storing connection for user {} provider {}",
            connection.user_id, connection.provider
        );

        sqlx::query(
            r#"
            INSERT INTO social_connections (
                id, user_id, provider, provider_name, provider_id,
                access_token, refresh_token, expires_at, metadata,
                created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id, provider) DO UPDATE SET
                provider_name = excluded.provider_name,
                provider_id = excluded.provider_id,
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                expires_at = excluded.expires_at,
                metadata = excluded.metadata,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&connection.id)
        .bind(&connection.user_id)
        .bind(&connection.provider)
        .bind(&connection.provider_name)
        .bind(&connection.provider_id)
        .bind(&connection.access_token)
        .bind(&connection.refresh_token)
        .bind(connection.expires_at)
        .bind(serde_json::to_string(&connection.metadata)?)
        .bind(connection.created_at)
        .bind(connection.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Update the credential material after a token refresh.
    pub async fn update_tokens(
        &self,
        connection_id: &str,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at: i64,
    ) -> ConnectionResult<()> {
        sqlx::query(
            r#"
            UPDATE social_connections
            SET access_token = ?, refresh_token = ?, expires_at = ?, updated_at = unixepoch()
            WHERE id = ?
            "#,
        )
        .bind(access_token)
        .bind(refresh_token)
        .bind(expires_at)
        .bind(connection_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_connection(
        &self,
        user_id: &str,
        connection_id: &str,
    ) -> ConnectionResult<Option<Connection>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, provider, provider_name, provider_id,
                   access_token, refresh_token, expires_at, metadata,
                   created_at, updated_at
            FROM social_connections
            WHERE id = ? AND user_id = ?
            "#,
        )
        .bind(connection_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(row_to_connection(&row)?)),
            None => Ok(None),
        }
    }

    /// All connections owned by a user. An empty result is not an error.
    pub async fn list_connections(&self, user_id: &str) -> ConnectionResult<Vec<Connection>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, provider, provider_name, provider_id,
                   access_token, refresh_token, expires_at, metadata,
                   created_at, updated_at
            FROM social_connections
            WHERE user_id = ?
            ORDER BY created_at
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_connection).collect()
    }

    /// Delete exactly one connection, scoped to its owner. Returns whether
    /// a record was removed.
    pub async fn delete_connection(
        &self,
        user_id: &str,
        connection_id: &str,
    ) -> ConnectionResult<bool> {
        debug!("Deleting connection {} for user {}", connection_id, user_id);

        let result = sqlx::query(
            "DELETE FROM social_connections WHERE id = ? AND user_id = ?",
        )
        .bind(connection_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Record a pending authorization. Re-initiating for the same
    /// (user, provider) replaces the earlier row, invalidating that attempt.
    pub async fn put_pending(&self, pending: &PendingAuthorization) -> ConnectionResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM pending_authorizations WHERE user_id = ? AND provider = ?")
            .bind(&pending.user_id)
            .bind(&pending.provider)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO pending_authorizations (state, user_id, provider, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&pending.state)
        .bind(&pending.user_id)
        .bind(&pending.provider)
        .bind(pending.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Consume the pending authorization matching a state token. The row is
    /// removed whether or not the rest of the handshake succeeds.
    pub async fn take_pending(
        &self,
        state: &str,
    ) -> ConnectionResult<Option<PendingAuthorization>> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            "SELECT state, user_id, provider, created_at FROM pending_authorizations WHERE state = ?",
        )
        .bind(state)
        .fetch_optional(&mut *tx)
        .await?;

        let pending = match row {
            Some(row) => PendingAuthorization {
                state: row.try_get("state")?,
                user_id: row.try_get("user_id")?,
                provider: row.try_get("provider")?,
                created_at: row.try_get("created_at")?,
            },
            None => {
                tx.commit().await?;
                return Ok(None);
            }
        };

        sqlx::query("DELETE FROM pending_authorizations WHERE state = ?")
            .bind(state)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(pending))
    }

    /// Drop pending rows older than the handshake TTL.
    pub async fn purge_expired_pending(&self, ttl_secs: i64) -> ConnectionResult<u64> {
        let cutoff = Utc::now().timestamp() - ttl_secs;

        let result = sqlx::query("DELETE FROM pending_authorizations WHERE created_at <= ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        let purged = result.rows_affected();
        if purged > 0 {
            debug!("Purged {} expired pending authorizations", purged);
        }
        Ok(purged)
    }
}

fn row_to_connection(row: &sqlx::sqlite::SqliteRow) -> ConnectionResult<Connection> {
    let metadata: String = row.try_get("metadata")?;

    Ok(Connection {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        provider: row.try_get("provider")?,
        provider_name: row.try_get("provider_name")?,
        provider_id: row.try_get("provider_id")?,
        access_token: row.try_get("access_token")?,
        refresh_token: row.try_get("refresh_token")?,
        expires_at: row.try_get("expires_at")?,
        metadata: serde_json::from_str(&metadata)?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
