//! Peer repository implementation
//!
//! PostgreSQL-backed storage for peer definitions with insert-or-replace
//! semantics keyed on the peer name.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tandem_core::{
    models::{AuthMode, Peer, PeerType},
    traits::PeerRepository,
    AppError, AppResult,
};
use tracing::{debug, error, instrument};

/// PostgreSQL implementation of PeerRepository
pub struct PgPeerRepository {
    pool: PgPool,
}

impl PgPeerRepository {
    /// Create a new peer repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct PeerRow {
    name: String,
    peer_type: String,
    host: String,
    port: i32,
    username: Option<String>,
    password: Option<String>,
    auth_mode: String,
    codecs: String,
    max_channels: i32,
    priority: i32,
    weight: i32,
    active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<PeerRow> for Peer {
    fn from(row: PeerRow) -> Self {
        Peer {
            name: row.name,
            peer_type: PeerType::from_str(&row.peer_type).unwrap_or(PeerType::Inbound),
            host: row.host,
            port: row.port as u16,
            username: row.username,
            password: row.password,
            auth_mode: AuthMode::from_str(&row.auth_mode).unwrap_or_default(),
            codecs: serde_json::from_str(&row.codecs).unwrap_or_default(),
            max_channels: row.max_channels.max(0) as u32,
            priority: row.priority,
            weight: row.weight.max(0) as u32,
            active: row.active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

const PEER_COLUMNS: &str = r#"
    name, peer_type, host, port, username, password, auth_mode,
    codecs, max_channels, priority, weight, active, created_at, updated_at
"#;

#[async_trait]
impl PeerRepository for PgPeerRepository {
    #[instrument(skip(self, peer), fields(name = %peer.name))]
    async fn upsert(&self, peer: &Peer) -> AppResult<()> {
        debug!("Upserting peer {}", peer.name);

        let codecs = serde_json::to_string(&peer.codecs)?;

        sqlx::query(
            r#"
            INSERT INTO peers (
                name, peer_type, host, port, username, password, auth_mode,
                codecs, max_channels, priority, weight, active
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (name) DO UPDATE SET
                peer_type = EXCLUDED.peer_type,
                host = EXCLUDED.host,
                port = EXCLUDED.port,
                username = EXCLUDED.username,
                password = EXCLUDED.password,
                auth_mode = EXCLUDED.auth_mode,
                codecs = EXCLUDED.codecs,
                max_channels = EXCLUDED.max_channels,
                priority = EXCLUDED.priority,
                weight = EXCLUDED.weight,
                active = EXCLUDED.active,
                updated_at = NOW()
            "#,
        )
        .bind(&peer.name)
        .bind(peer.peer_type.to_string())
        .bind(&peer.host)
        .bind(peer.port as i32)
        .bind(&peer.username)
        .bind(&peer.password)
        .bind(peer.auth_mode.to_string())
        .bind(codecs)
        .bind(peer.max_channels as i32)
        .bind(peer.priority)
        .bind(peer.weight as i32)
        .bind(peer.active)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error upserting peer {}: {}", peer.name, e);
            AppError::Database(format!("Failed to upsert peer: {}", e))
        })?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn find_by_name(&self, name: &str) -> AppResult<Option<Peer>> {
        let row = sqlx::query_as::<sqlx::Postgres, PeerRow>(&format!(
            "SELECT {} FROM peers WHERE name = $1",
            PEER_COLUMNS
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding peer {}: {}", name, e);
            AppError::Database(format!("Failed to find peer: {}", e))
        })?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn list(&self, peer_type: Option<PeerType>) -> AppResult<Vec<Peer>> {
        let rows = match peer_type {
            Some(t) => {
                sqlx::query_as::<sqlx::Postgres, PeerRow>(&format!(
                    "SELECT {} FROM peers WHERE peer_type = $1 ORDER BY name",
                    PEER_COLUMNS
                ))
                .bind(t.to_string())
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as::<sqlx::Postgres, PeerRow>(&format!(
                    "SELECT {} FROM peers ORDER BY name",
                    PEER_COLUMNS
                ))
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(|e| {
            error!("Database error listing peers: {}", e);
            AppError::Database(format!("Failed to list peers: {}", e))
        })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self))]
    async fn delete(&self, name: &str) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM peers WHERE name = $1")
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error deleting peer {}: {}", name, e);
                AppError::Database(format!("Failed to delete peer: {}", e))
            })?;

        Ok(result.rows_affected() > 0)
    }
}
