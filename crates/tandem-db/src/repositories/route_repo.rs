//! Route repository implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tandem_core::{
    models::{BalanceMode, Route},
    traits::RouteRepository,
    AppError, AppResult,
};
use tracing::{debug, error, instrument};

/// PostgreSQL implementation of RouteRepository
pub struct PgRouteRepository {
    pool: PgPool,
}

impl PgRouteRepository {
    /// Create a new route repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct RouteRow {
    name: String,
    inbound_peer: String,
    intermediate_peer: String,
    final_peer: String,
    mode: String,
    priority: i32,
    active: bool,
    created_at: DateTime<Utc>,
}

impl From<RouteRow> for Route {
    fn from(row: RouteRow) -> Self {
        Route {
            name: row.name,
            inbound_peer: row.inbound_peer,
            intermediate_peer: row.intermediate_peer,
            final_peer: row.final_peer,
            mode: BalanceMode::from_str(&row.mode).unwrap_or_default(),
            priority: row.priority,
            active: row.active,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl RouteRepository for PgRouteRepository {
    #[instrument(skip(self, route), fields(name = %route.name))]
    async fn upsert(&self, route: &Route) -> AppResult<()> {
        debug!("Upserting route {}", route.name);

        sqlx::query(
            r#"
            INSERT INTO routes (
                name, inbound_peer, intermediate_peer, final_peer, mode, priority, active
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (name) DO UPDATE SET
                inbound_peer = EXCLUDED.inbound_peer,
                intermediate_peer = EXCLUDED.intermediate_peer,
                final_peer = EXCLUDED.final_peer,
                mode = EXCLUDED.mode,
                priority = EXCLUDED.priority,
                active = EXCLUDED.active
            "#,
        )
        .bind(&route.name)
        .bind(&route.inbound_peer)
        .bind(&route.intermediate_peer)
        .bind(&route.final_peer)
        .bind(route.mode.to_string())
        .bind(route.priority)
        .bind(route.active)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error upserting route {}: {}", route.name, e);
            AppError::Database(format!("Failed to upsert route: {}", e))
        })?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn list(&self) -> AppResult<Vec<Route>> {
        let rows = sqlx::query_as::<sqlx::Postgres, RouteRow>(
            r#"
            SELECT name, inbound_peer, intermediate_peer, final_peer,
                   mode, priority, active, created_at
            FROM routes
            ORDER BY name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error listing routes: {}", e);
            AppError::Database(format!("Failed to list routes: {}", e))
        })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self))]
    async fn delete(&self, name: &str) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM routes WHERE name = $1")
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error deleting route {}: {}", name, e);
                AppError::Database(format!("Failed to delete route: {}", e))
            })?;

        Ok(result.rows_affected() > 0)
    }
}
