//! Peer statistics repository implementation
//!
//! The balancer's in-memory stats are authoritative; this table is a
//! fire-and-forget mirror for operator dashboards.

use async_trait::async_trait;
use sqlx::PgPool;
use tandem_core::{models::PeerStats, traits::StatsRepository, AppError, AppResult};
use tracing::{error, instrument};

/// PostgreSQL implementation of StatsRepository
pub struct PgStatsRepository {
    pool: PgPool,
}

impl PgStatsRepository {
    /// Create a new stats repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StatsRepository for PgStatsRepository {
    #[instrument(skip(self, stats), fields(peer = %stats.peer_name))]
    async fn upsert(&self, stats: &PeerStats) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO peer_stats (
                peer_name, total_calls, active_calls, failed_calls,
                success_rate, avg_duration_secs, last_call_time, healthy
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (peer_name) DO UPDATE SET
                total_calls = EXCLUDED.total_calls,
                active_calls = EXCLUDED.active_calls,
                failed_calls = EXCLUDED.failed_calls,
                success_rate = EXCLUDED.success_rate,
                avg_duration_secs = EXCLUDED.avg_duration_secs,
                last_call_time = EXCLUDED.last_call_time,
                healthy = EXCLUDED.healthy,
                updated_at = NOW()
            "#,
        )
        .bind(&stats.peer_name)
        .bind(stats.total_calls)
        .bind(stats.active_calls)
        .bind(stats.failed_calls)
        .bind(stats.success_rate)
        .bind(stats.avg_duration_secs)
        .bind(stats.last_call_time)
        .bind(stats.healthy)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!(
                "Database error upserting stats for {}: {}",
                stats.peer_name, e
            );
            AppError::Database(format!("Failed to upsert peer stats: {}", e))
        })?;

        Ok(())
    }
}
