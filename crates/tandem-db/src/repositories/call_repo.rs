//! Call record repository implementation
//!
//! Write-through persistence for the in-memory ledger. Writes here are
//! non-fatal for the engine: a failed insert is logged and routing
//! continues on in-memory state.

use async_trait::async_trait;
use sqlx::PgPool;
use tandem_core::{models::CallRecord, traits::CallRepository, AppError, AppResult};
use tracing::{debug, error, instrument};

/// PostgreSQL implementation of CallRepository
pub struct PgCallRepository {
    pool: PgPool,
}

impl PgCallRepository {
    /// Create a new call repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CallRepository for PgCallRepository {
    #[instrument(skip(self, record), fields(call_id = %record.call_id))]
    async fn insert(&self, record: &CallRecord) -> AppResult<()> {
        debug!("Storing call record {}", record.call_id);

        sqlx::query(
            r#"
            INSERT INTO call_records (
                call_id, original_ani, original_dnis, transformed_ani, assigned_did,
                inbound_peer, intermediate_peer, final_peer, status, current_step,
                start_time, end_time, duration_secs
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(&record.call_id)
        .bind(&record.original_ani)
        .bind(&record.original_dnis)
        .bind(&record.transformed_ani)
        .bind(&record.assigned_did)
        .bind(&record.inbound_peer)
        .bind(&record.intermediate_peer)
        .bind(&record.final_peer)
        .bind(record.status.to_string())
        .bind(record.current_step.to_string())
        .bind(record.start_time)
        .bind(record.end_time)
        .bind(record.duration_secs)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error storing call record {}: {}", record.call_id, e);
            AppError::Database(format!("Failed to store call record: {}", e))
        })?;

        Ok(())
    }

    #[instrument(skip(self, record), fields(call_id = %record.call_id))]
    async fn update(&self, record: &CallRecord) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE call_records
            SET status = $2, current_step = $3, end_time = $4, duration_secs = $5
            WHERE call_id = $1
            "#,
        )
        .bind(&record.call_id)
        .bind(record.status.to_string())
        .bind(record.current_step.to_string())
        .bind(record.end_time)
        .bind(record.duration_secs)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error updating call record {}: {}", record.call_id, e);
            AppError::Database(format!("Failed to update call record: {}", e))
        })?;

        Ok(())
    }
}
