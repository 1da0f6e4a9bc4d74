//! Verification record repository implementation
//!
//! Append-only audit trail of the identity checks performed on each leg.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tandem_core::{
    models::{CallStep, Verification},
    traits::VerificationRepository,
    AppError, AppResult,
};
use tracing::{error, instrument};
use uuid::Uuid;

/// PostgreSQL implementation of VerificationRepository
pub struct PgVerificationRepository {
    pool: PgPool,
}

impl PgVerificationRepository {
    /// Create a new verification repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct VerificationRow {
    id: Uuid,
    call_id: String,
    verification_step: String,
    expected_ani: Option<String>,
    expected_dnis: Option<String>,
    received_ani: Option<String>,
    received_dnis: Option<String>,
    source_ip: Option<String>,
    verified: bool,
    created_at: DateTime<Utc>,
}

impl From<VerificationRow> for Verification {
    fn from(row: VerificationRow) -> Self {
        Verification {
            id: row.id,
            call_id: row.call_id,
            step: CallStep::from_str(&row.verification_step).unwrap_or_default(),
            expected_ani: row.expected_ani.unwrap_or_default(),
            expected_dnis: row.expected_dnis.unwrap_or_default(),
            received_ani: row.received_ani.unwrap_or_default(),
            received_dnis: row.received_dnis.unwrap_or_default(),
            source_ip: row.source_ip,
            verified: row.verified,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl VerificationRepository for PgVerificationRepository {
    #[instrument(skip(self, verification), fields(call_id = %verification.call_id))]
    async fn append(&self, verification: &Verification) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO call_verifications (
                id, call_id, verification_step, expected_ani, expected_dnis,
                received_ani, received_dnis, source_ip, verified, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(verification.id)
        .bind(&verification.call_id)
        .bind(verification.step.to_string())
        .bind(&verification.expected_ani)
        .bind(&verification.expected_dnis)
        .bind(&verification.received_ani)
        .bind(&verification.received_dnis)
        .bind(&verification.source_ip)
        .bind(verification.verified)
        .bind(verification.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!(
                "Database error storing verification for {}: {}",
                verification.call_id, e
            );
            AppError::Database(format!("Failed to store verification: {}", e))
        })?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_for_call(&self, call_id: &str) -> AppResult<Vec<Verification>> {
        let rows = sqlx::query_as::<sqlx::Postgres, VerificationRow>(
            r#"
            SELECT id, call_id, verification_step, expected_ani, expected_dnis,
                   received_ani, received_dnis, source_ip, verified, created_at
            FROM call_verifications
            WHERE call_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(call_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error listing verifications for {}: {}", call_id, e);
            AppError::Database(format!("Failed to list verifications: {}", e))
        })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}
