//! DID pool repository implementation
//!
//! The pool's correctness rests on the conditional update in `acquire`:
//! the claim flips `in_use` only on a row where it is still FALSE, with
//! the candidate row locked via `FOR UPDATE SKIP LOCKED`, so two
//! concurrent acquires can never claim the same number.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tandem_core::{
    models::{Did, DidCounts},
    traits::DidRepository,
    AppError, AppResult,
};
use tracing::{debug, error, instrument};

/// PostgreSQL implementation of DidRepository
pub struct PgDidRepository {
    pool: PgPool,
}

impl PgDidRepository {
    /// Create a new DID repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Claim one free number matching `filter_owner`, if any
    async fn try_acquire(
        &self,
        owner_peer: Option<&str>,
        destination: &str,
    ) -> AppResult<Option<String>> {
        let query = match owner_peer {
            Some(_) => {
                r#"
                UPDATE dids
                SET in_use = TRUE, destination = $1, updated_at = NOW()
                WHERE number = (
                    SELECT number FROM dids
                    WHERE in_use = FALSE AND owner_peer = $2
                    ORDER BY random()
                    LIMIT 1
                    FOR UPDATE SKIP LOCKED
                )
                RETURNING number
                "#
            }
            None => {
                r#"
                UPDATE dids
                SET in_use = TRUE, destination = $1, updated_at = NOW()
                WHERE number = (
                    SELECT number FROM dids
                    WHERE in_use = FALSE
                    ORDER BY random()
                    LIMIT 1
                    FOR UPDATE SKIP LOCKED
                )
                RETURNING number
                "#
            }
        };

        let mut q = sqlx::query_scalar::<sqlx::Postgres, String>(query).bind(destination);
        if let Some(owner) = owner_peer {
            q = q.bind(owner);
        }

        q.fetch_optional(&self.pool).await.map_err(|e| {
            error!("Database error acquiring DID: {}", e);
            AppError::Database(format!("Failed to acquire DID: {}", e))
        })
    }
}

#[derive(sqlx::FromRow)]
struct DidRow {
    number: String,
    owner_peer: String,
    in_use: bool,
    destination: Option<String>,
    country: Option<String>,
    city: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<DidRow> for Did {
    fn from(row: DidRow) -> Self {
        Did {
            number: row.number,
            owner_peer: row.owner_peer,
            in_use: row.in_use,
            destination: row.destination,
            country: row.country,
            city: row.city,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

const DID_COLUMNS: &str =
    "number, owner_peer, in_use, destination, country, city, created_at, updated_at";

#[async_trait]
impl DidRepository for PgDidRepository {
    #[instrument(skip(self, did), fields(number = %did.number))]
    async fn upsert(&self, did: &Did) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO dids (number, owner_peer, in_use, destination, country, city)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (number) DO UPDATE SET
                owner_peer = EXCLUDED.owner_peer,
                country = EXCLUDED.country,
                city = EXCLUDED.city,
                updated_at = NOW()
            "#,
        )
        .bind(&did.number)
        .bind(&did.owner_peer)
        .bind(did.in_use)
        .bind(&did.destination)
        .bind(&did.country)
        .bind(&did.city)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error upserting DID {}: {}", did.number, e);
            AppError::Database(format!("Failed to upsert DID: {}", e))
        })?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn acquire(&self, owner_peer: &str, destination: &str) -> AppResult<Option<String>> {
        // Owner-first, then any free number
        if let Some(number) = self.try_acquire(Some(owner_peer), destination).await? {
            debug!("Acquired DID {} owned by {}", number, owner_peer);
            return Ok(Some(number));
        }

        let fallback = self.try_acquire(None, destination).await?;
        if let Some(ref number) = fallback {
            debug!("Acquired fallback DID {} for {}", number, owner_peer);
        }
        Ok(fallback)
    }

    #[instrument(skip(self))]
    async fn release(&self, number: &str) -> AppResult<()> {
        sqlx::query(
            "UPDATE dids SET in_use = FALSE, destination = NULL, updated_at = NOW() WHERE number = $1",
        )
        .bind(number)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error releasing DID {}: {}", number, e);
            AppError::Database(format!("Failed to release DID: {}", e))
        })?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn find_by_number(&self, number: &str) -> AppResult<Option<Did>> {
        let row = sqlx::query_as::<sqlx::Postgres, DidRow>(&format!(
            "SELECT {} FROM dids WHERE number = $1",
            DID_COLUMNS
        ))
        .bind(number)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error finding DID {}: {}", number, e);
            AppError::Database(format!("Failed to find DID: {}", e))
        })?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self))]
    async fn list(&self, in_use: Option<bool>) -> AppResult<Vec<Did>> {
        let rows = match in_use {
            Some(state) => {
                sqlx::query_as::<sqlx::Postgres, DidRow>(&format!(
                    "SELECT {} FROM dids WHERE in_use = $1 ORDER BY number",
                    DID_COLUMNS
                ))
                .bind(state)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as::<sqlx::Postgres, DidRow>(&format!(
                    "SELECT {} FROM dids ORDER BY number",
                    DID_COLUMNS
                ))
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(|e| {
            error!("Database error listing DIDs: {}", e);
            AppError::Database(format!("Failed to list DIDs: {}", e))
        })?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self))]
    async fn delete(&self, number: &str) -> AppResult<bool> {
        // Refuse while assigned; only free numbers may leave the pool
        let result = sqlx::query("DELETE FROM dids WHERE number = $1 AND in_use = FALSE")
            .bind(number)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error deleting DID {}: {}", number, e);
                AppError::Database(format!("Failed to delete DID: {}", e))
            })?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }

        match self.find_by_number(number).await? {
            Some(did) if did.in_use => Err(AppError::DidInUse(number.to_string())),
            Some(_) => Ok(false),
            None => Ok(false),
        }
    }

    #[instrument(skip(self))]
    async fn counts(&self) -> AppResult<DidCounts> {
        let row: (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COUNT(*) FILTER (WHERE in_use) FROM dids",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error counting DIDs: {}", e);
            AppError::Database(format!("Failed to count DIDs: {}", e))
        })?;

        Ok(DidCounts {
            total: row.0,
            in_use: row.1,
        })
    }
}
