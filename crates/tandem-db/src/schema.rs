//! Schema bootstrap
//!
//! Creates the six logical tables at startup when they are missing, so a
//! fresh database needs no out-of-band migration step before the mediator
//! can route calls.

use sqlx::PgPool;
use tandem_core::{AppError, AppResult};
use tracing::info;

const TABLES: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS peers (
        id          BIGSERIAL PRIMARY KEY,
        name        TEXT NOT NULL UNIQUE,
        peer_type   TEXT NOT NULL,
        host        TEXT NOT NULL,
        port        INT NOT NULL DEFAULT 5060,
        username    TEXT,
        password    TEXT,
        auth_mode   TEXT NOT NULL DEFAULT 'credentials',
        codecs      TEXT NOT NULL DEFAULT '[]',
        max_channels INT NOT NULL DEFAULT 0,
        priority    INT NOT NULL DEFAULT 0,
        weight      INT NOT NULL DEFAULT 1,
        active      BOOLEAN NOT NULL DEFAULT TRUE,
        created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_peers_type ON peers (peer_type)",
    "CREATE INDEX IF NOT EXISTS idx_peers_active ON peers (active)",
    r#"
    CREATE TABLE IF NOT EXISTS dids (
        id          BIGSERIAL PRIMARY KEY,
        number      TEXT NOT NULL UNIQUE,
        owner_peer  TEXT NOT NULL,
        in_use      BOOLEAN NOT NULL DEFAULT FALSE,
        destination TEXT,
        country     TEXT,
        city        TEXT,
        created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_dids_in_use ON dids (in_use)",
    "CREATE INDEX IF NOT EXISTS idx_dids_owner ON dids (owner_peer)",
    r#"
    CREATE TABLE IF NOT EXISTS routes (
        id                BIGSERIAL PRIMARY KEY,
        name              TEXT NOT NULL UNIQUE,
        inbound_peer      TEXT NOT NULL,
        intermediate_peer TEXT NOT NULL,
        final_peer        TEXT NOT NULL,
        mode              TEXT NOT NULL DEFAULT 'round_robin',
        priority          INT NOT NULL DEFAULT 0,
        active            BOOLEAN NOT NULL DEFAULT TRUE,
        created_at        TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_routes_inbound ON routes (inbound_peer)",
    "CREATE INDEX IF NOT EXISTS idx_routes_active ON routes (active)",
    r#"
    CREATE TABLE IF NOT EXISTS call_records (
        id                BIGSERIAL PRIMARY KEY,
        call_id           TEXT NOT NULL UNIQUE,
        original_ani      TEXT NOT NULL,
        original_dnis     TEXT NOT NULL,
        transformed_ani   TEXT,
        assigned_did      TEXT,
        inbound_peer      TEXT,
        intermediate_peer TEXT,
        final_peer        TEXT,
        status            TEXT NOT NULL DEFAULT 'ACTIVE',
        current_step      TEXT,
        start_time        TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        end_time          TIMESTAMPTZ,
        duration_secs     BIGINT NOT NULL DEFAULT 0
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_call_records_did ON call_records (assigned_did)",
    "CREATE INDEX IF NOT EXISTS idx_call_records_status ON call_records (status)",
    "CREATE INDEX IF NOT EXISTS idx_call_records_start ON call_records (start_time)",
    r#"
    CREATE TABLE IF NOT EXISTS call_verifications (
        id                UUID PRIMARY KEY,
        call_id           TEXT NOT NULL,
        verification_step TEXT NOT NULL,
        expected_ani      TEXT,
        expected_dnis     TEXT,
        received_ani      TEXT,
        received_dnis     TEXT,
        source_ip         TEXT,
        verified          BOOLEAN NOT NULL DEFAULT FALSE,
        created_at        TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_call_verifications_call ON call_verifications (call_id)",
    r#"
    CREATE TABLE IF NOT EXISTS peer_stats (
        id                BIGSERIAL PRIMARY KEY,
        peer_name         TEXT NOT NULL UNIQUE,
        total_calls       BIGINT NOT NULL DEFAULT 0,
        active_calls      BIGINT NOT NULL DEFAULT 0,
        failed_calls      BIGINT NOT NULL DEFAULT 0,
        success_rate      DOUBLE PRECISION NOT NULL DEFAULT 100,
        avg_duration_secs DOUBLE PRECISION NOT NULL DEFAULT 0,
        last_call_time    TIMESTAMPTZ,
        healthy           BOOLEAN NOT NULL DEFAULT TRUE,
        updated_at        TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
];

/// Create missing tables and indexes
pub async fn ensure_schema(pool: &PgPool) -> AppResult<()> {
    for statement in TABLES {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|e| AppError::Database(format!("Schema bootstrap failed: {}", e)))?;
    }

    info!("Database schema verified");
    Ok(())
}
