//! Storage layer for tandem
//!
//! Provides the PostgreSQL-backed repositories behind the traits in
//! `tandem_core::traits`, plus in-memory implementations used when the
//! mediator runs without a database (standalone mode) and by the test
//! suites.

pub mod memory;
pub mod pool;
pub mod repositories;
pub mod schema;

pub use pool::create_pool;
pub use repositories::{
    PgCallRepository, PgDidRepository, PgPeerRepository, PgRouteRepository, PgStatsRepository,
    PgVerificationRepository,
};
pub use schema::ensure_schema;
