//! Repository traits for the persisted registries
//!
//! The engine owns its hot state in memory; these traits are the seam to
//! the backing store. Postgres implementations live in `tandem-db`, along
//! with in-memory ones used by standalone mode and the test suites.

use crate::models::{
    CallRecord, Did, DidCounts, Peer, PeerStats, PeerType, Route, Verification,
};
use crate::AppError;
use async_trait::async_trait;

/// Peer definition storage
#[async_trait]
pub trait PeerRepository: Send + Sync {
    /// Insert or replace a peer by name
    async fn upsert(&self, peer: &Peer) -> Result<(), AppError>;

    /// Find a peer by name
    async fn find_by_name(&self, name: &str) -> Result<Option<Peer>, AppError>;

    /// List peers, optionally filtered by type
    async fn list(&self, peer_type: Option<PeerType>) -> Result<Vec<Peer>, AppError>;

    /// Delete a peer by name; returns whether it existed
    async fn delete(&self, name: &str) -> Result<bool, AppError>;
}

/// Route definition storage
#[async_trait]
pub trait RouteRepository: Send + Sync {
    /// Insert or replace a route by name
    async fn upsert(&self, route: &Route) -> Result<(), AppError>;

    /// List all routes
    async fn list(&self) -> Result<Vec<Route>, AppError>;

    /// Delete a route by name; returns whether it existed
    async fn delete(&self, name: &str) -> Result<bool, AppError>;
}

/// DID pool storage
///
/// `acquire` is the linearization point of the pool: when several workers
/// race for the last free number, the conditional update on `in_use` lets
/// exactly one of them win.
#[async_trait]
pub trait DidRepository: Send + Sync {
    /// Insert or replace a DID by number
    async fn upsert(&self, did: &Did) -> Result<(), AppError>;

    /// Atomically claim one free DID and bind it to `destination`.
    ///
    /// Prefers numbers owned by `owner_peer`, falling back to any free
    /// number. Returns `None` when the pool is exhausted.
    async fn acquire(&self, owner_peer: &str, destination: &str)
        -> Result<Option<String>, AppError>;

    /// Mark a DID free and clear its destination. Idempotent.
    async fn release(&self, number: &str) -> Result<(), AppError>;

    /// Find a DID by number
    async fn find_by_number(&self, number: &str) -> Result<Option<Did>, AppError>;

    /// List DIDs, optionally filtered by in-use state
    async fn list(&self, in_use: Option<bool>) -> Result<Vec<Did>, AppError>;

    /// Delete a free DID; fails with `DidInUse` while assigned
    async fn delete(&self, number: &str) -> Result<bool, AppError>;

    /// Pool occupancy counters
    async fn counts(&self) -> Result<DidCounts, AppError>;
}

/// Call record storage
#[async_trait]
pub trait CallRepository: Send + Sync {
    /// Persist a newly created call record
    async fn insert(&self, record: &CallRecord) -> Result<(), AppError>;

    /// Persist a state transition for an existing record
    async fn update(&self, record: &CallRecord) -> Result<(), AppError>;
}

/// Append-only audit trail of per-leg identity checks
#[async_trait]
pub trait VerificationRepository: Send + Sync {
    /// Append one verification record
    async fn append(&self, verification: &Verification) -> Result<(), AppError>;

    /// All verification records for a call, oldest first
    async fn list_for_call(&self, call_id: &str) -> Result<Vec<Verification>, AppError>;
}

/// Peer statistics storage
#[async_trait]
pub trait StatsRepository: Send + Sync {
    /// Insert or replace the stats row for a peer
    async fn upsert(&self, stats: &PeerStats) -> Result<(), AppError>;
}
