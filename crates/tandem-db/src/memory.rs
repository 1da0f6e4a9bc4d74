//! In-memory repository implementations
//!
//! Used when the mediator runs without a database (standalone mode) and
//! by the test suites. Semantics match the PostgreSQL implementations;
//! in particular `MemoryDidRepository::acquire` holds the pool lock
//! across the pick-and-mark step and re-checks the `in_use` predicate
//! before flipping it, so concurrent acquires of the last free number
//! still produce exactly one winner.

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use std::collections::HashMap;
use tandem_core::{
    models::{CallRecord, Did, DidCounts, Peer, PeerStats, PeerType, Route, Verification},
    traits::{
        CallRepository, DidRepository, PeerRepository, RouteRepository, StatsRepository,
        VerificationRepository,
    },
    AppError, AppResult,
};
use tokio::sync::{Mutex, RwLock};

/// In-memory implementation of PeerRepository
#[derive(Default)]
pub struct MemoryPeerRepository {
    peers: RwLock<HashMap<String, Peer>>,
}

impl MemoryPeerRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PeerRepository for MemoryPeerRepository {
    async fn upsert(&self, peer: &Peer) -> AppResult<()> {
        self.peers
            .write()
            .await
            .insert(peer.name.clone(), peer.clone());
        Ok(())
    }

    async fn find_by_name(&self, name: &str) -> AppResult<Option<Peer>> {
        Ok(self.peers.read().await.get(name).cloned())
    }

    async fn list(&self, peer_type: Option<PeerType>) -> AppResult<Vec<Peer>> {
        let peers = self.peers.read().await;
        let mut result: Vec<Peer> = peers
            .values()
            .filter(|p| peer_type.map_or(true, |t| p.peer_type == t))
            .cloned()
            .collect();
        result.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(result)
    }

    async fn delete(&self, name: &str) -> AppResult<bool> {
        Ok(self.peers.write().await.remove(name).is_some())
    }
}

/// In-memory implementation of RouteRepository
#[derive(Default)]
pub struct MemoryRouteRepository {
    routes: RwLock<HashMap<String, Route>>,
}

impl MemoryRouteRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RouteRepository for MemoryRouteRepository {
    async fn upsert(&self, route: &Route) -> AppResult<()> {
        self.routes
            .write()
            .await
            .insert(route.name.clone(), route.clone());
        Ok(())
    }

    async fn list(&self) -> AppResult<Vec<Route>> {
        let routes = self.routes.read().await;
        let mut result: Vec<Route> = routes.values().cloned().collect();
        result.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(result)
    }

    async fn delete(&self, name: &str) -> AppResult<bool> {
        Ok(self.routes.write().await.remove(name).is_some())
    }
}

/// In-memory implementation of DidRepository
#[derive(Default)]
pub struct MemoryDidRepository {
    dids: Mutex<HashMap<String, Did>>,
}

impl MemoryDidRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pick one free number from `candidates` at random and mark it,
    /// re-checking the predicate on the chosen row
    fn claim(
        dids: &mut HashMap<String, Did>,
        candidates: &[String],
        destination: &str,
    ) -> Option<String> {
        if candidates.is_empty() {
            return None;
        }
        let pick = &candidates[rand::thread_rng().gen_range(0..candidates.len())];
        let did = dids.get_mut(pick)?;
        if did.in_use {
            return None;
        }
        did.in_use = true;
        did.destination = Some(destination.to_string());
        did.updated_at = Utc::now();
        Some(did.number.clone())
    }
}

#[async_trait]
impl DidRepository for MemoryDidRepository {
    async fn upsert(&self, did: &Did) -> AppResult<()> {
        let mut dids = self.dids.lock().await;
        match dids.get_mut(&did.number) {
            // Preserve assignment state on replace, as the SQL upsert does
            Some(existing) => {
                existing.owner_peer = did.owner_peer.clone();
                existing.country = did.country.clone();
                existing.city = did.city.clone();
                existing.updated_at = Utc::now();
            }
            None => {
                dids.insert(did.number.clone(), did.clone());
            }
        }
        Ok(())
    }

    async fn acquire(&self, owner_peer: &str, destination: &str) -> AppResult<Option<String>> {
        let mut dids = self.dids.lock().await;

        let owned: Vec<String> = dids
            .values()
            .filter(|d| !d.in_use && d.owner_peer == owner_peer)
            .map(|d| d.number.clone())
            .collect();
        if let Some(number) = Self::claim(&mut dids, &owned, destination) {
            return Ok(Some(number));
        }

        let any_free: Vec<String> = dids
            .values()
            .filter(|d| !d.in_use)
            .map(|d| d.number.clone())
            .collect();
        Ok(Self::claim(&mut dids, &any_free, destination))
    }

    async fn release(&self, number: &str) -> AppResult<()> {
        if let Some(did) = self.dids.lock().await.get_mut(number) {
            did.in_use = false;
            did.destination = None;
            did.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn find_by_number(&self, number: &str) -> AppResult<Option<Did>> {
        Ok(self.dids.lock().await.get(number).cloned())
    }

    async fn list(&self, in_use: Option<bool>) -> AppResult<Vec<Did>> {
        let dids = self.dids.lock().await;
        let mut result: Vec<Did> = dids
            .values()
            .filter(|d| in_use.map_or(true, |state| d.in_use == state))
            .cloned()
            .collect();
        result.sort_by(|a, b| a.number.cmp(&b.number));
        Ok(result)
    }

    async fn delete(&self, number: &str) -> AppResult<bool> {
        let mut dids = self.dids.lock().await;
        match dids.get(number) {
            Some(did) if did.in_use => Err(AppError::DidInUse(number.to_string())),
            Some(_) => {
                dids.remove(number);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn counts(&self) -> AppResult<DidCounts> {
        let dids = self.dids.lock().await;
        Ok(DidCounts {
            total: dids.len() as i64,
            in_use: dids.values().filter(|d| d.in_use).count() as i64,
        })
    }
}

/// In-memory implementation of CallRepository
#[derive(Default)]
pub struct MemoryCallRepository {
    records: RwLock<HashMap<String, CallRecord>>,
}

impl MemoryCallRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// All stored records (for assertions in tests)
    pub async fn all(&self) -> Vec<CallRecord> {
        self.records.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl CallRepository for MemoryCallRepository {
    async fn insert(&self, record: &CallRecord) -> AppResult<()> {
        self.records
            .write()
            .await
            .insert(record.call_id.clone(), record.clone());
        Ok(())
    }

    async fn update(&self, record: &CallRecord) -> AppResult<()> {
        self.records
            .write()
            .await
            .insert(record.call_id.clone(), record.clone());
        Ok(())
    }
}

/// In-memory implementation of VerificationRepository
#[derive(Default)]
pub struct MemoryVerificationRepository {
    records: RwLock<Vec<Verification>>,
}

impl MemoryVerificationRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VerificationRepository for MemoryVerificationRepository {
    async fn append(&self, verification: &Verification) -> AppResult<()> {
        self.records.write().await.push(verification.clone());
        Ok(())
    }

    async fn list_for_call(&self, call_id: &str) -> AppResult<Vec<Verification>> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .filter(|v| v.call_id == call_id)
            .cloned()
            .collect())
    }
}

/// In-memory implementation of StatsRepository
#[derive(Default)]
pub struct MemoryStatsRepository {
    stats: RwLock<HashMap<String, PeerStats>>,
}

impl MemoryStatsRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StatsRepository for MemoryStatsRepository {
    async fn upsert(&self, stats: &PeerStats) -> AppResult<()> {
        self.stats
            .write()
            .await
            .insert(stats.peer_name.clone(), stats.clone());
        Ok(())
    }
}
