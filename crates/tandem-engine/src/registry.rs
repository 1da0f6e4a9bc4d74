//! Peer registry
//!
//! In-memory cache of peer definitions keyed by name, loaded from the
//! backing store at startup and written through on every change. Reads
//! on the call path never touch the store.

use crate::routes::RouteTable;
use std::collections::HashMap;
use std::sync::Arc;
use tandem_core::{
    models::{Peer, PeerSelector, PeerType},
    traits::PeerRepository,
    AppError, AppResult,
};
use tokio::sync::RwLock;
use tracing::{info, instrument};

/// Process-wide cache of peer definitions
pub struct PeerRegistry {
    repo: Arc<dyn PeerRepository>,
    peers: RwLock<HashMap<String, Peer>>,
}

impl PeerRegistry {
    /// Create an empty registry over a backing store
    pub fn new(repo: Arc<dyn PeerRepository>) -> Self {
        Self {
            repo,
            peers: RwLock::new(HashMap::new()),
        }
    }

    /// Fill the cache from the backing store
    pub async fn load(&self) -> AppResult<usize> {
        let peers = self.repo.list(None).await?;
        let mut cache = self.peers.write().await;
        cache.clear();
        for peer in peers {
            cache.insert(peer.name.clone(), peer);
        }
        info!("Loaded {} peers", cache.len());
        Ok(cache.len())
    }

    /// Insert or replace a peer, applying operator-omittable defaults
    #[instrument(skip(self, peer), fields(name = %peer.name))]
    pub async fn add(&self, mut peer: Peer) -> AppResult<Peer> {
        peer.apply_defaults();
        peer.validate()?;

        self.repo.upsert(&peer).await?;
        self.peers
            .write()
            .await
            .insert(peer.name.clone(), peer.clone());

        info!("Peer {} added", peer.name);
        Ok(peer)
    }

    /// Get a peer by name
    pub async fn get(&self, name: &str) -> AppResult<Peer> {
        self.peers
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| AppError::PeerNotFound(name.to_string()))
    }

    /// List peers, optionally filtered by type, sorted by name
    pub async fn list(&self, peer_type: Option<PeerType>) -> Vec<Peer> {
        let peers = self.peers.read().await;
        let mut result: Vec<Peer> = peers
            .values()
            .filter(|p| peer_type.map_or(true, |t| p.peer_type == t))
            .cloned()
            .collect();
        result.sort_by(|a, b| a.name.cmp(&b.name));
        result
    }

    /// Delete a peer, refusing while any route references it
    #[instrument(skip(self, routes))]
    pub async fn delete(&self, name: &str, routes: &RouteTable) -> AppResult<()> {
        let references = routes.count_references(name).await;
        if references > 0 {
            return Err(AppError::PeerInUse {
                name: name.to_string(),
                count: references,
            });
        }

        if !self.repo.delete(name).await? {
            return Err(AppError::PeerNotFound(name.to_string()));
        }
        self.peers.write().await.remove(name);

        info!("Peer {} deleted", name);
        Ok(())
    }

    /// Resolve a route token into concrete peers.
    ///
    /// A token naming an existing peer addresses that peer alone; any
    /// other token is read as a peer type and addresses every peer of
    /// that type (a load-balance pool).
    pub async fn resolve_selector(&self, token: &str) -> AppResult<(PeerSelector, Vec<Peer>)> {
        let peers = self.peers.read().await;

        if let Some(peer) = peers.get(token) {
            return Ok((
                PeerSelector::ByName(token.to_string()),
                vec![peer.clone()],
            ));
        }

        if let Some(peer_type) = PeerType::from_str(token) {
            let mut pool: Vec<Peer> = peers
                .values()
                .filter(|p| p.peer_type == peer_type)
                .cloned()
                .collect();
            if !pool.is_empty() {
                pool.sort_by(|a, b| a.name.cmp(&b.name));
                return Ok((PeerSelector::ByType(peer_type), pool));
            }
        }

        Err(AppError::PeerNotFound(token.to_string()))
    }
}
