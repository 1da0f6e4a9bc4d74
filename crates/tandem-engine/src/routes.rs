//! Route table
//!
//! Maps an inbound peer to the routing path its calls take. Resolution
//! picks the highest-priority active route; ties break on the route name
//! so the outcome is stable across restarts.

use crate::registry::PeerRegistry;
use std::collections::HashMap;
use std::sync::Arc;
use tandem_core::{models::Route, traits::RouteRepository, AppError, AppResult};
use tokio::sync::RwLock;
use tracing::{info, instrument};

/// Process-wide cache of route definitions
pub struct RouteTable {
    repo: Arc<dyn RouteRepository>,
    routes: RwLock<HashMap<String, Route>>,
}

impl RouteTable {
    /// Create an empty route table over a backing store
    pub fn new(repo: Arc<dyn RouteRepository>) -> Self {
        Self {
            repo,
            routes: RwLock::new(HashMap::new()),
        }
    }

    /// Fill the cache from the backing store
    pub async fn load(&self) -> AppResult<usize> {
        let routes = self.repo.list().await?;
        let mut cache = self.routes.write().await;
        cache.clear();
        for route in routes {
            cache.insert(route.name.clone(), route);
        }
        info!("Loaded {} routes", cache.len());
        Ok(cache.len())
    }

    /// Insert or replace a route after checking every referenced peer
    /// resolves (by name, or as a type pool for the two outbound hops)
    #[instrument(skip(self, route, registry), fields(name = %route.name))]
    pub async fn add(&self, route: Route, registry: &PeerRegistry) -> AppResult<Route> {
        if route.name.is_empty() {
            return Err(AppError::Validation("route name is required".to_string()));
        }

        registry.get(&route.inbound_peer).await?;
        registry.resolve_selector(&route.intermediate_peer).await?;
        registry.resolve_selector(&route.final_peer).await?;

        self.repo.upsert(&route).await?;
        self.routes
            .write()
            .await
            .insert(route.name.clone(), route.clone());

        info!(
            "Route {} created: {} -> {} -> {}",
            route.name, route.inbound_peer, route.intermediate_peer, route.final_peer
        );
        Ok(route)
    }

    /// List all routes sorted by name
    pub async fn list(&self) -> Vec<Route> {
        let routes = self.routes.read().await;
        let mut result: Vec<Route> = routes.values().cloned().collect();
        result.sort_by(|a, b| a.name.cmp(&b.name));
        result
    }

    /// Delete a route by name
    #[instrument(skip(self))]
    pub async fn delete(&self, name: &str) -> AppResult<()> {
        if !self.repo.delete(name).await? {
            return Err(AppError::RouteNotFound(name.to_string()));
        }
        self.routes.write().await.remove(name);
        info!("Route {} deleted", name);
        Ok(())
    }

    /// Pick the route for calls arriving from an inbound peer: the
    /// active route with the highest priority, name-ordered on ties
    pub async fn resolve_for_inbound(&self, inbound_peer: &str) -> AppResult<Route> {
        let routes = self.routes.read().await;

        let mut best: Option<&Route> = None;
        for route in routes.values() {
            if !route.active || route.inbound_peer != inbound_peer {
                continue;
            }
            best = match best {
                None => Some(route),
                Some(current)
                    if route.priority > current.priority
                        || (route.priority == current.priority
                            && route.name < current.name) =>
                {
                    Some(route)
                }
                Some(current) => Some(current),
            };
        }

        best.cloned()
            .ok_or_else(|| AppError::NoRoute(inbound_peer.to_string()))
    }

    /// How many routes reference a peer in any position
    pub async fn count_references(&self, peer_name: &str) -> usize {
        self.routes
            .read()
            .await
            .values()
            .filter(|r| {
                r.inbound_peer == peer_name
                    || r.intermediate_peer == peer_name
                    || r.final_peer == peer_name
            })
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_core::models::{BalanceMode, Peer, PeerType};
    use tandem_core::traits::PeerRepository;

    struct NullPeerRepo;

    #[async_trait::async_trait]
    impl PeerRepository for NullPeerRepo {
        async fn upsert(&self, _peer: &Peer) -> AppResult<()> {
            Ok(())
        }
        async fn find_by_name(&self, _name: &str) -> AppResult<Option<Peer>> {
            Ok(None)
        }
        async fn list(&self, _t: Option<PeerType>) -> AppResult<Vec<Peer>> {
            Ok(Vec::new())
        }
        async fn delete(&self, _name: &str) -> AppResult<bool> {
            Ok(true)
        }
    }

    struct NullRouteRepo;

    #[async_trait::async_trait]
    impl RouteRepository for NullRouteRepo {
        async fn upsert(&self, _route: &Route) -> AppResult<()> {
            Ok(())
        }
        async fn list(&self) -> AppResult<Vec<Route>> {
            Ok(Vec::new())
        }
        async fn delete(&self, _name: &str) -> AppResult<bool> {
            Ok(true)
        }
    }

    async fn seeded() -> (RouteTable, PeerRegistry) {
        let registry = PeerRegistry::new(Arc::new(NullPeerRepo));
        registry
            .add(Peer::new("s1", PeerType::Inbound, "192.168.1.10"))
            .await
            .unwrap();
        registry
            .add(Peer::new("s3a", PeerType::Intermediate, "10.0.0.20"))
            .await
            .unwrap();
        registry
            .add(Peer::new("s4", PeerType::Final, "172.16.0.30"))
            .await
            .unwrap();
        (RouteTable::new(Arc::new(NullRouteRepo)), registry)
    }

    #[tokio::test]
    async fn test_add_rejects_unknown_peers() {
        let (table, registry) = seeded().await;

        let bad = Route::new("r", "nope", "s3a", "s4", BalanceMode::RoundRobin);
        assert!(table.add(bad, &registry).await.is_err());

        let good = Route::new("r", "s1", "s3a", "s4", BalanceMode::RoundRobin);
        assert!(table.add(good, &registry).await.is_ok());
    }

    #[tokio::test]
    async fn test_type_pool_reference_is_accepted() {
        let (table, registry) = seeded().await;
        let route = Route::new("r", "s1", "intermediate", "s4", BalanceMode::Weighted);
        assert!(table.add(route, &registry).await.is_ok());
    }

    #[tokio::test]
    async fn test_resolution_prefers_priority_then_name() {
        let (table, registry) = seeded().await;

        let mut low = Route::new("b-low", "s1", "s3a", "s4", BalanceMode::RoundRobin);
        low.priority = 1;
        let mut high = Route::new("z-high", "s1", "s3a", "s4", BalanceMode::RoundRobin);
        high.priority = 5;
        let mut tie = Route::new("a-high", "s1", "s3a", "s4", BalanceMode::RoundRobin);
        tie.priority = 5;

        table.add(low, &registry).await.unwrap();
        table.add(high, &registry).await.unwrap();
        table.add(tie, &registry).await.unwrap();

        let resolved = table.resolve_for_inbound("s1").await.unwrap();
        assert_eq!(resolved.name, "a-high");
    }

    #[tokio::test]
    async fn test_inactive_routes_are_skipped() {
        let (table, registry) = seeded().await;

        let mut route = Route::new("r", "s1", "s3a", "s4", BalanceMode::RoundRobin);
        route.active = false;
        table.add(route, &registry).await.unwrap();

        assert!(matches!(
            table.resolve_for_inbound("s1").await,
            Err(AppError::NoRoute(_))
        ));
    }

    #[tokio::test]
    async fn test_count_references() {
        let (table, registry) = seeded().await;
        table
            .add(
                Route::new("r", "s1", "s3a", "s4", BalanceMode::RoundRobin),
                &registry,
            )
            .await
            .unwrap();

        assert_eq!(table.count_references("s3a").await, 1);
        assert_eq!(table.count_references("other").await, 0);
    }
}
