//! End-to-end routing flows
//!
//! Drives the engine through complete call lifecycles against in-memory
//! stores: identity transforms across the four legs, DID pool
//! exclusivity and exhaustion, source verification, abandonment
//! reclamation, and load distribution.

use std::sync::Arc;
use tandem_core::config::{BalancerConfig, EngineConfig};
use tandem_core::models::{BalanceMode, CallStatus, Did, Peer, PeerType, Route};
use tandem_core::traits::{DidRepository, VerificationRepository};
use tandem_core::AppError;
use tandem_db::memory::{
    MemoryCallRepository, MemoryDidRepository, MemoryPeerRepository, MemoryRouteRepository,
    MemoryStatsRepository, MemoryVerificationRepository,
};
use tandem_engine::{LoadBalancer, PeerRegistry, RouteTable, RoutingEngine};

struct Harness {
    engine: Arc<RoutingEngine>,
    balancer: Arc<LoadBalancer>,
    dids: Arc<MemoryDidRepository>,
    verifications: Arc<MemoryVerificationRepository>,
}

/// Standard seed: inbound `s1`, intermediates `s3a` (weight 2) and
/// `s3b` (weight 1), final `s4`, two DIDs owned by `s3a`
async fn harness(engine_config: EngineConfig, route: Route) -> Harness {
    let registry = Arc::new(PeerRegistry::new(Arc::new(MemoryPeerRepository::new())));
    let routes = Arc::new(RouteTable::new(Arc::new(MemoryRouteRepository::new())));
    let balancer = Arc::new(LoadBalancer::new(
        Arc::new(MemoryStatsRepository::new()),
        BalancerConfig {
            health_check_interval_secs: 30,
            recovery_cooldown_secs: 0,
        },
    ));
    let dids = Arc::new(MemoryDidRepository::new());
    let verifications = Arc::new(MemoryVerificationRepository::new());

    registry
        .add(Peer::new("s1", PeerType::Inbound, "192.168.1.10"))
        .await
        .unwrap();

    let mut s3a = Peer::new("s3a", PeerType::Intermediate, "10.0.0.20");
    s3a.weight = 2;
    registry.add(s3a).await.unwrap();

    let mut s3b = Peer::new("s3b", PeerType::Intermediate, "10.0.0.21");
    s3b.weight = 1;
    registry.add(s3b).await.unwrap();

    registry
        .add(Peer::new("s4", PeerType::Final, "172.16.0.30"))
        .await
        .unwrap();

    routes.add(route, &registry).await.unwrap();

    for number in ["18005550001", "18005550002"] {
        dids.upsert(&Did::new(number, "s3a")).await.unwrap();
    }

    let engine = Arc::new(RoutingEngine::new(
        registry,
        routes,
        balancer.clone(),
        dids.clone(),
        Arc::new(MemoryCallRepository::new()),
        verifications.clone(),
        engine_config,
    ));

    Harness {
        engine,
        balancer,
        dids,
        verifications,
    }
}

fn direct_route() -> Route {
    Route::new("r", "s1", "s3a", "s4", BalanceMode::Weighted)
}

fn pool_route() -> Route {
    Route::new("r", "s1", "intermediate", "s4", BalanceMode::Weighted)
}

fn host_of(next_hop: &str) -> &'static str {
    match next_hop {
        "endpoint-s3a" => "10.0.0.20",
        "endpoint-s3b" => "10.0.0.21",
        other => panic!("unexpected next hop {}", other),
    }
}

#[tokio::test]
async fn test_happy_path_four_legs() {
    let h = harness(EngineConfig::default(), direct_route()).await;

    // Leg 1: identities are swapped and the DID masks the destination
    let leg1 = h
        .engine
        .process_incoming("C1", "15550000001", "15550000002", "s1")
        .await
        .unwrap();
    let did = leg1.did_assigned.clone().unwrap();
    assert!(did == "18005550001" || did == "18005550002");
    assert_eq!(leg1.next_hop, "endpoint-s3a");
    assert_eq!(leg1.ani_to_send, "15550000002");
    assert_eq!(leg1.dnis_to_send, did);

    // Leg 3: original identities are restored for the final hop
    let leg3 = h
        .engine
        .process_return("15550000002", &did, "s3a", "10.0.0.20")
        .await
        .unwrap();
    assert_eq!(leg3.next_hop, "endpoint-s4");
    assert_eq!(leg3.ani_to_send, "15550000001");
    assert_eq!(leg3.dnis_to_send, "15550000002");
    assert!(leg3.did_assigned.is_none());

    let record = h.engine.active_calls().await.pop().unwrap();
    assert_eq!(record.status, CallStatus::ReturnedFromS3);

    // While live, the DID is bound to the original destination
    let bound = h.dids.find_by_number(&did).await.unwrap().unwrap();
    assert!(bound.in_use);
    assert_eq!(bound.destination.as_deref(), Some("15550000002"));

    // Leg 5: completion settles everything
    h.engine
        .process_final("C1", "15550000001", "15550000002", "s4", "172.16.0.30")
        .await
        .unwrap();

    assert!(h.engine.active_calls().await.is_empty());
    let released = h.dids.find_by_number(&did).await.unwrap().unwrap();
    assert!(released.is_free());
    assert!(released.destination.is_none());

    // One verification per traversed leg, all passing
    let checks = h.verifications.list_for_call("C1").await.unwrap();
    assert_eq!(checks.len(), 3);
    assert!(checks.iter().all(|v| v.verified));

    // Channel counters returned to zero
    assert_eq!(h.balancer.stats_for("s3a").await.active_calls, 0);
    assert_eq!(h.balancer.stats_for("s4").await.active_calls, 0);
}

#[tokio::test]
async fn test_unauthorized_return_leg() {
    let h = harness(EngineConfig::default(), direct_route()).await;

    let leg1 = h
        .engine
        .process_incoming("C1", "15550000001", "15550000002", "s1")
        .await
        .unwrap();
    let did = leg1.did_assigned.unwrap();

    let err = h
        .engine
        .process_return("15550000002", &did, "s3a", "10.0.0.99")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::UnauthorizedSource { .. }));

    let checks = h.verifications.list_for_call("C1").await.unwrap();
    assert!(checks.iter().any(|v| !v.verified));

    // Default policy: the DID stays bound until the sweep reclaims it
    let bound = h.dids.find_by_number(&did).await.unwrap().unwrap();
    assert!(bound.in_use);
}

#[tokio::test]
async fn test_unauthorized_return_releases_did_when_configured() {
    let config = EngineConfig {
        release_did_on_failed_verification: true,
        ..EngineConfig::default()
    };
    let h = harness(config, direct_route()).await;

    let leg1 = h
        .engine
        .process_incoming("C1", "15550000001", "15550000002", "s1")
        .await
        .unwrap();
    let did = leg1.did_assigned.unwrap();

    h.engine
        .process_return("15550000002", &did, "s3a", "10.0.0.99")
        .await
        .unwrap_err();

    let released = h.dids.find_by_number(&did).await.unwrap().unwrap();
    assert!(released.is_free());
    assert!(h.engine.active_calls().await.is_empty());
}

#[tokio::test]
async fn test_did_exhaustion_fails_third_call() {
    let h = harness(EngineConfig::default(), direct_route()).await;

    let first = h
        .engine
        .process_incoming("C1", "15550000001", "15550000002", "s1")
        .await
        .unwrap();
    let second = h
        .engine
        .process_incoming("C2", "15550000003", "15550000004", "s1")
        .await
        .unwrap();
    assert_ne!(first.did_assigned, second.did_assigned);

    let err = h
        .engine
        .process_incoming("C3", "15550000005", "15550000006", "s1")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NoDidAvailable(_)));

    // The failed call left no record behind
    let records = h.engine.active_calls().await;
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.call_id != "C3"));
}

#[tokio::test]
async fn test_duplicate_call_id_rejected_and_did_not_stranded() {
    let h = harness(EngineConfig::default(), direct_route()).await;

    h.engine
        .process_incoming("C1", "15550000001", "15550000002", "s1")
        .await
        .unwrap();
    let err = h
        .engine
        .process_incoming("C1", "15550000001", "15550000002", "s1")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AlreadyExists(_)));

    // Only the first call's DID may be bound
    let counts = h.dids.counts().await.unwrap();
    assert_eq!(counts.in_use, 1);
}

#[tokio::test]
async fn test_unknown_inbound_peer_has_no_route() {
    let h = harness(EngineConfig::default(), direct_route()).await;

    let err = h
        .engine
        .process_incoming("C1", "15550000001", "15550000002", "nobody")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NoRoute(_)));
}

#[tokio::test]
async fn test_abandonment_sweep_reclaims_stale_call() {
    let config = EngineConfig {
        stale_call_secs: 0,
        ..EngineConfig::default()
    };
    let h = harness(config, direct_route()).await;

    let leg1 = h
        .engine
        .process_incoming("C1", "15550000001", "15550000002", "s1")
        .await
        .unwrap();
    let did = leg1.did_assigned.unwrap();

    // No return leg ever arrives; the sweep reclaims the call
    let reclaimed = h.engine.sweep_stale_calls().await;
    assert_eq!(reclaimed, 1);

    assert!(h.engine.active_calls().await.is_empty());
    let released = h.dids.find_by_number(&did).await.unwrap().unwrap();
    assert!(released.is_free());

    // The abandonment counts as a failure against both selected peers
    let stats = h.balancer.stats_for("s3a").await;
    assert_eq!(stats.failed_calls, 1);
    assert_eq!(stats.active_calls, 0);
}

#[tokio::test]
async fn test_hangup_is_treated_as_abandonment() {
    let h = harness(EngineConfig::default(), direct_route()).await;

    let leg1 = h
        .engine
        .process_incoming("C1", "15550000001", "15550000002", "s1")
        .await
        .unwrap();
    let did = leg1.did_assigned.unwrap();

    h.engine.process_hangup("C1").await.unwrap();

    assert!(h.engine.active_calls().await.is_empty());
    assert!(h.dids.find_by_number(&did).await.unwrap().unwrap().is_free());

    // Hangup for an unknown call is a no-op
    h.engine.process_hangup("C-unknown").await.unwrap();
}

#[tokio::test]
async fn test_final_leg_falls_back_to_identity_lookup() {
    let h = harness(EngineConfig::default(), direct_route()).await;

    let leg1 = h
        .engine
        .process_incoming("C1", "15550000001", "15550000002", "s1")
        .await
        .unwrap();
    let did = leg1.did_assigned.unwrap();
    h.engine
        .process_return("15550000002", &did, "s3a", "10.0.0.20")
        .await
        .unwrap();

    // The final carrier minted a new call-id; correlation falls back to
    // the original identity pair
    h.engine
        .process_final(
            "some-other-id",
            "15550000001",
            "15550000002",
            "s4",
            "172.16.0.30",
        )
        .await
        .unwrap();

    assert!(h.engine.active_calls().await.is_empty());
}

#[tokio::test]
async fn test_ani_mismatch_on_return_is_tolerated_by_default() {
    let h = harness(EngineConfig::default(), direct_route()).await;

    let leg1 = h
        .engine
        .process_incoming("C1", "15550000001", "15550000002", "s1")
        .await
        .unwrap();
    let did = leg1.did_assigned.unwrap();

    // The carrier reformatted the number; the call proceeds anyway
    let leg3 = h
        .engine
        .process_return("+15550000002", &did, "s3a", "10.0.0.20")
        .await
        .unwrap();
    assert_eq!(leg3.next_hop, "endpoint-s4");
}

#[tokio::test]
async fn test_ani_mismatch_fatal_when_configured() {
    let config = EngineConfig {
        fail_on_ani_mismatch: true,
        ..EngineConfig::default()
    };
    let h = harness(config, direct_route()).await;

    let leg1 = h
        .engine
        .process_incoming("C1", "15550000001", "15550000002", "s1")
        .await
        .unwrap();
    let did = leg1.did_assigned.unwrap();

    let err = h
        .engine
        .process_return("+15550000002", &did, "s3a", "10.0.0.20")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidInput(_)));

    let checks = h.verifications.list_for_call("C1").await.unwrap();
    assert!(checks.iter().any(|v| !v.verified));
}

#[tokio::test]
async fn test_weighted_distribution_across_pool() {
    let h = harness(EngineConfig::default(), pool_route()).await;

    let mut s3a_selected = 0;
    for i in 0..300 {
        let call_id = format!("C{}", i);
        let ani = "15550000001";
        let dnis = "15550000002";

        let leg1 = h
            .engine
            .process_incoming(&call_id, ani, dnis, "s1")
            .await
            .unwrap();
        if leg1.next_hop == "endpoint-s3a" {
            s3a_selected += 1;
        }

        let did = leg1.did_assigned.unwrap();
        h.engine
            .process_return(dnis, &did, "s3", host_of(&leg1.next_hop))
            .await
            .unwrap();
        h.engine
            .process_final(&call_id, ani, dnis, "s4", "172.16.0.30")
            .await
            .unwrap();
    }

    // Weights 2:1 over 300 calls: expect about 200, allow wide slack
    assert!(
        (160..=240).contains(&s3a_selected),
        "s3a selected {} times",
        s3a_selected
    );
}

#[tokio::test]
async fn test_demoted_peer_is_excluded_then_recovers() {
    let h = harness(EngineConfig::default(), pool_route()).await;

    // 20 failed completions demote s3a
    for _ in 0..20 {
        h.balancer
            .update_stats("s3a", false, std::time::Duration::ZERO)
            .await;
    }
    assert!(!h.balancer.stats_for("s3a").await.healthy);

    for i in 0..5 {
        let call_id = format!("C{}", i);
        let leg1 = h
            .engine
            .process_incoming(&call_id, "15550000001", "15550000002", "s1")
            .await
            .unwrap();
        assert_eq!(leg1.next_hop, "endpoint-s3b");
        h.engine.process_hangup(&call_id).await.unwrap();
    }

    // Idle past the (zero) cooldown: the monitor re-includes the peer
    h.balancer.check_health().await;
    assert!(h.balancer.stats_for("s3a").await.healthy);

    let mut saw_s3a = false;
    for i in 5..35 {
        let call_id = format!("C{}", i);
        let ani = "15550000001";
        let dnis = "15550000002";
        let leg1 = h
            .engine
            .process_incoming(&call_id, ani, dnis, "s1")
            .await
            .unwrap();
        if leg1.next_hop == "endpoint-s3a" {
            saw_s3a = true;
        }
        let did = leg1.did_assigned.unwrap();
        h.engine
            .process_return(dnis, &did, "s3", host_of(&leg1.next_hop))
            .await
            .unwrap();
        h.engine
            .process_final(&call_id, ani, dnis, "s4", "172.16.0.30")
            .await
            .unwrap();
    }
    assert!(saw_s3a);
}

#[tokio::test]
async fn test_statistics_snapshot() {
    let h = harness(EngineConfig::default(), direct_route()).await;

    h.engine
        .process_incoming("C1", "15550000001", "15550000002", "s1")
        .await
        .unwrap();

    let stats = h.engine.statistics().await.unwrap();
    assert_eq!(stats.active_calls, 1);
    assert_eq!(stats.dids.total, 2);
    assert_eq!(stats.dids.in_use, 1);
    assert_eq!(stats.dids.available(), 1);
    assert_eq!(stats.peers["s1"].inbound, 1);
    assert_eq!(stats.peers["s3a"].intermediate, 1);
    assert_eq!(stats.peers["s4"].r#final, 1);
}
