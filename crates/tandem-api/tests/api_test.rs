//! Operator API tests
//!
//! Exercises the HTTP surface against in-memory stores.

use actix_web::{test, web, App};
use std::sync::Arc;
use tandem_api::{configure, ApiState};
use tandem_core::config::{BalancerConfig, EngineConfig};
use tandem_db::memory::{
    MemoryCallRepository, MemoryDidRepository, MemoryPeerRepository, MemoryRouteRepository,
    MemoryStatsRepository, MemoryVerificationRepository,
};
use tandem_engine::{LoadBalancer, PeerRegistry, RouteTable, RoutingEngine};

fn state() -> ApiState {
    let registry = Arc::new(PeerRegistry::new(Arc::new(MemoryPeerRepository::new())));
    let routes = Arc::new(RouteTable::new(Arc::new(MemoryRouteRepository::new())));
    let balancer = Arc::new(LoadBalancer::new(
        Arc::new(MemoryStatsRepository::new()),
        BalancerConfig::default(),
    ));
    let dids = Arc::new(MemoryDidRepository::new());

    let engine = Arc::new(RoutingEngine::new(
        registry.clone(),
        routes.clone(),
        balancer.clone(),
        dids.clone(),
        Arc::new(MemoryCallRepository::new()),
        Arc::new(MemoryVerificationRepository::new()),
        EngineConfig::default(),
    ));

    ApiState {
        registry,
        routes,
        dids,
        engine,
        balancer,
    }
}

#[actix_web::test]
async fn test_health_endpoint() {
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state()))
            .configure(configure),
    )
    .await;

    let req = test::TestRequest::get().uri("/api/v1/health").to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
}

#[actix_web::test]
async fn test_peer_crud() {
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state()))
            .configure(configure),
    )
    .await;

    let create = test::TestRequest::post()
        .uri("/api/v1/peers")
        .set_json(serde_json::json!({
            "name": "s1",
            "peer_type": "inbound",
            "host": "192.168.1.10"
        }))
        .to_request();
    let resp = test::call_service(&app, create).await;
    assert_eq!(resp.status().as_u16(), 201);

    let get = test::TestRequest::get().uri("/api/v1/peers/s1").to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, get).await;
    assert_eq!(body["data"]["name"], "s1");
    // Defaults applied on the way in
    assert_eq!(body["data"]["port"], 5060);
    assert_eq!(body["data"]["auth_mode"], "ip");

    let delete = test::TestRequest::delete()
        .uri("/api/v1/peers/s1")
        .to_request();
    let resp = test::call_service(&app, delete).await;
    assert_eq!(resp.status().as_u16(), 204);

    let missing = test::TestRequest::get().uri("/api/v1/peers/s1").to_request();
    let resp = test::call_service(&app, missing).await;
    assert_eq!(resp.status().as_u16(), 404);
}

#[actix_web::test]
async fn test_peer_delete_refused_while_routed() {
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state()))
            .configure(configure),
    )
    .await;

    for (name, peer_type, host) in [
        ("s1", "inbound", "192.168.1.10"),
        ("s3a", "intermediate", "10.0.0.20"),
        ("s4", "final", "172.16.0.30"),
    ] {
        let req = test::TestRequest::post()
            .uri("/api/v1/peers")
            .set_json(serde_json::json!({
                "name": name, "peer_type": peer_type, "host": host
            }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status().as_u16(), 201);
    }

    let route = test::TestRequest::post()
        .uri("/api/v1/routes")
        .set_json(serde_json::json!({
            "name": "r",
            "inbound_peer": "s1",
            "intermediate_peer": "s3a",
            "final_peer": "s4",
            "mode": "weighted"
        }))
        .to_request();
    assert_eq!(test::call_service(&app, route).await.status().as_u16(), 201);

    let delete = test::TestRequest::delete()
        .uri("/api/v1/peers/s3a")
        .to_request();
    let resp = test::call_service(&app, delete).await;
    assert_eq!(resp.status().as_u16(), 409);
}

#[actix_web::test]
async fn test_did_pool_endpoints() {
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state()))
            .configure(configure),
    )
    .await;

    let peer = test::TestRequest::post()
        .uri("/api/v1/peers")
        .set_json(serde_json::json!({
            "name": "s3a", "peer_type": "intermediate", "host": "10.0.0.20"
        }))
        .to_request();
    test::call_service(&app, peer).await;

    let bulk = test::TestRequest::post()
        .uri("/api/v1/dids/bulk")
        .set_json(serde_json::json!({
            "numbers": ["18005550001", "18005550002"],
            "owner_peer": "s3a"
        }))
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, bulk).await;
    assert_eq!(body["data"]["added"], 2);

    let list = test::TestRequest::get()
        .uri("/api/v1/dids?in_use=false")
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, list).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    // Unknown owner is refused
    let orphan = test::TestRequest::post()
        .uri("/api/v1/dids")
        .set_json(serde_json::json!({
            "number": "18005550003",
            "owner_peer": "nobody"
        }))
        .to_request();
    let resp = test::call_service(&app, orphan).await;
    assert_eq!(resp.status().as_u16(), 404);
}

#[actix_web::test]
async fn test_stats_endpoints() {
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state()))
            .configure(configure),
    )
    .await;

    let stats = test::TestRequest::get().uri("/api/v1/stats").to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, stats).await;
    assert_eq!(body["data"]["active_calls"], 0);
    assert_eq!(body["data"]["dids"]["total"], 0);

    let calls = test::TestRequest::get().uri("/api/v1/calls").to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, calls).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 0);
}
