//! Gateway protocol tests
//!
//! Drives full AGI sessions against an engine backed by in-memory
//! stores, with a scripted front-end answering the variable commands the
//! way the dialplan would.

use std::collections::HashMap;
use std::sync::Arc;
use tandem_agi::server::handle_session;
use tandem_core::config::{BalancerConfig, EngineConfig};
use tandem_core::models::{BalanceMode, Did, Peer, PeerType, Route};
use tandem_core::traits::DidRepository;
use tandem_db::memory::{
    MemoryCallRepository, MemoryDidRepository, MemoryPeerRepository, MemoryRouteRepository,
    MemoryStatsRepository, MemoryVerificationRepository,
};
use tandem_engine::{LoadBalancer, PeerRegistry, RouteTable, RoutingEngine};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

async fn engine() -> (Arc<RoutingEngine>, Arc<MemoryDidRepository>) {
    let registry = Arc::new(PeerRegistry::new(Arc::new(MemoryPeerRepository::new())));
    let routes = Arc::new(RouteTable::new(Arc::new(MemoryRouteRepository::new())));
    let balancer = Arc::new(LoadBalancer::new(
        Arc::new(MemoryStatsRepository::new()),
        BalancerConfig::default(),
    ));
    let dids = Arc::new(MemoryDidRepository::new());

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
    routes
        .add(
            Route::new("r", "s1", "s3a", "s4", BalanceMode::RoundRobin),
            &registry,
        )
        .await
        .unwrap();
    dids.upsert(&Did::new("18005550001", "s3a")).await.unwrap();

    let engine = Arc::new(RoutingEngine::new(
        registry,
        routes,
        balancer,
        dids.clone(),
        Arc::new(MemoryCallRepository::new()),
        Arc::new(MemoryVerificationRepository::new()),
        EngineConfig::default(),
    ));
    (engine, dids)
}

/// Run one session: send `headers`, answer commands like the dialplan
/// would, and return (variables set by the gateway, final status line)
async fn run_session(
    engine: Arc<RoutingEngine>,
    headers: &str,
    source_ip: &str,
) -> (HashMap<String, String>, String) {
    let (client, server) = tokio::io::duplex(4096);
    let (client_read, mut client_write) = tokio::io::split(client);
    let (server_read, server_write) = tokio::io::split(server);

    let gateway = tokio::spawn(async move {
        handle_session(&engine, BufReader::new(server_read), server_write).await
    });

    client_write.write_all(headers.as_bytes()).await.unwrap();
    client_write.write_all(b"\n").await.unwrap();

    let mut reader = BufReader::new(client_read);
    let mut variables = HashMap::new();
    let mut status = String::new();
    let mut line = String::new();

    loop {
        line.clear();
        if reader.read_line(&mut line).await.unwrap() == 0 {
            break;
        }
        let trimmed = line.trim().to_string();

        if let Some(rest) = trimmed.strip_prefix("SET VARIABLE ") {
            if let Some((name, value)) = rest.split_once(' ') {
                variables.insert(name.to_string(), value.trim_matches('"').to_string());
            }
            client_write.write_all(b"200 result=1\n").await.unwrap();
        } else if trimmed.starts_with("GET VARIABLE SOURCE_IP") {
            client_write
                .write_all(format!("200 result=1 ({})\n", source_ip).as_bytes())
                .await
                .unwrap();
        } else if trimmed.starts_with("200 result=") {
            status = trimmed;
            break;
        }
    }

    gateway.await.unwrap().unwrap();
    (variables, status)
}

#[tokio::test]
async fn test_incoming_session_sets_routing_variables() {
    let (engine, _) = engine().await;

    let headers = "agi_request: agi://127.0.0.1/processIncoming\n\
                   agi_uniqueid: C1\n\
                   agi_callerid: 15550000001\n\
                   agi_extension: 15550000002\n\
                   agi_channel: PJSIP/endpoint-s1-00000001\n";

    let (variables, status) = run_session(engine, headers, "").await;

    assert_eq!(status, "200 result=1");
    assert_eq!(variables["ROUTER_STATUS"], "success");
    assert_eq!(variables["DID_ASSIGNED"], "18005550001");
    assert_eq!(variables["NEXT_HOP"], "endpoint-s3a");
    assert_eq!(variables["ANI_TO_SEND"], "15550000002");
    assert_eq!(variables["DNIS_TO_SEND"], "18005550001");
}

#[tokio::test]
async fn test_full_call_over_gateway() {
    let (engine, dids) = engine().await;

    let leg1 = "agi_request: agi://127.0.0.1/processIncoming\n\
                agi_uniqueid: C1\n\
                agi_callerid: 15550000001\n\
                agi_extension: 15550000002\n\
                agi_channel: PJSIP/endpoint-s1-00000001\n";
    let (variables, _) = run_session(engine.clone(), leg1, "").await;
    assert_eq!(variables["ROUTER_STATUS"], "success");

    let leg3 = "agi_request: agi://127.0.0.1/processReturn\n\
                agi_uniqueid: C1-return\n\
                agi_callerid: 15550000002\n\
                agi_extension: 18005550001\n\
                agi_channel: PJSIP/endpoint-s3a-00000002\n";
    let (variables, _) = run_session(engine.clone(), leg3, "10.0.0.20").await;
    assert_eq!(variables["ROUTER_STATUS"], "success");
    assert_eq!(variables["NEXT_HOP"], "endpoint-s4");
    assert_eq!(variables["ANI_TO_SEND"], "15550000001");
    assert_eq!(variables["DNIS_TO_SEND"], "15550000002");

    let leg5 = "agi_request: agi://127.0.0.1/processFinal\n\
                agi_uniqueid: C1\n\
                agi_callerid: 15550000001\n\
                agi_extension: 15550000002\n\
                agi_channel: PJSIP/endpoint-s4-00000003\n";
    let (variables, _) = run_session(engine.clone(), leg5, "172.16.0.30").await;
    assert_eq!(variables["ROUTER_STATUS"], "success");

    assert!(engine.active_calls().await.is_empty());
    let did = dids.find_by_number("18005550001").await.unwrap().unwrap();
    assert!(did.is_free());
}

#[tokio::test]
async fn test_failed_call_reports_error_token() {
    let (engine, _) = engine().await;

    // Unknown inbound peer: no route
    let headers = "agi_request: agi://127.0.0.1/processIncoming\n\
                   agi_uniqueid: C1\n\
                   agi_callerid: 15550000001\n\
                   agi_extension: 15550000002\n\
                   agi_channel: PJSIP/endpoint-nobody-00000001\n";

    let (variables, status) = run_session(engine, headers, "").await;

    assert_eq!(status, "200 result=1");
    assert_eq!(variables["ROUTER_STATUS"], "failed");
    assert!(variables["ROUTER_ERROR"].contains("nobody"));
}

#[tokio::test]
async fn test_unknown_request_fails_the_script() {
    let (engine, _) = engine().await;

    let headers = "agi_request: agi://127.0.0.1/somethingElse\n\
                   agi_uniqueid: C1\n";

    let (_, status) = run_session(engine, headers, "").await;
    assert_eq!(status, "200 result=0");
}

#[tokio::test]
async fn test_unauthorized_return_over_gateway() {
    let (engine, dids) = engine().await;

    let leg1 = "agi_request: agi://127.0.0.1/processIncoming\n\
                agi_uniqueid: C1\n\
                agi_callerid: 15550000001\n\
                agi_extension: 15550000002\n\
                agi_channel: PJSIP/endpoint-s1-00000001\n";
    run_session(engine.clone(), leg1, "").await;

    let leg3 = "agi_request: agi://127.0.0.1/processReturn\n\
                agi_uniqueid: C1-return\n\
                agi_callerid: 15550000002\n\
                agi_extension: 18005550001\n\
                agi_channel: PJSIP/endpoint-s3a-00000002\n";
    let (variables, _) = run_session(engine.clone(), leg3, "10.0.0.99").await;

    assert_eq!(variables["ROUTER_STATUS"], "failed");
    assert!(variables["ROUTER_ERROR"].contains("10.0.0.99"));

    // Default policy keeps the DID bound for the sweep
    let did = dids.find_by_number("18005550001").await.unwrap().unwrap();
    assert!(did.in_use);
}
