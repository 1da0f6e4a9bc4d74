//! Tandem call-routing mediator
//!
//! Sits between an inbound carrier, an intermediate carrier and a final
//! carrier, rewriting caller/called numbers on each traversal and
//! masking the true destination behind a pool number. Runs two
//! listeners: the AGI gateway the PBX dialplan talks to, and the
//! operator HTTP API.

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use std::env;
use std::sync::Arc;
use tandem_agi::AgiServer;
use tandem_api::ApiState;
use tandem_core::traits::{
    CallRepository, DidRepository, PeerRepository, RouteRepository, StatsRepository,
    VerificationRepository,
};
use tandem_core::AppConfig;
use tandem_db::memory::{
    MemoryCallRepository, MemoryDidRepository, MemoryPeerRepository, MemoryRouteRepository,
    MemoryStatsRepository, MemoryVerificationRepository,
};
use tandem_db::{
    create_pool, ensure_schema, PgCallRepository, PgDidRepository, PgPeerRepository,
    PgRouteRepository, PgStatsRepository, PgVerificationRepository,
};
use tandem_engine::{LoadBalancer, PeerRegistry, RouteTable, RoutingEngine};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

struct Stores {
    peers: Arc<dyn PeerRepository>,
    routes: Arc<dyn RouteRepository>,
    dids: Arc<dyn DidRepository>,
    calls: Arc<dyn CallRepository>,
    verifications: Arc<dyn VerificationRepository>,
    stats: Arc<dyn StatsRepository>,
}

/// Initialize tracing/logging
fn init_tracing() {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "tandem={},tandem_engine={},tandem_agi={},tandem_db={},tandem_api={},actix_web=info,sqlx=warn",
            log_level, log_level, log_level, log_level, log_level
        ))
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true))
        .init();
}

/// Build the backing stores: PostgreSQL when configured, in-memory
/// otherwise
async fn build_stores(config: &AppConfig) -> Stores {
    if config.has_database() {
        info!("Connecting to database...");
        let pool = create_pool(&config.database.url, Some(config.database.max_connections))
            .await
            .expect("Failed to create database pool");
        ensure_schema(&pool).await.expect("Failed to bootstrap schema");

        Stores {
            peers: Arc::new(PgPeerRepository::new(pool.clone())),
            routes: Arc::new(PgRouteRepository::new(pool.clone())),
            dids: Arc::new(PgDidRepository::new(pool.clone())),
            calls: Arc::new(PgCallRepository::new(pool.clone())),
            verifications: Arc::new(PgVerificationRepository::new(pool.clone())),
            stats: Arc::new(PgStatsRepository::new(pool)),
        }
    } else {
        warn!("No database configured; running on in-memory state only (lost on restart)");
        Stores {
            peers: Arc::new(MemoryPeerRepository::new()),
            routes: Arc::new(MemoryRouteRepository::new()),
            dids: Arc::new(MemoryDidRepository::new()),
            calls: Arc::new(MemoryCallRepository::new()),
            verifications: Arc::new(MemoryVerificationRepository::new()),
            stats: Arc::new(MemoryStatsRepository::new()),
        }
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    info!("Starting tandem v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load().expect("Failed to load configuration");
    let stores = build_stores(&config).await;

    // Registries are built once here and threaded through everything
    let registry = Arc::new(PeerRegistry::new(stores.peers));
    let routes = Arc::new(RouteTable::new(stores.routes));
    registry.load().await.expect("Failed to load peers");
    routes.load().await.expect("Failed to load routes");

    let balancer = Arc::new(LoadBalancer::new(stores.stats, config.balancer.clone()));
    let engine = Arc::new(RoutingEngine::new(
        registry.clone(),
        routes.clone(),
        balancer.clone(),
        stores.dids.clone(),
        stores.calls,
        stores.verifications,
        config.engine.clone(),
    ));

    tokio::spawn(balancer.clone().run_health_monitor());
    tokio::spawn(engine.clone().run_cleanup());

    // AGI gateway for the call-control front-end
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let agi_server = AgiServer::new(engine.clone(), config.agi_addr());
    tokio::spawn(async move {
        if let Err(e) = agi_server.run(shutdown_rx).await {
            error!("AGI server error: {}", e);
        }
    });

    // Operator HTTP API
    let bind_addr = config.server_addr();
    let workers = config.server.workers;
    info!("Starting operator API on {} with {} workers", bind_addr, workers);

    let api_state = web::Data::new(ApiState {
        registry,
        routes,
        dids: stores.dids,
        engine,
        balancer,
    });

    HttpServer::new(move || {
        App::new()
            .app_data(api_state.clone())
            .wrap(Cors::permissive())
            .wrap(middleware::Logger::new("%a \"%r\" %s %b %Dms"))
            .wrap(middleware::NormalizePath::trim())
            .configure(tandem_api::configure)
    })
    .workers(workers)
    .bind(&bind_addr)?
    .run()
    .await?;

    let _ = shutdown_tx.send(true);
    info!("Shutdown complete");
    Ok(())
}
