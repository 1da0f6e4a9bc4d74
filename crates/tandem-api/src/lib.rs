//! Operator HTTP API for tandem
//!
//! CRUD over the three registries (peers, routes, DIDs) plus live-call
//! and statistics surfaces. This is the operator's driver for the
//! mediator; the call path never goes through HTTP.

pub mod dto;
pub mod handlers;

use std::sync::Arc;
use tandem_core::traits::DidRepository;
use tandem_engine::{LoadBalancer, PeerRegistry, RouteTable, RoutingEngine};

/// Shared state handed to every handler
pub struct ApiState {
    pub registry: Arc<PeerRegistry>,
    pub routes: Arc<RouteTable>,
    pub dids: Arc<dyn DidRepository>,
    pub engine: Arc<RoutingEngine>,
    pub balancer: Arc<LoadBalancer>,
}

/// Configure all API routes under `/api/v1`
pub fn configure(cfg: &mut actix_web::web::ServiceConfig) {
    cfg.service(
        actix_web::web::scope("/api/v1")
            .configure(handlers::status::configure)
            .configure(handlers::peer::configure)
            .configure(handlers::route::configure)
            .configure(handlers::did::configure),
    );
}
