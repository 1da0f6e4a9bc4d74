//! Routing engine for tandem
//!
//! This crate holds the mediator's hot path: the in-memory peer registry
//! and route table, the load balancer, the dual-index ledger of live
//! calls, and the routing engine that drives a call through its four
//! legs while masking the destination behind a pool number.

pub mod balancer;
pub mod engine;
pub mod ledger;
pub mod registry;
pub mod routes;

pub use balancer::LoadBalancer;
pub use engine::{EngineStats, RoutingEngine};
pub use ledger::CallLedger;
pub use registry::PeerRegistry;
pub use routes::RouteTable;
