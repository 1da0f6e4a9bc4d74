//! Route DTOs

use serde::Deserialize;
use tandem_core::models::{BalanceMode, Route};
use validator::Validate;

/// Create/update a route
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RouteRequest {
    /// Unique route name
    #[validate(length(min = 1, message = "Route name is required"))]
    pub name: String,

    /// Inbound peer name
    #[validate(length(min = 1, message = "Inbound peer is required"))]
    pub inbound_peer: String,

    /// Intermediate hop: peer name or type pool
    #[validate(length(min = 1, message = "Intermediate peer is required"))]
    pub intermediate_peer: String,

    /// Final hop: peer name or type pool
    #[validate(length(min = 1, message = "Final peer is required"))]
    pub final_peer: String,

    /// Load-balance mode
    #[serde(default)]
    pub mode: BalanceMode,

    /// Resolution priority
    #[serde(default)]
    pub priority: i32,

    /// Whether the route participates in resolution
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl RouteRequest {
    /// Convert to a Route entity
    pub fn into_route(self) -> Route {
        let mut route = Route::new(
            self.name,
            self.inbound_peer,
            self.intermediate_peer,
            self.final_peer,
            self.mode,
        );
        route.priority = self.priority;
        route.active = self.active;
        route
    }
}
