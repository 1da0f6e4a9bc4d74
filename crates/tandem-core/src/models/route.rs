//! Route model
//!
//! A route ties an inbound peer to the intermediate and final hops its
//! calls take, plus the load-balance mode used when a hop addresses a
//! pool of peers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Load-balance policy for peer selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BalanceMode {
    /// Cycle through candidates in turn
    #[default]
    RoundRobin,
    /// Random draw proportional to peer weight
    Weighted,
    /// Highest priority wins
    Priority,
    /// Highest priority healthy peer, falling back to highest priority
    Failover,
}

impl fmt::Display for BalanceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BalanceMode::RoundRobin => write!(f, "round_robin"),
            BalanceMode::Weighted => write!(f, "weighted"),
            BalanceMode::Priority => write!(f, "priority"),
            BalanceMode::Failover => write!(f, "failover"),
        }
    }
}

impl BalanceMode {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "round_robin" => Some(BalanceMode::RoundRobin),
            "weighted" => Some(BalanceMode::Weighted),
            "priority" => Some(BalanceMode::Priority),
            "failover" => Some(BalanceMode::Failover),
            _ => None,
        }
    }
}

/// An operator-defined routing path
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    /// Unique route name
    pub name: String,

    /// Inbound peer this route applies to
    pub inbound_peer: String,

    /// Intermediate hop: a peer name or a peer type (pool)
    pub intermediate_peer: String,

    /// Final hop: a peer name or a peer type (pool)
    pub final_peer: String,

    /// Selection policy when a hop resolves to several peers
    pub mode: BalanceMode,

    /// Resolution priority among routes for the same inbound peer
    pub priority: i32,

    /// Whether the route participates in resolution
    pub active: bool,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Route {
    /// Create an active route with default priority
    pub fn new(
        name: impl Into<String>,
        inbound_peer: impl Into<String>,
        intermediate_peer: impl Into<String>,
        final_peer: impl Into<String>,
        mode: BalanceMode,
    ) -> Self {
        Route {
            name: name.into(),
            inbound_peer: inbound_peer.into(),
            intermediate_peer: intermediate_peer.into(),
            final_peer: final_peer.into(),
            mode,
            priority: 0,
            active: true,
            created_at: Utc::now(),
        }
    }
}
