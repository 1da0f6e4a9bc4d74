//! Per-peer load balancer statistics

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Health and throughput accounting for one peer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerStats {
    /// Peer name
    pub peer_name: String,

    /// Calls routed through this peer since the last reset
    pub total_calls: i64,

    /// Channels currently in use
    pub active_calls: i64,

    /// Failed calls since the last reset
    pub failed_calls: i64,

    /// (total - failed) / total, in percent
    pub success_rate: f64,

    /// Running mean duration of successful calls, in seconds
    pub avg_duration_secs: f64,

    /// When the peer last carried a call
    pub last_call_time: Option<DateTime<Utc>>,

    /// Whether the balancer considers the peer usable
    pub healthy: bool,
}

impl PeerStats {
    /// Fresh stats for a peer nothing has been observed about yet
    pub fn new(peer_name: impl Into<String>) -> Self {
        PeerStats {
            peer_name: peer_name.into(),
            total_calls: 0,
            active_calls: 0,
            failed_calls: 0,
            success_rate: 100.0,
            avg_duration_secs: 0.0,
            last_call_time: None,
            healthy: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_stats_are_healthy() {
        let stats = PeerStats::new("s3a");
        assert!(stats.healthy);
        assert_eq!(stats.total_calls, 0);
        assert_eq!(stats.success_rate, 100.0);
        assert!(stats.last_call_time.is_none());
    }
}
