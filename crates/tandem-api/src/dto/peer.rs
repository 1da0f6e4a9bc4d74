//! Peer DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tandem_core::models::{AuthMode, Peer, PeerType};
use validator::Validate;

/// Create/update a peer
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PeerRequest {
    /// Unique peer name
    #[validate(length(min = 1, message = "Peer name is required"))]
    pub name: String,

    /// inbound | intermediate | final
    pub peer_type: PeerType,

    /// Host address
    #[validate(length(min = 1, message = "Peer host is required"))]
    pub host: String,

    /// SIP port (default 5060)
    #[serde(default)]
    pub port: u16,

    /// Username for credential auth
    pub username: Option<String>,

    /// Password for credential auth
    pub password: Option<String>,

    /// Authentication mode; inferred when omitted
    pub auth_mode: Option<AuthMode>,

    /// Codec preference list (default ulaw/alaw)
    #[serde(default)]
    pub codecs: Vec<String>,

    /// Channel cap, 0 = unbounded
    #[serde(default)]
    pub max_channels: u32,

    /// Route selection priority
    #[serde(default)]
    pub priority: i32,

    /// Load-balance weight
    #[serde(default = "default_weight")]
    pub weight: u32,

    /// Whether the peer participates in routing
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_weight() -> u32 {
    1
}

fn default_active() -> bool {
    true
}

impl PeerRequest {
    /// Convert to a Peer entity (defaults applied by the registry)
    pub fn into_peer(self) -> Peer {
        let now = Utc::now();
        Peer {
            name: self.name,
            peer_type: self.peer_type,
            host: self.host,
            port: self.port,
            username: self.username,
            password: self.password,
            auth_mode: self.auth_mode.unwrap_or_default(),
            codecs: self.codecs,
            max_channels: self.max_channels,
            priority: self.priority,
            weight: self.weight,
            active: self.active,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Peer as presented to the operator (credentials withheld)
#[derive(Debug, Clone, Serialize)]
pub struct PeerResponse {
    pub name: String,
    pub peer_type: PeerType,
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub auth_mode: AuthMode,
    pub codecs: Vec<String>,
    pub max_channels: u32,
    pub priority: i32,
    pub weight: u32,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Peer> for PeerResponse {
    fn from(peer: Peer) -> Self {
        Self {
            name: peer.name,
            peer_type: peer.peer_type,
            host: peer.host,
            port: peer.port,
            username: peer.username,
            auth_mode: peer.auth_mode,
            codecs: peer.codecs,
            max_channels: peer.max_channels,
            priority: peer.priority,
            weight: peer.weight,
            active: peer.active,
            created_at: peer.created_at,
            updated_at: peer.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_validation() {
        let valid = PeerRequest {
            name: "s1".to_string(),
            peer_type: PeerType::Inbound,
            host: "192.168.1.10".to_string(),
            port: 0,
            username: None,
            password: None,
            auth_mode: None,
            codecs: Vec::new(),
            max_channels: 0,
            priority: 0,
            weight: 1,
            active: true,
        };
        assert!(valid.validate().is_ok());

        let invalid = PeerRequest {
            name: "".to_string(),
            ..valid
        };
        assert!(invalid.validate().is_err());
    }

    #[test]
    fn test_response_withholds_password() {
        let mut peer = Peer::new("s3a", PeerType::Intermediate, "10.0.0.20");
        peer.password = Some("secret".to_string());
        let response = PeerResponse::from(peer);
        let json = serde_json::to_string(&response).unwrap();
        assert!(!json.contains("secret"));
    }
}
