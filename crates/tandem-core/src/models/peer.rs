//! Peer model
//!
//! A peer is an external SIP endpoint: the inbound carrier handing us
//! calls, the intermediate carrier we bounce them through, or the final
//! carrier that terminates them.

use crate::{AppError, AppResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Position of a peer in the four-leg topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeerType {
    /// Originating carrier (S1)
    Inbound,
    /// Masking carrier the call is bounced through (S3)
    Intermediate,
    /// Terminating carrier (S4)
    Final,
}

impl fmt::Display for PeerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerType::Inbound => write!(f, "inbound"),
            PeerType::Intermediate => write!(f, "intermediate"),
            PeerType::Final => write!(f, "final"),
        }
    }
}

impl PeerType {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "inbound" => Some(PeerType::Inbound),
            "intermediate" => Some(PeerType::Intermediate),
            "final" => Some(PeerType::Final),
            _ => None,
        }
    }
}

/// How a peer is authenticated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    /// Trust the configured host address
    Ip,
    /// SIP digest credentials
    #[default]
    Credentials,
    /// Both address and credentials
    Both,
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMode::Ip => write!(f, "ip"),
            AuthMode::Credentials => write!(f, "credentials"),
            AuthMode::Both => write!(f, "both"),
        }
    }
}

impl AuthMode {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "ip" => Some(AuthMode::Ip),
            "credentials" => Some(AuthMode::Credentials),
            "both" => Some(AuthMode::Both),
            _ => None,
        }
    }
}

/// An external SIP endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Peer {
    /// Unique peer name
    pub name: String,

    /// Position in the call topology
    pub peer_type: PeerType,

    /// Host address (dotted-quad or hostname); the trusted source
    /// address when `auth_mode` is `ip` or `both`
    pub host: String,

    /// SIP port
    pub port: u16,

    /// Username for credential auth (empty for IP-only peers)
    pub username: Option<String>,

    /// Password for credential auth
    pub password: Option<String>,

    /// Authentication mode
    pub auth_mode: AuthMode,

    /// Ordered codec preference list
    pub codecs: Vec<String>,

    /// Maximum concurrent channels (0 = unbounded)
    pub max_channels: u32,

    /// Route selection priority
    pub priority: i32,

    /// Weight for weighted load balancing
    pub weight: u32,

    /// Whether the peer participates in routing
    pub active: bool,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Peer {
    /// Create a peer with defaults applied
    pub fn new(name: impl Into<String>, peer_type: PeerType, host: impl Into<String>) -> Self {
        let now = Utc::now();
        let mut peer = Peer {
            name: name.into(),
            peer_type,
            host: host.into(),
            port: 0,
            username: None,
            password: None,
            auth_mode: AuthMode::Credentials,
            codecs: Vec::new(),
            max_channels: 0,
            priority: 0,
            weight: 1,
            active: true,
            created_at: now,
            updated_at: now,
        };
        peer.apply_defaults();
        peer
    }

    /// Fill in the defaults the operator is allowed to omit: port 5060,
    /// ulaw/alaw codecs, and IP auth when no credentials are given
    pub fn apply_defaults(&mut self) {
        if self.port == 0 {
            self.port = 5060;
        }
        if self.codecs.is_empty() {
            self.codecs = vec!["ulaw".to_string(), "alaw".to_string()];
        }
        if self.username.as_deref().unwrap_or("").is_empty()
            && self.password.as_deref().unwrap_or("").is_empty()
        {
            self.auth_mode = AuthMode::Ip;
        }
        if self.weight == 0 {
            self.weight = 1;
        }
    }

    /// Check required fields
    pub fn validate(&self) -> AppResult<()> {
        if self.name.is_empty() {
            return Err(AppError::Validation("peer name is required".to_string()));
        }
        if self.host.is_empty() {
            return Err(AppError::Validation("peer host is required".to_string()));
        }
        Ok(())
    }

    /// Whether returning legs from this peer must originate from its
    /// configured host
    pub fn trusts_source_ip(&self) -> bool {
        matches!(self.auth_mode, AuthMode::Ip | AuthMode::Both)
    }
}

/// How a route addresses its intermediate/final hop: a single peer by
/// name, or every active peer of a type (a load-balance pool)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerSelector {
    ByName(String),
    ByType(PeerType),
}

impl fmt::Display for PeerSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerSelector::ByName(name) => write!(f, "{}", name),
            PeerSelector::ByType(t) => write!(f, "{}", t),
        }
    }
}
