//! Domain models for tandem
//!
//! This module contains all the core domain models used throughout the mediator.

pub mod call;
pub mod did;
pub mod peer;
pub mod route;
pub mod stats;

pub use call::{CallRecord, CallResponse, CallStatus, CallStep, Verification};
pub use did::{Did, DidCounts};
pub use peer::{AuthMode, Peer, PeerSelector, PeerType};
pub use route::{BalanceMode, Route};
pub use stats::PeerStats;
