//! Request and response types for the operator API

pub mod did;
pub mod peer;
pub mod route;

pub use did::{BulkDidRequest, DidRequest};
pub use peer::{PeerRequest, PeerResponse};
pub use route::RouteRequest;

use serde::Serialize;

/// Uniform envelope for successful responses
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}
