//! Unified error handling for tandem
//!
//! This module provides a comprehensive error type that covers all failure
//! scenarios in the mediator, with automatic HTTP response mapping for the
//! operator API and stable error codes for the call-control front-end.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

/// Main application error type
///
/// All errors in the application should be converted to this type.
/// It implements `ResponseError` for automatic HTTP response generation;
/// `error_code()` yields the stable token handed back to the call-control
/// front-end in `ROUTER_ERROR`.
#[derive(Error, Debug)]
pub enum AppError {
    // ==================== Routing Errors ====================
    #[error("No active route for inbound peer: {0}")]
    NoRoute(String),

    #[error("No healthy peers available for selection")]
    NoHealthyPeers,

    #[error("No available DIDs for peer: {0}")]
    NoDidAvailable(String),

    #[error("Unauthorized source IP: expected {expected}, got {received}")]
    UnauthorizedSource { expected: String, received: String },

    #[error("Call not found: {0}")]
    CallNotFound(String),

    // ==================== Registry Errors ====================
    #[error("Peer not found: {0}")]
    PeerNotFound(String),

    #[error("Route not found: {0}")]
    RouteNotFound(String),

    #[error("DID not found: {0}")]
    DidNotFound(String),

    #[error("Peer {name} is referenced by {count} route(s)")]
    PeerInUse { name: String, count: usize },

    #[error("DID {0} is currently assigned to a call")]
    DidInUse(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    // ==================== Validation Errors ====================
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // ==================== Storage Errors ====================
    #[error("Database error: {0}")]
    Database(String),

    #[error("Database pool error: {0}")]
    Pool(String),

    // ==================== Gateway Errors ====================
    #[error("Gateway protocol error: {0}")]
    Protocol(String),

    // ==================== Internal Errors ====================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::Validation(_) | AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,

            // 403 Forbidden
            AppError::UnauthorizedSource { .. } => StatusCode::FORBIDDEN,

            // 404 Not Found
            AppError::NoRoute(_)
            | AppError::CallNotFound(_)
            | AppError::PeerNotFound(_)
            | AppError::RouteNotFound(_)
            | AppError::DidNotFound(_) => StatusCode::NOT_FOUND,

            // 409 Conflict
            AppError::PeerInUse { .. } | AppError::DidInUse(_) | AppError::AlreadyExists(_) => {
                StatusCode::CONFLICT
            }

            // 503 Service Unavailable
            AppError::NoHealthyPeers | AppError::NoDidAvailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }

            // 500 Internal Server Error
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the stable error code for API responses and `ROUTER_ERROR`
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::NoRoute(_) => "no_route",
            AppError::NoHealthyPeers => "no_healthy_peers",
            AppError::NoDidAvailable(_) => "no_did",
            AppError::UnauthorizedSource { .. } => "unauthorized_source",
            AppError::CallNotFound(_) => "call_not_found",
            AppError::PeerNotFound(_) => "peer_not_found",
            AppError::RouteNotFound(_) => "route_not_found",
            AppError::DidNotFound(_) => "did_not_found",
            AppError::PeerInUse { .. } => "peer_in_use",
            AppError::DidInUse(_) => "did_in_use",
            AppError::AlreadyExists(_) => "already_exists",
            AppError::Validation(_) => "validation_error",
            AppError::InvalidInput(_) => "invalid_input",
            AppError::Database(_) => "database_error",
            AppError::Pool(_) => "pool_error",
            AppError::Protocol(_) => "protocol_error",
            AppError::Config(_) => "config_error",
            AppError::Serialization(_) => "serialization_error",
            AppError::Internal(_) => "internal_error",
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        AppError::status_code(self)
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let body = json!({
            "error": self.error_code(),
            "message": self.to_string(),
            "status": status.as_u16(),
        });

        HttpResponse::build(status).json(body)
    }
}

// ==================== From implementations ====================

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            AppError::NoRoute("s1".to_string()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::NoHealthyPeers.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AppError::UnauthorizedSource {
                expected: "10.0.0.20".to_string(),
                received: "10.0.0.99".to_string()
            }
            .status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::PeerInUse {
                name: "s3a".to_string(),
                count: 2
            }
            .status_code(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            AppError::NoDidAvailable("s3a".to_string()).error_code(),
            "no_did"
        );
        assert_eq!(
            AppError::CallNotFound("c1".to_string()).error_code(),
            "call_not_found"
        );
        assert_eq!(AppError::NoHealthyPeers.error_code(), "no_healthy_peers");
    }
}
