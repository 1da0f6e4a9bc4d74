//! Peer handlers

use crate::dto::{ApiResponse, PeerRequest, PeerResponse};
use crate::ApiState;
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use tandem_core::models::PeerType;
use tandem_core::AppError;
use tracing::{info, instrument, warn};
use validator::Validate;

#[derive(Debug, Deserialize)]
pub struct PeerListQuery {
    /// Optional type filter
    pub peer_type: Option<PeerType>,
}

/// List peers
///
/// GET /api/v1/peers
#[instrument(skip(state))]
pub async fn list_peers(
    state: web::Data<ApiState>,
    query: web::Query<PeerListQuery>,
) -> Result<HttpResponse, AppError> {
    let peers = state.registry.list(query.peer_type).await;
    let response: Vec<PeerResponse> = peers.into_iter().map(Into::into).collect();
    Ok(HttpResponse::Ok().json(ApiResponse::success(response)))
}

/// Get one peer
///
/// GET /api/v1/peers/{name}
#[instrument(skip(state))]
pub async fn get_peer(
    state: web::Data<ApiState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let peer = state.registry.get(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(PeerResponse::from(peer))))
}

/// Create or replace a peer
///
/// POST /api/v1/peers
#[instrument(skip(state, req), fields(name = %req.name))]
pub async fn upsert_peer(
    state: web::Data<ApiState>,
    req: web::Json<PeerRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate().map_err(|e| {
        warn!("Peer validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    let peer = state.registry.add(req.into_inner().into_peer()).await?;
    info!(name = %peer.name, "Peer stored");

    Ok(HttpResponse::Created().json(ApiResponse::success(PeerResponse::from(peer))))
}

/// Delete a peer (refused while referenced by a route)
///
/// DELETE /api/v1/peers/{name}
#[instrument(skip(state))]
pub async fn delete_peer(
    state: web::Data<ApiState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let name = path.into_inner();
    state.registry.delete(&name, &state.routes).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// Configure peer routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/peers")
            .route("", web::get().to(list_peers))
            .route("", web::post().to(upsert_peer))
            .route("/{name}", web::get().to(get_peer))
            .route("/{name}", web::delete().to(delete_peer)),
    );
}
