//! DID pool handlers

use crate::dto::{ApiResponse, BulkDidRequest, DidRequest};
use crate::ApiState;
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use tandem_core::models::Did;
use tandem_core::AppError;
use tracing::{info, instrument, warn};
use validator::Validate;

#[derive(Debug, Deserialize)]
pub struct DidListQuery {
    /// Optional in-use filter
    pub in_use: Option<bool>,
}

/// List pool numbers
///
/// GET /api/v1/dids
#[instrument(skip(state))]
pub async fn list_dids(
    state: web::Data<ApiState>,
    query: web::Query<DidListQuery>,
) -> Result<HttpResponse, AppError> {
    let dids = state.dids.list(query.in_use).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(dids)))
}

/// Add one pool number
///
/// POST /api/v1/dids
#[instrument(skip(state, req), fields(number = %req.number))]
pub async fn add_did(
    state: web::Data<ApiState>,
    req: web::Json<DidRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate().map_err(|e| {
        warn!("DID validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    // The owner must be a known peer before its pool grows
    let req = req.into_inner();
    state.registry.get(&req.owner_peer).await?;

    let did = req.into_did();
    state.dids.upsert(&did).await?;
    info!(number = %did.number, owner = %did.owner_peer, "DID added");

    Ok(HttpResponse::Created().json(ApiResponse::success(did)))
}

/// Add a batch of pool numbers
///
/// POST /api/v1/dids/bulk
#[instrument(skip(state, req), fields(owner = %req.owner_peer))]
pub async fn add_dids_bulk(
    state: web::Data<ApiState>,
    req: web::Json<BulkDidRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate().map_err(|e| {
        warn!("Bulk DID validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    let req = req.into_inner();
    state.registry.get(&req.owner_peer).await?;

    let mut added = 0;
    for number in &req.numbers {
        if number.is_empty() {
            continue;
        }
        state
            .dids
            .upsert(&Did::new(number.clone(), req.owner_peer.clone()))
            .await?;
        added += 1;
    }

    info!(owner = %req.owner_peer, added, "Bulk DIDs added");
    Ok(HttpResponse::Created().json(ApiResponse::success(json!({ "added": added }))))
}

/// Remove a free pool number
///
/// DELETE /api/v1/dids/{number}
#[instrument(skip(state))]
pub async fn delete_did(
    state: web::Data<ApiState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let number = path.into_inner();
    if state.dids.delete(&number).await? {
        Ok(HttpResponse::NoContent().finish())
    } else {
        Err(AppError::DidNotFound(number))
    }
}

/// Configure DID routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/dids")
            .route("", web::get().to(list_dids))
            .route("", web::post().to(add_did))
            .route("/bulk", web::post().to(add_dids_bulk))
            .route("/{number}", web::delete().to(delete_did)),
    );
}
