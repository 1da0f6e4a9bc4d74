//! Health, statistics and live-call handlers

use crate::dto::ApiResponse;
use crate::ApiState;
use actix_web::{web, HttpResponse};
use serde_json::json;
use tandem_core::AppError;
use tracing::instrument;

/// Health check
///
/// GET /api/v1/health
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "service": "tandem",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Live calls currently in the ledger
///
/// GET /api/v1/calls
#[instrument(skip(state))]
pub async fn list_active_calls(state: web::Data<ApiState>) -> Result<HttpResponse, AppError> {
    let calls = state.engine.active_calls().await;
    Ok(HttpResponse::Ok().json(ApiResponse::success(calls)))
}

/// Engine statistics snapshot
///
/// GET /api/v1/stats
#[instrument(skip(state))]
pub async fn engine_stats(state: web::Data<ApiState>) -> Result<HttpResponse, AppError> {
    let stats = state.engine.statistics().await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(stats)))
}

/// Per-peer balancer stats
///
/// GET /api/v1/stats/balancer
#[instrument(skip(state))]
pub async fn balancer_stats(state: web::Data<ApiState>) -> Result<HttpResponse, AppError> {
    let stats = state.balancer.all_stats().await;
    Ok(HttpResponse::Ok().json(ApiResponse::success(stats)))
}

/// Configure status routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check))
        .route("/calls", web::get().to(list_active_calls))
        .route("/stats", web::get().to(engine_stats))
        .route("/stats/balancer", web::get().to(balancer_stats));
}
