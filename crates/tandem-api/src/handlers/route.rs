//! Route handlers

use crate::dto::{ApiResponse, RouteRequest};
use crate::ApiState;
use actix_web::{web, HttpResponse};
use tandem_core::AppError;
use tracing::{info, instrument, warn};
use validator::Validate;

/// List routes
///
/// GET /api/v1/routes
#[instrument(skip(state))]
pub async fn list_routes(state: web::Data<ApiState>) -> Result<HttpResponse, AppError> {
    let routes = state.routes.list().await;
    Ok(HttpResponse::Ok().json(ApiResponse::success(routes)))
}

/// Create or replace a route
///
/// POST /api/v1/routes
#[instrument(skip(state, req), fields(name = %req.name))]
pub async fn upsert_route(
    state: web::Data<ApiState>,
    req: web::Json<RouteRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate().map_err(|e| {
        warn!("Route validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    let route = state
        .routes
        .add(req.into_inner().into_route(), &state.registry)
        .await?;
    info!(name = %route.name, "Route stored");

    Ok(HttpResponse::Created().json(ApiResponse::success(route)))
}

/// Delete a route
///
/// DELETE /api/v1/routes/{name}
#[instrument(skip(state))]
pub async fn delete_route(
    state: web::Data<ApiState>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    state.routes.delete(&path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// Configure route routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/routes")
            .route("", web::get().to(list_routes))
            .route("", web::post().to(upsert_route))
            .route("/{name}", web::delete().to(delete_route)),
    );
}
