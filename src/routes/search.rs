use actix_web::{web, HttpResponse, Responder};
use validator::Validate;
use crate::config::SearchSettings;
use crate::core::QueryOrchestrator;
use crate::error::SearchError;
use crate::models::{ErrorResponse, HealthResponse, SearchQuery, SearchResponse};
use std::sync::Arc;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<QueryOrchestrator>,
    pub defaults: SearchSettings,
}

/// Configure all search-related routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg
        .route("/health", web::get().to(health_check))
        .route("/search", web::post().to(search));
}

/// Health check endpoint
async fn health_check(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now(),
        cache: state.orchestrator.cache_backend().to_string(),
    })
}

/// Search endpoint
///
/// POST /api/v1/search
///
/// Request body:
/// ```json
/// {
///   "zipcode": "30301",
///   "radius_miles": 10,
///   "policy": "strict_majority",
///   "category": "black"
/// }
/// ```
async fn search(
    state: web::Data<AppState>,
    req: web::Json<SearchQuery>,
) -> Result<HttpResponse, SearchError> {
    if let Err(errors) = req.validate() {
        tracing::info!("Validation failed for search request: {:?}", errors);
        return Ok(HttpResponse::BadRequest().json(ErrorResponse {
            error: "invalid_request".to_string(),
            message: errors.to_string(),
            status_code: 400,
        }));
    }

    let request = req.into_inner().into_search_request(&state.defaults)?;

    tracing::info!(
        "Searching {} within {}mi (ceiling {}mi) using {}",
        request.zipcode,
        request.radius_miles,
        request.max_radius_miles,
        request.policy
    );

    let result = state.orchestrator.run(request).await.map_err(|e| {
        tracing::error!("Search failed: {}", e);
        e
    })?;

    Ok(HttpResponse::Ok().json(SearchResponse::from_result(result)))
}
