use crate::models::ErrorResponse;
use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use std::time::Duration;
use thiserror::Error;

/// Failures a search can end in
///
/// An empty match set is not an error; it is a successful `SearchResult`.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Invalid zipcode: {0:?}")]
    InvalidZipcode(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Tract {0} has no population data")]
    MissingPopulationData(String),

    #[error("Course {0} is outside every known census tract")]
    UnresolvedTract(String),

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Upstream timed out after {0:?}")]
    UpstreamTimeout(Duration),

    #[error("Cache unavailable: {0}")]
    CacheUnavailable(String),
}

impl SearchError {
    /// Stable machine-readable code used in error bodies
    pub fn code(&self) -> &'static str {
        match self {
            SearchError::InvalidZipcode(_) => "invalid_zipcode",
            SearchError::InvalidRequest(_) => "invalid_request",
            SearchError::MissingPopulationData(_) => "missing_population_data",
            SearchError::UnresolvedTract(_) => "unresolved_tract",
            SearchError::UpstreamUnavailable(_) => "upstream_unavailable",
            SearchError::UpstreamTimeout(_) => "upstream_timeout",
            SearchError::CacheUnavailable(_) => "cache_unavailable",
        }
    }
}

impl ResponseError for SearchError {
    fn status_code(&self) -> StatusCode {
        match self {
            SearchError::InvalidZipcode(_) | SearchError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            SearchError::MissingPopulationData(_) | SearchError::UnresolvedTract(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            SearchError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            SearchError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            SearchError::CacheUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        HttpResponse::build(status).json(ErrorResponse {
            error: self.code().to_string(),
            message: self.to_string(),
            status_code: status.as_u16(),
        })
    }
}
