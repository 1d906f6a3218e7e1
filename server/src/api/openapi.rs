//! OpenAPI specification

use axum::http::header;
use axum::response::{IntoResponse, Json};
use utoipa::OpenApi;

use crate::api::routes::{epidata, health, meta};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Epidata API",
        version = env!("CARGO_PKG_VERSION"),
        description = "Filtered, row-capped queries over epidemiological datasets"
    ),
    tags(
        (name = "health", description = "Health check endpoint"),
        (name = "meta", description = "Configured data sources"),
        (name = "epidata", description = "Dataset queries and trends")
    ),
    paths(
        health::health,
        meta::list_sources,
        epidata::query_source,
        epidata::query_trend,
    ),
    components(schemas(health::HealthResponse, meta::SourceMeta))
)]
pub struct ApiDoc;

/// Serve OpenAPI JSON specification
pub async fn openapi_json() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/json")],
        Json(ApiDoc::openapi()),
    )
}
