//! HTTP middleware (CORS, 404 handler)

use axum::extract::Request;
use axum::http::{Method, StatusCode, header};
use axum::response::IntoResponse;
use tower_http::cors::{Any, CorsLayer};

use crate::domain::printer::RESULT_ERROR;

/// Create CORS layer
///
/// The API is read-only and public, so any origin may issue GET requests.
pub fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::ORIGIN])
}

/// Handle 404 Not Found with logging
pub async fn handle_404(req: Request) -> impl IntoResponse {
    tracing::debug!(method = %req.method(), uri = %req.uri(), "[404]");
    (
        StatusCode::NOT_FOUND,
        axum::Json(serde_json::json!({
            "result": RESULT_ERROR,
            "message": "no such endpoint",
        })),
    )
}
