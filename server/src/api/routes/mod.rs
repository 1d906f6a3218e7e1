//! API route handlers

pub mod epidata;
pub mod health;
pub mod meta;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::ConnectInfo;
use axum::http::{Extensions, HeaderMap, header};
use axum::routing::get;

use crate::core::config::AppConfig;
use crate::data::duckdb::DuckdbService;
use crate::data::{AnalyticsRecorder, ClientInfo};

/// Shared state for the query endpoints
#[derive(Clone)]
pub struct ApiState {
    pub config: Arc<AppConfig>,
    pub database: Arc<DuckdbService>,
    pub analytics: Arc<dyn AnalyticsRecorder>,
}

/// Build the query, listing and health routes
pub fn routes(state: ApiState) -> Router<()> {
    Router::new()
        .route("/api/v1/health", get(health::health))
        .route("/api/v1/meta", get(meta::list_sources))
        .route("/api/v1/epidata/{source}", get(epidata::query_source))
        .route("/api/v1/epidata/{source}/trend", get(epidata::query_trend))
        .with_state(state)
}

/// Client details for analytics: peer address and User-Agent
fn client_info(headers: &HeaderMap, extensions: &Extensions) -> ClientInfo {
    ClientInfo {
        ip: extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string()),
        user_agent: headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    }
}
