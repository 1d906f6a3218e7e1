//! API server initialization

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use axum::routing::get;
use tokio::net::TcpListener;
use tower_http::compression::CompressionLayer;
use tower_http::trace::TraceLayer;

use super::middleware;
use super::openapi::openapi_json;
use super::routes::{self, ApiState};
use crate::core::CoreApp;

pub struct ApiServer {
    app: CoreApp,
}

impl ApiServer {
    pub fn new(app: CoreApp) -> Self {
        Self { app }
    }

    /// Returns CoreApp for graceful shutdown
    pub async fn start(self) -> Result<CoreApp> {
        let Self { app } = self;

        // Clone shutdown before moving app
        let shutdown = app.shutdown.clone();

        let addr = SocketAddr::new(app.config.server.host.parse()?, app.config.server.port);
        let router = router(&app);

        let listener = TcpListener::bind(addr).await?;
        tracing::debug!(%addr, "API server listening");
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown.wait())
        .await?;

        Ok(app)
    }
}

/// Full application router with middleware
pub fn router(app: &CoreApp) -> Router {
    let state = ApiState {
        config: Arc::new(app.config.clone()),
        database: app.database.clone(),
        analytics: app.analytics.clone(),
    };

    routes::routes(state)
        .route("/api/openapi.json", get(openapi_json))
        .fallback(middleware::handle_404)
        .layer(CompressionLayer::new())
        .layer(middleware::cors())
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::ops::ControlFlow;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use super::*;
    use crate::core::config::{AppConfig, AuthConfig, DatabaseConfig, ServerConfig};
    use crate::domain::QueryEngine;

    async fn test_app() -> CoreApp {
        let config = AppConfig {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            database: DatabaseConfig {
                path: None,
                max_results: 10,
                init_sql: Vec::new(),
            },
            auth: AuthConfig::default(),
            datasets: BTreeMap::new(),
        };
        CoreApp::from_config(config).await.unwrap()
    }

    #[tokio::test]
    async fn test_openapi_json() {
        let app = test_app().await;
        let response = router(&app)
            .oneshot(
                Request::builder()
                    .uri("/api/openapi.json")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let app = test_app().await;
        let response = router(&app)
            .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_analytics_reach_database() {
        let app = test_app().await;
        let response = router(&app)
            .oneshot(
                Request::builder()
                    .uri("/api/v1/meta")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();

        // the body ends only after the printer recorded its event
        let engine = app.database.lease().unwrap();
        let mut recorded = 0;
        engine
            .query("SELECT source FROM api_analytics", &[], &mut |_| {
                recorded += 1;
                ControlFlow::Continue(())
            })
            .unwrap();
        assert_eq!(recorded, 1);
    }
}
