//! Source listing endpoint

use std::collections::HashMap;

use axum::extract::{Query, State};
use axum::http::{Extensions, HeaderMap};
use axum::response::Response;
use serde::Serialize;
use utoipa::ToSchema;

use super::{ApiState, client_info};
use crate::api::params::RequestParams;
use crate::api::transport::StreamingTransport;
use crate::api::types::ApiError;
use crate::core::config::DatasetConfig;
use crate::domain::{Format, Printer};

/// Analytics source name recorded for listing requests
const META_SOURCE: &str = "meta";

/// One configured data source
#[derive(Debug, Serialize, ToSchema)]
pub struct SourceMeta {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Accepted filter parameters
    pub filters: Vec<String>,
    /// Output fields, strings first, then integers, then floats
    pub fields: Vec<String>,
    pub trend: bool,
}

impl SourceMeta {
    fn new(name: &str, dataset: &DatasetConfig) -> Self {
        Self {
            name: name.to_string(),
            description: dataset.description.clone(),
            filters: dataset.filters.iter().map(|f| f.param.clone()).collect(),
            fields: dataset.fields.columns().map(str::to_string).collect(),
            trend: dataset.trend.is_some(),
        }
    }
}

/// List configured data sources
#[utoipa::path(
    get,
    path = "/api/v1/meta",
    tag = "meta",
    responses(
        (status = 200, description = "Configured sources", body = Vec<SourceMeta>)
    )
)]
pub async fn list_sources(
    State(state): State<ApiState>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    extensions: Extensions,
) -> Result<Response, ApiError> {
    let params = RequestParams::new(query);
    let (transport, pending) = StreamingTransport::channel();
    let mut printer = Printer::new(
        Format::from_param(params.get("format")),
        META_SOURCE,
        Box::new(transport),
        state.analytics.clone(),
    )
    .with_client(client_info(&headers, &extensions));

    let sources: Vec<SourceMeta> = state
        .config
        .datasets
        .iter()
        .map(|(name, dataset)| SourceMeta::new(name, dataset))
        .collect();

    // The transport blocks on a full channel, so print off the runtime
    tokio::task::spawn_blocking(move || printer.print_non_standard(&sources));
    pending.into_response().await
}
