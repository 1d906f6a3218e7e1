//! Dataset query endpoints
//!
//! Each request resolves its dataset, then hands the whole pipeline (auth,
//! validation, filter compilation, execution and printing) to a blocking
//! worker holding its own leased connection. The handler only waits for
//! the response head and streams whatever the printer writes.

use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::http::{Extensions, HeaderMap};
use axum::response::Response;
use serde_json::Value;
use subtle::ConstantTimeEq;

use super::{ApiState, client_info};
use crate::api::params::RequestParams;
use crate::api::transport::{PendingResponse, StreamingTransport};
use crate::api::types::ApiError;
use crate::core::config::{AuthConfig, DatasetConfig, FilterKind};
use crate::core::constants::AUTH_PARAM;
use crate::data::filters::{
    SqlParams, Values, compile, extract_values, filter_iso_dates, filter_regions, parse_date,
};
use crate::domain::printer::{CollectRowPrinter, Row};
use crate::domain::trend::compute_trend;
use crate::domain::{Execution, Format, Printer, QueryExecutor, RowSink};

/// Query a dataset
#[utoipa::path(
    get,
    path = "/api/v1/epidata/{source}",
    tag = "epidata",
    params(
        ("source" = String, Path, description = "Configured data source"),
        ("format" = Option<String>, Query, description = "classic (default), tree, json, jsonl or csv"),
        ("fields" = Option<String>, Query, description = "Comma-separated output fields"),
        ("auth" = Option<String>, Query, description = "API token when authentication is enabled")
    ),
    responses(
        (status = 200, description = "Result rows in the requested format"),
        (status = 400, description = "Missing or invalid parameter"),
        (status = 401, description = "Missing or wrong API token"),
        (status = 500, description = "Query failed")
    )
)]
pub async fn query_source(
    State(state): State<ApiState>,
    Path(source): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    extensions: Extensions,
) -> Result<Response, ApiError> {
    let params = RequestParams::new(query);
    let (printer, pending) = start_printer(&state, &source, &params, &headers, &extensions);

    tokio::task::spawn_blocking(move || run_query(&state, &source, &params, printer));
    pending.into_response().await
}

/// Trend of every series in a dataset at `date` against `basis`
#[utoipa::path(
    get,
    path = "/api/v1/epidata/{source}/trend",
    tag = "epidata",
    params(
        ("source" = String, Path, description = "Configured data source with a trend declaration"),
        ("date" = String, Query, description = "Current time (YYYYMMDD, YYYY-MM-DD or epiweek)"),
        ("basis" = String, Query, description = "Time to compare against"),
        ("format" = Option<String>, Query, description = "classic (default), tree, json, jsonl or csv")
    ),
    responses(
        (status = 200, description = "One trend row per series"),
        (status = 400, description = "Missing or invalid parameter")
    )
)]
pub async fn query_trend(
    State(state): State<ApiState>,
    Path(source): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    extensions: Extensions,
) -> Result<Response, ApiError> {
    let params = RequestParams::new(query);
    let (printer, pending) = start_printer(&state, &source, &params, &headers, &extensions);

    tokio::task::spawn_blocking(move || run_trend(&state, &source, &params, printer));
    pending.into_response().await
}

fn start_printer(
    state: &ApiState,
    source: &str,
    params: &RequestParams,
    headers: &HeaderMap,
    extensions: &Extensions,
) -> (Printer, PendingResponse) {
    let (transport, pending) = StreamingTransport::channel();
    let printer = Printer::new(
        Format::from_param(params.get("format")),
        source,
        Box::new(transport),
        state.analytics.clone(),
    )
    .with_client(client_info(headers, extensions));
    (printer, pending)
}

fn is_authorized(auth: &AuthConfig, presented: Option<&str>) -> bool {
    let Some(expected) = &auth.token else {
        return true;
    };
    let Some(presented) = presented else {
        return false;
    };
    expected.len() == presented.len() && expected.as_bytes().ct_eq(presented.as_bytes()).into()
}

/// Shared request preamble. Returns the dataset once the request may run a
/// query; otherwise the printer has already reported why not.
fn admit<'a>(
    state: &'a ApiState,
    source: &str,
    params: &RequestParams,
    printer: &mut Printer,
    extra_required: &[&str],
) -> Option<&'a DatasetConfig> {
    let Some(dataset) = state.config.datasets.get(source) else {
        printer.print_missing_or_wrong_source();
        return None;
    };
    if !is_authorized(&state.config.auth, params.get(AUTH_PARAM)) {
        printer.print_unauthenticated();
        return None;
    }

    let mut required: Vec<&str> = dataset
        .filters
        .iter()
        .filter(|f| f.required)
        .map(|f| f.param.as_str())
        .collect();
    required.extend_from_slice(extra_required);
    if !params.require_all(printer, &required) {
        return None;
    }
    if !dataset.require_any.is_empty() {
        let any: Vec<&str> = dataset.require_any.iter().map(String::as_str).collect();
        if !params.require_any(printer, &any) {
            return None;
        }
    }
    Some(dataset)
}

/// Compile every supplied filter parameter.
///
/// Returns the name of the first parameter that fails to parse.
fn compile_filters<'d>(
    dataset: &'d DatasetConfig,
    params: &RequestParams,
    sql_params: &mut SqlParams,
) -> Result<Vec<String>, &'d str> {
    let mut conditions = Vec::new();
    for filter in &dataset.filters {
        let Some(raw) = params.get(&filter.param) else {
            continue;
        };
        let values = extract_values(raw, filter.kind.value_kind()).map_err(|e| {
            tracing::debug!(param = %filter.param, error = %e, "Rejected filter value");
            filter.param.as_str()
        })?;
        if values.is_empty() {
            continue;
        }

        let column = filter.column();
        let condition = match (filter.kind, &values) {
            (FilterKind::IsoDate, Values::Dates(dates)) => {
                filter_iso_dates(column, dates, sql_params)
            }
            (FilterKind::Region, Values::Strings(strings)) => {
                filter_regions(column, strings, sql_params)
            }
            _ => compile(column, &values, sql_params),
        };
        conditions.push(format!("({})", condition));
    }
    Ok(conditions)
}

fn select_statement(dataset: &DatasetConfig, conditions: &[String]) -> String {
    let columns: Vec<&str> = dataset.fields.columns().collect();
    let mut sql = format!("SELECT {} FROM {}", columns.join(", "), dataset.table);
    if !conditions.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&conditions.join(" AND "));
    }
    if !dataset.order_by.is_empty() {
        sql.push_str(" ORDER BY ");
        sql.push_str(&dataset.order_by.join(", "));
    }
    sql
}

/// Parse and compile filters, reporting a bad parameter through `printer`
fn prepare(
    dataset: &DatasetConfig,
    params: &RequestParams,
    printer: &mut Printer,
) -> Option<(String, SqlParams)> {
    let mut sql_params = SqlParams::default();
    match compile_filters(dataset, params, &mut sql_params) {
        Ok(conditions) => Some((select_statement(dataset, &conditions), sql_params)),
        Err(param) => {
            printer.print_validation_failed(&format!("invalid parameter: {}", param));
            None
        }
    }
}

fn run_query(state: &ApiState, source: &str, params: &RequestParams, mut printer: Printer) {
    let Some(dataset) = admit(state, source, params, &mut printer, &[]) else {
        return;
    };
    let Some((statement, sql_params)) = prepare(dataset, params, &mut printer) else {
        return;
    };

    let engine = match state.database.lease() {
        Ok(engine) => engine,
        Err(e) => {
            tracing::error!(error = %e, "Failed to lease database connection");
            printer.print_database_error();
            return;
        }
    };

    let executor = QueryExecutor::new(&engine, state.config.database.max_results);
    let projection = params.fields();
    let execution = executor.execute(
        &statement,
        &sql_params,
        projection.as_deref(),
        &dataset.fields,
        &mut printer,
        true,
    );
    if execution == Execution::Failed {
        printer.print_database_error();
    }
}

fn run_trend(state: &ApiState, source: &str, params: &RequestParams, mut printer: Printer) {
    let Some(dataset) = admit(state, source, params, &mut printer, &["date", "basis"]) else {
        return;
    };
    let Some(trend) = &dataset.trend else {
        printer.print_validation_failed(&format!("no trend available for {}", source));
        return;
    };

    let mut times = [0i64; 2];
    for (slot, name) in times.iter_mut().zip(["date", "basis"]) {
        match params.get(name).map(parse_date) {
            Some(Ok(value)) => *slot = value.as_i64(),
            _ => {
                printer.print_validation_failed(&format!("invalid parameter: {}", name));
                return;
            }
        }
    }
    let [current, basis] = times;

    let Some((statement, sql_params)) = prepare(dataset, params, &mut printer) else {
        return;
    };
    let engine = match state.database.lease() {
        Ok(engine) => engine,
        Err(e) => {
            tracing::error!(error = %e, "Failed to lease database connection");
            printer.print_database_error();
            return;
        }
    };

    let executor = QueryExecutor::new(&engine, state.config.database.max_results);
    let mut collector = CollectRowPrinter::new();
    let truncated = match executor.execute(
        &statement,
        &sql_params,
        None,
        &dataset.fields,
        &mut collector,
        false,
    ) {
        Execution::Completed { truncated, .. } => truncated,
        Execution::Failed => {
            printer.print_database_error();
            return;
        }
    };

    let mut series: Vec<(Row, Vec<(i64, f64)>)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for row in collector.into_rows() {
        let mut key = Row::new();
        for column in &trend.keys {
            key.insert(column.clone(), row.get(column).cloned().unwrap_or(Value::Null));
        }
        let slot = *index
            .entry(Value::Object(key.clone()).to_string())
            .or_insert_with(|| {
                series.push((key, Vec::new()));
                series.len() - 1
            });

        let time = row.get(&trend.time).and_then(time_value);
        let value = row.get(&trend.value).and_then(Value::as_f64);
        if let (Some(time), Some(value)) = (time, value) {
            series[slot].1.push((time, value));
        }
    }

    printer.begin();
    for (key, points) in series {
        printer.print_row(compute_trend(current, basis, points).into_row(key));
    }
    printer.end(truncated);
}

// Times come back as integers (YYYYMMDD, epiweek) or as DATE text
fn time_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => parse_date(s).ok().map(|d| d.as_i64()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{FilterConfig, TrendConfig};
    use crate::domain::FieldKinds;

    fn filter(param: &str, column: &str, kind: FilterKind) -> FilterConfig {
        FilterConfig {
            param: param.to_string(),
            column: Some(column.to_string()),
            kind,
            required: false,
        }
    }

    fn dataset() -> DatasetConfig {
        DatasetConfig {
            table: "fluview".to_string(),
            description: None,
            filters: vec![
                filter("epiweeks", "epiweek", FilterKind::Integer),
                filter("regions", "region", FilterKind::Region),
                filter("dates", "issued", FilterKind::IsoDate),
            ],
            require_any: Vec::new(),
            fields: FieldKinds {
                string: vec!["region".to_string()],
                int: vec!["epiweek".to_string()],
                float: vec!["wili".to_string()],
            },
            order_by: vec!["epiweek".to_string(), "region".to_string()],
            trend: Some(TrendConfig {
                time: "epiweek".to_string(),
                value: "wili".to_string(),
                keys: vec!["region".to_string()],
            }),
        }
    }

    fn params(pairs: &[(&str, &str)]) -> RequestParams {
        RequestParams::new(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_statement_without_filters() {
        let mut sql_params = SqlParams::default();
        let conditions = compile_filters(&dataset(), &params(&[]), &mut sql_params).unwrap();
        assert_eq!(
            select_statement(&dataset(), &conditions),
            "SELECT region, epiweek, wili FROM fluview ORDER BY epiweek, region"
        );
        assert!(sql_params.is_empty());
    }

    #[test]
    fn test_filters_are_joined_with_and() {
        let dataset = dataset();
        let request = params(&[("epiweeks", "202001-202003"), ("regions", "nat")]);
        let mut sql_params = SqlParams::default();
        let conditions = compile_filters(&dataset, &request, &mut sql_params).unwrap();

        assert_eq!(
            select_statement(&dataset, &conditions),
            "SELECT region, epiweek, wili FROM fluview \
             WHERE ((epiweek BETWEEN 202001 AND 202003)) AND ((region = ?)) \
             ORDER BY epiweek, region"
        );
        assert_eq!(sql_params.len(), 1);
    }

    #[test]
    fn test_iso_dates_bind_strings() {
        let request = params(&[("dates", "20200101:20200131")]);
        let mut sql_params = SqlParams::default();
        let conditions = compile_filters(&dataset(), &request, &mut sql_params).unwrap();

        assert_eq!(conditions, vec!["((issued BETWEEN ? AND ?))".to_string()]);
        assert_eq!(sql_params.len(), 2);
    }

    #[test]
    fn test_empty_filter_is_skipped() {
        let mut sql_params = SqlParams::default();
        let conditions =
            compile_filters(&dataset(), &params(&[("epiweeks", "")]), &mut sql_params).unwrap();
        assert!(conditions.is_empty());
    }

    #[test]
    fn test_bad_filter_names_parameter() {
        let dataset = dataset();
        let mut sql_params = SqlParams::default();
        let request = params(&[("epiweeks", "202010-202001")]);
        assert_eq!(
            compile_filters(&dataset, &request, &mut sql_params),
            Err("epiweeks")
        );

        let request = params(&[("epiweeks", "abc")]);
        assert_eq!(
            compile_filters(&dataset, &request, &mut sql_params),
            Err("epiweeks")
        );
    }

    #[test]
    fn test_authorization() {
        let open = AuthConfig::default();
        assert!(is_authorized(&open, None));

        let locked = AuthConfig {
            token: Some("secret".to_string()),
        };
        assert!(is_authorized(&locked, Some("secret")));
        assert!(!is_authorized(&locked, Some("secrets")));
        assert!(!is_authorized(&locked, Some("")));
        assert!(!is_authorized(&locked, None));
    }

    #[test]
    fn test_time_values() {
        assert_eq!(time_value(&Value::from(202001)), Some(202001));
        assert_eq!(time_value(&Value::from("2020-01-05")), Some(20200105));
        assert_eq!(time_value(&Value::Null), None);
    }
}
