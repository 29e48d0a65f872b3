//! HTTP request handlers for web adapter.

use axum::{
    Json,
    extract::{Path, State},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::domain::analyzer::Metrics;
use crate::domain::config_validation::load_run_settings;
use crate::domain::pipeline::{BacktestRequest, Selection, execute};
use crate::domain::price::InstrumentInfo;
use crate::domain::screening::{BacktestingPeriod, Condition, ResolvedCondition};
use crate::domain::selection::names_from;

use super::{AppState, WebError};

pub async fn create_condition(
    Json(condition): Json<Condition>,
) -> Result<Json<ResolvedCondition>, WebError> {
    let resolved = condition.resolve()?;
    info!(
        style = %resolved.condition.investment_style,
        max_volatility = resolved.max_volatility,
        target_return = resolved.target_return,
        "condition resolved"
    );
    Ok(Json(resolved))
}

/// Screened backtest driven by the output of `/condition`.
pub async fn run_backtest(
    State(state): State<Arc<AppState>>,
    Json(resolved): Json<ResolvedCondition>,
) -> Result<Json<Metrics>, WebError> {
    // The body may not come from `/condition`; style presets are re-derived.
    let checked = resolved.condition.resolve()?;
    let mut request = base_request(
        &state,
        Selection::Screen(checked.candidate_filter()),
        &checked.condition.backtesting_period,
    )?;
    request.constraints.target_return = checked.target_return;
    run_pipeline(state, request).await
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpecificBacktestBody {
    pub stock_names: Vec<String>,
    pub backtesting_period: BacktestingPeriod,
    pub min_weight: Option<f64>,
    pub max_weight: Option<f64>,
    pub target_return: Option<f64>,
    pub risk_free_rate: Option<f64>,
    pub initial_capital: Option<f64>,
}

pub async fn specific_backtest(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SpecificBacktestBody>,
) -> Result<Json<Metrics>, WebError> {
    body.backtesting_period.validate()?;
    let names = names_from(&body.stock_names)?;
    let mut request = base_request(&state, Selection::Explicit(names), &body.backtesting_period)?;
    if let Some(v) = body.min_weight {
        request.constraints.min_weight = v;
    }
    if let Some(v) = body.max_weight {
        request.constraints.max_weight = v;
    }
    if let Some(v) = body.target_return {
        request.constraints.target_return = v;
    }
    if let Some(v) = body.risk_free_rate {
        request.risk_free_rate = v;
    }
    if let Some(v) = body.initial_capital {
        request.initial_capital = v;
    }
    run_pipeline(state, request).await
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub stocks: Vec<InstrumentInfo>,
}

pub async fn search_stocks(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<SearchResponse>, WebError> {
    let fragment = name.trim();
    if fragment.is_empty() {
        return Err(WebError::bad_request("search term must not be empty"));
    }
    let stocks = state.data_port.search_names(fragment)?;
    if stocks.is_empty() {
        return Err(WebError::not_found(format!(
            "no instrument matches '{fragment}'"
        )));
    }
    Ok(Json(SearchResponse { stocks }))
}

pub async fn all_stocks(State(state): State<Arc<AppState>>) -> Result<Json<Vec<String>>, WebError> {
    let names = state.data_port.list_names()?;
    if names.is_empty() {
        return Err(WebError::not_found("no instruments available"));
    }
    Ok(Json(names))
}

pub async fn not_found() -> Response {
    WebError::not_found("not found").into_response()
}

/// Config-driven defaults with the window taken from the request period.
fn base_request(
    state: &AppState,
    selection: Selection,
    period: &BacktestingPeriod,
) -> Result<BacktestRequest, WebError> {
    let settings = load_run_settings(&*state.config)?;
    let mut request = settings.request(selection);
    request.start_date = period.start_date()?;
    request.end_date = period.end_date()?;
    Ok(request)
}

async fn run_pipeline(
    state: Arc<AppState>,
    request: BacktestRequest,
) -> Result<Json<Metrics>, WebError> {
    let timeout = state.request_timeout();
    let data_port = Arc::clone(&state.data_port);
    let task = tokio::task::spawn_blocking(move || execute(&*data_port, &request));

    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(Ok(report))) => Ok(Json(report.metrics)),
        Ok(Ok(Err(err))) => Err(err.into()),
        Ok(Err(join_err)) => Err(WebError::internal(format!(
            "backtest task failed: {join_err}"
        ))),
        Err(_) => Err(WebError::timeout(format!(
            "backtest exceeded {} s",
            timeout.as_secs()
        ))),
    }
}
