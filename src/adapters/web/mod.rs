//! Web server adapter.
//!
//! Axum JSON API over the same pipeline the CLI drives. Backtests are CPU-bound
//! and run on the blocking pool under a per-request timeout.

mod error;
mod handlers;

pub use error::{WebError, status_from_error};
pub use handlers::*;

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    routing::{get, post},
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::warn;

use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;

pub const DEFAULT_LISTEN: &str = "127.0.0.1:8000";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: i64 = 60;

pub struct AppState {
    pub data_port: Arc<dyn DataPort + Send + Sync>,
    pub config: Arc<dyn ConfigPort + Send + Sync>,
}

impl AppState {
    pub fn request_timeout(&self) -> Duration {
        let secs = self
            .config
            .get_int("web", "request_timeout_secs", DEFAULT_REQUEST_TIMEOUT_SECS)
            .max(1);
        Duration::from_secs(secs as u64)
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&*state.config);
    Router::new()
        .route("/condition", post(handlers::create_condition))
        .route("/run-backtest", post(handlers::run_backtest))
        .route("/specific-backtest", post(handlers::specific_backtest))
        .route("/stocks/search/{name}", get(handlers::search_stocks))
        .route("/stocks/all", get(handlers::all_stocks))
        .fallback(handlers::not_found)
        .layer(cors)
        .with_state(Arc::new(state))
}

/// `[web] allowed_origins` is a comma-separated list; `*` or an empty value allows any origin.
fn cors_layer(config: &dyn ConfigPort) -> CorsLayer {
    let origins = config.get_string("web", "allowed_origins").unwrap_or_default();
    let parsed: Vec<HeaderValue> = origins
        .split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty() && *o != "*")
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(origin = o, "ignoring malformed CORS origin");
                None
            }
        })
        .collect();

    let allow_origin = if parsed.is_empty() {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(parsed)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
}
