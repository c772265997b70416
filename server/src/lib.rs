//! Tether Server - a reference remote for the Tether sync engine.
//!
//! Serves watermark pulls (`GET /api/{collection}?after=`) and accepts
//! one record per submission (`POST /api/{collection}`). Records live in
//! memory; the server clock stamps every write, so `after` filtering is
//! always against server time.

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod routes;

use crate::config::Config;
use crate::db::RecordTable;
use axum::Router;
use std::sync::Arc;
use tether_engine::{Clock, SystemClock};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub table: Arc<RecordTable>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: Config, clock: Arc<dyn Clock>) -> Self {
        let table = RecordTable::new(
            config.primary_key_field.clone(),
            config.timestamp_field.clone(),
        );
        Self {
            config: Arc::new(config),
            table: Arc::new(table),
            clock,
        }
    }
}

/// Build the router with tracing and permissive CORS.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(routes::create_routes())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
