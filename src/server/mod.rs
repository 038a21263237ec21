//! HTTP control surface over a simulated flow.
//!
//! Lets a browser or test harness play the UI: read the view, press
//! buttons, answer OS prompts and move the simulated clock.

mod handlers;
mod state;

use axum::routing::{get, post, put};
use axum::Router;
use state::AppState;
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use crate::config::FlowConfig;
use crate::location::sim::{Scenario, SimulatedPlatform};
use crate::location::LocationAcquisitionFlow;

pub fn build_router(config: FlowConfig, scenario: Scenario) -> Router {
    let flow = LocationAcquisitionFlow::new(SimulatedPlatform::new(scenario), config);
    let state = Arc::new(AppState {
        flow: Mutex::new(flow),
    });

    Router::new()
        .route("/api/state", get(handlers::state))
        .route("/api/events", post(handlers::dispatch))
        .route("/api/scenario", put(handlers::replace_scenario))
        .route("/api/advance", post(handlers::advance))
        .route("/api/map", get(handlers::map_uri))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start(host: &str, port: u16, config: FlowConfig, scenario: Scenario) -> std::io::Result<()> {
    let app = build_router(config, scenario);
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| {
        error!(%addr, error = %e, "cannot bind");
        e
    })?;

    info!(%addr, "flow simulator listening");
    eprintln!("  Location flow simulator listening on http://{}", addr);
    eprintln!("  Press Ctrl+C to stop.");

    axum::serve(listener, app).await
}
