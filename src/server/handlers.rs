use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, MutexGuard};
use std::time::{Duration, Instant};
use tracing::info;

use crate::location::sim::{snapshot, Scenario, SimSnapshot, SimulatedPlatform};
use crate::location::{geo_uri, FlowEvent, LocationAcquisitionFlow};

use super::state::AppState;

// ─── Error response ──────────────────────────────────────────────

#[derive(Serialize)]
struct ApiErrorBody {
    error: String,
    code: u16,
}

pub struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            error: self.1,
            code: self.0.as_u16(),
        };
        (self.0, Json(body)).into_response()
    }
}

fn api_error(status: StatusCode, msg: impl Into<String>) -> ApiError {
    ApiError(status, msg.into())
}

type SimFlow = LocationAcquisitionFlow<SimulatedPlatform>;

fn lock_flow(state: &AppState) -> Result<MutexGuard<'_, SimFlow>, ApiError> {
    state
        .flow
        .lock()
        .map_err(|_| api_error(StatusCode::INTERNAL_SERVER_ERROR, "Flow state poisoned"))
}

// ─── GET /api/state ──────────────────────────────────────────────

pub async fn state(State(state): State<Arc<AppState>>) -> Result<Json<SimSnapshot>, ApiError> {
    let flow = lock_flow(&state)?;
    Ok(Json(snapshot(&flow)))
}

// ─── POST /api/events ────────────────────────────────────────────

pub async fn dispatch(
    State(state): State<Arc<AppState>>,
    Json(event): Json<FlowEvent>,
) -> Result<Json<SimSnapshot>, ApiError> {
    let start = Instant::now();
    let mut flow = lock_flow(&state)?;

    flow.dispatch(event);
    let followups = flow.pump();

    info!(
        phase = %flow.phase(),
        followups,
        elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
        "POST /api/events"
    );
    Ok(Json(snapshot(&flow)))
}

// ─── PUT /api/scenario ───────────────────────────────────────────

pub async fn replace_scenario(
    State(state): State<Arc<AppState>>,
    Json(scenario): Json<Scenario>,
) -> Result<Json<SimSnapshot>, ApiError> {
    let mut flow = lock_flow(&state)?;
    flow.platform_mut().set_scenario(scenario);
    info!("PUT /api/scenario");
    Ok(Json(snapshot(&flow)))
}

// ─── POST /api/advance ───────────────────────────────────────────

#[derive(Deserialize)]
pub struct AdvanceQuery {
    pub ms: Option<u64>,
}

pub async fn advance(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AdvanceQuery>,
) -> Result<Json<SimSnapshot>, ApiError> {
    let ms = params
        .ms
        .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "Missing 'ms' parameter"))?;

    let mut flow = lock_flow(&state)?;
    flow.platform_mut().advance(Duration::from_millis(ms));
    let followups = flow.pump();

    info!(ms, followups, phase = %flow.phase(), "POST /api/advance");
    Ok(Json(snapshot(&flow)))
}

// ─── GET /api/map ────────────────────────────────────────────────

#[derive(Serialize)]
pub struct MapResponse {
    pub uri: String,
}

pub async fn map_uri(State(state): State<Arc<AppState>>) -> Result<Json<MapResponse>, ApiError> {
    let flow = lock_flow(&state)?;
    let fix = flow
        .fix()
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "No location fix yet"))?;
    Ok(Json(MapResponse { uri: geo_uri(&fix) }))
}
