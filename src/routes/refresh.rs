//! Refresh trigger and status endpoints.
//!
//! POST /api/v1/refresh spawns a background orchestrator run for the named
//! spots (or the whole catalog). The background task uses a much longer
//! staleness threshold than on-demand refreshes to avoid redundant provider
//! load; GET /api/v1/refresh/status exposes the orchestrator state.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::AppState;
use crate::catalog::{find_spot, SpotConfig, SURF_SPOTS};
use crate::errors::AppError;
use crate::services::refresh::{run_tracked_refresh, RefreshOptions, RefreshState};

/// Staleness threshold for background refreshes (hours). One week keeps the
/// endpoint cheap to call repeatedly.
const BACKGROUND_REFRESH_THRESHOLD_HOURS: i64 = 168;

#[derive(Debug, Deserialize, ToSchema)]
pub struct RefreshRequest {
    /// Spots to refresh; omit for the whole catalog.
    pub spots: Option<Vec<String>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RefreshAccepted {
    /// Spots scheduled for background refresh
    pub scheduled: Vec<String>,
    pub threshold_hours: i64,
}

/// Trigger a background refresh for a list of spots.
#[utoipa::path(
    post,
    path = "/api/v1/refresh",
    tag = "Refresh",
    request_body = RefreshRequest,
    responses(
        (status = 202, description = "Refresh scheduled", body = RefreshAccepted),
        (status = 400, description = "Unknown spot requested", body = crate::errors::ErrorResponse),
    )
)]
pub async fn trigger_refresh(
    State(state): State<AppState>,
    Json(request): Json<RefreshRequest>,
) -> Result<(StatusCode, Json<RefreshAccepted>), AppError> {
    let spots: Vec<&'static SpotConfig> = match &request.spots {
        None => SURF_SPOTS.iter().collect(),
        Some(ids) => ids
            .iter()
            .map(|id| {
                find_spot(id)
                    .ok_or_else(|| AppError::InvalidInput(format!("Unknown spot: {}", id)))
            })
            .collect::<Result<_, _>>()?,
    };

    let scheduled: Vec<String> = spots.iter().map(|s| s.spot_id.to_string()).collect();
    let opts = RefreshOptions::new(
        BACKGROUND_REFRESH_THRESHOLD_HOURS,
        state.config.refresh_fanout,
    );

    tokio::spawn(run_tracked_refresh(
        state.store.clone(),
        state.provider.clone(),
        spots,
        opts,
        state.refresh_state.clone(),
    ));

    Ok((
        StatusCode::ACCEPTED,
        Json(RefreshAccepted {
            scheduled,
            threshold_hours: BACKGROUND_REFRESH_THRESHOLD_HOURS,
        }),
    ))
}

/// Current orchestrator state and the last refresh report.
#[utoipa::path(
    get,
    path = "/api/v1/refresh/status",
    tag = "Refresh",
    responses(
        (status = 200, description = "Orchestrator state", body = RefreshState),
    )
)]
pub async fn get_refresh_status(State(state): State<AppState>) -> Json<RefreshState> {
    let s = state.refresh_state.read().await;
    Json(s.clone())
}
