//! Forecast read endpoints.
//!
//! - GET /api/v1/spots/:spot_id/forecast/daily
//! - GET /api/v1/spots/:spot_id/forecast/detailed?days=7

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::AppState;
use crate::db::models::DailyScoreRow;
use crate::errors::AppError;
use crate::services::views::{self, DetailedDay};

/// Default horizon for the detailed view (days).
const DEFAULT_DETAIL_DAYS: usize = 7;

#[derive(Debug, Deserialize, IntoParams)]
pub struct DetailedQuery {
    /// Number of forecast days to include (default 7)
    pub days: Option<usize>,
}

/// Daily forecast response.
#[derive(Debug, Serialize, ToSchema)]
pub struct DailyForecastResponse {
    pub spot_id: String,
    pub days: Vec<DailyScoreRow>,
}

/// Detailed forecast response.
#[derive(Debug, Serialize, ToSchema)]
pub struct DetailedForecastResponse {
    pub spot_id: String,
    pub days: Vec<DetailedDay>,
}

/// Daily aggregate forecast for one spot, ascending by date.
#[utoipa::path(
    get,
    path = "/api/v1/spots/{spot_id}/forecast/daily",
    tag = "Forecasts",
    params(
        ("spot_id" = String, Path, description = "Spot slug"),
    ),
    responses(
        (status = 200, description = "Daily scores", body = DailyForecastResponse),
        (status = 404, description = "Unknown spot", body = crate::errors::ErrorResponse),
    )
)]
pub async fn get_daily_forecast(
    State(state): State<AppState>,
    Path(spot_id): Path<String>,
) -> Result<Json<DailyForecastResponse>, AppError> {
    let days = views::daily_view(&state.store, &spot_id).await?;
    Ok(Json(DailyForecastResponse { spot_id, days }))
}

/// Hour-by-hour daylight forecast for one spot.
#[utoipa::path(
    get,
    path = "/api/v1/spots/{spot_id}/forecast/detailed",
    tag = "Forecasts",
    params(
        ("spot_id" = String, Path, description = "Spot slug"),
        DetailedQuery,
    ),
    responses(
        (status = 200, description = "Detailed daylight forecast", body = DetailedForecastResponse),
        (status = 404, description = "Unknown spot", body = crate::errors::ErrorResponse),
    )
)]
pub async fn get_detailed_forecast(
    State(state): State<AppState>,
    Path(spot_id): Path<String>,
    Query(query): Query<DetailedQuery>,
) -> Result<Json<DetailedForecastResponse>, AppError> {
    let days = query.days.unwrap_or(DEFAULT_DETAIL_DAYS);
    let days = views::detailed_view(&state.store, &spot_id, days).await?;
    Ok(Json(DetailedForecastResponse { spot_id, days }))
}
