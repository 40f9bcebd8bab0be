//! Trip analysis endpoint.
//!
//! POST /api/v1/trips/analyze — selects trip windows per spot under the
//! user's constraints, attaches flight options from the external adapter,
//! and returns the best trips across all selected spots.

use axum::extract::State;
use axum::Json;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::AppState;
use crate::catalog::{find_spot, SpotConfig};
use crate::errors::AppError;
use crate::services::flights::{Flight, FlightQuery, FlightSearch};
use crate::services::refresh::{refresh_spots, RefreshOptions};
use crate::services::windows::{
    self, DayScore, TripWindow, WindowParams, MAX_WINDOWS,
};

/// Upper bound on trips returned per analysis.
const MAX_TRIPS: usize = 10;

/// Windows considered per spot before cross-spot ranking.
const MAX_WINDOWS_PER_SPOT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TripStyle {
    Weekend,
    LongWeekend,
    Best,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UserPreferences {
    pub departure_airports: Vec<String>,
    pub selected_spots: Vec<String>,
    pub trip_style: TripStyle,
    pub min_score: f64,
    pub min_days: u32,
    pub max_days: u32,
    pub stopovers_allowed: bool,
    /// Preferred departure band for the outbound leg (e.g. "evening").
    pub outbound_time_pref: Option<String>,
    pub return_time_pref: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TripRequest {
    pub user_preferences: UserPreferences,
    pub date_range_start: NaiveDate,
    pub date_range_end: NaiveDate,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TripOption {
    pub spot_id: String,
    pub spot_name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub duration_days: u32,
    pub avg_score: f64,
    pub total_score: f64,
    pub flights: Vec<Flight>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TripAnalysisResponse {
    pub trips: Vec<TripOption>,
}

fn validate(request: &TripRequest) -> Result<Vec<&'static SpotConfig>, AppError> {
    let prefs = &request.user_preferences;
    if prefs.selected_spots.is_empty() {
        return Err(AppError::InvalidInput(
            "No spots selected".to_string(),
        ));
    }
    if request.date_range_end < request.date_range_start {
        return Err(AppError::InvalidInput(format!(
            "date_range_end ({}) precedes date_range_start ({})",
            request.date_range_end, request.date_range_start
        )));
    }
    window_params(prefs).validate()?;

    prefs
        .selected_spots
        .iter()
        .map(|id| {
            find_spot(id).ok_or_else(|| AppError::InvalidInput(format!("Unknown spot: {}", id)))
        })
        .collect()
}

fn window_params(prefs: &UserPreferences) -> WindowParams {
    WindowParams {
        min_days: prefs.min_days,
        max_days: prefs.max_days,
        min_score: prefs.min_score,
    }
}

/// Candidate windows for one spot under the requested style.
fn windows_for_style(
    daily: &[DayScore],
    style: TripStyle,
    params: &WindowParams,
) -> Result<Vec<TripWindow>, AppError> {
    match style {
        TripStyle::Best => windows::select_optimal_windows(daily, params),
        TripStyle::Weekend => windows::select_weekend_windows(daily, params),
        TripStyle::LongWeekend => {
            // Weekend bases plus every valid 1–2 day extension
            let bases = windows::select_weekend_windows(daily, params)?;
            let mut candidates = Vec::new();
            for base in bases {
                candidates.extend(windows::weekend_extensions(daily, &base));
                candidates.push(base);
            }
            candidates.sort_by(|a, b| {
                b.avg_score
                    .partial_cmp(&a.avg_score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            candidates.truncate(MAX_WINDOWS);
            Ok(candidates)
        }
    }
}

async fn flights_for_window(
    flights: &dyn FlightSearch,
    prefs: &UserPreferences,
    spot: &SpotConfig,
    window: &TripWindow,
) -> Vec<Flight> {
    let mut options = Vec::new();
    for departure in &prefs.departure_airports {
        let query = FlightQuery {
            departure: departure.clone(),
            destination: spot.primary_airport.to_string(),
            outbound_date: window.start_date,
            return_date: window.end_date,
            outbound_time_pref: prefs.outbound_time_pref.clone(),
            return_time_pref: prefs.return_time_pref.clone(),
            stopovers_allowed: prefs.stopovers_allowed,
        };
        match flights.fetch_flights(&query).await {
            Ok(found) => options.extend(found),
            Err(e) => {
                tracing::warn!(
                    "Flight search {} -> {} failed: {}",
                    departure,
                    spot.primary_airport,
                    e,
                );
            }
        }
    }
    options
}

/// Analyze surf conditions and select optimal trip windows with flights.
#[utoipa::path(
    post,
    path = "/api/v1/trips/analyze",
    tag = "Trips",
    request_body = TripRequest,
    responses(
        (status = 200, description = "Ranked trip options", body = TripAnalysisResponse),
        (status = 400, description = "Invalid parameters", body = crate::errors::ErrorResponse),
    )
)]
pub async fn analyze_trips(
    State(state): State<AppState>,
    Json(request): Json<TripRequest>,
) -> Result<Json<TripAnalysisResponse>, AppError> {
    let spots = validate(&request)?;
    let prefs = &request.user_preferences;

    // Bring stale layers up to date first; fresh spots are a no-op.
    let opts = RefreshOptions::new(
        state.config.refresh_threshold_hours,
        state.config.refresh_fanout,
    );
    refresh_spots(&state.store, state.provider.as_ref(), &spots, &opts).await;

    let params = window_params(prefs);
    let mut trips = Vec::new();

    for spot in spots {
        let half_days = state.store.get_half_day_scores(spot.spot_id).await?;
        let daily: Vec<DayScore> = windows::daily_from_half_days(&half_days)
            .into_iter()
            .filter(|d| d.date >= request.date_range_start && d.date <= request.date_range_end)
            .collect();
        if daily.is_empty() {
            tracing::debug!("No daily scores in range for {}", spot.spot_id);
            continue;
        }

        let selected = windows_for_style(&daily, prefs.trip_style, &params)?;
        for window in selected.into_iter().take(MAX_WINDOWS_PER_SPOT) {
            let flight_options =
                flights_for_window(state.flights.as_ref(), prefs, spot, &window).await;
            trips.push(TripOption {
                spot_id: spot.spot_id.to_string(),
                spot_name: spot.name.to_string(),
                start_date: window.start_date,
                end_date: window.end_date,
                duration_days: window.days,
                avg_score: window.avg_score,
                total_score: window.total_score,
                flights: flight_options,
            });
        }
    }

    trips.sort_by(|a, b| {
        b.avg_score
            .partial_cmp(&a.avg_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    trips.truncate(MAX_TRIPS);

    Ok(Json(TripAnalysisResponse { trips }))
}
