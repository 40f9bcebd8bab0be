use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// One hour of atmospheric forecast for a spot. Missing provider values are
/// `None`, never omitted rows.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct HourlyWeatherRow {
    pub timestamp_utc: DateTime<Utc>,
    pub temperature_c: Option<f64>,
    pub wind_speed_kn: Option<f64>,
    pub wind_direction_deg: Option<f64>,
    pub wind_gusts_kn: Option<f64>,
}

/// One hour of marine forecast for a spot.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct HourlyMarineRow {
    pub timestamp_utc: DateTime<Utc>,
    pub wave_height_m: Option<f64>,
    pub wave_direction_deg: Option<f64>,
    pub wave_period_s: Option<f64>,
    pub sea_level_height_m: Option<f64>,
}

/// Daily sunrise/sunset and temperature envelope for a spot.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct DailyWeatherRow {
    pub date_local: NaiveDate,
    /// Sunrise as epoch seconds (UTC instant).
    pub sunrise_epoch: Option<i64>,
    /// Sunset as epoch seconds (UTC instant).
    pub sunset_epoch: Option<i64>,
    pub daylight_duration_s: Option<f64>,
    pub temperature_min_c: Option<f64>,
    pub temperature_max_c: Option<f64>,
}

/// One scored forecast hour: the measurements used, the four component
/// points, the clamped total and the descriptive rating.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ScoredHourRow {
    pub timestamp_utc: DateTime<Utc>,
    pub wave_height_m: Option<f64>,
    pub wave_direction_deg: Option<f64>,
    pub wave_period_s: Option<f64>,
    pub wind_speed_kn: Option<f64>,
    pub wind_direction_deg: Option<f64>,
    pub swell_points: i64,
    pub wind_points: i64,
    pub wave_height_points: i64,
    pub wave_period_points: i64,
    /// Always within [1, 10].
    pub total_points: i64,
    pub surf_rating: String,
    /// "favorable", "unfavorable" or "unknown".
    pub wind_relationship: String,
    pub wave_height_ft: Option<f64>,
    pub conditions_summary: String,
}

/// Mean score for the daylight hours of one half of a day.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct HalfDayScoreRow {
    pub date_local: NaiveDate,
    /// "morning" (before 13:00 local) or "afternoon".
    pub half_day: String,
    pub avg_total_points: f64,
}

/// Daily daylight-hours aggregate with modal descriptive fields.
#[derive(Debug, Clone, Serialize, FromRow, utoipa::ToSchema)]
pub struct DailyScoreRow {
    pub date_local: NaiveDate,
    pub avg_total_points: f64,
    pub surf_rating: String,
    pub wind_relationship: String,
    pub conditions_summary: String,
}

/// Per-spot freshness ledger row: last successful write per layer, UTC.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct FreshnessLedgerRow {
    pub weather_updated_at: Option<DateTime<Utc>>,
    pub marine_updated_at: Option<DateTime<Utc>>,
    pub daily_weather_updated_at: Option<DateTime<Utc>>,
    pub scored_updated_at: Option<DateTime<Utc>>,
    pub half_day_updated_at: Option<DateTime<Utc>>,
    pub daily_scores_updated_at: Option<DateTime<Utc>>,
}

impl FreshnessLedgerRow {
    pub fn layer_timestamp(&self, layer: Layer) -> Option<DateTime<Utc>> {
        match layer {
            Layer::Weather => self.weather_updated_at,
            Layer::Marine => self.marine_updated_at,
            Layer::DailyWeather => self.daily_weather_updated_at,
            Layer::Scored => self.scored_updated_at,
            Layer::HalfDay => self.half_day_updated_at,
            Layer::DailyScores => self.daily_scores_updated_at,
        }
    }
}

/// The six logical data layers tracked by the freshness ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layer {
    Weather,
    Marine,
    DailyWeather,
    Scored,
    HalfDay,
    DailyScores,
}

impl Layer {
    /// Column holding this layer's last-write timestamp in `freshness_ledger`.
    pub fn ledger_column(self) -> &'static str {
        match self {
            Layer::Weather => "weather_updated_at",
            Layer::Marine => "marine_updated_at",
            Layer::DailyWeather => "daily_weather_updated_at",
            Layer::Scored => "scored_updated_at",
            Layer::HalfDay => "half_day_updated_at",
            Layer::DailyScores => "daily_scores_updated_at",
        }
    }
}
