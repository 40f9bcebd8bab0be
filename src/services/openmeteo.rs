//! Open-Meteo provider adapters.
//!
//! Two thin clients over the forecast and marine endpoints. Each returns a
//! dense hourly grid already aligned on hour boundaries; missing values come
//! back as JSON nulls and stay `None`. The adapters do no caching, merging
//! or timezone conversion.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::db::models::{DailyWeatherRow, HourlyMarineRow, HourlyWeatherRow};
use crate::errors::AppError;

const WEATHER_API_URL: &str = "https://api.open-meteo.com/v1/forecast";
const MARINE_API_URL: &str = "https://marine-api.open-meteo.com/v1/marine";

/// HTTP request timeout for provider calls (seconds).
const HTTP_TIMEOUT_SECS: u64 = 30;

/// Retry envelope: attempts and exponential-backoff base.
const RETRY_ATTEMPTS: u32 = 5;
const RETRY_BASE: Duration = Duration::from_millis(200);

/// Forecast horizon requested from both providers.
const FORECAST_DAYS: u32 = 16;

const WEATHER_MODEL: &str = "gfs_seamless";
const MARINE_MODEL: &str = "ncep_gfswave025";

/// Client for the Open-Meteo forecast and marine APIs.
#[derive(Debug, Clone)]
pub struct OpenMeteoClient {
    client: reqwest::Client,
    weather_url: String,
    marine_url: String,
    retry_base: Duration,
}

// --- Open-Meteo JSON response types (timeformat=unixtime) ---

#[derive(Debug, Deserialize)]
struct WeatherResponse {
    hourly: WeatherHourly,
    daily: WeatherDaily,
}

#[derive(Debug, Deserialize)]
struct WeatherHourly {
    time: Vec<i64>,
    temperature_2m: Vec<Option<f64>>,
    wind_speed_10m: Vec<Option<f64>>,
    wind_direction_10m: Vec<Option<f64>>,
    wind_gusts_10m: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct WeatherDaily {
    time: Vec<i64>,
    sunrise: Vec<Option<i64>>,
    sunset: Vec<Option<i64>>,
    daylight_duration: Vec<Option<f64>>,
    temperature_2m_min: Vec<Option<f64>>,
    temperature_2m_max: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct MarineResponse {
    hourly: MarineHourly,
}

#[derive(Debug, Deserialize)]
struct MarineHourly {
    time: Vec<i64>,
    wave_height: Vec<Option<f64>>,
    wave_direction: Vec<Option<f64>>,
    wave_period: Vec<Option<f64>>,
    sea_level_height_msl: Vec<Option<f64>>,
}

/// The time axis must be finite, strictly ascending (no duplicates) and every
/// value column must cover it exactly.
fn check_grid(endpoint: &str, time: &[i64], column_lens: &[usize]) -> Result<(), AppError> {
    if time.is_empty() {
        return Err(AppError::ProviderUnavailable(format!(
            "{} returned an empty time axis",
            endpoint
        )));
    }
    if time.windows(2).any(|w| w[0] >= w[1]) {
        return Err(AppError::ProviderUnavailable(format!(
            "{} time axis is not strictly ascending",
            endpoint
        )));
    }
    if column_lens.iter().any(|len| *len != time.len()) {
        return Err(AppError::ProviderUnavailable(format!(
            "{} value columns do not cover the time axis",
            endpoint
        )));
    }
    Ok(())
}

fn epoch_to_utc(endpoint: &str, epoch: i64) -> Result<DateTime<Utc>, AppError> {
    DateTime::<Utc>::from_timestamp(epoch, 0).ok_or_else(|| {
        AppError::ProviderUnavailable(format!(
            "{} returned out-of-range timestamp {}",
            endpoint, epoch
        ))
    })
}

impl OpenMeteoClient {
    pub fn new() -> Self {
        Self::with_urls(WEATHER_API_URL, MARINE_API_URL)
    }

    /// Client with custom endpoint URLs (tests point these at a mock server).
    pub fn with_urls(weather_url: &str, marine_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .expect("Failed to build HTTP client");
        Self {
            client,
            weather_url: weather_url.to_string(),
            marine_url: marine_url.to_string(),
            retry_base: RETRY_BASE,
        }
    }

    /// GET with the bounded retry schedule. Transport errors and non-success
    /// statuses are retried with exponential backoff; after the last attempt
    /// the call fails with `ProviderUnavailable`.
    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, AppError> {
        let mut last_error = String::new();

        for attempt in 0..RETRY_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(self.retry_base * 2u32.pow(attempt - 1)).await;
            }

            let response = match self.client.get(url).query(query).send().await {
                Ok(r) => r,
                Err(e) => {
                    last_error = format!("request failed: {}", e);
                    tracing::warn!(
                        "Provider attempt {}/{} to {} failed: {}",
                        attempt + 1,
                        RETRY_ATTEMPTS,
                        url,
                        last_error,
                    );
                    continue;
                }
            };

            if !response.status().is_success() {
                last_error = format!("HTTP {}", response.status());
                tracing::warn!(
                    "Provider attempt {}/{} to {} failed: {}",
                    attempt + 1,
                    RETRY_ATTEMPTS,
                    url,
                    last_error,
                );
                continue;
            }

            // A malformed body is not transient; fail without further retries.
            return response.json::<T>().await.map_err(|e| {
                AppError::ProviderUnavailable(format!("{} JSON parse error: {}", url, e))
            });
        }

        Err(AppError::ProviderUnavailable(format!(
            "{} failed after {} attempts: {}",
            url, RETRY_ATTEMPTS, last_error
        )))
    }

    /// Fetch the hourly and daily atmospheric forecast for a location.
    pub async fn fetch_hourly_and_daily_weather(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<(Vec<HourlyWeatherRow>, Vec<DailyWeatherRow>), AppError> {
        let query = [
            ("latitude", format!("{:.6}", latitude)),
            ("longitude", format!("{:.6}", longitude)),
            (
                "hourly",
                "temperature_2m,wind_speed_10m,wind_direction_10m,wind_gusts_10m".to_string(),
            ),
            (
                "daily",
                "sunset,sunrise,daylight_duration,temperature_2m_min,temperature_2m_max"
                    .to_string(),
            ),
            ("models", WEATHER_MODEL.to_string()),
            ("wind_speed_unit", "kn".to_string()),
            ("forecast_days", FORECAST_DAYS.to_string()),
            ("timeformat", "unixtime".to_string()),
        ];

        let response: WeatherResponse = self.get_json(&self.weather_url, &query).await?;

        let hourly = &response.hourly;
        check_grid(
            "weather hourly",
            &hourly.time,
            &[
                hourly.temperature_2m.len(),
                hourly.wind_speed_10m.len(),
                hourly.wind_direction_10m.len(),
                hourly.wind_gusts_10m.len(),
            ],
        )?;

        let mut hourly_rows = Vec::with_capacity(hourly.time.len());
        for (i, epoch) in hourly.time.iter().enumerate() {
            hourly_rows.push(HourlyWeatherRow {
                timestamp_utc: epoch_to_utc("weather hourly", *epoch)?,
                temperature_c: hourly.temperature_2m[i],
                wind_speed_kn: hourly.wind_speed_10m[i],
                wind_direction_deg: hourly.wind_direction_10m[i],
                wind_gusts_kn: hourly.wind_gusts_10m[i],
            });
        }

        let daily = &response.daily;
        check_grid(
            "weather daily",
            &daily.time,
            &[
                daily.sunrise.len(),
                daily.sunset.len(),
                daily.daylight_duration.len(),
                daily.temperature_2m_min.len(),
                daily.temperature_2m_max.len(),
            ],
        )?;

        let mut daily_rows = Vec::with_capacity(daily.time.len());
        for (i, epoch) in daily.time.iter().enumerate() {
            daily_rows.push(DailyWeatherRow {
                date_local: epoch_to_utc("weather daily", *epoch)?.date_naive(),
                sunrise_epoch: daily.sunrise[i],
                sunset_epoch: daily.sunset[i],
                daylight_duration_s: daily.daylight_duration[i],
                temperature_min_c: daily.temperature_2m_min[i],
                temperature_max_c: daily.temperature_2m_max[i],
            });
        }

        Ok((hourly_rows, daily_rows))
    }

    /// Fetch the hourly marine forecast (waves + sea level) for a location.
    pub async fn fetch_hourly_marine(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<Vec<HourlyMarineRow>, AppError> {
        let query = [
            ("latitude", format!("{:.6}", latitude)),
            ("longitude", format!("{:.6}", longitude)),
            (
                "hourly",
                "wave_height,wave_direction,wave_period,sea_level_height_msl".to_string(),
            ),
            ("models", MARINE_MODEL.to_string()),
            ("forecast_days", FORECAST_DAYS.to_string()),
            ("timeformat", "unixtime".to_string()),
        ];

        let response: MarineResponse = self.get_json(&self.marine_url, &query).await?;

        let hourly = &response.hourly;
        check_grid(
            "marine hourly",
            &hourly.time,
            &[
                hourly.wave_height.len(),
                hourly.wave_direction.len(),
                hourly.wave_period.len(),
                hourly.sea_level_height_msl.len(),
            ],
        )?;

        let mut rows = Vec::with_capacity(hourly.time.len());
        for (i, epoch) in hourly.time.iter().enumerate() {
            rows.push(HourlyMarineRow {
                timestamp_utc: epoch_to_utc("marine hourly", *epoch)?,
                wave_height_m: hourly.wave_height[i],
                wave_direction_deg: hourly.wave_direction[i],
                wave_period_s: hourly.wave_period[i],
                sea_level_height_m: hourly.sea_level_height_msl[i],
            });
        }

        Ok(rows)
    }
}

impl Default for OpenMeteoClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Capability contract for forecast providers. The orchestrator depends on
/// this, so tests can substitute fakes without any HTTP.
#[async_trait::async_trait]
pub trait ForecastProvider: Send + Sync {
    async fn fetch_hourly_and_daily_weather(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<(Vec<HourlyWeatherRow>, Vec<DailyWeatherRow>), AppError>;

    async fn fetch_hourly_marine(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<Vec<HourlyMarineRow>, AppError>;
}

#[async_trait::async_trait]
impl ForecastProvider for OpenMeteoClient {
    async fn fetch_hourly_and_daily_weather(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<(Vec<HourlyWeatherRow>, Vec<DailyWeatherRow>), AppError> {
        OpenMeteoClient::fetch_hourly_and_daily_weather(self, latitude, longitude).await
    }

    async fn fetch_hourly_marine(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<Vec<HourlyMarineRow>, AppError> {
        OpenMeteoClient::fetch_hourly_marine(self, latitude, longitude).await
    }
}
