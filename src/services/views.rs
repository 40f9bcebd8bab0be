//! Read-only forecast views composed from store reads.
//!
//! `daily_view` serves the daily aggregate as-is. `detailed_view` joins the
//! daily aggregate with sunrise/sunset, the temperature envelope and the
//! daylight-masked hourly breakdown, with sea level looked up
//! nearest-neighbour in the marine layer. Missing sea level stays missing;
//! nothing synthetic is injected.

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use utoipa::ToSchema;

use crate::catalog::{find_spot, SpotConfig};
use crate::db::models::{DailyScoreRow, DailyWeatherRow, HourlyMarineRow, ScoredHourRow};
use crate::db::store::SurfStore;
use crate::errors::AppError;

/// One daylight hour in the detailed view.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HourDetail {
    /// Spot-local wall-clock time, "HH:MM".
    pub local_time: String,
    pub score: i64,
    pub rating: String,
    pub wave_height_ft: Option<f64>,
    pub wave_period_s: Option<f64>,
    pub wind_speed_kn: Option<f64>,
    pub wind_direction_deg: Option<f64>,
    pub wind_favorable: bool,
    /// Nearest-neighbour sea level from the marine layer; absent when the
    /// provider did not supply it.
    pub sea_level_height_m: Option<f64>,
}

/// One date in the detailed view.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DetailedDay {
    pub date: NaiveDate,
    /// Daily aggregate for this date, when one exists.
    pub summary: Option<DailyScoreRow>,
    /// Spot-local sunrise/sunset, "HH:MM".
    pub sunrise_local: Option<String>,
    pub sunset_local: Option<String>,
    pub temperature_min_c: Option<f64>,
    pub temperature_max_c: Option<f64>,
    pub hours: Vec<HourDetail>,
}

fn known_spot(spot_id: &str) -> Result<&'static SpotConfig, AppError> {
    find_spot(spot_id).ok_or_else(|| AppError::NotFound(format!("Spot {} not found", spot_id)))
}

/// Daily aggregate rows, ascending by date. Empty when the spot has no data.
pub async fn daily_view(store: &SurfStore, spot_id: &str) -> Result<Vec<DailyScoreRow>, AppError> {
    known_spot(spot_id)?;
    store.get_daily_scores(spot_id).await
}

fn local_hhmm(epoch: i64, tz: Tz) -> Option<String> {
    let utc = DateTime::<Utc>::from_timestamp(epoch, 0)?;
    Some(
        tz.from_utc_datetime(&utc.naive_utc())
            .format("%H:%M")
            .to_string(),
    )
}

fn daylight_bounds(row: Option<&DailyWeatherRow>, tz: Tz) -> (NaiveTime, NaiveTime) {
    let default = (
        NaiveTime::from_hms_opt(6, 0, 0).unwrap(),
        NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
    );
    let Some(row) = row else { return default };
    let (Some(sunrise), Some(sunset)) = (row.sunrise_epoch, row.sunset_epoch) else {
        return default;
    };
    match (
        DateTime::<Utc>::from_timestamp(sunrise, 0),
        DateTime::<Utc>::from_timestamp(sunset, 0),
    ) {
        (Some(sr), Some(ss)) => (
            tz.from_utc_datetime(&sr.naive_utc()).time(),
            tz.from_utc_datetime(&ss.naive_utc()).time(),
        ),
        _ => default,
    }
}

/// Sea level at the marine row closest in time, if that row carries one.
fn nearest_sea_level(marine: &[HourlyMarineRow], at: DateTime<Utc>) -> Option<f64> {
    marine
        .iter()
        .min_by_key(|m| (m.timestamp_utc - at).num_seconds().abs())
        .and_then(|m| m.sea_level_height_m)
}

/// Detailed forecast for the next `days` dates with scored data.
pub async fn detailed_view(
    store: &SurfStore,
    spot_id: &str,
    days: usize,
) -> Result<Vec<DetailedDay>, AppError> {
    let spot = known_spot(spot_id)?;
    let tz = spot.tz();

    let scored = store.get_scored_hours(spot_id).await?;
    let daily_weather = store.get_daily_weather(spot_id).await?;
    let daily_scores = store.get_daily_scores(spot_id).await?;
    let marine = store.get_hourly_marine(spot_id).await?;

    // Group scored hours by spot-local date, keeping chronological order
    let mut dates: Vec<NaiveDate> = Vec::new();
    let mut by_date: std::collections::HashMap<NaiveDate, Vec<&ScoredHourRow>> =
        std::collections::HashMap::new();
    for row in &scored {
        let date = row.timestamp_utc.with_timezone(&tz).date_naive();
        let group = by_date.entry(date).or_default();
        if group.is_empty() {
            dates.push(date);
        }
        group.push(row);
    }
    dates.sort();
    dates.truncate(days);

    let mut result = Vec::with_capacity(dates.len());
    for date in dates {
        let weather_row = daily_weather.iter().find(|w| w.date_local == date);
        let (sunrise, sunset) = daylight_bounds(weather_row, tz);

        let hours = by_date
            .get(&date)
            .map(|rows| {
                rows.iter()
                    .filter_map(|row| {
                        let local = row.timestamp_utc.with_timezone(&tz);
                        let time = local.time();
                        if time < sunrise || time > sunset {
                            return None;
                        }
                        Some(HourDetail {
                            local_time: local.format("%H:%M").to_string(),
                            score: row.total_points,
                            rating: row.surf_rating.clone(),
                            wave_height_ft: row.wave_height_ft,
                            wave_period_s: row.wave_period_s,
                            wind_speed_kn: row.wind_speed_kn,
                            wind_direction_deg: row.wind_direction_deg,
                            wind_favorable: row.wind_relationship == "favorable",
                            sea_level_height_m: nearest_sea_level(&marine, row.timestamp_utc),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        result.push(DetailedDay {
            date,
            summary: daily_scores.iter().find(|d| d.date_local == date).cloned(),
            sunrise_local: weather_row
                .and_then(|w| w.sunrise_epoch)
                .and_then(|e| local_hhmm(e, tz)),
            sunset_local: weather_row
                .and_then(|w| w.sunset_epoch)
                .and_then(|e| local_hhmm(e, tz)),
            temperature_min_c: weather_row.and_then(|w| w.temperature_min_c),
            temperature_max_c: weather_row.and_then(|w| w.temperature_max_c),
            hours,
        });
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{HalfDayScoreRow, HourlyWeatherRow};
    use crate::db::store::test_support::in_memory_store;

    fn ts(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    async fn seed_one_day(store: &SurfStore, spot_id: &str) {
        let hours = ["2026-08-02T08:00:00Z", "2026-08-02T12:00:00Z"];
        let weather: Vec<HourlyWeatherRow> = hours
            .iter()
            .map(|t| HourlyWeatherRow {
                timestamp_utc: ts(t),
                temperature_c: Some(20.0),
                wind_speed_kn: Some(10.0),
                wind_direction_deg: Some(100.0),
                wind_gusts_kn: None,
            })
            .collect();
        let marine: Vec<HourlyMarineRow> = hours
            .iter()
            .enumerate()
            .map(|(i, t)| HourlyMarineRow {
                timestamp_utc: ts(t),
                wave_height_m: Some(1.2),
                wave_direction_deg: Some(300.0),
                wave_period_s: Some(12.0),
                // Only the 08:00 row carries sea level
                sea_level_height_m: (i == 0).then_some(0.45),
            })
            .collect();
        store.upsert_hourly_weather(spot_id, &weather).await.unwrap();
        store.upsert_hourly_marine(spot_id, &marine).await.unwrap();

        store
            .upsert_daily_weather(
                spot_id,
                &[DailyWeatherRow {
                    date_local: "2026-08-02".parse().unwrap(),
                    sunrise_epoch: Some(ts("2026-08-02T05:30:00Z").timestamp()),
                    sunset_epoch: Some(ts("2026-08-02T19:30:00Z").timestamp()),
                    daylight_duration_s: Some(50400.0),
                    temperature_min_c: Some(15.0),
                    temperature_max_c: Some(24.0),
                }],
            )
            .await
            .unwrap();

        let scored: Vec<ScoredHourRow> = hours
            .iter()
            .map(|t| ScoredHourRow {
                timestamp_utc: ts(t),
                wave_height_m: Some(1.2),
                wave_direction_deg: Some(300.0),
                wave_period_s: Some(12.0),
                wind_speed_kn: Some(10.0),
                wind_direction_deg: Some(100.0),
                swell_points: 0,
                wind_points: 2,
                wave_height_points: 4,
                wave_period_points: 1,
                total_points: 7,
                surf_rating: "Good".to_string(),
                wind_relationship: "favorable".to_string(),
                wave_height_ft: Some(3.9),
                conditions_summary: "Good - favorable 10kts".to_string(),
            })
            .collect();
        store.upsert_scored_hours(spot_id, &scored).await.unwrap();

        store
            .upsert_half_day_scores(
                spot_id,
                &[HalfDayScoreRow {
                    date_local: "2026-08-02".parse().unwrap(),
                    half_day: "morning".to_string(),
                    avg_total_points: 7.0,
                }],
            )
            .await
            .unwrap();
        store
            .upsert_daily_scores(
                spot_id,
                &[DailyScoreRow {
                    date_local: "2026-08-02".parse().unwrap(),
                    avg_total_points: 7.0,
                    surf_rating: "Good".to_string(),
                    wind_relationship: "favorable".to_string(),
                    conditions_summary: "Good - favorable 10kts".to_string(),
                }],
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_daily_view_unknown_spot() {
        let store = in_memory_store().await;
        let err = daily_view(&store, "atlantis").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_daily_view_empty_for_known_spot() {
        let store = in_memory_store().await;
        let rows = daily_view(&store, "mundaka").await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_daily_view_sorted() {
        let store = in_memory_store().await;
        seed_one_day(&store, "supertubos").await;
        let rows = daily_view(&store, "supertubos").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].avg_total_points, 7.0);
    }

    #[tokio::test]
    async fn test_detailed_view_joins_layers() {
        let store = in_memory_store().await;
        seed_one_day(&store, "supertubos").await;

        let days = detailed_view(&store, "supertubos", 7).await.unwrap();
        assert_eq!(days.len(), 1);
        let day = &days[0];

        assert_eq!(day.date, "2026-08-02".parse().unwrap());
        assert!(day.summary.is_some());
        assert_eq!(day.temperature_min_c, Some(15.0));
        assert_eq!(day.temperature_max_c, Some(24.0));
        // Supertubos runs on Europe/Lisbon (UTC+1 in August)
        assert_eq!(day.sunrise_local.as_deref(), Some("06:30"));
        assert_eq!(day.sunset_local.as_deref(), Some("20:30"));

        assert_eq!(day.hours.len(), 2);
        assert_eq!(day.hours[0].local_time, "09:00");
        assert_eq!(day.hours[0].score, 7);
        assert!(day.hours[0].wind_favorable);
        assert_eq!(day.hours[0].sea_level_height_m, Some(0.45));
        // Nearest marine row to 12:00 UTC is the 12:00 row, which lacks sea
        // level; the view reports it missing rather than substituting
        assert_eq!(day.hours[1].sea_level_height_m, None);
    }

    #[tokio::test]
    async fn test_detailed_view_respects_days_limit() {
        let store = in_memory_store().await;
        seed_one_day(&store, "supertubos").await;
        let days = detailed_view(&store, "supertubos", 0).await.unwrap();
        assert!(days.is_empty());
    }

    #[tokio::test]
    async fn test_detailed_view_unknown_spot() {
        let store = in_memory_store().await;
        let err = detailed_view(&store, "atlantis", 7).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
