//! Daylight-masked half-day and daily aggregation of scored hours.
//!
//! Hours are grouped by spot-local date. The daylight window for a date
//! comes from the daily-weather layer (sunrise/sunset converted to local
//! time); dates without a usable row fall back to 06:00–18:00. Window
//! bounds are inclusive on both ends.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

use crate::db::models::{DailyScoreRow, DailyWeatherRow, HalfDayScoreRow, ScoredHourRow};

/// Local hour at which "morning" becomes "afternoon".
const HALF_DAY_SPLIT_HOUR: u32 = 13;

fn default_daylight() -> (NaiveTime, NaiveTime) {
    (
        NaiveTime::from_hms_opt(6, 0, 0).unwrap(),
        NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
    )
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Local sunrise/sunset time-of-day per date, from the daily-weather layer.
fn daylight_windows(
    daily_weather: &[DailyWeatherRow],
    tz: Tz,
) -> HashMap<NaiveDate, (NaiveTime, NaiveTime)> {
    let mut windows = HashMap::new();
    for row in daily_weather {
        let (Some(sunrise), Some(sunset)) = (row.sunrise_epoch, row.sunset_epoch) else {
            continue;
        };
        let (Some(sunrise_utc), Some(sunset_utc)) = (
            DateTime::<Utc>::from_timestamp(sunrise, 0),
            DateTime::<Utc>::from_timestamp(sunset, 0),
        ) else {
            continue;
        };
        windows.insert(
            row.date_local,
            (
                tz.from_utc_datetime(&sunrise_utc.naive_utc()).time(),
                tz.from_utc_datetime(&sunset_utc.naive_utc()).time(),
            ),
        );
    }
    windows
}

/// Scored hours that fall inside their date's daylight window, tagged with
/// local date and time.
fn daylight_hours<'a>(
    scored: &'a [ScoredHourRow],
    daily_weather: &[DailyWeatherRow],
    tz: Tz,
) -> Vec<(NaiveDate, NaiveTime, &'a ScoredHourRow)> {
    let windows = daylight_windows(daily_weather, tz);
    scored
        .iter()
        .filter_map(|row| {
            let local = row.timestamp_utc.with_timezone(&tz);
            let date = local.date_naive();
            let time = local.time();
            let (sunrise, sunset) = windows.get(&date).copied().unwrap_or_else(default_daylight);
            (sunrise <= time && time <= sunset).then_some((date, time, row))
        })
        .collect()
}

/// Mean score per (date, half). Empty groups produce no row.
pub fn half_day_scores(
    scored: &[ScoredHourRow],
    daily_weather: &[DailyWeatherRow],
    tz: Tz,
) -> Vec<HalfDayScoreRow> {
    let mut groups: BTreeMap<(NaiveDate, &'static str), Vec<i64>> = BTreeMap::new();
    for (date, time, row) in daylight_hours(scored, daily_weather, tz) {
        let half = if time.hour() < HALF_DAY_SPLIT_HOUR {
            "morning"
        } else {
            "afternoon"
        };
        groups.entry((date, half)).or_default().push(row.total_points);
    }

    groups
        .into_iter()
        .map(|((date_local, half_day), points)| HalfDayScoreRow {
            date_local,
            half_day: half_day.to_string(),
            avg_total_points: round2(points.iter().sum::<i64>() as f64 / points.len() as f64),
        })
        .collect()
}

/// Most frequent value; ties break to the lexicographically smallest.
fn mode<'a, I: Iterator<Item = &'a str>>(values: I) -> Option<String> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for v in values {
        *counts.entry(v).or_default() += 1;
    }
    let mut best: Option<(&str, usize)> = None;
    for (value, count) in counts {
        match best {
            Some((_, best_count)) if count <= best_count => {}
            _ => best = Some((value, count)),
        }
    }
    best.map(|(v, _)| v.to_string())
}

/// Mean score plus modal rating, wind relationship and summary per date.
pub fn daily_scores(
    scored: &[ScoredHourRow],
    daily_weather: &[DailyWeatherRow],
    tz: Tz,
) -> Vec<DailyScoreRow> {
    let mut groups: BTreeMap<NaiveDate, Vec<&ScoredHourRow>> = BTreeMap::new();
    for (date, _, row) in daylight_hours(scored, daily_weather, tz) {
        groups.entry(date).or_default().push(row);
    }

    groups
        .into_iter()
        .map(|(date_local, rows)| {
            let avg =
                rows.iter().map(|r| r.total_points).sum::<i64>() as f64 / rows.len() as f64;
            DailyScoreRow {
                date_local,
                avg_total_points: round2(avg),
                surf_rating: mode(rows.iter().map(|r| r.surf_rating.as_str()))
                    .unwrap_or_else(|| "Unknown".to_string()),
                wind_relationship: mode(rows.iter().map(|r| r.wind_relationship.as_str()))
                    .unwrap_or_else(|| "unknown".to_string()),
                conditions_summary: mode(rows.iter().map(|r| r.conditions_summary.as_str()))
                    .unwrap_or_else(|| "N/A".to_string()),
            }
        })
        .collect()
}
