//! Point-based surf scoring for one forecast hour.
//!
//! All scoring is pure: a merged hour of weather + marine readings plus the
//! spot's directional preferences map to four component point values, a
//! clamped total and a descriptive rating. Missing inputs never fail; they
//! degrade to the "Unknown" rating with zero component points.

use chrono::{DateTime, Utc};

use crate::catalog::{DirRange, SpotConfig, SEMI_DIRECT_BUFFER_DEG};
use crate::db::models::{HourlyMarineRow, HourlyWeatherRow, ScoredHourRow};

pub const METERS_TO_FEET: f64 = 3.28084;

/// One hour of merged environmental readings, ready for scoring.
#[derive(Debug, Clone)]
pub struct HourConditions {
    pub wave_height_m: Option<f64>,
    pub wave_direction_deg: Option<f64>,
    pub wave_period_s: Option<f64>,
    pub wind_speed_kn: Option<f64>,
    pub wind_direction_deg: Option<f64>,
}

/// Wave height in feet, rounded to one decimal. The rounded value feeds both
/// the height points and the rating thresholds.
fn wave_height_ft(wave_height_m: f64) -> f64 {
    (wave_height_m * METERS_TO_FEET * 10.0).round() / 10.0
}

/// 0 inside the swell window, -1 in the 30°-buffered band around it,
/// -10 out of window. Endpoints are inclusive.
pub fn swell_direction_points(wave_direction_deg: f64, range: &DirRange) -> i64 {
    if range.contains(wave_direction_deg) {
        0
    } else if range.expanded(SEMI_DIRECT_BUFFER_DEG).contains(wave_direction_deg) {
        -1
    } else {
        -10
    }
}

/// Combined wind direction + speed points. A light favorable wind keeps the
/// full +2 bonus.
pub fn wind_points(wind_direction_deg: f64, wind_speed_kn: f64, range: &DirRange) -> i64 {
    if range.contains(wind_direction_deg) {
        if wind_speed_kn < 5.0 {
            2
        } else if wind_speed_kn <= 12.0 {
            2
        } else if wind_speed_kn <= 20.0 {
            1
        } else if wind_speed_kn <= 30.0 {
            0
        } else if wind_speed_kn <= 40.0 {
            -1
        } else {
            -3
        }
    } else if wind_speed_kn < 3.0 {
        1
    } else if wind_speed_kn <= 6.0 {
        0
    } else if wind_speed_kn <= 10.0 {
        -1
    } else if wind_speed_kn <= 20.0 {
        -4
    } else {
        -6
    }
}

pub fn wave_height_points(wave_height_m: f64) -> i64 {
    let ft = wave_height_ft(wave_height_m);
    if ft < 1.0 {
        1
    } else if ft < 2.0 {
        2
    } else if ft < 3.0 {
        3
    } else if ft < 5.0 {
        4
    } else {
        5
    }
}

pub fn wave_period_points(period_s: f64) -> i64 {
    if period_s < 6.0 {
        -4
    } else if period_s < 8.0 {
        -2
    } else if period_s < 10.0 {
        -1
    } else if period_s < 11.5 {
        0
    } else if period_s < 14.0 {
        1
    } else {
        2
    }
}

/// Rating lexicon for winds inside the spot's wind window. First match wins.
fn favorable_rating(ft: f64, period_s: f64) -> &'static str {
    if ft < 1.0 {
        "No surf"
    } else if ft < 3.0 {
        "Small"
    } else if ft >= 7.0 && period_s > 19.0 {
        "Epic"
    } else if ft >= 7.0 && period_s > 15.0 {
        "Firing"
    } else if ft > 5.0 && period_s > 13.0 {
        "Pumping"
    } else if ft >= 3.0 && period_s > 11.0 {
        "Good"
    } else if ft >= 3.0 && (9.0..=11.0).contains(&period_s) {
        "Fun"
    } else if ft >= 3.0 && period_s < 9.0 {
        "Fair"
    } else {
        "Small"
    }
}

/// Rating lexicon for winds outside the spot's wind window. First match wins.
fn unfavorable_rating(ft: f64, period_s: f64) -> &'static str {
    if ft < 3.0 && period_s < 8.0 {
        "Slop"
    } else if (3.0..=5.0).contains(&ft) && (8.0..=12.0).contains(&period_s) {
        "Mush"
    } else if ft >= 3.0 && period_s > 12.0 {
        "Messy"
    } else {
        "Meh"
    }
}

/// Score one merged hour against a spot's preferences.
pub fn score_hour(
    timestamp_utc: DateTime<Utc>,
    conditions: &HourConditions,
    spot: &SpotConfig,
) -> ScoredHourRow {
    let complete = (
        conditions.wave_height_m,
        conditions.wave_direction_deg,
        conditions.wave_period_s,
        conditions.wind_speed_kn,
        conditions.wind_direction_deg,
    );

    let (swell, wind, height, period, rating, relationship, summary) = match complete {
        (Some(wave_h), Some(wave_dir), Some(wave_period), Some(wind_speed), Some(wind_dir)) => {
            let swell = swell_direction_points(wave_dir, &spot.swell_dir_range);
            let wind = wind_points(wind_dir, wind_speed, &spot.wind_dir_range);
            let height = wave_height_points(wave_h);
            let period = wave_period_points(wave_period);

            let ft = wave_height_ft(wave_h);
            let favorable = spot.wind_dir_range.contains(wind_dir);
            let rating = if favorable {
                favorable_rating(ft, wave_period)
            } else {
                unfavorable_rating(ft, wave_period)
            };
            let relationship = if favorable { "favorable" } else { "unfavorable" };
            let summary = format!("{} - {} {:.0}kts", rating, relationship, wind_speed);
            (swell, wind, height, period, rating, relationship, summary)
        }
        _ => (
            0,
            0,
            0,
            0,
            "Unknown",
            "unknown",
            "Data unavailable".to_string(),
        ),
    };

    let total = (swell + wind + height + period).clamp(1, 10);

    ScoredHourRow {
        timestamp_utc,
        wave_height_m: conditions.wave_height_m,
        wave_direction_deg: conditions.wave_direction_deg,
        wave_period_s: conditions.wave_period_s,
        wind_speed_kn: conditions.wind_speed_kn,
        wind_direction_deg: conditions.wind_direction_deg,
        swell_points: swell,
        wind_points: wind,
        wave_height_points: height,
        wave_period_points: period,
        total_points: total,
        surf_rating: rating.to_string(),
        wind_relationship: relationship.to_string(),
        wave_height_ft: conditions.wave_height_m.map(wave_height_ft),
        conditions_summary: summary,
    }
}

/// Inner-join weather and marine rows on timestamp and score every hour
/// present in both layers. Rows without a partner are dropped.
pub fn score_merged_hours(
    weather: &[HourlyWeatherRow],
    marine: &[HourlyMarineRow],
    spot: &SpotConfig,
) -> Vec<ScoredHourRow> {
    let marine_by_ts: std::collections::HashMap<DateTime<Utc>, &HourlyMarineRow> =
        marine.iter().map(|m| (m.timestamp_utc, m)).collect();

    weather
        .iter()
        .filter_map(|w| {
            let m = marine_by_ts.get(&w.timestamp_utc)?;
            let conditions = HourConditions {
                wave_height_m: m.wave_height_m,
                wave_direction_deg: m.wave_direction_deg,
                wave_period_s: m.wave_period_s,
                wind_speed_kn: w.wind_speed_kn,
                wind_direction_deg: w.wind_direction_deg,
            };
            Some(score_hour(w.timestamp_utc, &conditions, spot))
        })
        .collect()
}
