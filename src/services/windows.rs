//! Trip-window selection over daily surf scores.
//!
//! Half-day scores reduce to one score per date; candidate windows are every
//! contiguous run of daily rows within the duration bounds. Candidates are
//! ranked by (average desc, consistency asc) with a stable sort, then
//! greedily de-duplicated so no two accepted windows overlap by more than
//! `MAX_OVERLAP_DAYS` inclusive days.

use std::collections::BTreeMap;

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::Serialize;
use utoipa::ToSchema;

use crate::db::models::HalfDayScoreRow;
use crate::errors::AppError;

/// Maximum inclusive-day overlap between two accepted windows.
pub const MAX_OVERLAP_DAYS: i64 = 2;

/// Maximum number of windows returned per selection.
pub const MAX_WINDOWS: usize = 10;

/// Added days must average at least this for a long-weekend extension.
const EXTENSION_MIN_ADDED_SCORE: f64 = 6.0;

/// One date's surf score (mean of its half-day values).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DayScore {
    pub date: NaiveDate,
    pub score: f64,
}

/// User constraints for window selection.
#[derive(Debug, Clone, Copy)]
pub struct WindowParams {
    pub min_days: u32,
    pub max_days: u32,
    pub min_score: f64,
}

impl WindowParams {
    /// Defaults for the weekend variant.
    pub fn weekend() -> Self {
        Self {
            min_days: 2,
            max_days: 4,
            min_score: 3.0,
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.min_days == 0 {
            return Err(AppError::InvalidInput(
                "min_days must be at least 1".to_string(),
            ));
        }
        if self.max_days < self.min_days {
            return Err(AppError::InvalidInput(format!(
                "max_days ({}) must not be less than min_days ({})",
                self.max_days, self.min_days
            )));
        }
        Ok(())
    }
}

/// A contiguous inclusive date range of daily scores.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TripWindow {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub days: u32,
    pub avg_score: f64,
    pub total_score: f64,
    /// Sample standard deviation of the daily scores; lower is steadier.
    pub consistency: f64,
}

/// Average the morning/afternoon values per date. Dates with a single half
/// keep that half's value.
pub fn daily_from_half_days(rows: &[HalfDayScoreRow]) -> Vec<DayScore> {
    let mut by_date: BTreeMap<NaiveDate, Vec<f64>> = BTreeMap::new();
    for row in rows {
        by_date
            .entry(row.date_local)
            .or_default()
            .push(row.avg_total_points);
    }
    by_date
        .into_iter()
        .map(|(date, halves)| DayScore {
            date,
            score: halves.iter().sum::<f64>() / halves.len() as f64,
        })
        .collect()
}

fn sample_std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let var = values
        .iter()
        .map(|v| (v - mean) * (v - mean))
        .sum::<f64>()
        / (values.len() - 1) as f64;
    var.sqrt()
}

fn window_from_slice(slice: &[DayScore]) -> TripWindow {
    let scores: Vec<f64> = slice.iter().map(|d| d.score).collect();
    let total: f64 = scores.iter().sum();
    TripWindow {
        start_date: slice[0].date,
        end_date: slice[slice.len() - 1].date,
        days: slice.len() as u32,
        avg_score: total / scores.len() as f64,
        total_score: total,
        consistency: sample_std_dev(&scores),
    }
}

/// Inclusive days shared by two inclusive date ranges.
fn overlap_days(a: &TripWindow, b: &TripWindow) -> i64 {
    let start = a.start_date.max(b.start_date);
    let end = a.end_date.min(b.end_date);
    if start <= end {
        (end - start).num_days() + 1
    } else {
        0
    }
}

/// Enumerate, rank and de-duplicate candidate windows.
pub fn select_optimal_windows(
    daily: &[DayScore],
    params: &WindowParams,
) -> Result<Vec<TripWindow>, AppError> {
    params.validate()?;

    let mut candidates = Vec::new();
    for duration in params.min_days..=params.max_days {
        let duration = duration as usize;
        if duration > daily.len() {
            break;
        }
        for start in 0..=(daily.len() - duration) {
            let window = window_from_slice(&daily[start..start + duration]);
            if window.avg_score >= params.min_score {
                candidates.push(window);
            }
        }
    }

    // Stable sort keeps enumeration order (earlier start first) among exact
    // ties, which makes the ranking reproducible.
    candidates.sort_by(|a, b| {
        b.avg_score
            .partial_cmp(&a.avg_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(
                a.consistency
                    .partial_cmp(&b.consistency)
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
    });

    let mut accepted: Vec<TripWindow> = Vec::new();
    for candidate in candidates {
        if accepted.len() >= MAX_WINDOWS {
            break;
        }
        let fits = accepted
            .iter()
            .all(|kept| overlap_days(&candidate, kept) <= MAX_OVERLAP_DAYS);
        if fits {
            accepted.push(candidate);
        }
    }
    Ok(accepted)
}

/// Weekend variant: restrict the daily domain to Friday–Sunday first.
pub fn select_weekend_windows(
    daily: &[DayScore],
    params: &WindowParams,
) -> Result<Vec<TripWindow>, AppError> {
    let weekend_days: Vec<DayScore> = daily
        .iter()
        .filter(|d| {
            matches!(
                d.date.weekday(),
                Weekday::Fri | Weekday::Sat | Weekday::Sun
            )
        })
        .copied()
        .collect();
    select_optimal_windows(&weekend_days, params)
}

/// Valid long-weekend extensions of a weekend window: try one then two extra
/// days; an extension stands only when the added days average at least 6.0
/// AND the extended window beats the base window's average.
pub fn weekend_extensions(daily: &[DayScore], base: &TripWindow) -> Vec<TripWindow> {
    let by_date: BTreeMap<NaiveDate, f64> = daily.iter().map(|d| (d.date, d.score)).collect();
    let mut extensions = Vec::new();

    for extra in 1..=2i64 {
        let extended_end = base.end_date + Duration::days(extra);

        let mut added = Vec::new();
        let mut day = base.end_date + Duration::days(1);
        let mut complete = true;
        while day <= extended_end {
            match by_date.get(&day) {
                Some(score) => added.push(*score),
                None => {
                    complete = false;
                    break;
                }
            }
            day += Duration::days(1);
        }
        if !complete || added.is_empty() {
            continue;
        }

        let added_avg = added.iter().sum::<f64>() / added.len() as f64;
        if added_avg < EXTENSION_MIN_ADDED_SCORE {
            continue;
        }

        let extended_scores: Vec<DayScore> = daily
            .iter()
            .filter(|d| d.date >= base.start_date && d.date <= extended_end)
            .copied()
            .collect();
        let extended = window_from_slice(&extended_scores);
        if extended.avg_score > base.avg_score {
            extensions.push(extended);
        }
    }
    extensions
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn days_from(start: &str, scores: &[f64]) -> Vec<DayScore> {
        let start = date(start);
        scores
            .iter()
            .enumerate()
            .map(|(i, s)| DayScore {
                date: start + Duration::days(i as i64),
                score: *s,
            })
            .collect()
    }

    #[test]
    fn test_daily_from_half_days_averages_halves() {
        let rows = vec![
            HalfDayScoreRow {
                date_local: date("2026-08-03"),
                half_day: "morning".to_string(),
                avg_total_points: 4.0,
            },
            HalfDayScoreRow {
                date_local: date("2026-08-03"),
                half_day: "afternoon".to_string(),
                avg_total_points: 6.0,
            },
            HalfDayScoreRow {
                date_local: date("2026-08-04"),
                half_day: "morning".to_string(),
                avg_total_points: 7.0,
            },
        ];
        let daily = daily_from_half_days(&rows);
        assert_eq!(daily.len(), 2);
        assert_eq!(daily[0].score, 5.0);
        assert_eq!(daily[1].score, 7.0, "Single-half date keeps its value");
    }

    #[test]
    fn test_ranking_and_overlap_suppression() {
        // Eight consecutive dates scoring [5,7,6,4,8,7,6,5]
        let daily = days_from("2026-08-01", &[5.0, 7.0, 6.0, 4.0, 8.0, 7.0, 6.0, 5.0]);
        let params = WindowParams {
            min_days: 3,
            max_days: 4,
            min_score: 5.5,
        };
        let windows = select_optimal_windows(&daily, &params).unwrap();

        // Best window is the [8,7,6] run
        assert_eq!(windows[0].start_date, date("2026-08-05"));
        assert_eq!(windows[0].end_date, date("2026-08-07"));
        assert_eq!(windows[0].avg_score, 7.0);

        // Three 4-day candidates tie at avg 6.25 / consistency 1.71; only the
        // earliest-starting one survives overlap suppression
        let tied: Vec<&TripWindow> = windows
            .iter()
            .filter(|w| (w.avg_score - 6.25).abs() < 1e-9)
            .collect();
        assert_eq!(tied.len(), 1);
        assert_eq!(tied[0].start_date, date("2026-08-02"));
        assert_eq!(tied[0].days, 4);
        assert!((tied[0].consistency - 1.7078).abs() < 1e-3);

        // Full accepted sequence
        let starts: Vec<NaiveDate> = windows.iter().map(|w| w.start_date).collect();
        assert_eq!(
            starts,
            vec![
                date("2026-08-05"),
                date("2026-08-04"),
                date("2026-08-02"),
                date("2026-08-01"),
                date("2026-08-06"),
            ]
        );
    }

    #[test]
    fn test_selected_windows_respect_constraints() {
        let daily = days_from("2026-08-01", &[5.0, 7.0, 6.0, 4.0, 8.0, 7.0, 6.0, 5.0]);
        let params = WindowParams {
            min_days: 3,
            max_days: 4,
            min_score: 5.5,
        };
        let windows = select_optimal_windows(&daily, &params).unwrap();
        assert!(!windows.is_empty());

        for w in &windows {
            assert!(w.avg_score >= params.min_score);
            assert!(w.days >= params.min_days && w.days <= params.max_days);
        }
        for (i, a) in windows.iter().enumerate() {
            for b in windows.iter().skip(i + 1) {
                assert!(
                    overlap_days(a, b) <= MAX_OVERLAP_DAYS,
                    "Windows {}..{} and {}..{} overlap too much",
                    a.start_date,
                    a.end_date,
                    b.start_date,
                    b.end_date
                );
            }
        }
    }

    #[test]
    fn test_min_score_filters_candidates() {
        let daily = days_from("2026-08-01", &[2.0, 2.0, 2.0, 2.0]);
        let params = WindowParams {
            min_days: 2,
            max_days: 3,
            min_score: 5.0,
        };
        assert!(select_optimal_windows(&daily, &params).unwrap().is_empty());
    }

    #[test]
    fn test_identical_input_identical_ordering() {
        let daily = days_from("2026-08-01", &[5.0, 7.0, 6.0, 4.0, 8.0, 7.0, 6.0, 5.0]);
        let params = WindowParams {
            min_days: 3,
            max_days: 4,
            min_score: 5.5,
        };
        let a = select_optimal_windows(&daily, &params).unwrap();
        let b = select_optimal_windows(&daily, &params).unwrap();
        let starts_a: Vec<NaiveDate> = a.iter().map(|w| w.start_date).collect();
        let starts_b: Vec<NaiveDate> = b.iter().map(|w| w.start_date).collect();
        assert_eq!(starts_a, starts_b);
    }

    #[test]
    fn test_invalid_duration_bounds_rejected() {
        let daily = days_from("2026-08-01", &[5.0, 6.0]);
        let params = WindowParams {
            min_days: 4,
            max_days: 2,
            min_score: 1.0,
        };
        let err = select_optimal_windows(&daily, &params).unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[test]
    fn test_weekend_variant_restricts_domain() {
        // 2026-08-03 is a Monday; two full weeks of dates
        let daily = days_from(
            "2026-08-03",
            &[
                1.0, 1.0, 1.0, 1.0, 8.0, 8.0, 8.0, // Mon–Thu poor, Fri–Sun great
                1.0, 1.0, 1.0, 1.0, 7.0, 7.0, 7.0,
            ],
        );
        let windows = select_weekend_windows(&daily, &WindowParams::weekend()).unwrap();
        assert!(!windows.is_empty());
        for w in &windows {
            for d in [w.start_date, w.end_date] {
                assert!(
                    matches!(d.weekday(), Weekday::Fri | Weekday::Sat | Weekday::Sun),
                    "{} is not Fri–Sun",
                    d
                );
            }
            // Weekday scores never leak in: every weekend day scored >= 7
            assert!(w.avg_score >= 7.0);
        }
    }

    #[test]
    fn test_extension_requires_both_predicates() {
        // Base weekend Fri 2026-08-07 .. Sun 2026-08-09 at avg 7.0
        let base = TripWindow {
            start_date: date("2026-08-07"),
            end_date: date("2026-08-09"),
            days: 3,
            avg_score: 7.0,
            total_score: 21.0,
            consistency: 0.0,
        };

        // Added Monday scores 9.0: improves the mean and clears the 6.0 bar
        let daily = days_from("2026-08-07", &[7.0, 7.0, 7.0, 9.0]);
        let ext = weekend_extensions(&daily, &base);
        assert_eq!(ext.len(), 1);
        assert_eq!(ext[0].end_date, date("2026-08-10"));
        assert!(ext[0].avg_score > base.avg_score);

        // Added day clears 6.0 but drags the mean down: rejected
        let daily = days_from("2026-08-07", &[7.0, 7.0, 7.0, 6.5]);
        assert!(weekend_extensions(&daily, &base).is_empty());

        // Added day improves nothing and scores below 6.0: rejected
        let daily = days_from("2026-08-07", &[7.0, 7.0, 7.0, 5.0]);
        assert!(weekend_extensions(&daily, &base).is_empty());
    }

    #[test]
    fn test_extension_by_two_days() {
        let base = TripWindow {
            start_date: date("2026-08-07"),
            end_date: date("2026-08-09"),
            days: 3,
            avg_score: 6.0,
            total_score: 18.0,
            consistency: 0.0,
        };
        // Mon 8.0, Tue 9.0: the one-day and two-day extensions both qualify
        let daily = days_from("2026-08-07", &[6.0, 6.0, 6.0, 8.0, 9.0]);
        let ext = weekend_extensions(&daily, &base);
        assert_eq!(ext.len(), 2);
        assert_eq!(ext[0].days, 4);
        assert_eq!(ext[1].days, 5);
        assert!(ext[1].avg_score > ext[0].avg_score);
    }

    #[test]
    fn test_extension_skipped_when_days_missing() {
        let base = TripWindow {
            start_date: date("2026-08-07"),
            end_date: date("2026-08-09"),
            days: 3,
            avg_score: 6.0,
            total_score: 18.0,
            consistency: 0.0,
        };
        // No data beyond the base window
        let daily = days_from("2026-08-07", &[6.0, 6.0, 6.0]);
        assert!(weekend_extensions(&daily, &base).is_empty());
    }

    #[test]
    fn test_consistency_is_sample_std_dev() {
        assert!((sample_std_dev(&[6.0, 4.0, 8.0, 7.0]) - 1.7078).abs() < 1e-3);
        assert_eq!(sample_std_dev(&[5.0]), 0.0);
    }
}
