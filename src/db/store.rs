//! Single-writer persistent row store over SQLite.
//!
//! Each layer upsert replaces all rows for one `(spot, layer)` and stamps
//! the freshness ledger inside the same transaction. Writers to the same
//! `(spot, layer)` are serialized through a try-lock registry; a conflicting
//! in-flight writer surfaces as `StoreBusy`. Readers observe pre- or
//! post-state of an upsert, never a partial state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Sqlite, SqlitePool, Transaction};
use tokio::sync::OwnedMutexGuard;

use super::models::{
    DailyScoreRow, DailyWeatherRow, FreshnessLedgerRow, HalfDayScoreRow, HourlyMarineRow,
    HourlyWeatherRow, Layer, ScoredHourRow,
};
use crate::catalog::SpotConfig;
use crate::errors::AppError;

/// Maximum number of connections in the SQLite pool.
const DB_POOL_MAX_CONNECTIONS: u32 = 5;

type LockRegistry = Arc<Mutex<HashMap<(String, Layer), Arc<tokio::sync::Mutex<()>>>>>;

/// Handle to the surf cache database.
#[derive(Clone)]
pub struct SurfStore {
    pool: SqlitePool,
    write_locks: LockRegistry,
}

/// Freshness Policy: a layer is stale when it has never been written or its
/// last write is older than the threshold. Comparisons are in UTC.
pub fn is_stale(
    last_update: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    threshold_hours: i64,
) -> bool {
    match last_update {
        None => true,
        Some(ts) => now - ts > Duration::hours(threshold_hours),
    }
}

impl SurfStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            write_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Open (creating if missing) the cache database and run migrations.
    pub async fn connect(db_path: &str) -> Result<Self, AppError> {
        if let Some(parent) = std::path::Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    AppError::InternalError(format!(
                        "Failed to create database directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(DB_POOL_MAX_CONNECTIONS)
            .connect_with(options)
            .await?;

        sqlx::migrate!()
            .run(&pool)
            .await
            .map_err(|e| AppError::InternalError(format!("Migration failed: {}", e)))?;

        Ok(Self::new(pool))
    }

    /// Acquire the single-writer lock for one `(spot, layer)`. A conflicting
    /// in-flight writer yields `StoreBusy` immediately; writers to other
    /// `(spot, layer)` pairs are unaffected.
    fn acquire_write(&self, spot_id: &str, layer: Layer) -> Result<OwnedMutexGuard<()>, AppError> {
        let lock = {
            let mut registry = self
                .write_locks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            registry
                .entry((spot_id.to_string(), layer))
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        lock.try_lock_owned().map_err(|_| {
            AppError::StoreBusy(format!(
                "Write to {:?} for spot {} already in flight",
                layer, spot_id
            ))
        })
    }

    async fn stamp_ledger(
        tx: &mut Transaction<'_, Sqlite>,
        spot_id: &str,
        layer: Layer,
        now: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("INSERT INTO freshness_ledger (spot_id) VALUES (?1) ON CONFLICT(spot_id) DO NOTHING")
            .bind(spot_id)
            .execute(&mut **tx)
            .await?;
        // Column name comes from the Layer enum, never from user input.
        let sql = format!(
            "UPDATE freshness_ledger SET {} = ?2 WHERE spot_id = ?1",
            layer.ledger_column()
        );
        sqlx::query(&sql)
            .bind(spot_id)
            .bind(now)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Catalog
    // -----------------------------------------------------------------------

    pub async fn upsert_spot(&self, spot: &SpotConfig) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO spots (spot_id, name, latitude, longitude, timezone,
                                swell_dir_min, swell_dir_max, wind_dir_min, wind_dir_max,
                                primary_airport)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT (spot_id) DO UPDATE SET
                 name = excluded.name,
                 latitude = excluded.latitude,
                 longitude = excluded.longitude,
                 timezone = excluded.timezone,
                 swell_dir_min = excluded.swell_dir_min,
                 swell_dir_max = excluded.swell_dir_max,
                 wind_dir_min = excluded.wind_dir_min,
                 wind_dir_max = excluded.wind_dir_max,
                 primary_airport = excluded.primary_airport",
        )
        .bind(spot.spot_id)
        .bind(spot.name)
        .bind(spot.latitude)
        .bind(spot.longitude)
        .bind(spot.timezone)
        .bind(spot.swell_dir_range.min_deg)
        .bind(spot.swell_dir_range.max_deg)
        .bind(spot.wind_dir_range.min_deg)
        .bind(spot.wind_dir_range.max_deg)
        .bind(spot.primary_airport)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Raw layers
    // -----------------------------------------------------------------------

    pub async fn upsert_hourly_weather(
        &self,
        spot_id: &str,
        rows: &[HourlyWeatherRow],
    ) -> Result<(), AppError> {
        let _guard = self.acquire_write(spot_id, Layer::Weather)?;
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM hourly_weather WHERE spot_id = ?1")
            .bind(spot_id)
            .execute(&mut *tx)
            .await?;

        for row in rows {
            sqlx::query(
                "INSERT INTO hourly_weather
                     (spot_id, timestamp_utc, temperature_c, wind_speed_kn,
                      wind_direction_deg, wind_gusts_kn, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )
            .bind(spot_id)
            .bind(row.timestamp_utc)
            .bind(row.temperature_c)
            .bind(row.wind_speed_kn)
            .bind(row.wind_direction_deg)
            .bind(row.wind_gusts_kn)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        Self::stamp_ledger(&mut tx, spot_id, Layer::Weather, now).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn get_hourly_weather(
        &self,
        spot_id: &str,
    ) -> Result<Vec<HourlyWeatherRow>, AppError> {
        let rows = sqlx::query_as::<_, HourlyWeatherRow>(
            "SELECT timestamp_utc, temperature_c, wind_speed_kn,
                    wind_direction_deg, wind_gusts_kn
             FROM hourly_weather
             WHERE spot_id = ?1
             ORDER BY timestamp_utc",
        )
        .bind(spot_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn upsert_hourly_marine(
        &self,
        spot_id: &str,
        rows: &[HourlyMarineRow],
    ) -> Result<(), AppError> {
        let _guard = self.acquire_write(spot_id, Layer::Marine)?;
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM hourly_marine WHERE spot_id = ?1")
            .bind(spot_id)
            .execute(&mut *tx)
            .await?;

        for row in rows {
            sqlx::query(
                "INSERT INTO hourly_marine
                     (spot_id, timestamp_utc, wave_height_m, wave_direction_deg,
                      wave_period_s, sea_level_height_m, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )
            .bind(spot_id)
            .bind(row.timestamp_utc)
            .bind(row.wave_height_m)
            .bind(row.wave_direction_deg)
            .bind(row.wave_period_s)
            .bind(row.sea_level_height_m)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        Self::stamp_ledger(&mut tx, spot_id, Layer::Marine, now).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn get_hourly_marine(&self, spot_id: &str) -> Result<Vec<HourlyMarineRow>, AppError> {
        let rows = sqlx::query_as::<_, HourlyMarineRow>(
            "SELECT timestamp_utc, wave_height_m, wave_direction_deg,
                    wave_period_s, sea_level_height_m
             FROM hourly_marine
             WHERE spot_id = ?1
             ORDER BY timestamp_utc",
        )
        .bind(spot_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn upsert_daily_weather(
        &self,
        spot_id: &str,
        rows: &[DailyWeatherRow],
    ) -> Result<(), AppError> {
        let _guard = self.acquire_write(spot_id, Layer::DailyWeather)?;
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM daily_weather WHERE spot_id = ?1")
            .bind(spot_id)
            .execute(&mut *tx)
            .await?;

        for row in rows {
            sqlx::query(
                "INSERT INTO daily_weather
                     (spot_id, date_local, sunrise_epoch, sunset_epoch,
                      daylight_duration_s, temperature_min_c, temperature_max_c, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )
            .bind(spot_id)
            .bind(row.date_local)
            .bind(row.sunrise_epoch)
            .bind(row.sunset_epoch)
            .bind(row.daylight_duration_s)
            .bind(row.temperature_min_c)
            .bind(row.temperature_max_c)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        Self::stamp_ledger(&mut tx, spot_id, Layer::DailyWeather, now).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn get_daily_weather(&self, spot_id: &str) -> Result<Vec<DailyWeatherRow>, AppError> {
        let rows = sqlx::query_as::<_, DailyWeatherRow>(
            "SELECT date_local, sunrise_epoch, sunset_epoch, daylight_duration_s,
                    temperature_min_c, temperature_max_c
             FROM daily_weather
             WHERE spot_id = ?1
             ORDER BY date_local",
        )
        .bind(spot_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    // -----------------------------------------------------------------------
    // Scored layer
    // -----------------------------------------------------------------------

    pub async fn upsert_scored_hours(
        &self,
        spot_id: &str,
        rows: &[ScoredHourRow],
    ) -> Result<(), AppError> {
        // Reject invariant violations before touching the ledger.
        if let Some(bad) = rows
            .iter()
            .find(|r| !(1..=10).contains(&r.total_points))
        {
            return Err(AppError::StoreCorrupt(format!(
                "Scored row at {} has total_points {} outside [1, 10]",
                bad.timestamp_utc, bad.total_points
            )));
        }

        let _guard = self.acquire_write(spot_id, Layer::Scored)?;
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM scored_hours WHERE spot_id = ?1")
            .bind(spot_id)
            .execute(&mut *tx)
            .await?;

        for row in rows {
            sqlx::query(
                "INSERT INTO scored_hours
                     (spot_id, timestamp_utc, wave_height_m, wave_direction_deg, wave_period_s,
                      wind_speed_kn, wind_direction_deg, swell_points, wind_points,
                      wave_height_points, wave_period_points, total_points, surf_rating,
                      wind_relationship, wave_height_ft, conditions_summary, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
            )
            .bind(spot_id)
            .bind(row.timestamp_utc)
            .bind(row.wave_height_m)
            .bind(row.wave_direction_deg)
            .bind(row.wave_period_s)
            .bind(row.wind_speed_kn)
            .bind(row.wind_direction_deg)
            .bind(row.swell_points)
            .bind(row.wind_points)
            .bind(row.wave_height_points)
            .bind(row.wave_period_points)
            .bind(row.total_points)
            .bind(&row.surf_rating)
            .bind(&row.wind_relationship)
            .bind(row.wave_height_ft)
            .bind(&row.conditions_summary)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        // Every scored hour must be backed by source rows with the same key.
        let orphans: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM scored_hours s
             WHERE s.spot_id = ?1
               AND (NOT EXISTS (SELECT 1 FROM hourly_weather w
                                WHERE w.spot_id = s.spot_id
                                  AND w.timestamp_utc = s.timestamp_utc)
                    OR NOT EXISTS (SELECT 1 FROM hourly_marine m
                                   WHERE m.spot_id = s.spot_id
                                     AND m.timestamp_utc = s.timestamp_utc))",
        )
        .bind(spot_id)
        .fetch_one(&mut *tx)
        .await?;
        if orphans > 0 {
            return Err(AppError::StoreCorrupt(format!(
                "{} scored rows for spot {} lack matching weather/marine source rows",
                orphans, spot_id
            )));
        }

        Self::stamp_ledger(&mut tx, spot_id, Layer::Scored, now).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn get_scored_hours(&self, spot_id: &str) -> Result<Vec<ScoredHourRow>, AppError> {
        let rows = sqlx::query_as::<_, ScoredHourRow>(
            "SELECT timestamp_utc, wave_height_m, wave_direction_deg, wave_period_s,
                    wind_speed_kn, wind_direction_deg, swell_points, wind_points,
                    wave_height_points, wave_period_points, total_points, surf_rating,
                    wind_relationship, wave_height_ft, conditions_summary
             FROM scored_hours
             WHERE spot_id = ?1
             ORDER BY timestamp_utc",
        )
        .bind(spot_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// The UTC date range spanned by the scored layer, used to sanity-check
    /// aggregate writes (local dates can shift one day either side of UTC).
    async fn scored_date_bounds(
        tx: &mut Transaction<'_, Sqlite>,
        spot_id: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate)>, AppError> {
        let bounds: (Option<String>, Option<String>) = sqlx::query_as(
            "SELECT MIN(date(timestamp_utc)), MAX(date(timestamp_utc))
             FROM scored_hours WHERE spot_id = ?1",
        )
        .bind(spot_id)
        .fetch_one(&mut **tx)
        .await?;

        match bounds {
            (Some(min), Some(max)) => {
                let min = min.parse::<NaiveDate>().map_err(|e| {
                    AppError::InternalError(format!("Unparseable scored date {}: {}", min, e))
                })?;
                let max = max.parse::<NaiveDate>().map_err(|e| {
                    AppError::InternalError(format!("Unparseable scored date {}: {}", max, e))
                })?;
                Ok(Some((min, max)))
            }
            _ => Ok(None),
        }
    }

    fn check_aggregate_dates<'a, I: Iterator<Item = &'a NaiveDate>>(
        bounds: Option<(NaiveDate, NaiveDate)>,
        mut dates: I,
        spot_id: &str,
    ) -> Result<(), AppError> {
        let (min, max) = bounds.ok_or_else(|| {
            AppError::StoreCorrupt(format!(
                "Aggregate write for spot {} but the scored layer is empty",
                spot_id
            ))
        })?;
        let lo = min - Duration::days(1);
        let hi = max + Duration::days(1);
        if let Some(bad) = dates.find(|d| **d < lo || **d > hi) {
            return Err(AppError::StoreCorrupt(format!(
                "Aggregate date {} for spot {} has no scored hours near it",
                bad, spot_id
            )));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Aggregate layers
    // -----------------------------------------------------------------------

    pub async fn upsert_half_day_scores(
        &self,
        spot_id: &str,
        rows: &[HalfDayScoreRow],
    ) -> Result<(), AppError> {
        let _guard = self.acquire_write(spot_id, Layer::HalfDay)?;
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let bounds = Self::scored_date_bounds(&mut tx, spot_id).await?;
        Self::check_aggregate_dates(bounds, rows.iter().map(|r| &r.date_local), spot_id)?;

        sqlx::query("DELETE FROM half_day_scores WHERE spot_id = ?1")
            .bind(spot_id)
            .execute(&mut *tx)
            .await?;

        for row in rows {
            sqlx::query(
                "INSERT INTO half_day_scores
                     (spot_id, date_local, half_day, avg_total_points, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .bind(spot_id)
            .bind(row.date_local)
            .bind(&row.half_day)
            .bind(row.avg_total_points)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        Self::stamp_ledger(&mut tx, spot_id, Layer::HalfDay, now).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn get_half_day_scores(
        &self,
        spot_id: &str,
    ) -> Result<Vec<HalfDayScoreRow>, AppError> {
        let rows = sqlx::query_as::<_, HalfDayScoreRow>(
            "SELECT date_local, half_day, avg_total_points
             FROM half_day_scores
             WHERE spot_id = ?1
             ORDER BY date_local, half_day",
        )
        .bind(spot_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn upsert_daily_scores(
        &self,
        spot_id: &str,
        rows: &[DailyScoreRow],
    ) -> Result<(), AppError> {
        let _guard = self.acquire_write(spot_id, Layer::DailyScores)?;
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let bounds = Self::scored_date_bounds(&mut tx, spot_id).await?;
        Self::check_aggregate_dates(bounds, rows.iter().map(|r| &r.date_local), spot_id)?;

        sqlx::query("DELETE FROM daily_scores WHERE spot_id = ?1")
            .bind(spot_id)
            .execute(&mut *tx)
            .await?;

        for row in rows {
            sqlx::query(
                "INSERT INTO daily_scores
                     (spot_id, date_local, avg_total_points, surf_rating,
                      wind_relationship, conditions_summary, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )
            .bind(spot_id)
            .bind(row.date_local)
            .bind(row.avg_total_points)
            .bind(&row.surf_rating)
            .bind(&row.wind_relationship)
            .bind(&row.conditions_summary)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        Self::stamp_ledger(&mut tx, spot_id, Layer::DailyScores, now).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn get_daily_scores(&self, spot_id: &str) -> Result<Vec<DailyScoreRow>, AppError> {
        let rows = sqlx::query_as::<_, DailyScoreRow>(
            "SELECT date_local, avg_total_points, surf_rating, wind_relationship,
                    conditions_summary
             FROM daily_scores
             WHERE spot_id = ?1
             ORDER BY date_local",
        )
        .bind(spot_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    // -----------------------------------------------------------------------
    // Freshness
    // -----------------------------------------------------------------------

    pub async fn get_ledger(&self, spot_id: &str) -> Result<Option<FreshnessLedgerRow>, AppError> {
        let row = sqlx::query_as::<_, FreshnessLedgerRow>(
            "SELECT weather_updated_at, marine_updated_at, daily_weather_updated_at,
                    scored_updated_at, half_day_updated_at, daily_scores_updated_at
             FROM freshness_ledger
             WHERE spot_id = ?1",
        )
        .bind(spot_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Freshness Policy query: is this layer older than `threshold_hours`?
    pub async fn needs_update(
        &self,
        spot_id: &str,
        layer: Layer,
        threshold_hours: i64,
    ) -> Result<bool, AppError> {
        let ledger = self.get_ledger(spot_id).await?;
        let last = ledger.and_then(|l| l.layer_timestamp(layer));
        Ok(is_stale(last, Utc::now(), threshold_hours))
    }
}

#[cfg(test)]
impl SurfStore {
    /// Rewrite one ledger column, letting tests simulate layer age.
    pub(crate) async fn backdate_ledger(
        &self,
        spot_id: &str,
        layer: Layer,
        timestamp: DateTime<Utc>,
    ) {
        let sql = format!(
            "UPDATE freshness_ledger SET {} = ?2 WHERE spot_id = ?1",
            layer.ledger_column()
        );
        sqlx::query(&sql)
            .bind(spot_id)
            .bind(timestamp)
            .execute(&self.pool)
            .await
            .expect("backdate ledger");
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::catalog::SURF_SPOTS;

    /// In-memory store with migrations applied and the catalog seeded.
    /// A single connection keeps every operation on the same database.
    pub async fn in_memory_store() -> SurfStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory SQLite pool");
        sqlx::migrate!().run(&pool).await.expect("migrations");
        let store = SurfStore::new(pool);
        for spot in SURF_SPOTS {
            store.upsert_spot(spot).await.expect("seed spot");
        }
        store
    }
}
