//! Refresh orchestration.
//!
//! The single entry point that enforces dependency order across the six
//! data layers. Per spot: decide which raw layers are stale, fetch only what
//! is needed, then cascade re-derivation downstream (scored → half-day and
//! daily aggregates). Step failures are captured per layer; a failing spot
//! never aborts the multi-spot run.
//!
//! Spots refresh concurrently up to a configurable fan-out; within one spot
//! the steps are strictly sequential. Shared state is exposed through
//! `Arc<RwLock<RefreshState>>` for the status endpoint.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::RwLock;
use utoipa::ToSchema;

use crate::catalog::SpotConfig;
use crate::db::models::Layer;
use crate::db::store::SurfStore;
use crate::errors::AppError;
use crate::services::aggregate;
use crate::services::openmeteo::ForecastProvider;
use crate::services::scoring::score_merged_hours;

/// Delay before the single retry of a `StoreBusy` write (milliseconds).
const BUSY_RETRY_DELAY_MS: u64 = 50;

/// Refresh parameters. `threshold_hours` drives the Freshness Policy for
/// every layer; `force` overrides it entirely.
#[derive(Debug, Clone, Copy)]
pub struct RefreshOptions {
    pub threshold_hours: i64,
    pub fanout: usize,
    pub force: bool,
}

impl RefreshOptions {
    pub fn new(threshold_hours: i64, fanout: usize) -> Self {
        Self {
            threshold_hours,
            fanout,
            force: false,
        }
    }

    pub fn forced(mut self) -> Self {
        self.force = true;
        self
    }
}

/// Outcome of one pipeline step for one spot.
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct StepOutcome {
    pub updated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepOutcome {
    fn updated() -> Self {
        Self {
            updated: true,
            error: None,
        }
    }

    fn failed(err: &AppError) -> Self {
        Self {
            updated: false,
            error: Some(err.to_string()),
        }
    }
}

/// Per-spot refresh summary, one outcome per layer.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SpotRefreshSummary {
    pub spot_id: String,
    pub weather: StepOutcome,
    pub marine: StepOutcome,
    pub daily_weather: StepOutcome,
    pub scored: StepOutcome,
    pub half_day: StepOutcome,
    pub daily_scores: StepOutcome,
}

impl SpotRefreshSummary {
    fn new(spot_id: &str) -> Self {
        Self {
            spot_id: spot_id.to_string(),
            weather: StepOutcome::default(),
            marine: StepOutcome::default(),
            daily_weather: StepOutcome::default(),
            scored: StepOutcome::default(),
            half_day: StepOutcome::default(),
            daily_scores: StepOutcome::default(),
        }
    }

    pub fn updated_layers(&self) -> usize {
        [
            &self.weather,
            &self.marine,
            &self.daily_weather,
            &self.scored,
            &self.half_day,
            &self.daily_scores,
        ]
        .iter()
        .filter(|o| o.updated)
        .count()
    }

    pub fn error_count(&self) -> usize {
        [
            &self.weather,
            &self.marine,
            &self.daily_weather,
            &self.scored,
            &self.half_day,
            &self.daily_scores,
        ]
        .iter()
        .filter(|o| o.error.is_some())
        .count()
    }
}

/// Result of one multi-spot refresh run.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RefreshReport {
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub forced: bool,
    pub spots: Vec<SpotRefreshSummary>,
}

/// Shared orchestrator state, exposed via the status endpoint.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RefreshState {
    pub running: bool,
    pub total_runs: u64,
    pub last_report: Option<RefreshReport>,
}

impl RefreshState {
    pub fn new() -> Self {
        Self {
            running: false,
            total_runs: 0,
            last_report: None,
        }
    }
}

impl Default for RefreshState {
    fn default() -> Self {
        Self::new()
    }
}

pub type SharedRefreshState = Arc<RwLock<RefreshState>>;

/// Freshness check that degrades to "stale" when the ledger is unreadable.
async fn layer_stale(store: &SurfStore, spot_id: &str, layer: Layer, threshold: i64) -> bool {
    match store.needs_update(spot_id, layer, threshold).await {
        Ok(stale) => stale,
        Err(e) => {
            tracing::warn!(
                "Freshness check for {} {:?} failed ({}); treating as stale",
                spot_id,
                layer,
                e,
            );
            true
        }
    }
}

/// Run a store write, retrying once after a short delay when a conflicting
/// writer holds the (spot, layer) lock.
async fn with_busy_retry<F, Fut>(op: F) -> Result<(), AppError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<(), AppError>>,
{
    match op().await {
        Err(AppError::StoreBusy(_)) => {
            tokio::time::sleep(std::time::Duration::from_millis(BUSY_RETRY_DELAY_MS)).await;
            op().await
        }
        other => other,
    }
}

/// Refresh all layers for one spot in strict dependency order.
pub async fn refresh_spot(
    store: &SurfStore,
    provider: &dyn ForecastProvider,
    spot: &SpotConfig,
    opts: &RefreshOptions,
) -> SpotRefreshSummary {
    let mut summary = SpotRefreshSummary::new(spot.spot_id);
    let t = opts.threshold_hours;

    let needs_weather =
        opts.force || layer_stale(store, spot.spot_id, Layer::Weather, t).await;
    let needs_marine = opts.force || layer_stale(store, spot.spot_id, Layer::Marine, t).await;
    let needs_daily_weather =
        opts.force || layer_stale(store, spot.spot_id, Layer::DailyWeather, t).await;

    let raw_touched = needs_weather || needs_marine;
    let needs_scored =
        raw_touched || opts.force || layer_stale(store, spot.spot_id, Layer::Scored, t).await;
    let needs_half_day =
        needs_scored || opts.force || layer_stale(store, spot.spot_id, Layer::HalfDay, t).await;
    let needs_daily_scores = needs_scored
        || opts.force
        || layer_stale(store, spot.spot_id, Layer::DailyScores, t).await;

    // Step 1: atmospheric provider (hourly + daily in one call)
    if needs_weather || needs_daily_weather {
        match provider
            .fetch_hourly_and_daily_weather(spot.latitude, spot.longitude)
            .await
        {
            Ok((hourly, daily)) => {
                if needs_weather {
                    summary.weather =
                        match with_busy_retry(|| store.upsert_hourly_weather(spot.spot_id, &hourly))
                            .await
                        {
                            Ok(()) => StepOutcome::updated(),
                            Err(e) => StepOutcome::failed(&e),
                        };
                }
                if needs_daily_weather {
                    summary.daily_weather =
                        match with_busy_retry(|| store.upsert_daily_weather(spot.spot_id, &daily))
                            .await
                        {
                            Ok(()) => StepOutcome::updated(),
                            Err(e) => StepOutcome::failed(&e),
                        };
                }
            }
            Err(e) => {
                tracing::warn!("Weather fetch failed for {}: {}", spot.spot_id, e);
                if needs_weather {
                    summary.weather = StepOutcome::failed(&e);
                }
                if needs_daily_weather {
                    summary.daily_weather = StepOutcome::failed(&e);
                }
            }
        }
    }

    // Step 2: marine provider
    if needs_marine {
        match provider
            .fetch_hourly_marine(spot.latitude, spot.longitude)
            .await
        {
            Ok(rows) => {
                summary.marine =
                    match with_busy_retry(|| store.upsert_hourly_marine(spot.spot_id, &rows)).await
                    {
                        Ok(()) => StepOutcome::updated(),
                        Err(e) => StepOutcome::failed(&e),
                    };
            }
            Err(e) => {
                tracing::warn!("Marine fetch failed for {}: {}", spot.spot_id, e);
                summary.marine = StepOutcome::failed(&e);
            }
        }
    }

    // Step 3: score every hour present in both raw layers. A provider
    // failure above does not block this step as long as cached rows exist.
    if needs_scored {
        summary.scored = refresh_scored(store, spot).await;
    }

    // Steps 4 and 5: daylight-masked aggregates over the scored layer.
    if needs_half_day {
        summary.half_day = refresh_half_day(store, spot).await;
    }
    if needs_daily_scores {
        summary.daily_scores = refresh_daily_scores(store, spot).await;
    }

    tracing::info!(
        "Refreshed {}: {} layers updated, {} errors",
        spot.spot_id,
        summary.updated_layers(),
        summary.error_count(),
    );
    summary
}

async fn refresh_scored(store: &SurfStore, spot: &SpotConfig) -> StepOutcome {
    let weather = match store.get_hourly_weather(spot.spot_id).await {
        Ok(rows) => rows,
        Err(e) => return StepOutcome::failed(&e),
    };
    let marine = match store.get_hourly_marine(spot.spot_id).await {
        Ok(rows) => rows,
        Err(e) => return StepOutcome::failed(&e),
    };
    if weather.is_empty() || marine.is_empty() {
        return StepOutcome::failed(&AppError::PrerequisiteMissing(format!(
            "No cached weather/marine rows to score for {}",
            spot.spot_id
        )));
    }

    let scored = score_merged_hours(&weather, &marine, spot);
    match with_busy_retry(|| store.upsert_scored_hours(spot.spot_id, &scored)).await {
        Ok(()) => StepOutcome::updated(),
        Err(e) => StepOutcome::failed(&e),
    }
}

async fn refresh_half_day(store: &SurfStore, spot: &SpotConfig) -> StepOutcome {
    let scored = match store.get_scored_hours(spot.spot_id).await {
        Ok(rows) => rows,
        Err(e) => return StepOutcome::failed(&e),
    };
    if scored.is_empty() {
        return StepOutcome::failed(&AppError::PrerequisiteMissing(format!(
            "No scored rows to aggregate for {}",
            spot.spot_id
        )));
    }
    let daily_weather = match store.get_daily_weather(spot.spot_id).await {
        Ok(rows) => rows,
        Err(e) => return StepOutcome::failed(&e),
    };

    let rows = aggregate::half_day_scores(&scored, &daily_weather, spot.tz());
    match with_busy_retry(|| store.upsert_half_day_scores(spot.spot_id, &rows)).await {
        Ok(()) => StepOutcome::updated(),
        Err(e) => StepOutcome::failed(&e),
    }
}

async fn refresh_daily_scores(store: &SurfStore, spot: &SpotConfig) -> StepOutcome {
    let scored = match store.get_scored_hours(spot.spot_id).await {
        Ok(rows) => rows,
        Err(e) => return StepOutcome::failed(&e),
    };
    if scored.is_empty() {
        return StepOutcome::failed(&AppError::PrerequisiteMissing(format!(
            "No scored rows to aggregate for {}",
            spot.spot_id
        )));
    }
    let daily_weather = match store.get_daily_weather(spot.spot_id).await {
        Ok(rows) => rows,
        Err(e) => return StepOutcome::failed(&e),
    };

    let rows = aggregate::daily_scores(&scored, &daily_weather, spot.tz());
    match with_busy_retry(|| store.upsert_daily_scores(spot.spot_id, &rows)).await {
        Ok(()) => StepOutcome::updated(),
        Err(e) => StepOutcome::failed(&e),
    }
}

async fn indexed_refresh_spot(
    i: usize,
    store: &SurfStore,
    provider: &dyn ForecastProvider,
    spot: &SpotConfig,
    opts: &RefreshOptions,
) -> (usize, SpotRefreshSummary) {
    (i, refresh_spot(store, provider, spot, opts).await)
}

/// Refresh many spots with bounded concurrency. Per-spot summaries come back
/// in catalog order regardless of completion order.
pub async fn refresh_spots(
    store: &SurfStore,
    provider: &dyn ForecastProvider,
    spots: &[&SpotConfig],
    opts: &RefreshOptions,
) -> RefreshReport {
    let started_at = Utc::now();

    let futures: Vec<futures::future::BoxFuture<'_, (usize, SpotRefreshSummary)>> = spots
        .iter()
        .copied()
        .enumerate()
        .map(|(i, spot)| Box::pin(indexed_refresh_spot(i, store, provider, spot, opts)) as _)
        .collect();

    let mut indexed: Vec<(usize, SpotRefreshSummary)> = stream::iter(futures)
        .buffer_unordered(opts.fanout.max(1))
        .collect()
        .await;
    indexed.sort_by_key(|(i, _)| *i);

    RefreshReport {
        started_at,
        completed_at: Utc::now(),
        forced: opts.force,
        spots: indexed.into_iter().map(|(_, s)| s).collect(),
    }
}

/// Run a refresh while keeping the shared state current. Used by the refresh
/// endpoint's background task.
pub async fn run_tracked_refresh(
    store: SurfStore,
    provider: Arc<dyn ForecastProvider>,
    spots: Vec<&'static SpotConfig>,
    opts: RefreshOptions,
    state: SharedRefreshState,
) {
    {
        let mut s = state.write().await;
        s.running = true;
    }

    let report = refresh_spots(&store, provider.as_ref(), &spots, &opts).await;

    let mut s = state.write().await;
    s.running = false;
    s.total_runs += 1;
    s.last_report = Some(report);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::find_spot;
    use crate::db::models::{DailyWeatherRow, HourlyMarineRow, HourlyWeatherRow};
    use crate::db::store::test_support::in_memory_store;
    use chrono::Duration;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scriptable provider: serves a fixed grid, counts calls, and can fail
    /// per capability.
    struct FakeProvider {
        weather_calls: AtomicUsize,
        marine_calls: AtomicUsize,
        fail_weather: bool,
        fail_marine: bool,
    }

    impl FakeProvider {
        fn new() -> Self {
            Self {
                weather_calls: AtomicUsize::new(0),
                marine_calls: AtomicUsize::new(0),
                fail_weather: false,
                fail_marine: false,
            }
        }

        fn hours() -> Vec<chrono::DateTime<Utc>> {
            // Six daylight-ish UTC hours on one date
            [8, 9, 10, 11, 14, 16]
                .iter()
                .map(|h| format!("2026-08-02T{:02}:00:00Z", h).parse().unwrap())
                .collect()
        }
    }

    #[async_trait::async_trait]
    impl ForecastProvider for FakeProvider {
        async fn fetch_hourly_and_daily_weather(
            &self,
            _latitude: f64,
            _longitude: f64,
        ) -> Result<(Vec<HourlyWeatherRow>, Vec<DailyWeatherRow>), AppError> {
            self.weather_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_weather {
                return Err(AppError::ProviderUnavailable("weather down".to_string()));
            }
            let hourly = Self::hours()
                .into_iter()
                .map(|t| HourlyWeatherRow {
                    timestamp_utc: t,
                    temperature_c: Some(20.0),
                    wind_speed_kn: Some(10.0),
                    wind_direction_deg: Some(60.0),
                    wind_gusts_kn: Some(13.0),
                })
                .collect();
            let daily = vec![DailyWeatherRow {
                date_local: "2026-08-02".parse().unwrap(),
                sunrise_epoch: Some(
                    "2026-08-02T06:30:00Z"
                        .parse::<chrono::DateTime<Utc>>()
                        .unwrap()
                        .timestamp(),
                ),
                sunset_epoch: Some(
                    "2026-08-02T19:30:00Z"
                        .parse::<chrono::DateTime<Utc>>()
                        .unwrap()
                        .timestamp(),
                ),
                daylight_duration_s: Some(46800.0),
                temperature_min_c: Some(15.0),
                temperature_max_c: Some(24.0),
            }];
            Ok((hourly, daily))
        }

        async fn fetch_hourly_marine(
            &self,
            _latitude: f64,
            _longitude: f64,
        ) -> Result<Vec<HourlyMarineRow>, AppError> {
            self.marine_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_marine {
                return Err(AppError::ProviderUnavailable("marine down".to_string()));
            }
            Ok(Self::hours()
                .into_iter()
                .map(|t| HourlyMarineRow {
                    timestamp_utc: t,
                    wave_height_m: Some(1.2),
                    wave_direction_deg: Some(300.0),
                    wave_period_s: Some(12.0),
                    sea_level_height_m: Some(0.4),
                })
                .collect())
        }
    }

    fn opts() -> RefreshOptions {
        RefreshOptions::new(6, 5)
    }

    #[tokio::test]
    async fn test_cold_start_updates_all_layers() {
        let store = in_memory_store().await;
        let provider = FakeProvider::new();
        let spot = find_spot("supertubos").unwrap();

        let summary = refresh_spot(&store, &provider, spot, &opts()).await;

        assert!(summary.weather.updated);
        assert!(summary.marine.updated);
        assert!(summary.daily_weather.updated);
        assert!(summary.scored.updated);
        assert!(summary.half_day.updated);
        assert!(summary.daily_scores.updated);
        assert_eq!(summary.error_count(), 0);

        assert_eq!(store.get_scored_hours("supertubos").await.unwrap().len(), 6);
        assert!(!store.get_daily_scores("supertubos").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_immediate_rerun_is_a_no_op() {
        let store = in_memory_store().await;
        let provider = FakeProvider::new();
        let spot = find_spot("supertubos").unwrap();

        refresh_spot(&store, &provider, spot, &opts()).await;
        let weather_calls = provider.weather_calls.load(Ordering::SeqCst);

        let second = refresh_spot(&store, &provider, spot, &opts()).await;

        assert_eq!(second.updated_layers(), 0, "All ledgers within threshold");
        assert_eq!(second.error_count(), 0);
        assert_eq!(
            provider.weather_calls.load(Ordering::SeqCst),
            weather_calls,
            "No provider traffic on a fresh cache"
        );
    }

    #[tokio::test]
    async fn test_force_overrides_freshness() {
        let store = in_memory_store().await;
        let provider = FakeProvider::new();
        let spot = find_spot("supertubos").unwrap();

        refresh_spot(&store, &provider, spot, &opts()).await;
        let summary = refresh_spot(&store, &provider, spot, &opts().forced()).await;

        assert_eq!(summary.updated_layers(), 6);
        assert_eq!(provider.weather_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_stale_weather_cascades_but_marine_untouched() {
        // Ledger ages: weather 7 h, marine 2 h, scored 1 h, half-day 1 h.
        // With a 6 h threshold the weather refetch marks the raw layer
        // touched, so scored and both aggregates re-derive; marine does not.
        let store = in_memory_store().await;
        let provider = FakeProvider::new();
        let spot = find_spot("supertubos").unwrap();

        refresh_spot(&store, &provider, spot, &opts()).await;
        let now = Utc::now();
        store
            .backdate_ledger("supertubos", Layer::Weather, now - Duration::hours(7))
            .await;
        store
            .backdate_ledger("supertubos", Layer::Marine, now - Duration::hours(2))
            .await;
        store
            .backdate_ledger("supertubos", Layer::DailyWeather, now - Duration::hours(2))
            .await;
        store
            .backdate_ledger("supertubos", Layer::Scored, now - Duration::hours(1))
            .await;
        store
            .backdate_ledger("supertubos", Layer::HalfDay, now - Duration::hours(1))
            .await;
        store
            .backdate_ledger("supertubos", Layer::DailyScores, now - Duration::hours(1))
            .await;

        let marine_calls = provider.marine_calls.load(Ordering::SeqCst);
        let summary = refresh_spot(&store, &provider, spot, &opts()).await;

        assert!(summary.weather.updated);
        assert!(!summary.marine.updated);
        assert!(summary.marine.error.is_none());
        assert!(summary.scored.updated, "Raw touch cascades to scored");
        assert!(summary.half_day.updated, "Scored change cascades down");
        assert!(summary.daily_scores.updated);
        assert_eq!(
            provider.marine_calls.load(Ordering::SeqCst),
            marine_calls,
            "Fresh marine layer is not refetched"
        );
    }

    #[tokio::test]
    async fn test_provider_failure_scores_from_cache() {
        let store = in_memory_store().await;
        let spot = find_spot("supertubos").unwrap();

        // Populate everything, then age the weather layer and kill the feed
        let good = FakeProvider::new();
        refresh_spot(&store, &good, spot, &opts()).await;
        store
            .backdate_ledger("supertubos", Layer::Weather, Utc::now() - Duration::hours(8))
            .await;

        let mut broken = FakeProvider::new();
        broken.fail_weather = true;
        let summary = refresh_spot(&store, &broken, spot, &opts()).await;

        assert!(!summary.weather.updated);
        assert!(summary.weather.error.is_some());
        // Cached raw rows still satisfy the scoring precondition
        assert!(summary.scored.updated);
        assert!(summary.half_day.updated);
    }

    #[tokio::test]
    async fn test_empty_cache_reports_prerequisite_missing() {
        let store = in_memory_store().await;
        let spot = find_spot("supertubos").unwrap();
        let mut broken = FakeProvider::new();
        broken.fail_weather = true;
        broken.fail_marine = true;

        let summary = refresh_spot(&store, &broken, spot, &opts()).await;

        assert!(summary.weather.error.is_some());
        assert!(summary.marine.error.is_some());
        for outcome in [&summary.scored, &summary.half_day, &summary.daily_scores] {
            assert!(!outcome.updated);
            assert!(
                outcome.error.as_deref().unwrap().contains("Prerequisite"),
                "Expected PrerequisiteMissing, got {:?}",
                outcome.error
            );
        }
    }

    #[tokio::test]
    async fn test_multi_spot_run_survives_single_spot_failure() {
        let store = in_memory_store().await;
        let provider = FakeProvider::new();
        let supertubos = find_spot("supertubos").unwrap();
        let mundaka = find_spot("mundaka").unwrap();

        // Pre-populate mundaka so it is fresh, then break the provider for
        // the run that still needs supertubos
        refresh_spot(&store, &provider, mundaka, &opts()).await;

        let mut broken = FakeProvider::new();
        broken.fail_weather = true;
        broken.fail_marine = true;
        let report = refresh_spots(&store, &broken, &[supertubos, mundaka], &opts()).await;

        assert_eq!(report.spots.len(), 2);
        assert_eq!(report.spots[0].spot_id, "supertubos");
        assert!(report.spots[0].error_count() > 0);
        assert_eq!(report.spots[1].error_count(), 0, "Fresh spot untouched");
    }

    #[tokio::test]
    async fn test_tracked_refresh_updates_shared_state() {
        let store = in_memory_store().await;
        let provider: Arc<dyn ForecastProvider> = Arc::new(FakeProvider::new());
        let state: SharedRefreshState = Arc::new(RwLock::new(RefreshState::new()));

        run_tracked_refresh(
            store,
            provider,
            vec![find_spot("supertubos").unwrap()],
            opts(),
            state.clone(),
        )
        .await;

        let s = state.read().await;
        assert!(!s.running);
        assert_eq!(s.total_runs, 1);
        let report = s.last_report.as_ref().unwrap();
        assert_eq!(report.spots.len(), 1);
        assert_eq!(report.spots[0].updated_layers(), 6);
    }
}
