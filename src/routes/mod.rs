use std::sync::Arc;

use crate::config::AppConfig;
use crate::db::store::SurfStore;
use crate::services::flights::FlightSearch;
use crate::services::openmeteo::ForecastProvider;
use crate::services::refresh::SharedRefreshState;

pub mod forecasts;
pub mod health;
pub mod refresh;
pub mod spots;
pub mod trips;

/// Shared application state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: SurfStore,
    pub provider: Arc<dyn ForecastProvider>,
    pub flights: Arc<dyn FlightSearch>,
    pub refresh_state: SharedRefreshState,
    pub config: AppConfig,
}
