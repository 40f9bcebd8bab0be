// Surftrip API v0.1
use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod catalog;
mod config;
mod db;
mod errors;
mod routes;
mod services;

use catalog::SURF_SPOTS;
use config::AppConfig;
use db::store::SurfStore;
use routes::AppState;
use services::flights::{DisabledFlightSearch, FlightSearch};
use services::openmeteo::{ForecastProvider, OpenMeteoClient};
use services::refresh::{RefreshOptions, RefreshState, SharedRefreshState};

/// Surftrip API — OpenAPI specification.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Surftrip API",
        version = "0.1.0",
        description = "Surf forecast scoring and trip-window API. Ingests \
            Open-Meteo atmospheric and marine forecasts for a fixed spot \
            catalog, scores every daylight hour, aggregates half-day and \
            daily quality, and selects optimal trip windows with flight \
            options.",
        license(name = "MIT"),
    ),
    tags(
        (name = "Health", description = "Service health check"),
        (name = "Spots", description = "Surf-spot catalog"),
        (name = "Forecasts", description = "Daily and detailed forecast views"),
        (name = "Trips", description = "Trip-window analysis"),
        (name = "Refresh", description = "Forecast refresh orchestration"),
    ),
    paths(
        routes::health::health_check,
        routes::spots::list_spots,
        routes::forecasts::get_daily_forecast,
        routes::forecasts::get_detailed_forecast,
        routes::trips::analyze_trips,
        routes::refresh::trigger_refresh,
        routes::refresh::get_refresh_status,
    ),
    components(
        schemas(
            routes::health::HealthResponse,
            routes::spots::SpotInfo,
            routes::forecasts::DailyForecastResponse,
            routes::forecasts::DetailedForecastResponse,
            routes::trips::TripRequest,
            routes::trips::UserPreferences,
            routes::trips::TripStyle,
            routes::trips::TripOption,
            routes::trips::TripAnalysisResponse,
            routes::refresh::RefreshRequest,
            routes::refresh::RefreshAccepted,
            db::models::DailyScoreRow,
            services::views::DetailedDay,
            services::views::HourDetail,
            services::flights::Flight,
            services::refresh::RefreshState,
            services::refresh::RefreshReport,
            services::refresh::SpotRefreshSummary,
            services::refresh::StepOutcome,
            errors::ErrorResponse,
        )
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "surftrip_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env();

    // Open the cache store (runs migrations)
    let store = SurfStore::connect(&config.db_path)
        .await
        .expect("Failed to open surf cache database");
    tracing::info!("Surf cache ready at {}", config.db_path);

    // Seed the spot catalog
    for spot in SURF_SPOTS {
        match store.upsert_spot(spot).await {
            Ok(()) => tracing::info!("Seeded spot '{}' ({})", spot.name, spot.spot_id),
            Err(e) => tracing::error!("Failed to seed spot '{}': {}", spot.spot_id, e),
        }
    }

    let provider: Arc<dyn ForecastProvider> = Arc::new(OpenMeteoClient::new());

    // The concrete flight adapter is an external collaborator; without its
    // secret, trips resolve with empty flight lists.
    if config.flight_api_key.is_none() {
        tracing::warn!("FLIGHT_API_KEY not set; flight search is disabled");
    }
    let flights: Arc<dyn FlightSearch> = Arc::new(DisabledFlightSearch);

    let refresh_state: SharedRefreshState = Arc::new(RwLock::new(RefreshState::new()));

    let app_state = AppState {
        store: store.clone(),
        provider: provider.clone(),
        flights,
        refresh_state: refresh_state.clone(),
        config: config.clone(),
    };

    // Warm the cache in the background; fresh layers are a no-op.
    tokio::spawn(services::refresh::run_tracked_refresh(
        store,
        provider,
        SURF_SPOTS.iter().collect(),
        RefreshOptions::new(config.refresh_threshold_hours, config.refresh_fanout),
        refresh_state,
    ));

    // CORS — read endpoints plus the refresh/trip POST surface
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers(Any);

    let app = Router::new()
        .route("/api/v1/health", get(routes::health::health_check))
        .route("/api/v1/spots", get(routes::spots::list_spots))
        .route(
            "/api/v1/spots/:spot_id/forecast/daily",
            get(routes::forecasts::get_daily_forecast),
        )
        .route(
            "/api/v1/spots/:spot_id/forecast/detailed",
            get(routes::forecasts::get_detailed_forecast),
        )
        .route("/api/v1/trips/analyze", post(routes::trips::analyze_trips))
        .route("/api/v1/refresh", post(routes::refresh::trigger_refresh))
        .route(
            "/api/v1/refresh/status",
            get(routes::refresh::get_refresh_status),
        )
        .with_state(app_state)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(cors);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("API server listening on {}", addr);
    tracing::info!(
        "Swagger UI available at http://localhost:{}/swagger-ui/",
        config.port
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind TCP listener");
    axum::serve(listener, app)
        .await
        .expect("Server terminated unexpectedly");
}
