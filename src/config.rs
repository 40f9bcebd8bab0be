/// Application configuration, parsed from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Path to the SQLite cache file.
    pub db_path: String,
    pub port: u16,
    /// Staleness threshold (hours) for orchestrated refreshes.
    pub refresh_threshold_hours: i64,
    /// Maximum number of spots refreshed concurrently.
    pub refresh_fanout: usize,
    /// Opaque secret for the external flight-search adapter.
    pub flight_api_key: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            db_path: std::env::var("SURF_DB_PATH")
                .unwrap_or_else(|_| "data/surf_cache.db".to_string()),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .expect("PORT must be a valid u16"),
            refresh_threshold_hours: std::env::var("REFRESH_THRESHOLD_HOURS")
                .unwrap_or_else(|_| "6".to_string())
                .parse()
                .expect("REFRESH_THRESHOLD_HOURS must be an integer"),
            refresh_fanout: std::env::var("REFRESH_FANOUT")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .expect("REFRESH_FANOUT must be an integer"),
            flight_api_key: std::env::var("FLIGHT_API_KEY").ok(),
        }
    }
}
