use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use crate::catalog::{SpotConfig, SURF_SPOTS};

/// Catalog entry for GET /api/v1/spots.
#[derive(Debug, Serialize, ToSchema)]
pub struct SpotInfo {
    /// Stable slug identifier
    pub spot_id: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    /// IANA timezone name
    pub timezone: String,
    /// Closest commercial airport (IATA code)
    pub primary_airport: String,
}

impl From<&SpotConfig> for SpotInfo {
    fn from(s: &SpotConfig) -> Self {
        Self {
            spot_id: s.spot_id.to_string(),
            name: s.name.to_string(),
            latitude: s.latitude,
            longitude: s.longitude,
            timezone: s.timezone.to_string(),
            primary_airport: s.primary_airport.to_string(),
        }
    }
}

/// List the surf-spot catalog.
#[utoipa::path(
    get,
    path = "/api/v1/spots",
    tag = "Spots",
    responses(
        (status = 200, description = "All catalog spots", body = Vec<SpotInfo>),
    )
)]
pub async fn list_spots() -> Json<Vec<SpotInfo>> {
    Json(SURF_SPOTS.iter().map(SpotInfo::from).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_catalog_is_served() {
        let spots = list_spots().await.0;
        assert_eq!(spots.len(), SURF_SPOTS.len());
        assert!(spots.iter().any(|s| s.spot_id == "supertubos"));
        assert!(spots.iter().all(|s| !s.primary_airport.is_empty()));
    }
}
