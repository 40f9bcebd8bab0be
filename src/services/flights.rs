//! Flight-search adapter contract.
//!
//! The concrete third-party client lives outside this crate; the core only
//! defines the query/result shapes and forwards whatever the adapter
//! returns. Tests satisfy the trait with fakes.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::errors::AppError;

/// One flight option as returned by the external adapter. Fields are passed
/// through to the caller untouched.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Flight {
    pub departure_airport: String,
    pub arrival_airport: String,
    /// Departure time as reported by the adapter (provider-local format).
    pub departure_time: String,
    pub arrival_time: String,
    pub airline: String,
    pub price_eur: Option<f64>,
    pub stopovers: u32,
}

/// Round-trip flight search parameters.
#[derive(Debug, Clone)]
pub struct FlightQuery {
    pub departure: String,
    pub destination: String,
    pub outbound_date: NaiveDate,
    pub return_date: NaiveDate,
    /// Preferred departure band for the outbound leg (e.g. "evening").
    pub outbound_time_pref: Option<String>,
    pub return_time_pref: Option<String>,
    pub stopovers_allowed: bool,
}

#[async_trait]
pub trait FlightSearch: Send + Sync {
    async fn fetch_flights(&self, query: &FlightQuery) -> Result<Vec<Flight>, AppError>;
}

/// Stand-in used when no flight adapter is configured: every search returns
/// no options, so trips still resolve without flight data.
pub struct DisabledFlightSearch;

#[async_trait]
impl FlightSearch for DisabledFlightSearch {
    async fn fetch_flights(&self, query: &FlightQuery) -> Result<Vec<Flight>, AppError> {
        tracing::debug!(
            "Flight search disabled; returning no flights for {} -> {}",
            query.departure,
            query.destination,
        );
        Ok(Vec::new())
    }
}
