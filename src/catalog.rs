//! Static surf-spot catalog.
//!
//! The catalog is fixed at compile time and upserted into the store at
//! startup. Everything else in the process treats it as immutable.

use chrono_tz::Tz;

/// Buffer applied around a swell window for the "semi-direct" band (degrees).
pub const SEMI_DIRECT_BUFFER_DEG: f64 = 30.0;

/// A compass-direction interval over `[0, 360)`. `min > max` means the
/// interval wraps past north (e.g. 340°→60° covers 340–360 and 0–60).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirRange {
    pub min_deg: f64,
    pub max_deg: f64,
}

impl DirRange {
    /// Wrap-aware membership test with inclusive endpoints.
    pub fn contains(&self, direction_deg: f64) -> bool {
        let d = direction_deg.rem_euclid(360.0);
        if self.min_deg <= self.max_deg {
            self.min_deg <= d && d <= self.max_deg
        } else {
            d >= self.min_deg || d <= self.max_deg
        }
    }

    /// The interval widened by `buffer` degrees on each side, normalized back
    /// onto the circle. Collapses to the full circle when the widened arc
    /// covers 360° or more.
    pub fn expanded(&self, buffer_deg: f64) -> DirRange {
        let width = (self.max_deg - self.min_deg).rem_euclid(360.0);
        if width + 2.0 * buffer_deg >= 360.0 {
            return DirRange {
                min_deg: 0.0,
                max_deg: 360.0,
            };
        }
        DirRange {
            min_deg: (self.min_deg - buffer_deg).rem_euclid(360.0),
            max_deg: (self.max_deg + buffer_deg).rem_euclid(360.0),
        }
    }
}

/// A surf spot with its directional preferences and primary airport.
#[derive(Debug, Clone)]
pub struct SpotConfig {
    pub spot_id: &'static str,
    pub name: &'static str,
    pub latitude: f64,
    pub longitude: f64,
    /// IANA timezone name, used for daylight masking and local-time views.
    pub timezone: &'static str,
    pub swell_dir_range: DirRange,
    pub wind_dir_range: DirRange,
    pub primary_airport: &'static str,
}

impl SpotConfig {
    pub fn tz(&self) -> Tz {
        self.timezone.parse().unwrap_or_else(|_| {
            tracing::warn!(
                "Spot {} has unparseable timezone '{}', falling back to UTC",
                self.spot_id,
                self.timezone,
            );
            chrono_tz::UTC
        })
    }
}

pub const SURF_SPOTS: &[SpotConfig] = &[
    SpotConfig {
        spot_id: "la_graviere",
        name: "La Graviere",
        latitude: 43.676,
        longitude: -1.445,
        timezone: "Europe/Paris",
        swell_dir_range: DirRange {
            min_deg: 200.0,
            max_deg: 340.0,
        },
        wind_dir_range: DirRange {
            min_deg: 45.0,
            max_deg: 135.0,
        },
        primary_airport: "BOD",
    },
    SpotConfig {
        spot_id: "supertubos",
        name: "Supertubos",
        latitude: 39.604,
        longitude: -9.366,
        timezone: "Europe/Lisbon",
        swell_dir_range: DirRange {
            min_deg: 280.0,
            max_deg: 320.0,
        },
        wind_dir_range: DirRange {
            min_deg: 10.0,
            max_deg: 130.0,
        },
        primary_airport: "LIS",
    },
    SpotConfig {
        spot_id: "uluwatu",
        name: "Uluwatu",
        latitude: -8.814518,
        longitude: 115.086847,
        timezone: "Asia/Jakarta",
        swell_dir_range: DirRange {
            min_deg: 180.0,
            max_deg: 270.0,
        },
        wind_dir_range: DirRange {
            min_deg: 45.0,
            max_deg: 135.0,
        },
        primary_airport: "DPS",
    },
    SpotConfig {
        spot_id: "anchor_point",
        name: "Anchor Point",
        latitude: 30.544176,
        longitude: -9.727859,
        timezone: "Africa/Casablanca",
        swell_dir_range: DirRange {
            min_deg: 260.0,
            max_deg: 350.0,
        },
        wind_dir_range: DirRange {
            min_deg: 340.0,
            max_deg: 60.0,
        },
        primary_airport: "AGA",
    },
    SpotConfig {
        spot_id: "mundaka",
        name: "Mundaka",
        latitude: 43.408,
        longitude: -2.691,
        timezone: "Europe/Madrid",
        swell_dir_range: DirRange {
            min_deg: 280.0,
            max_deg: 340.0,
        },
        wind_dir_range: DirRange {
            min_deg: 90.0,
            max_deg: 180.0,
        },
        primary_airport: "BIO",
    },
];

/// Look up a catalog spot by its slug.
pub fn find_spot(spot_id: &str) -> Option<&'static SpotConfig> {
    SURF_SPOTS.iter().find(|s| s.spot_id == spot_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_plain_range() {
        let r = DirRange {
            min_deg: 45.0,
            max_deg: 135.0,
        };
        assert!(r.contains(45.0), "Endpoints are inclusive");
        assert!(r.contains(90.0));
        assert!(r.contains(135.0), "Endpoints are inclusive");
        assert!(!r.contains(44.9));
        assert!(!r.contains(200.0));
    }

    #[test]
    fn test_contains_wrapping_range() {
        // 340→60 covers 340–360 and 0–60
        let r = DirRange {
            min_deg: 340.0,
            max_deg: 60.0,
        };
        assert!(r.contains(350.0));
        assert!(r.contains(10.0));
        assert!(r.contains(340.0));
        assert!(r.contains(60.0));
        assert!(!r.contains(200.0));
        assert!(!r.contains(100.0));
    }

    #[test]
    fn test_contains_normalizes_input() {
        let r = DirRange {
            min_deg: 45.0,
            max_deg: 135.0,
        };
        assert!(r.contains(450.0)); // 450 ≡ 90
        assert!(r.contains(-270.0)); // -270 ≡ 90
    }

    #[test]
    fn test_expanded_plain_range() {
        let r = DirRange {
            min_deg: 260.0,
            max_deg: 340.0,
        };
        let buffered = r.expanded(SEMI_DIRECT_BUFFER_DEG);
        assert!(buffered.contains(230.0));
        assert!(buffered.contains(10.0)); // 340 + 30 wraps past north
        assert!(!buffered.contains(100.0));
    }

    #[test]
    fn test_expanded_full_circle() {
        // 10→330 is 320° wide; +60° of buffer covers everything
        let r = DirRange {
            min_deg: 10.0,
            max_deg: 330.0,
        };
        let buffered = r.expanded(SEMI_DIRECT_BUFFER_DEG);
        assert!(buffered.contains(0.0));
        assert!(buffered.contains(350.0));
        assert!(buffered.contains(180.0));
    }

    #[test]
    fn test_catalog_spots_resolve_timezones() {
        for spot in SURF_SPOTS {
            assert!(
                spot.timezone.parse::<Tz>().is_ok(),
                "Spot {} has invalid timezone {}",
                spot.spot_id,
                spot.timezone
            );
        }
    }

    #[test]
    fn test_find_spot() {
        assert!(find_spot("supertubos").is_some());
        assert!(find_spot("nowhere").is_none());
    }
}
