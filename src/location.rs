//! Geographic coordinates used to request a weather forecast.

use serde::Deserialize;

/// Immutable per-device location used to look up the outdoor forecast.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Location { latitude, longitude }
    }
}
