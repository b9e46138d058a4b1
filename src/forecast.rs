//! Weather Cache: periodically fetches an hourly outdoor forecast and
//! serves it to readers without ever blocking them on the network.

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::error::Result;
use crate::location::Location;

/// Cache stays valid for this long past the last successful fetch,
/// even if subsequent refreshes fail.
const CACHE_TTL: Duration = Duration::from_secs(120 * 60);

/// One hourly sample of the forecast. Any field may be unavailable
/// because the upstream provider omitted it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HourlySample {
    pub timestamp: DateTime<Utc>,
    pub outdoor_temp: Option<f64>,
    pub solar_radiation_wm2: Option<f64>,
    pub direct_radiation: Option<f64>,
    pub cloud_cover: Option<f64>,
    pub wind_speed: Option<f64>,
}

/// An immutable, atomically-replaced hourly forecast, up to 48 hours.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Forecast {
    pub hourly: Vec<HourlySample>,
}

impl Forecast {
    fn temps(&self) -> impl Iterator<Item = f64> + '_ {
        self.hourly.iter().filter_map(|s| s.outdoor_temp)
    }

    fn solar(&self) -> impl Iterator<Item = f64> + '_ {
        self.hourly.iter().filter_map(|s| s.solar_radiation_wm2)
    }

    pub fn current_outdoor_temp(&self) -> Option<f64> {
        self.hourly.first().and_then(|s| s.outdoor_temp)
    }

    pub fn current_solar(&self) -> Option<f64> {
        self.hourly.first().and_then(|s| s.solar_radiation_wm2)
    }

    pub fn temps_for_next_n_hours(&self, n: usize) -> Vec<f64> {
        self.hourly
            .iter()
            .take(n)
            .filter_map(|s| s.outdoor_temp)
            .collect()
    }

    pub fn solar_for_next_n_hours(&self, n: usize) -> Vec<f64> {
        self.hourly
            .iter()
            .take(n)
            .filter_map(|s| s.solar_radiation_wm2)
            .collect()
    }

    pub fn avg_temp(&self) -> Option<f64> {
        avg(self.temps())
    }

    pub fn min_temp(&self) -> Option<f64> {
        self.temps().fold(None, |acc, v| Some(acc.map_or(v, |a: f64| a.min(v))))
    }

    pub fn max_temp(&self) -> Option<f64> {
        self.temps().fold(None, |acc, v| Some(acc.map_or(v, |a: f64| a.max(v))))
    }

    pub fn avg_solar(&self) -> Option<f64> {
        avg(self.solar())
    }
}

fn avg(it: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = it.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

/// Contract for the weather-forecast cloud client. Implementations
/// own the HTTP transport; this crate only depends on `fetch`.
#[async_trait::async_trait]
pub trait WeatherClient: Send + Sync {
    async fn fetch(&self, location: Location) -> Result<Forecast>;
}

struct CacheState {
    forecast: Forecast,
    fetched_at: Instant,
}

/// Owns the single, atomically-replaced `Forecast` for one device and
/// the timer that keeps it fresh. Readers never block on the network:
/// they always see either a cached `Forecast` or `None`s.
pub struct WeatherCache<C: WeatherClient> {
    client: C,
    location: Location,
    state: RwLock<Option<CacheState>>,
}

impl<C: WeatherClient> WeatherCache<C> {
    pub fn new(client: C, location: Location) -> Self {
        WeatherCache { client, location, state: RwLock::new(None) }
    }

    /// Issues one HTTPS request and replaces the cached forecast on
    /// success. On failure, the last good forecast (if any) is kept;
    /// its availability is determined purely by its age.
    pub async fn refresh(&self) -> Result<()> {
        match self.client.fetch(self.location).await {
            Ok(forecast) => {
                debug!(samples = forecast.hourly.len(), "forecast refreshed");
                let mut guard = self.state.write().await;
                *guard = Some(CacheState { forecast, fetched_at: Instant::now() });
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "forecast refresh failed, keeping last value");
                Err(e)
            }
        }
    }

    /// `true` if a forecast was ever fetched and it's still within
    /// the cache's validity window.
    pub async fn is_available(&self) -> bool {
        let guard = self.state.read().await;
        guard
            .as_ref()
            .map(|s| s.fetched_at.elapsed() <= CACHE_TTL)
            .unwrap_or(false)
    }

    /// Returns the current forecast if it's available, else `None`.
    pub async fn get_forecast(&self) -> Option<Forecast> {
        let guard = self.state.read().await;
        match guard.as_ref() {
            Some(s) if s.fetched_at.elapsed() <= CACHE_TTL => {
                Some(s.forecast.clone())
            }
            _ => None,
        }
    }

    pub async fn current_outdoor_temp(&self) -> Option<f64> {
        self.get_forecast().await.and_then(|f| f.current_outdoor_temp())
    }

    pub async fn current_solar(&self) -> Option<f64> {
        self.get_forecast().await.and_then(|f| f.current_solar())
    }
}
