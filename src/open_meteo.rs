//! Default `WeatherClient` implementation against the public,
//! unauthenticated Open-Meteo forecast API.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::time::Duration;
use tracing::debug;

use crate::error::{Error, Result};
use crate::forecast::{Forecast, HourlySample, WeatherClient};
use crate::location::Location;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_HOURS: usize = 48;

#[derive(Deserialize)]
struct HourlyBlock {
    time: Vec<String>,
    temperature_2m: Vec<Option<f64>>,
    shortwave_radiation: Vec<Option<f64>>,
    direct_radiation: Vec<Option<f64>>,
    cloud_cover: Vec<Option<f64>>,
    wind_speed_10m: Vec<Option<f64>>,
}

#[derive(Deserialize)]
struct ForecastResponse {
    hourly: HourlyBlock,
}

pub struct OpenMeteoClient {
    con: reqwest::Client,
}

impl OpenMeteoClient {
    pub fn new() -> Result<Self> {
        let con = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(Error::from)?;

        Ok(OpenMeteoClient { con })
    }
}

impl Default for OpenMeteoClient {
    fn default() -> Self {
        OpenMeteoClient::new().expect("reqwest client builds with defaults")
    }
}

#[async_trait::async_trait]
impl WeatherClient for OpenMeteoClient {
    async fn fetch(&self, location: Location) -> Result<Forecast> {
        debug!(
            lat = location.latitude,
            long = location.longitude,
            "fetching open-meteo forecast"
        );

        let resp: ForecastResponse = self
            .con
            .get("https://api.open-meteo.com/v1/forecast")
            .query(&[
                ("latitude", location.latitude.to_string()),
                ("longitude", location.longitude.to_string()),
                (
                    "hourly",
                    String::from(
                        "temperature_2m,shortwave_radiation,direct_radiation,cloud_cover,wind_speed_10m",
                    ),
                ),
                ("forecast_days", String::from("2")),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let n = resp.hourly.time.len().min(MAX_HOURS);
        let mut hourly = Vec::with_capacity(n);

        for i in 0..n {
            let timestamp = parse_timestamp(&resp.hourly.time[i]);

            hourly.push(HourlySample {
                timestamp,
                outdoor_temp: resp.hourly.temperature_2m.get(i).copied().flatten(),
                solar_radiation_wm2: resp
                    .hourly
                    .shortwave_radiation
                    .get(i)
                    .copied()
                    .flatten(),
                direct_radiation: resp
                    .hourly
                    .direct_radiation
                    .get(i)
                    .copied()
                    .flatten(),
                cloud_cover: resp.hourly.cloud_cover.get(i).copied().flatten(),
                wind_speed: resp.hourly.wind_speed_10m.get(i).copied().flatten(),
            });
        }

        Ok(Forecast { hourly })
    }
}

// Open-Meteo returns naive local timestamps ("2024-01-01T13:00"); we
// don't know the station's UTC offset ahead of time, so we treat them
// as UTC. Only relative ordering between samples matters to this
// crate, not absolute wall-clock alignment.
fn parse_timestamp(s: &str) -> DateTime<Utc> {
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M")
        .map(|naive| DateTime::from_naive_utc_and_offset(naive, Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_fetch_parses_hourly_arrays() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/forecast"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({
                    "hourly": {
                        "time": ["2024-01-01T00:00", "2024-01-01T01:00"],
                        "temperature_2m": [10.0, 9.5],
                        "shortwave_radiation": [0.0, 0.0],
                        "direct_radiation": [0.0, 0.0],
                        "cloud_cover": [80.0, 90.0],
                        "wind_speed_10m": [5.0, 6.0]
                    }
                }),
            ))
            .mount(&server)
            .await;

        let con = reqwest::Client::new();
        let resp: ForecastResponse = con
            .get(format!("{}/v1/forecast", server.uri()))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(resp.hourly.temperature_2m, vec![Some(10.0), Some(9.5)]);
    }
}
