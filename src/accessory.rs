//! Accessory Adapter: exposes the orchestrator through a
//! HeaterCooler-shaped read/write surface, the same characteristic
//! set a HomeKit bridge would present to a home automation hub.

use crate::config::COMFORT_BAND_HALFWIDTH;
use crate::device::AcClient;
use crate::error::Result;
use crate::forecast::WeatherClient;
use crate::orchestrator::{Orchestrator, TargetMode};
use crate::sensor::SensorClient;
use crate::state_machine::HVACState;

/// Mirrors HomeKit's `HeaterCooler` current-state characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurrentState {
    Inactive,
    Idle,
    Heating,
    Cooling,
}

fn current_state_of(hvac: HVACState) -> CurrentState {
    match hvac {
        HVACState::HeatingActive | HVACState::PreHeat => CurrentState::Heating,
        HVACState::CoolingActive | HVACState::PreCool => CurrentState::Cooling,
        HVACState::Standby | HVACState::HeatingCoast | HVACState::CoolingCoast => {
            CurrentState::Idle
        }
        HVACState::SensorFault => CurrentState::Inactive,
    }
}

/// Read/write facade over an `Orchestrator`, matching the
/// characteristic set a HomeKit `HeaterCooler` service would expose.
/// Every write here takes effect on the *next* tick; this adapter
/// never calls `tick` itself.
pub struct AccessoryAdapter<A: AcClient, S: SensorClient, W: WeatherClient> {
    orchestrator: Orchestrator<A, S, W>,
}

impl<A: AcClient, S: SensorClient, W: WeatherClient> AccessoryAdapter<A, S, W> {
    pub fn new(orchestrator: Orchestrator<A, S, W>) -> Self {
        AccessoryAdapter { orchestrator }
    }

    pub fn into_inner(self) -> Orchestrator<A, S, W> {
        self.orchestrator
    }

    pub async fn current_state(&self) -> CurrentState {
        current_state_of(self.orchestrator.current_state().await)
    }

    pub async fn target_state(&self) -> TargetMode {
        self.orchestrator.target_mode().await
    }

    pub async fn set_target_state(&self, mode: TargetMode) {
        self.orchestrator.set_target_mode(mode).await;
    }

    pub async fn current_temperature(&self) -> Option<f64> {
        self.orchestrator.current_temperature().await
    }

    /// Directly toggles AC power, bypassing the predictive path
    /// entirely.
    pub async fn set_active(&self, on: bool) -> Result<()> {
        self.orchestrator.set_active(on).await
    }

    /// Clamps the requested target to the comfort band around the
    /// configured base target before handing it to the orchestrator.
    pub async fn set_target_temperature(&self, requested: f64) {
        let base = self.orchestrator.base_target_temperature();
        let clamped = requested.clamp(base - COMFORT_BAND_HALFWIDTH, base + COMFORT_BAND_HALFWIDTH);
        self.orchestrator.set_user_comfort_target(clamped).await;
    }

    pub async fn cooling_threshold_temperature(&self) -> f64 {
        self.orchestrator.base_target_temperature() + COMFORT_BAND_HALFWIDTH
    }

    pub async fn heating_threshold_temperature(&self) -> f64 {
        self.orchestrator.base_target_temperature() - COMFORT_BAND_HALFWIDTH
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::device::{AcCommand, DeviceSnapshot};
    use crate::forecast::Forecast;
    use crate::location::Location;

    struct StubAc;

    #[async_trait::async_trait]
    impl AcClient for StubAc {
        async fn snapshot(&self) -> Result<DeviceSnapshot> {
            Ok(DeviceSnapshot { ac_set_temp: Some(22.0), ..Default::default() })
        }
        async fn send(&self, _cmd: AcCommand) -> Result<()> {
            Ok(())
        }
    }

    struct StubSensor;

    #[async_trait::async_trait]
    impl SensorClient for StubSensor {
        async fn fetch_temperature(&self) -> Result<Option<(f64, Option<f64>)>> {
            Ok(Some((21.0, None)))
        }
    }

    struct StubWeather;

    #[async_trait::async_trait]
    impl WeatherClient for StubWeather {
        async fn fetch(&self, _location: Location) -> Result<Forecast> {
            Ok(Forecast::default())
        }
    }

    fn cfg() -> Config {
        Config::try_from(
            r#"
target_temperature = 23.0

[location]
latitude = 52.0
longitude = 21.0
"#,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_target_temperature_write_clamped_to_comfort_band() {
        let adapter =
            AccessoryAdapter::new(Orchestrator::new(cfg(), StubAc, StubSensor, StubWeather));

        adapter.set_target_temperature(40.0).await;
        assert_eq!(
            adapter.orchestrator.user_comfort_target().await,
            Some(23.0 + COMFORT_BAND_HALFWIDTH)
        );

        adapter.set_target_temperature(0.0).await;
        assert_eq!(
            adapter.orchestrator.user_comfort_target().await,
            Some(23.0 - COMFORT_BAND_HALFWIDTH)
        );
    }

    #[tokio::test]
    async fn test_active_write_bypasses_predictive_path() {
        let adapter =
            AccessoryAdapter::new(Orchestrator::new(cfg(), StubAc, StubSensor, StubWeather));
        adapter.set_active(true).await.unwrap();
    }

    #[tokio::test]
    async fn test_target_state_round_trips() {
        let adapter =
            AccessoryAdapter::new(Orchestrator::new(cfg(), StubAc, StubSensor, StubWeather));
        adapter.set_target_state(TargetMode::Cool).await;
        assert_eq!(adapter.target_state().await, TargetMode::Cool);
    }
}
