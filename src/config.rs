//! Typed, TOML-deserializable configuration for a single device.
//!
//! Mirrors the crate's `Params` + `TryFrom<toml::value::Table>`
//! convention: every knob is optional on the wire and has a
//! documented default, exposed through an accessor rather than a
//! raw, possibly-absent field.

use serde::Deserialize;
use std::convert::TryFrom;
use tracing::Level;

use crate::error::{Error, Result};
use crate::location::Location;

/// Width, in degrees C, of the comfort band a user may slide the
/// target temperature within.
pub const COMFORT_BAND_HALFWIDTH: f64 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ExternalSensorConfig {
    pub poll_interval_secs: Option<u64>,
}

impl ExternalSensorConfig {
    pub fn poll_interval_secs(&self) -> u64 {
        std::cmp::max(self.poll_interval_secs.unwrap_or(60), 1)
    }
}

impl Default for ExternalSensorConfig {
    fn default() -> Self {
        ExternalSensorConfig { poll_interval_secs: None }
    }
}

/// Overridable constants for the setpoint calculator (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct CalculatorConfig {
    pub design_outdoor_winter: Option<f64>,
    pub design_outdoor_summer: Option<f64>,
    pub outdoor_reset_gain: Option<f64>,
    pub forecast_lookahead_hours: Option<u32>,
    pub forecast_time_constant_hours: Option<f64>,
    pub forecast_gain: Option<f64>,
    pub solar_lookahead_hours: Option<u32>,
    pub solar_threshold_wm2: Option<f64>,
    pub solar_gain: Option<f64>,
    pub error_correction_gain: Option<f64>,
}

impl CalculatorConfig {
    pub fn design_outdoor_winter(&self) -> f64 {
        self.design_outdoor_winter.unwrap_or(10.0)
    }
    pub fn design_outdoor_summer(&self) -> f64 {
        self.design_outdoor_summer.unwrap_or(25.0)
    }
    pub fn outdoor_reset_gain(&self) -> f64 {
        self.outdoor_reset_gain.unwrap_or(0.4)
    }
    pub fn forecast_lookahead_hours(&self) -> u32 {
        self.forecast_lookahead_hours.unwrap_or(24)
    }
    pub fn forecast_time_constant_hours(&self) -> f64 {
        self.forecast_time_constant_hours.unwrap_or(6.0)
    }
    pub fn forecast_gain(&self) -> f64 {
        self.forecast_gain.unwrap_or(0.3)
    }
    pub fn solar_lookahead_hours(&self) -> u32 {
        self.solar_lookahead_hours.unwrap_or(6)
    }
    pub fn solar_threshold_wm2(&self) -> f64 {
        self.solar_threshold_wm2.unwrap_or(200.0)
    }
    pub fn solar_gain(&self) -> f64 {
        self.solar_gain.unwrap_or(0.02)
    }
    pub fn error_correction_gain(&self) -> f64 {
        self.error_correction_gain.unwrap_or(0.3)
    }
}

impl Default for CalculatorConfig {
    fn default() -> Self {
        CalculatorConfig {
            design_outdoor_winter: None,
            design_outdoor_summer: None,
            outdoor_reset_gain: None,
            forecast_lookahead_hours: None,
            forecast_time_constant_hours: None,
            forecast_gain: None,
            solar_lookahead_hours: None,
            solar_threshold_wm2: None,
            solar_gain: None,
            error_correction_gain: None,
        }
    }
}

/// Overridable constants for the HVAC state machine (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct StateMachineConfig {
    pub deadband: Option<f64>,
    pub hysteresis: Option<f64>,
    pub min_on_secs: Option<u64>,
    pub min_off_secs: Option<u64>,
    pub min_mode_switch_secs: Option<u64>,
}

impl StateMachineConfig {
    pub fn deadband(&self) -> f64 {
        self.deadband.unwrap_or(4.0)
    }
    pub fn half_deadband(&self) -> f64 {
        self.deadband() / 2.0
    }
    pub fn hysteresis(&self) -> f64 {
        self.hysteresis.unwrap_or(2.0)
    }
    pub fn min_on_secs(&self) -> u64 {
        self.min_on_secs.unwrap_or(300)
    }
    pub fn min_off_secs(&self) -> u64 {
        self.min_off_secs.unwrap_or(180)
    }
    pub fn min_mode_switch_secs(&self) -> u64 {
        self.min_mode_switch_secs.unwrap_or(600)
    }
}

impl Default for StateMachineConfig {
    fn default() -> Self {
        StateMachineConfig {
            deadband: None,
            hysteresis: None,
            min_on_secs: None,
            min_off_secs: None,
            min_mode_switch_secs: None,
        }
    }
}

/// Overridable constants for the action executor (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ActionConfig {
    pub min_action_interval_secs: Option<u64>,
    pub drift_redispatch_threshold: Option<f64>,
}

impl ActionConfig {
    pub fn min_action_interval_secs(&self) -> u64 {
        self.min_action_interval_secs.unwrap_or(60)
    }
    pub fn drift_redispatch_threshold(&self) -> f64 {
        self.drift_redispatch_threshold.unwrap_or(0.5)
    }
}

impl Default for ActionConfig {
    fn default() -> Self {
        ActionConfig {
            min_action_interval_secs: None,
            drift_redispatch_threshold: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub location: Location,
    pub target_temperature: Option<f64>,
    pub refresh_interval_secs: Option<u64>,
    pub external_sensor: Option<ExternalSensorConfig>,
    pub calculator: Option<CalculatorConfig>,
    pub state_machine: Option<StateMachineConfig>,
    pub action: Option<ActionConfig>,
    log_level: Option<String>,
}

impl Config {
    pub fn target_temperature(&self) -> f64 {
        self.target_temperature.unwrap_or(23.0)
    }

    pub fn refresh_interval_secs(&self) -> u64 {
        self.refresh_interval_secs.unwrap_or(90)
    }

    pub fn external_sensor(&self) -> ExternalSensorConfig {
        self.external_sensor.unwrap_or_default()
    }

    pub fn calculator(&self) -> CalculatorConfig {
        self.calculator.unwrap_or_default()
    }

    pub fn state_machine(&self) -> StateMachineConfig {
        self.state_machine.unwrap_or_default()
    }

    pub fn action(&self) -> ActionConfig {
        self.action.unwrap_or_default()
    }

    pub fn get_log_level(&self) -> Level {
        match self.log_level.as_deref() {
            Some("trace") => Level::TRACE,
            Some("debug") => Level::DEBUG,
            Some("info") => Level::INFO,
            _ => Level::WARN,
        }
    }
}

impl TryFrom<&str> for Config {
    type Error = Error;

    fn try_from(toml_text: &str) -> Result<Self> {
        toml::from_str(toml_text).map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_applied() {
        let cfg = Config::try_from(
            r#"
[location]
latitude = 52.0
longitude = 21.0
"#,
        )
        .unwrap();

        assert_eq!(cfg.target_temperature(), 23.0);
        assert_eq!(cfg.refresh_interval_secs(), 90);
        assert_eq!(cfg.external_sensor().poll_interval_secs(), 60);
        assert_eq!(cfg.calculator().design_outdoor_winter(), 10.0);
        assert_eq!(cfg.calculator().design_outdoor_summer(), 25.0);
        assert_eq!(cfg.state_machine().deadband(), 4.0);
        assert_eq!(cfg.state_machine().hysteresis(), 2.0);
        assert_eq!(cfg.action().min_action_interval_secs(), 60);
        assert_eq!(cfg.get_log_level(), Level::WARN);
    }

    #[test]
    fn test_missing_location_fails() {
        assert!(Config::try_from("target_temperature = 22").is_err());
    }

    #[test]
    fn test_overrides_applied() {
        let cfg = Config::try_from(
            r#"
target_temperature = 21.5
log_level = "debug"

[location]
latitude = 52.0
longitude = 21.0

[state_machine]
hysteresis = 1.5
min_on_secs = 120
"#,
        )
        .unwrap();

        assert_eq!(cfg.target_temperature(), 21.5);
        assert_eq!(cfg.get_log_level(), Level::DEBUG);
        assert_eq!(cfg.state_machine().hysteresis(), 1.5);
        assert_eq!(cfg.state_machine().min_on_secs(), 120);
        assert_eq!(cfg.state_machine().min_off_secs(), 180);
    }
}
