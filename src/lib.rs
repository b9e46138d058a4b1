//! Predictive climate-control decision engine for a single inverter
//! air conditioner in a high-thermal-mass building.
//!
//! The crate is organized as a pipeline of small, mostly-pure pieces:
//! a [`forecast::WeatherCache`] and [`sensor::SensorTracker`] keep the
//! external inputs fresh, [`calculator::calculate`] turns them into a
//! predicted room-temperature target, [`state_machine::StateMachine`]
//! turns that prediction into a mode/setpoint decision with
//! anti-oscillation guards, and [`executor::ActionExecutor`] dispatches
//! it to the AC. [`orchestrator::Orchestrator`] wires all of that
//! together for one device, and [`accessory::AccessoryAdapter`] exposes
//! it through a HomeKit-shaped surface.
//!
//! Everything that talks to a cloud API is behind a trait
//! ([`device::AcClient`], [`sensor::SensorClient`],
//! [`forecast::WeatherClient`]); [`open_meteo::OpenMeteoClient`] is the
//! only concrete implementation this crate provides, since it's the
//! one cloud dependency with a public, unauthenticated API.

pub mod accessory;
pub mod calculator;
pub mod config;
pub mod device;
pub mod error;
pub mod executor;
pub mod forecast;
pub mod location;
pub mod open_meteo;
pub mod orchestrator;
pub mod sensor;
pub mod state_machine;

pub use accessory::AccessoryAdapter;
pub use calculator::{calculate, ControlContext, PredictionResult, SeasonMode};
pub use config::Config;
pub use device::{AcClient, AcCommand, DeviceSnapshot, OperationMode};
pub use error::{Error, Result};
pub use executor::ActionExecutor;
pub use forecast::{Forecast, WeatherCache, WeatherClient};
pub use location::Location;
pub use open_meteo::OpenMeteoClient;
pub use orchestrator::{Orchestrator, TargetMode, TickOutcome};
pub use sensor::{SensorClient, SensorTracker};
pub use state_machine::{Action, HVACState, StateMachine, StateMachineDecision, ThermalMode};
