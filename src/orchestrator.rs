//! Orchestrator: wires the weather cache, sensor tracker, setpoint
//! calculator, state machine, and action executor together into one
//! per-tick decision cycle for a single device.

use tokio::sync::RwLock;
use tracing::{info, instrument};

use crate::calculator::{self, ControlContext, PredictionResult, SeasonMode};
use crate::config::Config;
use crate::device::AcClient;
use crate::error::Result;
use crate::executor::ActionExecutor;
use crate::forecast::{Forecast, WeatherCache, WeatherClient};
use crate::sensor::{SensorClient, SensorTracker};
use crate::state_machine::{StateMachine, StateMachineDecision};

/// The user-facing target mode, set by the accessory's target-state
/// write. `Auto` picks winter/summer from the 24-hour forecast
/// average against the comfort target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetMode {
    Heat,
    Cool,
    Auto,
}

/// Optional sink for per-tick telemetry. The default no-op
/// implementation means wiring one in is opt-in.
pub trait MetricsSink: Send + Sync {
    fn record_tick(&self, _outcome: &TickOutcome) {}
}

struct NullMetricsSink;
impl MetricsSink for NullMetricsSink {}

/// The full result of one orchestration tick, useful for logging,
/// metrics, and tests.
#[derive(Debug, Clone)]
pub struct TickOutcome {
    pub season: SeasonMode,
    pub prediction: PredictionResult,
    pub decision: StateMachineDecision,
    pub dispatched: bool,
}

fn avg_next_24h(forecast: &Forecast) -> Option<f64> {
    let temps = forecast.temps_for_next_n_hours(24);
    if temps.is_empty() {
        None
    } else {
        Some(temps.iter().sum::<f64>() / temps.len() as f64)
    }
}

fn determine_season(mode: TargetMode, forecast: Option<&Forecast>, user_target: f64) -> SeasonMode {
    match mode {
        TargetMode::Heat => SeasonMode::Winter,
        TargetMode::Cool => SeasonMode::Summer,
        TargetMode::Auto => match forecast.and_then(avg_next_24h) {
            Some(avg) if avg >= user_target => SeasonMode::Summer,
            // Forecast unavailable or below target: fall back to winter.
            _ => SeasonMode::Winter,
        },
    }
}

pub struct Orchestrator<A: AcClient, S: SensorClient, W: WeatherClient> {
    cfg: Config,
    weather: WeatherCache<W>,
    sensor: SensorTracker<S>,
    executor: ActionExecutor<A>,
    state_machine: RwLock<StateMachine>,
    user_comfort_target: RwLock<Option<f64>>,
    target_mode: RwLock<TargetMode>,
    metrics: Box<dyn MetricsSink>,
}

impl<A: AcClient, S: SensorClient, W: WeatherClient> Orchestrator<A, S, W> {
    pub fn new(cfg: Config, ac: A, sensor: S, weather: W) -> Self {
        let location = cfg.location;
        let state_machine_cfg = cfg.state_machine();

        Orchestrator {
            weather: WeatherCache::new(weather, location),
            sensor: SensorTracker::new(sensor),
            executor: ActionExecutor::new(ac, cfg.action()),
            state_machine: RwLock::new(StateMachine::new(state_machine_cfg)),
            user_comfort_target: RwLock::new(None),
            target_mode: RwLock::new(TargetMode::Auto),
            metrics: Box::new(NullMetricsSink),
            cfg,
        }
    }

    pub fn with_metrics(mut self, sink: Box<dyn MetricsSink>) -> Self {
        self.metrics = sink;
        self
    }

    pub async fn set_target_mode(&self, mode: TargetMode) {
        *self.target_mode.write().await = mode;
    }

    pub async fn set_user_comfort_target(&self, target: f64) {
        *self.user_comfort_target.write().await = Some(target);
    }

    pub async fn user_comfort_target(&self) -> Option<f64> {
        *self.user_comfort_target.read().await
    }

    pub async fn refresh_weather(&self) -> Result<()> {
        self.weather.refresh().await
    }

    pub async fn poll_sensor(&self) -> Result<()> {
        self.sensor.poll().await
    }

    pub async fn current_state(&self) -> crate::state_machine::HVACState {
        self.state_machine.read().await.current_state()
    }

    pub async fn current_temperature(&self) -> Option<f64> {
        self.sensor.room_temp().await
    }

    pub async fn target_mode(&self) -> TargetMode {
        *self.target_mode.read().await
    }

    pub fn base_target_temperature(&self) -> f64 {
        self.cfg.target_temperature()
    }

    /// Directly powers the AC on or off, bypassing the predictive
    /// path and the dispatch rate limiter. Used by the accessory's
    /// active on/off write.
    pub async fn set_active(&self, on: bool) -> Result<()> {
        self.executor.dispatch_immediate(crate::device::AcCommand::power(on)).await
    }

    /// Runs one full decision cycle: reads the AC snapshot, updates
    /// the sensor offset, computes the predicted target, steps the
    /// state machine, and dispatches the resulting action.
    #[instrument(skip(self), fields(device = %self.cfg.location.latitude))]
    pub async fn tick(&self) -> Result<TickOutcome> {
        let snapshot = self.executor.snapshot().await?;

        {
            let mut target = self.user_comfort_target.write().await;
            if target.is_none() {
                *target = Some(snapshot.ac_set_temp.unwrap_or_else(|| self.cfg.target_temperature()));
            }
        }
        let user_target = self.user_comfort_target().await.unwrap();

        let forecast = self.weather.get_forecast().await;
        let mode = *self.target_mode.read().await;
        let season = determine_season(mode, forecast.as_ref(), user_target);

        let (min_ac, max_ac) = self.executor.setpoint_range();
        self.sensor.refresh_offset(snapshot.ac_sensor_temp).await;

        let room_temp = self.sensor.room_temp().await;
        let forecast_temps = forecast.as_ref().map(|f| f.temps_for_next_n_hours(48)).unwrap_or_default();
        let forecast_solar = forecast.as_ref().map(|f| f.solar_for_next_n_hours(24)).unwrap_or_default();
        let outdoor_temp = forecast.as_ref().and_then(|f| f.current_outdoor_temp());

        let ctx = ControlContext {
            user_comfort_target: user_target,
            room_temp,
            outdoor_temp,
            forecast_temps: forecast_temps.clone(),
            forecast_solar,
            season_mode: season,
        };
        let prediction = calculator::calculate(&ctx, &self.cfg.calculator());

        let compensated =
            self.sensor.compensate(prediction.predicted_room_target, min_ac, max_ac).await;

        let ac_power_state = snapshot.power.unwrap_or(false);
        let decision = {
            let mut sm = self.state_machine.write().await;
            sm.step(room_temp, user_target, compensated, season, &forecast_temps, ac_power_state)
        };

        let dispatched = match decision.action {
            Some(action) => self.executor.dispatch(action).await?,
            None => false,
        };

        info!(
            season = ?season,
            predicted = prediction.predicted_room_target,
            state = ?decision.state,
            dispatched,
            "tick complete"
        );

        let outcome = TickOutcome { season, prediction, decision, dispatched };
        self.metrics.record_tick(&outcome);
        Ok(outcome)
    }
}
