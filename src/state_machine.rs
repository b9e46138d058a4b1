//! HVAC State Machine: 8 states with anti-oscillation timers. Pure
//! state transitions driven by temperature deviation and forecast
//! detectors; the only I/O is reading `Instant::now()` for timer
//! comparisons.

use std::collections::VecDeque;
use tokio::time::{Duration, Instant};
use tracing::{debug, info};

use crate::calculator::SeasonMode;
use crate::config::StateMachineConfig;
use crate::error::{Error, Result};

const HISTORY_CAPACITY: usize = 50;
const COLD_SNAP_DROP_THRESHOLD: f64 = 5.0;
const HEATWAVE_RISE_THRESHOLD: f64 = 30.0;
const DETECTOR_WINDOW_MIN_HOUR: usize = 12;
const DETECTOR_WINDOW_MAX_HOUR: usize = 36;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HVACState {
    Standby,
    HeatingActive,
    CoolingActive,
    PreHeat,
    PreCool,
    HeatingCoast,
    CoolingCoast,
    SensorFault,
}

impl HVACState {
    fn is_active(self) -> bool {
        matches!(
            self,
            HVACState::HeatingActive
                | HVACState::CoolingActive
                | HVACState::PreHeat
                | HVACState::PreCool
        )
    }

    fn is_heating_family(self) -> bool {
        matches!(self, HVACState::HeatingActive | HVACState::PreHeat | HVACState::HeatingCoast)
    }

    fn is_cooling_family(self) -> bool {
        matches!(self, HVACState::CoolingActive | HVACState::PreCool | HVACState::CoolingCoast)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThermalMode {
    Heat,
    Cool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Action {
    SetMode { mode: ThermalMode, setpoint: f64 },
    Coast { setpoint: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct StateMachineDecision {
    pub state: HVACState,
    pub action: Option<Action>,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColdSnap {
    pub hours_until: usize,
    pub temp_drop: f64,
    pub min_temp: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Heatwave {
    pub hours_until: usize,
    pub peak_temp: f64,
}

#[derive(Debug, Clone)]
pub struct Transition {
    pub from: HVACState,
    pub to: HVACState,
    pub timestamp: Instant,
    pub reason: String,
}

/// Looks for an upcoming minimum in the next 12-36 hours at least 5 C
/// below the current reading. Requires >=24 samples; only the first
/// 48 are considered.
pub fn detect_cold_snap(forecast_temps: &[f64]) -> Option<ColdSnap> {
    if forecast_temps.len() < 24 {
        return None;
    }

    let window = &forecast_temps[..forecast_temps.len().min(48)];
    let (idx, &min_temp) =
        window.iter().enumerate().min_by(|a, b| a.1.partial_cmp(b.1).unwrap())?;
    let drop = window[0] - min_temp;

    if drop >= COLD_SNAP_DROP_THRESHOLD
        && idx > DETECTOR_WINDOW_MIN_HOUR
        && idx <= DETECTOR_WINDOW_MAX_HOUR
    {
        Some(ColdSnap { hours_until: idx, temp_drop: drop, min_temp })
    } else {
        None
    }
}

/// Mirror of `detect_cold_snap` for an upcoming peak >= 30 C. The
/// 12-36 hour window is aligned with the cold-snap detector rather
/// than left unbounded.
pub fn detect_heatwave(forecast_temps: &[f64]) -> Option<Heatwave> {
    if forecast_temps.len() < 24 {
        return None;
    }

    let window = &forecast_temps[..forecast_temps.len().min(48)];
    let (idx, &peak_temp) =
        window.iter().enumerate().max_by(|a, b| a.1.partial_cmp(b.1).unwrap())?;

    if peak_temp >= HEATWAVE_RISE_THRESHOLD
        && idx > DETECTOR_WINDOW_MIN_HOUR
        && idx <= DETECTOR_WINDOW_MAX_HOUR
    {
        Some(Heatwave { hours_until: idx, peak_temp })
    } else {
        None
    }
}

/// Derives the next state from a room/target deviation. `current` is
/// rebaselined to `Standby` when it's `SensorFault`, so a sensor that
/// comes back in-band resumes normal control on the same tick instead
/// of latching in fault forever.
fn desired_state(
    current: HVACState,
    room_temp: f64,
    user_target: f64,
    season: SeasonMode,
    forecast_temps: &[f64],
    cfg: &StateMachineConfig,
) -> HVACState {
    let current =
        if current == HVACState::SensorFault { HVACState::Standby } else { current };

    match season {
        SeasonMode::Winter => {
            if !current.is_heating_family() {
                if detect_cold_snap(forecast_temps).is_some() {
                    return HVACState::PreHeat;
                }
            }
        }
        SeasonMode::Summer => {
            if !current.is_cooling_family() {
                if detect_heatwave(forecast_temps).is_some() {
                    return HVACState::PreCool;
                }
            }
        }
    }

    let dev = room_temp - user_target;
    let hysteresis = cfg.hysteresis();
    let half_deadband = cfg.half_deadband();

    match season {
        SeasonMode::Winter => {
            if dev < -hysteresis {
                HVACState::HeatingActive
            } else if dev > hysteresis {
                if current.is_heating_family() {
                    HVACState::HeatingCoast
                } else {
                    HVACState::Standby
                }
            } else if current == HVACState::HeatingCoast && dev > -half_deadband {
                HVACState::Standby
            } else {
                current
            }
        }
        SeasonMode::Summer => {
            if dev > hysteresis {
                HVACState::CoolingActive
            } else if dev < -hysteresis {
                if current.is_cooling_family() {
                    HVACState::CoolingCoast
                } else {
                    HVACState::Standby
                }
            } else if current == HVACState::CoolingCoast && dev < half_deadband {
                HVACState::Standby
            } else {
                current
            }
        }
    }
}

fn derive_action(state: HVACState, setpoint: f64) -> Option<Action> {
    match state {
        HVACState::HeatingActive | HVACState::PreHeat => {
            Some(Action::SetMode { mode: ThermalMode::Heat, setpoint })
        }
        HVACState::CoolingActive | HVACState::PreCool => {
            Some(Action::SetMode { mode: ThermalMode::Cool, setpoint })
        }
        HVACState::Standby | HVACState::HeatingCoast | HVACState::CoolingCoast => {
            Some(Action::Coast { setpoint })
        }
        HVACState::SensorFault => None,
    }
}

/// Owns the current state, its dwell timers, and transition history
/// for one device. Only the orchestrator mutates it; reads are
/// trivial value copies.
pub struct StateMachine {
    cfg: StateMachineConfig,
    state: HVACState,
    entered_at: Instant,
    last_on_at: Option<Instant>,
    last_off_at: Option<Instant>,
    last_mode_switch_at: Option<Instant>,
    history: VecDeque<Transition>,
}

impl StateMachine {
    pub fn new(cfg: StateMachineConfig) -> Self {
        StateMachine {
            cfg,
            state: HVACState::Standby,
            entered_at: Instant::now(),
            last_on_at: None,
            last_off_at: None,
            last_mode_switch_at: None,
            history: VecDeque::with_capacity(HISTORY_CAPACITY),
        }
    }

    pub fn current_state(&self) -> HVACState {
        self.state
    }

    pub fn time_in_state(&self) -> Duration {
        self.entered_at.elapsed()
    }

    pub fn history(&self) -> &VecDeque<Transition> {
        &self.history
    }

    pub fn reset(&mut self) {
        self.record_transition(HVACState::Standby, String::from("reset"));
        self.state = HVACState::Standby;
        self.last_on_at = None;
        self.last_off_at = None;
        self.last_mode_switch_at = None;
    }

    /// Bypasses the anti-oscillation guards entirely. Intended for
    /// tests and manual override, not for normal operation; still
    /// updates the dwell timers so subsequent guard checks remain
    /// meaningful. Requires a non-empty `reason` so a forced
    /// transition is always traceable in the history log.
    pub fn force(&mut self, state: HVACState, reason: &str) -> Result<()> {
        if reason.is_empty() {
            return Err(Error::Precondition(String::from("force() requires a reason")));
        }
        self.apply_transition(state, String::from(reason));
        Ok(())
    }

    fn record_transition(&mut self, to: HVACState, reason: String) {
        if self.history.len() == HISTORY_CAPACITY {
            self.history.pop_front();
        }
        self.history.push_back(Transition {
            from: self.state,
            to,
            timestamp: Instant::now(),
            reason,
        });
    }

    fn apply_transition(&mut self, candidate: HVACState, reason: String) {
        let was_active = self.state.is_active();
        let now_active = candidate.is_active();
        let family_swap = (self.state.is_heating_family() && candidate.is_cooling_family())
            || (self.state.is_cooling_family() && candidate.is_heating_family());

        self.record_transition(candidate, reason);

        if now_active {
            self.last_on_at = Some(Instant::now());
        }
        if was_active && !now_active {
            self.last_off_at = Some(Instant::now());
        }
        if family_swap {
            self.last_mode_switch_at = Some(Instant::now());
        }

        self.state = candidate;
        self.entered_at = Instant::now();
    }

    /// Checks whether moving from the current state to `candidate` is
    /// permitted by the anti-oscillation timers (§4.4).
    fn guard_allows(&self, candidate: HVACState) -> bool {
        let now = Instant::now();

        if self.state.is_active() && candidate != self.state {
            if let Some(last_on) = self.last_on_at {
                if now.saturating_duration_since(last_on)
                    < Duration::from_secs(self.cfg.min_on_secs())
                {
                    return false;
                }
            }
        }

        if candidate.is_active() && candidate != self.state {
            if let Some(last_off) = self.last_off_at {
                if now.saturating_duration_since(last_off)
                    < Duration::from_secs(self.cfg.min_off_secs())
                {
                    return false;
                }
            }
        }

        let family_swap = (self.state.is_heating_family() && candidate.is_cooling_family())
            || (self.state.is_cooling_family() && candidate.is_heating_family());

        if family_swap {
            if let Some(last_switch) = self.last_mode_switch_at {
                if now.saturating_duration_since(last_switch)
                    < Duration::from_secs(self.cfg.min_mode_switch_secs())
                {
                    return false;
                }
            }
        }

        true
    }

    /// Runs one tick of the state machine. `forecast_temps` should be
    /// an empty slice when the weather cache is unavailable.
    pub fn step(
        &mut self,
        room_temp: Option<f64>,
        user_target: f64,
        predicted_setpoint: f64,
        season: SeasonMode,
        forecast_temps: &[f64],
        ac_power_state: bool,
    ) -> StateMachineDecision {
        let Some(room_temp) = room_temp else {
            if self.state != HVACState::SensorFault {
                debug!(ac_power_state, "room sensor unavailable, entering SENSOR_FAULT");
                self.record_transition(
                    HVACState::SensorFault,
                    String::from("room sensor unavailable"),
                );
                self.state = HVACState::SensorFault;
                self.entered_at = Instant::now();
            }

            return StateMachineDecision {
                state: HVACState::SensorFault,
                action: None,
                reason: String::from("room sensor unavailable"),
            };
        };

        let candidate =
            desired_state(self.state, room_temp, user_target, season, forecast_temps, &self.cfg);

        if candidate == self.state {
            return StateMachineDecision {
                state: self.state,
                action: derive_action(self.state, predicted_setpoint),
                reason: String::from("no state change"),
            };
        }

        if !self.guard_allows(candidate) {
            debug!(from = ?self.state, to = ?candidate, "transition blocked by anti-oscillation timer");
            return StateMachineDecision {
                state: self.state,
                action: None,
                reason: String::from("Transition blocked by anti-oscillation timer"),
            };
        }

        let reason = format!("{:?} -> {:?}", self.state, candidate);
        info!(from = ?self.state, to = ?candidate, ac_power_state, "state transition");
        self.apply_transition(candidate, reason.clone());

        StateMachineDecision {
            state: self.state,
            action: derive_action(self.state, predicted_setpoint),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sm() -> StateMachine {
        StateMachine::new(StateMachineConfig::default())
    }

    #[test]
    fn test_sensor_fault_is_unconditional() {
        let mut m = sm();
        let d = m.step(None, 23.0, 23.0, SeasonMode::Winter, &[], true);
        assert_eq!(d.state, HVACState::SensorFault);
        assert!(d.action.is_none());
    }

    #[test]
    fn test_sensor_recovery_resumes_control() {
        let mut m = sm();
        m.step(None, 23.0, 23.0, SeasonMode::Winter, &[], true);
        assert_eq!(m.current_state(), HVACState::SensorFault);

        // Room sensor comes back in-band: the machine should rebaseline
        // to Standby and issue a coast, not latch in fault forever.
        let d = m.step(Some(23.2), 23.0, 21.0, SeasonMode::Winter, &[], true);
        assert_eq!(d.state, HVACState::Standby);
        assert_eq!(d.action, Some(Action::Coast { setpoint: 21.0 }));

        // Room sensor comes back far below target: resumes heating.
        m.reset();
        m.step(None, 23.0, 23.0, SeasonMode::Winter, &[], true);
        let d = m.step(Some(18.0), 23.0, 25.0, SeasonMode::Winter, &[], true);
        assert_eq!(d.state, HVACState::HeatingActive);
    }

    #[test]
    fn test_winter_heating_activates_past_hysteresis() {
        let mut m = sm();
        let d = m.step(Some(19.0), 23.0, 25.0, SeasonMode::Winter, &[], true);
        assert_eq!(d.state, HVACState::HeatingActive);
        assert_eq!(d.action, Some(Action::SetMode { mode: ThermalMode::Heat, setpoint: 25.0 }));
    }

    #[test]
    fn test_small_deviation_stays_standby() {
        let mut m = sm();
        let d = m.step(Some(23.5), 23.0, 21.0, SeasonMode::Winter, &[], true);
        assert_eq!(d.state, HVACState::Standby);
        assert_eq!(d.action, Some(Action::Coast { setpoint: 21.0 }));
    }

    #[test]
    fn test_anti_oscillation_min_on_blocks_then_allows() {
        let mut m = sm();

        // Enter heating.
        let d = m.step(Some(19.0), 23.0, 25.0, SeasonMode::Winter, &[], true);
        assert_eq!(d.state, HVACState::HeatingActive);

        // Immediately, room swings far above target -- candidate is
        // HEATING_COAST, but MIN_ON (300s) hasn't elapsed.
        let d = m.step(Some(26.0), 23.0, 21.0, SeasonMode::Winter, &[], true);
        assert_eq!(d.state, HVACState::HeatingActive);
        assert!(d.reason.contains("blocked"));

        // Force the clock forward past MIN_ON by rewriting the timer
        // directly (Instant can't be faked without tokio::time::pause,
        // so we simulate via `force`, which updates the on-timer, then
        // assert the *guard logic* by checking a genuinely elapsed
        // real-time case is exercised in the mode-switch test below.
        m.force(HVACState::HeatingCoast, "test fast-forward").unwrap();
        assert_eq!(m.current_state(), HVACState::HeatingCoast);
    }

    #[tokio::test(start_paused = true)]
    async fn test_anti_oscillation_with_paused_clock() {
        let mut m = sm();

        let d = m.step(Some(19.0), 23.0, 25.0, SeasonMode::Winter, &[], true);
        assert_eq!(d.state, HVACState::HeatingActive);

        tokio::time::advance(Duration::from_secs(60)).await;
        let d = m.step(Some(26.0), 23.0, 21.0, SeasonMode::Winter, &[], true);
        assert_eq!(d.state, HVACState::HeatingActive);
        assert!(d.reason.contains("blocked"));

        tokio::time::advance(Duration::from_secs(241)).await; // total 301s
        let d = m.step(Some(25.5), 23.0, 21.0, SeasonMode::Winter, &[], true);
        assert_eq!(d.state, HVACState::HeatingCoast);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mode_switch_guard() {
        let mut m = sm();
        // Establish a real heating<->cooling swap so last_mode_switch_at
        // is actually set (a neutral -> family transition doesn't count).
        m.force(HVACState::CoolingActive, "seed cooling family").unwrap();
        m.force(HVACState::HeatingCoast, "seed heating family").unwrap();

        tokio::time::advance(Duration::from_secs(500)).await;
        let d = m.step(Some(28.0), 23.0, 22.0, SeasonMode::Summer, &[], true);
        assert_eq!(d.state, HVACState::HeatingCoast);
        assert!(d.reason.contains("blocked"));

        tokio::time::advance(Duration::from_secs(101)).await; // total 601s
        let d = m.step(Some(28.0), 23.0, 22.0, SeasonMode::Summer, &[], true);
        assert_eq!(d.state, HVACState::CoolingActive);
    }

    #[test]
    fn test_cold_snap_detector_window() {
        let mut temps = vec![-5.0; 48];
        temps[20] = -11.0; // drop of 6, at hour 20 (within 12..=36)
        assert!(detect_cold_snap(&temps).is_some());

        let mut temps2 = vec![-5.0; 48];
        temps2[5] = -11.0; // too soon, outside the window
        assert!(detect_cold_snap(&temps2).is_none());
    }

    #[test]
    fn test_heatwave_detector_window() {
        let mut temps = vec![25.0; 48];
        temps[30] = 32.0;
        assert!(detect_heatwave(&temps).is_some());

        let mut temps2 = vec![25.0; 48];
        temps2[2] = 32.0; // outside window
        assert!(detect_heatwave(&temps2).is_none());
    }

    #[test]
    fn test_history_ring_buffer_caps_at_50() {
        let mut m = sm();
        for i in 0..60 {
            let state =
                if i % 2 == 0 { HVACState::HeatingCoast } else { HVACState::Standby };
            m.force(state, "churn").unwrap();
        }
        assert_eq!(m.history().len(), HISTORY_CAPACITY);
    }

    #[test]
    fn test_reset_clears_timers_and_state() {
        let mut m = sm();
        m.force(HVACState::HeatingActive, "seed").unwrap();
        m.reset();
        assert_eq!(m.current_state(), HVACState::Standby);
    }
}
