//! Setpoint Calculator: a pure function mapping a `ControlContext` to
//! a `PredictionResult`. No I/O, no clock reads beyond what's passed
//! in via the context — same inputs always yield the same output.

use crate::config::CalculatorConfig;

/// Which half of the year's comfort strategy is in effect. Drives
/// which layers apply and which sign conventions are used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeasonMode {
    Winter,
    Summer,
}

/// Per-tick input to the calculator (and, downstream, the state
/// machine).
#[derive(Debug, Clone)]
pub struct ControlContext {
    pub user_comfort_target: f64,
    pub room_temp: Option<f64>,
    pub outdoor_temp: Option<f64>,
    pub forecast_temps: Vec<f64>,
    pub forecast_solar: Vec<f64>,
    pub season_mode: SeasonMode,
}

/// The additive layers that made up the final prediction, useful for
/// diagnostics and for pinning behaviour in tests.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Components {
    pub base: f64,
    pub outdoor_reset: f64,
    pub forecast_adjustment: f64,
    pub solar_offset: f64,
    pub error_correction: f64,
    pub cold_weather_boost: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PredictionResult {
    pub predicted_room_target: f64,
    pub components: Components,
    pub reason: String,
}

const MIN_TARGET: f64 = 16.0;
const MAX_TARGET: f64 = 30.0;
const REASON_THRESHOLD: f64 = 0.3;

fn round_half(v: f64) -> f64 {
    (v * 2.0).round() / 2.0
}

fn weighted_future_temp(forecast_temps: &[f64], hours: usize, tau_hours: f64) -> Option<f64> {
    if forecast_temps.is_empty() || hours == 0 {
        return None;
    }

    let h = hours.min(forecast_temps.len());
    let mut weighted_sum = 0.0;
    let mut weight_total = 0.0;

    for (i, temp) in forecast_temps.iter().take(h).enumerate() {
        let w = (-(i as f64) / tau_hours).exp();
        weighted_sum += w * temp;
        weight_total += w;
    }

    if weight_total > 0.0 {
        Some(weighted_sum / weight_total)
    } else {
        None
    }
}

fn min_of(values: &[f64]) -> Option<f64> {
    values.iter().copied().fold(None, |acc, v| Some(acc.map_or(v, |a: f64| a.min(v))))
}

/// Computes the predicted room target for one tick. Pure: the same
/// `ControlContext` and `CalculatorConfig` always produce the same
/// `PredictionResult`.
pub fn calculate(ctx: &ControlContext, cfg: &CalculatorConfig) -> PredictionResult {
    let winter = ctx.season_mode == SeasonMode::Winter;
    let mut reasons = Vec::new();

    // L1 - outdoor reset.
    let design_outdoor =
        if winter { cfg.design_outdoor_winter() } else { cfg.design_outdoor_summer() };
    let outdoor_reset = match ctx.outdoor_temp {
        Some(outdoor) => {
            (cfg.outdoor_reset_gain() * (design_outdoor - outdoor)).clamp(-2.0, 2.0)
        }
        None => 0.0,
    };
    if outdoor_reset.abs() > REASON_THRESHOLD {
        reasons.push(format!("outdoor reset {:+.2}", outdoor_reset));
    }

    // L2 - forecast look-ahead. The sign flip only happens in winter:
    // a falling summer forecast nudges the prediction toward heating
    // rather than cooling harder. Inherited asymmetry, bounded by the
    // clamp below and by the outer +/-2 summer bound.
    let forecast_adjustment = match (ctx.outdoor_temp, weighted_future_temp(
        &ctx.forecast_temps,
        cfg.forecast_lookahead_hours() as usize,
        cfg.forecast_time_constant_hours(),
    )) {
        (Some(current), Some(weighted_future)) => {
            let expected_change = weighted_future - current;
            let raw = cfg.forecast_gain() * expected_change;
            let signed = if winter { -raw } else { raw };
            signed.clamp(-1.0, 1.0)
        }
        _ => 0.0,
    };
    if forecast_adjustment.abs() > REASON_THRESHOLD {
        reasons.push(format!("forecast adjustment {:+.2}", forecast_adjustment));
    }

    // L3 - solar gain, winter only.
    let solar_offset = if winter {
        let window = cfg.solar_lookahead_hours() as usize;
        let avg = if ctx.forecast_solar.is_empty() {
            None
        } else {
            let n = window.min(ctx.forecast_solar.len());
            Some(ctx.forecast_solar[..n].iter().sum::<f64>() / n as f64)
        };

        match avg {
            Some(avg) if avg > cfg.solar_threshold_wm2() => {
                let reduction = cfg.solar_gain() * (avg - cfg.solar_threshold_wm2());
                (-reduction).clamp(-2.0, 0.0)
            }
            _ => 0.0,
        }
    } else {
        0.0
    };
    if solar_offset.abs() > REASON_THRESHOLD {
        reasons.push(format!("solar gain {:+.2}", solar_offset));
    }

    // L4 - error correction.
    let error_correction = match ctx.room_temp {
        Some(room) => {
            (cfg.error_correction_gain() * (ctx.user_comfort_target - room)).clamp(-1.0, 1.0)
        }
        None => 0.0,
    };
    if error_correction.abs() > REASON_THRESHOLD {
        reasons.push(format!("error correction {:+.2}", error_correction));
    }

    // L5 - cold-weather boost, winter only.
    let cold_weather_boost = if winter {
        let mut boost = match ctx.outdoor_temp {
            Some(t) if t < -5.0 => 3.0,
            Some(t) if t < 0.0 => 2.0,
            Some(t) if t < 5.0 => 1.0,
            _ => 0.0,
        };

        if let Some(min48) = min_of(&ctx.forecast_temps[..ctx.forecast_temps.len().min(24)]) {
            if min48 < -5.0 && boost < 2.0 {
                boost = 2.0;
            }
            if min48 < 0.0 && boost < 1.0 {
                boost = 1.0;
            }
        }

        boost
    } else {
        0.0
    };
    if cold_weather_boost.abs() > REASON_THRESHOLD {
        reasons.push(format!("cold weather boost {:+.2}", cold_weather_boost));
    }

    let base = ctx.user_comfort_target;
    let sum = base
        + outdoor_reset
        + forecast_adjustment
        + solar_offset
        + error_correction
        + cold_weather_boost;

    // Final bounds: userComfortTarget +/- 2, widened to +4 in winter
    // sub-zero outdoor conditions.
    let upper_bound = if winter && ctx.outdoor_temp.map(|t| t < 0.0).unwrap_or(false) {
        base + 4.0
    } else {
        base + 2.0
    };
    let lower_bound = base - 2.0;

    let mut bounded = sum.clamp(lower_bound, upper_bound);
    if bounded != sum {
        reasons.push(String::from("clamped to comfort bound"));
    }

    let final_clamped = bounded.clamp(MIN_TARGET, MAX_TARGET);
    if final_clamped != bounded {
        reasons.push(String::from("clamped to absolute [16, 30] range"));
    }
    bounded = final_clamped;

    let predicted_room_target = round_half(bounded);

    let reason = if reasons.is_empty() {
        String::from("no significant adjustment")
    } else {
        reasons.join(", ")
    };

    PredictionResult {
        predicted_room_target,
        components: Components {
            base,
            outdoor_reset,
            forecast_adjustment,
            solar_offset,
            error_correction,
            cold_weather_boost,
        },
        reason,
    }
}
