//! Dynamic device snapshot and command types exchanged with the AC
//! cloud client.
//!
//! Upstream data arrives as a loosely-typed record with many optional
//! fields; we model it as a plain struct with `Option<T>` for every
//! observable. Missing fields become `None` and degrade gracefully
//! rather than failing to parse.

use serde::{Deserialize, Serialize};

/// Operating modes reported/accepted by the AC's cloud API. The
/// i-SEE variants (9/10/11) are passed through untouched; this crate
/// never produces them itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum OperationMode {
    Heat = 1,
    Dry = 2,
    Cool = 3,
    Fan = 7,
    Auto = 8,
    HeatISee = 9,
    DryISee = 10,
    CoolISee = 11,
}

/// Bit mask describing which fields of a command should be applied
/// atomically by the AC client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectiveFlags {
    Power,
    OperationMode,
    SetTemperature,
    PowerOperationModeSetTemperature,
    Prohibit,
}

/// The loosely-typed snapshot emitted by the AC cloud client on every
/// `checkState` event. Every observable is optional; a missing field
/// is treated the same as an explicit `None` by the rest of the
/// crate.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DeviceSnapshot {
    pub power: Option<bool>,
    pub operation_mode: Option<OperationMode>,
    pub ac_sensor_temp: Option<f64>,
    pub ac_set_temp: Option<f64>,
    pub user_prohibit: Option<bool>,
}

/// A command to dispatch to the AC. Only the fields implied by
/// `flags` are meaningful; the others are ignored by a correct
/// `AcClient` implementation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AcCommand {
    pub flags: EffectiveFlags,
    pub power: Option<bool>,
    pub operation_mode: Option<OperationMode>,
    pub set_temperature: Option<f64>,
}

impl AcCommand {
    /// Builds the combined `{power, mode, setpoint}` command issued
    /// when entering an active heating/cooling state.
    pub fn set_mode(mode: OperationMode, setpoint: f64) -> Self {
        AcCommand {
            flags: EffectiveFlags::PowerOperationModeSetTemperature,
            power: Some(true),
            operation_mode: Some(mode),
            set_temperature: Some(setpoint),
        }
    }

    /// Builds the temperature-only command issued while coasting.
    pub fn coast(setpoint: f64) -> Self {
        AcCommand {
            flags: EffectiveFlags::SetTemperature,
            power: None,
            operation_mode: None,
            set_temperature: Some(setpoint),
        }
    }

    /// Builds the direct power toggle issued by the accessory's
    /// active on/off write, bypassing the predictive path entirely.
    pub fn power(on: bool) -> Self {
        AcCommand {
            flags: EffectiveFlags::Power,
            power: Some(on),
            operation_mode: None,
            set_temperature: None,
        }
    }
}

/// Contract for the AC cloud client. Implementations own login,
/// polling transport, and command dispatch; this crate only depends
/// on these two operations.
#[async_trait::async_trait]
pub trait AcClient: Send + Sync {
    /// Returns the minimum and maximum setpoint the AC accepts, used
    /// to clamp compensated setpoints.
    fn setpoint_range(&self) -> (f64, f64) {
        (16.0, 30.0)
    }

    async fn snapshot(&self) -> crate::error::Result<DeviceSnapshot>;

    async fn send(&self, cmd: AcCommand) -> crate::error::Result<()>;
}
