//! Action Executor: turns a `StateMachineDecision` into at most one
//! `AcCommand` dispatch per tick, rate-limited and re-armed on drift.

use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};
use tracing::warn;

use crate::config::ActionConfig;
use crate::device::{AcClient, AcCommand, OperationMode};
use crate::error::Result;
use crate::state_machine::{Action, ThermalMode};

fn to_operation_mode(mode: ThermalMode) -> OperationMode {
    match mode {
        ThermalMode::Heat => OperationMode::Heat,
        ThermalMode::Cool => OperationMode::Cool,
    }
}

fn to_ac_command(action: Action) -> AcCommand {
    match action {
        Action::SetMode { mode, setpoint } => AcCommand::set_mode(to_operation_mode(mode), setpoint),
        Action::Coast { setpoint } => AcCommand::coast(setpoint),
    }
}

fn setpoint_of(action: Action) -> f64 {
    match action {
        Action::SetMode { setpoint, .. } => setpoint,
        Action::Coast { setpoint } => setpoint,
    }
}

struct Inner {
    last_dispatch_at: Option<Instant>,
    last_dispatched_setpoint: Option<f64>,
}

/// Dispatches `Action`s to an `AcClient`, rate-limited to at most one
/// command per `min_action_interval_secs`, with an exception for
/// drift beyond `drift_redispatch_threshold` degrees.
pub struct ActionExecutor<C: AcClient> {
    client: C,
    cfg: ActionConfig,
    state: Mutex<Inner>,
}

impl<C: AcClient> ActionExecutor<C> {
    pub fn new(client: C, cfg: ActionConfig) -> Self {
        ActionExecutor {
            client,
            cfg,
            state: Mutex::new(Inner { last_dispatch_at: None, last_dispatched_setpoint: None }),
        }
    }

    /// Sends `cmd` immediately, bypassing the rate limiter entirely.
    /// Used by direct user commands (e.g. the accessory's power
    /// switch) that must never be coalesced or delayed.
    pub async fn dispatch_immediate(&self, cmd: AcCommand) -> Result<()> {
        self.client.send(cmd).await
    }

    pub async fn snapshot(&self) -> Result<crate::device::DeviceSnapshot> {
        self.client.snapshot().await
    }

    pub fn setpoint_range(&self) -> (f64, f64) {
        self.client.setpoint_range()
    }

    /// Dispatches `action` once the rate limit window has elapsed and
    /// the setpoint has drifted from the last dispatched value by at
    /// least the configured threshold. The rate limit is absolute:
    /// drift never triggers a command before `min_action_interval_secs`
    /// has passed since the last dispatch. Returns `Ok(true)` if a
    /// command was actually sent.
    pub async fn dispatch(&self, action: Action) -> Result<bool> {
        let mut guard = self.state.lock().await;
        let setpoint = setpoint_of(action);

        let due = match guard.last_dispatch_at {
            None => true,
            Some(last) => {
                Instant::now().saturating_duration_since(last)
                    >= Duration::from_secs(self.cfg.min_action_interval_secs())
            }
        };

        if !due {
            return Ok(false);
        }

        let drifted = match guard.last_dispatched_setpoint {
            None => true,
            Some(last) => (setpoint - last).abs() >= self.cfg.drift_redispatch_threshold(),
        };

        if !drifted {
            return Ok(false);
        }

        match self.client.send(to_ac_command(action)).await {
            Ok(()) => {
                guard.last_dispatch_at = Some(Instant::now());
                guard.last_dispatched_setpoint = Some(setpoint);
                Ok(true)
            }
            Err(e) => {
                warn!(error = %e, "AC command dispatch failed");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceSnapshot;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingClient {
        sends: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl AcClient for CountingClient {
        async fn snapshot(&self) -> Result<DeviceSnapshot> {
            Ok(DeviceSnapshot::default())
        }

        async fn send(&self, _cmd: AcCommand) -> Result<()> {
            self.sends.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_first_dispatch_always_sends() {
        let sends = Arc::new(AtomicUsize::new(0));
        let exec = ActionExecutor::new(
            CountingClient { sends: sends.clone() },
            ActionConfig::default(),
        );

        let sent = exec.dispatch(Action::Coast { setpoint: 21.0 }).await.unwrap();
        assert!(sent);
        assert_eq!(sends.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rate_limit_suppresses_identical_redispatch() {
        let sends = Arc::new(AtomicUsize::new(0));
        let exec = ActionExecutor::new(
            CountingClient { sends: sends.clone() },
            ActionConfig::default(),
        );

        exec.dispatch(Action::Coast { setpoint: 21.0 }).await.unwrap();
        let sent = exec.dispatch(Action::Coast { setpoint: 21.0 }).await.unwrap();
        assert!(!sent);
        assert_eq!(sends.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_drift_does_not_bypass_rate_limit() {
        let sends = Arc::new(AtomicUsize::new(0));
        let exec = ActionExecutor::new(
            CountingClient { sends: sends.clone() },
            ActionConfig::default(),
        );

        exec.dispatch(Action::Coast { setpoint: 21.0 }).await.unwrap();
        // Drift of 9 degrees is well past the threshold, but the
        // rate-limit window hasn't elapsed yet -- still suppressed.
        let sent = exec.dispatch(Action::Coast { setpoint: 30.0 }).await.unwrap();
        assert!(!sent);
        assert_eq!(sends.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drift_triggers_redispatch_once_window_elapses() {
        let sends = Arc::new(AtomicUsize::new(0));
        let exec = ActionExecutor::new(
            CountingClient { sends: sends.clone() },
            ActionConfig::default(),
        );

        exec.dispatch(Action::Coast { setpoint: 21.0 }).await.unwrap();
        tokio::time::advance(Duration::from_secs(61)).await;
        let sent = exec.dispatch(Action::Coast { setpoint: 21.5 }).await.unwrap();
        assert!(sent);
        assert_eq!(sends.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_due_without_drift_still_suppressed() {
        let sends = Arc::new(AtomicUsize::new(0));
        let exec = ActionExecutor::new(
            CountingClient { sends: sends.clone() },
            ActionConfig::default(),
        );

        exec.dispatch(Action::Coast { setpoint: 21.0 }).await.unwrap();
        tokio::time::advance(Duration::from_secs(61)).await;
        // Window elapsed, but the target hasn't moved -- nothing to resend.
        let sent = exec.dispatch(Action::Coast { setpoint: 21.0 }).await.unwrap();
        assert!(!sent);
        assert_eq!(sends.load(Ordering::SeqCst), 1);
    }
}
