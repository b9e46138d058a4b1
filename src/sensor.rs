//! External Sensor Tracker: keeps the most recent room reading and
//! the AC-vs-room sensor offset, and applies sensor compensation.

use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::Result;

/// Small jitter in the offset is ignored so a re-dispatch isn't
/// triggered by sensor noise.
const OFFSET_HYSTERESIS: f64 = 0.3;

/// A reading from the external, authoritative room sensor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorReading {
    pub room_temp: f64,
    pub humidity: Option<f64>,
    pub observed_at: Instant,
}

/// Contract for the external-sensor cloud client. Implementations own
/// the HTTP transport; this crate only depends on `fetch_temperature`.
#[async_trait::async_trait]
pub trait SensorClient: Send + Sync {
    async fn fetch_temperature(&self) -> Result<Option<(f64, Option<f64>)>>;
}

struct Inner {
    last_reading: Option<SensorReading>,
    online: bool,
    offset: Option<f64>,
}

/// Owns the single-slot last reading, online/offline status, and the
/// AC-vs-room offset for one device. Only the orchestrator's poll
/// loop writes to it; all other callers only read.
pub struct SensorTracker<C: SensorClient> {
    client: C,
    state: RwLock<Inner>,
}

impl<C: SensorClient> SensorTracker<C> {
    pub fn new(client: C) -> Self {
        SensorTracker {
            client,
            state: RwLock::new(Inner { last_reading: None, online: false, offset: None }),
        }
    }

    /// Polls the external sensor once. A transport failure flips
    /// `is_online` to `false` but never clears the last good reading.
    pub async fn poll(&self) -> Result<()> {
        match self.client.fetch_temperature().await {
            Ok(Some((room_temp, humidity))) => {
                let mut guard = self.state.write().await;
                guard.last_reading =
                    Some(SensorReading { room_temp, humidity, observed_at: Instant::now() });
                guard.online = true;
                Ok(())
            }
            Ok(None) => {
                let mut guard = self.state.write().await;
                guard.online = false;
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "external sensor poll failed");
                let mut guard = self.state.write().await;
                guard.online = false;
                Err(e)
            }
        }
    }

    pub async fn is_online(&self) -> bool {
        self.state.read().await.online
    }

    pub async fn room_temp(&self) -> Option<f64> {
        if self.is_online().await {
            self.state.read().await.last_reading.map(|r| r.room_temp)
        } else {
            None
        }
    }

    pub async fn last_reading(&self) -> Option<SensorReading> {
        self.state.read().await.last_reading
    }

    pub async fn offset(&self) -> Option<f64> {
        self.state.read().await.offset
    }

    /// Recomputes the AC-vs-room offset whenever both a fresh AC
    /// reading and a fresh room reading are present. Returns `true`
    /// if the published offset changed by more than the hysteresis
    /// band, signalling the caller should consider a drift
    /// re-dispatch.
    pub async fn refresh_offset(&self, ac_sensor_temp: Option<f64>) -> bool {
        let Some(ac_temp) = ac_sensor_temp else { return false };
        let mut guard = self.state.write().await;

        let Some(room_temp) = guard.last_reading.map(|r| r.room_temp) else {
            return false;
        };

        let new_offset = ac_temp - room_temp;
        let changed = match guard.offset {
            Some(current) => (new_offset - current).abs() > OFFSET_HYSTERESIS,
            None => true,
        };

        if changed {
            debug!(offset = new_offset, "sensor offset updated");
            guard.offset = Some(new_offset);
        }

        changed
    }

    /// Applies sensor compensation: `clamp(round(target + offset,
    /// 0.5), min, max)`. Returns `target` unchanged if the tracker is
    /// offline or the offset is within the noise band.
    pub async fn compensate(&self, target: f64, min_ac: f64, max_ac: f64) -> f64 {
        let guard = self.state.read().await;

        if !guard.online {
            return target;
        }

        match guard.offset {
            Some(offset) if offset.abs() >= OFFSET_HYSTERESIS => {
                let compensated = round_half(target + offset);
                compensated.clamp(min_ac, max_ac)
            }
            _ => target,
        }
    }
}

fn round_half(v: f64) -> f64 {
    (v * 2.0).round() / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedClient(f64);

    #[async_trait::async_trait]
    impl SensorClient for FixedClient {
        async fn fetch_temperature(&self) -> Result<Option<(f64, Option<f64>)>> {
            Ok(Some((self.0, Some(45.0))))
        }
    }

    #[tokio::test]
    async fn test_poll_and_offline_semantics() {
        let tracker = SensorTracker::new(FixedClient(22.0));

        assert!(!tracker.is_online().await);
        tracker.poll().await.unwrap();
        assert!(tracker.is_online().await);
        assert_eq!(tracker.room_temp().await, Some(22.0));
    }

    #[tokio::test]
    async fn test_offset_hysteresis() {
        let tracker = SensorTracker::new(FixedClient(20.0));
        tracker.poll().await.unwrap();

        assert!(tracker.refresh_offset(Some(16.0)).await); // -4.0, first set
        assert_eq!(tracker.offset().await, Some(-4.0));

        // Small jitter within 0.3 C should not republish.
        assert!(!tracker.refresh_offset(Some(16.2)).await);
        assert_eq!(tracker.offset().await, Some(-4.0));

        // A real swing republishes.
        assert!(tracker.refresh_offset(Some(15.0)).await);
        assert_eq!(tracker.offset().await, Some(-5.0));
    }

    #[tokio::test]
    async fn test_compensate() {
        let tracker = SensorTracker::new(FixedClient(20.0));
        tracker.poll().await.unwrap();
        tracker.refresh_offset(Some(16.0)).await;

        // offset == -4.0, target 23 -> 19, within [16, 30]
        assert_eq!(tracker.compensate(23.0, 16.0, 30.0).await, 19.0);

        // clamps to AC minimum
        let tracker2 = SensorTracker::new(FixedClient(10.0));
        tracker2.poll().await.unwrap();
        tracker2.refresh_offset(Some(0.0)).await; // offset -10
        assert_eq!(tracker2.compensate(20.0, 16.0, 30.0).await, 16.0);
    }

    #[tokio::test]
    async fn test_small_offset_is_ignored() {
        let tracker = SensorTracker::new(FixedClient(20.0));
        tracker.poll().await.unwrap();
        tracker.refresh_offset(Some(20.1)).await; // 0.1, under hysteresis

        assert_eq!(tracker.compensate(23.0, 16.0, 30.0).await, 23.0);
    }
}
