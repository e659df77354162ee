use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};

use super::{PositionSource, SampleSink, Subscription, WatchOptions};
use crate::geo;
use crate::types::{PositionError, PositionSample};

/// A straight-line drive with a cold-start accuracy curve
#[derive(Clone, Debug)]
pub struct SimulatedDrive {
    pub start_latitude: f64,
    pub start_longitude: f64,
    pub heading_deg: f64,
    pub speed_mps: f64,
    /// Time between samples
    pub interval: Duration,
    /// Accuracy of the first sample, before the receiver settles
    pub initial_accuracy_m: f64,
    pub settled_accuracy_m: f64,
    /// Samples it takes to go from initial to settled accuracy
    pub settle_samples: u32,
    /// Amplitude of the position wobble (meters)
    pub jitter_m: f64,
}

impl Default for SimulatedDrive {
    fn default() -> Self {
        // Heading north up Rissik St towards Johannesburg Central
        Self {
            start_latitude: -26.2250,
            start_longitude: 28.0473,
            heading_deg: 0.0,
            speed_mps: 13.9,
            interval: Duration::from_secs(1),
            initial_accuracy_m: 150.0,
            settled_accuracy_m: 8.0,
            settle_samples: 12,
            jitter_m: 3.0,
        }
    }
}

impl SimulatedDrive {
    /// The `seq`-th sample of the drive (0-based)
    pub fn sample_at(&self, seq: u64) -> PositionSample {
        let t = seq as f64 * self.interval.as_secs_f64();
        let travelled = self.speed_mps * t;
        let (lat, lon) = geo::destination(
            self.start_latitude,
            self.start_longitude,
            self.heading_deg,
            travelled,
        );

        // Deterministic wobble, perpendicular to travel
        let wobble = (seq as f64 * 0.7).sin() * self.jitter_m;
        let (lat, lon) = geo::destination(lat, lon, self.heading_deg + 90.0, wobble);

        let progress = if self.settle_samples == 0 {
            1.0
        } else {
            (seq as f64 / self.settle_samples as f64).min(1.0)
        };
        let accuracy = self.initial_accuracy_m
            + (self.settled_accuracy_m - self.initial_accuracy_m) * progress
            + (seq as f64 * 0.3).sin().abs();

        PositionSample::new(lat, lon, accuracy)
            .with_heading(self.heading_deg)
            .with_speed(self.speed_mps)
            .with_timestamp((t * 1000.0) as u64)
    }
}

/// Source that plays a [`SimulatedDrive`] in real (tokio) time
#[derive(Clone, Debug, Default)]
pub struct SimulatedSource {
    drive: SimulatedDrive,
}

impl SimulatedSource {
    pub fn new(drive: SimulatedDrive) -> Self {
        Self { drive }
    }

    pub fn drive(&self) -> &SimulatedDrive {
        &self.drive
    }
}

impl PositionSource for SimulatedSource {
    fn watch(
        &mut self,
        _options: &WatchOptions,
        sink: SampleSink,
    ) -> Result<Subscription, PositionError> {
        let drive = self.drive.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = interval(drive.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut seq = 0u64;
            loop {
                ticker.tick().await;
                if !sink.sample(drive.sample_at(seq)) {
                    log::debug!("simulated drive stopped after {} samples", seq);
                    break;
                }
                seq += 1;
            }
        });
        Ok(Subscription::from_task(handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::positioning::SessionId;
    use crate::radar::RadarEvent;
    use approx::assert_abs_diff_eq;
    use tokio::sync::mpsc;

    #[test]
    fn test_drive_moves_along_heading() {
        let drive = SimulatedDrive {
            jitter_m: 0.0,
            ..SimulatedDrive::default()
        };
        let first = drive.sample_at(0);
        let tenth = drive.sample_at(10);
        let d = geo::distance(first.latitude, first.longitude, tenth.latitude, tenth.longitude);
        assert_abs_diff_eq!(d, 139.0, epsilon = 0.5);
        assert!(tenth.latitude > first.latitude);
        assert_eq!(tenth.timestamp_ms, 10_000);
    }

    #[test]
    fn test_drive_accuracy_settles() {
        let drive = SimulatedDrive::default();
        let first = drive.sample_at(0).accuracy_m;
        let settled = drive.sample_at(50).accuracy_m;
        assert!(first > 100.0);
        assert!(settled < 10.0);
        assert!(drive.sample_at(5).accuracy_m < first);
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulated_source_streams_until_cancelled() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut source = SimulatedSource::default();
        let session = SessionId::default().next();
        let mut sub = source
            .watch(&WatchOptions::default(), SampleSink::new(session, tx))
            .unwrap();

        for _ in 0..3 {
            match rx.recv().await {
                Some(RadarEvent::Position { session: s, update }) => {
                    assert_eq!(s, session);
                    assert!(update.is_ok());
                }
                _ => panic!("expected sample"),
            }
        }

        sub.cancel();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err());
    }
}
