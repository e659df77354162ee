use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::time::Duration;

use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;

use super::{PositionSource, SampleSink, Subscription, WatchOptions};
use crate::error::LoadError;
use crate::types::{PositionError, PositionSample};

/// One recorded delivery from a positioning source
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LoggedEvent {
    /// Milliseconds since the watch opened
    pub at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample: Option<PositionSample>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<PositionError>,
}

impl LoggedEvent {
    pub fn sample(at_ms: u64, sample: PositionSample) -> Self {
        Self {
            at_ms,
            sample: Some(sample),
            error: None,
        }
    }

    pub fn error(at_ms: u64, error: PositionError) -> Self {
        Self {
            at_ms,
            sample: None,
            error: Some(error),
        }
    }

    /// The delivery, or `None` for an entry carrying neither field
    pub fn update(&self) -> Option<Result<PositionSample, PositionError>> {
        match (&self.sample, &self.error) {
            (Some(sample), _) => Some(Ok(sample.clone())),
            (None, Some(error)) => Some(Err(error.clone())),
            (None, None) => None,
        }
    }
}

/// A recorded sample stream
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleLog {
    pub events: Vec<LoggedEvent>,
}

impl SampleLog {
    /// Events ordered by time; the recorder does not guarantee order
    pub fn sorted(mut self) -> Self {
        self.events.sort_by_key(|e| e.at_ms);
        self
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.events.iter().map(|e| e.at_ms).max().unwrap_or(0))
    }
}

/// Load a `.json` or `.json.gz` sample log
pub fn load_log(path: &Path) -> Result<SampleLog, LoadError> {
    let file = File::open(path).map_err(|e| LoadError::io(path, e))?;
    let reader: Box<dyn Read> = if path.extension().map(|e| e == "gz").unwrap_or(false) {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };
    let log: SampleLog =
        serde_json::from_reader(BufReader::new(reader)).map_err(|e| LoadError::parse(path, e))?;
    Ok(log.sorted())
}

/// Plays a [`SampleLog`] back with its original timing
#[derive(Clone, Debug)]
pub struct ReplaySource {
    log: SampleLog,
    /// 2.0 plays twice as fast
    speed: f64,
}

impl ReplaySource {
    pub fn new(log: SampleLog) -> Self {
        Self {
            log: log.sorted(),
            speed: 1.0,
        }
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        if speed.is_finite() && speed > 0.0 {
            self.speed = speed;
        }
        self
    }

    pub fn log(&self) -> &SampleLog {
        &self.log
    }
}

impl PositionSource for ReplaySource {
    fn watch(
        &mut self,
        _options: &WatchOptions,
        sink: SampleSink,
    ) -> Result<Subscription, PositionError> {
        let events = self.log.events.clone();
        let speed = self.speed;
        let handle = tokio::spawn(async move {
            let mut last_ms = 0u64;
            for event in events {
                let gap = event.at_ms.saturating_sub(last_ms);
                last_ms = event.at_ms;
                if gap > 0 {
                    sleep(Duration::from_secs_f64(gap as f64 / 1000.0 / speed)).await;
                }
                let delivered = match event.update() {
                    Some(Ok(sample)) => sink.sample(sample),
                    Some(Err(error)) => sink.error(error),
                    None => true,
                };
                if !delivered {
                    return;
                }
            }
            log::info!("replay finished after {} ms of recorded time", last_ms);
        });
        Ok(Subscription::from_task(handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::positioning::SessionId;
    use crate::radar::RadarEvent;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tokio::sync::mpsc;

    fn sample_log() -> SampleLog {
        SampleLog {
            events: vec![
                LoggedEvent::sample(2000, PositionSample::new(1.0, 1.0, 30.0)),
                LoggedEvent::sample(500, PositionSample::new(1.0, 1.0, 90.0)),
                LoggedEvent::error(1200, PositionError::timeout("slow")),
            ],
        }
    }

    #[test]
    fn test_load_plain_and_gz() {
        let dir = tempfile::tempdir().unwrap();
        let json = serde_json::to_vec(&sample_log()).unwrap();

        let plain = dir.path().join("drive.json");
        std::fs::write(&plain, &json).unwrap();

        let gz = dir.path().join("drive.json.gz");
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&json).unwrap();
        std::fs::write(&gz, encoder.finish().unwrap()).unwrap();

        for path in [plain, gz] {
            let log = load_log(&path).unwrap();
            let times: Vec<u64> = log.events.iter().map(|e| e.at_ms).collect();
            assert_eq!(times, vec![500, 1200, 2000]);
            assert_eq!(log.duration(), Duration::from_millis(2000));
        }
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_log(Path::new("/nonexistent/drive.json")).unwrap_err();
        assert!(err.to_string().contains("drive.json"));
    }

    #[test]
    fn test_empty_entry_has_no_update() {
        let entry = LoggedEvent {
            at_ms: 0,
            sample: None,
            error: None,
        };
        assert!(entry.update().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_replay_keeps_order_and_timing() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut source = ReplaySource::new(sample_log()).with_speed(2.0);
        let started = tokio::time::Instant::now();
        let _sub = source
            .watch(&WatchOptions::default(), SampleSink::new(SessionId::default(), tx))
            .unwrap();

        let mut kinds = Vec::new();
        while let Some(RadarEvent::Position { update, .. }) = rx.recv().await {
            kinds.push(update.is_ok());
        }
        assert_eq!(kinds, vec![true, false, true]);
        // 2000 ms of log at double speed
        let elapsed = started.elapsed();
        assert!(
            elapsed >= Duration::from_millis(995) && elapsed <= Duration::from_millis(1005),
            "elapsed {:?}",
            elapsed
        );
    }
}
