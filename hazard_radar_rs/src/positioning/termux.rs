use std::io::ErrorKind;
use std::time::Duration;

use serde::Deserialize;
use tokio::process::Command;
use tokio::time::{interval, timeout, MissedTickBehavior};

use super::{PositionSource, SampleSink, Subscription, WatchOptions};
use crate::types::{PositionError, PositionSample};

/// JSON printed by `termux-location`
#[derive(Debug, Deserialize)]
struct TermuxLocation {
    latitude: f64,
    longitude: f64,
    accuracy: f64,
    #[serde(default)]
    bearing: Option<f64>,
    #[serde(default)]
    speed: Option<f64>,
}

/// Polls the Termux:API `termux-location` command
#[derive(Clone, Debug)]
pub struct TermuxSource {
    /// `gps`, `network` or `passive`
    pub provider: String,
    pub poll_interval: Duration,
}

impl Default for TermuxSource {
    fn default() -> Self {
        Self {
            provider: "gps".to_string(),
            poll_interval: Duration::from_secs(1),
        }
    }
}

impl TermuxSource {
    pub fn new(provider: &str, poll_interval: Duration) -> Self {
        Self {
            provider: provider.to_string(),
            poll_interval,
        }
    }
}

impl PositionSource for TermuxSource {
    fn watch(
        &mut self,
        options: &WatchOptions,
        sink: SampleSink,
    ) -> Result<Subscription, PositionError> {
        let provider = self.provider.clone();
        let poll_interval = self.poll_interval;
        let sample_timeout = options.sample_timeout;

        let handle = tokio::spawn(async move {
            let mut ticker = interval(poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let read = Command::new("termux-location")
                    .args(["-p", provider.as_str(), "-r", "once"])
                    .kill_on_drop(true)
                    .output();

                let update = match timeout(sample_timeout, read).await {
                    Err(_) => Err(PositionError::timeout(format!(
                        "no reading within {:.0}s",
                        sample_timeout.as_secs_f64()
                    ))),
                    Ok(Err(e)) if e.kind() == ErrorKind::NotFound => Err(PositionError::unavailable(
                        "termux-location not found; install Termux:API",
                    )),
                    Ok(Err(e)) if e.kind() == ErrorKind::PermissionDenied => {
                        Err(PositionError::permission_denied(e.to_string()))
                    }
                    Ok(Err(e)) => Err(PositionError::unavailable(e.to_string())),
                    Ok(Ok(output)) => parse_termux_output(
                        &String::from_utf8_lossy(&output.stdout),
                        &String::from_utf8_lossy(&output.stderr),
                    ),
                };

                let terminal = matches!(&update, Err(e) if !e.is_transient());
                let delivered = match update {
                    Ok(sample) => sink.sample(sample),
                    Err(error) => sink.error(error),
                };
                if !delivered || terminal {
                    break;
                }
            }
        });

        Ok(Subscription::from_task(handle))
    }
}

/// Turn one `termux-location` invocation into a sample or an error
fn parse_termux_output(stdout: &str, stderr: &str) -> Result<PositionSample, PositionError> {
    let combined = format!("{}{}", stdout, stderr).to_lowercase();
    if combined.contains("permission") {
        return Err(PositionError::permission_denied(stderr.trim().to_string()));
    }

    let body = stdout.trim();
    if body.is_empty() {
        // No fix yet; the provider gave up on this request
        return Err(PositionError::timeout("empty reading"));
    }

    let location: TermuxLocation = serde_json::from_str(body)
        .map_err(|e| PositionError::unavailable(format!("unreadable location output: {}", e)))?;

    let mut sample = PositionSample::new(location.latitude, location.longitude, location.accuracy)
        .with_timestamp(chrono::Utc::now().timestamp_millis().max(0) as u64);
    sample.heading_deg = location.bearing;
    sample.speed_mps = location.speed;
    Ok(sample)
}
