//! Fix acquisition state machine.
//!
//! Turns the noisy, intermittent sample stream of a [`PositionSource`] into a
//! single authoritative [`CurrentFix`]. The machine never blocks: samples and
//! the acquisition timeout arrive as events and are handed in through
//! [`FixAcquisition::handle_position`] and [`FixAcquisition::handle_timer`].
//!
//! ```text
//! Idle -> Acquiring -> Tracking <-> Degraded
//!             |            \          /
//!             +---------> Failed <---+
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

use crate::error::{AcquisitionError, ConfigError};
use crate::positioning::{PositionSource, SampleSink, SessionId, Subscription, WatchOptions};
use crate::radar::RadarEvent;
use crate::timer::{TimerId, TimerService};
use crate::types::{CurrentFix, PositionError, PositionSample};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum AcquisitionState {
    Idle,
    Acquiring,
    Tracking,
    Degraded,
    Failed,
}

impl AcquisitionState {
    /// A positioning subscription is open in this state
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            AcquisitionState::Acquiring | AcquisitionState::Tracking | AcquisitionState::Degraded
        )
    }
}

/// Accuracy thresholds and timeouts
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Samples at or below this are good enough to track on
    pub preferred_accuracy_m: f64,
    /// Samples above this never replace an established fix
    pub max_acceptable_accuracy_m: f64,
    /// Per-sample timeout forwarded to the source
    pub sample_timeout_ms: u64,
    /// How long to wait for a preferred sample before falling back
    pub acquisition_timeout_ms: u64,
    pub high_accuracy: bool,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            preferred_accuracy_m: 50.0,
            max_acceptable_accuracy_m: 200.0,
            sample_timeout_ms: 30_000,
            acquisition_timeout_ms: 30_000,
            high_accuracy: true,
        }
    }
}

impl AcquisitionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.preferred_accuracy_m.is_finite() && self.preferred_accuracy_m > 0.0) {
            return Err(ConfigError::InvalidParameters(format!(
                "preferred_accuracy_m must be positive, got {}",
                self.preferred_accuracy_m
            )));
        }
        if !(self.max_acceptable_accuracy_m >= self.preferred_accuracy_m) {
            return Err(ConfigError::InvalidParameters(format!(
                "max_acceptable_accuracy_m ({}) is below preferred_accuracy_m ({})",
                self.max_acceptable_accuracy_m, self.preferred_accuracy_m
            )));
        }
        if self.sample_timeout_ms == 0 || self.acquisition_timeout_ms == 0 {
            return Err(ConfigError::InvalidParameters(
                "timeouts must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Set the acquisition timeout from whole seconds, saturating on overflow
    pub fn set_acquisition_timeout_secs(&mut self, secs: u64) {
        self.acquisition_timeout_ms = secs.saturating_mul(1000);
    }

    pub fn acquisition_timeout(&self) -> Duration {
        Duration::from_millis(self.acquisition_timeout_ms)
    }

    pub fn watch_options(&self) -> WatchOptions {
        WatchOptions {
            high_accuracy: self.high_accuracy,
            maximum_age: Duration::ZERO,
            sample_timeout: Duration::from_millis(self.sample_timeout_ms),
        }
    }
}

/// Warning attached to a fix worse than the preferred accuracy
pub fn accuracy_warning(accuracy_m: f64) -> String {
    format!(
        "GPS accuracy: ±{}m. Signal may improve outdoors.",
        accuracy_m.round() as i64
    )
}

pub struct FixAcquisition<S> {
    source: S,
    config: AcquisitionConfig,
    events: UnboundedSender<RadarEvent>,
    state: AcquisitionState,
    session: SessionId,
    subscription: Option<Subscription>,
    timer: Option<TimerId>,
    fix: Option<CurrentFix>,
    best_seen: Option<PositionSample>,
    warning: Option<String>,
    error: Option<AcquisitionError>,
}

impl<S: PositionSource> FixAcquisition<S> {
    pub fn new(source: S, config: AcquisitionConfig, events: UnboundedSender<RadarEvent>) -> Self {
        Self {
            source,
            config,
            events,
            state: AcquisitionState::Idle,
            session: SessionId::default(),
            subscription: None,
            timer: None,
            fix: None,
            best_seen: None,
            warning: None,
            error: None,
        }
    }

    /// Begin a fresh session, releasing any previous one first
    pub fn start(&mut self, timers: &mut dyn TimerService) {
        self.release(timers);
        self.session = self.session.next();
        self.fix = None;
        self.best_seen = None;
        self.warning = None;
        self.error = None;
        self.state = AcquisitionState::Acquiring;

        let sink = SampleSink::new(self.session, self.events.clone());
        match self.source.watch(&self.config.watch_options(), sink) {
            Ok(subscription) => {
                self.subscription = Some(subscription);
                self.timer = Some(timers.start_once(self.config.acquisition_timeout()));
                log::info!(
                    "acquisition session {} started (timeout {} ms)",
                    self.session.id(),
                    self.config.acquisition_timeout_ms
                );
            }
            Err(error) => {
                log::warn!("positioning watch refused: {}", error);
                self.fail(error.into(), timers);
            }
        }
    }

    /// Idempotent
    pub fn stop(&mut self, timers: &mut dyn TimerService) {
        self.release(timers);
        if self.state != AcquisitionState::Idle {
            log::info!("acquisition session {} stopped", self.session.id());
            // anything still in flight for this session is now stale
            self.session = self.session.next();
        }
        self.fix = None;
        self.best_seen = None;
        self.warning = None;
        self.error = None;
        self.state = AcquisitionState::Idle;
    }

    /// Apply one delivery from the source. Returns true when the fix, warning
    /// or error changed.
    pub fn handle_position(
        &mut self,
        session: SessionId,
        update: Result<PositionSample, PositionError>,
        timers: &mut dyn TimerService,
    ) -> bool {
        if session != self.session || !self.state.is_active() {
            log::debug!(
                "dropping delivery from session {} (current {}, {:?})",
                session.id(),
                self.session.id(),
                self.state
            );
            return false;
        }

        match update {
            Ok(sample) => self.accept(sample, timers),
            Err(error) if error.is_transient() => {
                log::debug!("transient positioning error ignored: {}", error);
                false
            }
            Err(error) => {
                self.fail(error.into(), timers);
                true
            }
        }
    }

    /// Apply a timer firing. Returns true when the fix, warning or error changed.
    pub fn handle_timer(&mut self, id: TimerId, timers: &mut dyn TimerService) -> bool {
        if self.timer != Some(id) {
            return false;
        }
        self.timer = None;
        timers.cancel(id);
        if self.state != AcquisitionState::Acquiring {
            return false;
        }

        match self.best_seen.clone() {
            Some(best) => {
                log::warn!(
                    "no sample within {} m after {} ms, falling back to ±{:.0} m",
                    self.config.preferred_accuracy_m,
                    self.config.acquisition_timeout_ms,
                    best.accuracy_m
                );
                self.warning = Some(accuracy_warning(best.accuracy_m));
                self.fix = Some(CurrentFix::from(&best));
                self.state = AcquisitionState::Degraded;
            }
            None => self.fail(AcquisitionError::TimedOutNoFix, timers),
        }
        true
    }

    fn accept(&mut self, sample: PositionSample, timers: &mut dyn TimerService) -> bool {
        if !sample.is_plausible() {
            log::debug!(
                "discarding implausible sample ({}, {}) ±{}",
                sample.latitude,
                sample.longitude,
                sample.accuracy_m
            );
            return false;
        }

        let improves_best = self
            .best_seen
            .as_ref()
            .map(|best| sample.accuracy_m < best.accuracy_m)
            .unwrap_or(true);
        if improves_best {
            self.best_seen = Some(sample.clone());
        }

        if sample.accuracy_m <= self.config.preferred_accuracy_m {
            if let Some(id) = self.timer.take() {
                timers.cancel(id);
            }
            if self.state != AcquisitionState::Tracking {
                log::info!("tracking at ±{:.0} m", sample.accuracy_m);
            }
            self.fix = Some(CurrentFix::from(&sample));
            self.warning = None;
            self.state = AcquisitionState::Tracking;
            return true;
        }

        // Acquiring keeps waiting for the timer; only best_seen moves
        if self.state == AcquisitionState::Acquiring
            || sample.accuracy_m > self.config.max_acceptable_accuracy_m
        {
            return false;
        }

        let replaces = self
            .fix
            .as_ref()
            .map(|fix| sample.accuracy_m <= fix.accuracy_m)
            .unwrap_or(true);
        if replaces {
            self.fix = Some(CurrentFix::from(&sample));
        }
        let shown = self
            .fix
            .as_ref()
            .map(|fix| fix.accuracy_m)
            .unwrap_or(sample.accuracy_m);
        let warning = accuracy_warning(shown);
        let changed = replaces || self.warning.as_deref() != Some(warning.as_str());
        if self.state == AcquisitionState::Tracking {
            log::warn!("accuracy degraded to ±{:.0} m", sample.accuracy_m);
        }
        self.warning = Some(warning);
        self.state = AcquisitionState::Degraded;
        changed
    }

    fn fail(&mut self, error: AcquisitionError, timers: &mut dyn TimerService) {
        log::warn!("acquisition failed: {}", error.detail());
        self.release(timers);
        self.fix = None;
        self.warning = None;
        self.error = Some(error);
        self.state = AcquisitionState::Failed;
    }

    fn release(&mut self, timers: &mut dyn TimerService) {
        if let Some(mut subscription) = self.subscription.take() {
            subscription.cancel();
        }
        if let Some(id) = self.timer.take() {
            timers.cancel(id);
        }
    }

    pub fn state(&self) -> AcquisitionState {
        self.state
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn current_fix(&self) -> Option<&CurrentFix> {
        self.fix.as_ref()
    }

    /// Best sample seen this session, by accuracy
    pub fn best_seen(&self) -> Option<&PositionSample> {
        self.best_seen.as_ref()
    }

    pub fn warning(&self) -> Option<&str> {
        self.warning.as_deref()
    }

    pub fn error(&self) -> Option<&AcquisitionError> {
        self.error.as_ref()
    }

    pub fn config(&self) -> &AcquisitionConfig {
        &self.config
    }

    pub fn source(&self) -> &S {
        &self.source
    }
}
