//! Engine wiring: acquisition, proximity scoring and alert cues driven by a
//! single event stream.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

use crate::acquisition::{AcquisitionConfig, AcquisitionState, FixAcquisition};
use crate::alerts::{AlertScheduler, AudioOutput};
use crate::error::{ReportError, StoreError};
use crate::positioning::{PositionSource, SessionId};
use crate::proximity::{self, ProximityReport};
use crate::store::HazardStore;
use crate::timer::{ManualTimers, TimerId, TimerService};
use crate::types::{CurrentFix, HazardCategory, HazardPoint, PositionError, PositionSample, ProximityAlert};

/// Everything that can wake the engine
#[derive(Debug)]
pub enum RadarEvent {
    /// A sample or error from the positioning source
    Position {
        session: SessionId,
        update: Result<PositionSample, PositionError>,
    },
    Timer(TimerId),
}

/// What consumers (rendering, status output) get to see
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RadarSnapshot {
    pub fix: Option<CurrentFix>,
    pub alerts: Vec<ProximityAlert>,
    pub closest: Option<ProximityAlert>,
    pub warning: Option<String>,
    pub error: Option<String>,
    /// A positioning watch is open
    pub tracking: bool,
    /// Repeat interval of the audible cue, 0 when silent
    pub cadence_ms: u64,
}

pub struct RadarEngine<S, H, A, T> {
    acquisition: FixAcquisition<S>,
    store: H,
    scheduler: AlertScheduler<A>,
    timers: T,
    report: ProximityReport,
}

impl<S, H, A, T> RadarEngine<S, H, A, T>
where
    S: PositionSource,
    H: HazardStore,
    A: AudioOutput,
    T: TimerService,
{
    pub fn new(
        source: S,
        store: H,
        audio: A,
        timers: T,
        config: AcquisitionConfig,
        events: UnboundedSender<RadarEvent>,
    ) -> Self {
        Self {
            acquisition: FixAcquisition::new(source, config, events),
            store,
            scheduler: AlertScheduler::new(audio),
            timers,
            report: ProximityReport::default(),
        }
    }

    pub fn start(&mut self) {
        self.acquisition.start(&mut self.timers);
        self.refresh();
    }

    /// Stop acquisition and every cue. Idempotent.
    pub fn stop(&mut self) {
        self.acquisition.stop(&mut self.timers);
        self.scheduler.stop(&mut self.timers);
        self.report = ProximityReport::default();
    }

    /// Dispatch one event. Returns true when the snapshot may have changed.
    pub fn handle(&mut self, event: RadarEvent) -> bool {
        let changed = match event {
            RadarEvent::Position { session, update } => {
                self.acquisition
                    .handle_position(session, update, &mut self.timers)
            }
            RadarEvent::Timer(id) => {
                if self.scheduler.handle_timer(id) {
                    return false;
                }
                self.acquisition.handle_timer(id, &mut self.timers)
            }
        };
        if changed {
            self.refresh();
        }
        changed
    }

    /// File a user report at the current fix
    pub fn report_hazard(
        &mut self,
        category: HazardCategory,
        description: &str,
        now_epoch_ms: i64,
    ) -> Result<HazardPoint, ReportError> {
        let fix = self.acquisition.current_fix().ok_or(ReportError::NoFix)?;
        let point = HazardPoint::reported_at(fix, category, description, now_epoch_ms);
        self.store.report(point.clone())?;
        log::info!("reported {} at ({:.5}, {:.5})", category, point.latitude, point.longitude);
        self.refresh();
        Ok(point)
    }

    pub fn remove_hazard(&mut self, id: &str) -> Result<HazardPoint, StoreError> {
        let removed = self.store.remove(id)?;
        self.refresh();
        Ok(removed)
    }

    pub fn set_radar_mode(&mut self, enabled: bool) {
        self.scheduler.set_radar_mode(enabled, &mut self.timers);
    }

    /// Re-score every hazard against the current fix and retune the cues
    fn refresh(&mut self) {
        let hazards = self.store.snapshot();
        self.report = proximity::evaluate(self.acquisition.current_fix(), &hazards);
        self.scheduler.on_closest_changed(
            self.report.closest().map(|a| a.distance_m),
            &mut self.timers,
        );
        self.scheduler
            .on_alerts_changed(!self.report.is_empty(), &mut self.timers);
    }

    pub fn snapshot(&self) -> RadarSnapshot {
        RadarSnapshot {
            fix: self.acquisition.current_fix().cloned(),
            alerts: self.report.alerts.clone(),
            closest: self.report.closest().cloned(),
            warning: self.acquisition.warning().map(str::to_string),
            error: self.acquisition.error().map(|e| e.to_string()),
            tracking: self.acquisition.state().is_active(),
            cadence_ms: self.scheduler.cadence_ms(),
        }
    }

    pub fn state(&self) -> AcquisitionState {
        self.acquisition.state()
    }

    pub fn acquisition(&self) -> &FixAcquisition<S> {
        &self.acquisition
    }

    pub fn scheduler(&self) -> &AlertScheduler<A> {
        &self.scheduler
    }

    pub fn store(&self) -> &H {
        &self.store
    }

    pub fn timers(&self) -> &T {
        &self.timers
    }
}

impl<S, H, A> RadarEngine<S, H, A, ManualTimers>
where
    S: PositionSource,
    H: HazardStore,
    A: AudioOutput,
{
    /// Fire the earliest virtual timer due at or before `until`.
    /// False once nothing else is due.
    pub fn step_timer(&mut self, until: Duration) -> bool {
        match self.timers.pop_due(until) {
            Some(id) => {
                self.handle(RadarEvent::Timer(id));
                true
            }
            None => false,
        }
    }

    /// Fire every virtual timer due up to `until`, one at a time, so each
    /// firing sees the cancellations made by the previous one.
    pub fn advance_to(&mut self, until: Duration) -> usize {
        let mut fired = 0;
        while self.step_timer(until) {
            fired += 1;
        }
        self.timers.settle(until);
        fired
    }
}
