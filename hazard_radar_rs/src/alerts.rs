//! Audible alert cues.
//!
//! The scheduler owns at most one repeating tone timer and at most one
//! repeating radar sweep timer. Any replacement cancels the old timer before
//! the new one starts.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

use crate::geo;
use crate::timer::{TimerId, TimerService};

/// Radar sweep cue period: one cue per quarter turn of a 3.6 s revolution
pub const SWEEP_PERIOD: Duration = Duration::from_millis(900);

/// Short proximity beep
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Tone {
    pub frequency_hz: f64,
    pub duration_ms: u64,
}

impl Default for Tone {
    fn default() -> Self {
        Self {
            frequency_hz: 800.0,
            duration_ms: 100,
        }
    }
}

/// Rising scan tone
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Sweep {
    pub start_hz: f64,
    pub end_hz: f64,
    pub duration_ms: u64,
}

impl Default for Sweep {
    fn default() -> Self {
        Self {
            start_hz: 400.0,
            end_hz: 1200.0,
            duration_ms: 500,
        }
    }
}

/// Sink for cue requests. Sound synthesis lives behind this.
pub trait AudioOutput {
    fn play_tone(&self, tone: Tone);
    fn play_sweep(&self, sweep: Sweep);
}

impl<A: AudioOutput + ?Sized> AudioOutput for &A {
    fn play_tone(&self, tone: Tone) {
        (**self).play_tone(tone)
    }

    fn play_sweep(&self, sweep: Sweep) {
        (**self).play_sweep(sweep)
    }
}

/// Logs cues and counts them; optionally rings the terminal bell on tones
#[derive(Debug, Default)]
pub struct LogAudio {
    bell: bool,
    tones: AtomicU64,
    sweeps: AtomicU64,
}

impl LogAudio {
    pub fn new(bell: bool) -> Self {
        Self {
            bell,
            ..Self::default()
        }
    }

    pub fn tones_played(&self) -> u64 {
        self.tones.load(Ordering::Relaxed)
    }

    pub fn sweeps_played(&self) -> u64 {
        self.sweeps.load(Ordering::Relaxed)
    }
}

impl AudioOutput for LogAudio {
    fn play_tone(&self, tone: Tone) {
        self.tones.fetch_add(1, Ordering::Relaxed);
        log::debug!("tone {:.0} Hz / {} ms", tone.frequency_hz, tone.duration_ms);
        if self.bell {
            print!("\x07");
        }
    }

    fn play_sweep(&self, sweep: Sweep) {
        self.sweeps.fetch_add(1, Ordering::Relaxed);
        log::debug!(
            "sweep {:.0}->{:.0} Hz / {} ms",
            sweep.start_hz,
            sweep.end_hz,
            sweep.duration_ms
        );
    }
}

pub struct AlertScheduler<A> {
    audio: A,
    tone: Tone,
    sweep: Sweep,
    /// Interval of the running repeat; 0 when silent
    cadence_ms: u64,
    repeat: Option<TimerId>,
    radar_mode: bool,
    has_alerts: bool,
    sweep_timer: Option<TimerId>,
}

impl<A: AudioOutput> AlertScheduler<A> {
    pub fn new(audio: A) -> Self {
        Self {
            audio,
            tone: Tone::default(),
            sweep: Sweep::default(),
            cadence_ms: 0,
            repeat: None,
            radar_mode: false,
            has_alerts: false,
            sweep_timer: None,
        }
    }

    pub fn with_cues(mut self, tone: Tone, sweep: Sweep) -> Self {
        self.tone = tone;
        self.sweep = sweep;
        self
    }

    /// React to a new closest-alert distance (`None` is all clear).
    ///
    /// The repeat is only replaced when the cadence bucket changes, so a
    /// distance wobbling inside one bucket keeps a steady rhythm.
    pub fn on_closest_changed(&mut self, distance_m: Option<f64>, timers: &mut dyn TimerService) {
        let cadence = distance_m.map(geo::alert_cadence).unwrap_or(0);
        if cadence == self.cadence_ms {
            return;
        }

        self.cancel_repeat(timers);
        self.cadence_ms = cadence;
        if cadence == 0 {
            log::debug!("all clear, alert tone stopped");
            return;
        }

        log::debug!("alert cadence now {} ms", cadence);
        self.audio.play_tone(self.tone);
        self.repeat = Some(timers.start_repeating(Duration::from_millis(cadence)));
    }

    /// Whether any hazard is inside alert range; drives the sweep cue
    pub fn on_alerts_changed(&mut self, has_alerts: bool, timers: &mut dyn TimerService) {
        self.has_alerts = has_alerts;
        self.update_sweep(timers);
    }

    pub fn set_radar_mode(&mut self, enabled: bool, timers: &mut dyn TimerService) {
        self.radar_mode = enabled;
        self.update_sweep(timers);
    }

    fn update_sweep(&mut self, timers: &mut dyn TimerService) {
        let wanted = self.radar_mode && self.has_alerts;
        match (wanted, self.sweep_timer) {
            (true, None) => {
                self.sweep_timer = Some(timers.start_repeating(SWEEP_PERIOD));
            }
            (false, Some(id)) => {
                timers.cancel(id);
                self.sweep_timer = None;
            }
            _ => {}
        }
    }

    /// Play the cue owned by `id`. False for timers this scheduler does not hold.
    pub fn handle_timer(&mut self, id: TimerId) -> bool {
        if self.repeat == Some(id) {
            self.audio.play_tone(self.tone);
            true
        } else if self.sweep_timer == Some(id) {
            self.audio.play_sweep(self.sweep);
            true
        } else {
            false
        }
    }

    /// Cancel every cue. Idempotent.
    pub fn stop(&mut self, timers: &mut dyn TimerService) {
        self.cancel_repeat(timers);
        self.cadence_ms = 0;
        self.has_alerts = false;
        if let Some(id) = self.sweep_timer.take() {
            timers.cancel(id);
        }
    }

    fn cancel_repeat(&mut self, timers: &mut dyn TimerService) {
        if let Some(id) = self.repeat.take() {
            timers.cancel(id);
        }
    }

    pub fn cadence_ms(&self) -> u64 {
        self.cadence_ms
    }

    pub fn is_repeating(&self) -> bool {
        self.repeat.is_some()
    }

    pub fn is_sweeping(&self) -> bool {
        self.sweep_timer.is_some()
    }

    pub fn radar_mode(&self) -> bool {
        self.radar_mode
    }

    pub fn audio(&self) -> &A {
        &self.audio
    }
}
