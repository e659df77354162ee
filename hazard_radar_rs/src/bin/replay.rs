use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use serde::Serialize;
use serde_json::json;
use tokio::sync::mpsc;

use hazard_radar_rs::positioning::{load_log, MockSource};
use hazard_radar_rs::{
    AcquisitionConfig, HazardStore, LogAudio, ManualTimers, MemoryHazardStore,
    RadarEngine, RadarEvent,
};

/// Replays a recorded sample log through the engine on a virtual clock and
/// prints a JSON summary. Output is identical across runs for the same input.
#[derive(Parser, Debug)]
struct Args {
    /// Path to a sample log (.json or .json.gz)
    #[arg(long)]
    log: PathBuf,

    /// JSON array of hazard points (default: built-in list)
    #[arg(long)]
    hazards: Option<PathBuf>,

    /// Preferred fix accuracy in meters
    #[arg(long, default_value = "50.0")]
    preferred_accuracy: f64,

    /// Worst accuracy that may still replace a fix, in meters
    #[arg(long, default_value = "200.0")]
    max_accuracy: f64,

    /// Seconds to wait for a preferred fix before falling back
    #[arg(long, default_value = "30")]
    acquisition_timeout: u64,

    /// Simulate radar mode sweep cues
    #[arg(long, default_value_t = false)]
    radar_mode: bool,

    /// Seconds of virtual time to run past the last logged event
    #[arg(long, default_value = "5")]
    tail: u64,
}

#[derive(Serialize)]
struct Transition {
    at_ms: u128,
    state: String,
}

#[derive(Serialize)]
struct Approach {
    id: String,
    distance_m: f64,
    at_ms: u128,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let mut config = AcquisitionConfig {
        preferred_accuracy_m: args.preferred_accuracy,
        max_acceptable_accuracy_m: args.max_accuracy,
        ..AcquisitionConfig::default()
    };
    config.set_acquisition_timeout_secs(args.acquisition_timeout);
    config.validate()?;

    let log = load_log(&args.log)?;
    let store = match &args.hazards {
        Some(path) => MemoryHazardStore::from_json_file(path)?,
        None => MemoryHazardStore::with_defaults(),
    };
    let hazard_count = store.snapshot().len();

    let (tx, mut rx) = mpsc::unbounded_channel::<RadarEvent>();
    let source = MockSource::new();
    let mut engine = RadarEngine::new(
        source.clone(),
        store,
        LogAudio::new(false),
        ManualTimers::new(),
        config,
        tx,
    );
    engine.set_radar_mode(args.radar_mode);
    engine.start();

    let mut transitions = vec![Transition {
        at_ms: 0,
        state: format!("{:?}", engine.state()),
    }];
    let mut last_state = engine.state();
    let mut first_fix_ms: Option<u128> = None;
    let mut first_alert_ms: Option<u128> = None;
    let mut closest_approach: Option<Approach> = None;
    let mut samples = 0u64;
    let mut errors = 0u64;

    let mut observe = |engine: &RadarEngine<MockSource, MemoryHazardStore, LogAudio, ManualTimers>| {
        let at_ms = engine.timers().now().as_millis();
        let state = engine.state();
        if state != last_state {
            transitions.push(Transition {
                at_ms,
                state: format!("{:?}", state),
            });
            last_state = state;
        }
        let snapshot = engine.snapshot();
        if snapshot.fix.is_some() && first_fix_ms.is_none() {
            first_fix_ms = Some(at_ms);
        }
        if let Some(closest) = &snapshot.closest {
            first_alert_ms.get_or_insert(at_ms);
            let nearer = closest_approach
                .as_ref()
                .map(|a| closest.distance_m < a.distance_m)
                .unwrap_or(true);
            if nearer {
                closest_approach = Some(Approach {
                    id: closest.hazard.id.clone(),
                    distance_m: closest.distance_m,
                    at_ms,
                });
            }
        }
    };

    for event in &log.events {
        let at = Duration::from_millis(event.at_ms);
        while engine.step_timer(at) {
            observe(&engine);
        }
        engine.advance_to(at);

        match event.update() {
            Some(Ok(sample)) => {
                samples += 1;
                source.emit(sample);
            }
            Some(Err(error)) => {
                errors += 1;
                source.emit_error(error);
            }
            None => continue,
        }
        while let Ok(event) = rx.try_recv() {
            engine.handle(event);
        }
        observe(&engine);
    }

    let end = log.duration() + Duration::from_secs(args.tail);
    while engine.step_timer(end) {
        observe(&engine);
    }
    engine.advance_to(end);

    let snapshot = engine.snapshot();
    let summary = json!({
        "log": args.log.display().to_string(),
        "hazards": hazard_count,
        "samples": samples,
        "errors": errors,
        "virtual_ms": end.as_millis(),
        "final_state": format!("{:?}", engine.state()),
        "tracking": snapshot.tracking,
        "fix": snapshot.fix,
        "warning": snapshot.warning,
        "error": snapshot.error,
        "alerts_in_range": snapshot.alerts.len(),
        "closest": snapshot.closest.as_ref().map(|a| json!({
            "id": a.hazard.id,
            "distance_m": a.distance_m,
            "bearing_deg": a.bearing_deg,
        })),
        "first_fix_ms": first_fix_ms,
        "first_alert_ms": first_alert_ms,
        "closest_approach": closest_approach,
        "tones": engine.scheduler().audio().tones_played(),
        "sweeps": engine.scheduler().audio().sweeps_played(),
        "transitions": transitions,
    });

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
