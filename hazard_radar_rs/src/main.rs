use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, sleep, Duration, MissedTickBehavior};

use hazard_radar_rs::geo::format_distance;
use hazard_radar_rs::live_status::{current_timestamp, LiveStatus};
use hazard_radar_rs::positioning::{load_log, PositionSource, ReplaySource, SimulatedSource, TermuxSource};
use hazard_radar_rs::{
    AcquisitionState, HazardStore, LogAudio, MemoryHazardStore, RadarConfig, RadarEngine, RadarEvent,
    RadarSnapshot, SourceKind, TokioTimers,
};

#[derive(Parser, Debug)]
#[command(name = "hazard_radar")]
#[command(about = "Proximity alerts for police, speed cameras and roadblocks", long_about = None)]
struct Args {
    /// Duration in seconds (0 = until Ctrl-C)
    #[arg(value_name = "SECONDS", default_value = "0")]
    duration: u64,

    /// JSON config file; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Position source (simulated, termux, replay)
    #[arg(long)]
    source: Option<SourceKind>,

    /// termux-location provider (gps, network, passive)
    #[arg(long)]
    provider: Option<String>,

    /// Sample log (.json or .json.gz) for the replay source
    #[arg(long)]
    replay_log: Option<PathBuf>,

    /// Replay speed multiplier
    #[arg(long)]
    replay_speed: Option<f64>,

    /// JSON array of hazard points (default: built-in list)
    #[arg(long)]
    hazards: Option<PathBuf>,

    /// Preferred fix accuracy in meters
    #[arg(long)]
    preferred_accuracy: Option<f64>,

    /// Worst accuracy that may still replace a fix, in meters
    #[arg(long)]
    max_accuracy: Option<f64>,

    /// Seconds to wait for a preferred fix before falling back
    #[arg(long)]
    acquisition_timeout: Option<u64>,

    /// Play the radar sweep cue while hazards are in range
    #[arg(long)]
    radar_mode: bool,

    /// Ring the terminal bell on alert tones
    #[arg(long)]
    bell: bool,

    /// Live status output file
    #[arg(long)]
    status_path: Option<PathBuf>,
}

impl Args {
    fn into_config(self) -> Result<RadarConfig> {
        let mut config = match &self.config {
            Some(path) => RadarConfig::load(path)?,
            None => RadarConfig::default(),
        };

        if let Some(source) = self.source {
            config.source = source;
        }
        if let Some(provider) = self.provider {
            config.termux_provider = provider;
        }
        if let Some(log) = self.replay_log {
            config.replay_log = Some(log);
        }
        if let Some(speed) = self.replay_speed {
            config.replay_speed = speed;
        }
        if let Some(hazards) = self.hazards {
            config.hazards_file = Some(hazards);
        }
        if let Some(preferred) = self.preferred_accuracy {
            config.acquisition.preferred_accuracy_m = preferred;
        }
        if let Some(max) = self.max_accuracy {
            config.acquisition.max_acceptable_accuracy_m = max;
        }
        if let Some(secs) = self.acquisition_timeout {
            config.acquisition.set_acquisition_timeout_secs(secs);
        }
        if let Some(path) = self.status_path {
            config.status_path = path;
        }
        config.radar_mode |= self.radar_mode;
        config.bell |= self.bell;

        config.validate()?;
        Ok(config)
    }
}

fn build_source(config: &RadarConfig) -> Result<Box<dyn PositionSource>> {
    let source: Box<dyn PositionSource> = match config.source {
        SourceKind::Simulated => Box::new(SimulatedSource::default()),
        SourceKind::Termux => Box::new(TermuxSource::new(
            &config.termux_provider,
            Duration::from_millis(config.poll_interval_ms),
        )),
        SourceKind::Replay => {
            let path = config
                .replay_log
                .as_ref()
                .context("replay source needs --replay-log")?;
            let log = load_log(path)?;
            println!("  Replay: {} events over {:?}", log.events.len(), log.duration());
            Box::new(ReplaySource::new(log).with_speed(config.replay_speed))
        }
    };
    Ok(source)
}

/// What the console reports on; printed whenever it changes
#[derive(PartialEq)]
struct Headline {
    state: AcquisitionState,
    closest: Option<(String, u64)>,
    warning: Option<String>,
    error: Option<String>,
}

impl Headline {
    fn new(state: AcquisitionState, snapshot: &RadarSnapshot) -> Self {
        Self {
            state,
            closest: snapshot
                .closest
                .as_ref()
                .map(|a| (a.hazard.id.clone(), snapshot.cadence_ms)),
            warning: snapshot.warning.clone(),
            error: snapshot.error.clone(),
        }
    }
}

fn print_update(snapshot: &RadarSnapshot, state: AcquisitionState) {
    match &snapshot.fix {
        Some(fix) => println!(
            "[{}] {:?} fix ({:.5}, {:.5}) ±{:.0}m",
            ts_now(),
            state,
            fix.latitude,
            fix.longitude,
            fix.accuracy_m
        ),
        None => println!("[{}] {:?} (no fix)", ts_now(), state),
    }
    if let Some(warning) = &snapshot.warning {
        println!("  ⚠ {}", warning);
    }
    if let Some(error) = &snapshot.error {
        println!("  ✗ {}", error);
    }
    match &snapshot.closest {
        Some(alert) => println!(
            "  {} {} {} at {} (bearing {:.0}°, {} in range, cue every {} ms)",
            alert.level().status_text(),
            alert.hazard.category.label(),
            alert.hazard.description,
            format_distance(alert.distance_m),
            alert.bearing_deg,
            snapshot.alerts.len(),
            snapshot.cadence_ms
        ),
        None if snapshot.fix.is_some() => println!("  All clear"),
        None => {}
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let duration = args.duration;
    let config = args.into_config()?;

    println!("[{}] Hazard Radar Starting", ts_now());
    println!("  Duration: {} seconds (0=until Ctrl-C)", duration);
    println!("  Source: {:?}", config.source);
    println!(
        "  Accuracy: preferred ±{}m, max ±{}m, timeout {}s",
        config.acquisition.preferred_accuracy_m,
        config.acquisition.max_acceptable_accuracy_m,
        config.acquisition.acquisition_timeout_ms / 1000
    );

    let store = match &config.hazards_file {
        Some(path) => MemoryHazardStore::from_json_file(path)?,
        None => MemoryHazardStore::with_defaults(),
    };
    let hazards_loaded = store.snapshot().len();
    println!("  Hazards: {}", hazards_loaded);

    let source = build_source(&config)?;
    let (tx, mut rx) = mpsc::unbounded_channel::<RadarEvent>();
    let timers = TokioTimers::new(tx.clone());
    let mut engine = RadarEngine::new(
        source,
        store,
        LogAudio::new(config.bell),
        timers,
        config.acquisition.clone(),
        tx,
    );

    let started = Instant::now();
    let mut samples_received = 0u64;
    let make_status = |engine_snapshot: RadarSnapshot, state: AcquisitionState, samples: u64| {
        let mut status = LiveStatus::new(engine_snapshot, state);
        status.uptime_seconds = started.elapsed().as_secs();
        status.samples_received = samples;
        status.hazards_loaded = hazards_loaded;
        status
    };

    engine.set_radar_mode(config.radar_mode);
    engine.start();

    // Status file writer: latest status in, file out on a fixed period
    let (status_tx, status_rx) = watch::channel(make_status(engine.snapshot(), engine.state(), 0));
    let status_path = config.status_path.clone();
    let status_period = Duration::from_millis(config.status_interval_ms);
    let writer = tokio::spawn(async move {
        let mut ticker = interval(status_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let mut status = status_rx.borrow().clone();
            status.timestamp = current_timestamp();
            if let Err(e) = status.save(&status_path) {
                log::warn!("failed to write {}: {}", status_path.display(), e);
            }
        }
    });

    let deadline = async move {
        if duration == 0 {
            std::future::pending::<()>().await
        } else {
            sleep(Duration::from_secs(duration)).await
        }
    };
    tokio::pin!(deadline);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut headline = Headline::new(engine.state(), &engine.snapshot());
    print_update(&engine.snapshot(), engine.state());

    loop {
        tokio::select! {
            Some(event) = rx.recv() => {
                if let RadarEvent::Position { update: Ok(_), .. } = &event {
                    samples_received += 1;
                }
                if !engine.handle(event) {
                    continue;
                }
                let snapshot = engine.snapshot();
                let next = Headline::new(engine.state(), &snapshot);
                if next != headline {
                    print_update(&snapshot, engine.state());
                    headline = next;
                }
                status_tx.send_replace(make_status(snapshot, engine.state(), samples_received));
            }
            _ = &mut ctrl_c => {
                println!("\n[{}] Interrupted", ts_now());
                break;
            }
            _ = &mut deadline => {
                println!("[{}] Duration reached", ts_now());
                break;
            }
        }
    }

    // Final status before stopping, so it still shows the last fix
    let final_status = make_status(engine.snapshot(), engine.state(), samples_received);
    engine.stop();
    writer.abort();

    let final_path = config.status_path.with_file_name("live_status_final.json");
    final_status
        .save(&final_path)
        .with_context(|| format!("writing {}", final_path.display()))?;

    println!("[{}] Stopped after {}s", ts_now(), started.elapsed().as_secs());
    println!("  Samples: {}", samples_received);
    println!(
        "  Tones: {}, sweeps: {}",
        engine.scheduler().audio().tones_played(),
        engine.scheduler().audio().sweeps_played()
    );
    println!("  Final status: {}", final_path.display());
    Ok(())
}

fn ts_now() -> String {
    Utc::now().format("%H:%M:%S").to_string()
}
