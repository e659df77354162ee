//! Hazard proximity radar.
//!
//! Live positioning samples are turned into a single current fix
//! ([`acquisition`]), scored against known hazard points ([`proximity`]) and
//! translated into audible cues whose rate follows the distance to the
//! closest hazard ([`alerts`]). [`radar::RadarEngine`] wires the pieces to one
//! event stream.

pub mod acquisition;
pub mod alerts;
pub mod config;
pub mod error;
pub mod geo;
pub mod live_status;
pub mod positioning;
pub mod proximity;
pub mod radar;
pub mod store;
pub mod timer;
pub mod types;

pub use acquisition::{AcquisitionConfig, AcquisitionState, FixAcquisition};
pub use alerts::{AlertScheduler, AudioOutput, LogAudio};
pub use config::{RadarConfig, SourceKind};
pub use error::{AcquisitionError, ConfigError, LoadError, ReportError, StoreError};
pub use radar::{RadarEngine, RadarEvent, RadarSnapshot};
pub use store::{HazardStore, MemoryHazardStore};
pub use timer::{ManualTimers, TimerId, TimerService, TokioTimers};
pub use types::{CurrentFix, HazardCategory, HazardPoint, PositionError, PositionSample, ProximityAlert};
