use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::acquisition::AcquisitionConfig;
use crate::error::{ConfigError, LoadError};

/// Where live position samples come from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Simulated,
    Termux,
    Replay,
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "simulated" | "sim" => Ok(SourceKind::Simulated),
            "termux" => Ok(SourceKind::Termux),
            "replay" => Ok(SourceKind::Replay),
            other => Err(format!("unknown source: {} (simulated, termux, replay)", other)),
        }
    }
}

/// Runtime configuration. Every field has a default, so a config file only
/// needs the keys it changes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadarConfig {
    pub acquisition: AcquisitionConfig,
    pub source: SourceKind,
    /// `termux-location` provider: gps, network or passive
    pub termux_provider: String,
    pub poll_interval_ms: u64,
    /// Sample log for the replay source
    pub replay_log: Option<PathBuf>,
    pub replay_speed: f64,
    /// JSON array of hazard points; built-in points when absent
    pub hazards_file: Option<PathBuf>,
    pub radar_mode: bool,
    /// Ring the terminal bell on every tone
    pub bell: bool,
    pub status_path: PathBuf,
    pub status_interval_ms: u64,
}

impl Default for RadarConfig {
    fn default() -> Self {
        Self {
            acquisition: AcquisitionConfig::default(),
            source: SourceKind::Simulated,
            termux_provider: "gps".to_string(),
            poll_interval_ms: 1000,
            replay_log: None,
            replay_speed: 1.0,
            hazards_file: None,
            radar_mode: false,
            bell: false,
            status_path: PathBuf::from("live_status.json"),
            status_interval_ms: 2000,
        }
    }
}

impl RadarConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|e| LoadError::io(path, e))?;
        let config: RadarConfig =
            serde_json::from_str(&text).map_err(|e| LoadError::parse(path, e))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.acquisition.validate()?;

        if self.source == SourceKind::Replay && self.replay_log.is_none() {
            return Err(ConfigError::InvalidParameters(
                "replay source needs a replay_log".to_string(),
            ));
        }
        if !(self.replay_speed.is_finite() && self.replay_speed > 0.0) {
            return Err(ConfigError::InvalidParameters(format!(
                "replay_speed must be positive, got {}",
                self.replay_speed
            )));
        }
        if !["gps", "network", "passive"].contains(&self.termux_provider.as_str()) {
            return Err(ConfigError::InvalidParameters(format!(
                "unknown termux provider: {}",
                self.termux_provider
            )));
        }
        if self.poll_interval_ms == 0 || self.status_interval_ms == 0 {
            return Err(ConfigError::InvalidParameters(
                "intervals must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = RadarConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.acquisition.preferred_accuracy_m, 50.0);
        assert_eq!(config.status_interval_ms, 2000);
    }

    #[test]
    fn test_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("radar.json");
        fs::write(
            &path,
            r#"{"source": "termux", "radar_mode": true,
                "acquisition": {"acquisition_timeout_ms": 15000}}"#,
        )
        .unwrap();

        let config = RadarConfig::load(&path).unwrap();
        assert_eq!(config.source, SourceKind::Termux);
        assert!(config.radar_mode);
        assert_eq!(config.acquisition.acquisition_timeout_ms, 15_000);
        assert_eq!(config.acquisition.max_acceptable_accuracy_m, 200.0);
        assert_eq!(config.termux_provider, "gps");
    }

    #[test]
    fn test_replay_needs_log() {
        let config = RadarConfig {
            source: SourceKind::Replay,
            ..RadarConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidParameters(_))
        ));
    }

    #[test]
    fn test_bad_provider() {
        let config = RadarConfig {
            termux_provider: "wifi".into(),
            ..RadarConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = RadarConfig::load(Path::new("/nonexistent/radar.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Load(LoadError::Io { .. })));
    }

    #[test]
    fn test_source_kind_parse() {
        assert_eq!("sim".parse::<SourceKind>(), Ok(SourceKind::Simulated));
        assert!("gpsd".parse::<SourceKind>().is_err());
    }
}
