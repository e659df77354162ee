use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::acquisition::AcquisitionState;
use crate::radar::RadarSnapshot;

/// Periodic status file for external dashboards
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct LiveStatus {
    pub timestamp: f64,
    pub uptime_seconds: u64,
    pub state: String,
    pub samples_received: u64,
    pub hazards_loaded: usize,
    // Closest hazard, flattened for simple consumers
    pub closest_id: Option<String>,
    pub closest_distance: Option<String>,
    pub closest_status: Option<String>,
    pub snapshot: RadarSnapshot,
}

impl LiveStatus {
    pub fn new(snapshot: RadarSnapshot, state: AcquisitionState) -> Self {
        let closest = snapshot.closest.as_ref();
        Self {
            timestamp: current_timestamp(),
            uptime_seconds: 0,
            state: format!("{:?}", state),
            samples_received: 0,
            hazards_loaded: 0,
            closest_id: closest.map(|a| a.hazard.id.clone()),
            closest_distance: closest.map(|a| crate::geo::format_distance(a.distance_m)),
            closest_status: closest.map(|a| a.level().status_text().to_string()),
            snapshot,
        }
    }

    /// Write via a temp file so readers never see a half-written status
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

pub fn current_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
