//! Hazard point storage seam.

use std::fs;
use std::path::Path;

use crate::error::{LoadError, StoreError};
use crate::types::{HazardCategory, HazardPoint};

pub trait HazardStore {
    /// Current points; treated as immutable for one evaluation
    fn snapshot(&self) -> Vec<HazardPoint>;

    /// Add a point. Rejects an id that is already present.
    fn report(&mut self, point: HazardPoint) -> Result<(), StoreError>;

    fn remove(&mut self, id: &str) -> Result<HazardPoint, StoreError>;
}

/// Built-in permanent points: (id, lat, lon, category, description, radius m)
const BUILT_IN: [(&str, f64, f64, HazardCategory, &str, f64); 28] = [
    // Johannesburg
    ("jhb_1", -26.1367, 28.0456, HazardCategory::SpeedCamera, "Speed Camera - M1 North Glenhove Rd", 200.0),
    ("jhb_2", -26.1951, 28.0294, HazardCategory::SpeedCamera, "Speed Camera - M1 South Booysens", 200.0),
    ("jhb_3", -26.2041, 28.0473, HazardCategory::Police, "Johannesburg Central Police Station", 300.0),
    ("jhb_4", -26.1076, 28.0567, HazardCategory::SpeedCamera, "Speed Camera - N1 North Buccleuch", 250.0),
    ("jhb_5", -26.1445, 28.0421, HazardCategory::Roadblock, "Common Roadblock - Oxford Rd Rosebank", 180.0),
    ("jhb_6", -26.1025, 27.9944, HazardCategory::SpeedCamera, "Speed Camera - William Nicol Dr Fourways", 200.0),
    ("jhb_7", -26.1337, 28.0887, HazardCategory::Roadblock, "Roadblock Zone - Louis Botha Ave", 220.0),
    ("jhb_8", -26.2473, 28.1086, HazardCategory::Police, "Booysens Police Station", 280.0),
    ("jhb_9", -26.0981, 28.1165, HazardCategory::SpeedCamera, "Speed Camera - N3 Eastbound Gillooly's", 200.0),
    ("jhb_10", -26.2708, 27.8692, HazardCategory::Roadblock, "Frequent Checkpoint - N1 South Diepkloof", 250.0),
    // Cape Town
    ("cpt_1", -33.9249, 18.4241, HazardCategory::Police, "Cape Town Central Police Station", 320.0),
    ("cpt_2", -33.9321, 18.8602, HazardCategory::SpeedCamera, "Speed Camera - N2 Baden Powell Dr", 200.0),
    ("cpt_3", -33.9608, 18.4968, HazardCategory::SpeedCamera, "Speed Camera - M3 Newlands", 180.0),
    ("cpt_4", -33.9183, 18.4177, HazardCategory::Roadblock, "Common Roadblock - N1 Foreshore", 220.0),
    ("cpt_5", -34.0520, 18.4732, HazardCategory::SpeedCamera, "Speed Camera - M3 Wynberg", 200.0),
    ("cpt_6", -33.9249, 18.6015, HazardCategory::Roadblock, "Checkpoint Zone - N2 Airport Approach", 250.0),
    ("cpt_7", -33.9685, 18.4673, HazardCategory::Police, "Woodstock Police Station", 300.0),
    ("cpt_8", -33.9752, 18.4606, HazardCategory::SpeedCamera, "Speed Camera - De Waal Drive Observatory", 180.0),
    ("cpt_9", -33.8908, 18.6253, HazardCategory::SpeedCamera, "Speed Camera - N1 Brackenfell", 200.0),
    ("cpt_10", -34.0039, 18.4904, HazardCategory::Roadblock, "Roadblock Area - Main Rd Claremont", 180.0),
    // Pretoria
    ("pta_1", -25.7479, 28.2293, HazardCategory::Police, "Pretoria Central Police Station", 310.0),
    ("pta_2", -25.7069, 28.2267, HazardCategory::SpeedCamera, "Speed Camera - N1 South Wonderboom", 220.0),
    ("pta_3", -25.7545, 28.1877, HazardCategory::SpeedCamera, "Speed Camera - M2 Church St West", 200.0),
    ("pta_4", -25.8653, 28.1894, HazardCategory::Roadblock, "Checkpoint Zone - N1 South Centurion", 250.0),
    ("pta_5", -25.7693, 28.2768, HazardCategory::SpeedCamera, "Speed Camera - N4 Eastbound Silverton", 200.0),
    ("pta_6", -25.7615, 28.2999, HazardCategory::Police, "Brooklyn Police Station", 280.0),
    ("pta_7", -25.8281, 28.2601, HazardCategory::Roadblock, "Roadblock Area - N1 Menlyn", 220.0),
    ("pta_8", -25.7011, 28.1545, HazardCategory::SpeedCamera, "Speed Camera - R101 Montana", 190.0),
];

/// The built-in permanent points, stamped with `now_epoch_ms`
pub fn default_hazards(now_epoch_ms: i64) -> Vec<HazardPoint> {
    BUILT_IN
        .iter()
        .map(|&(id, latitude, longitude, category, description, radius)| HazardPoint {
            id: id.to_string(),
            latitude,
            longitude,
            category,
            description: description.to_string(),
            reported_at_epoch_ms: now_epoch_ms,
            is_permanent: true,
            detection_radius_m: Some(radius),
        })
        .collect()
}

/// In-memory store, insertion ordered
#[derive(Clone, Debug, Default)]
pub struct MemoryHazardStore {
    points: Vec<HazardPoint>,
}

impl MemoryHazardStore {
    /// Later duplicates of an id are dropped
    pub fn new(points: Vec<HazardPoint>) -> Self {
        let mut store = Self::default();
        for point in points {
            if let Err(e) = store.report(point) {
                log::warn!("skipping seed point: {}", e);
            }
        }
        store
    }

    pub fn with_defaults() -> Self {
        Self::new(default_hazards(chrono::Utc::now().timestamp_millis()))
    }

    /// Seed from a JSON array of hazard points
    pub fn from_json_file(path: &Path) -> Result<Self, LoadError> {
        let text = fs::read_to_string(path).map_err(|e| LoadError::io(path, e))?;
        let points: Vec<HazardPoint> =
            serde_json::from_str(&text).map_err(|e| LoadError::parse(path, e))?;
        log::info!("loaded {} hazard points from {}", points.len(), path.display());
        Ok(Self::new(points))
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&HazardPoint> {
        self.points.iter().find(|p| p.id == id)
    }
}

impl HazardStore for MemoryHazardStore {
    fn snapshot(&self) -> Vec<HazardPoint> {
        self.points.clone()
    }

    fn report(&mut self, point: HazardPoint) -> Result<(), StoreError> {
        if self.get(&point.id).is_some() {
            return Err(StoreError::DuplicateId(point.id));
        }
        self.points.push(point);
        Ok(())
    }

    fn remove(&mut self, id: &str) -> Result<HazardPoint, StoreError> {
        let index = self
            .points
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        Ok(self.points.remove(index))
    }
}
