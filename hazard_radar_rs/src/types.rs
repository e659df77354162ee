use serde::{Deserialize, Serialize};
use std::fmt;

use crate::geo::AlertLevel;

/// Kind of hazard a point marks
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HazardCategory {
    Police,
    SpeedCamera,
    Roadblock,
    MobileCamera,
}

impl HazardCategory {
    pub const ALL: [HazardCategory; 4] = [
        HazardCategory::Police,
        HazardCategory::SpeedCamera,
        HazardCategory::Roadblock,
        HazardCategory::MobileCamera,
    ];

    /// Wire name, e.g. `speed_camera`
    pub fn as_str(&self) -> &'static str {
        match self {
            HazardCategory::Police => "police",
            HazardCategory::SpeedCamera => "speed_camera",
            HazardCategory::Roadblock => "roadblock",
            HazardCategory::MobileCamera => "mobile_camera",
        }
    }

    /// Display label for status lines ("SPEED CAMERA")
    pub fn label(&self) -> String {
        self.as_str().replace('_', " ").to_uppercase()
    }
}

impl fmt::Display for HazardCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for HazardCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HazardCategory::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown hazard category: {}", s))
    }
}

/// A fixed or reported hazard location.
///
/// `id` is the identity of the point: alert lists are diffed and keyed by it,
/// never by value equality.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HazardPoint {
    pub id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub category: HazardCategory,
    pub description: String,
    pub reported_at_epoch_ms: i64,
    #[serde(default)]
    pub is_permanent: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detection_radius_m: Option<f64>,
}

impl HazardPoint {
    /// Build a user report at the current fix.
    ///
    /// The id is the report's epoch-millis timestamp. An empty description is
    /// replaced with "<category> spotted".
    pub fn reported_at(
        fix: &CurrentFix,
        category: HazardCategory,
        description: &str,
        now_epoch_ms: i64,
    ) -> Self {
        let description = if description.trim().is_empty() {
            format!("{} spotted", category.as_str().replace('_', " "))
        } else {
            description.trim().to_string()
        };

        Self {
            id: now_epoch_ms.to_string(),
            latitude: fix.latitude,
            longitude: fix.longitude,
            category,
            description,
            reported_at_epoch_ms: now_epoch_ms,
            is_permanent: false,
            detection_radius_m: None,
        }
    }
}

/// One raw reading from the positioning source
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PositionSample {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(alias = "accuracy")]
    pub accuracy_m: f64,
    #[serde(default, alias = "bearing", skip_serializing_if = "Option::is_none")]
    pub heading_deg: Option<f64>,
    #[serde(default, alias = "speed", skip_serializing_if = "Option::is_none")]
    pub speed_mps: Option<f64>,
    #[serde(default)]
    pub timestamp_ms: u64,
}

impl PositionSample {
    pub fn new(latitude: f64, longitude: f64, accuracy_m: f64) -> Self {
        Self {
            latitude,
            longitude,
            accuracy_m,
            heading_deg: None,
            speed_mps: None,
            timestamp_ms: 0,
        }
    }

    pub fn with_heading(mut self, heading_deg: f64) -> Self {
        self.heading_deg = Some(heading_deg);
        self
    }

    pub fn with_speed(mut self, speed_mps: f64) -> Self {
        self.speed_mps = Some(speed_mps);
        self
    }

    pub fn with_timestamp(mut self, timestamp_ms: u64) -> Self {
        self.timestamp_ms = timestamp_ms;
        self
    }

    /// Coordinates in WGS-84 range and a finite, non-negative accuracy
    pub fn is_plausible(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
            && self.accuracy_m.is_finite()
            && self.accuracy_m >= 0.0
    }
}

/// The single authoritative location estimate.
///
/// Replaced wholesale on every accepted sample, never patched field by field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CurrentFix {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy_m: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading_deg: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed_mps: Option<f64>,
}

impl From<&PositionSample> for CurrentFix {
    fn from(sample: &PositionSample) -> Self {
        Self {
            latitude: sample.latitude,
            longitude: sample.longitude,
            accuracy_m: sample.accuracy_m.max(0.0),
            heading_deg: sample.heading_deg.map(|h| h.rem_euclid(360.0)),
            speed_mps: sample.speed_mps,
        }
    }
}

/// Failure reported by the positioning source
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionErrorKind {
    PermissionDenied,
    Unavailable,
    Timeout,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PositionError {
    pub kind: PositionErrorKind,
    #[serde(default)]
    pub message: String,
}

impl PositionError {
    pub fn new(kind: PositionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(PositionErrorKind::PermissionDenied, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(PositionErrorKind::Unavailable, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(PositionErrorKind::Timeout, message)
    }

    /// Timeouts on individual samples are transient
    pub fn is_transient(&self) -> bool {
        self.kind == PositionErrorKind::Timeout
    }
}

impl fmt::Display for PositionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

/// A hazard scored against the current fix
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProximityAlert {
    pub hazard: HazardPoint,
    pub distance_m: f64,
    pub bearing_deg: f64,
}

impl ProximityAlert {
    pub fn level(&self) -> AlertLevel {
        AlertLevel::for_distance(self.distance_m)
    }

    /// True when the user is inside the hazard's own detection radius
    pub fn inside_detection_radius(&self) -> bool {
        self.hazard
            .detection_radius_m
            .map(|r| self.distance_m <= r)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fix() -> CurrentFix {
        CurrentFix::from(&PositionSample::new(-26.2041, 28.0473, 12.0))
    }

    #[test]
    fn test_category_wire_names() {
        let json = serde_json::to_string(&HazardCategory::SpeedCamera).unwrap();
        assert_eq!(json, "\"speed_camera\"");
        let parsed: HazardCategory = serde_json::from_str("\"mobile_camera\"").unwrap();
        assert_eq!(parsed, HazardCategory::MobileCamera);
        assert_eq!("roadblock".parse::<HazardCategory>().unwrap(), HazardCategory::Roadblock);
        assert!("tank".parse::<HazardCategory>().is_err());
    }

    #[test]
    fn test_category_label() {
        assert_eq!(HazardCategory::SpeedCamera.label(), "SPEED CAMERA");
        assert_eq!(HazardCategory::Police.label(), "POLICE");
    }

    #[test]
    fn test_report_defaults_description() {
        let point = HazardPoint::reported_at(&fix(), HazardCategory::MobileCamera, "  ", 1_700_000_000_000);
        assert_eq!(point.id, "1700000000000");
        assert_eq!(point.description, "mobile camera spotted");
        assert!(!point.is_permanent);
        assert_eq!(point.latitude, -26.2041);
    }

    #[test]
    fn test_report_keeps_description() {
        let point = HazardPoint::reported_at(&fix(), HazardCategory::Police, "Two cars", 5);
        assert_eq!(point.description, "Two cars");
        assert_eq!(point.reported_at_epoch_ms, 5);
    }

    #[test]
    fn test_sample_plausibility() {
        assert!(PositionSample::new(0.0, 0.0, 0.0).is_plausible());
        assert!(!PositionSample::new(91.0, 0.0, 5.0).is_plausible());
        assert!(!PositionSample::new(0.0, 181.0, 5.0).is_plausible());
        assert!(!PositionSample::new(0.0, 0.0, -1.0).is_plausible());
        assert!(!PositionSample::new(f64::NAN, 0.0, 5.0).is_plausible());
    }

    #[test]
    fn test_sample_accepts_gps_log_field_names() {
        let json = r#"{"latitude":1.0,"longitude":2.0,"accuracy":7.5,"bearing":370.0,"speed":3.0}"#;
        let sample: PositionSample = serde_json::from_str(json).unwrap();
        assert_eq!(sample.accuracy_m, 7.5);
        let fix = CurrentFix::from(&sample);
        assert_eq!(fix.heading_deg, Some(10.0));
        assert_eq!(fix.speed_mps, Some(3.0));
    }

    #[test]
    fn test_detection_radius() {
        let mut hazard = HazardPoint::reported_at(&fix(), HazardCategory::Police, "", 1);
        hazard.detection_radius_m = Some(200.0);
        let alert = ProximityAlert {
            hazard,
            distance_m: 150.0,
            bearing_deg: 0.0,
        };
        assert!(alert.inside_detection_radius());
        assert_eq!(alert.level(), AlertLevel::Warning);
    }
}
