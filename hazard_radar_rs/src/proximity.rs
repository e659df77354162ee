//! Scores hazard points against the current fix.
//!
//! Pure and synchronous: every call recomputes the full alert list from its
//! inputs.

use std::cmp::Ordering;

use serde::Serialize;

use crate::geo::{self, MAX_ALERT_RANGE_M};
use crate::types::{CurrentFix, HazardPoint, ProximityAlert};

/// Alerts ordered nearest first
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ProximityReport {
    pub alerts: Vec<ProximityAlert>,
}

impl ProximityReport {
    pub fn closest(&self) -> Option<&ProximityAlert> {
        self.alerts.first()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    /// Ids in alert order, for cheap change detection
    pub fn ids(&self) -> Vec<&str> {
        self.alerts.iter().map(|a| a.hazard.id.as_str()).collect()
    }
}

/// Every hazard closer than [`MAX_ALERT_RANGE_M`], sorted by distance then id.
/// No fix means no alerts.
pub fn evaluate(fix: Option<&CurrentFix>, hazards: &[HazardPoint]) -> ProximityReport {
    let fix = match fix {
        Some(fix) => fix,
        None => return ProximityReport::default(),
    };

    let mut alerts: Vec<ProximityAlert> = hazards
        .iter()
        .filter_map(|hazard| {
            let distance_m = geo::distance(
                fix.latitude,
                fix.longitude,
                hazard.latitude,
                hazard.longitude,
            );
            if !(distance_m < MAX_ALERT_RANGE_M) {
                return None;
            }
            Some(ProximityAlert {
                hazard: hazard.clone(),
                distance_m,
                bearing_deg: geo::bearing(
                    fix.latitude,
                    fix.longitude,
                    hazard.latitude,
                    hazard.longitude,
                ),
            })
        })
        .collect();

    alerts.sort_by(|a, b| {
        a.distance_m
            .partial_cmp(&b.distance_m)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.hazard.id.cmp(&b.hazard.id))
    });

    ProximityReport { alerts }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{HazardCategory, PositionSample};
    use approx::assert_abs_diff_eq;

    fn fix_at(lat: f64, lon: f64) -> CurrentFix {
        CurrentFix::from(&PositionSample::new(lat, lon, 10.0))
    }

    fn hazard(id: &str, lat: f64, lon: f64) -> HazardPoint {
        HazardPoint {
            id: id.to_string(),
            latitude: lat,
            longitude: lon,
            category: HazardCategory::Police,
            description: String::new(),
            reported_at_epoch_ms: 0,
            is_permanent: true,
            detection_radius_m: None,
        }
    }

    /// A point `distance_m` from `fix` along `bearing_deg`
    fn hazard_off(id: &str, fix: &CurrentFix, bearing_deg: f64, distance_m: f64) -> HazardPoint {
        let (lat, lon) = geo::destination(fix.latitude, fix.longitude, bearing_deg, distance_m);
        hazard(id, lat, lon)
    }

    #[test]
    fn test_no_fix_no_alerts() {
        let hazards = vec![hazard("a", 0.0, 0.0)];
        let report = evaluate(None, &hazards);
        assert!(report.is_empty());
        assert!(report.closest().is_none());
    }

    #[test]
    fn test_sorted_and_filtered() {
        let fix = fix_at(-26.2041, 28.0473);
        let hazards = vec![
            hazard_off("far", &fix, 10.0, 2500.0),
            hazard_off("mid", &fix, 200.0, 900.0),
            hazard_off("near", &fix, 90.0, 120.0),
            hazard_off("edge", &fix, 0.0, 1999.0),
            hazard_off("out", &fix, 0.0, 2001.0),
        ];

        let report = evaluate(Some(&fix), &hazards);
        assert_eq!(report.ids(), vec!["near", "mid", "edge"]);
        assert!(report.alerts.windows(2).all(|w| w[0].distance_m <= w[1].distance_m));
        assert!(report.alerts.iter().all(|a| a.distance_m < MAX_ALERT_RANGE_M));
        assert_eq!(report.closest().map(|a| a.hazard.id.as_str()), Some("near"));

        let near = &report.alerts[0];
        assert_abs_diff_eq!(near.distance_m, 120.0, epsilon = 0.5);
        assert_abs_diff_eq!(near.bearing_deg, 90.0, epsilon = 0.1);
    }

    #[test]
    fn test_ties_broken_by_id() {
        let fix = fix_at(0.0, 0.0);
        let (lat, lon) = geo::destination(0.0, 0.0, 45.0, 300.0);
        let hazards = vec![hazard("b", lat, lon), hazard("a", lat, lon), hazard("c", lat, lon)];

        let report = evaluate(Some(&fix), &hazards);
        assert_eq!(report.ids(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_hazard_at_fix() {
        let fix = fix_at(-33.9249, 18.4241);
        let report = evaluate(Some(&fix), &[hazard("here", -33.9249, 18.4241)]);
        assert_eq!(report.len(), 1);
        assert_eq!(report.alerts[0].distance_m, 0.0);
    }

    #[test]
    fn test_everything_out_of_range() {
        let fix = fix_at(0.0, 0.0);
        let report = evaluate(Some(&fix), &[hazard("x", 1.0, 1.0)]);
        assert!(report.closest().is_none());
    }
}
