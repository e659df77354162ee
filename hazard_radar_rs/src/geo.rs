//! Geodesy helpers for proximity scoring
//!
//! All functions are pure and total over valid WGS-84 coordinates. Callers are
//! responsible for keeping latitude in [-90, 90] and longitude in [-180, 180].

use serde::{Deserialize, Serialize};

/// Mean Earth radius (meters)
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Hazards at or beyond this distance are not alerted on
pub const MAX_ALERT_RANGE_M: f64 = 2000.0;

/// (upper distance bound in meters, repeat interval in ms), ascending
const CADENCE_STEPS: [(f64, u64); 5] = [
    (100.0, 300),
    (250.0, 600),
    (500.0, 1000),
    (1000.0, 2000),
    (MAX_ALERT_RANGE_M, 3000),
];

/// Haversine great-circle distance in meters
pub fn distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).max(0.0).sqrt());
    EARTH_RADIUS_M * c
}

/// Initial compass bearing from point 1 to point 2, in [0, 360)
///
/// `bearing(A, A)` has no meaningful direction; it evaluates to 0.
pub fn bearing(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let d_lon = (lon2 - lon1).to_radians();

    let y = d_lon.sin() * lat2_rad.cos();
    let x = lat1_rad.cos() * lat2_rad.sin() - lat1_rad.sin() * lat2_rad.cos() * d_lon.cos();

    let deg = y.atan2(x).to_degrees().rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    if deg >= 360.0 {
        0.0
    } else {
        deg
    }
}

/// Point reached by travelling `distance_m` from (lat, lon) on an initial
/// bearing of `bearing_deg`. Returns (lat, lon) in degrees.
pub fn destination(lat: f64, lon: f64, bearing_deg: f64, distance_m: f64) -> (f64, f64) {
    let delta = distance_m / EARTH_RADIUS_M;
    let theta = bearing_deg.to_radians();
    let lat1 = lat.to_radians();
    let lon1 = lon.to_radians();

    let lat2 = (lat1.sin() * delta.cos() + lat1.cos() * delta.sin() * theta.cos()).asin();
    let lon2 = lon1
        + (theta.sin() * delta.sin() * lat1.cos()).atan2(delta.cos() - lat1.sin() * lat2.sin());

    let lon2 = (lon2.to_degrees() + 540.0).rem_euclid(360.0) - 180.0;
    (lat2.to_degrees(), lon2)
}

/// Repeat interval (ms) of the audible cue for a hazard at `distance_m`.
///
/// Non-decreasing in distance; 0 means no periodic cue.
pub fn alert_cadence(distance_m: f64) -> u64 {
    CADENCE_STEPS
        .iter()
        .find(|(bound, _)| distance_m < *bound)
        .map(|(_, interval)| *interval)
        .unwrap_or(0)
}

/// Urgency bucket used for colouring and status text
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    /// Under 100 m
    Critical,
    /// 100 to 500 m
    Warning,
    Caution,
}

impl AlertLevel {
    pub fn for_distance(distance_m: f64) -> Self {
        if distance_m < 100.0 {
            AlertLevel::Critical
        } else if distance_m < 500.0 {
            AlertLevel::Warning
        } else {
            AlertLevel::Caution
        }
    }

    pub fn status_text(&self) -> &'static str {
        match self {
            AlertLevel::Critical => "APPROACHING NOW!",
            AlertLevel::Warning => "WARNING - SLOW DOWN",
            AlertLevel::Caution => "ALERT - AHEAD",
        }
    }
}

/// Human readable distance: "850m", "1.2km"
pub fn format_distance(distance_m: f64) -> String {
    if distance_m < 1000.0 {
        format!("{}m", distance_m.round() as i64)
    } else {
        format!("{:.1}km", distance_m / 1000.0)
    }
}

/// Position of a contact on a radar scope of unit radius.
///
/// The user sits at the origin with north along +y. Contacts at `range_m` or
/// beyond land on the rim, a contact at distance 0 at the centre.
pub fn radar_blip(distance_m: f64, bearing_deg: f64, range_m: f64) -> (f64, f64) {
    let normalized = if range_m > 0.0 {
        (distance_m / range_m).clamp(0.0, 1.0)
    } else {
        1.0
    };
    let angle = bearing_deg.to_radians();
    (normalized * angle.sin(), normalized * angle.cos())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const JHB_CENTRAL: (f64, f64) = (-26.2041, 28.0473);
    const BOOYSENS: (f64, f64) = (-26.1951, 28.0294);

    #[test]
    fn test_distance_known_fixture() {
        let d = distance(JHB_CENTRAL.0, JHB_CENTRAL.1, BOOYSENS.0, BOOYSENS.1);
        // ~2.1 km, within 5%
        assert!((d - 2100.0).abs() < 2100.0 * 0.05, "got {}", d);
    }

    #[test]
    fn test_distance_symmetric_and_zero() {
        let points = [
            JHB_CENTRAL,
            BOOYSENS,
            (0.0, 0.0),
            (51.5, -0.12),
            (-33.9249, 18.4241),
            (89.9, 179.9),
        ];
        for a in points {
            assert_eq!(distance(a.0, a.1, a.0, a.1), 0.0);
            for b in points {
                let ab = distance(a.0, a.1, b.0, b.1);
                let ba = distance(b.0, b.1, a.0, a.1);
                assert_abs_diff_eq!(ab, ba, epsilon = 1e-6);
                if a != b {
                    assert!(ab > 0.0);
                }
            }
        }
    }

    #[test]
    fn test_one_degree_of_latitude() {
        let d = distance(0.0, 0.0, 1.0, 0.0);
        assert_abs_diff_eq!(d, EARTH_RADIUS_M * 1.0_f64.to_radians(), epsilon = 1e-6);
    }

    #[test]
    fn test_bearing_cardinal_directions() {
        assert_abs_diff_eq!(bearing(0.0, 0.0, 1.0, 0.0), 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(bearing(0.0, 0.0, 0.0, 1.0), 90.0, epsilon = 1e-9);
        assert_abs_diff_eq!(bearing(0.0, 0.0, -1.0, 0.0), 180.0, epsilon = 1e-9);
        assert_abs_diff_eq!(bearing(0.0, 0.0, 0.0, -1.0), 270.0, epsilon = 1e-9);
    }

    #[test]
    fn test_bearing_range_and_reverse() {
        let pairs = [(JHB_CENTRAL, BOOYSENS), ((10.0, 10.0), (10.1, 10.2)), ((-5.0, 40.0), (-5.3, 39.6))];
        for (a, b) in pairs {
            let fwd = bearing(a.0, a.1, b.0, b.1);
            let back = bearing(b.0, b.1, a.0, a.1);
            assert!((0.0..360.0).contains(&fwd));
            assert!((0.0..360.0).contains(&back));
            let diff = (fwd - back).rem_euclid(360.0);
            // short hops: reverse bearing is ~180 degrees off
            assert!((diff - 180.0).abs() < 1.0, "fwd {} back {}", fwd, back);
        }
    }

    #[test]
    fn test_bearing_same_point_is_zero() {
        assert_eq!(bearing(12.0, 34.0, 12.0, 34.0), 0.0);
    }

    #[test]
    fn test_destination_round_trip() {
        let (lat, lon) = destination(JHB_CENTRAL.0, JHB_CENTRAL.1, 300.0, 1500.0);
        assert_abs_diff_eq!(distance(JHB_CENTRAL.0, JHB_CENTRAL.1, lat, lon), 1500.0, epsilon = 0.01);
        assert_abs_diff_eq!(bearing(JHB_CENTRAL.0, JHB_CENTRAL.1, lat, lon), 300.0, epsilon = 1e-6);
    }

    #[test]
    fn test_destination_wraps_antimeridian() {
        let (_, lon) = destination(0.0, 179.99, 90.0, 5000.0);
        assert!(lon < -179.0 && lon >= -180.0, "got {}", lon);
    }

    #[test]
    fn test_cadence_steps() {
        assert_eq!(alert_cadence(0.0), 300);
        assert_eq!(alert_cadence(99.9), 300);
        assert_eq!(alert_cadence(100.0), 600);
        assert_eq!(alert_cadence(450.0), 1000);
        assert_eq!(alert_cadence(999.0), 2000);
        assert_eq!(alert_cadence(1900.0), 3000);
        assert_eq!(alert_cadence(MAX_ALERT_RANGE_M), 0);
        assert_eq!(alert_cadence(50_000.0), 0);
    }

    #[test]
    fn test_cadence_monotone() {
        let mut last = alert_cadence(0.0);
        let mut d = 0.0;
        while d < MAX_ALERT_RANGE_M {
            let c = alert_cadence(d);
            assert!(c >= last, "cadence fell at {} m", d);
            assert!(c > 0);
            last = c;
            d += 7.5;
        }
    }

    #[test]
    fn test_alert_levels() {
        assert_eq!(AlertLevel::for_distance(80.0), AlertLevel::Critical);
        assert_eq!(AlertLevel::for_distance(100.0), AlertLevel::Warning);
        assert_eq!(AlertLevel::for_distance(499.0), AlertLevel::Warning);
        assert_eq!(AlertLevel::for_distance(1500.0), AlertLevel::Caution);
        assert_eq!(AlertLevel::Critical.status_text(), "APPROACHING NOW!");
    }

    #[test]
    fn test_format_distance() {
        assert_eq!(format_distance(0.0), "0m");
        assert_eq!(format_distance(849.6), "850m");
        assert_eq!(format_distance(1234.0), "1.2km");
    }

    #[test]
    fn test_radar_blip() {
        let (x, y) = radar_blip(0.0, 45.0, 2000.0);
        assert_abs_diff_eq!(x, 0.0);
        assert_abs_diff_eq!(y, 0.0);

        let (x, y) = radar_blip(1000.0, 90.0, 2000.0);
        assert_abs_diff_eq!(x, 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(y, 0.0, epsilon = 1e-12);

        let (x, y) = radar_blip(5000.0, 0.0, 2000.0);
        assert_abs_diff_eq!(x, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(y, 1.0, epsilon = 1e-12);
    }
}
