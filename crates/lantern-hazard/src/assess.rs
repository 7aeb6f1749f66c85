//! Tsunami risk assessment
//!
//! A deliberately simple coastal model: shallow strong quakes within reach
//! of the coast are graded by magnitude and distance, and the long-wave
//! speed `sqrt(g * depth)` gives an arrival estimate. Grades and
//! thresholds follow the assessment tables rescue teams already train
//! against, so the numbers coming out of a station match the printed
//! charts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use lantern_core::GeoPoint;

use crate::error::{HazardError, HazardResult};

/// Depth assumed when a report omits one, in kilometres
pub const DEFAULT_DEPTH_KM: f64 = 10.0;

/// A recorded earthquake observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Earthquake {
    pub magnitude: f64,
    pub depth_km: f64,
    pub epicenter: GeoPoint,
    pub observed_at: DateTime<Utc>,
}

impl Earthquake {
    /// Create a record with the default depth; measurements must be finite
    pub fn new(magnitude: f64, epicenter: GeoPoint) -> HazardResult<Self> {
        Self::with_depth(magnitude, DEFAULT_DEPTH_KM, epicenter)
    }

    /// Create a record with an explicit depth in kilometres
    pub fn with_depth(magnitude: f64, depth_km: f64, epicenter: GeoPoint) -> HazardResult<Self> {
        if !magnitude.is_finite() {
            return Err(HazardError::InvalidMeasurement(format!(
                "magnitude must be finite, got {}",
                magnitude
            )));
        }
        if !depth_km.is_finite() || depth_km < 0.0 {
            return Err(HazardError::InvalidMeasurement(format!(
                "depth must be a non-negative number of kilometres, got {}",
                depth_km
            )));
        }
        Ok(Self {
            magnitude,
            depth_km,
            epicenter,
            observed_at: Utc::now(),
        })
    }

    /// One-line summary for alert broadcasts
    pub fn summary(&self) -> String {
        format!(
            "Earthquake magnitude {:.1}, depth {:.0} km, epicenter {:.4}, {:.4}",
            self.magnitude, self.depth_km, self.epicenter.latitude, self.epicenter.longitude
        )
    }
}

/// Graded tsunami risk
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TsunamiRisk {
    None,
    Low,
    Moderate,
    High,
    Extreme,
}

impl TsunamiRisk {
    pub fn as_str(&self) -> &'static str {
        match self {
            TsunamiRisk::None => "none",
            TsunamiRisk::Low => "low",
            TsunamiRisk::Moderate => "moderate",
            TsunamiRisk::High => "high",
            TsunamiRisk::Extreme => "extreme",
        }
    }
}

/// A high-ground destination attached to an assessment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvacuationZone {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Elevation above sea level in metres
    pub elevation: f64,
    /// Travel distance from the assessed position in kilometres
    pub distance_km: f64,
}

/// Result of a tsunami assessment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TsunamiAssessment {
    pub risk_level: TsunamiRisk,
    /// Estimated wave speed over the assessed distance
    pub wave_speed_kmph: Option<f64>,
    /// Minutes until the first wave reaches the assessed position
    #[serde(rename = "arrival_time_minutes")]
    pub arrival_minutes: Option<f64>,
    pub evacuation_zones: Vec<EvacuationZone>,
}

/// Assess tsunami risk for a position at `distance_km` from the epicenter
///
/// Risk requires a strong (magnitude >= 7.0), shallow (depth <= 70 km)
/// quake within 1000 km. Inside that gate the grade is read off the
/// magnitude/distance table; a quake that passes the gate but matches no
/// row stays at `None` with no arrival estimate and no zones.
pub fn assess_tsunami(
    magnitude: f64,
    depth_km: f64,
    distance_km: f64,
    near: GeoPoint,
) -> TsunamiAssessment {
    let mut risk = TsunamiRisk::None;

    if magnitude >= 7.0 && depth_km <= 70.0 && distance_km <= 1000.0 {
        risk = if magnitude >= 9.0 && distance_km < 100.0 {
            TsunamiRisk::Extreme
        } else if magnitude >= 8.5 && distance_km < 200.0 {
            TsunamiRisk::High
        } else if magnitude >= 8.0 && distance_km < 300.0 {
            TsunamiRisk::Moderate
        } else if magnitude >= 7.5 && distance_km < 500.0 {
            TsunamiRisk::Low
        } else {
            TsunamiRisk::None
        };
    }

    let (wave_speed_kmph, arrival_minutes) = if risk > TsunamiRisk::None {
        // Long-wave speed sqrt(g * h) in m/s, converted to km/h
        let speed = (9.8 * depth_km * 1000.0).sqrt() * 3.6;
        (Some(speed), Some(distance_km / speed * 60.0))
    } else {
        (None, None)
    };

    let evacuation_zones = if risk > TsunamiRisk::None {
        vec![EvacuationZone {
            name: "High Ground Assembly Point".to_string(),
            latitude: near.latitude + 0.01,
            longitude: near.longitude + 0.01,
            elevation: 50.0,
            distance_km: 2.5,
        }]
    } else {
        Vec::new()
    };

    TsunamiAssessment {
        risk_level: risk,
        wave_speed_kmph,
        arrival_minutes,
        evacuation_zones,
    }
}
