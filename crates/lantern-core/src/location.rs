//! Position reports and the standard broadcast formats
//!
//! Location shares travel through the mesh as ordinary text messages. The
//! three formats here are the ones clients already render, so a report
//! produced from the station console is indistinguishable from one produced
//! in a browser.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// A point on the globe
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    /// Create a point, validating coordinate ranges
    pub fn new(latitude: f64, longitude: f64) -> CoreResult<Self> {
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return Err(CoreError::InvalidCoordinates {
                latitude,
                longitude,
            });
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    /// Google Maps link for this point
    pub fn maps_link(&self) -> String {
        format!(
            "https://maps.google.com/?q={},{}",
            self.latitude, self.longitude
        )
    }

    /// OpenStreetMap link for this point
    pub fn osm_link(&self) -> String {
        format!(
            "https://www.openstreetmap.org/?mlat={}&mlon={}&zoom=15",
            self.latitude, self.longitude
        )
    }
}

/// Coarse quality class for a position fix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccuracyClass {
    High,
    Medium,
    Low,
}

impl AccuracyClass {
    /// Classify a fix by its accuracy radius in metres
    pub fn from_meters(accuracy_m: f64) -> Self {
        if accuracy_m < 100.0 {
            AccuracyClass::High
        } else if accuracy_m < 500.0 {
            AccuracyClass::Medium
        } else {
            AccuracyClass::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AccuracyClass::High => "High",
            AccuracyClass::Medium => "Medium",
            AccuracyClass::Low => "Low",
        }
    }
}

/// A position fix ready to broadcast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationReport {
    pub point: GeoPoint,
    /// Accuracy radius in metres
    pub accuracy_m: f64,
    pub recorded_at: DateTime<Utc>,
}

impl LocationReport {
    /// Create a report timestamped now
    pub fn new(point: GeoPoint, accuracy_m: f64) -> Self {
        Self {
            point,
            accuracy_m,
            recorded_at: Utc::now(),
        }
    }

    /// Accuracy class of this fix
    pub fn accuracy_class(&self) -> AccuracyClass {
        AccuracyClass::from_meters(self.accuracy_m)
    }

    fn timestamp(&self) -> String {
        self.recorded_at.format("%Y-%m-%d %H:%M:%S UTC").to_string()
    }

    /// One-line position share
    pub fn format_quick(&self) -> String {
        format!(
            "📍 My location: {:.6}, {:.6} (±{}m)",
            self.point.latitude,
            self.point.longitude,
            self.accuracy_m.round() as i64
        )
    }

    /// Multi-line distress position with a map link
    pub fn format_emergency(&self) -> String {
        format!(
            "🚨 EMERGENCY LOCATION 🚨\n📍 {:.6}, {:.6}\n🎯 Accuracy: ±{}m ({})\n⏰ {}\n🗺️ Google Maps: {}\n⚠️ NEED IMMEDIATE ASSISTANCE HERE",
            self.point.latitude,
            self.point.longitude,
            self.accuracy_m.round() as i64,
            self.accuracy_class().as_str(),
            self.timestamp(),
            self.point.maps_link()
        )
    }

    /// Multi-line position with both map links
    pub fn format_detailed(&self) -> String {
        format!(
            "📍 DETAILED LOCATION\nCoordinates: {:.6}, {:.6}\nAccuracy: ±{}m ({})\nTime: {}\nGoogle Maps: {}\nOpenStreetMap: {}",
            self.point.latitude,
            self.point.longitude,
            self.accuracy_m.round() as i64,
            self.accuracy_class().as_str(),
            self.timestamp(),
            self.point.maps_link(),
            self.point.osm_link()
        )
    }
}
