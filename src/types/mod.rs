pub mod linalg;

pub use linalg::*;

use std::fmt;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Sample time as an integer count of microseconds.
///
/// Integer stamps make the exact equality used for measurement alignment well defined.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(i64);

impl Timestamp {
    pub const fn from_micros(micros: i64) -> Self {
        Timestamp(micros)
    }

    pub const fn from_millis(millis: i64) -> Self {
        Timestamp(millis * 1_000)
    }

    /// Round a time in seconds to the nearest microsecond
    pub fn from_secs_f64(secs: f64) -> Self {
        Timestamp((secs * 1e6).round() as i64)
    }

    pub fn as_micros(self) -> i64 {
        self.0
    }

    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 * 1e-6
    }

    /// Elapsed time `self - earlier` in seconds (negative if out of order)
    pub fn seconds_since(self, earlier: Timestamp) -> f64 {
        (self.0 - earlier.0) as f64 * 1e-6
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}s", self.as_secs_f64())
    }
}

/// Absolute position sensors feeding the corrector
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SensorSource {
    Gnss,
    Lidar,
}

impl SensorSource {
    pub fn name(self) -> &'static str {
        match self {
            SensorSource::Gnss => "GNSS",
            SensorSource::Lidar => "LIDAR",
        }
    }
}

impl fmt::Display for SensorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One IMU reading, body frame
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InertialSample {
    pub timestamp: Timestamp,
    /// Specific force [m/s²]
    pub specific_force: Vector3<f64>,
    /// Angular rate [rad/s]
    pub angular_rate: Vector3<f64>,
}

impl InertialSample {
    pub fn new(timestamp: Timestamp, specific_force: Vector3<f64>, angular_rate: Vector3<f64>) -> Self {
        Self {
            timestamp,
            specific_force,
            angular_rate,
        }
    }
}

/// Absolute position fix, already expressed in the navigation frame
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PositionMeasurement {
    pub timestamp: Timestamp,
    pub position: Vector3<f64>,
    pub source: SensorSource,
}

impl PositionMeasurement {
    pub fn new(timestamp: Timestamp, position: Vector3<f64>, source: SensorSource) -> Self {
        Self {
            timestamp,
            position,
            source,
        }
    }

    pub fn gnss(timestamp: Timestamp, position: Vector3<f64>) -> Self {
        Self::new(timestamp, position, SensorSource::Gnss)
    }

    pub fn lidar(timestamp: Timestamp, position: Vector3<f64>) -> Self {
        Self::new(timestamp, position, SensorSource::Lidar)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_rounding() {
        assert_eq!(Timestamp::from_secs_f64(0.005), Timestamp::from_micros(5_000));
        assert_eq!(Timestamp::from_secs_f64(0.1 + 0.2), Timestamp::from_micros(300_000));
        assert_eq!(Timestamp::from_millis(100), Timestamp::from_secs_f64(0.1));
    }

    #[test]
    fn test_timestamp_difference() {
        let a = Timestamp::from_millis(100);
        let b = Timestamp::from_millis(250);
        assert!((b.seconds_since(a) - 0.15).abs() < 1e-12);
        assert!(a.seconds_since(b) < 0.0);
    }

    #[test]
    fn test_source_display() {
        assert_eq!(SensorSource::Gnss.to_string(), "GNSS");
        assert_eq!(SensorSource::Lidar.to_string(), "LIDAR");
    }
}
