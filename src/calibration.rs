//! Static LIDAR-to-vehicle extrinsics
//!
//! The scan matcher reports positions in the LIDAR frame; they are moved into the IMU frame
//! once, before the filter ever sees them.

use nalgebra::{Matrix3, Vector3};

use crate::error::{FilterError, Result};
use crate::rotations::Quaternion;
use crate::types::{PositionMeasurement, SensorSource};

/// Calibrated LIDAR mounting angles (roll, pitch, yaw) [rad]
pub const LIDAR_RPY: [f64; 3] = [0.05, 0.05, 0.1];

/// LIDAR origin in the IMU frame [m]
pub const LIDAR_TRANSLATION: [f64; 3] = [0.5, 0.1, 0.5];

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Extrinsics {
    /// `C_li`: LIDAR frame to IMU frame
    pub rotation: Matrix3<f64>,
    /// `t_i_li`
    pub translation: Vector3<f64>,
}

impl Default for Extrinsics {
    fn default() -> Self {
        Self::from_rpy(
            LIDAR_RPY[0],
            LIDAR_RPY[1],
            LIDAR_RPY[2],
            Vector3::from(LIDAR_TRANSLATION),
        )
    }
}

impl Extrinsics {
    pub fn new(rotation: Matrix3<f64>, translation: Vector3<f64>) -> Self {
        Self { rotation, translation }
    }

    pub fn from_rpy(roll: f64, pitch: f64, yaw: f64, translation: Vector3<f64>) -> Self {
        Self {
            rotation: Quaternion::from_euler(roll, pitch, yaw).to_mat(),
            translation,
        }
    }

    /// `C_li * p + t_i_li`
    pub fn apply(&self, point: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * point + self.translation
    }

    /// Transform a whole LIDAR stream; anything else is rejected.
    pub fn apply_all(&self, measurements: &[PositionMeasurement]) -> Result<Vec<PositionMeasurement>> {
        measurements
            .iter()
            .map(|m| {
                if m.source != SensorSource::Lidar {
                    return Err(FilterError::InvalidInput(format!(
                        "extrinsics apply to LIDAR only, got {} at {}",
                        m.source, m.timestamp
                    )));
                }
                Ok(PositionMeasurement {
                    position: self.apply(&m.position),
                    ..*m
                })
            })
            .collect()
    }
}
