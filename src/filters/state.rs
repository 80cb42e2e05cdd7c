use nalgebra::Vector3;
use ndarray::{Array1, Array2, Array3};
use serde::{Deserialize, Serialize};

use crate::error::{FilterError, Result};
use crate::rotations::Quaternion;
use crate::types::{ErrorCovariance, Timestamp, ERROR_STATE_DIM};

/// Point estimate of the rigid body: position and velocity in the navigation frame,
/// orientation as a unit quaternion (body to navigation).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NominalState {
    pub position: Vector3<f64>,
    pub velocity: Vector3<f64>,
    pub orientation: Quaternion,
}

impl NominalState {
    /// Build a state, normalizing the orientation
    pub fn new(position: Vector3<f64>, velocity: Vector3<f64>, orientation: Quaternion) -> Result<Self> {
        if position.iter().chain(velocity.iter()).any(|x| !x.is_finite()) {
            return Err(FilterError::NonFinite("nominal state".to_string()));
        }
        Ok(Self {
            position,
            velocity,
            orientation: orientation.normalize()?,
        })
    }

    /// At rest at the origin, level
    pub fn at_rest() -> Self {
        Self {
            position: Vector3::zeros(),
            velocity: Vector3::zeros(),
            orientation: Quaternion::identity(),
        }
    }
}

/// Which steps produced an estimate
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepPhase {
    /// Externally seeded (k = 0)
    Initialized,
    /// Propagated, no measurement matched
    Propagated,
    /// Propagated then corrected by the flagged sources
    Corrected { lidar: bool, gnss: bool },
}

/// Filter output at one inertial timestamp
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Estimate {
    pub timestamp: Timestamp,
    pub state: NominalState,
    pub covariance: ErrorCovariance,
    pub phase: StepPhase,
}

impl Estimate {
    pub fn position_std(&self) -> Vector3<f64> {
        Vector3::new(
            self.covariance[(0, 0)].max(0.0).sqrt(),
            self.covariance[(1, 1)].max(0.0).sqrt(),
            self.covariance[(2, 2)].max(0.0).sqrt(),
        )
    }

    pub fn snapshot(&self) -> EstimateSnapshot {
        let p = self.state.position;
        let v = self.state.velocity;
        let q = self.state.orientation;
        let rpy = q.to_euler();
        let mut covariance_diagonal = [0.0; ERROR_STATE_DIM];
        for (i, slot) in covariance_diagonal.iter_mut().enumerate() {
            *slot = self.covariance[(i, i)];
        }

        EstimateSnapshot {
            timestamp: self.timestamp.as_secs_f64(),
            position: (p.x, p.y, p.z),
            velocity: (v.x, v.y, v.z),
            quaternion: (q.w, q.x, q.y, q.z),
            euler: (rpy.x, rpy.y, rpy.z),
            covariance_diagonal,
            covariance_trace: self.covariance.trace(),
            phase: self.phase,
        }
    }
}

/// Serializable view of one estimate
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EstimateSnapshot {
    /// Seconds
    pub timestamp: f64,

    /// Position in the navigation frame [meters]
    pub position: (f64, f64, f64),

    /// Velocity in the navigation frame [m/s]
    pub velocity: (f64, f64, f64),

    /// Quaternion (w, x, y, z)
    pub quaternion: (f64, f64, f64, f64),

    /// Roll, pitch, yaw [rad]
    pub euler: (f64, f64, f64),

    pub covariance_diagonal: [f64; ERROR_STATE_DIM],
    pub covariance_trace: f64,
    pub phase: StepPhase,
}

/// Append-only sequence of estimates, one per inertial sample
#[derive(Clone, Debug, Default)]
pub struct Trajectory {
    estimates: Vec<Estimate>,
}

impl Trajectory {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            estimates: Vec::with_capacity(capacity),
        }
    }

    pub(crate) fn push(&mut self, estimate: Estimate) {
        self.estimates.push(estimate);
    }

    pub fn len(&self) -> usize {
        self.estimates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.estimates.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Estimate> {
        self.estimates.get(index)
    }

    pub fn last(&self) -> Option<&Estimate> {
        self.estimates.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Estimate> {
        self.estimates.iter()
    }

    pub fn as_slice(&self) -> &[Estimate] {
        &self.estimates
    }

    pub fn timestamps(&self) -> Array1<f64> {
        self.estimates
            .iter()
            .map(|e| e.timestamp.as_secs_f64())
            .collect()
    }

    /// N×3
    pub fn positions(&self) -> Array2<f64> {
        Array2::from_shape_fn((self.len(), 3), |(k, i)| self.estimates[k].state.position[i])
    }

    /// N×3
    pub fn velocities(&self) -> Array2<f64> {
        Array2::from_shape_fn((self.len(), 3), |(k, i)| self.estimates[k].state.velocity[i])
    }

    /// N×4, scalar first
    pub fn orientations(&self) -> Array2<f64> {
        Array2::from_shape_fn((self.len(), 4), |(k, i)| {
            self.estimates[k].state.orientation.to_vector()[i]
        })
    }

    /// N×9×9
    pub fn covariances(&self) -> Array3<f64> {
        Array3::from_shape_fn((self.len(), ERROR_STATE_DIM, ERROR_STATE_DIM), |(k, r, c)| {
            self.estimates[k].covariance[(r, c)]
        })
    }

    pub fn snapshots(&self) -> Vec<EstimateSnapshot> {
        self.estimates.iter().map(Estimate::snapshot).collect()
    }
}

impl<'a> IntoIterator for &'a Trajectory {
    type Item = &'a Estimate;
    type IntoIter = std::slice::Iter<'a, Estimate>;

    fn into_iter(self) -> Self::IntoIter {
        self.estimates.iter()
    }
}
