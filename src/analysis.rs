//! Estimation error against ground truth
//!
//! Position and orientation error per axis next to their 3σ bounds. The orientation bound maps
//! the small-angle covariance block into roll/pitch/yaw through the RPY Jacobian.

use std::path::Path;

use anyhow::Context;
use nalgebra::{Matrix3, Vector3};
use serde::Serialize;

use crate::dataset::GroundTruth;
use crate::error::Result;
use crate::filters::state::{Estimate, Trajectory};
use crate::rotations::{angle_normalize_vec, rpy_jacobian_axis_angle};

const CSV_HEADER: [&str; 13] = [
    "t", "ex", "ey", "ez", "eroll", "epitch", "eyaw", "bx", "by", "bz", "broll", "bpitch", "byaw",
];

/// One row of the 6-DOF error table
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ErrorSample {
    pub timestamp: f64,
    /// Ground truth minus estimate [m]
    pub position_error: [f64; 3],
    /// Wrapped (roll, pitch, yaw) error [rad]
    pub orientation_error: [f64; 3],
    pub position_bound: [f64; 3],
    pub orientation_bound: [f64; 3],
}

impl ErrorSample {
    /// Per axis: `None` where the bound is not finite, else whether the error lies inside it
    fn within_bounds(&self) -> [Option<bool>; 6] {
        let inside = |err: f64, bound: f64| bound.is_finite().then_some(err.abs() <= bound);
        let mut out = [None; 6];
        for i in 0..3 {
            out[i] = inside(self.position_error[i], self.position_bound[i]);
            out[i + 3] = inside(self.orientation_error[i], self.orientation_bound[i]);
        }
        out
    }

    fn csv_record(&self) -> Vec<String> {
        std::iter::once(format!("{:.6}", self.timestamp))
            .chain(
                self.position_error
                    .iter()
                    .chain(&self.orientation_error)
                    .chain(&self.position_bound)
                    .chain(&self.orientation_bound)
                    .map(|v| format!("{:.9}", v)),
            )
            .collect()
    }
}

/// 3σ of the roll/pitch/yaw uncertainty at one estimate
///
/// An axis is NaN where the RPY Jacobian is undefined (`|a_y| >= 1` for axis-angle `a`).
pub fn orientation_three_sigma(estimate: &Estimate) -> Result<Vector3<f64>> {
    let axis_angle = estimate.state.orientation.to_axis_angle()?;
    let j = rpy_jacobian_axis_angle(&axis_angle);
    let p_phi: Matrix3<f64> = estimate.covariance.fixed_view::<3, 3>(6, 6).into_owned();
    let p_rpy = j * p_phi * j.transpose();
    Ok(p_rpy
        .diagonal()
        .map(|v| if v.is_nan() { f64::NAN } else { 3.0 * v.max(0.0).sqrt() }))
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct ErrorReport {
    pub samples: Vec<ErrorSample>,
}

impl ErrorReport {
    /// Compare each estimate with the ground-truth pose at the same index.
    ///
    /// Covers `min(trajectory, ground truth)` entries.
    pub fn compute(trajectory: &Trajectory, gt: &GroundTruth) -> Result<Self> {
        let n = trajectory.len().min(gt.len());
        let mut samples = Vec::with_capacity(n);

        for (i, estimate) in trajectory.iter().take(n).enumerate() {
            let (Some(p_true), Some(r_true)) = (gt.position(i), gt.euler(i)) else {
                break;
            };
            let position_error = p_true - estimate.state.position;
            let orientation_error = angle_normalize_vec(&(r_true - estimate.state.orientation.to_euler()));
            let position_bound = estimate.position_std() * 3.0;
            let orientation_bound = orientation_three_sigma(estimate)?;

            samples.push(ErrorSample {
                timestamp: estimate.timestamp.as_secs_f64(),
                position_error: position_error.into(),
                orientation_error: orientation_error.into(),
                position_bound: position_bound.into(),
                orientation_bound: orientation_bound.into(),
            });
        }

        Ok(Self { samples })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Share of samples whose error lies inside the 3σ bound, per axis:
    /// `[x, y, z, roll, pitch, yaw]`
    ///
    /// Samples with a non-finite bound on an axis are left out of that axis.
    pub fn within_bounds_fraction(&self) -> [f64; 6] {
        let mut inside = [0usize; 6];
        let mut counted = [0usize; 6];
        for sample in &self.samples {
            for (axis, within) in sample.within_bounds().into_iter().enumerate() {
                if let Some(within) = within {
                    counted[axis] += 1;
                    inside[axis] += within as usize;
                }
            }
        }
        std::array::from_fn(|axis| inside[axis] as f64 / counted[axis].max(1) as f64)
    }

    /// RMS of the position error norm [m]
    pub fn rms_position_error(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum: f64 = self
            .samples
            .iter()
            .map(|s| Vector3::from(s.position_error).norm_squared())
            .sum();
        (sum / self.samples.len() as f64).sqrt()
    }

    pub fn write_csv(&self, path: &Path) -> anyhow::Result<()> {
        let mut wtr =
            csv::Writer::from_path(path).with_context(|| format!("creating {}", path.display()))?;
        wtr.write_record(CSV_HEADER)?;
        for s in &self.samples {
            wtr.write_record(s.csv_record())?;
        }
        wtr.flush()?;
        Ok(())
    }
}
