//! Position measurement update
//!
//! Both GNSS and LIDAR observe the position block directly; they differ only in variance.

use crate::config::{CovarianceUpdate, FilterConfig};
use crate::error::{FilterError, Result};
use crate::filters::covariance;
use crate::filters::state::NominalState;
use crate::rotations::Quaternion;
use crate::types::{
    position_jacobian, ErrorCovariance, ErrorStateVec, KalmanGain, PositionMeasurement, PositionNoise,
    PositionVec,
};

/// Result of one correction
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Correction {
    pub state: NominalState,
    pub covariance: ErrorCovariance,
    /// `y - p` before the update
    pub innovation: PositionVec,
}

/// Fuse one absolute position fix into the predicted state.
pub fn correct(
    state: &NominalState,
    covariance: &ErrorCovariance,
    measurement: &PositionMeasurement,
    config: &FilterConfig,
) -> Result<Correction> {
    if measurement.position.iter().any(|x| !x.is_finite()) {
        return Err(FilterError::NonFinite(format!("{} measurement", measurement.source)));
    }
    let variance = config.noise.variance_for(measurement.source);
    let h = position_jacobian();
    let r = PositionNoise::identity() * variance;

    // Innovation covariance: S = H*P*H^T + R
    let s = h * covariance * h.transpose() + r;
    let determinant = s.determinant();
    let eig = s.symmetric_eigenvalues();
    let (min_eig, max_eig) = (eig.min(), eig.max());
    if !(min_eig > 0.0) || min_eig <= config.singular_threshold * max_eig {
        return Err(FilterError::SingularInnovation {
            sensor: measurement.source,
            determinant,
        });
    }
    let s_inv = s
        .cholesky()
        .ok_or(FilterError::SingularInnovation {
            sensor: measurement.source,
            determinant,
        })?
        .inverse();

    // Kalman gain: K = P*H^T*S^-1 (9x3)
    let k: KalmanGain = covariance * h.transpose() * s_inv;

    let innovation = measurement.position - state.position;
    let dx: ErrorStateVec = k * innovation;
    let delta_p = dx.fixed_rows::<3>(0).into_owned();
    let delta_v = dx.fixed_rows::<3>(3).into_owned();
    let delta_phi = dx.fixed_rows::<3>(6).into_owned();

    let corrected = NominalState {
        position: state.position + delta_p,
        velocity: state.velocity + delta_v,
        // orientation error lives in the navigation frame
        orientation: Quaternion::from_axis_angle(&delta_phi).quat_mult_left(&state.orientation)?,
    };

    let i_kh = ErrorCovariance::identity() - k * h;
    let p = match config.covariance_update {
        CovarianceUpdate::Simple => i_kh * covariance,
        CovarianceUpdate::Joseph => i_kh * covariance * i_kh.transpose() + k * r * k.transpose(),
    };

    if config.verify_covariance {
        covariance::verify(&p, config.psd_tolerance)?;
    }

    log::debug!(
        "{} correction at {}: |innovation|={:.4} m, |dphi|={:.2e} rad",
        measurement.source,
        measurement.timestamp,
        innovation.norm(),
        delta_phi.norm()
    );

    Ok(Correction {
        state: corrected,
        covariance: covariance::symmetrize(&p),
        innovation,
    })
}
