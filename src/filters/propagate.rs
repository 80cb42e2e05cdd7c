//! Motion propagation of the nominal state and error covariance
//!
//! Constant specific force and angular rate over one inertial interval.
//! Error-state ordering is `[δp, δv, δφ]`.

use nalgebra::{Matrix3, Vector3};

use crate::config::FilterConfig;
use crate::error::{FilterError, Result};
use crate::filters::covariance;
use crate::filters::state::NominalState;
use crate::rotations::{skew_symmetric, Quaternion};
use crate::types::{noise_jacobian, ErrorCovariance, InertialSample, ProcessNoise, TransitionMatrix};

/// Error-state transition over `dt` for navigation-frame specific force `c_f = C f`
pub fn transition_matrix(c_f: &Vector3<f64>, dt: f64) -> TransitionMatrix {
    let mut f = TransitionMatrix::identity();

    // 1. Position error grows with velocity error
    f.fixed_view_mut::<3, 3>(0, 3)
        .copy_from(&(Matrix3::identity() * dt));

    // 2. Velocity error grows with orientation error through the rotated specific force
    f.fixed_view_mut::<3, 3>(3, 6)
        .copy_from(&(-skew_symmetric(c_f) * dt));

    f
}

/// Discrete inertial noise over `dt`: accel block then gyro block
pub fn process_noise(dt: f64, var_imu_f: f64, var_imu_w: f64) -> ProcessNoise {
    let dt2 = dt * dt;
    let mut q = ProcessNoise::zeros();
    for i in 0..3 {
        q[(i, i)] = dt2 * var_imu_f;
        q[(i + 3, i + 3)] = dt2 * var_imu_w;
    }
    q
}

/// Advance state and covariance by one inertial sample.
///
/// `sample` is the reading at the start of the interval; `dt` must be positive.
pub fn propagate(
    state: &NominalState,
    covariance: &ErrorCovariance,
    sample: &InertialSample,
    dt: f64,
    config: &FilterConfig,
) -> Result<(NominalState, ErrorCovariance)> {
    if !dt.is_finite() || dt <= 0.0 {
        return Err(FilterError::NonPositiveTimeStep { dt });
    }
    let noise = &config.noise;

    let c_ns = state.orientation.to_mat();
    let c_f = c_ns * sample.specific_force;
    let accel = c_f + noise.gravity();

    let position = state.position + state.velocity * dt + accel * (0.5 * dt * dt);
    let velocity = state.velocity + accel * dt;
    let orientation =
        Quaternion::from_axis_angle(&(sample.angular_rate * dt)).quat_mult_right(&state.orientation)?;

    let f = transition_matrix(&c_f, dt);
    let l = noise_jacobian();
    let q = process_noise(dt, noise.var_imu_f, noise.var_imu_w);
    let p = f * covariance * f.transpose() + l * q * l.transpose();

    if config.verify_covariance {
        covariance::verify(&p, config.psd_tolerance)?;
    }
    if position.iter().chain(velocity.iter()).any(|x| !x.is_finite()) {
        return Err(FilterError::NonFinite("propagated state".to_string()));
    }

    log::trace!("propagated dt={:.6}s |v|={:.3}", dt, velocity.norm());

    Ok((
        NominalState {
            position,
            velocity,
            orientation,
        },
        covariance::symmetrize(&p),
    ))
}
