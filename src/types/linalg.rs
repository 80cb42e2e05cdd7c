//! Linear algebra type system for the error-state filter
//!
//! Provides compile-time dimension checking and clean type aliases
//! for the nominal state, error state and measurement models.

use nalgebra::{SMatrix, SVector};

// ===== State Dimensions =====
pub const ERROR_STATE_DIM: usize = 9; // [δp, δv, δφ]
pub const NOISE_DIM: usize = 6; // [accel, gyro]

// ===== Measurement Dimensions =====
pub const MEASURE_DIM_POS: usize = 3; // (x, y, z)

// ===== Error-State Types =====
pub type ErrorStateVec = SVector<f64, ERROR_STATE_DIM>;
pub type ErrorCovariance = SMatrix<f64, ERROR_STATE_DIM, ERROR_STATE_DIM>;

// Motion model
pub type TransitionMatrix = SMatrix<f64, ERROR_STATE_DIM, ERROR_STATE_DIM>;
pub type NoiseJacobian = SMatrix<f64, ERROR_STATE_DIM, NOISE_DIM>; // 9×6
pub type ProcessNoise = SMatrix<f64, NOISE_DIM, NOISE_DIM>; // 6×6

// Measurement model
pub type PositionVec = SVector<f64, MEASURE_DIM_POS>;
pub type PositionNoise = SMatrix<f64, MEASURE_DIM_POS, MEASURE_DIM_POS>;
pub type MeasurementJacobian = SMatrix<f64, MEASURE_DIM_POS, ERROR_STATE_DIM>; // 3×9
pub type KalmanGain = SMatrix<f64, ERROR_STATE_DIM, MEASURE_DIM_POS>; // 9×3

/// Motion model noise Jacobian: inertial noise drives velocity and orientation error.
pub fn noise_jacobian() -> NoiseJacobian {
    let mut l = NoiseJacobian::zeros();
    l.fixed_view_mut::<6, 6>(3, 0)
        .copy_from(&SMatrix::<f64, 6, 6>::identity());
    l
}

/// Measurement Jacobian: selects the position block of the error state.
pub fn position_jacobian() -> MeasurementJacobian {
    let mut h = MeasurementJacobian::zeros();
    h.fixed_view_mut::<3, 3>(0, 0)
        .copy_from(&SMatrix::<f64, 3, 3>::identity());
    h
}
