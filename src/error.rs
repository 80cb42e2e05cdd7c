use thiserror::Error;

use crate::types::{SensorSource, Timestamp};

/// Broad classification of filter failures.
///
/// Data errors point at the input streams, numerical errors at the recursion itself.
/// Neither is recovered from inside the core.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Data,
    Numerical,
}

/// Filter error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FilterError {
    #[error("Non-monotonic timestamp at sample {index}: {previous} -> {current}")]
    NonMonotonicTimestamp {
        index: usize,
        previous: Timestamp,
        current: Timestamp,
    },

    #[error("Time step must be positive, got {dt}s")]
    NonPositiveTimeStep { dt: f64 },

    #[error("Stream length mismatch for {what}: {left} vs {right}")]
    StreamLengthMismatch {
        what: String,
        left: usize,
        right: usize,
    },

    #[error("More than one {sensor} measurement at {timestamp}")]
    DuplicateMeasurement {
        sensor: SensorSource,
        timestamp: Timestamp,
    },

    #[error("{sensor} measurements out of order at index {index}")]
    UnsortedMeasurements { sensor: SensorSource, index: usize },

    #[error("Empty stream: {0}")]
    EmptyStream(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Innovation covariance is singular for {sensor} update (det = {determinant:e})")]
    SingularInnovation {
        sensor: SensorSource,
        determinant: f64,
    },

    #[error("Quaternion has zero norm")]
    ZeroNormQuaternion,

    #[error("Covariance lost positive semi-definiteness (min eigenvalue {min_eigenvalue:e})")]
    CovarianceNotPsd { min_eigenvalue: f64 },

    #[error("Covariance lost symmetry (max |P - P^T| = {max_asymmetry:e})")]
    CovarianceAsymmetric { max_asymmetry: f64 },

    #[error("Non-finite value in {0}")]
    NonFinite(String),
}

impl FilterError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FilterError::NonMonotonicTimestamp { .. }
            | FilterError::NonPositiveTimeStep { .. }
            | FilterError::StreamLengthMismatch { .. }
            | FilterError::DuplicateMeasurement { .. }
            | FilterError::UnsortedMeasurements { .. }
            | FilterError::EmptyStream(_)
            | FilterError::InvalidInput(_) => ErrorKind::Data,
            FilterError::SingularInnovation { .. }
            | FilterError::ZeroNormQuaternion
            | FilterError::CovarianceNotPsd { .. }
            | FilterError::CovarianceAsymmetric { .. }
            | FilterError::NonFinite(_) => ErrorKind::Numerical,
        }
    }

    pub fn is_numerical(&self) -> bool {
        self.kind() == ErrorKind::Numerical
    }
}

/// Result type for core filter operations
pub type Result<T> = std::result::Result<T, FilterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let err = FilterError::NonMonotonicTimestamp {
            index: 3,
            previous: Timestamp::from_micros(10),
            current: Timestamp::from_micros(10),
        };
        assert_eq!(err.kind(), ErrorKind::Data);
        assert!(!err.is_numerical());

        let err = FilterError::SingularInnovation {
            sensor: SensorSource::Gnss,
            determinant: 0.0,
        };
        assert_eq!(err.kind(), ErrorKind::Numerical);
        assert!(FilterError::ZeroNormQuaternion.is_numerical());
    }

    #[test]
    fn test_error_messages() {
        let err = FilterError::DuplicateMeasurement {
            sensor: SensorSource::Lidar,
            timestamp: Timestamp::from_micros(1_500_000),
        };
        assert_eq!(err.to_string(), "More than one LIDAR measurement at 1.500000s");
    }
}
