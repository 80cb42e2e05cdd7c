//! Error-state EKF fusing IMU data with GNSS and LIDAR position fixes.

pub mod analysis;
pub mod calibration;
pub mod config;
pub mod dataset;
pub mod error;
pub mod filters;
pub mod rotations;
pub mod submission;
pub mod types;

pub use config::{CovarianceUpdate, FilterConfig, NoiseModel, Part};
pub use error::{ErrorKind, FilterError};
pub use filters::{EsEkf, FilterRun, NominalState, Trajectory};
