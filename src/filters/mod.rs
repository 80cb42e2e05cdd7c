pub mod correct;
pub mod covariance;
pub mod es_ekf;
pub mod propagate;
pub mod state;

pub use es_ekf::{EsEkf, FilterRun, MeasurementCursor, RunStats};
pub use state::{Estimate, EstimateSnapshot, NominalState, StepPhase, Trajectory};
