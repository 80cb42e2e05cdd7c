//! Results file: estimated position at fixed trajectory indices, `%.3f ` per component

use std::fs;
use std::path::Path;

use anyhow::Context;

use crate::error::{FilterError, Result};
use crate::filters::state::Trajectory;

pub fn format_positions(trajectory: &Trajectory, indices: &[usize]) -> Result<String> {
    let mut out = String::with_capacity(indices.len() * 3 * 10);
    for &index in indices {
        let estimate = trajectory.get(index).ok_or_else(|| {
            FilterError::InvalidInput(format!(
                "submission index {} outside trajectory of length {}",
                index,
                trajectory.len()
            ))
        })?;
        for v in estimate.state.position.iter() {
            out.push_str(&format!("{:.3} ", v));
        }
    }
    Ok(out)
}

pub fn write_submission(path: &Path, trajectory: &Trajectory, indices: &[usize]) -> anyhow::Result<()> {
    let text = format_positions(trajectory, indices)?;
    fs::write(path, text).with_context(|| format!("writing submission {}", path.display()))?;
    log::info!("wrote {} positions to {}", indices.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::state::{Estimate, NominalState, StepPhase};
    use crate::types::{ErrorCovariance, Timestamp};
    use nalgebra::Vector3;

    fn trajectory() -> Trajectory {
        let mut t = Trajectory::default();
        for k in 0..3 {
            t.push(Estimate {
                timestamp: Timestamp::from_millis(k),
                state: NominalState {
                    position: Vector3::new(k as f64 + 0.12345, -1.0004, 2.0),
                    ..NominalState::at_rest()
                },
                covariance: ErrorCovariance::zeros(),
                phase: StepPhase::Propagated,
            });
        }
        t
    }

    #[test]
    fn test_format_positions() {
        let text = format_positions(&trajectory(), &[0, 2]).unwrap();
        assert_eq!(text, "0.123 -1.000 2.000 2.123 -1.000 2.000 ");
        assert_eq!(format_positions(&trajectory(), &[]).unwrap(), "");
    }

    #[test]
    fn test_out_of_range_index() {
        assert!(matches!(
            format_positions(&trajectory(), &[1, 3]),
            Err(FilterError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_write_submission() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pt1_submission.txt");
        write_submission(&path, &trajectory(), &[1]).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "1.123 -1.000 2.000 ");
    }
}
