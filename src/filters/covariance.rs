//! Consistency checks for the error covariance
//!
//! A covariance that is asymmetric or has a negative eigenvalue beyond round-off
//! means the recursion is broken; it is reported, never patched.

use crate::error::{FilterError, Result};
use crate::types::ErrorCovariance;

/// `(P + P^T) / 2`
pub fn symmetrize(p: &ErrorCovariance) -> ErrorCovariance {
    (p + p.transpose()) * 0.5
}

pub fn max_asymmetry(p: &ErrorCovariance) -> f64 {
    (p - p.transpose()).amax()
}

pub fn min_eigenvalue(p: &ErrorCovariance) -> f64 {
    symmetrize(p).symmetric_eigenvalues().min()
}

/// Verify symmetry and positive semi-definiteness.
///
/// `tolerance` is relative to `max(1, |trace P|)`.
pub fn verify(p: &ErrorCovariance, tolerance: f64) -> Result<()> {
    if p.iter().any(|x| !x.is_finite()) {
        return Err(FilterError::NonFinite("covariance".to_string()));
    }
    let bound = tolerance * p.trace().abs().max(1.0);

    let max_asymmetry = max_asymmetry(p);
    if max_asymmetry > bound {
        return Err(FilterError::CovarianceAsymmetric { max_asymmetry });
    }

    let min_eigenvalue = min_eigenvalue(p);
    if min_eigenvalue < -bound {
        return Err(FilterError::CovarianceNotPsd { min_eigenvalue });
    }
    Ok(())
}
