//! Rotation algebra for the error-state filter
//!
//! Quaternions are scalar-first `(w, x, y, z)` and compose with the Hamilton product.
//! A quaternion `q` maps body-frame vectors into the navigation frame: `v_n = C(q) v_b`.

use std::f64::consts::PI;
use std::ops::Mul;

use nalgebra::{Matrix3, SMatrix, Vector3, Vector4};
use serde::{Deserialize, Serialize};

use crate::error::{FilterError, Result};

/// Below this rotation angle the axis-angle maps switch to series expansions
const SMALL_ANGLE: f64 = 1e-8;

/// Quaternions with a norm below this are treated as malformed
const MIN_NORM: f64 = 1e-12;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub w: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::identity()
    }
}

impl Quaternion {
    /// Raw constructor, no normalization
    pub const fn new(w: f64, x: f64, y: f64, z: f64) -> Self {
        Self { w, x, y, z }
    }

    pub const fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 0.0)
    }

    /// Validating constructor: rejects non-finite or zero-norm input and returns a unit quaternion.
    pub fn try_new(w: f64, x: f64, y: f64, z: f64) -> Result<Self> {
        Self::new(w, x, y, z).normalize()
    }

    /// Orientation from XYZ (roll, pitch, yaw) Euler angles in the static frame.
    pub fn from_euler(roll: f64, pitch: f64, yaw: f64) -> Self {
        let (sr, cr) = (roll * 0.5).sin_cos();
        let (sp, cp) = (pitch * 0.5).sin_cos();
        let (sy, cy) = (yaw * 0.5).sin_cos();

        Self::new(
            cr * cp * cy + sr * sp * sy,
            sr * cp * cy - cr * sp * sy,
            cr * sp * cy + sr * cp * sy,
            cr * cp * sy - sr * sp * cy,
        )
    }

    pub fn from_euler_vec(rpy: &Vector3<f64>) -> Self {
        Self::from_euler(rpy.x, rpy.y, rpy.z)
    }

    /// Exponential map of a rotation vector.
    ///
    /// `sin(θ/2)/θ` is replaced by its Taylor expansion near zero so the vector
    /// part never divides by a vanishing norm.
    pub fn from_axis_angle(v: &Vector3<f64>) -> Self {
        let theta = v.norm();
        let half = 0.5 * theta;
        let scale = if theta < SMALL_ANGLE {
            0.5 - theta * theta / 48.0
        } else {
            half.sin() / theta
        };

        Self::new(half.cos(), v.x * scale, v.y * scale, v.z * scale)
    }

    pub fn norm(&self) -> f64 {
        (self.w * self.w + self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn normalize(&self) -> Result<Self> {
        let n = self.norm();
        if !n.is_finite() {
            return Err(FilterError::NonFinite("quaternion".to_string()));
        }
        if n < MIN_NORM {
            return Err(FilterError::ZeroNormQuaternion);
        }
        Ok(Self::new(self.w / n, self.x / n, self.y / n, self.z / n))
    }

    pub fn conjugate(&self) -> Self {
        Self::new(self.w, -self.x, -self.y, -self.z)
    }

    pub fn vector_part(&self) -> Vector3<f64> {
        Vector3::new(self.x, self.y, self.z)
    }

    /// `[w, x, y, z]`
    pub fn to_vector(&self) -> Vector4<f64> {
        Vector4::new(self.w, self.x, self.y, self.z)
    }

    /// World-frame composition `self ⊗ q`, renormalized.
    ///
    /// Applies `self` as a correction expressed in the navigation frame on top of `q`.
    pub fn quat_mult_left(&self, q: &Quaternion) -> Result<Quaternion> {
        (*self * *q).normalize()
    }

    /// Body-frame composition `q ⊗ self`, renormalized.
    ///
    /// Accumulates `self` as an incremental body-frame rotation onto `q`.
    pub fn quat_mult_right(&self, q: &Quaternion) -> Result<Quaternion> {
        (*q * *self).normalize()
    }

    /// Body-to-navigation rotation matrix
    pub fn to_mat(&self) -> Matrix3<f64> {
        let v = self.vector_part();
        Matrix3::identity() * (self.w * self.w - v.dot(&v))
            + 2.0 * v * v.transpose()
            + 2.0 * self.w * skew_symmetric(&v)
    }

    /// (roll, pitch, yaw)
    pub fn to_euler(&self) -> Vector3<f64> {
        let (w, x, y, z) = (self.w, self.x, self.y, self.z);
        let roll = (2.0 * (w * x + y * z)).atan2(1.0 - 2.0 * (x * x + y * y));
        let pitch = (2.0 * (w * y - z * x)).clamp(-1.0, 1.0).asin();
        let yaw = (2.0 * (w * z + x * y)).atan2(1.0 - 2.0 * (y * y + z * z));
        Vector3::new(roll, pitch, yaw)
    }

    /// Logarithm map: rotation vector with angle in [0, π].
    pub fn to_axis_angle(&self) -> Result<Vector3<f64>> {
        let q = self.normalize()?;
        // q and -q are the same rotation; pick the short way round
        let (w, xyz) = if q.w < 0.0 {
            (-q.w, -q.vector_part())
        } else {
            (q.w, q.vector_part())
        };

        let n = xyz.norm();
        if n < SMALL_ANGLE {
            return Ok(xyz * (2.0 / w));
        }
        let theta = 2.0 * n.atan2(w);
        Ok(xyz * (theta / n))
    }
}

/// Hamilton product `self ⊗ rhs` (not normalized)
impl Mul for Quaternion {
    type Output = Quaternion;

    fn mul(self, rhs: Quaternion) -> Quaternion {
        let v1 = self.vector_part();
        let v2 = rhs.vector_part();
        let w = self.w * rhs.w - v1.dot(&v2);
        let v = self.w * v2 + rhs.w * v1 + v1.cross(&v2);
        Quaternion::new(w, v.x, v.y, v.z)
    }
}

/// Skew-symmetric matrix for cross product: `skew(a) * b = a × b`
pub fn skew_symmetric(v: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(
        0.0, -v.z, v.y,
        v.z, 0.0, -v.x,
        -v.y, v.x, 0.0,
    )
}

/// First-order Jacobian of RPY Euler angles with respect to an axis-angle vector.
///
/// Used to project the small-angle orientation covariance into roll/pitch/yaw for
/// reporting. At the zero rotation the Jacobian is the identity. The pitch row is
/// undefined once `|a_y| >= 1`.
pub fn rpy_jacobian_axis_angle(a: &Vector3<f64>) -> Matrix3<f64> {
    let na = a.norm();
    if na < SMALL_ANGLE {
        return Matrix3::identity();
    }
    let na3 = na * na * na;
    let t = na;
    let u = a / t;

    // d(rpy) / d(u, t)
    let d0 = t * t * u.x * u.x + 1.0;
    let d1 = (1.0 - t * t * u.y * u.y).sqrt();
    let d2 = t * t * u.z * u.z + 1.0;
    #[rustfmt::skip]
    let jr = SMatrix::<f64, 3, 4>::new(
        t / d0, 0.0, 0.0, u.x / d0,
        0.0, t / d1, 0.0, u.y / d1,
        0.0, 0.0, t / d2, u.z / d2,
    );

    // d(u, t) / d(a)
    #[rustfmt::skip]
    let ja = SMatrix::<f64, 4, 3>::new(
        (a.y * a.y + a.z * a.z) / na3, -(a.x * a.y) / na3, -(a.x * a.z) / na3,
        -(a.x * a.y) / na3, (a.x * a.x + a.z * a.z) / na3, -(a.y * a.z) / na3,
        -(a.x * a.z) / na3, -(a.y * a.z) / na3, (a.x * a.x + a.y * a.y) / na3,
        a.x / na, a.y / na, a.z / na,
    );

    jr * ja
}

/// Wrap an angle to (-π, π]
pub fn angle_normalize(a: f64) -> f64 {
    let wrapped = a.rem_euclid(2.0 * PI);
    if wrapped > PI {
        wrapped - 2.0 * PI
    } else {
        wrapped
    }
}

pub fn angle_normalize_vec(v: &Vector3<f64>) -> Vector3<f64> {
    v.map(angle_normalize)
}
