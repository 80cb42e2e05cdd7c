//! Recorded sensor logs
//!
//! One JSON document (optionally gzipped) per run:
//!
//! ```text
//! { "gt":    { "p": [[x,y,z],..], "v": [..], "r": [[roll,pitch,yaw],..], "_t": [s,..] },
//!   "imu_f": { "data": [[fx,fy,fz],..], "t": [s,..] },
//!   "imu_w": { "data": [..], "t": [..] },
//!   "gnss":  { "data": [..], "t": [..] },
//!   "lidar": { "data": [..], "t": [..] } }
//! ```
//!
//! Times are seconds. LIDAR positions are still in the LIDAR frame.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::Context;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::error::{FilterError, Result};
use crate::filters::state::NominalState;
use crate::rotations::Quaternion;
use crate::types::{ErrorCovariance, InertialSample, PositionMeasurement, SensorSource, Timestamp};

/// Time-stamped 3-vectors
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StampedData {
    pub data: Vec<[f64; 3]>,
    /// Seconds
    pub t: Vec<f64>,
}

impl StampedData {
    pub fn len(&self) -> usize {
        self.t.len()
    }

    pub fn is_empty(&self) -> bool {
        self.t.is_empty()
    }

    pub fn timestamps(&self) -> Vec<Timestamp> {
        self.t.iter().map(|&s| Timestamp::from_secs_f64(s)).collect()
    }

    fn validate(&self, what: &str) -> Result<()> {
        if self.data.len() != self.t.len() {
            return Err(FilterError::StreamLengthMismatch {
                what: format!("{what} data/t"),
                left: self.data.len(),
                right: self.t.len(),
            });
        }
        if self.data.iter().flatten().chain(self.t.iter()).any(|x| !x.is_finite()) {
            return Err(FilterError::NonFinite(what.to_string()));
        }
        Ok(())
    }

    fn measurements(&self, source: SensorSource) -> Vec<PositionMeasurement> {
        self.data
            .iter()
            .zip(&self.t)
            .map(|(d, &t)| PositionMeasurement::new(Timestamp::from_secs_f64(t), Vector3::from(*d), source))
            .collect()
    }
}

/// Reference trajectory in the navigation frame
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GroundTruth {
    pub p: Vec<[f64; 3]>,
    pub v: Vec<[f64; 3]>,
    /// XYZ Euler angles [rad]
    pub r: Vec<[f64; 3]>,
    /// Seconds
    #[serde(rename = "_t")]
    pub t: Vec<f64>,
}

impl GroundTruth {
    pub fn len(&self) -> usize {
        self.p.len()
    }

    pub fn is_empty(&self) -> bool {
        self.p.is_empty()
    }

    pub fn position(&self, index: usize) -> Option<Vector3<f64>> {
        self.p.get(index).map(|p| Vector3::from(*p))
    }

    pub fn euler(&self, index: usize) -> Option<Vector3<f64>> {
        self.r.get(index).map(|r| Vector3::from(*r))
    }

    fn validate(&self) -> Result<()> {
        for (what, len) in [("gt v", self.v.len()), ("gt r", self.r.len())] {
            if len != self.p.len() {
                return Err(FilterError::StreamLengthMismatch {
                    what: what.to_string(),
                    left: self.p.len(),
                    right: len,
                });
            }
        }
        // `_t` is only used for plotting and may be absent
        if !self.t.is_empty() && self.t.len() != self.p.len() {
            return Err(FilterError::StreamLengthMismatch {
                what: "gt _t".to_string(),
                left: self.p.len(),
                right: self.t.len(),
            });
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub gt: GroundTruth,
    pub imu_f: StampedData,
    pub imu_w: StampedData,
    #[serde(default)]
    pub gnss: StampedData,
    #[serde(default)]
    pub lidar: StampedData,
}

fn is_gzip(path: &Path) -> bool {
    path.extension().map(|e| e == "gz").unwrap_or(false)
}

impl Dataset {
    /// Load a `.json` or `.json.gz` log
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let file = File::open(path).with_context(|| format!("opening dataset {}", path.display()))?;
        let dataset: Dataset = if is_gzip(path) {
            serde_json::from_reader(BufReader::new(GzDecoder::new(file)))
        } else {
            serde_json::from_reader(BufReader::new(file))
        }
        .with_context(|| format!("parsing dataset {}", path.display()))?;

        dataset
            .validate()
            .with_context(|| format!("validating dataset {}", path.display()))?;
        Ok(dataset)
    }

    /// Write as JSON, gzipped when the path ends in `.gz`
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
        if is_gzip(path) {
            let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
            serde_json::to_writer(&mut encoder, self)?;
            encoder.finish()?.flush()?;
        } else {
            let mut writer = BufWriter::new(file);
            serde_json::to_writer(&mut writer, self)?;
            writer.flush()?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.gt.validate()?;
        self.imu_f.validate("imu_f")?;
        self.imu_w.validate("imu_w")?;
        self.gnss.validate("gnss")?;
        self.lidar.validate("lidar")?;
        Ok(())
    }

    /// Pair specific force and angular rate readings sample by sample.
    pub fn inertial_samples(&self) -> Result<Vec<InertialSample>> {
        self.validate()?;
        if self.imu_f.len() != self.imu_w.len() {
            return Err(FilterError::StreamLengthMismatch {
                what: "imu_f/imu_w".to_string(),
                left: self.imu_f.len(),
                right: self.imu_w.len(),
            });
        }

        self.imu_f
            .timestamps()
            .into_iter()
            .zip(self.imu_w.timestamps())
            .zip(self.imu_f.data.iter().zip(&self.imu_w.data))
            .enumerate()
            .map(|(index, ((tf, tw), (f, w)))| {
                if tf != tw {
                    return Err(FilterError::InvalidInput(format!(
                        "imu_f and imu_w disagree at sample {index}: {tf} vs {tw}"
                    )));
                }
                Ok(InertialSample::new(tf, Vector3::from(*f), Vector3::from(*w)))
            })
            .collect()
    }

    pub fn gnss_measurements(&self) -> Vec<PositionMeasurement> {
        self.gnss.measurements(SensorSource::Gnss)
    }

    /// LIDAR positions as recorded, before the extrinsic transform
    pub fn lidar_measurements(&self) -> Vec<PositionMeasurement> {
        self.lidar.measurements(SensorSource::Lidar)
    }

    /// Seed from the first ground-truth pose with zero uncertainty
    pub fn initial_state(&self) -> Result<(NominalState, ErrorCovariance)> {
        let (p, v, r) = match (self.gt.p.first(), self.gt.v.first(), self.gt.r.first()) {
            (Some(p), Some(v), Some(r)) => (p, v, r),
            _ => return Err(FilterError::EmptyStream("ground truth".to_string())),
        };
        let state = NominalState::new(
            Vector3::from(*p),
            Vector3::from(*v),
            Quaternion::from_euler(r[0], r[1], r[2]),
        )?;
        Ok((state, ErrorCovariance::zeros()))
    }
}
