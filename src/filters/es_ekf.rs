//! Error-state EKF driver
//!
//! Walks the inertial stream once: propagate `k-1 -> k`, then apply the LIDAR fix and the GNSS fix
//! whose timestamps equal `t[k]`, in that order. Each position stream is read through its own
//! monotonic cursor.

use crate::config::FilterConfig;
use crate::error::{FilterError, Result};
use crate::filters::correct::correct;
use crate::filters::covariance;
use crate::filters::propagate::propagate;
use crate::filters::state::{Estimate, NominalState, StepPhase, Trajectory};
use crate::types::{ErrorCovariance, InertialSample, PositionMeasurement, SensorSource, Timestamp};

/// Forward-only reader over one sorted position stream
#[derive(Clone, Debug)]
pub struct MeasurementCursor<'a> {
    source: SensorSource,
    measurements: &'a [PositionMeasurement],
    next: usize,
    applied: usize,
    skipped: usize,
}

impl<'a> MeasurementCursor<'a> {
    /// Checks that every entry carries `source` and that timestamps strictly increase.
    pub fn new(source: SensorSource, measurements: &'a [PositionMeasurement]) -> Result<Self> {
        for (index, m) in measurements.iter().enumerate() {
            if m.source != source {
                return Err(FilterError::InvalidInput(format!(
                    "{} stream contains a {} measurement at index {}",
                    source, m.source, index
                )));
            }
            if index == 0 {
                continue;
            }
            let previous = measurements[index - 1].timestamp;
            if m.timestamp == previous {
                return Err(FilterError::DuplicateMeasurement {
                    sensor: source,
                    timestamp: m.timestamp,
                });
            }
            if m.timestamp < previous {
                return Err(FilterError::UnsortedMeasurements { sensor: source, index });
            }
        }

        Ok(Self {
            source,
            measurements,
            next: 0,
            applied: 0,
            skipped: 0,
        })
    }

    pub fn source(&self) -> SensorSource {
        self.source
    }

    /// Measurement stamped exactly `t`, if any.
    ///
    /// Entries older than `t` can never match again and are skipped.
    pub fn take_at(&mut self, t: Timestamp) -> Option<&'a PositionMeasurement> {
        while let Some(m) = self.measurements.get(self.next) {
            if m.timestamp < t {
                log::trace!("{} measurement at {} has no inertial sample", self.source, m.timestamp);
                self.skipped += 1;
                self.next += 1;
            } else if m.timestamp == t {
                self.applied += 1;
                self.next += 1;
                return Some(m);
            } else {
                break;
            }
        }
        None
    }

    /// Count what is left as skipped
    pub fn finish(&mut self) {
        self.skipped += self.measurements.len() - self.next;
        self.next = self.measurements.len();
    }

    pub fn applied(&self) -> usize {
        self.applied
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

/// Counters for one run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunStats {
    pub samples: usize,
    pub lidar_applied: usize,
    pub lidar_skipped: usize,
    pub gnss_applied: usize,
    pub gnss_skipped: usize,
}

/// Output of a whole-stream run
#[derive(Clone, Debug)]
pub struct FilterRun {
    /// One estimate per inertial sample, index-aligned with the input
    pub trajectory: Trajectory,
    pub stats: RunStats,
}

/// Incremental filter: seeded at the first inertial sample, then stepped once per sample.
pub struct EsEkf {
    config: FilterConfig,
    trajectory: Trajectory,
    /// Inertial reading held over the next interval
    previous: InertialSample,
    lidar_updates: usize,
    gnss_updates: usize,
}

impl EsEkf {
    pub fn new(
        config: FilterConfig,
        state: NominalState,
        covariance: ErrorCovariance,
        first_sample: InertialSample,
    ) -> Result<Self> {
        Self::seeded(config, state, covariance, first_sample, 1)
    }

    fn seeded(
        config: FilterConfig,
        state: NominalState,
        covariance: ErrorCovariance,
        first_sample: InertialSample,
        capacity: usize,
    ) -> Result<Self> {
        config.validate()?;
        let state = NominalState::new(state.position, state.velocity, state.orientation)?;
        if config.verify_covariance {
            covariance::verify(&covariance, config.psd_tolerance)?;
        }

        let mut trajectory = Trajectory::with_capacity(capacity);
        trajectory.push(Estimate {
            timestamp: first_sample.timestamp,
            state,
            covariance: covariance::symmetrize(&covariance),
            phase: StepPhase::Initialized,
        });

        Ok(Self {
            config,
            trajectory,
            previous: first_sample,
            lidar_updates: 0,
            gnss_updates: 0,
        })
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    pub fn trajectory(&self) -> &Trajectory {
        &self.trajectory
    }

    pub fn into_trajectory(self) -> Trajectory {
        self.trajectory
    }

    pub fn current(&self) -> &Estimate {
        // never empty: the seed is pushed in `new`
        &self.trajectory.as_slice()[self.trajectory.len() - 1]
    }

    pub fn update_counts(&self) -> (usize, usize) {
        (self.lidar_updates, self.gnss_updates)
    }

    /// Propagate to `sample`, then correct with the fixes stamped at the same instant.
    pub fn step(
        &mut self,
        sample: &InertialSample,
        lidar: Option<&PositionMeasurement>,
        gnss: Option<&PositionMeasurement>,
    ) -> Result<&Estimate> {
        let index = self.trajectory.len();
        let prior = *self.current();
        if sample.timestamp <= prior.timestamp {
            return Err(FilterError::NonMonotonicTimestamp {
                index,
                previous: prior.timestamp,
                current: sample.timestamp,
            });
        }
        check_fix(lidar, SensorSource::Lidar, sample.timestamp)?;
        check_fix(gnss, SensorSource::Gnss, sample.timestamp)?;

        let dt = sample.timestamp.seconds_since(prior.timestamp);
        let (mut state, mut p) = propagate(&prior.state, &prior.covariance, &self.previous, dt, &self.config)?;

        if let Some(m) = lidar {
            let out = correct(&state, &p, m, &self.config)?;
            state = out.state;
            p = out.covariance;
        }
        if let Some(m) = gnss {
            let out = correct(&state, &p, m, &self.config)?;
            state = out.state;
            p = out.covariance;
        }
        // both corrections succeeded
        self.lidar_updates += lidar.is_some() as usize;
        self.gnss_updates += gnss.is_some() as usize;

        let phase = if lidar.is_some() || gnss.is_some() {
            StepPhase::Corrected {
                lidar: lidar.is_some(),
                gnss: gnss.is_some(),
            }
        } else {
            StepPhase::Propagated
        };

        self.trajectory.push(Estimate {
            timestamp: sample.timestamp,
            state,
            covariance: p,
            phase,
        });
        self.previous = *sample;
        Ok(self.current())
    }

    /// Run the full recursion over pre-aligned streams.
    ///
    /// `state`/`covariance` seed index 0 at `inertial[0].timestamp`.
    pub fn run(
        config: FilterConfig,
        state: NominalState,
        covariance: ErrorCovariance,
        inertial: &[InertialSample],
        lidar: &[PositionMeasurement],
        gnss: &[PositionMeasurement],
    ) -> Result<FilterRun> {
        Self::run_inner(config, state, covariance, inertial, lidar, gnss).map_err(|e| {
            log::error!("ES-EKF run aborted: {}", e);
            e
        })
    }

    fn run_inner(
        config: FilterConfig,
        state: NominalState,
        covariance: ErrorCovariance,
        inertial: &[InertialSample],
        lidar: &[PositionMeasurement],
        gnss: &[PositionMeasurement],
    ) -> Result<FilterRun> {
        let first = *inertial
            .first()
            .ok_or_else(|| FilterError::EmptyStream("inertial".to_string()))?;
        validate_inertial(inertial)?;

        let mut lidar_cursor = MeasurementCursor::new(SensorSource::Lidar, lidar)?;
        let mut gnss_cursor = MeasurementCursor::new(SensorSource::Gnss, gnss)?;

        log::info!(
            "ES-EKF run: {} inertial samples, {} LIDAR, {} GNSS, {:?} covariance update",
            inertial.len(),
            lidar.len(),
            gnss.len(),
            config.covariance_update
        );

        let mut filter = EsEkf::seeded(config, state, covariance, first, inertial.len())?;

        for sample in &inertial[1..] {
            let l = lidar_cursor.take_at(sample.timestamp);
            let g = gnss_cursor.take_at(sample.timestamp);
            filter.step(sample, l, g)?;
        }
        lidar_cursor.finish();
        gnss_cursor.finish();

        for cursor in [&lidar_cursor, &gnss_cursor] {
            if cursor.skipped() > 0 {
                log::warn!(
                    "{} of {} {} measurements never matched an inertial timestamp",
                    cursor.skipped(),
                    cursor.applied() + cursor.skipped(),
                    cursor.source()
                );
            }
        }

        let stats = RunStats {
            samples: inertial.len(),
            lidar_applied: lidar_cursor.applied(),
            lidar_skipped: lidar_cursor.skipped(),
            gnss_applied: gnss_cursor.applied(),
            gnss_skipped: gnss_cursor.skipped(),
        };
        let trajectory = filter.into_trajectory();
        if let Some(last) = trajectory.last() {
            let std = last.position_std();
            log::info!(
                "ES-EKF done: {} estimates, {} LIDAR + {} GNSS corrections, final position std ({:.3}, {:.3}, {:.3}) m",
                trajectory.len(),
                stats.lidar_applied,
                stats.gnss_applied,
                std.x,
                std.y,
                std.z
            );
        }

        Ok(FilterRun { trajectory, stats })
    }
}

fn check_fix(fix: Option<&PositionMeasurement>, source: SensorSource, t: Timestamp) -> Result<()> {
    match fix {
        Some(m) if m.source != source => Err(FilterError::InvalidInput(format!(
            "expected a {} measurement, got {}",
            source, m.source
        ))),
        Some(m) if m.timestamp != t => Err(FilterError::InvalidInput(format!(
            "{} measurement at {} applied at inertial sample {}",
            source, m.timestamp, t
        ))),
        _ => Ok(()),
    }
}

/// Strictly increasing timestamps
fn validate_inertial(inertial: &[InertialSample]) -> Result<()> {
    for (index, pair) in inertial.windows(2).enumerate() {
        if pair[1].timestamp <= pair[0].timestamp {
            return Err(FilterError::NonMonotonicTimestamp {
                index: index + 1,
                previous: pair[0].timestamp,
                current: pair[1].timestamp,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NoiseModel;
    use crate::rotations::Quaternion;
    use approx::assert_abs_diff_eq;
    use nalgebra::Vector3;

    const DT_MS: i64 = 100;

    fn hover_stream(n: usize) -> Vec<InertialSample> {
        (0..n)
            .map(|k| {
                InertialSample::new(
                    Timestamp::from_millis(k as i64 * DT_MS),
                    Vector3::new(0.0, 0.0, 9.81),
                    Vector3::zeros(),
                )
            })
            .collect()
    }

    fn at(k: i64) -> Timestamp {
        Timestamp::from_millis(k * DT_MS)
    }

    fn seed() -> (NominalState, ErrorCovariance) {
        (NominalState::at_rest(), ErrorCovariance::identity() * 0.1)
    }

    #[test]
    fn test_cursor_rejects_bad_streams() {
        let dup = [
            PositionMeasurement::gnss(at(1), Vector3::zeros()),
            PositionMeasurement::gnss(at(1), Vector3::zeros()),
        ];
        assert!(matches!(
            MeasurementCursor::new(SensorSource::Gnss, &dup),
            Err(FilterError::DuplicateMeasurement {
                sensor: SensorSource::Gnss,
                ..
            })
        ));

        let unsorted = [
            PositionMeasurement::lidar(at(2), Vector3::zeros()),
            PositionMeasurement::lidar(at(1), Vector3::zeros()),
        ];
        assert_eq!(
            MeasurementCursor::new(SensorSource::Lidar, &unsorted).unwrap_err(),
            FilterError::UnsortedMeasurements {
                sensor: SensorSource::Lidar,
                index: 1
            }
        );

        let mixed = [PositionMeasurement::gnss(at(1), Vector3::zeros())];
        assert!(matches!(
            MeasurementCursor::new(SensorSource::Lidar, &mixed),
            Err(FilterError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_cursor_advances_monotonically() {
        let stream = [
            PositionMeasurement::gnss(Timestamp::from_millis(50), Vector3::zeros()),
            PositionMeasurement::gnss(at(2), Vector3::new(1.0, 0.0, 0.0)),
            PositionMeasurement::gnss(at(5), Vector3::new(2.0, 0.0, 0.0)),
        ];
        let mut cursor = MeasurementCursor::new(SensorSource::Gnss, &stream).unwrap();
        assert!(cursor.take_at(at(1)).is_none());
        assert_eq!(cursor.skipped(), 1);
        assert_eq!(cursor.take_at(at(2)).map(|m| m.position.x), Some(1.0));
        assert!(cursor.take_at(at(2)).is_none());
        assert!(cursor.take_at(at(3)).is_none());
        cursor.finish();
        assert_eq!((cursor.applied(), cursor.skipped()), (1, 2));
    }

    #[test]
    fn test_run_rejects_empty_and_non_monotonic() {
        let (state, p) = seed();
        let err = EsEkf::run(FilterConfig::default(), state, p, &[], &[], &[]).unwrap_err();
        assert_eq!(err, FilterError::EmptyStream("inertial".to_string()));

        let mut stream = hover_stream(5);
        stream[3].timestamp = stream[2].timestamp;
        let err = EsEkf::run(FilterConfig::default(), state, p, &stream, &[], &[]).unwrap_err();
        assert!(matches!(err, FilterError::NonMonotonicTimestamp { index: 3, .. }));
    }

    #[test]
    fn test_single_sample_run_is_the_seed() {
        let (state, p) = seed();
        let run = EsEkf::run(FilterConfig::default(), state, p, &hover_stream(1), &[], &[]).unwrap();
        assert_eq!(run.trajectory.len(), 1);
        let only = run.trajectory.get(0).unwrap();
        assert_eq!(only.phase, StepPhase::Initialized);
        assert_eq!(only.covariance, p);
    }

    #[test]
    fn test_trajectory_is_aligned_with_inertial_clock() {
        let (state, p) = seed();
        let stream = hover_stream(20);
        let gnss = [PositionMeasurement::gnss(at(7), Vector3::zeros())];
        let run = EsEkf::run(FilterConfig::default(), state, p, &stream, &[], &gnss).unwrap();
        assert_eq!(run.trajectory.len(), stream.len());
        for (estimate, sample) in run.trajectory.iter().zip(&stream) {
            assert_eq!(estimate.timestamp, sample.timestamp);
        }
        assert_eq!(
            run.trajectory.get(7).unwrap().phase,
            StepPhase::Corrected {
                lidar: false,
                gnss: true
            }
        );
        assert_eq!(run.trajectory.get(8).unwrap().phase, StepPhase::Propagated);
        assert_eq!(run.stats.gnss_applied, 1);
    }

    #[test]
    fn test_lidar_applied_before_gnss() {
        let (state, p) = seed();
        let stream = hover_stream(3);
        let config = FilterConfig::default();
        let lidar = PositionMeasurement::lidar(at(2), Vector3::new(1.0, 0.0, 0.0));
        let gnss = PositionMeasurement::gnss(at(2), Vector3::new(0.0, 1.0, 0.0));
        let run = EsEkf::run(config, state, p, &stream, &[lidar], &[gnss]).unwrap();

        // replay the same steps by hand
        let mut filter = EsEkf::new(config, state, p, stream[0]).unwrap();
        filter.step(&stream[1], None, None).unwrap();
        let prior = *filter.current();
        let (predicted, predicted_p) =
            propagate(&prior.state, &prior.covariance, &stream[1], 0.1, &config).unwrap();
        let after_lidar = correct(&predicted, &predicted_p, &lidar, &config).unwrap();
        let after_gnss = correct(&after_lidar.state, &after_lidar.covariance, &gnss, &config).unwrap();

        let last = run.trajectory.last().unwrap();
        assert_eq!(last.state, after_gnss.state);
        assert_eq!(last.covariance, after_gnss.covariance);
    }

    #[test]
    fn test_failed_gnss_correction_leaves_filter_unchanged() {
        let config = FilterConfig::default().with_noise(NoiseModel {
            var_gnss: 0.0,
            ..NoiseModel::default()
        });
        let stream = hover_stream(2);
        let mut filter = EsEkf::new(config, NominalState::at_rest(), ErrorCovariance::zeros(), stream[0]).unwrap();
        let lidar = PositionMeasurement::lidar(at(1), Vector3::new(1.0, 0.0, 0.0));
        let gnss = PositionMeasurement::gnss(at(1), Vector3::zeros());

        // zero position variance and a noiseless GNSS fix give a singular S after LIDAR succeeds
        let err = filter.step(&stream[1], Some(&lidar), Some(&gnss)).unwrap_err();
        assert!(matches!(
            err,
            FilterError::SingularInnovation {
                sensor: SensorSource::Gnss,
                ..
            }
        ));
        assert_eq!(filter.update_counts(), (0, 0));
        assert_eq!(filter.trajectory().len(), 1);

        filter.step(&stream[1], Some(&lidar), None).unwrap();
        assert_eq!(filter.update_counts(), (1, 0));
        assert_eq!(filter.trajectory().len(), 2);
    }

    #[test]
    fn test_measurement_at_seed_instant_is_skipped() {
        let (state, p) = seed();
        let gnss = [
            PositionMeasurement::gnss(at(0), Vector3::new(5.0, 0.0, 0.0)),
            PositionMeasurement::gnss(Timestamp::from_millis(150), Vector3::new(5.0, 0.0, 0.0)),
            PositionMeasurement::gnss(at(40), Vector3::new(5.0, 0.0, 0.0)),
        ];
        let run = EsEkf::run(FilterConfig::default(), state, p, &hover_stream(10), &[], &gnss).unwrap();
        assert_eq!(run.stats.gnss_applied, 0);
        assert_eq!(run.stats.gnss_skipped, 3);
        assert_abs_diff_eq!(run.trajectory.last().unwrap().state.position, Vector3::zeros(), epsilon = 1e-9);
    }

    #[test]
    fn test_step_checks_inputs() {
        let (state, p) = seed();
        let stream = hover_stream(3);
        let mut filter = EsEkf::new(FilterConfig::default(), state, p, stream[1]).unwrap();
        assert!(matches!(
            filter.step(&stream[0], None, None),
            Err(FilterError::NonMonotonicTimestamp { index: 1, .. })
        ));

        let late = PositionMeasurement::gnss(at(9), Vector3::zeros());
        assert!(matches!(
            filter.step(&stream[2], None, Some(&late)),
            Err(FilterError::InvalidInput(_))
        ));
        let swapped = PositionMeasurement::gnss(at(2), Vector3::zeros());
        assert!(matches!(
            filter.step(&stream[2], Some(&swapped), None),
            Err(FilterError::InvalidInput(_))
        ));
        // failed steps leave the trajectory untouched
        assert_eq!(filter.trajectory().len(), 1);
        filter.step(&stream[2], None, None).unwrap();
        assert_eq!(filter.trajectory().len(), 2);
    }

    #[test]
    fn test_numerical_failure_aborts_run() {
        let config = FilterConfig::default().with_noise(NoiseModel {
            var_gnss: 0.0,
            var_imu_f: 0.0,
            var_imu_w: 0.0,
            ..NoiseModel::default()
        });
        let gnss = [PositionMeasurement::gnss(at(2), Vector3::zeros())];
        let err = EsEkf::run(
            config,
            NominalState::at_rest(),
            ErrorCovariance::zeros(),
            &hover_stream(5),
            &[],
            &gnss,
        )
        .unwrap_err();
        assert!(err.is_numerical());
    }

    #[test]
    fn test_seed_orientation_is_normalized() {
        let state = NominalState {
            orientation: Quaternion::new(2.0, 0.0, 0.0, 0.0),
            ..NominalState::at_rest()
        };
        let filter = EsEkf::new(FilterConfig::default(), state, ErrorCovariance::zeros(), hover_stream(1)[0]).unwrap();
        assert_eq!(filter.current().state.orientation, Quaternion::identity());
    }
}
