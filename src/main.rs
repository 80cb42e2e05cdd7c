use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use nalgebra::Vector3;

use pose_fusion_rs::analysis::ErrorReport;
use pose_fusion_rs::calibration::{Extrinsics, LIDAR_RPY, LIDAR_TRANSLATION};
use pose_fusion_rs::config::{CovarianceUpdate, FilterConfig, Part};
use pose_fusion_rs::dataset::Dataset;
use pose_fusion_rs::filters::EsEkf;
use pose_fusion_rs::submission;

#[derive(Parser, Debug)]
#[command(name = "es_ekf")]
#[command(about = "Error-state EKF: IMU propagation with GNSS/LIDAR position corrections", long_about = None)]
struct Args {
    /// Sensor log (.json or .json.gz)
    #[arg(long)]
    data: PathBuf,

    /// Filter config JSON (overrides the --part noise preset)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Variance preset and submission indices (1, 2 or 3)
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(1..=3))]
    part: u8,

    /// Use the Joseph-form covariance update
    #[arg(long, default_value_t = false)]
    joseph: bool,

    /// Ignore LIDAR fixes
    #[arg(long, default_value_t = false)]
    no_lidar: bool,

    /// Ignore GNSS fixes
    #[arg(long, default_value_t = false)]
    no_gnss: bool,

    /// LIDAR extrinsic roll [rad]
    #[arg(long)]
    extrinsic_roll: Option<f64>,

    /// LIDAR extrinsic pitch [rad]
    #[arg(long)]
    extrinsic_pitch: Option<f64>,

    /// LIDAR extrinsic yaw [rad]
    #[arg(long)]
    extrinsic_yaw: Option<f64>,

    /// Write positions at the part's submission indices
    #[arg(long)]
    submission: Option<PathBuf>,

    /// Write the error-vs-3σ table as CSV
    #[arg(long)]
    errors_csv: Option<PathBuf>,

    /// Write every estimate as JSON
    #[arg(long)]
    trajectory_json: Option<PathBuf>,
}

impl Args {
    fn extrinsics(&self) -> Extrinsics {
        Extrinsics::from_rpy(
            self.extrinsic_roll.unwrap_or(LIDAR_RPY[0]),
            self.extrinsic_pitch.unwrap_or(LIDAR_RPY[1]),
            self.extrinsic_yaw.unwrap_or(LIDAR_RPY[2]),
            Vector3::from(LIDAR_TRANSLATION),
        )
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let part = Part::from_number(args.part).context("part must be 1, 2 or 3")?;
    let mut config = match &args.config {
        Some(path) => FilterConfig::from_json_file(path)?,
        None => FilterConfig::preset(part),
    };
    if args.joseph {
        config.covariance_update = CovarianceUpdate::Joseph;
    }
    log::info!("config: {:?}", config);

    let dataset = Dataset::load(&args.data)?;
    let inertial = dataset.inertial_samples()?;
    let (state, covariance) = dataset.initial_state()?;

    let lidar = if args.no_lidar {
        Vec::new()
    } else {
        args.extrinsics().apply_all(&dataset.lidar_measurements())?
    };
    let gnss = if args.no_gnss {
        Vec::new()
    } else {
        dataset.gnss_measurements()
    };

    let run = EsEkf::run(config, state, covariance, &inertial, &lidar, &gnss)?;

    let report = ErrorReport::compute(&run.trajectory, &dataset.gt)?;
    if !report.is_empty() {
        let inside = report.within_bounds_fraction();
        log::info!(
            "RMS position error {:.3} m; inside 3σ: x {:.1}% y {:.1}% z {:.1}% roll {:.1}% pitch {:.1}% yaw {:.1}%",
            report.rms_position_error(),
            inside[0] * 100.0,
            inside[1] * 100.0,
            inside[2] * 100.0,
            inside[3] * 100.0,
            inside[4] * 100.0,
            inside[5] * 100.0
        );
    }

    if let Some(path) = &args.errors_csv {
        report.write_csv(path)?;
        log::info!("wrote error table to {}", path.display());
    }

    if let Some(path) = &args.trajectory_json {
        let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, &run.trajectory.snapshots())?;
        writer.flush()?;
        log::info!("wrote {} estimates to {}", run.trajectory.len(), path.display());
    }

    if let Some(path) = &args.submission {
        submission::write_submission(path, &run.trajectory, part.submission_indices())?;
    }

    Ok(())
}
