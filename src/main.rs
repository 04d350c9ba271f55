//! Gaze tracker command line tool: pupil detection, offline calibration and
//! replay of recorded eye frames.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use gaze_tracker::{
    calibration::CalibrationDataset,
    calibration_session::reject_outliers,
    clock::{Clock, SystemClock},
    config::{Config, EXAMPLE_CONFIG},
    frame_slot::LatestFrameSlot,
    pipeline::{GazePipeline, PipelineEvent},
    pose_estimation::{parse_marker_line, MarkerPoseEstimator},
    pupil_detection::{LabelFont, PreviewType, PupilDetector},
    settings::Settings,
};
use image::DynamicImage;
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML format)
    #[arg(short = 'C', long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug output
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Detect the pupil in a single eye image
    Detect {
        image: PathBuf,

        /// Write the annotated debug frame here
        #[arg(long)]
        debug_output: Option<PathBuf>,

        /// Debug frame background (color, grayscale, threshold)
        #[arg(long, default_value = "color")]
        preview: String,

        /// TrueType font for the status label on the debug frame
        #[arg(long)]
        label_font: Option<PathBuf>,
    },

    /// Fit a calibration from recorded samples and store the model
    Calibrate {
        /// YAML list of `{screen_point, eye_positions}` samples
        samples: PathBuf,

        /// Settings file receiving the fitted coefficients
        #[arg(short, long, default_value = "settings.yaml")]
        output: PathBuf,

        /// Run outlier rejection on each sample before fitting
        #[arg(long)]
        reject_outliers: bool,
    },

    /// Replay recorded eye frames through the calibrated pipeline
    Track {
        /// Eye frames, processed in order
        #[arg(required = true)]
        frames: Vec<PathBuf>,

        /// Settings file holding a fitted calibration
        #[arg(short, long, default_value = "settings.yaml")]
        settings: PathBuf,

        /// Marker lines (`x1|y1;...;x4|y4` or `none`), one per frame
        #[arg(long)]
        markers: Option<PathBuf>,

        /// Head camera frame size used for marker pose estimation
        #[arg(long, default_value = "640")]
        head_width: u32,

        #[arg(long, default_value = "480")]
        head_height: u32,
    },

    /// Print an example configuration file
    ExampleConfig,
}

fn load_config(path: Option<&Path>) -> Config {
    let Some(path) = path else {
        return Config::default();
    };
    info!("Loading configuration from: {}", path.display());
    match Config::from_file(path).and_then(|c| c.validate().map(|()| c)) {
        Ok(config) => config,
        Err(e) => {
            warn!("Failed to load config file: {}. Using defaults.", e);
            Config::default()
        }
    }
}

fn detect(
    config: &Config,
    image: &Path,
    debug_output: Option<&Path>,
    preview: &str,
    label_font: Option<&Path>,
) -> Result<()> {
    let frame = image::open(image).with_context(|| format!("Failed to open {}", image.display()))?;
    let mut detector = PupilDetector::new(config.detector.clone());
    if let Some(path) = label_font {
        detector.set_label_font(Some(LabelFont::from_file(path)?));
    }

    let detection = if let Some(out) = debug_output {
        detector.set_preview_type(match preview {
            "grayscale" => PreviewType::Grayscale,
            "threshold" => PreviewType::Threshold,
            _ => PreviewType::Color,
        });
        let (detection, debug_frame) = detector.process_frame_debug(&frame);
        debug_frame
            .save(out)
            .with_context(|| format!("Failed to write {}", out.display()))?;
        info!("Debug frame written to {}", out.display());
        detection
    } else {
        detector.process_frame(&frame)
    };

    match detection.pupil() {
        Some(pupil) => println!(
            "{} center=({:.2}, {:.2}) size={:.1}",
            detection.label(),
            pupil.center.x(),
            pupil.center.y(),
            pupil.size
        ),
        None => println!("{}", detection.label()),
    }
    Ok(())
}

fn calibrate(config: &Config, samples: &Path, output: &Path, outliers: bool) -> Result<()> {
    let content =
        std::fs::read_to_string(samples).with_context(|| format!("Failed to read {}", samples.display()))?;
    let mut dataset: CalibrationDataset = serde_yaml::from_str(&content).context("Invalid sample file")?;

    if outliers {
        let k = config.calibration.dist_std_dev_coeff;
        let removed: usize = dataset.iter_mut().map(|s| reject_outliers(&mut s.eye_positions, k)).sum();
        info!("Removed {} outliers", removed);
    }

    let mut calibration = config.calibration.calibration();
    if !calibration.fit(&dataset) {
        bail!("calibration failed");
    }

    let mut settings = if output.exists() {
        Settings::from_file(output)?
    } else {
        Settings::new()
    };
    calibration.save(&mut settings);
    settings.to_file(output)?;
    println!("Calibration written to {}", output.display());
    Ok(())
}

fn read_markers(path: Option<&Path>) -> Result<Vec<String>> {
    let Some(path) = path else {
        return Ok(Vec::new());
    };
    let content = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(content.lines().map(str::to_string).collect())
}

fn track(config: &Config, frames: Vec<PathBuf>, settings: &Path, markers: Option<&Path>, head_size: (u32, u32)) -> Result<()> {
    let mut pipeline = GazePipeline::new(config);
    if settings.exists() {
        pipeline.load_settings(&Settings::from_file(settings)?);
    } else {
        warn!("No settings at {}, running uncalibrated", settings.display());
    }
    pipeline.start_tracking();

    let marker_lines = read_markers(markers)?;
    let estimator = MarkerPoseEstimator::new(head_size.0, head_size.1)?;
    let clock = SystemClock;

    let slot: Arc<LatestFrameSlot<(usize, DynamicImage)>> = Arc::new(LatestFrameSlot::new());
    let producer = {
        let slot = Arc::clone(&slot);
        thread::spawn(move || {
            for (index, path) in frames.iter().enumerate() {
                match image::open(path) {
                    Ok(frame) => {
                        slot.publish((index, frame));
                    }
                    Err(e) => warn!("Skipping {}: {}", path.display(), e),
                }
            }
            slot.close();
        })
    };

    loop {
        let Some((index, frame)) = slot.wait_timeout(Duration::from_millis(100)) else {
            if slot.is_closed() {
                break;
            }
            continue;
        };

        if let Some(line) = marker_lines.get(index) {
            match parse_marker_line(line) {
                Ok(Some(points)) => match estimator.estimate(&points) {
                    Ok(pose) => pipeline.process_head_pose(pose),
                    Err(e) => warn!("Frame {}: {}", index, e),
                },
                Ok(None) => {}
                Err(e) => warn!("Frame {}: {}", index, e),
            }
        }

        for event in pipeline.process_frame(&frame, clock.now()) {
            match event {
                PipelineEvent::Gaze { eye_detected, point } => {
                    println!("{index}: gaze ({:.4}, {:.4}) eye_detected={eye_detected}", point.x(), point.y());
                }
                PipelineEvent::GazeDetectionFailed(message) => println!("{index}: {message}"),
                PipelineEvent::Calibration(e) => println!("{index}: {e:?}"),
            }
        }
    }

    if producer.join().is_err() {
        bail!("frame reader thread panicked");
    }
    info!("Dropped {} frames", slot.dropped_frames());
    Ok(())
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logger
    if args.debug {
        env_logger::init_from_env(env_logger::Env::new().default_filter_or("debug"));
    } else {
        env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    }

    let config = load_config(args.config.as_deref());

    match args.command {
        Command::Detect {
            image,
            debug_output,
            preview,
            label_font,
        } => detect(&config, &image, debug_output.as_deref(), &preview, label_font.as_deref()),
        Command::Calibrate {
            samples,
            output,
            reject_outliers,
        } => calibrate(&config, &samples, &output, reject_outliers),
        Command::Track {
            frames,
            settings,
            markers,
            head_width,
            head_height,
        } => track(&config, frames, &settings, markers.as_deref(), (head_width, head_height)),
        Command::ExampleConfig => {
            print!("{EXAMPLE_CONFIG}");
            Ok(())
        }
    }
}
