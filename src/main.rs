use std::{
    fs,
    path::{Path, PathBuf},
    task::Poll,
    thread,
    time::Duration,
};

use anyhow::{bail, ensure, Context};
use clap::{Args, Parser, Subcommand, ValueEnum};
use fastrand::Rng;
use ogle::{
    canvas::Canvas,
    driver::{Driver, DriverOptions, Effect, FrameReport, Tick, TickHandle},
    feature::FeatureId,
    image::{Color, Image, Resolution},
    landmark::{Detection, FixedSource},
    placement::Placements,
    video::{
        still::StillDevice,
        webcam::{Webcam, WebcamDevice},
        CaptureDevice, StreamConstraints,
    },
};

#[derive(Parser, Debug)]
#[command(name = "ogle")]
#[command(author, version, about = "Landmark-driven eye isolation and relocation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process a single image file
    Still {
        /// Input image (PNG or JPEG)
        image: PathBuf,

        /// Output image (PNG or JPEG)
        #[arg(short, long)]
        output: PathBuf,

        #[command(flatten)]
        common: Common,
    },
    /// Process frames captured from a V4L2 webcam
    Webcam {
        /// Directory to write the processed frames to
        #[arg(long)]
        output_dir: PathBuf,

        /// Number of frames to capture
        #[arg(long, default_value_t = 30)]
        frames: u64,

        /// Name of the webcam to open (default: first supported device)
        #[arg(long)]
        device: Option<String>,

        /// Requested capture width
        #[arg(long, requires = "height")]
        width: Option<u32>,

        /// Requested capture height
        #[arg(long, requires = "width")]
        height: Option<u32>,

        /// Requested frame rate
        #[arg(long)]
        fps: Option<u32>,

        #[command(flatten)]
        common: Common,
    },
}

#[derive(Args, Debug)]
struct Common {
    /// JSON file with the detected landmarks to apply to every frame
    #[arg(long)]
    landmarks: PathBuf,

    /// Effect to draw
    #[arg(long, value_enum, default_value_t = EffectArg::Relocate)]
    effect: EffectArg,

    /// Features to relocate (default: both eyes), or the feature to isolate (default: right eye)
    #[arg(long, value_enum)]
    feature: Vec<FeatureArg>,

    /// Number of copies of each feature to draw
    #[arg(long, default_value_t = 1)]
    copies: usize,

    /// Seed for the random placement of copies
    #[arg(long)]
    seed: Option<u64>,

    /// Magnification factor of the isolated feature
    #[arg(long, default_value_t = 10.0)]
    magnification: f32,

    /// Trace the feature outlines at their detected position
    #[arg(long)]
    outline: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum EffectArg {
    Relocate,
    Isolate,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum FeatureArg {
    Left,
    Right,
}

impl From<FeatureArg> for FeatureId {
    fn from(arg: FeatureArg) -> Self {
        match arg {
            FeatureArg::Left => FeatureId::LeftEye,
            FeatureArg::Right => FeatureId::RightEye,
        }
    }
}

impl Common {
    fn features(&self) -> Vec<FeatureId> {
        if self.feature.is_empty() {
            return FeatureId::ALL.to_vec();
        }
        self.feature.iter().copied().map(FeatureId::from).collect()
    }

    fn driver_options(&self) -> anyhow::Result<DriverOptions> {
        let effect = match self.effect {
            EffectArg::Relocate => Effect::Relocate,
            EffectArg::Isolate => {
                ensure!(
                    self.magnification.is_finite() && self.magnification > 0.0,
                    "magnification must be a positive number (got {})",
                    self.magnification
                );
                let feature = match self.feature[..] {
                    [] => FeatureId::RightEye,
                    [feature] => feature.into(),
                    _ => bail!("`--effect isolate` takes a single `--feature`"),
                };
                Effect::Isolate {
                    feature,
                    magnification: self.magnification,
                }
            }
        };

        let mut options = DriverOptions::default().effect(effect);
        if self.outline {
            options = options.outline(Color::OUTLINE);
        }
        Ok(options)
    }

    fn rng(&self) -> Rng {
        match self.seed {
            Some(seed) => Rng::with_seed(seed),
            None => Rng::new(),
        }
    }
}

fn main() -> anyhow::Result<()> {
    ogle::init_logger!();

    match Cli::parse().command {
        Command::Still {
            image,
            output,
            common,
        } => still(&image, &output, &common),
        Command::Webcam {
            output_dir,
            frames,
            device,
            width,
            height,
            fps,
            common,
        } => {
            let mut constraints = StreamConstraints::video();
            if let (Some(w), Some(h)) = (width, height) {
                constraints = constraints.resolution(Resolution::new(w, h));
            }
            if let Some(fps) = fps {
                constraints = constraints.fps(fps);
            }
            let device = match device {
                Some(name) => WebcamDevice::with_name(name),
                None => WebcamDevice::new(),
            };
            webcam(device, constraints, &output_dir, frames, &common)
        }
    }
}

fn driver<D: CaptureDevice>(
    device: D,
    options: DriverOptions,
    common: &Common,
) -> anyhow::Result<Driver<D, FixedSource>> {
    let detection = Detection::load(&common.landmarks)?;
    log::info!(
        "loaded {} face(s) from '{}'",
        detection.faces.len(),
        common.landmarks.display()
    );

    let placements = Placements::copies(&common.features(), common.copies);
    Ok(Driver::new(
        device,
        FixedSource::new(detection),
        options,
        placements,
    ))
}

/// Enables `driver` and waits for the device to hand out a stream.
fn start<D: CaptureDevice>(driver: &mut Driver<D, FixedSource>) -> anyhow::Result<TickHandle> {
    driver.enable();
    loop {
        match driver.poll_request() {
            Poll::Ready(res) => return Ok(res?),
            Poll::Pending => thread::sleep(Duration::from_millis(5)),
        }
    }
}

fn log_report(frame: u64, report: &FrameReport) {
    log::info!(
        "frame {}: {} face(s), {} feature(s) drawn, {} skipped",
        frame,
        report.faces,
        report.composited,
        report.skipped,
    );
}

fn still(input: &Path, output: &Path, common: &Common) -> anyhow::Result<()> {
    let image = Image::load(input)?;
    let res = image.resolution();
    let mut driver = driver(StillDevice::new(image), common.driver_options()?, common)?;
    driver.randomize_placements(&mut common.rng(), res);

    let handle = start(&mut driver)?;
    let mut canvas = Canvas::new(res);
    match driver.tick(handle, &mut canvas) {
        Tick::Continue { report, .. } => log_report(0, &report),
        Tick::Stale => bail!("stream ended before the first frame"),
    }
    driver.disable();

    canvas.image().save(output)?;
    log::info!("wrote {}", output.display());
    Ok(())
}

fn webcam(
    device: WebcamDevice,
    constraints: StreamConstraints,
    output_dir: &Path,
    frames: u64,
    common: &Common,
) -> anyhow::Result<()> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create '{}'", output_dir.display()))?;

    let options = common.driver_options()?.constraints(constraints);
    let mut driver = driver(device, options, common)?;
    let mut handle = start(&mut driver)?;

    let res = driver
        .stream()
        .map(Webcam::resolution)
        .unwrap_or(Resolution::VGA);
    driver.randomize_placements(&mut common.rng(), res);

    let mut canvas = Canvas::new(res);
    for i in 0..frames {
        match driver.tick(handle, &mut canvas) {
            Tick::Continue { next, report } => {
                handle = next;
                log_report(i, &report);
                if report.detector_ready {
                    let path = output_dir.join(format!("frame-{i:05}.png"));
                    canvas.image().save(&path)?;
                }
            }
            Tick::Stale => {
                log::warn!("stream ended after {} frame(s)", i);
                break;
            }
        }
    }
    driver.disable();

    log::info!(
        "done; region buffer was reallocated {} time(s)",
        driver.compositor().buffer().reallocations()
    );
    Ok(())
}
