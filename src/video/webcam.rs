//! V4L2 webcam access.
//!
//! Only V4L2 `VIDEO_CAPTURE` devices yielding JFIF JPEG or Motion JPEG frames are supported.

use std::{cmp::Reverse, env, io, task::Poll};

use anyhow::bail;
use linuxvideo::{
    format::{FrameIntervals, FrameSizes, PixFormat, PixelFormat},
    stream::ReadStream,
    BufType, CapabilityFlags, Device, Fract,
};

use super::{CaptureDevice, CaptureError, MediaStream, StreamConstraints};
use crate::image::{Image, Resolution};
use crate::timer::Timer;

const ENV_VAR_WEBCAM_NAME: &str = "OGLE_WEBCAM_NAME";

/// Format negotiation options.
#[derive(Debug, Default, Clone)]
pub struct WebcamOptions {
    name: Option<String>,
    prefs: FramePrefs,
}

#[derive(Debug, Default, Clone, Copy)]
struct FramePrefs {
    resolution: Option<Resolution>,
    fps: Option<u32>,
}

impl WebcamOptions {
    /// Translates stream constraints into webcam options.
    pub fn from_constraints(constraints: &StreamConstraints) -> Self {
        Self {
            name: None,
            prefs: FramePrefs {
                resolution: constraints.video.resolution,
                fps: constraints.video.fps,
            },
        }
    }

    /// Sets the name of the webcam device to open.
    ///
    /// If no webcam with the given name can be found, opening the webcam will result in an error.
    #[inline]
    pub fn name(self, name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..self
        }
    }

    /// Sets the desired image resolution.
    ///
    /// A lower resolution might be selected if the webcam cannot deliver the desired resolution.
    #[inline]
    pub fn resolution(mut self, resolution: Resolution) -> Self {
        self.prefs.resolution = Some(resolution);
        self
    }

    /// Sets the desired frame rate.
    ///
    /// A lower frame rate might be selected if the webcam cannot deliver it.
    #[inline]
    pub fn fps(mut self, fps: u32) -> Self {
        self.prefs.fps = Some(fps);
        self
    }
}

#[derive(Clone, Copy)]
struct FrameFormat {
    resolution: Resolution,
    frame_interval: Fract,
}

impl FrameFormat {
    fn satisfies(&self, prefs: FramePrefs) -> bool {
        let res_ok = prefs.resolution.map_or(true, |res| {
            self.resolution.width() >= res.width() && self.resolution.height() >= res.height()
        });
        let fps_ok = prefs
            .fps
            .map_or(true, |fps| (1.0 / self.frame_interval.as_f32()).round() >= fps as f32);
        res_ok && fps_ok
    }
}

/// Enumerates the discrete frame sizes and rates `device` supports for `pixel_format`.
fn frame_formats(device: &Device, pixel_format: PixelFormat) -> anyhow::Result<Vec<FrameFormat>> {
    let sizes = match device.frame_sizes(pixel_format)? {
        FrameSizes::Discrete(sizes) => sizes,
        FrameSizes::Stepwise(_) | FrameSizes::Continuous(_) => {
            bail!("stepwise or continuous resolutions are not supported");
        }
    };

    let mut formats = Vec::new();
    for size in sizes {
        let intervals = match device.frame_intervals(pixel_format, size.width(), size.height())? {
            FrameIntervals::Discrete(intervals) => intervals,
            FrameIntervals::Stepwise(_) | FrameIntervals::Continuous(_) => {
                bail!("stepwise or continuous frame rates are not supported")
            }
        };
        formats.extend(intervals.iter().map(|rate| FrameFormat {
            resolution: Resolution::new(size.width(), size.height()),
            frame_interval: *rate.fract(),
        }));
    }
    Ok(formats)
}

/// Picks the format with the most pixels (and, among those, the highest frame rate) that
/// satisfies `prefs`.
///
/// If nothing does, the frame rate and then the resolution preference are dropped.
fn negotiate_format(device: &Device, mut prefs: FramePrefs) -> anyhow::Result<(PixFormat, Fract)> {
    let mut pixel_format = None;
    for format in device.formats(BufType::VIDEO_CAPTURE) {
        let format = format?;
        if format.pixel_format() == PixelFormat::JPEG || format.pixel_format() == PixelFormat::MJPG {
            pixel_format = Some(format.pixel_format());
            break;
        }
    }
    let Some(pixel_format) = pixel_format else {
        bail!("no supported pixel format found");
    };

    let formats = frame_formats(device, pixel_format)?;
    loop {
        let best = formats
            .iter()
            .filter(|fmt| fmt.satisfies(prefs))
            .max_by_key(|fmt| (fmt.resolution.num_pixels(), Reverse(fmt.frame_interval)));
        if let Some(fmt) = best {
            let pixfmt = PixFormat::new(
                fmt.resolution.width(),
                fmt.resolution.height(),
                pixel_format,
            );
            return Ok((pixfmt, fmt.frame_interval));
        }

        log::debug!("no webcam format matches {:?}", prefs);
        if prefs.fps.take().is_none() && prefs.resolution.take().is_none() {
            break;
        }
    }

    bail!("failed to negotiate a webcam format")
}

/// A V4L2 webcam yielding a stream of [`Image`]s.
pub struct Webcam {
    stream: Option<ReadStream>,
    resolution: Resolution,
    t_dequeue: Timer,
    t_decode: Timer,
}

impl Webcam {
    /// Opens the first supported webcam found.
    ///
    /// This function can block for a significant amount of time while the webcam initializes (on
    /// the order of hundreds of milliseconds).
    pub fn open(options: WebcamOptions) -> Result<Self, CaptureError> {
        if let Ok(name) = env::var(ENV_VAR_WEBCAM_NAME) {
            log::debug!(
                "webcam override: `{}` is set to '{}'",
                ENV_VAR_WEBCAM_NAME,
                name,
            );
        }

        let devices = linuxvideo::list().map_err(|e| {
            CaptureError::DeviceUnavailable(format!("failed to enumerate video devices: {e}"))
        })?;

        let mut denied = None;
        for res in devices {
            match res {
                Ok(dev) => match Self::open_device(dev, &options) {
                    Ok(Some(webcam)) => return Ok(webcam),
                    Ok(None) => {}
                    Err(e) => log::debug!("{:#}", e),
                },
                Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                    log::warn!("{}", e);
                    denied = Some(e.to_string());
                }
                Err(e) => log::warn!("{}", e),
            }
        }

        Err(match denied {
            Some(msg) => CaptureError::PermissionDenied(msg),
            None => CaptureError::DeviceUnavailable("no supported webcam device found".into()),
        })
    }

    fn open_device(dev: Device, options: &WebcamOptions) -> anyhow::Result<Option<Self>> {
        let caps = dev.capabilities()?;
        let name_from_env = env::var(ENV_VAR_WEBCAM_NAME).ok();
        if let Some(name) = options.name.as_deref().or(name_from_env.as_deref()) {
            if caps.card() != name {
                return Ok(None);
            }
        }

        let cap_flags = caps.device_capabilities();
        let path = dev.path()?;
        log::debug!(
            "device {} ({}) capabilities: {:?}",
            caps.card(),
            path.display(),
            cap_flags,
        );
        if !cap_flags.contains(CapabilityFlags::VIDEO_CAPTURE) {
            return Ok(None);
        }

        let (pixfmt, interval) = negotiate_format(&dev, options.prefs)?;
        let capture = dev.video_capture(pixfmt)?;
        let format = capture.format();
        let resolution = Resolution::new(format.width(), format.height());
        let actual = capture.set_frame_interval(interval)?;

        log::info!(
            "opened {} ({}), {} @ {:.1}Hz",
            caps.card(),
            path.display(),
            resolution,
            1.0 / actual.as_f32(),
        );

        Ok(Some(Self {
            stream: Some(capture.into_stream()?),
            resolution,
            t_dequeue: Timer::new("dequeue"),
            t_decode: Timer::new("decode"),
        }))
    }

    /// Returns the negotiated frame size.
    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Reads the next frame from the camera.
    ///
    /// If no frame is available, this method will block until one is. Returns `Ok(None)` once the
    /// webcam has been stopped.
    pub fn read(&mut self) -> anyhow::Result<Option<Image>> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(None);
        };

        let dequeue_guard = self.t_dequeue.start();
        let image = stream.dequeue(|buf| {
            drop(dequeue_guard);
            let image = match self.t_decode.time(|| Image::decode_jpeg(&buf)) {
                Ok(image) => image,
                Err(e) => {
                    // Webcams occasionally produce corrupted MJPG frames. Hand back a blank
                    // image instead of skipping, which would double the latency of this frame.
                    log::error!("webcam decode error: {}", e);
                    Image::new(self.resolution.width(), self.resolution.height())
                }
            };
            Ok(image)
        })?;
        Ok(Some(image))
    }
}

impl MediaStream for Webcam {
    fn read_frame(&mut self) -> anyhow::Result<Option<Image>> {
        self.read()
    }

    fn stop(&mut self) {
        if self.stream.take().is_some() {
            log::debug!("stopped {} webcam stream", self.resolution);
        }
    }

    fn is_live(&self) -> bool {
        self.stream.is_some()
    }

    /// Returns profiling timers for webcam access and decoding.
    fn timers(&self) -> Vec<&Timer> {
        vec![&self.t_dequeue, &self.t_decode]
    }
}

/// A [`CaptureDevice`] that opens V4L2 webcams.
///
/// Requests are served synchronously on the next poll.
#[derive(Debug, Default)]
pub struct WebcamDevice {
    name: Option<String>,
    pending: Option<WebcamOptions>,
}

impl WebcamDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only opens the webcam called `name`.
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            pending: None,
        }
    }
}

impl CaptureDevice for WebcamDevice {
    type Stream = Webcam;

    fn request(&mut self, constraints: &StreamConstraints) {
        let mut options = WebcamOptions::from_constraints(constraints);
        if let Some(name) = &self.name {
            options = options.name(name.clone());
        }
        self.pending = Some(options);
    }

    fn poll_stream(&mut self) -> Poll<Result<Webcam, CaptureError>> {
        match self.pending.take() {
            Some(options) => Poll::Ready(Webcam::open(options)),
            None => Poll::Ready(Err(CaptureError::NotRequested)),
        }
    }

    fn cancel(&mut self) {
        if self.pending.take().is_some() {
            log::debug!("webcam request cancelled");
        }
    }
}
