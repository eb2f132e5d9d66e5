//! The per-frame animation loop.
//!
//! A [`Driver`] owns a [`CaptureDevice`], a [`LandmarkSource`] and the compositing state, and
//! exposes the loop body as [`Driver::tick`]. The caller decides when ticks run (eg. once per
//! display refresh, or as fast as the camera delivers frames).
//!
//! ```text
//!           enable()              poll_request() = Ok
//!   Idle ─────────────> Requesting ─────────────────────> Running ──┐
//!    ^                      │                               │   ^   │ tick()
//!    │    poll_request()    │                               │   └───┘
//!    ├──────── = Err ───────┘                               │
//!    └────────────────── disable() ─────────────────────────┘
//! ```
//!
//! Ticks are authorized by a [`TickHandle`]. Every handle belongs to one run of the loop; once the
//! stream is torn down, ticks with older handles return [`Tick::Stale`] without doing anything.

use std::{
    task::Poll,
    time::{Duration, Instant},
};

use fastrand::Rng;
use itertools::Itertools;

use crate::{
    canvas::Surface,
    capture::RegionBuffer,
    composite::{draw_connectors, Compositor},
    feature::FeatureId,
    image::{AsImageView, Color, Image, Resolution},
    landmark::{Detection, LandmarkSource, Readiness},
    placement::Placements,
    timer::{FpsCounter, Timer},
    video::{CaptureDevice, CaptureError, MediaStream, StreamConstraints},
};

/// Minimum spacing between two detection timestamps.
const MIN_TIMESTAMP_STEP: Duration = Duration::from_millis(1);

/// Lifecycle state of a [`Driver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// No stream; nothing runs.
    Idle,
    /// A stream was requested and [`Driver::poll_request`] has not seen the outcome yet.
    Requesting,
    /// The stream is live and ticks are processed.
    Running,
}

/// What the driver draws for each detected face.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Effect {
    /// Draws the frame, then a copy of a feature at every [`Placement`].
    ///
    /// [`Placement`]: crate::placement::Placement
    #[default]
    Relocate,

    /// Replaces the output with the bounding box region of `feature` in the first face, magnified
    /// and drawn at the top left corner.
    Isolate { feature: FeatureId, magnification: f32 },
}

/// Configuration of a [`Driver`].
#[derive(Debug, Clone)]
pub struct DriverOptions {
    effect: Effect,
    outline: Option<Color>,
    constraints: StreamConstraints,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            effect: Effect::default(),
            outline: None,
            constraints: StreamConstraints::video(),
        }
    }
}

impl DriverOptions {
    /// Selects the effect to draw. Defaults to [`Effect::Relocate`].
    pub fn effect(self, effect: Effect) -> Self {
        Self { effect, ..self }
    }

    /// Traces the outlines of the tracked features at their detected position in `color`.
    ///
    /// Only used by [`Effect::Relocate`].
    pub fn outline(self, color: Color) -> Self {
        Self {
            outline: Some(color),
            ..self
        }
    }

    /// Sets the constraints to request the video stream with.
    pub fn constraints(self, constraints: StreamConstraints) -> Self {
        Self {
            constraints,
            ..self
        }
    }
}

/// Authorizes one call to [`Driver::tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickHandle {
    generation: u64,
}

/// Outcome of a [`Driver::tick`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum Tick {
    /// The handle belongs to a loop that has been stopped. Do not schedule another tick.
    Stale,
    /// The tick ran; schedule the next one with `next`.
    Continue { next: TickHandle, report: FrameReport },
}

/// Summary of what happened during one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameReport {
    /// Whether the stream delivered a frame.
    pub frame: bool,
    /// Whether the landmark source was ready to process the frame.
    pub detector_ready: bool,
    /// Number of faces detected.
    pub faces: usize,
    /// Number of features drawn.
    pub composited: usize,
    /// Number of features that could not be drawn.
    pub skipped: usize,
}

/// Runs the compositing pipeline on a live video stream.
pub struct Driver<D: CaptureDevice, L: LandmarkSource> {
    device: D,
    source: L,
    options: DriverOptions,
    state: State,
    stream: Option<D::Stream>,
    generation: u64,
    compositor: Compositor,
    placements: Placements,
    epoch: Instant,
    last_timestamp: Option<Duration>,
    fps: FpsCounter,
    t_read: Timer,
    t_detect: Timer,
    t_composite: Timer,
}

impl<D: CaptureDevice, L: LandmarkSource> Driver<D, L> {
    /// Creates an idle driver.
    ///
    /// # Panics
    ///
    /// Panics if [`Effect::Isolate`] is configured with a magnification that is not a positive,
    /// finite number.
    pub fn new(device: D, source: L, options: DriverOptions, placements: Placements) -> Self {
        let buffer = match options.effect {
            Effect::Relocate => RegionBuffer::new(),
            Effect::Isolate { magnification, .. } => {
                RegionBuffer::with_magnification(magnification)
            }
        };
        Self {
            device,
            source,
            options,
            state: State::Idle,
            stream: None,
            generation: 0,
            compositor: Compositor::new(buffer),
            placements,
            epoch: Instant::now(),
            last_timestamp: None,
            fps: FpsCounter::new("driver"),
            t_read: Timer::new("read"),
            t_detect: Timer::new("detect"),
            t_composite: Timer::new("composite"),
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn placements(&self) -> &Placements {
        &self.placements
    }

    pub fn placements_mut(&mut self) -> &mut Placements {
        &mut self.placements
    }

    pub fn source(&self) -> &L {
        &self.source
    }

    pub fn compositor(&self) -> &Compositor {
        &self.compositor
    }

    /// Returns the active stream, if the driver is running.
    pub fn stream(&self) -> Option<&D::Stream> {
        self.stream.as_ref()
    }

    /// Requests a video stream.
    ///
    /// An active stream is stopped first, and ticks of its loop become stale.
    pub fn enable(&mut self) {
        self.teardown();
        log::debug!("requesting stream: {:?}", self.options.constraints);
        self.device.request(&self.options.constraints);
        self.state = State::Requesting;
    }

    /// Checks on the stream request started by [`Driver::enable`].
    ///
    /// Once the device delivers a stream, the driver is [`State::Running`] and the returned handle
    /// starts the loop. If the device refuses, the driver goes back to [`State::Idle`] and the
    /// error is returned; the request is not retried.
    pub fn poll_request(&mut self) -> Poll<Result<TickHandle, CaptureError>> {
        if self.state != State::Requesting {
            return Poll::Ready(Err(CaptureError::NotRequested));
        }

        match self.device.poll_stream() {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(stream)) => {
                self.stream = Some(stream);
                self.generation += 1;
                self.state = State::Running;
                log::debug!("stream started (generation {})", self.generation);
                Poll::Ready(Ok(TickHandle {
                    generation: self.generation,
                }))
            }
            Poll::Ready(Err(e)) => {
                log::error!("stream request failed: {}", e);
                self.state = State::Idle;
                Poll::Ready(Err(e))
            }
        }
    }

    /// Stops the stream and invalidates all outstanding [`TickHandle`]s.
    ///
    /// A stream request that is still pending is cancelled. The device is released by the time
    /// this returns.
    pub fn disable(&mut self) {
        self.teardown();
        self.state = State::Idle;
    }

    /// Enables the driver if it is idle, and disables it otherwise. Returns the new state.
    pub fn toggle(&mut self) -> State {
        match self.state {
            State::Idle => self.enable(),
            State::Requesting | State::Running => self.disable(),
        }
        self.state
    }

    fn teardown(&mut self) {
        if self.state == State::Requesting {
            self.device.cancel();
            log::debug!("stream request cancelled");
        }
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
            log::debug!("stream stopped (generation {})", self.generation);
        }
        self.generation += 1;
    }

    /// Moves every placement to a random position on a `surface`-sized area.
    pub fn randomize_placements(&mut self, rng: &mut Rng, surface: Resolution) {
        self.placements.randomize(rng, surface);
    }

    /// Returns a timestamp for the next detection that is later than all previous ones.
    fn next_timestamp(&mut self) -> Duration {
        let mut ts = self.epoch.elapsed();
        if let Some(last) = self.last_timestamp {
            ts = ts.max(last + MIN_TIMESTAMP_STEP);
        }
        self.last_timestamp = Some(ts);
        ts
    }

    /// Runs one iteration of the loop, drawing into `surface`.
    ///
    /// Reads a frame, runs landmark detection on it and draws the configured effect. If the
    /// landmark source is not ready yet, the surface is left alone and the tick returns right
    /// away. Failures of individual features are logged and counted in the [`FrameReport`].
    pub fn tick<S: Surface + ?Sized>(&mut self, handle: TickHandle, surface: &mut S) -> Tick {
        if self.state != State::Running || handle.generation != self.generation {
            return Tick::Stale;
        }
        let Some(stream) = self.stream.as_mut() else {
            return Tick::Stale;
        };
        if !stream.is_live() {
            log::debug!("stream ended");
            self.disable();
            return Tick::Stale;
        }

        let next = handle;
        let mut report = FrameReport::default();

        let frame = match self.t_read.time(|| stream.read_frame()) {
            Ok(Some(frame)) => frame,
            Ok(None) => return Tick::Continue { next, report },
            Err(e) => {
                log::error!("failed to read frame: {:#}", e);
                return Tick::Continue { next, report };
            }
        };
        report.frame = true;

        if self.source.poll_ready() == Readiness::NotReady {
            log::trace!("landmark source not ready; skipping frame");
            return Tick::Continue { next, report };
        }
        report.detector_ready = true;

        let timestamp = self.next_timestamp();
        let detection = match self.t_detect.time(|| self.source.detect(&frame, timestamp)) {
            Ok(detection) => detection,
            Err(e) => {
                log::error!("landmark detection failed: {:#}", e);
                return Tick::Continue { next, report };
            }
        };
        report.faces = detection.faces.len();

        surface.reset(frame.resolution());
        {
            let _guard = self.t_composite.start();
            match self.options.effect {
                Effect::Relocate => relocate_all(
                    &mut self.compositor,
                    &self.placements,
                    self.options.outline,
                    surface,
                    &frame,
                    &detection,
                    &mut report,
                ),
                Effect::Isolate { feature, .. } => isolate_first(
                    &mut self.compositor,
                    feature,
                    surface,
                    &frame,
                    &detection,
                    &mut report,
                ),
            }
        }

        let stream_timers = self
            .stream
            .as_ref()
            .map(|stream| stream.timers())
            .unwrap_or_default();
        self.fps.tick_with(
            [&self.t_read, &self.t_detect, &self.t_composite]
                .into_iter()
                .chain(stream_timers),
        );
        Tick::Continue { next, report }
    }
}

fn relocate_all<S: Surface + ?Sized>(
    compositor: &mut Compositor,
    placements: &Placements,
    outline: Option<Color>,
    surface: &mut S,
    frame: &Image,
    detection: &Detection,
    report: &mut FrameReport,
) {
    if let Err(e) = surface.draw_image(frame.as_view(), frame.rect(), frame.rect()) {
        log::error!("failed to draw frame: {}", e);
    }

    for face in &detection.faces {
        for placement in placements {
            let res = placement
                .feature
                .definition()
                .resolve(&face.landmarks, frame.resolution())
                .and_then(|points| compositor.relocate(surface, frame, &points, placement));
            match res {
                Ok(()) => report.composited += 1,
                Err(e) => {
                    log::warn!("skipping {}: {}", placement.feature, e);
                    report.skipped += 1;
                }
            }
        }

        if let Some(color) = outline {
            for feature in placements.iter().map(|p| p.feature).unique() {
                if let Err(e) = draw_connectors(surface, feature.definition(), &face.landmarks, color)
                {
                    log::warn!("cannot outline {}: {}", feature, e);
                }
            }
        }
    }
}

fn isolate_first<S: Surface + ?Sized>(
    compositor: &mut Compositor,
    feature: FeatureId,
    surface: &mut S,
    frame: &Image,
    detection: &Detection,
    report: &mut FrameReport,
) {
    let Some(face) = detection.faces.first() else {
        return;
    };
    let res = feature
        .definition()
        .resolve(&face.landmarks, frame.resolution())
        .and_then(|points| compositor.isolate(surface, frame, &points));
    match res {
        Ok(()) => report.composited += 1,
        Err(e) => {
            log::warn!("cannot isolate {}: {}", feature, e);
            report.skipped += 1;
        }
    }
}
