//! Video capture devices and streams.
//!
//! Capture follows the request/poll model of browser media APIs: a stream is requested from a
//! [`CaptureDevice`] with a set of [`StreamConstraints`], and the request is then polled until the
//! device either hands out a [`MediaStream`] or refuses with a [`CaptureError`].

pub mod still;
pub mod webcam;

use std::task::Poll;

use thiserror::Error;

use crate::{
    image::{Image, Resolution},
    timer::Timer,
};

/// Video parameters to request from a capture device.
///
/// Unset values let the device pick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VideoConstraints {
    pub resolution: Option<Resolution>,
    pub fps: Option<u32>,
}

/// Parameters of a stream request.
///
/// Audio is never requested; the field only exists so that requests are explicit about it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamConstraints {
    pub audio: bool,
    pub video: VideoConstraints,
}

impl StreamConstraints {
    /// Video-only constraints with no further preferences.
    pub fn video() -> Self {
        Self::default()
    }

    pub fn resolution(mut self, resolution: Resolution) -> Self {
        self.video.resolution = Some(resolution);
        self
    }

    pub fn fps(mut self, fps: u32) -> Self {
        self.video.fps = Some(fps);
        self
    }
}

/// Reasons a capture device can refuse a stream request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    /// The user or the operating system did not allow access to the device.
    #[error("permission to access the capture device was denied: {0}")]
    PermissionDenied(String),

    /// The device does not exist, is busy, or cannot satisfy the constraints.
    #[error("capture device unavailable: {0}")]
    DeviceUnavailable(String),

    /// A stream was polled for without being requested first.
    #[error("no stream request is in progress")]
    NotRequested,
}

/// A source of video streams, like a webcam.
pub trait CaptureDevice {
    type Stream: MediaStream;

    /// Starts a request for a stream matching `constraints`.
    ///
    /// Any previous request that has not completed yet is replaced.
    fn request(&mut self, constraints: &StreamConstraints);

    /// Checks whether the outstanding request has completed.
    ///
    /// Returns [`Poll::Ready`] exactly once per request. Must not block for longer than device
    /// initialization takes.
    fn poll_stream(&mut self) -> Poll<Result<Self::Stream, CaptureError>>;

    /// Abandons the outstanding request, if any.
    ///
    /// Afterwards, [`CaptureDevice::poll_stream`] reports [`CaptureError::NotRequested`] until
    /// the next [`CaptureDevice::request`].
    fn cancel(&mut self) {}
}

/// A live stream of video frames.
pub trait MediaStream {
    /// Reads the current frame.
    ///
    /// Returns `Ok(None)` if no frame is available right now (eg. because the stream has been
    /// stopped). Implementations may block until the next frame arrives, which paces the caller to
    /// the device's frame rate.
    fn read_frame(&mut self) -> anyhow::Result<Option<Image>>;

    /// Stops all tracks of the stream and releases the device.
    ///
    /// The device is released by the time this returns. Stopping a stopped stream does nothing.
    fn stop(&mut self);

    /// Returns whether the stream is still delivering frames.
    fn is_live(&self) -> bool;

    /// Returns profiling timers for work done while reading frames.
    fn timers(&self) -> Vec<&Timer> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constraints_never_request_audio() {
        let constraints = StreamConstraints::video()
            .resolution(Resolution::VGA)
            .fps(30);
        assert!(!constraints.audio);
        assert_eq!(constraints.video.resolution, Some(Resolution::VGA));
        assert_eq!(constraints.video.fps, Some(30));
    }
}
