//! A capture device that streams a single still image.

use std::task::Poll;

use super::{CaptureDevice, CaptureError, MediaStream, StreamConstraints};
use crate::image::Image;

/// A [`CaptureDevice`] whose streams repeat one image forever.
///
/// Useful for running the pipeline on photos, and for testing.
#[derive(Debug, Clone)]
pub struct StillDevice {
    image: Image,
    requested: bool,
}

impl StillDevice {
    pub fn new(image: Image) -> Self {
        Self {
            image,
            requested: false,
        }
    }
}

impl CaptureDevice for StillDevice {
    type Stream = StillStream;

    fn request(&mut self, constraints: &StreamConstraints) {
        if constraints.video.resolution.is_some() {
            log::debug!(
                "still image is {}; ignoring requested resolution",
                self.image.resolution()
            );
        }
        self.requested = true;
    }

    fn poll_stream(&mut self) -> Poll<Result<StillStream, CaptureError>> {
        if !self.requested {
            return Poll::Ready(Err(CaptureError::NotRequested));
        }
        self.requested = false;
        Poll::Ready(Ok(StillStream {
            image: Some(self.image.clone()),
            frames: 0,
        }))
    }

    fn cancel(&mut self) {
        self.requested = false;
    }
}

/// Stream produced by [`StillDevice`].
#[derive(Debug)]
pub struct StillStream {
    image: Option<Image>,
    frames: u64,
}

impl StillStream {
    /// Returns the number of frames read so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl MediaStream for StillStream {
    fn read_frame(&mut self) -> anyhow::Result<Option<Image>> {
        let frame = self.image.clone();
        if frame.is_some() {
            self.frames += 1;
        }
        Ok(frame)
    }

    fn stop(&mut self) {
        self.image = None;
    }

    fn is_live(&self) -> bool {
        self.image.is_some()
    }
}
