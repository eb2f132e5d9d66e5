//! Landmark-driven eye compositing.
//!
//! `ogle` takes video frames together with the facial landmarks an external face-landmark model
//! produced for them, and uses the landmarks to cut features (eyes, by default) out of the frame
//! and paste them elsewhere: magnified on their own, moved to a new spot, or duplicated all over
//! the picture.
//!
//! # Pipeline
//!
//! For every detected face and every tracked [`Placement`], one frame runs through:
//!
//! 1. [`feature`]: resolve the feature's landmark connectors to pixel coordinates.
//! 2. [`bounds`]: compute the axis-aligned [`BoundingBox`] of those points.
//! 3. [`capture`]: crop and resample that box into a reusable [`RegionBuffer`].
//! 4. [`composite`]: clip the output [`Surface`] to the feature's outline (moved to the
//!    placement) and draw the captured region into it.
//!
//! The [`driver`] module ties this together with a capture device and a landmark source and runs
//! it once per tick.
//!
//! # Environment Variables
//!
//! * `OGLE_WEBCAM_NAME`: Forces the device to use for [`Webcam`]s created without an explicit
//!   device name. If unset, the first device that supports a compatible image format will be used.
//! * `OGLE_JPEG_BACKEND`: Selects the JPEG decoder used for webcam frames. Allowed values are
//!   `zune-jpeg` (the default) and `jpeg-decoder`.
//!
//! [`Placement`]: placement::Placement
//! [`BoundingBox`]: bounds::BoundingBox
//! [`RegionBuffer`]: capture::RegionBuffer
//! [`Surface`]: canvas::Surface
//! [`Webcam`]: video::webcam::Webcam

use log::LevelFilter;

pub mod bounds;
pub mod canvas;
pub mod capture;
pub mod composite;
pub mod contour;
pub mod driver;
pub mod feature;
pub mod image;
pub mod landmark;
pub mod placement;
pub mod rect;
pub mod timer;
pub mod video;

mod error;

pub use error::{DrawError, Error};

/// macro-use only, not part of public API.
#[doc(hidden)]
pub fn init_logger(calling_crate: &'static str) {
    let log_level = LevelFilter::Debug;
    env_logger::Builder::new()
        .filter(Some(calling_crate), log_level)
        .filter(Some(env!("CARGO_PKG_NAME")), log_level)
        .parse_default_env()
        .try_init()
        .ok();
}

/// Initializes logging to *stderr*.
///
/// The calling crate and `ogle` will log at *debug* level. `RUST_LOG` can be used to override
/// this.
///
/// If a global logger is already registered, this macro will do nothing.
#[macro_export]
macro_rules! init_logger {
    () => {
        $crate::init_logger(env!("CARGO_CRATE_NAME"))
    };
}
