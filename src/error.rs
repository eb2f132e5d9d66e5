use thiserror::Error;

/// Recoverable failures of the per-feature compositing pipeline.
///
/// None of these are fatal: the [`Driver`][crate::driver::Driver] logs them and moves on to the
/// next feature.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// A feature definition references a landmark the detection result does not have.
    ///
    /// This means the landmark source and the feature table disagree (eg. a different model).
    #[error("feature `{feature}` references landmark {index}, but only {len} landmarks are present")]
    IndexOutOfRange {
        feature: &'static str,
        index: usize,
        len: usize,
    },

    /// Bounds were requested for an empty set of points.
    #[error("cannot compute the bounding box of an empty point set")]
    EmptyInput,

    /// A region to capture has zero width or height.
    #[error("region of {width}x{height} pixels is degenerate")]
    DegenerateRegion { width: f32, height: f32 },

    #[error(transparent)]
    Draw(#[from] DrawError),
}

/// Errors reported by [`Surface::draw_image`][crate::canvas::Surface::draw_image].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DrawError {
    #[error("source rectangle of {width}x{height} pixels has no area")]
    EmptySource { width: f32, height: f32 },

    #[error("destination rectangle of {width}x{height} pixels has no area")]
    EmptyDestination { width: f32, height: f32 },
}
