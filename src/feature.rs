//! Facial feature definitions and their resolution to pixel coordinates.
//!
//! Feature tables use the landmark topology of MediaPipe's Face Mesh (468 or 478 landmarks). Like
//! MediaPipe, "left" and "right" are from the subject's point of view.

use std::fmt;

use nalgebra::Point2;

use crate::{image::Resolution, landmark::Landmarks, Error};

/// A landmark in pixel coordinates of a specific frame.
pub type PixelPoint = Point2<f32>;

/// A line segment between two landmarks, given as landmark indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connector {
    pub start: usize,
    pub end: usize,
}

const fn c(start: usize, end: usize) -> Connector {
    Connector { start, end }
}

/// An ordered list of connectors outlining a named facial feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureDefinition {
    name: &'static str,
    connectors: &'static [Connector],
}

/// Outline of the right eye.
///
/// Lower lid from the outer corner inwards, then upper lid from the outer corner inwards.
pub const RIGHT_EYE: FeatureDefinition = FeatureDefinition {
    name: "right eye",
    connectors: &[
        c(263, 249),
        c(249, 390),
        c(390, 373),
        c(373, 374),
        c(374, 380),
        c(380, 381),
        c(381, 382),
        c(382, 362),
        c(263, 466),
        c(466, 388),
        c(388, 387),
        c(387, 386),
        c(386, 385),
        c(385, 384),
        c(384, 398),
        c(398, 362),
    ],
};

/// Outline of the left eye.
///
/// Same structure as [`RIGHT_EYE`].
pub const LEFT_EYE: FeatureDefinition = FeatureDefinition {
    name: "left eye",
    connectors: &[
        c(33, 7),
        c(7, 163),
        c(163, 144),
        c(144, 145),
        c(145, 153),
        c(153, 154),
        c(154, 155),
        c(155, 133),
        c(33, 246),
        c(246, 161),
        c(161, 160),
        c(160, 159),
        c(159, 158),
        c(158, 157),
        c(157, 173),
        c(173, 133),
    ],
};

impl FeatureDefinition {
    pub const fn new(name: &'static str, connectors: &'static [Connector]) -> Self {
        Self { name, connectors }
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub fn connectors(&self) -> &'static [Connector] {
        self.connectors
    }

    /// Returns the highest landmark index referenced by any connector.
    pub fn max_index(&self) -> Option<usize> {
        self.connectors.iter().map(|c| c.start.max(c.end)).max()
    }

    /// Resolves the start point of every connector to pixel coordinates of a `frame`-sized image.
    ///
    /// The returned points are in connector order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfRange`] if a connector references a landmark that `landmarks`
    /// does not contain.
    pub fn resolve(
        &self,
        landmarks: &Landmarks,
        frame: Resolution,
    ) -> Result<Vec<PixelPoint>, Error> {
        let (w, h) = (frame.width() as f32, frame.height() as f32);
        self.connectors
            .iter()
            .map(|connector| {
                let lm = landmarks
                    .get(connector.start)
                    .ok_or(Error::IndexOutOfRange {
                        feature: self.name,
                        index: connector.start,
                        len: landmarks.len(),
                    })?;
                Ok(PixelPoint::new(lm.x * w, lm.y * h))
            })
            .collect()
    }

    /// Resolves both endpoints of every connector, for stroking the outline.
    pub(crate) fn resolve_segments(
        &self,
        landmarks: &Landmarks,
        frame: Resolution,
    ) -> Result<Vec<(PixelPoint, PixelPoint)>, Error> {
        let (w, h) = (frame.width() as f32, frame.height() as f32);
        let point = |index: usize| {
            landmarks
                .get(index)
                .map(|lm| PixelPoint::new(lm.x * w, lm.y * h))
                .ok_or(Error::IndexOutOfRange {
                    feature: self.name,
                    index,
                    len: landmarks.len(),
                })
        };
        self.connectors
            .iter()
            .map(|c| Ok((point(c.start)?, point(c.end)?)))
            .collect()
    }
}

/// Names one of the built-in feature definitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureId {
    LeftEye,
    RightEye,
}

impl FeatureId {
    pub const ALL: [Self; 2] = [Self::LeftEye, Self::RightEye];

    pub fn definition(self) -> &'static FeatureDefinition {
        match self {
            Self::LeftEye => &LEFT_EYE,
            Self::RightEye => &RIGHT_EYE,
        }
    }
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.definition().name())
    }
}

#[cfg(test)]
mod tests {
    use crate::landmark::Landmark;

    use super::*;

    fn face_mesh(f: impl Fn(usize) -> Landmark) -> Landmarks {
        (0..468).map(f).collect()
    }

    #[test]
    fn eye_tables() {
        for def in [LEFT_EYE, RIGHT_EYE] {
            assert_eq!(def.connectors().len(), 16);
            assert!(def.max_index().unwrap() < 468);

            // Both halves start at the same corner and end at the other one.
            let (lower, upper) = def.connectors().split_at(8);
            assert_eq!(lower[0].start, upper[0].start);
            assert_eq!(lower[7].end, upper[7].end);
            for half in [lower, upper] {
                for pair in half.windows(2) {
                    assert_eq!(pair[0].end, pair[1].start);
                }
            }
        }
    }

    #[test]
    fn resolve_scales_by_frame_size() {
        let landmarks = face_mesh(|_| Landmark::new(0.5, 0.5));
        let points = LEFT_EYE
            .resolve(&landmarks, Resolution::VGA)
            .unwrap();
        assert_eq!(points.len(), 16);
        assert!(points.iter().all(|p| *p == PixelPoint::new(320.0, 240.0)));
    }

    #[test]
    fn resolve_uses_connector_starts_in_order() {
        let landmarks = face_mesh(|i| Landmark::new(i as f32 / 1000.0, 0.0));
        let points = RIGHT_EYE
            .resolve(&landmarks, Resolution::new(1000, 1))
            .unwrap();
        let indices = points.iter().map(|p| p.x.round() as usize).collect::<Vec<_>>();
        assert_eq!(
            indices,
            [263, 249, 390, 373, 374, 380, 381, 382, 263, 466, 388, 387, 386, 385, 384, 398]
        );
    }

    #[test]
    fn resolve_rejects_short_landmark_lists() {
        let landmarks = (0..300).map(|_| Landmark::new(0.0, 0.0)).collect();
        assert_eq!(
            RIGHT_EYE.resolve(&landmarks, Resolution::VGA),
            Err(Error::IndexOutOfRange {
                feature: "right eye",
                index: 390,
                len: 300,
            })
        );
        assert!(LEFT_EYE.resolve(&landmarks, Resolution::VGA).is_ok());
        assert!(LEFT_EYE
            .resolve(&Landmarks::default(), Resolution::VGA)
            .is_err());
    }

    #[test]
    fn segments() {
        let landmarks = face_mesh(|i| Landmark::new(i as f32 / 1000.0, 0.0));
        let segments = LEFT_EYE
            .resolve_segments(&landmarks, Resolution::new(1000, 1))
            .unwrap();
        assert_eq!(segments.len(), 16);
        assert_eq!(segments[0].0.x.round(), 33.0);
        assert_eq!(segments[0].1.x.round(), 7.0);
    }
}
