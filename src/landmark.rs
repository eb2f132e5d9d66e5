//! Facial landmark data and the interface to the model producing it.
//!
//! Landmark detection itself happens elsewhere (eg. MediaPipe's Face Landmarker). This module
//! defines what a detection result looks like, the [`LandmarkSource`] trait the pipeline consumes
//! results through, and [`FixedSource`], which replays a recorded result.

use std::{fs, path::Path, time::Duration};

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

use crate::image::Image;

/// A landmark in normalized image coordinates.
///
/// `x` and `y` are in range 0.0 to 1.0 for points inside the frame (points slightly outside the
/// frame are possible and valid). `z` is the depth estimate, which the compositing pipeline does
/// not use.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub z: f32,
}

impl Landmark {
    #[inline]
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y, z: 0.0 }
    }
}

/// The landmarks of a single face, indexed by the model's topology.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Landmarks {
    positions: Vec<Landmark>,
}

impl Landmarks {
    pub fn new(positions: Vec<Landmark>) -> Self {
        Self { positions }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<Landmark> {
        self.positions.get(index).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = Landmark> + Clone + '_ {
        self.positions.iter().copied()
    }

    pub fn positions(&self) -> &[Landmark] {
        &self.positions
    }
}

impl FromIterator<Landmark> for Landmarks {
    fn from_iter<T: IntoIterator<Item = Landmark>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// A facial expression coefficient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Blendshape {
    pub name: String,
    pub score: f32,
}

/// Detection result for a single face.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Face {
    pub landmarks: Landmarks,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blendshapes: Option<Vec<Blendshape>>,
}

impl Face {
    pub fn new(landmarks: Landmarks) -> Self {
        Self {
            landmarks,
            blendshapes: None,
        }
    }

    /// Looks up a blendshape score by name.
    pub fn blendshape(&self, name: &str) -> Option<f32> {
        self.blendshapes
            .as_deref()?
            .iter()
            .find(|b| b.name == name)
            .map(|b| b.score)
    }
}

/// The result of running landmark detection on one frame.
///
/// Serialized as `{"faces": [{"landmarks": [{"x": .., "y": .., "z": ..}, ..]}, ..]}`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Detection {
    #[serde(default)]
    pub faces: Vec<Face>,
}

impl Detection {
    pub fn new(faces: Vec<Face>) -> Self {
        Self { faces }
    }

    /// Parses a detection result from its JSON representation.
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Loads a detection result from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .with_context(|| format!("failed to read landmarks from '{}'", path.display()))?;
        Self::from_json(&json)
            .with_context(|| format!("failed to parse landmarks in '{}'", path.display()))
    }

    pub fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Whether a [`LandmarkSource`] can accept frames yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// The model is still loading. Frames should be skipped, not queued.
    NotReady,
    Ready,
}

/// A face landmark model.
///
/// Implementations typically load their model asynchronously. Callers poll
/// [`LandmarkSource::poll_ready`] each frame and only call [`LandmarkSource::detect`] once it
/// returns [`Readiness::Ready`].
pub trait LandmarkSource {
    /// Checks whether the model has finished loading. Must not block.
    fn poll_ready(&mut self) -> Readiness;

    /// Runs detection on a video frame.
    ///
    /// `timestamp` is the frame's presentation time. It must increase strictly from one call to
    /// the next.
    fn detect(&mut self, frame: &Image, timestamp: Duration) -> anyhow::Result<Detection>;
}

impl<L: LandmarkSource + ?Sized> LandmarkSource for Box<L> {
    fn poll_ready(&mut self) -> Readiness {
        (**self).poll_ready()
    }

    fn detect(&mut self, frame: &Image, timestamp: Duration) -> anyhow::Result<Detection> {
        (**self).detect(frame, timestamp)
    }
}

/// A [`LandmarkSource`] that returns a fixed detection result for every frame.
///
/// Can simulate a model that takes a few frames to load via [`FixedSource::ready_after`]. Like
/// real video-mode models, it rejects timestamps that do not increase.
#[derive(Debug, Clone)]
pub struct FixedSource {
    detection: Detection,
    polls_until_ready: u32,
    last_timestamp: Option<Duration>,
    detections: u64,
}

impl FixedSource {
    pub fn new(detection: Detection) -> Self {
        Self {
            detection,
            polls_until_ready: 0,
            last_timestamp: None,
            detections: 0,
        }
    }

    /// Makes the source report [`Readiness::NotReady`] for the first `polls` calls to
    /// [`LandmarkSource::poll_ready`].
    pub fn ready_after(mut self, polls: u32) -> Self {
        self.polls_until_ready = polls;
        self
    }

    /// Returns the number of successful [`LandmarkSource::detect`] calls.
    pub fn detections(&self) -> u64 {
        self.detections
    }

    pub fn last_timestamp(&self) -> Option<Duration> {
        self.last_timestamp
    }
}

impl LandmarkSource for FixedSource {
    fn poll_ready(&mut self) -> Readiness {
        if self.polls_until_ready == 0 {
            Readiness::Ready
        } else {
            self.polls_until_ready -= 1;
            Readiness::NotReady
        }
    }

    fn detect(&mut self, _frame: &Image, timestamp: Duration) -> anyhow::Result<Detection> {
        if self.polls_until_ready != 0 {
            bail!("`detect` called before the landmark source was ready");
        }
        if let Some(last) = self.last_timestamp {
            if timestamp <= last {
                bail!("non-increasing frame timestamp {timestamp:?} (previous was {last:?})");
            }
        }

        self.last_timestamp = Some(timestamp);
        self.detections += 1;
        Ok(self.detection.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_detection() {
        let detection = Detection::from_json(
            r#"{
                "faces": [{
                    "landmarks": [{"x": 0.25, "y": 0.5, "z": -0.01}, {"x": 1.0, "y": 0.0}],
                    "blendshapes": [{"name": "eyeBlinkLeft", "score": 0.75}]
                }]
            }"#,
        )
        .unwrap();

        assert_eq!(detection.faces.len(), 1);
        let face = &detection.faces[0];
        assert_eq!(face.landmarks.len(), 2);
        assert_eq!(face.landmarks.get(0).unwrap().x, 0.25);
        assert_eq!(face.landmarks.get(1), Some(Landmark::new(1.0, 0.0)));
        assert_eq!(face.landmarks.get(2), None);
        assert_eq!(face.blendshape("eyeBlinkLeft"), Some(0.75));
        assert_eq!(face.blendshape("jawOpen"), None);

        let reparsed = Detection::from_json(&detection.to_json().unwrap()).unwrap();
        assert_eq!(reparsed, detection);
    }

    #[test]
    fn empty_detection() {
        assert_eq!(Detection::from_json("{}").unwrap(), Detection::default());
        assert!(Detection::from_json(r#"{"faces": [{}]}"#).is_err());
    }

    #[test]
    fn fixed_source_readiness() {
        let frame = Image::new(1, 1);
        let mut source = FixedSource::new(Detection::default()).ready_after(2);
        assert!(source.detect(&frame, Duration::ZERO).is_err());
        assert_eq!(source.poll_ready(), Readiness::NotReady);
        assert_eq!(source.poll_ready(), Readiness::NotReady);
        assert_eq!(source.poll_ready(), Readiness::Ready);
        assert_eq!(source.poll_ready(), Readiness::Ready);
        assert!(source.detect(&frame, Duration::ZERO).is_ok());
        assert_eq!(source.detections(), 1);
    }

    #[test]
    fn fixed_source_rejects_stale_timestamps() {
        let frame = Image::new(1, 1);
        let mut source = FixedSource::new(Detection::default());
        source.detect(&frame, Duration::from_millis(5)).unwrap();
        assert!(source.detect(&frame, Duration::from_millis(5)).is_err());
        assert!(source.detect(&frame, Duration::from_millis(4)).is_err());
        source.detect(&frame, Duration::from_millis(6)).unwrap();
        assert_eq!(source.last_timestamp(), Some(Duration::from_millis(6)));
        assert_eq!(source.detections(), 2);
    }
}
