//! Target positions for relocated features.

use fastrand::Rng;

use crate::{feature::FeatureId, image::Resolution};

/// Where to draw a copy of a feature.
///
/// `x` and `y` are the surface coordinates the top left corner of the feature's bounding box is
/// moved to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub feature: FeatureId,
    pub x: f32,
    pub y: f32,
}

impl Placement {
    pub fn new(feature: FeatureId, x: f32, y: f32) -> Self {
        Self { feature, x, y }
    }

    /// Moves this placement to a uniformly random pixel of a `surface`-sized area.
    ///
    /// Both bounds are inclusive, so a placement may land on the far edge and draw its feature
    /// (almost) entirely off-surface.
    pub fn randomize(&mut self, rng: &mut Rng, surface: Resolution) {
        self.x = rng.u32(0..=surface.width()) as f32;
        self.y = rng.u32(0..=surface.height()) as f32;
    }
}

/// The list of feature copies drawn each frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Placements {
    list: Vec<Placement>,
}

impl Placements {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates `copies` placements for each of `features`, all at the origin.
    ///
    /// Call [`Placements::randomize`] to spread them out.
    pub fn copies(features: &[FeatureId], copies: usize) -> Self {
        features
            .iter()
            .flat_map(|&feature| (0..copies).map(move |_| Placement::new(feature, 0.0, 0.0)))
            .collect()
    }

    pub fn push(&mut self, placement: Placement) {
        self.list.push(placement);
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Placement> {
        self.list.iter()
    }

    /// Reassigns every placement to a random position on a `surface`-sized area.
    pub fn randomize(&mut self, rng: &mut Rng, surface: Resolution) {
        for placement in &mut self.list {
            placement.randomize(rng, surface);
        }
    }
}

impl FromIterator<Placement> for Placements {
    fn from_iter<T: IntoIterator<Item = Placement>>(iter: T) -> Self {
        Self {
            list: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Placements {
    type Item = &'a Placement;
    type IntoIter = std::slice::Iter<'a, Placement>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copies() {
        let placements = Placements::copies(&FeatureId::ALL, 3);
        assert_eq!(placements.len(), 6);
        assert_eq!(
            placements
                .iter()
                .filter(|p| p.feature == FeatureId::RightEye)
                .count(),
            3
        );
        assert!(Placements::copies(&[FeatureId::LeftEye], 0).is_empty());
    }

    #[test]
    fn randomize_stays_in_range() {
        let res = Resolution::new(4, 3);
        let mut rng = Rng::with_seed(7);
        let mut placements = Placements::copies(&[FeatureId::LeftEye], 500);
        placements.randomize(&mut rng, res);

        assert!(placements.iter().all(|p| p.x >= 0.0 && p.x <= 4.0));
        assert!(placements.iter().all(|p| p.y >= 0.0 && p.y <= 3.0));
        assert!(placements.iter().all(|p| p.x.fract() == 0.0 && p.y.fract() == 0.0));
        // The upper bound is inclusive.
        assert!(placements.iter().any(|p| p.x == 4.0));
        assert!(placements.iter().any(|p| p.y == 3.0));
        assert!(placements.iter().any(|p| p.x == 0.0));
    }

    #[test]
    fn randomize_is_seeded() {
        let res = Resolution::VGA;
        let mut a = Placements::copies(&FeatureId::ALL, 10);
        let mut b = a.clone();
        a.randomize(&mut Rng::with_seed(42), res);
        b.randomize(&mut Rng::with_seed(42), res);
        assert_eq!(a, b);

        b.randomize(&mut Rng::with_seed(43), res);
        assert_ne!(a, b);
    }

    #[test]
    fn rerandomizing_moves_copies() {
        let res = Resolution::VGA;
        let mut rng = Rng::with_seed(9);
        let mut placements = Placements::copies(&FeatureId::ALL, 4);
        placements.randomize(&mut rng, res);
        let first = placements.clone();
        placements.randomize(&mut rng, res);
        assert_ne!(placements, first);
        assert_eq!(placements.len(), first.len());

        // The sequence of layouts is reproducible from the seed.
        let mut rng = Rng::with_seed(9);
        let mut replay = Placements::copies(&FeatureId::ALL, 4);
        replay.randomize(&mut rng, res);
        assert_eq!(replay, first);
        replay.randomize(&mut rng, res);
        assert_eq!(replay, placements);
    }
}
