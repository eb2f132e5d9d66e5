//! Closed feature outlines used as clip paths.

use itertools::Itertools;
use nalgebra::Vector2;

use crate::feature::PixelPoint;

/// A closed polygon in pixel coordinates.
///
/// The last point is implicitly connected to the first one. Point containment uses the non-zero
/// winding rule, matching how 2D canvas APIs clip to a path by default.
#[derive(Debug, Clone, PartialEq)]
pub struct Contour {
    points: Vec<PixelPoint>,
}

impl Contour {
    /// Creates a contour that visits `points` in the given order.
    pub fn new(points: Vec<PixelPoint>) -> Self {
        Self { points }
    }

    /// Builds the outline of a feature from its resolved connector start points.
    ///
    /// The feature tables list one side of the feature first (eg. the lower eyelid, starting at
    /// the outer corner) and then the other side, starting at the same corner again. Connecting
    /// them in list order jumps back to the corner halfway through and produces two slivers
    /// instead of the feature. The outline therefore walks the first half forwards and the second
    /// half backwards, so both sides meet at the far corner.
    ///
    /// This ordering is specific to the MediaPipe Face Mesh eye topology; other landmark layouts
    /// need their own traversal.
    pub fn from_feature_points(points: &[PixelPoint]) -> Self {
        let half = points.len() / 2;
        let (near, far) = points.split_at(half);
        Self {
            points: near.iter().chain(far.iter().rev()).copied().collect(),
        }
    }

    #[inline]
    pub fn points(&self) -> &[PixelPoint] {
        &self.points
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Returns a copy of this contour moved by `offset`.
    #[must_use]
    pub fn translate(&self, offset: Vector2<f32>) -> Self {
        Self {
            points: self.points.iter().map(|p| p + offset).collect(),
        }
    }

    /// Returns an iterator over the contour's edges, including the closing edge.
    pub fn edges(&self) -> impl Iterator<Item = (PixelPoint, PixelPoint)> + '_ {
        self.points.iter().copied().circular_tuple_windows()
    }

    /// Computes the winding number of the contour around `p`.
    pub fn winding_number(&self, p: PixelPoint) -> i32 {
        fn is_left(a: PixelPoint, b: PixelPoint, p: PixelPoint) -> f32 {
            (b.x - a.x) * (p.y - a.y) - (p.x - a.x) * (b.y - a.y)
        }

        let mut wn = 0;
        for (a, b) in self.edges() {
            if a.y <= p.y {
                if b.y > p.y && is_left(a, b, p) > 0.0 {
                    wn += 1;
                }
            } else if b.y <= p.y && is_left(a, b, p) < 0.0 {
                wn -= 1;
            }
        }
        wn
    }

    /// Returns whether `p` lies inside the contour (non-zero winding rule).
    ///
    /// Contours with fewer than 3 points enclose nothing.
    #[inline]
    pub fn contains(&self, p: PixelPoint) -> bool {
        self.points.len() >= 3 && self.winding_number(p) != 0
    }
}

#[cfg(test)]
mod tests {
    use std::f32::consts::PI;

    use nalgebra::{point, vector};

    use super::*;

    /// Eye-shaped points in the order the feature tables produce them: the lower lid from the
    /// outer corner, then the upper lid from the outer corner again.
    fn eye_points() -> Vec<PixelPoint> {
        let lid = |sign: f32| {
            (0..8).map(move |i| {
                let t = i as f32;
                point![8.0 - t, sign * 2.0 * (PI * t / 8.0).sin()]
            })
        };
        lid(1.0).chain(lid(-1.0)).collect()
    }

    fn proper_intersection(a: (PixelPoint, PixelPoint), b: (PixelPoint, PixelPoint)) -> bool {
        fn orient(p: PixelPoint, q: PixelPoint, r: PixelPoint) -> f32 {
            (q.x - p.x) * (r.y - p.y) - (q.y - p.y) * (r.x - p.x)
        }
        let (o1, o2) = (orient(a.0, a.1, b.0), orient(a.0, a.1, b.1));
        let (o3, o4) = (orient(b.0, b.1, a.0), orient(b.0, b.1, a.1));
        o1 * o2 < 0.0 && o3 * o4 < 0.0
    }

    fn is_simple(contour: &Contour) -> bool {
        let edges = contour.edges().collect::<Vec<_>>();
        for i in 0..edges.len() {
            for j in i + 1..edges.len() {
                if proper_intersection(edges[i], edges[j]) {
                    return false;
                }
            }
        }
        true
    }

    #[test]
    fn feature_traversal_walks_second_half_backwards() {
        let pts = (0..6).map(|i| point![i as f32, 0.0]).collect::<Vec<_>>();
        let contour = Contour::from_feature_points(&pts);
        let xs = contour.points().iter().map(|p| p.x).collect::<Vec<_>>();
        assert_eq!(xs, [0.0, 1.0, 2.0, 5.0, 4.0, 3.0]);

        let odd = (0..5).map(|i| point![i as f32, 0.0]).collect::<Vec<_>>();
        let xs = Contour::from_feature_points(&odd)
            .points()
            .iter()
            .map(|p| p.x)
            .collect::<Vec<_>>();
        assert_eq!(xs, [0.0, 1.0, 4.0, 3.0, 2.0]);
    }

    #[test]
    fn feature_traversal_encloses_the_eye() {
        let pts = eye_points();
        let contour = Contour::from_feature_points(&pts);
        assert_eq!(contour.len(), 16);
        assert!(is_simple(&contour));
        assert!(contour.contains(point![4.5, 0.0]));
        assert!(contour.contains(point![4.0, 1.5]));
        assert!(contour.contains(point![4.0, -1.5]));
        assert!(!contour.contains(point![4.0, 2.5]));
        assert!(!contour.contains(point![9.0, 0.0]));

        // Connecting the points in list order leaves the middle of the eye out.
        let naive = Contour::new(pts);
        assert!(!naive.contains(point![4.5, 0.0]));
    }

    #[test]
    fn winding_ignores_orientation() {
        let square = vec![
            point![0.0, 0.0],
            point![4.0, 0.0],
            point![4.0, 4.0],
            point![0.0, 4.0],
        ];
        let cw = Contour::new(square.clone());
        let ccw = Contour::new(square.into_iter().rev().collect());
        assert_eq!(cw.winding_number(point![2.0, 2.0]), -ccw.winding_number(point![2.0, 2.0]));
        assert!(cw.contains(point![2.0, 2.0]));
        assert!(ccw.contains(point![2.0, 2.0]));
        assert!(!cw.contains(point![5.0, 2.0]));
    }

    #[test]
    fn degenerate_contours_enclose_nothing() {
        assert!(!Contour::new(vec![]).contains(point![0.0, 0.0]));
        let line = Contour::new(vec![point![0.0, 0.0], point![4.0, 4.0]]);
        assert!(!line.contains(point![2.0, 2.0]));
    }

    #[test]
    fn translation_moves_containment() {
        let contour = Contour::from_feature_points(&eye_points());
        let offset = vector![100.0, -50.0];
        let moved = contour.translate(offset);
        for p in [point![4.5, 0.0], point![4.0, 2.5], point![1.5, 0.2]] {
            assert_eq!(contour.contains(p), moved.contains(p + offset));
        }
    }
}
