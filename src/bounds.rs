//! Axis-aligned bounds of point sets.

use crate::{feature::PixelPoint, rect::Rect, Error};

/// An axis-aligned bounding box in pixel coordinates.
///
/// Unlike [`Rect`], this stores the extreme coordinates directly, so that they survive the trip
/// through the pipeline without rounding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x_min: f32,
    pub y_min: f32,
    pub x_max: f32,
    pub y_max: f32,
}

impl BoundingBox {
    /// Computes the smallest box containing every point in `points`.
    ///
    /// The result has zero width or height if all points share the same X or Y coordinate.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyInput`] if `points` yields nothing.
    pub fn enclosing<I: IntoIterator<Item = PixelPoint>>(points: I) -> Result<Self, Error> {
        let mut points = points.into_iter();
        let first = points.next().ok_or(Error::EmptyInput)?;
        let init = Self {
            x_min: first.x,
            y_min: first.y,
            x_max: first.x,
            y_max: first.y,
        };
        Ok(points.fold(init, |b, p| Self {
            x_min: b.x_min.min(p.x),
            y_min: b.y_min.min(p.y),
            x_max: b.x_max.max(p.x),
            y_max: b.y_max.max(p.y),
        }))
    }

    #[inline]
    pub fn width(&self) -> f32 {
        self.x_max - self.x_min
    }

    #[inline]
    pub fn height(&self) -> f32 {
        self.y_max - self.y_min
    }

    #[inline]
    pub fn top_left(&self) -> PixelPoint {
        PixelPoint::new(self.x_min, self.y_min)
    }

    /// Returns whether the box has no area.
    pub fn is_degenerate(&self) -> bool {
        self.width() == 0.0 || self.height() == 0.0
    }

    /// Returns whether `p` lies inside the box or on its border.
    pub fn contains(&self, p: PixelPoint) -> bool {
        (self.x_min..=self.x_max).contains(&p.x) && (self.y_min..=self.y_max).contains(&p.y)
    }

    /// Returns the smallest rectangle of whole pixels that covers the box.
    pub fn pixel_rect(&self) -> Rect {
        let (x, y) = (self.x_min.floor(), self.y_min.floor());
        Rect::from_top_left(x, y, self.x_max.ceil() - x, self.y_max.ceil() - y)
    }
}

#[cfg(test)]
mod tests {
    use nalgebra::point;

    use super::*;

    #[test]
    fn encloses_all_points() {
        let points = [point![3.0, 7.0], point![-1.0, 2.0], point![5.0, 4.0]];
        let bbox = BoundingBox::enclosing(points).unwrap();
        assert_eq!(
            bbox,
            BoundingBox {
                x_min: -1.0,
                y_min: 2.0,
                x_max: 5.0,
                y_max: 7.0,
            }
        );
        assert_eq!(bbox.width(), 6.0);
        assert_eq!(bbox.height(), 5.0);
        assert!(points.iter().all(|p| bbox.contains(*p)));
        assert!(!bbox.contains(point![5.1, 4.0]));
        assert_eq!(bbox.pixel_rect(), Rect::from_top_left(-1.0, 2.0, 6.0, 5.0));
        assert!(!bbox.is_degenerate());
    }

    #[test]
    fn pixel_rect_covers_partial_pixels() {
        let bbox = BoundingBox::enclosing([point![0.4, 1.5], point![3.9, 2.0]]).unwrap();
        assert_eq!(bbox.pixel_rect(), Rect::from_top_left(0.0, 1.0, 4.0, 1.0));

        let bbox = BoundingBox::enclosing([point![-0.5, -2.2], point![1.0, 0.1]]).unwrap();
        assert_eq!(bbox.pixel_rect(), Rect::from_top_left(-1.0, -3.0, 2.0, 4.0));
    }

    #[test]
    fn empty_input() {
        assert_eq!(
            BoundingBox::enclosing(Vec::<PixelPoint>::new()),
            Err(Error::EmptyInput)
        );
    }

    #[test]
    fn single_point_is_degenerate() {
        let bbox = BoundingBox::enclosing([point![4.0, 4.0]]).unwrap();
        assert_eq!(bbox.width(), 0.0);
        assert_eq!(bbox.height(), 0.0);
        assert!(bbox.is_degenerate());
        assert_eq!(bbox.top_left(), point![4.0, 4.0]);
    }

    #[test]
    fn collinear_points() {
        let bbox =
            BoundingBox::enclosing([point![1.0, 4.0], point![9.0, 4.0], point![5.0, 4.0]]).unwrap();
        assert_eq!(bbox.width(), 8.0);
        assert_eq!(bbox.height(), 0.0);
        assert!(bbox.is_degenerate());
    }

    #[test]
    fn accepts_iterators() {
        let points = vec![point![1.0, 1.0], point![2.0, 3.0]];
        let bbox = BoundingBox::enclosing(points.iter().copied()).unwrap();
        assert_eq!(bbox.top_left(), point![1.0, 1.0]);
        assert_eq!(points.len(), 2);
    }
}
