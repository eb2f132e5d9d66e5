//! Redrawing captured features on a surface.

use crate::{
    bounds::BoundingBox,
    canvas::{ClipGuard, Surface},
    capture::RegionBuffer,
    contour::Contour,
    feature::{FeatureDefinition, PixelPoint},
    image::{Color, Image, ImageView},
    landmark::Landmarks,
    placement::Placement,
    rect::Rect,
    Error,
};

/// Draws `src_rect` of `src` into `dst_rect` of `surface`, restricted to the inside of `outline`.
///
/// The clip is removed again before returning, including when drawing fails.
pub fn composite<S: Surface + ?Sized>(
    surface: &mut S,
    outline: &Contour,
    src: ImageView<'_>,
    src_rect: Rect,
    dst_rect: Rect,
) -> Result<(), Error> {
    let mut clipped = ClipGuard::new(surface, outline);
    clipped.draw_image(src, src_rect, dst_rect)?;
    Ok(())
}

/// Strokes every connector of `feature`.
///
/// Landmarks are scaled to the surface's resolution, which is expected to match the frame they
/// were detected in.
pub fn draw_connectors<S: Surface + ?Sized>(
    surface: &mut S,
    feature: &FeatureDefinition,
    landmarks: &Landmarks,
    color: Color,
) -> Result<(), Error> {
    let segments = feature.resolve_segments(landmarks, surface.resolution())?;
    for (from, to) in segments {
        surface.stroke_line(from, to, color, 1);
    }
    Ok(())
}

/// Runs the capture and redraw steps for single features.
///
/// Owns the [`RegionBuffer`] that features are captured into, so that the buffer is reused across
/// features and frames.
#[derive(Debug, Default)]
pub struct Compositor {
    buffer: RegionBuffer,
}

impl Compositor {
    pub fn new(buffer: RegionBuffer) -> Self {
        Self { buffer }
    }

    pub fn buffer(&self) -> &RegionBuffer {
        &self.buffer
    }

    /// Draws a copy of a feature at a new position.
    ///
    /// `points` are the feature's resolved points in `frame`, in feature table order. The feature
    /// is cut out along its outline and drawn so that its bounding box's top left corner lands on
    /// `(placement.x, placement.y)`, at its original size.
    pub fn relocate<S: Surface + ?Sized>(
        &mut self,
        surface: &mut S,
        frame: &Image,
        points: &[PixelPoint],
        placement: &Placement,
    ) -> Result<(), Error> {
        let bbox = BoundingBox::enclosing(points.iter().copied())?;
        let region = self.buffer.capture(frame, &bbox)?;

        let offset = PixelPoint::new(placement.x, placement.y) - bbox.top_left();
        let outline = Contour::from_feature_points(points).translate(offset);
        // The buffer holds whole pixels, so the destination keeps the pixel-aligned size.
        let src_rect = bbox.pixel_rect();
        let dst_rect = src_rect.move_to(src_rect.x() + offset.x, src_rect.y() + offset.y);
        log::trace!("relocating {:?} to {:?}", bbox, dst_rect);

        composite(surface, &outline, region, region.rect(), dst_rect)
    }

    /// Clears `surface` and draws the feature's bounding box region at the top left corner,
    /// scaled by the buffer's magnification.
    ///
    /// Nothing is clipped, so the area around the feature is visible as well.
    pub fn isolate<S: Surface + ?Sized>(
        &mut self,
        surface: &mut S,
        frame: &Image,
        points: &[PixelPoint],
    ) -> Result<(), Error> {
        let bbox = BoundingBox::enclosing(points.iter().copied())?;
        let region = self.buffer.capture(frame, &bbox)?;

        let res = surface.resolution();
        surface.reset(res);
        surface.draw_image(region, region.rect(), region.rect())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use nalgebra::point;

    use crate::{
        canvas::Canvas,
        feature::FeatureId,
        image::{AsImageView, Resolution},
        DrawError,
    };

    use super::*;

    /// A frame in which every pixel encodes its own coordinates.
    fn frame(res: Resolution) -> Image {
        let mut image = Image::new(res.width(), res.height());
        for y in 0..res.height() {
            for x in 0..res.width() {
                image.set(x, y, Color::from_rgb8(x as u8, y as u8, 100));
            }
        }
        image
    }

    /// Diamond-shaped "eye" around `(cx, cy)` in feature table order.
    fn eye(cx: f32, cy: f32) -> Vec<PixelPoint> {
        vec![
            point![cx + 4.0, cy],
            point![cx, cy + 3.0],
            point![cx - 4.0, cy],
            point![cx + 4.0, cy],
            point![cx, cy - 3.0],
            point![cx - 4.0, cy],
        ]
    }

    fn opaque_pixels(image: &Image) -> Vec<(u32, u32, Color)> {
        let mut out = Vec::new();
        for y in 0..image.height() {
            for x in 0..image.width() {
                let c = image.get(x, y);
                if c.a() != 0 {
                    out.push((x, y, c));
                }
            }
        }
        out
    }

    struct FailingSurface {
        inner: Canvas,
    }

    impl Surface for FailingSurface {
        fn resolution(&self) -> Resolution {
            self.inner.resolution()
        }

        fn reset(&mut self, resolution: Resolution) {
            self.inner.reset(resolution)
        }

        fn push_clip(&mut self, contour: &Contour) {
            self.inner.push_clip(contour)
        }

        fn pop_clip(&mut self) {
            self.inner.pop_clip()
        }

        fn draw_image(&mut self, _: ImageView<'_>, _: Rect, _: Rect) -> Result<(), DrawError> {
            Err(DrawError::EmptySource {
                width: 0.0,
                height: 0.0,
            })
        }

        fn stroke_line(&mut self, from: PixelPoint, to: PixelPoint, color: Color, width: u32) {
            self.inner.stroke_line(from, to, color, width)
        }
    }

    #[test]
    fn composite_releases_clip_on_failure() {
        let mut surface = FailingSurface {
            inner: Canvas::new(Resolution::new(4, 4)),
        };
        let src = Image::new(2, 2);
        let outline = Contour::new(vec![point![0.0, 0.0], point![1.0, 0.0], point![0.0, 1.0]]);
        let res = composite(
            &mut surface,
            &outline,
            src.as_view(),
            src.rect(),
            src.rect(),
        );
        assert!(matches!(res, Err(Error::Draw(DrawError::EmptySource { .. }))));
        assert_eq!(surface.inner.clip_depth(), 0);
    }

    #[test]
    fn relocate_in_place_reproduces_the_feature() {
        let res = Resolution::new(40, 30);
        let frame = frame(res);
        let points = eye(20.0, 15.0);
        let mut canvas = Canvas::new(res);
        let mut compositor = Compositor::default();

        let placement = Placement::new(FeatureId::LeftEye, 16.0, 12.0);
        compositor
            .relocate(&mut canvas, &frame, &points, &placement)
            .unwrap();

        let outline = Contour::from_feature_points(&points);
        let drawn = opaque_pixels(canvas.image());
        assert!(!drawn.is_empty());
        for &(x, y, c) in &drawn {
            assert_eq!(c, frame.get(x, y), "({x},{y})");
            assert!(outline.contains(point![x as f32 + 0.5, y as f32 + 0.5]));
        }
        // The center of the eye is always drawn.
        assert_eq!(canvas.image().get(20, 15), frame.get(20, 15));
    }

    #[test]
    fn relocate_fractional_feature_in_place() {
        let res = Resolution::new(16, 8);
        let frame = frame(res);
        // Spans x 0.4..=3.9, so the last column is only partially covered.
        let points = [
            point![0.4, 1.0],
            point![3.9, 1.0],
            point![0.4, 2.6],
            point![3.9, 2.6],
        ];
        let mut canvas = Canvas::new(res);
        let mut compositor = Compositor::default();
        compositor
            .relocate(
                &mut canvas,
                &frame,
                &points,
                &Placement::new(FeatureId::LeftEye, 0.4, 1.0),
            )
            .unwrap();

        let image = canvas.image();
        for x in 0..=3 {
            assert_eq!(image.get(x, 1), frame.get(x, 1), "({x},1)");
        }
        assert_eq!(image.get(3, 2), frame.get(3, 2));
        assert_eq!(image.get(4, 1), Color::NULL);
        for &(x, y, c) in &opaque_pixels(image) {
            assert_eq!(c, frame.get(x, y), "({x},{y})");
        }
    }

    #[test]
    fn relocation_is_a_translation() {
        let res = Resolution::new(64, 48);
        let frame = frame(res);
        let points = eye(20.0, 15.0);
        let mut compositor = Compositor::default();

        let mut at_origin = Canvas::new(res);
        compositor
            .relocate(
                &mut at_origin,
                &frame,
                &points,
                &Placement::new(FeatureId::LeftEye, 16.0, 12.0),
            )
            .unwrap();

        let mut moved = Canvas::new(res);
        compositor
            .relocate(
                &mut moved,
                &frame,
                &points,
                &Placement::new(FeatureId::LeftEye, 40.0, 30.0),
            )
            .unwrap();

        let expected = opaque_pixels(at_origin.image())
            .into_iter()
            .map(|(x, y, c)| (x + 24, y + 18, c))
            .collect::<Vec<_>>();
        assert_eq!(opaque_pixels(moved.image()), expected);
        assert_eq!(compositor.buffer().reallocations(), 1);
        assert_eq!(moved.clip_depth(), 0);
    }

    #[test]
    fn relocate_off_surface() {
        let res = Resolution::new(40, 30);
        let frame = frame(res);
        let mut canvas = Canvas::new(res);
        let mut compositor = Compositor::default();
        compositor
            .relocate(
                &mut canvas,
                &frame,
                &eye(20.0, 15.0),
                &Placement::new(FeatureId::LeftEye, 40.0, 30.0),
            )
            .unwrap();
        assert!(opaque_pixels(canvas.image()).is_empty());
    }

    #[test]
    fn relocate_errors() {
        let res = Resolution::new(40, 30);
        let frame = frame(res);
        let mut canvas = Canvas::new(res);
        let mut compositor = Compositor::default();
        let placement = Placement::new(FeatureId::LeftEye, 0.0, 0.0);

        assert_eq!(
            compositor.relocate(&mut canvas, &frame, &[], &placement),
            Err(Error::EmptyInput)
        );
        let flat = [point![1.0, 5.0], point![9.0, 5.0], point![4.0, 5.0]];
        assert!(matches!(
            compositor.relocate(&mut canvas, &frame, &flat, &placement),
            Err(Error::DegenerateRegion { .. })
        ));
        assert_eq!(canvas.clip_depth(), 0);
        assert!(opaque_pixels(canvas.image()).is_empty());
    }

    #[test]
    fn isolate_magnifies_at_origin() {
        let res = Resolution::new(40, 30);
        let frame = frame(res);
        let mut canvas = Canvas::new(res);
        canvas.clear(Color::WHITE);
        let mut compositor = Compositor::new(RegionBuffer::with_magnification(3.0));

        compositor
            .isolate(&mut canvas, &frame, &eye(20.0, 15.0))
            .unwrap();

        // Bounding box is 8x6 at (16, 12), magnified to 24x18.
        let image = canvas.image();
        assert_eq!(image.get(0, 0), frame.get(16, 12));
        assert_eq!(image.get(2, 2), frame.get(16, 12));
        assert_eq!(image.get(3, 0), frame.get(17, 12));
        assert_eq!(image.get(23, 17), frame.get(23, 17));
        assert_eq!(image.get(24, 0), Color::NULL);
        assert_eq!(image.get(0, 18), Color::NULL);
    }

    #[test]
    fn connectors() {
        let res = Resolution::new(100, 100);
        let mut canvas = Canvas::new(res);
        let landmarks = (0..468)
            .map(|i| crate::landmark::Landmark::new(0.1 + (i % 7) as f32 * 0.1, 0.5))
            .collect();
        draw_connectors(
            &mut canvas,
            FeatureId::RightEye.definition(),
            &landmarks,
            Color::OUTLINE,
        )
        .unwrap();
        let drawn = opaque_pixels(canvas.image());
        assert!(!drawn.is_empty());
        assert!(drawn.iter().all(|&(_, y, c)| y == 50 && c == Color::OUTLINE));

        let short = Landmarks::default();
        assert!(draw_connectors(&mut canvas, &crate::feature::LEFT_EYE, &short, Color::RED).is_err());
    }
}
