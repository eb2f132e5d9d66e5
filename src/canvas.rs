//! Drawing surfaces.
//!
//! The compositing pipeline draws through the [`Surface`] trait, which models the small subset of
//! a 2D canvas API it needs. [`Canvas`] implements it on top of an [`Image`].

use std::ops::{Deref, DerefMut};

use crate::{
    contour::Contour,
    feature::PixelPoint,
    image::{draw, BlendMode, Color, Image, ImageView, Resolution},
    rect::Rect,
    DrawError,
};

/// A raster surface that supports clipped image drawing.
pub trait Surface {
    /// Returns the size of the surface in pixels.
    fn resolution(&self) -> Resolution;

    /// Resizes the surface and clears it to transparent black.
    ///
    /// Clip paths are kept.
    fn reset(&mut self, resolution: Resolution);

    /// Restricts subsequent drawing to the inside of `contour`.
    ///
    /// When several clips are pushed, drawing is restricted to their intersection.
    fn push_clip(&mut self, contour: &Contour);

    /// Removes the most recently pushed clip.
    fn pop_clip(&mut self);

    /// Draws the `src_rect` area of `src` into the `dst_rect` area of the surface, scaling it as
    /// necessary.
    fn draw_image(
        &mut self,
        src: ImageView<'_>,
        src_rect: Rect,
        dst_rect: Rect,
    ) -> Result<(), DrawError>;

    /// Strokes a line segment. Not affected by clipping.
    fn stroke_line(&mut self, from: PixelPoint, to: PixelPoint, color: Color, width: u32);
}

impl<S: Surface + ?Sized> Surface for &mut S {
    fn resolution(&self) -> Resolution {
        (**self).resolution()
    }

    fn reset(&mut self, resolution: Resolution) {
        (**self).reset(resolution)
    }

    fn push_clip(&mut self, contour: &Contour) {
        (**self).push_clip(contour)
    }

    fn pop_clip(&mut self) {
        (**self).pop_clip()
    }

    fn draw_image(
        &mut self,
        src: ImageView<'_>,
        src_rect: Rect,
        dst_rect: Rect,
    ) -> Result<(), DrawError> {
        (**self).draw_image(src, src_rect, dst_rect)
    }

    fn stroke_line(&mut self, from: PixelPoint, to: PixelPoint, color: Color, width: u32) {
        (**self).stroke_line(from, to, color, width)
    }
}

/// Pushes a clip path that is popped again when the guard is dropped.
///
/// The guard dereferences to the clipped surface.
pub struct ClipGuard<'a, S: Surface + ?Sized> {
    surface: &'a mut S,
}

impl<'a, S: Surface + ?Sized> ClipGuard<'a, S> {
    pub fn new(surface: &'a mut S, contour: &Contour) -> Self {
        surface.push_clip(contour);
        Self { surface }
    }
}

impl<S: Surface + ?Sized> Deref for ClipGuard<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        self.surface
    }
}

impl<S: Surface + ?Sized> DerefMut for ClipGuard<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        self.surface
    }
}

impl<S: Surface + ?Sized> Drop for ClipGuard<'_, S> {
    fn drop(&mut self) {
        self.surface.pop_clip();
    }
}

/// A CPU [`Surface`] backed by an RGBA [`Image`].
#[derive(Debug, Clone)]
pub struct Canvas {
    image: Image,
    clips: Vec<Contour>,
}

impl Canvas {
    pub fn new(resolution: Resolution) -> Self {
        Self {
            image: Image::new(resolution.width(), resolution.height()),
            clips: Vec::new(),
        }
    }

    /// Returns the canvas contents.
    pub fn image(&self) -> &Image {
        &self.image
    }

    pub fn into_image(self) -> Image {
        self.image
    }

    /// Returns the number of active clip paths.
    pub fn clip_depth(&self) -> usize {
        self.clips.len()
    }

    /// Fills the whole canvas with `color`, ignoring clip paths.
    pub fn clear(&mut self, color: Color) {
        self.image.clear(color);
    }
}

impl Surface for Canvas {
    fn resolution(&self) -> Resolution {
        self.image.resolution()
    }

    fn reset(&mut self, resolution: Resolution) {
        if self.image.resolution() == resolution {
            self.image.clear(Color::NULL);
        } else {
            self.image = Image::new(resolution.width(), resolution.height());
        }
    }

    fn push_clip(&mut self, contour: &Contour) {
        self.clips.push(contour.clone());
    }

    fn pop_clip(&mut self) {
        if self.clips.pop().is_none() {
            log::warn!("`pop_clip` called without an active clip path");
        }
    }

    fn draw_image(
        &mut self,
        src: ImageView<'_>,
        src_rect: Rect,
        dst_rect: Rect,
    ) -> Result<(), DrawError> {
        if !(src_rect.width() > 0.0 && src_rect.height() > 0.0) {
            return Err(DrawError::EmptySource {
                width: src_rect.width(),
                height: src_rect.height(),
            });
        }
        if !(dst_rect.width() > 0.0 && dst_rect.height() > 0.0) {
            return Err(DrawError::EmptyDestination {
                width: dst_rect.width(),
                height: dst_rect.height(),
            });
        }

        let src = src.view(src_rect);
        self.image
            .view_mut(dst_rect)
            .blend_from(&src)
            .mode(BlendMode::Alpha)
            .clip(&self.clips);
        Ok(())
    }

    fn stroke_line(&mut self, from: PixelPoint, to: PixelPoint, color: Color, width: u32) {
        draw::draw_line(
            &mut self.image,
            from.x.round() as i32,
            from.y.round() as i32,
            to.x.round() as i32,
            to.y.round() as i32,
        )
        .color(color)
        .stroke_width(width);
    }
}

#[cfg(test)]
mod tests {
    use nalgebra::point;

    use crate::image::AsImageView;

    use super::*;

    fn square(x: f32, y: f32, size: f32) -> Contour {
        Contour::new(vec![
            point![x, y],
            point![x + size, y],
            point![x + size, y + size],
            point![x, y + size],
        ])
    }

    fn red(size: u32) -> Image {
        let mut image = Image::new(size, size);
        image.clear(Color::RED);
        image
    }

    fn count(canvas: &Canvas, color: Color) -> usize {
        let image = canvas.image();
        (0..image.height())
            .flat_map(|y| (0..image.width()).map(move |x| (x, y)))
            .filter(|&(x, y)| image.get(x, y) == color)
            .count()
    }

    #[test]
    fn draw_unclipped() {
        let mut canvas = Canvas::new(Resolution::new(8, 8));
        let src = red(2);
        canvas
            .draw_image(
                src.as_view(),
                src.rect(),
                Rect::from_top_left(2.0, 2.0, 4.0, 4.0),
            )
            .unwrap();
        assert_eq!(count(&canvas, Color::RED), 16);
        assert_eq!(canvas.image().get(1, 1), Color::NULL);
        assert_eq!(canvas.image().get(2, 2), Color::RED);
    }

    #[test]
    fn draw_clipped() {
        let mut canvas = Canvas::new(Resolution::new(8, 8));
        let src = red(8);
        {
            let mut clipped = ClipGuard::new(&mut canvas, &square(0.0, 0.0, 3.0));
            assert_eq!(clipped.clip_depth(), 1);
            clipped
                .draw_image(src.as_view(), src.rect(), src.rect())
                .unwrap();
        }
        assert_eq!(canvas.clip_depth(), 0);
        assert_eq!(count(&canvas, Color::RED), 9);
    }

    #[test]
    fn nested_clips_intersect() {
        let mut canvas = Canvas::new(Resolution::new(8, 8));
        let src = red(8);
        canvas.push_clip(&square(0.0, 0.0, 4.0));
        canvas.push_clip(&square(2.0, 2.0, 4.0));
        canvas
            .draw_image(src.as_view(), src.rect(), src.rect())
            .unwrap();
        assert_eq!(count(&canvas, Color::RED), 4);

        canvas.pop_clip();
        canvas.pop_clip();
        // Extra pops are harmless.
        canvas.pop_clip();
        assert_eq!(canvas.clip_depth(), 0);
    }

    #[test]
    fn rejects_empty_rects() {
        let mut canvas = Canvas::new(Resolution::new(4, 4));
        let src = red(2);
        assert_eq!(
            canvas.draw_image(
                src.as_view(),
                Rect::from_top_left(0.0, 0.0, 0.0, 2.0),
                canvas.resolution().rect(),
            ),
            Err(DrawError::EmptySource {
                width: 0.0,
                height: 2.0
            })
        );
        assert_eq!(
            canvas.draw_image(
                src.as_view(),
                src.rect(),
                Rect::from_top_left(1.0, 1.0, 3.0, 0.0),
            ),
            Err(DrawError::EmptyDestination {
                width: 3.0,
                height: 0.0
            })
        );
        assert_eq!(count(&canvas, Color::NULL), 16);
    }

    #[test]
    fn reset_resizes_and_clears() {
        let mut canvas = Canvas::new(Resolution::new(4, 4));
        canvas.clear(Color::WHITE);
        canvas.reset(Resolution::new(4, 4));
        assert_eq!(count(&canvas, Color::NULL), 16);
        canvas.reset(Resolution::new(2, 3));
        assert_eq!(canvas.resolution(), Resolution::new(2, 3));
    }

    #[test]
    fn lines_ignore_clips() {
        let mut canvas = Canvas::new(Resolution::new(4, 4));
        canvas.push_clip(&square(0.0, 0.0, 1.0));
        canvas.stroke_line(point![0.0, 3.0], point![3.0, 3.0], Color::BLUE, 1);
        assert_eq!(count(&canvas, Color::BLUE), 4);
    }
}
