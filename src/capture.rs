//! Cropping frame regions into an off-screen buffer.

use crate::{
    bounds::BoundingBox,
    image::{AsImageView, BlendMode, Color, Image, ImageView, Resolution},
    Error,
};

/// A reusable off-screen image that frame regions are captured into.
///
/// The buffer holds one region at a time. Its backing storage is only reallocated when the size
/// of the captured region changes; otherwise it is cleared and overwritten in place.
#[derive(Debug)]
pub struct RegionBuffer {
    image: Image,
    magnification: f32,
    reallocations: u64,
}

impl Default for RegionBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl RegionBuffer {
    /// Creates an empty buffer that captures regions at their original size.
    pub fn new() -> Self {
        Self::with_magnification(1.0)
    }

    /// Creates an empty buffer that scales captured regions by `magnification`.
    ///
    /// # Panics
    ///
    /// Panics if `magnification` is not a positive, finite number.
    pub fn with_magnification(magnification: f32) -> Self {
        assert!(
            magnification.is_finite() && magnification > 0.0,
            "invalid magnification {magnification}"
        );
        Self {
            image: Image::new(0, 0),
            magnification,
            reallocations: 0,
        }
    }

    pub fn magnification(&self) -> f32 {
        self.magnification
    }

    /// Returns how often the backing image had to be reallocated.
    pub fn reallocations(&self) -> u64 {
        self.reallocations
    }

    /// Returns the size of the most recently captured region.
    pub fn resolution(&self) -> Resolution {
        self.image.resolution()
    }

    /// Copies the area of `frame` covered by `bbox` into the buffer and returns a view of it.
    ///
    /// The box is first widened to whole pixels ([`BoundingBox::pixel_rect`]), so a partially
    /// covered edge column or row is kept. That pixel area is then resampled (nearest neighbor)
    /// to its size times the magnification, rounded. Parts outside of `frame` come out
    /// transparent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DegenerateRegion`] without touching the buffer if the resampled region
    /// would be less than a pixel wide or high.
    pub fn capture(&mut self, frame: &Image, bbox: &BoundingBox) -> Result<ImageView<'_>, Error> {
        let width = (bbox.width() * self.magnification).round();
        let height = (bbox.height() * self.magnification).round();
        // Also rejects NaN from garbage landmarks.
        if !(width >= 1.0 && height >= 1.0) {
            return Err(Error::DegenerateRegion { width, height });
        }

        let src_rect = bbox.pixel_rect();
        let res = Resolution::new(
            (src_rect.width() * self.magnification).round() as u32,
            (src_rect.height() * self.magnification).round() as u32,
        );
        if self.image.resolution() == res {
            self.image.clear(Color::NULL);
        } else {
            log::trace!(
                "resizing region buffer from {} to {}",
                self.image.resolution(),
                res
            );
            self.image = Image::new(res.width(), res.height());
            self.reallocations += 1;
        }

        let src = frame.view(src_rect);
        self.image.blend_from(&src).mode(BlendMode::Overwrite);
        Ok(self.image.as_view())
    }
}
