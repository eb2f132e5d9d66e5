use nalgebra::Point2;

use crate::contour::Contour;

use super::{Color, ImageView, ImageViewMut};

/// Describes how to blend pixels together in a [`Blend`] operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendMode {
    /// All destination pixels will be overwritten with the corresponding source pixel.
    Overwrite,

    /// Performs alpha blending between source and destination pixels to make the source image
    /// appear in front of the destination image.
    Alpha,
}

/// A blending operation between two images.
///
/// The source is stretched or shrunk to the destination size using nearest-neighbor sampling.
/// The operation is performed when the [`Blend`] is dropped.
///
/// Returned by [`Image::blend_from`][super::Image::blend_from] or [`ImageViewMut::blend_from`].
pub struct Blend<'a> {
    dest: ImageViewMut<'a>,
    src: ImageView<'a>,
    mode: BlendMode,
    clip: &'a [Contour],
}

impl<'a> Blend<'a> {
    pub(super) fn new(dest: ImageViewMut<'a>, src: ImageView<'a>) -> Self {
        Self {
            dest,
            src,
            mode: BlendMode::Alpha,
            clip: &[],
        }
    }

    /// Sets the blend mode to use.
    pub fn mode(&mut self, mode: BlendMode) -> &mut Self {
        self.mode = mode;
        self
    }

    /// Restricts the operation to destination pixels inside every contour in `clip`.
    ///
    /// Contours are given in the coordinates of the underlying image, not of the destination view.
    /// A pixel is inside a contour when its center is.
    pub fn clip(&mut self, clip: &'a [Contour]) -> &mut Self {
        self.clip = clip;
        self
    }

    fn is_clipped(&self, dest_x: u32, dest_y: u32) -> bool {
        if self.clip.is_empty() {
            return false;
        }
        match self.dest.image_coord(dest_x, dest_y) {
            Some((x, y)) => {
                let center = Point2::new(x as f32 + 0.5, y as f32 + 0.5);
                !self.clip.iter().all(|contour| contour.contains(center))
            }
            None => true,
        }
    }
}

impl Drop for Blend<'_> {
    fn drop(&mut self) {
        if self.src.width() == 0 || self.src.height() == 0 {
            return;
        }

        for dest_y in 0..self.dest.height() {
            for dest_x in 0..self.dest.width() {
                if self.is_clipped(dest_x, dest_y) {
                    continue;
                }

                let src_x = ((dest_x as f32 + 0.5) / self.dest.width() as f32
                    * self.src.width() as f32) as u32;
                let src_y = ((dest_y as f32 + 0.5) / self.dest.height() as f32
                    * self.src.height() as f32) as u32;

                let src_pix = self.src.get(src_x, src_y);
                let dest_pix = self.dest.get(dest_x, dest_y);
                let result = match self.mode {
                    BlendMode::Overwrite => blend_overwrite(dest_pix, src_pix),
                    BlendMode::Alpha => blend_alpha(dest_pix, src_pix),
                };
                self.dest.set(dest_x, dest_y, result);
            }
        }
    }
}

fn blend_overwrite(_dest: Color, src: Color) -> Color {
    src
}

fn blend_alpha(dest: Color, src: Color) -> Color {
    fn blend_color(dest: f32, src: f32, dest_alpha: f32, src_alpha: f32, result_alpha: f32) -> f32 {
        (src * src_alpha + dest * dest_alpha * (1.0 - src_alpha)) / result_alpha
    }

    match src.a() {
        255 => return src,
        0 => return dest,
        _ => {}
    }

    let dest = LinearColor::new(dest);
    let src = LinearColor::new(src);

    let result_alpha = src.a() + dest.a() * (1.0 - src.a());
    let r = blend_color(dest.r(), src.r(), dest.a(), src.a(), result_alpha);
    let g = blend_color(dest.g(), src.g(), dest.a(), src.a(), result_alpha);
    let b = blend_color(dest.b(), src.b(), dest.a(), src.a(), result_alpha);

    LinearColor([r, g, b, result_alpha]).to_color()
}

/// A color in linear light, with all components in range 0.0 to 1.0.
struct LinearColor([f32; 4]);

impl LinearColor {
    fn new(color: Color) -> Self {
        fn to_linear(srgb: f32) -> f32 {
            if srgb <= 0.04045 {
                srgb / 12.92
            } else {
                ((srgb + 0.055) / 1.055).powf(2.4)
            }
        }

        let [r, g, b, a] = color.0.map(|c| f32::from(c) / 255.0);
        Self([to_linear(r), to_linear(g), to_linear(b), a])
    }

    fn to_color(&self) -> Color {
        fn to_srgb(linear: f32) -> f32 {
            if linear <= 0.0031308 {
                linear * 12.92
            } else {
                1.055 * linear.powf(1.0 / 2.4) - 0.055
            }
        }

        let [r, g, b, a] = self.0;
        let [r, g, b, a] = [to_srgb(r), to_srgb(g), to_srgb(b), a];
        Color([r, g, b, a].map(|c| (c * 255.0).round().clamp(0.0, 255.0) as u8))
    }

    fn r(&self) -> f32 {
        self.0[0]
    }

    fn g(&self) -> f32 {
        self.0[1]
    }

    fn b(&self) -> f32 {
        self.0[2]
    }

    fn a(&self) -> f32 {
        self.0[3]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alpha_fast_paths() {
        let dest = Color::from_rgb8(10, 20, 30);
        assert_eq!(blend_alpha(dest, Color::RED), Color::RED);
        assert_eq!(blend_alpha(dest, Color::RED.with_alpha(0)), dest);
    }

    #[test]
    fn alpha_over_opaque_stays_opaque() {
        let out = blend_alpha(Color::BLACK, Color::WHITE.with_alpha(128));
        assert_eq!(out.a(), 255);
        // Blending happens in linear light, so half-transparent white is brighter than 128.
        assert!(out.r() > 128, "{out:?}");
        assert_eq!(out.r(), out.g());
        assert_eq!(out.g(), out.b());
    }

    #[test]
    fn linear_roundtrip() {
        for c in [0, 1, 17, 128, 200, 254, 255] {
            let color = Color::from_rgba8(c, c, c, c);
            assert_eq!(LinearColor::new(color).to_color(), color);
        }
    }
}
