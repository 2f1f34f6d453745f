//! Frames and the operations the hand pipeline performs on them.
//!
//! An [`Image`] owns RGBA pixels. Networks read from it through [`ImageView`]s, which may be
//! rotated and may reach past the image's borders (letterboxing, hand regions near the frame
//! edge). Annotations are written through an [`ImageViewMut`] by the functions in [`draw`].

pub mod draw;
mod jpeg;
mod resolution;
mod view;

#[cfg(test)]
mod tests;

use std::fmt;

use embedded_graphics::{pixelcolor::raw::RawU32, prelude::PixelColor};
use image::{Rgba, RgbaImage};

use crate::rect::{Rect, RotatedRect};

pub use jpeg::JpegBackend;
pub use resolution::Resolution;
pub use view::{ImageView, ImageViewMut};

/// An owned 8-bit sRGB image with alpha channel.
#[derive(Clone)]
pub struct Image {
    // Stored as RGBA8 so frames can be uploaded to the GUI without conversion.
    buf: RgbaImage,
}

impl Image {
    /// Decodes a JPEG image (such as a webcam MJPG frame) with the configured [`JpegBackend`].
    pub fn decode_jpeg(data: &[u8]) -> anyhow::Result<Self> {
        jpeg::decode_jpeg(data)
    }

    /// Creates an image of size `res` with every pixel set to `color`.
    pub fn filled(res: Resolution, color: Color) -> Self {
        Self {
            buf: RgbaImage::from_pixel(res.width(), res.height(), Rgba(color.0)),
        }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.buf.width()
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.buf.height()
    }

    #[inline]
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width(), self.height())
    }

    /// Returns the color of pixel `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics if the pixel is outside of the image.
    pub fn get(&self, x: u32, y: u32) -> Color {
        Color(self.buf[(x, y)].0)
    }

    /// Borrows the area `rect` of this image.
    ///
    /// `rect` may be rotated and may extend past the image. Pixels outside of the image read as
    /// [`Color::NULL`].
    pub fn view(&self, rect: impl Into<RotatedRect>) -> ImageView<'_> {
        ImageView::new(self, rect.into())
    }

    /// Mutably borrows the area `rect` of this image.
    ///
    /// Writes to pixels outside of the image are discarded.
    pub fn view_mut(&mut self, rect: impl Into<RotatedRect>) -> ImageViewMut<'_> {
        ImageViewMut::new(self, rect.into())
    }

    /// Mirrors the image horizontally, turning a camera frame into what a mirror would show.
    pub fn flip_horizontal_in_place(&mut self) {
        image::imageops::flip_horizontal_in_place(&mut self.buf);
    }

    /// Raw RGBA8 pixel data, row by row.
    #[inline]
    pub fn data(&self) -> &[u8] {
        self.buf.as_raw()
    }

    fn bounds(&self) -> Rect {
        Rect::from_top_left(0.0, 0.0, self.width() as f32, self.height() as f32)
    }
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Image({})", self.resolution())
    }
}

/// An 8-bit sRGB color with non-premultiplied alpha.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Color(pub(crate) [u8; 4]);

impl Color {
    /// Transparent black, read from outside of an image's bounds.
    pub const NULL: Self = Self([0, 0, 0, 0]);
    pub const BLACK: Self = Self::from_rgb8(0, 0, 0);
    pub const WHITE: Self = Self::from_rgb8(255, 255, 255);
    pub const RED: Self = Self::from_rgb8(255, 0, 0);
    pub const GREEN: Self = Self::from_rgb8(0, 255, 0);
    pub const BLUE: Self = Self::from_rgb8(0, 0, 255);

    /// Creates an opaque color.
    #[inline]
    pub const fn from_rgb8(r: u8, g: u8, b: u8) -> Self {
        Self([r, g, b, 255])
    }

    #[inline]
    pub fn r(&self) -> u8 {
        self.0[0]
    }

    #[inline]
    pub fn g(&self) -> u8 {
        self.0[1]
    }

    #[inline]
    pub fn b(&self) -> u8 {
        self.0[2]
    }

    #[inline]
    pub fn a(&self) -> u8 {
        self.0[3]
    }
}

impl PixelColor for Color {
    type Raw = RawU32;
}

/// Anything that network inputs can be read from: an [`Image`] or one of its views.
pub trait AsImageView {
    fn as_view(&self) -> ImageView<'_>;
}

/// Anything that annotations can be drawn onto.
pub trait AsImageViewMut: AsImageView {
    fn as_view_mut(&mut self) -> ImageViewMut<'_>;
}

impl AsImageView for Image {
    fn as_view(&self) -> ImageView<'_> {
        self.view(self.bounds())
    }
}

impl AsImageViewMut for Image {
    fn as_view_mut(&mut self) -> ImageViewMut<'_> {
        let bounds = self.bounds();
        self.view_mut(bounds)
    }
}
