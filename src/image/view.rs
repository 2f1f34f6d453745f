use std::fmt;

use crate::rect::{Rect, RotatedRect};

use super::{AsImageView, AsImageViewMut, Color, Image, Resolution};

/// Where a view's pixels come from in the image it borrows.
#[derive(Debug, Clone, Copy)]
struct Placement {
    /// The view's area in image coordinates.
    area: RotatedRect,
}

impl Placement {
    /// Places `rect`, given relative to the top left corner of `self`, in image coordinates.
    ///
    /// Rotations add up, so a hand region can be cut out of a rotated view.
    fn nest(&self, rect: RotatedRect) -> Self {
        let (cx, cy) = rect.center();
        let [cx, cy] = self.area.transform_out(cx, cy);
        let size = rect.rect();
        Self {
            area: RotatedRect::new(
                Rect::from_center(cx, cy, size.width(), size.height()),
                self.area.rotation_radians() + rect.rotation_radians(),
            ),
        }
    }

    fn width(&self) -> u32 {
        self.area.rect().width() as u32
    }

    fn height(&self) -> u32 {
        self.area.rect().height() as u32
    }

    /// The view's extent in its own coordinates, keeping fractional sizes.
    fn local_rect(&self) -> Rect {
        let area = self.area.rect();
        Rect::from_top_left(0.0, 0.0, area.width(), area.height())
    }

    /// Returns the image pixel that pixel `(x, y)` of the view maps to, if it lies in `image`.
    fn source(&self, x: u32, y: u32, image: Resolution) -> Option<(u32, u32)> {
        // Sample at pixel centers so that rotations by multiples of 90 degrees are exact.
        let [sx, sy] = self.area.transform_out(x as f32 + 0.5, y as f32 + 0.5);
        let (sx, sy) = ((sx - 0.5).round(), (sy - 0.5).round());

        let inside = (0.0..image.width() as f32).contains(&sx)
            && (0.0..image.height() as f32).contains(&sy);
        inside.then_some((sx as u32, sy as u32))
    }
}

/// A read-only, possibly rotated, window into an [`Image`].
#[derive(Clone, Copy)]
pub struct ImageView<'a> {
    image: &'a Image,
    placement: Placement,
}

impl<'a> ImageView<'a> {
    pub(super) fn new(image: &'a Image, area: RotatedRect) -> Self {
        Self {
            image,
            placement: Placement { area: image.bounds().into() }.nest(area),
        }
    }

    pub fn width(&self) -> u32 {
        self.placement.width()
    }

    pub fn height(&self) -> u32 {
        self.placement.height()
    }

    /// The area covered by this view, in its own coordinates (top left corner at the origin).
    pub fn rect(&self) -> Rect {
        self.placement.local_rect()
    }

    /// Reads pixel `(x, y)` of the view, or [`Color::NULL`] if it maps outside of the image.
    pub fn get(&self, x: u32, y: u32) -> Color {
        self.placement
            .source(x, y, self.image.resolution())
            .map_or(Color::NULL, |(x, y)| self.image.get(x, y))
    }

    /// Borrows the area `rect` of this view, given in this view's coordinates.
    pub fn view(&self, rect: impl Into<RotatedRect>) -> ImageView<'a> {
        ImageView {
            image: self.image,
            placement: self.placement.nest(rect.into()),
        }
    }
}

impl fmt::Debug for ImageView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageView")
            .field("area", &self.placement.area)
            .finish_non_exhaustive()
    }
}

/// A writable, possibly rotated, window into an [`Image`].
pub struct ImageViewMut<'a> {
    image: &'a mut Image,
    placement: Placement,
}

impl<'a> ImageViewMut<'a> {
    pub(super) fn new(image: &'a mut Image, area: RotatedRect) -> Self {
        let placement = Placement {
            area: image.bounds().into(),
        }
        .nest(area);
        Self { image, placement }
    }

    pub fn width(&self) -> u32 {
        self.placement.width()
    }

    pub fn height(&self) -> u32 {
        self.placement.height()
    }

    /// Writes pixel `(x, y)` of the view. Pixels that map outside of the image are skipped.
    pub fn set(&mut self, x: u32, y: u32, color: Color) {
        if let Some((x, y)) = self.placement.source(x, y, self.image.resolution()) {
            self.image.buf[(x, y)].0 = color.0;
        }
    }

    /// Borrows `self` again for a shorter lifetime, like `&mut *r` does for references.
    pub fn reborrow(&mut self) -> ImageViewMut<'_> {
        ImageViewMut {
            image: &mut *self.image,
            placement: self.placement,
        }
    }
}

impl fmt::Debug for ImageViewMut<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageViewMut")
            .field("area", &self.placement.area)
            .finish_non_exhaustive()
    }
}

impl AsImageView for ImageView<'_> {
    fn as_view(&self) -> ImageView<'_> {
        *self
    }
}

impl AsImageView for ImageViewMut<'_> {
    fn as_view(&self) -> ImageView<'_> {
        ImageView {
            image: &*self.image,
            placement: self.placement,
        }
    }
}

impl AsImageViewMut for ImageViewMut<'_> {
    fn as_view_mut(&mut self) -> ImageViewMut<'_> {
        self.reborrow()
    }
}
