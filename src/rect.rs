//! Rectangles for image views, detections and hand regions.

use std::fmt;

use nalgebra::{Point2, Rotation2, Vector2};

/// An axis-aligned rectangle with floating-point coordinates.
///
/// Width and height may be 0, but never negative.
#[derive(Clone, Copy, PartialEq)]
pub struct Rect {
    center: Point2<f32>,
    size: Vector2<f32>,
}

impl Rect {
    #[inline]
    pub fn from_center(x_center: f32, y_center: f32, width: f32, height: f32) -> Self {
        Self {
            center: Point2::new(x_center, y_center),
            size: Vector2::new(width, height),
        }
    }

    #[inline]
    pub fn from_top_left(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self::from_center(x + width / 2.0, y + height / 2.0, width, height)
    }

    /// Multiplies width and height by `factor`, keeping the center in place.
    #[must_use]
    pub fn scale(&self, factor: f32) -> Self {
        Self {
            size: self.size * factor,
            ..*self
        }
    }

    /// Pads the shorter dimension (relative to `aspect`) so that `width / height == aspect`.
    ///
    /// This is the letterboxing applied before an image is handed to a network.
    #[must_use]
    pub fn grow_to_fit_aspect(&self, aspect: f32) -> Self {
        let mut size = self.size;
        if self.height() * aspect >= self.width() {
            size.x = self.height() * aspect;
        } else {
            size.y = self.width() / aspect;
        }
        Self { size, ..*self }
    }

    /// Makes the rectangle square by extending its shorter side.
    #[must_use]
    pub fn square_long(&self) -> Self {
        let side = self.width().max(self.height());
        Self {
            size: Vector2::new(side, side),
            ..*self
        }
    }

    /// X coordinate of the left edge.
    #[inline]
    pub fn x(&self) -> f32 {
        self.center.x - self.size.x / 2.0
    }

    /// Y coordinate of the top edge.
    #[inline]
    pub fn y(&self) -> f32 {
        self.center.y - self.size.y / 2.0
    }

    #[inline]
    pub fn width(&self) -> f32 {
        self.size.x
    }

    #[inline]
    pub fn height(&self) -> f32 {
        self.size.y
    }

    #[inline]
    pub fn x_center(&self) -> f32 {
        self.center.x
    }

    #[inline]
    pub fn y_center(&self) -> f32 {
        self.center.y
    }

    #[inline]
    pub fn center(&self) -> (f32, f32) {
        (self.center.x, self.center.y)
    }

    fn area(&self) -> f32 {
        self.size.x * self.size.y
    }

    fn overlap_area(&self, other: &Rect) -> f32 {
        let w = (self.x() + self.width()).min(other.x() + other.width()) - self.x().max(other.x());
        let h =
            (self.y() + self.height()).min(other.y() + other.height()) - self.y().max(other.y());
        w.max(0.0) * h.max(0.0)
    }

    /// Intersection over union of `self` and `other`, between 0 and 1.
    ///
    /// Returns 0 if both rectangles are empty.
    pub fn iou(&self, other: &Rect) -> f32 {
        let overlap = self.overlap_area(other);
        let union = self.area() + other.area() - overlap;
        if union > 0.0 {
            overlap / union
        } else {
            0.0
        }
    }
}

impl fmt::Debug for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Rect({}x{} at {},{})",
            self.size.x, self.size.y, self.center.x, self.center.y
        )
    }
}

/// A [`Rect`] rotated clockwise around its center.
///
/// Hand regions are rotated so that the fingers of the cropped hand point up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotatedRect {
    rect: Rect,
    radians: f32,
}

impl RotatedRect {
    #[inline]
    pub fn new(rect: Rect, radians: f32) -> Self {
        Self { rect, radians }
    }

    /// Clockwise rotation, in radians.
    #[inline]
    pub fn rotation_radians(&self) -> f32 {
        self.radians
    }

    /// The rectangle before rotation.
    #[inline]
    pub fn rect(&self) -> &Rect {
        &self.rect
    }

    pub fn center(&self) -> (f32, f32) {
        self.rect.center()
    }

    /// Maps a point given relative to the top left corner of the rotated rectangle into the
    /// surrounding coordinate system.
    pub fn transform_out(&self, x: f32, y: f32) -> [f32; 2] {
        let from_center = Vector2::new(x, y) - self.rect.size / 2.0;
        let p = self.rect.center + Rotation2::new(self.radians) * from_center;
        [p.x, p.y]
    }
}

impl From<Rect> for RotatedRect {
    #[inline]
    fn from(rect: Rect) -> Self {
        Self::new(rect, 0.0)
    }
}

#[cfg(test)]
mod tests {
    use std::f32::consts::{FRAC_PI_2, PI};

    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn iou() {
        let rect = Rect::from_center(0.0, 0.0, 2.0, 2.0);
        assert_eq!(rect.iou(&rect), 1.0);
        assert_eq!(rect.iou(&Rect::from_center(10.0, 0.0, 2.0, 2.0)), 0.0);

        // Overlap 2, union 6.
        let shifted = Rect::from_center(1.0, 0.0, 2.0, 2.0);
        assert_abs_diff_eq!(rect.iou(&shifted), 1.0 / 3.0, epsilon = 1e-6);
        assert_eq!(rect.iou(&shifted), shifted.iou(&rect));

        // Touching edges do not overlap.
        assert_eq!(rect.iou(&Rect::from_center(2.0, 0.0, 2.0, 2.0)), 0.0);

        let empty = Rect::from_center(0.0, 0.0, 0.0, 0.0);
        assert_eq!(empty.iou(&empty), 0.0);
    }

    #[test]
    fn letterbox() {
        assert_eq!(
            Rect::from_center(10.0, 10.0, 50.0, 100.0).grow_to_fit_aspect(1.0),
            Rect::from_center(10.0, 10.0, 100.0, 100.0),
        );
        assert_eq!(
            Rect::from_top_left(0.0, 0.0, 640.0, 480.0).grow_to_fit_aspect(1.0),
            Rect::from_top_left(0.0, -80.0, 640.0, 640.0),
        );
        assert_eq!(
            Rect::from_top_left(0.0, 0.0, 100.0, 100.0).grow_to_fit_aspect(2.0),
            Rect::from_top_left(-50.0, 0.0, 200.0, 100.0),
        );
    }

    #[test]
    fn square_and_scale() {
        let rect = Rect::from_center(3.0, 4.0, 8.0, 2.0);
        assert_eq!(rect.square_long(), Rect::from_center(3.0, 4.0, 8.0, 8.0));
        assert_eq!(rect.scale(2.5), Rect::from_center(3.0, 4.0, 20.0, 5.0));
        assert_eq!(rect.x(), -1.0);
        assert_eq!(rect.y(), 3.0);
    }

    #[test]
    fn transform_unrotated() {
        let rect = RotatedRect::from(Rect::from_top_left(10.0, 20.0, 4.0, 4.0));
        assert_eq!(rect.transform_out(0.0, 0.0), [10.0, 20.0]);
        assert_eq!(rect.transform_out(4.0, 4.0), [14.0, 24.0]);
    }

    #[test]
    fn transform_rotated() {
        // A quarter turn moves the top left corner of a square onto its top right corner.
        let rect = RotatedRect::new(Rect::from_top_left(0.0, 0.0, 2.0, 2.0), FRAC_PI_2);
        let [x, y] = rect.transform_out(0.0, 0.0);
        assert_abs_diff_eq!(x, 2.0, epsilon = 1e-5);
        assert_abs_diff_eq!(y, 0.0, epsilon = 1e-5);

        // A half turn mirrors through the center.
        let flipped = RotatedRect::new(Rect::from_top_left(0.0, 0.0, 2.0, 2.0), PI);
        let [x, y] = flipped.transform_out(0.5, 0.5);
        assert_abs_diff_eq!(x, 1.5, epsilon = 1e-5);
        assert_abs_diff_eq!(y, 1.5, epsilon = 1e-5);
    }
}
