//! Annotation primitives: skeleton lines, landmark dots and text labels.
//!
//! Shapes are rasterized by `embedded-graphics` and clipped to the target view.

use std::convert::Infallible;

use embedded_graphics::{
    draw_target::DrawTarget,
    mono_font::{ascii::FONT_10X20, MonoTextStyle},
    prelude::*,
    primitives::{Circle, Line, PrimitiveStyle, Rectangle},
    text::{Baseline, Text, TextStyle},
};

use super::{AsImageViewMut, Color, ImageViewMut};

/// Draws a line of `width` pixels from `from` to `to`.
pub fn line<I: AsImageViewMut>(
    image: &mut I,
    from: (i32, i32),
    to: (i32, i32),
    color: Color,
    width: u32,
) {
    let line =
        Line::new(point(from), point(to)).into_styled(PrimitiveStyle::with_stroke(color, width));
    render(image, &line);
}

/// Draws a filled disc of `diameter` pixels centered on `center`.
pub fn disc<I: AsImageViewMut>(image: &mut I, center: (i32, i32), diameter: u32, color: Color) {
    let disc =
        Circle::with_center(point(center), diameter).into_styled(PrimitiveStyle::with_fill(color));
    render(image, &disc);
}

/// Writes `text` in a 10x20 pixel font, with the bottom left corner of the text at `anchor`.
pub fn label<I: AsImageViewMut>(image: &mut I, anchor: (i32, i32), text: &str, color: Color) {
    let text = Text::with_text_style(
        text,
        point(anchor),
        MonoTextStyle::new(&FONT_10X20, color),
        TextStyle::with_baseline(Baseline::Bottom),
    );
    render(image, &text);
}

fn point((x, y): (i32, i32)) -> Point {
    Point::new(x, y)
}

fn render<I, D>(image: &mut I, drawable: &D)
where
    I: AsImageViewMut,
    D: Drawable<Color = Color>,
{
    let mut canvas = Canvas(image.as_view_mut());
    if let Err(never) = drawable.draw(&mut canvas) {
        match never {}
    }
}

/// Adapts an [`ImageViewMut`] to `embedded-graphics`, dropping pixels outside of the view.
struct Canvas<'a>(ImageViewMut<'a>);

impl Dimensions for Canvas<'_> {
    fn bounding_box(&self) -> Rectangle {
        Rectangle::new(Point::zero(), Size::new(self.0.width(), self.0.height()))
    }
}

impl DrawTarget for Canvas<'_> {
    type Color = Color;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Infallible>
    where
        I: IntoIterator<Item = Pixel<Color>>,
    {
        let (width, height) = (self.0.width(), self.0.height());
        for Pixel(pos, color) in pixels {
            if let (Ok(x), Ok(y)) = (u32::try_from(pos.x), u32::try_from(pos.y)) {
                if x < width && y < height {
                    self.0.set(x, y, color);
                }
            }
        }
        Ok(())
    }
}
