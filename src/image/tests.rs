use std::f32::consts::TAU;

use super::*;
use Color as C;

const YELLOW: Color = Color::from_rgb8(255, 255, 0);

fn mkimage<const W: usize, const H: usize>(rows: [[Color; W]; H]) -> Image {
    let buf = RgbaImage::from_fn(W as u32, H as u32, |x, y| {
        Rgba(rows[y as usize][x as usize].0)
    });
    Image { buf }
}

fn read_all(view: &ImageView<'_>) -> Vec<Color> {
    (0..view.height())
        .flat_map(|y| (0..view.width()).map(move |x| (x, y)))
        .map(|(x, y)| view.get(x, y))
        .collect()
}

#[test]
fn nested_views() {
    let image = mkimage([
        [YELLOW, C::WHITE, C::WHITE],
        [C::WHITE, C::RED, C::WHITE],
        [C::WHITE, C::WHITE, C::WHITE],
    ]);

    let center = image.view(Rect::from_top_left(1.0, 1.0, 1.0, 1.0));
    assert_eq!((center.width(), center.height()), (1, 1));
    assert_eq!(center.rect(), Rect::from_top_left(0.0, 0.0, 1.0, 1.0));
    assert_eq!(center.get(0, 0), C::RED);

    // Subview coordinates are relative to the parent view.
    let nested = center.view(Rect::from_top_left(-1.0, -1.0, 2.0, 2.0));
    assert_eq!(read_all(&nested), [YELLOW, C::WHITE, C::WHITE, C::RED]);
}

#[test]
fn rotated_views() {
    #[rustfmt::skip]
    let image = mkimage([
        [YELLOW, C::WHITE],
        [C::WHITE, C::RED],
    ]);
    let whole = Rect::from_top_left(0.0, 0.0, 2.0, 2.0);

    let flip = image.view(RotatedRect::new(whole, TAU / 2.0));
    assert_eq!(read_all(&flip), [C::RED, C::WHITE, C::WHITE, YELLOW]);

    let quarter = image.view(RotatedRect::new(whole, TAU / 4.0));
    assert_eq!(read_all(&quarter), [C::WHITE, C::RED, YELLOW, C::WHITE]);

    // Rotations of nested views add up.
    let chained = quarter.view(RotatedRect::new(whole, TAU / 4.0));
    assert_eq!(read_all(&chained), read_all(&flip));
}

#[test]
fn letterbox_reads_null() {
    #[rustfmt::skip]
    let image = mkimage([
        [C::RED, C::GREEN, C::RED, C::GREEN],
        [C::GREEN, C::RED, C::GREEN, C::RED],
    ]);

    // Padded to a square, like a network input.
    let view = image.as_view();
    let square = view.view(view.rect().grow_to_fit_aspect(1.0));
    assert_eq!((square.width(), square.height()), (4, 4));

    let pixels = read_all(&square);
    assert_eq!(pixels[..4], [Color::NULL; 4]);
    assert_eq!(pixels[4..12], read_all(&view)[..]);
    assert_eq!(pixels[12..], [Color::NULL; 4]);
}

#[test]
fn writes_outside_are_ignored() {
    let mut image = mkimage([[C::RED, C::GREEN]]);
    let mut view = image.view_mut(Rect::from_top_left(1.0, 0.0, 2.0, 1.0));
    view.set(0, 0, C::BLUE);
    view.set(1, 0, C::BLUE);

    assert_eq!(image.get(0, 0), C::RED);
    assert_eq!(image.get(1, 0), C::BLUE);
}

#[test]
fn mirror() {
    let mut image = mkimage([[C::RED, C::GREEN, C::BLUE]]);
    image.flip_horizontal_in_place();
    assert_eq!(image.data(), mkimage([[C::BLUE, C::GREEN, C::RED]]).data());
}

#[test]
fn filled() {
    let image = Image::filled(Resolution::new(3, 2), C::GREEN);
    assert_eq!(image.resolution(), Resolution::new(3, 2));
    assert_eq!(image.data().len(), 3 * 2 * 4);
    assert_eq!(read_all(&image.as_view()), [C::GREEN; 6]);
}

#[test]
fn shapes_are_clipped() {
    let mut image = Image::filled(Resolution::new(8, 8), C::BLACK);

    // Partially outside the image; must not panic.
    draw::disc(&mut image, (0, 0), 9, C::RED);
    draw::line(&mut image, (-5, 7), (20, 7), C::GREEN, 1);

    assert_eq!(image.get(0, 0), C::RED);
    assert_eq!(image.get(7, 7), C::GREEN);
    assert_eq!(image.get(7, 0), C::BLACK);
}

#[test]
fn label_is_above_anchor() {
    let mut image = Image::filled(Resolution::new(64, 48), C::BLACK);
    draw::label(&mut image, (2, 30), "Left", C::WHITE);

    let lit = (0..48)
        .flat_map(|y| (0..64).map(move |x| (x, y)))
        .filter(|&(x, y)| image.get(x, y) == C::WHITE)
        .collect::<Vec<_>>();
    assert!(!lit.is_empty());
    assert!(lit.iter().all(|&(x, y)| x >= 2 && y <= 30));
}
