//! Common code for visual landmark estimation.

use crate::image::{AsImageView, ImageView, Resolution};
use crate::nn::{Cnn, Outputs};
use crate::timer::Timer;

type Position = [f32; 3];

/// A fixed-size list of landmark positions.
#[derive(Debug, Clone)]
pub struct Landmarks {
    positions: Box<[Position]>,
}

impl Landmarks {
    /// Creates a new [`Landmarks`] collection containing `len` preallocated landmarks.
    ///
    /// All landmarks will start with all coordinates at `0.0`.
    pub fn new(len: usize) -> Self {
        Self {
            positions: vec![[0.0, 0.0, 0.0]; len].into_boxed_slice(),
        }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = Landmark> + Clone + '_ {
        self.positions.iter().map(|&pos| Landmark::new(pos))
    }

    pub fn get(&self, index: usize) -> Landmark {
        Landmark::new(self.positions[index])
    }

    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    pub fn positions_mut(&mut self) -> &mut [Position] {
        &mut self.positions
    }

    pub fn map_positions(&mut self, mut f: impl FnMut(Position) -> Position) {
        for pos in self.positions_mut() {
            *pos = f(*pos);
        }
    }
}

/// A landmark in 3D space.
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct Landmark {
    pos: Position,
}

impl Landmark {
    pub fn new(position: Position) -> Self {
        Self { pos: position }
    }

    #[inline]
    pub fn position(&self) -> Position {
        self.pos
    }

    #[inline]
    pub fn x(&self) -> f32 {
        self.pos[0]
    }

    #[inline]
    pub fn y(&self) -> f32 {
        self.pos[1]
    }

    #[inline]
    pub fn z(&self) -> f32 {
        self.pos[2]
    }
}

/// A landmark with coordinates relative to the size of the analyzed image.
///
/// `x` and `y` are divided by the image width and height respectively, so points inside the image
/// lie in `[0, 1]`, and `y` grows downwards. `z` is the depth relative to the wrist, using the
/// same scale as `x`; smaller values are closer to the camera.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct NormalizedLandmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl NormalizedLandmark {
    /// Normalizes a position given in pixels of an image of resolution `res`.
    pub fn from_pixels([x, y, z]: Position, res: Resolution) -> Self {
        let (w, h) = (res.width() as f32, res.height() as f32);
        Self {
            x: x / w,
            y: y / h,
            z: z / w,
        }
    }

    /// Converts the landmark back into pixel coordinates of an image of resolution `res`.
    pub fn to_pixels(&self, res: Resolution) -> (f32, f32) {
        (self.x * res.width() as f32, self.y * res.height() as f32)
    }
}

/// Trait for landmark estimation results returned by [`Estimator::estimate`].
pub trait Estimate: Send + Sync + 'static {
    /// Returns the predicted [`Landmarks`].
    fn landmarks_mut(&mut self) -> &mut Landmarks;
}

/// Trait for network inference results that contain a confidence value.
pub trait Confidence {
    /// Confidence value indicating whether the object is actually in view.
    ///
    /// By convention, this is in range 0.0 to 1.0, with anything above 0.5 indicating that the
    /// object is probably present.
    fn confidence(&self) -> f32;
}

/// Trait implemented by wrapper types around neural networks that estimate landmarks.
pub trait Network: Send + Sync + 'static {
    /// Type representing the predicted landmarks.
    type Output: Estimate;

    /// Returns the [`Cnn`] to use for landmark estimation.
    fn cnn(&self) -> &Cnn;

    /// Extracts the network outputs and writes them to `estimate`.
    ///
    /// The landmark positions are expected to be in the coordinate system of the network's input.
    fn extract(&self, outputs: &Outputs, estimate: &mut Self::Output) -> anyhow::Result<()>;
}

/// Neural-network based landmark estimator.
///
/// This estimator processes an input image and yields an [`Estimate`] of type `E`, containing the
/// derived [`Landmarks`] and other data (depending on the network).
pub struct Estimator<E: Estimate> {
    network: Box<dyn Network<Output = E>>,
    estimate: E,
    t_infer: Timer,
    t_extract: Timer,
}

impl<E: Estimate + Default> Estimator<E> {
    pub fn new<N: Network<Output = E>>(network: N) -> Self {
        Self {
            network: Box::new(network),
            estimate: E::default(),
            t_infer: Timer::new("infer"),
            t_extract: Timer::new("extract"),
        }
    }
}

impl<E: Estimate> Estimator<E> {
    /// Returns the expected input resolution of the internal neural network.
    ///
    /// If an image is passed that has a different resolution, it will be sampled to match the input
    /// resolution. The [`Estimator`] will also automatically ensure that the aspect ratio matches
    /// by creating an oversized view of the input.
    pub fn input_resolution(&self) -> Resolution {
        self.network.cnn().input_resolution()
    }

    /// Returns profiling timers for this landmark estimator.
    pub fn timers(&self) -> impl Iterator<Item = &Timer> + '_ {
        [&self.t_infer, &self.t_extract].into_iter()
    }

    /// Performs landmark estimation on `image`, returning the [`Estimate`].
    ///
    /// Landmark positions (including depth) are scaled to the pixel size of `image`.
    ///
    /// If the aspect ratio of `image` does not match the aspect ratio of the network's input, an
    /// enlarged [`ImageView`] of the right aspect ratio is created first. If `image` is a view into
    /// a larger base image, this may include more pixels from the base image that aren't included
    /// in `image`. Otherwise, it adds black bars to pad the image to the right aspect ratio.
    pub fn estimate<V: AsImageView>(&mut self, image: &V) -> anyhow::Result<&mut E> {
        self.estimate_impl(image.as_view())
    }

    fn estimate_impl(&mut self, image: ImageView<'_>) -> anyhow::Result<&mut E> {
        let cnn = self.network.cnn();
        let input_res = cnn.input_resolution();
        let Some(aspect) = input_res.aspect_ratio() else {
            anyhow::bail!("landmark network has empty input resolution {input_res}");
        };

        let rect = image.rect().grow_to_fit_aspect(aspect);
        let view = image.view(rect);
        let outputs = self.t_infer.time(|| cnn.estimate(&view))?;
        log::trace!("inference result: {:?}", outputs);

        self.t_extract
            .time(|| self.network.extract(&outputs, &mut self.estimate))?;

        // Map landmark coordinates back into the input image, removing the offset of the
        // oversized view.
        let scale = rect.width() / input_res.width() as f32;
        self.estimate.landmarks_mut().map_positions(|pos| {
            let [x, y, z] = pos.map(|t| t * scale);
            [x + rect.x(), y + rect.y(), z]
        });

        Ok(&mut self.estimate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_landmark() {
        let res = Resolution::new(640, 480);
        let lm = NormalizedLandmark::from_pixels([320.0, 120.0, -64.0], res);
        assert_eq!(
            lm,
            NormalizedLandmark {
                x: 0.5,
                y: 0.25,
                z: -0.1
            }
        );
        assert_eq!(lm.to_pixels(res), (320.0, 120.0));
    }

    #[test]
    fn map_landmarks() {
        let mut landmarks = Landmarks::new(2);
        assert_eq!(landmarks.len(), 2);
        landmarks.positions_mut()[1] = [1.0, 2.0, 3.0];
        landmarks.map_positions(|[x, y, z]| [x + 1.0, y * 2.0, -z]);

        assert_eq!(landmarks.get(0).position(), [1.0, 0.0, -0.0]);
        assert_eq!(landmarks.get(1).position(), [2.0, 4.0, -3.0]);
        assert_eq!(landmarks.iter().map(|lm| lm.y()).sum::<f32>(), 4.0);
    }
}
