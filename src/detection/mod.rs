//! Common functionality for object detection.
//!
//! The functionality defined in this module (and submodules) is meant to be reusable across
//! different SSD-style detectors.

pub mod nms;
pub mod ssd;

use crate::image::{AsImageView, ImageView, Resolution};
use crate::nn::{Cnn, Outputs};
use crate::rect::Rect;
use crate::timer::Timer;

use self::nms::NonMaxSuppression;

/// Trait implemented by neural networks that detect objects in an input image.
pub trait Network: Send + Sync + 'static {
    /// Returns the [`Cnn`] to use for detection.
    fn cnn(&self) -> &Cnn;

    /// Extracts all detections with confidence above `threshold` from the network's output.
    ///
    /// Keypoint and detection positions are expected to be in the coordinate system of the
    /// network's input.
    fn extract(
        &self,
        outputs: &Outputs,
        threshold: f32,
        detections: &mut Vec<Detection>,
    ) -> anyhow::Result<()>;
}

/// A generic object detector.
///
/// This type wraps a [`Network`] for object detection and takes care of aspect ratio correction
/// and non-maximum suppression.
pub struct Detector {
    network: Box<dyn Network>,
    detections: Vec<Detection>,
    t_infer: Timer,
    t_extract: Timer,
    t_nms: Timer,
    thresh: f32,
    nms: NonMaxSuppression,
}

impl Detector {
    pub const DEFAULT_THRESHOLD: f32 = 0.5;

    pub fn new<N: Network>(network: N) -> Self {
        Self {
            network: Box::new(network),
            detections: Vec::new(),
            t_infer: Timer::new("infer"),
            t_extract: Timer::new("extract"),
            t_nms: Timer::new("nms"),
            thresh: Self::DEFAULT_THRESHOLD,
            nms: NonMaxSuppression::new(),
        }
    }

    pub fn input_resolution(&self) -> Resolution {
        self.network.cnn().input_resolution()
    }

    /// Sets the minimum confidence of reported detections.
    #[inline]
    pub fn set_threshold(&mut self, thresh: f32) {
        self.thresh = thresh;
    }

    /// Runs the detector on `image`.
    ///
    /// Returns the detections in `image`'s coordinate system, most confident first.
    pub fn detect<V: AsImageView>(&mut self, image: &V) -> anyhow::Result<&[Detection]> {
        self.detect_impl(image.as_view())
    }

    fn detect_impl(&mut self, image: ImageView<'_>) -> anyhow::Result<&[Detection]> {
        self.detections.clear();

        let cnn = self.network.cnn();
        let input_res = cnn.input_resolution();
        let Some(aspect) = input_res.aspect_ratio() else {
            anyhow::bail!("detection network has empty input resolution {input_res}");
        };

        // If the input image's aspect ratio doesn't match the CNN's input, create an oversized view
        // that does. The area outside of the image reads as black bars.
        let rect = image.rect().grow_to_fit_aspect(aspect);
        let view = image.view(rect);
        let outputs = self.t_infer.time(|| cnn.estimate(&view))?;
        log::trace!("inference result: {:?}", outputs);

        self.t_extract
            .time(|| self.network.extract(&outputs, self.thresh, &mut self.detections))?;

        self.t_nms.time(|| self.nms.process(&mut self.detections));

        for det in &mut self.detections {
            det.map_from_input(rect, input_res);
        }

        Ok(&self.detections[..])
    }

    pub fn timers(&self) -> impl Iterator<Item = &Timer> + '_ {
        [&self.t_infer, &self.t_extract, &self.t_nms].into_iter()
    }
}

/// A detected object.
///
/// A [`Detection`] consists of a [`Rect`] enclosing the detected object, a confidence value, and
/// a possibly empty set of located keypoints. Detectors that need an object orientation derive it
/// from the keypoints after non-maximum suppression has merged them.
///
/// The confidence value lies between 0.0 and 1.0 and is the averaging weight used by
/// [`nms::NonMaxSuppression`].
#[derive(Debug, Clone)]
pub struct Detection {
    confidence: f32,
    rect: Rect,
    keypoints: Vec<Keypoint>,
}

impl Detection {
    pub fn new(confidence: f32, rect: Rect) -> Self {
        Self::with_keypoints(confidence, rect, Vec::new())
    }

    pub fn with_keypoints(confidence: f32, rect: Rect, keypoints: Vec<Keypoint>) -> Self {
        Self {
            confidence,
            rect,
            keypoints,
        }
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    /// Returns the axis-aligned bounding rectangle containing the detected object.
    pub fn bounding_rect(&self) -> Rect {
        self.rect
    }

    pub fn keypoints(&self) -> &[Keypoint] {
        &self.keypoints
    }

    /// Maps all coordinates from the network's input into the image that `letterbox` was cut from.
    ///
    /// `letterbox` is the view of the image that was scaled to the network's `input_res`.
    fn map_from_input(&mut self, letterbox: Rect, input_res: Resolution) {
        let scale = letterbox.width() / input_res.width() as f32;
        let (xc, yc) = self.rect.center();
        self.rect = Rect::from_center(
            xc * scale + letterbox.x(),
            yc * scale + letterbox.y(),
            self.rect.width() * scale,
            self.rect.height() * scale,
        );
        for kp in &mut self.keypoints {
            kp.x = kp.x * scale + letterbox.x();
            kp.y = kp.y * scale + letterbox.y();
        }
    }
}

/// A 2D keypoint produced as part of a [`Detection`].
///
/// The meaning of a keypoint depends on the specific detector and on its index in the keypoint
/// list. Typically keypoints are used to crop/rotate a detected object for further processing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    x: f32,
    y: f32,
}

impl Keypoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn x(&self) -> f32 {
        self.x
    }

    pub fn y(&self) -> f32 {
        self.y
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_letterboxed_coordinates() {
        // A 640x480 frame is padded to 640x640 before being scaled down to 192x192.
        let letterbox = Rect::from_top_left(0.0, 0.0, 640.0, 480.0)
            .grow_to_fit_aspect(1.0);
        assert_eq!(letterbox, Rect::from_top_left(0.0, -80.0, 640.0, 640.0));

        let mut det = Detection::with_keypoints(
            0.9,
            Rect::from_center(96.0, 96.0, 19.2, 38.4),
            vec![Keypoint::new(0.0, 192.0)],
        );
        det.map_from_input(letterbox, Resolution::new(192, 192));

        let rect = det.bounding_rect();
        assert!((rect.x_center() - 320.0).abs() < 1e-3);
        assert!((rect.y_center() - 240.0).abs() < 1e-3);
        assert!((rect.width() - 64.0).abs() < 1e-3);
        assert!((rect.height() - 128.0).abs() < 1e-3);
        assert!((det.keypoints()[0].y() - 560.0).abs() < 1e-3);
        assert_eq!(det.confidence(), 0.9);
    }
}
