//! Two-stage hand landmarking: palm detection followed by landmark estimation on each palm.

use crate::detection::Detector;
use crate::image::{draw, AsImageViewMut, Color, Image, ImageViewMut, Resolution};
use crate::landmark::{Estimator, NormalizedLandmark};
use crate::nn::NeuralNetwork;
use crate::rect::RotatedRect;
use crate::timer::Timer;

use super::detection::{hand_region, PalmDetectionNetwork};
use super::gesture::HandLandmarks;
use super::landmark::{
    connection_part, HandLandmarkNetwork, HandPart, Handedness, LandmarkIdx, LandmarkResult,
    CONNECTIONS, NUM_LANDMARKS,
};

/// Distance in pixels between the handedness label and the hand's landmarks.
const MARGIN: i32 = 10;
const LABEL_COLOR: Color = Color::from_rgb8(88, 205, 54);
const DOT_BORDER_COLOR: Color = Color::from_rgb8(224, 224, 224);
const PALM_CONNECTION_COLOR: Color = Color::from_rgb8(128, 128, 128);
const DOT_RADIUS: u32 = 5;

/// Tuning knobs of a [`HandLandmarker`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HandLandmarkerOptions {
    /// Maximum number of hands reported per image.
    pub num_hands: usize,
    /// Minimum palm detection score.
    pub min_detection_confidence: f32,
    /// Minimum hand presence score reported by the landmark network.
    pub min_presence_confidence: f32,
}

impl Default for HandLandmarkerOptions {
    fn default() -> Self {
        Self {
            num_hands: 2,
            min_detection_confidence: 0.5,
            min_presence_confidence: 0.5,
        }
    }
}

/// Detects hands in images and estimates their landmarks.
pub struct HandLandmarker {
    detector: Detector,
    estimator: Estimator<LandmarkResult>,
    options: HandLandmarkerOptions,
    rois: Vec<RotatedRect>,
    t_total: Timer,
}

impl HandLandmarker {
    /// Creates a hand landmarker from a palm detection network and a hand landmark network.
    pub fn new(
        palm: NeuralNetwork,
        landmark: NeuralNetwork,
        options: HandLandmarkerOptions,
    ) -> anyhow::Result<Self> {
        let mut detector = Detector::new(PalmDetectionNetwork::new(palm)?);
        detector.set_threshold(options.min_detection_confidence);
        let estimator = Estimator::new(HandLandmarkNetwork::new(landmark)?);
        log::debug!(
            "palm detection input: {}, landmark input: {}",
            detector.input_resolution(),
            estimator.input_resolution(),
        );

        Ok(Self {
            detector,
            estimator,
            options,
            rois: Vec::new(),
            t_total: Timer::new("hands"),
        })
    }

    /// Detects up to `num_hands` hands in `image`.
    ///
    /// Hands are returned in order of descending palm detection confidence.
    pub fn detect(&mut self, image: &Image) -> anyhow::Result<HandLandmarkerResult> {
        let _guard = self.t_total.start();
        let res = image.resolution();

        self.rois.clear();
        let detections = self.detector.detect(image)?;
        self.rois.extend(
            detections
                .iter()
                .take(self.options.num_hands)
                .map(hand_region),
        );

        let mut hands = Vec::with_capacity(self.rois.len());
        for roi in &self.rois {
            let view = image.view(*roi);
            let result = self.estimator.estimate(&view)?;
            if result.presence() < self.options.min_presence_confidence {
                log::trace!("dropping hand with presence {}", result.presence());
                continue;
            }

            let mut landmarks = [NormalizedLandmark::default(); NUM_LANDMARKS];
            for (out, lm) in landmarks.iter_mut().zip(result.landmarks().iter()) {
                *out = map_to_frame(roi, lm.position(), res);
            }
            let mut world_landmarks = [[0.0; 3]; NUM_LANDMARKS];
            for (out, lm) in world_landmarks
                .iter_mut()
                .zip(result.world_landmarks().iter())
            {
                *out = lm.position();
            }

            hands.push(DetectedHand {
                landmarks,
                world_landmarks,
                handedness: result.handedness(),
                handedness_score: result.handedness_score(),
                presence: result.presence(),
                roi: *roi,
            });
        }

        Ok(HandLandmarkerResult { hands })
    }

    /// Returns profiling timers for palm detection and landmark estimation.
    pub fn timers(&self) -> impl Iterator<Item = &Timer> + '_ {
        std::iter::once(&self.t_total)
            .chain(self.detector.timers())
            .chain(self.estimator.timers())
    }
}

/// Maps a landmark from the pixel space of the `roi` crop into normalized frame coordinates.
fn map_to_frame(roi: &RotatedRect, [x, y, z]: [f32; 3], frame: Resolution) -> NormalizedLandmark {
    let [x, y] = roi.transform_out(x, y);
    NormalizedLandmark::from_pixels([x, y, z], frame)
}

/// A hand found by [`HandLandmarker::detect`].
#[derive(Debug, Clone)]
pub struct DetectedHand {
    /// Landmarks normalized to the frame size.
    pub landmarks: HandLandmarks,
    /// Landmarks in meters, relative to the hand's center.
    pub world_landmarks: [[f32; 3]; NUM_LANDMARKS],
    /// Handedness as seen by the landmark network.
    pub handedness: Handedness,
    pub handedness_score: f32,
    pub presence: f32,
    /// The rotated crop of the frame the landmarks were estimated in.
    pub roi: RotatedRect,
}

impl DetectedHand {
    /// Returns the handedness label to display next to the hand in the mirrored frame.
    pub fn display_handedness(&self) -> Handedness {
        self.handedness.corrected()
    }

    /// Draws the hand skeleton and its handedness label onto `image`.
    pub fn draw<I: AsImageViewMut>(&self, image: &mut I) {
        self.draw_impl(&mut image.as_view_mut());
    }

    fn draw_impl(&self, image: &mut ImageViewMut<'_>) {
        let res = Resolution::new(image.width(), image.height());
        let pixels = self.landmarks.map(|lm| to_pixel(lm, res));

        for &(a, b) in CONNECTIONS {
            let (Some((ax, ay)), Some((bx, by))) = (pixels[a as usize], pixels[b as usize]) else {
                continue;
            };
            let (color, width) = match connection_part((a, b)) {
                HandPart::Palm => (PALM_CONNECTION_COLOR, 3),
                finger => (finger.color(), 2),
            };
            draw::line(image, (ax, ay), (bx, by), color, width);
        }

        for (index, px) in pixels.iter().enumerate() {
            let Some(center) = *px else { continue };
            draw::disc(image, center, (DOT_RADIUS + 1) * 2 + 1, DOT_BORDER_COLOR);
            draw::disc(image, center, DOT_RADIUS * 2 + 1, LANDMARK_PARTS[index].color());
        }

        let Some((min_x, min_y)) = label_anchor(&self.landmarks) else {
            return;
        };
        let text_x = (min_x * res.width() as f32) as i32;
        let text_y = (min_y * res.height() as f32) as i32 - MARGIN;
        draw::label(
            image,
            (text_x, text_y),
            self.display_handedness().as_str(),
            LABEL_COLOR,
        );
    }
}

/// Top left corner of the landmarks' bounding box, in normalized coordinates.
fn label_anchor(landmarks: &[NormalizedLandmark]) -> Option<(f32, f32)> {
    landmarks.iter().fold(None, |acc, lm| {
        let (x, y) = acc.unwrap_or((lm.x, lm.y));
        Some((x.min(lm.x), y.min(lm.y)))
    })
}

/// Part of each landmark, indexed by landmark.
const LANDMARK_PARTS: [HandPart; NUM_LANDMARKS] = {
    use LandmarkIdx::*;
    let idx = [
        Wrist,
        ThumbCmc,
        ThumbMcp,
        ThumbIp,
        ThumbTip,
        IndexFingerMcp,
        IndexFingerPip,
        IndexFingerDip,
        IndexFingerTip,
        MiddleFingerMcp,
        MiddleFingerPip,
        MiddleFingerDip,
        MiddleFingerTip,
        RingFingerMcp,
        RingFingerPip,
        RingFingerDip,
        RingFingerTip,
        PinkyMcp,
        PinkyPip,
        PinkyDip,
        PinkyTip,
    ];
    let mut parts = [HandPart::Palm; NUM_LANDMARKS];
    let mut i = 0;
    while i < NUM_LANDMARKS {
        parts[i] = idx[i].part();
        i += 1;
    }
    parts
};

/// Converts a normalized landmark to pixel coordinates, or `None` if it lies outside the image.
fn to_pixel(lm: NormalizedLandmark, res: Resolution) -> Option<(i32, i32)> {
    if !(0.0..=1.0).contains(&lm.x) || !(0.0..=1.0).contains(&lm.y) {
        return None;
    }
    let (x, y) = lm.to_pixels(res);
    let x = (x.floor() as i32).min(res.width() as i32 - 1);
    let y = (y.floor() as i32).min(res.height() as i32 - 1);
    Some((x, y))
}

/// The hands detected in one image.
#[derive(Debug, Clone, Default)]
pub struct HandLandmarkerResult {
    pub hands: Vec<DetectedHand>,
}

impl HandLandmarkerResult {
    pub fn is_empty(&self) -> bool {
        self.hands.is_empty()
    }

    pub fn hands(&self) -> &[DetectedHand] {
        &self.hands
    }

    /// Draws all detected hands onto `image`.
    pub fn draw<I: AsImageViewMut>(&self, image: &mut I) {
        let mut image = image.as_view_mut();
        for hand in &self.hands {
            hand.draw(&mut image);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::f32::consts::FRAC_PI_2;

    use approx::assert_relative_eq;

    use crate::rect::Rect;

    use super::*;

    #[test]
    fn maps_crop_back_to_frame() {
        let frame = Resolution::new(200, 100);
        let roi = RotatedRect::new(Rect::from_center(100.0, 50.0, 40.0, 40.0), FRAC_PI_2);

        // The crop center stays at the RoI center.
        let lm = map_to_frame(&roi, [20.0, 20.0, -4.0], frame);
        assert_relative_eq!(lm.x, 0.5, epsilon = 1e-5);
        assert_relative_eq!(lm.y, 0.5, epsilon = 1e-5);
        assert_relative_eq!(lm.z, -0.02, epsilon = 1e-6);

        // "Up" in the crop is "right" in the frame for a hand rotated by 90 degrees.
        let lm = map_to_frame(&roi, [20.0, 0.0, 0.0], frame);
        assert_relative_eq!(lm.x, 0.6, epsilon = 1e-5);
        assert_relative_eq!(lm.y, 0.5, epsilon = 1e-5);
    }

    #[test]
    fn landmark_parts() {
        assert_eq!(LANDMARK_PARTS[0], HandPart::Palm);
        assert_eq!(LANDMARK_PARTS[1], HandPart::Palm);
        assert_eq!(LANDMARK_PARTS[2], HandPart::Thumb);
        assert_eq!(LANDMARK_PARTS[17], HandPart::Palm);
        assert_eq!(LANDMARK_PARTS[20], HandPart::Pinky);
    }

    #[test]
    fn label_anchor_is_top_left() {
        let lm = |x, y| NormalizedLandmark { x, y, z: 0.0 };
        assert_eq!(
            label_anchor(&[lm(0.5, 0.2), lm(0.3, 0.6), lm(0.4, 0.1)]),
            Some((0.3, 0.1))
        );
        assert_eq!(label_anchor(&[]), None);
    }

    #[test]
    fn pixels_outside_are_skipped() {
        let res = Resolution::new(100, 50);
        let lm = |x, y| NormalizedLandmark { x, y, z: 0.0 };
        assert_eq!(to_pixel(lm(0.5, 0.5), res), Some((50, 25)));
        assert_eq!(to_pixel(lm(1.0, 1.0), res), Some((99, 49)));
        assert_eq!(to_pixel(lm(-0.1, 0.5), res), None);
        assert_eq!(to_pixel(lm(0.5, 1.2), res), None);
    }

    fn test_hand() -> DetectedHand {
        let mut landmarks = [NormalizedLandmark::default(); NUM_LANDMARKS];
        for (i, lm) in landmarks.iter_mut().enumerate() {
            lm.x = (32 + 2 * i) as f32 / 128.0;
            lm.y = (48 + 2 * i) as f32 / 128.0;
        }
        DetectedHand {
            landmarks,
            world_landmarks: [[0.0; 3]; NUM_LANDMARKS],
            handedness: Handedness::Left,
            handedness_score: 0.9,
            presence: 0.99,
            roi: Rect::from_center(50.0, 50.0, 10.0, 10.0).into(),
        }
    }

    #[test]
    fn draw_hand() {
        let mut image = Image::filled(Resolution::new(128, 128), Color::BLACK);
        let result = HandLandmarkerResult {
            hands: vec![test_hand()],
        };
        assert_eq!(result.hands()[0].display_handedness(), Handedness::Right);
        result.draw(&mut image);

        // Wrist dot.
        assert_eq!(image.get(32, 48), HandPart::Palm.color());
        // Last landmark (pinky tip) and its border.
        assert_eq!(image.get(72, 88), HandPart::Pinky.color());
        assert_eq!(image.get(72 + DOT_RADIUS + 1, 88), DOT_BORDER_COLOR);
        // The label sits above the landmarks.
        let label = (0..128)
            .flat_map(|x| (0..40).map(move |y| (x, y)))
            .filter(|&(x, y)| image.get(x, y) == LABEL_COLOR)
            .count();
        assert!(label > 0);
    }

    #[test]
    fn empty_result_draws_nothing() {
        let mut image = Image::filled(Resolution::new(16, 16), Color::BLACK);
        HandLandmarkerResult::default().draw(&mut image);
        assert!(image.data().chunks(4).all(|px| px == [0, 0, 0, 255]));
    }
}
