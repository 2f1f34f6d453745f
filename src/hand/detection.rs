//! Palm detection.

use anyhow::bail;
use nalgebra::{Point2, Rotation2, Vector2};
use once_cell::sync::Lazy;

use crate::detection::ssd::{Anchor, Anchors, LayerInfo};
use crate::detection::{self, Detection, Network};
use crate::image::Resolution;
use crate::nn::{Cnn, CnnInputShape, ColorMapper, NeuralNetwork, Outputs};
use crate::num::sigmoid;
use crate::rect::{Rect, RotatedRect};

/// A keypoint of a palm [`Detection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keypoint {
    Wrist = 0,
    IndexFingerMcp = 1,
    MiddleFingerMcp = 2,
    RingFingerMcp = 3,
    PinkyMcp = 4,
    ThumbCmc = 5,
    ThumbMcp = 6,
}

/// A list of all [`Keypoint`]s.
pub const ALL_KEYPOINTS: &[Keypoint] = &[
    Keypoint::Wrist,
    Keypoint::IndexFingerMcp,
    Keypoint::MiddleFingerMcp,
    Keypoint::RingFingerMcp,
    Keypoint::PinkyMcp,
    Keypoint::ThumbCmc,
    Keypoint::ThumbMcp,
];

/// Values per anchor in the box regressor output: box center and size, then 7 keypoints.
const BOX_PARAMS: usize = 4 + 2 * 7;

static ANCHORS: Lazy<Anchors> =
    Lazy::new(|| Anchors::calculate(&[LayerInfo::new(2, 24, 24), LayerInfo::new(6, 12, 12)]));

/// The palm detection network bundled in MediaPipe's hand landmarker.
///
/// Takes a 192x192 image and outputs a box, 7 keypoints and a score for each of its 2016 anchors.
#[derive(Clone)]
pub struct PalmDetectionNetwork {
    cnn: Cnn,
}

impl PalmDetectionNetwork {
    /// Wraps a loaded palm detection network.
    pub fn new(nn: NeuralNetwork) -> anyhow::Result<Self> {
        let input_shape = nn.inputs().first().map_or(&[][..], |input| input.shape());
        let Some(layout) = CnnInputShape::detect(input_shape) else {
            bail!("unexpected palm detection network input shape {input_shape:?}");
        };

        let cnn = Cnn::new(nn, layout, ColorMapper::linear(0.0..=1.0))?;
        Ok(Self { cnn })
    }
}

impl Network for PalmDetectionNetwork {
    fn cnn(&self) -> &Cnn {
        &self.cnn
    }

    fn extract(
        &self,
        outputs: &Outputs,
        threshold: f32,
        detections: &mut Vec<Detection>,
    ) -> anyhow::Result<()> {
        extract_outputs(
            self.cnn.input_resolution(),
            outputs,
            threshold,
            detections,
        )
    }
}

fn extract_outputs(
    input_res: Resolution,
    outputs: &Outputs,
    thresh: f32,
    detections: &mut Vec<Detection>,
) -> anyhow::Result<()> {
    let num_anchors = ANCHORS.anchor_count();

    // The output order differs between model conversions, so go by shape.
    let boxes = outputs
        .iter()
        .find(|t| t.shape() == [1, num_anchors, BOX_PARAMS])
        .ok_or_else(|| palm_output_error(outputs, BOX_PARAMS))?;
    let confidences = outputs
        .iter()
        .find(|t| t.shape() == [1, num_anchors, 1])
        .ok_or_else(|| palm_output_error(outputs, 1))?;

    for (index, view) in confidences.index([0]).iter().enumerate() {
        let conf = sigmoid(view.as_singular());
        if conf < thresh {
            continue;
        }

        let box_params = boxes.index([0, index]);
        detections.push(extract_detection(
            &ANCHORS[index],
            input_res,
            box_params.as_slice(),
            conf,
        ));
    }

    Ok(())
}

fn palm_output_error(outputs: &Outputs, values: usize) -> anyhow::Error {
    let shapes = outputs.iter().map(|t| t.shape().to_vec()).collect::<Vec<_>>();
    anyhow::anyhow!(
        "palm detection network has no output of shape [1, {}, {}] (outputs: {:?})",
        ANCHORS.anchor_count(),
        values,
        shapes,
    )
}

fn extract_detection(
    anchor: &Anchor,
    input_res: Resolution,
    box_params: &[f32],
    confidence: f32,
) -> Detection {
    let input_w = input_res.width() as f32;
    let input_h = input_res.height() as f32;

    let xc = box_params[0] + anchor.x_center() * input_w;
    let yc = box_params[1] + anchor.y_center() * input_h;
    let w = box_params[2];
    let h = box_params[3];
    let keypoints = box_params[4..BOX_PARAMS]
        .chunks_exact(2)
        .map(|xy| {
            detection::Keypoint::new(
                xy[0] + anchor.x_center() * input_w,
                xy[1] + anchor.y_center() * input_h,
            )
        })
        .collect();

    Detection::with_keypoints(confidence, Rect::from_center(xc, yc, w, h), keypoints)
}

/// Computes the clockwise rotation that makes the hand upright, from the wrist and middle finger
/// keypoints.
///
/// Detections without palm keypoints are treated as upright.
fn palm_angle(det: &Detection) -> f32 {
    let kps = det.keypoints();
    let (Some(a), Some(b)) = (
        kps.get(Keypoint::MiddleFingerMcp as usize),
        kps.get(Keypoint::Wrist as usize),
    ) else {
        return 0.0;
    };
    let finger = Point2::new(a.x(), a.y());
    let wrist = Point2::new(b.x(), b.y());

    let rel = wrist - finger;
    Rotation2::rotation_between(&Vector2::y(), &rel).angle()
}

/// Computes the region of interest to crop for landmark estimation from a palm detection.
///
/// The palm box is rotated so that the fingers point up, shifted towards the fingers by half its
/// height, made square and then enlarged to include the whole hand.
///
/// The rotation is computed from the keypoints of `det`, after non-maximum suppression has
/// averaged them. Averaging per-anchor angles instead breaks for hands pointing down.
pub fn hand_region(det: &Detection) -> RotatedRect {
    const SHIFT_Y: f32 = -0.5;
    const SCALE: f32 = 2.6;

    let angle = palm_angle(det);
    let palm = RotatedRect::new(det.bounding_rect(), angle);
    let (w, h) = (palm.rect().width(), palm.rect().height());
    let [xc, yc] = palm.transform_out(w * 0.5, h * 0.5 + SHIFT_Y * h);

    RotatedRect::new(
        Rect::from_center(xc, yc, w, h).square_long().scale(SCALE),
        angle,
    )
}

#[cfg(test)]
mod tests {
    use std::f32::consts::{FRAC_PI_2, PI};

    use approx::assert_relative_eq;

    use crate::detection::nms::NonMaxSuppression;
    use crate::nn::tensor::Tensor;

    use super::*;

    fn upright_palm() -> Detection {
        // Wrist below the middle finger MCP.
        let mut kps = vec![detection::Keypoint::new(0.0, 0.0); ALL_KEYPOINTS.len()];
        kps[Keypoint::Wrist as usize] = detection::Keypoint::new(100.0, 140.0);
        kps[Keypoint::MiddleFingerMcp as usize] = detection::Keypoint::new(100.0, 90.0);
        Detection::with_keypoints(0.9, Rect::from_center(100.0, 110.0, 40.0, 60.0), kps)
    }

    #[test]
    fn upright_hand_has_no_rotation() {
        let det = upright_palm();
        assert_relative_eq!(palm_angle(&det), 0.0);
    }

    #[test]
    fn sideways_hand_is_rotated() {
        let mut kps = vec![detection::Keypoint::new(0.0, 0.0); ALL_KEYPOINTS.len()];
        // Fingers pointing to the right.
        kps[Keypoint::Wrist as usize] = detection::Keypoint::new(50.0, 100.0);
        kps[Keypoint::MiddleFingerMcp as usize] = detection::Keypoint::new(100.0, 100.0);
        let det = Detection::with_keypoints(0.9, Rect::from_center(75.0, 100.0, 40.0, 40.0), kps);
        assert_relative_eq!(palm_angle(&det), FRAC_PI_2, epsilon = 1e-5);
    }

    #[test]
    fn region_shifts_towards_fingers() {
        let roi = hand_region(&upright_palm());
        assert_relative_eq!(roi.rotation_radians(), 0.0);

        let (xc, yc) = roi.center();
        assert_relative_eq!(xc, 100.0, epsilon = 1e-4);
        assert_relative_eq!(yc, 80.0, epsilon = 1e-4);
        assert_relative_eq!(roi.rect().width(), 60.0 * 2.6, epsilon = 1e-3);
        assert_relative_eq!(roi.rect().height(), 60.0 * 2.6, epsilon = 1e-3);
    }

    #[test]
    fn rotated_region_shifts_along_hand() {
        let mut kps = vec![detection::Keypoint::new(0.0, 0.0); ALL_KEYPOINTS.len()];
        kps[Keypoint::Wrist as usize] = detection::Keypoint::new(-10.0, 0.0);
        let det = Detection::with_keypoints(0.9, Rect::from_center(0.0, 0.0, 20.0, 20.0), kps);
        let roi = hand_region(&det);
        assert_relative_eq!(roi.rotation_radians(), FRAC_PI_2, epsilon = 1e-5);
        let (xc, yc) = roi.center();
        assert_relative_eq!(xc, 10.0, epsilon = 1e-4);
        assert_relative_eq!(yc, 0.0, epsilon = 1e-4);
    }

    #[test]
    fn palm_without_keypoints_is_upright() {
        let det = Detection::new(0.9, Rect::from_center(0.0, 0.0, 20.0, 20.0));
        assert_eq!(hand_region(&det).rotation_radians(), 0.0);
    }

    /// Anchors on a hand pointing down report angles on both sides of +-pi.
    fn downward_palm(middle_x: f32) -> Detection {
        let mut kps = vec![detection::Keypoint::new(0.0, 0.0); ALL_KEYPOINTS.len()];
        kps[Keypoint::Wrist as usize] = detection::Keypoint::new(0.0, 0.0);
        kps[Keypoint::MiddleFingerMcp as usize] = detection::Keypoint::new(middle_x, 1.0);
        Detection::with_keypoints(0.9, Rect::from_center(0.0, 0.5, 1.0, 1.0), kps)
    }

    #[test]
    fn merged_downward_palm_stays_upside_down() {
        let a = downward_palm(0.0416);
        let b = downward_palm(-0.0416);
        assert_relative_eq!(palm_angle(&a), 3.1, epsilon = 1e-3);
        assert_relative_eq!(palm_angle(&b), -3.1, epsilon = 1e-3);

        let mut detections = vec![a, b];
        NonMaxSuppression::new().process(&mut detections);
        assert_eq!(detections.len(), 1);

        let angle = hand_region(&detections[0]).rotation_radians();
        assert_relative_eq!(angle.abs(), PI, epsilon = 1e-4);
    }

    #[test]
    fn extracts_confident_anchors() {
        let n = ANCHORS.anchor_count();
        let boxes = Tensor::from_array_shape_fn([1, n, BOX_PARAMS], |[_, anchor, param]| {
            match (anchor, param) {
                (5, 2) | (5, 3) => 30.0,
                (5, 5) => 10.0,
                _ => 0.0,
            }
        });
        let scores =
            Tensor::from_array_shape_fn([1, n, 1], |[_, anchor, _]| if anchor == 5 { 4.0 } else { -4.0 });
        // Scores first, to check that outputs are identified by shape.
        let outputs = [scores, boxes].into_iter().collect::<Outputs>();

        let mut detections = Vec::new();
        extract_outputs(Resolution::new(192, 192), &outputs, 0.5, &mut detections).unwrap();

        assert_eq!(detections.len(), 1);
        let det = &detections[0];
        assert_relative_eq!(det.confidence(), sigmoid(4.0));
        // Anchor 5 is in the third cell of the first row of the 24x24 layer.
        assert_relative_eq!(det.bounding_rect().x_center(), 2.5 / 24.0 * 192.0);
        assert_relative_eq!(det.bounding_rect().y_center(), 0.5 / 24.0 * 192.0);
        assert_relative_eq!(det.bounding_rect().width(), 30.0);
        assert_eq!(det.keypoints().len(), ALL_KEYPOINTS.len());
        // The wrist is 10 pixels below the middle finger MCP.
        assert_relative_eq!(palm_angle(det), 0.0, epsilon = 1e-5);
    }

    #[test]
    fn missing_outputs_are_an_error() {
        let outputs = [Tensor::from_iter(&[1, 1], [0.0])]
            .into_iter()
            .collect::<Outputs>();
        let mut detections = Vec::new();
        assert!(extract_outputs(Resolution::new(192, 192), &outputs, 0.5, &mut detections).is_err());
    }
}
