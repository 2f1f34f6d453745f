//! Hand landmark prediction.

use anyhow::bail;

use crate::image::Color;
use crate::iter::zip_exact;
use crate::landmark::{Confidence, Estimate, Landmarks, Network};
use crate::nn::{Cnn, CnnInputShape, ColorMapper, NeuralNetwork, Outputs};

/// Number of landmarks the hand landmark network predicts.
pub const NUM_LANDMARKS: usize = 21;

/// Landmark results estimated by [`HandLandmarkNetwork`].
#[derive(Debug, Clone)]
pub struct LandmarkResult {
    landmarks: Landmarks,
    world_landmarks: Landmarks,
    presence: f32,
    raw_handedness: f32,
}

impl Default for LandmarkResult {
    fn default() -> Self {
        LandmarkResult {
            landmarks: Landmarks::new(NUM_LANDMARKS),
            world_landmarks: Landmarks::new(NUM_LANDMARKS),
            presence: 0.0,
            raw_handedness: 0.0,
        }
    }
}

impl LandmarkResult {
    /// Returns the landmarks in the input image's coordinate system.
    pub fn landmarks(&self) -> &Landmarks {
        &self.landmarks
    }

    /// Returns the landmarks in real-world coordinates.
    ///
    /// These are in meters, with the origin at the hand's approximate geometric center.
    pub fn world_landmarks(&self) -> &Landmarks {
        &self.world_landmarks
    }

    /// Returns the probability that the analyzed image actually contains a hand.
    pub fn presence(&self) -> f32 {
        self.presence
    }

    /// Returns the estimated handedness of the hand in the image.
    ///
    /// This assumes that the camera image is passed in as-is, and the returned value should only be
    /// relied on when the presence is over some threshold.
    pub fn handedness(&self) -> Handedness {
        Handedness::from_score(self.raw_handedness)
    }

    /// Returns the network's confidence in [`LandmarkResult::handedness`].
    pub fn handedness_score(&self) -> f32 {
        match self.handedness() {
            Handedness::Right => self.raw_handedness,
            Handedness::Left => 1.0 - self.raw_handedness,
        }
    }
}

impl Estimate for LandmarkResult {
    #[inline]
    fn landmarks_mut(&mut self) -> &mut Landmarks {
        &mut self.landmarks
    }
}

impl Confidence for LandmarkResult {
    #[inline]
    fn confidence(&self) -> f32 {
        self.presence
    }
}

/// Whether a hand is a left or right hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handedness {
    Left,
    Right,
}

impl Handedness {
    /// Interprets the handedness output of the landmark network: above 0.5 is a right hand.
    pub fn from_score(score: f32) -> Self {
        if score > 0.5 {
            Handedness::Right
        } else {
            Handedness::Left
        }
    }

    /// Returns the opposite handedness.
    ///
    /// The displayed frames are mirrored, so the label shown next to a hand is the corrected one.
    #[must_use]
    pub fn corrected(self) -> Self {
        match self {
            Handedness::Left => Handedness::Right,
            Handedness::Right => Handedness::Left,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Handedness::Left => "Left",
            Handedness::Right => "Right",
        }
    }
}

/// Names for the hand pose landmarks.
///
/// # Terminology
///
/// - **CMC**: [Carpometacarpal joint], the lowest joint of the thumb, located near the wrist.
/// - **MCP**: [Metacarpophalangeal joint], the lower joint forming the knuckles near the palm of
///   the hand.
/// - **PIP**: Proximal Interphalangeal joint, the joint between the MCP and DIP.
/// - **DIP**: Distal Interphalangeal joint, the highest joint of a finger.
/// - **Tip**: This landmark is just placed on the tip of the finger, above the DIP.
///
/// [Carpometacarpal joint]: https://en.wikipedia.org/wiki/Carpometacarpal_joint
/// [Metacarpophalangeal joint]: https://en.wikipedia.org/wiki/Metacarpophalangeal_joint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LandmarkIdx {
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
}

impl LandmarkIdx {
    /// Returns the part of the hand this landmark belongs to.
    pub const fn part(self) -> HandPart {
        use LandmarkIdx::*;
        match self {
            Wrist | ThumbCmc | IndexFingerMcp | MiddleFingerMcp | RingFingerMcp | PinkyMcp => {
                HandPart::Palm
            }
            ThumbMcp | ThumbIp | ThumbTip => HandPart::Thumb,
            IndexFingerPip | IndexFingerDip | IndexFingerTip => HandPart::Index,
            MiddleFingerPip | MiddleFingerDip | MiddleFingerTip => HandPart::Middle,
            RingFingerPip | RingFingerDip | RingFingerTip => HandPart::Ring,
            PinkyPip | PinkyDip | PinkyTip => HandPart::Pinky,
        }
    }
}

/// Landmark groups that share a color when drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandPart {
    Palm,
    Thumb,
    Index,
    Middle,
    Ring,
    Pinky,
}

impl HandPart {
    /// Returns the color used to draw landmarks and connections of this part.
    pub fn color(self) -> Color {
        match self {
            HandPart::Palm => Color::from_rgb8(255, 48, 48),
            HandPart::Thumb => Color::from_rgb8(255, 229, 180),
            HandPart::Index => Color::from_rgb8(128, 64, 128),
            HandPart::Middle => Color::from_rgb8(255, 204, 0),
            HandPart::Ring => Color::from_rgb8(48, 255, 48),
            HandPart::Pinky => Color::from_rgb8(21, 101, 192),
        }
    }
}

/// The hand skeleton: pairs of landmarks that are connected by a bone or the palm outline.
pub const CONNECTIONS: &[(LandmarkIdx, LandmarkIdx)] = {
    use LandmarkIdx::*;
    &[
        // Surround the palm:
        (Wrist, ThumbCmc),
        (Wrist, IndexFingerMcp),
        (MiddleFingerMcp, RingFingerMcp),
        (RingFingerMcp, PinkyMcp),
        (IndexFingerMcp, MiddleFingerMcp),
        (Wrist, PinkyMcp),
        // Thumb:
        (ThumbCmc, ThumbMcp),
        (ThumbMcp, ThumbIp),
        (ThumbIp, ThumbTip),
        // Index:
        (IndexFingerMcp, IndexFingerPip),
        (IndexFingerPip, IndexFingerDip),
        (IndexFingerDip, IndexFingerTip),
        // Middle:
        (MiddleFingerMcp, MiddleFingerPip),
        (MiddleFingerPip, MiddleFingerDip),
        (MiddleFingerDip, MiddleFingerTip),
        // Ring:
        (RingFingerMcp, RingFingerPip),
        (RingFingerPip, RingFingerDip),
        (RingFingerDip, RingFingerTip),
        // Pinky:
        (PinkyMcp, PinkyPip),
        (PinkyPip, PinkyDip),
        (PinkyDip, PinkyTip),
    ]
};

/// Returns the part of the hand a connection is drawn as.
///
/// Connections between two palm landmarks belong to the palm, all others to the finger they lead
/// into.
pub fn connection_part((a, b): (LandmarkIdx, LandmarkIdx)) -> HandPart {
    match (a.part(), b.part()) {
        (HandPart::Palm, HandPart::Palm) => HandPart::Palm,
        (HandPart::Palm, finger) | (finger, _) => finger,
    }
}

/// The hand landmark network bundled in MediaPipe's hand landmarker.
///
/// Takes a 224x224 crop that contains one upright hand, and outputs 21 landmarks, the hand
/// presence, handedness, and world landmarks.
#[derive(Clone)]
pub struct HandLandmarkNetwork {
    cnn: Cnn,
}

impl HandLandmarkNetwork {
    /// Wraps a loaded hand landmark network, validating its inputs and outputs.
    pub fn new(nn: NeuralNetwork) -> anyhow::Result<Self> {
        let expected: [&[usize]; 4] = [&[1, 63], &[1, 1], &[1, 1], &[1, 63]];
        let shapes = nn.outputs().iter().map(|o| o.shape()).collect::<Vec<_>>();
        if shapes != expected {
            bail!(
                "unexpected hand landmark network outputs {:?} (expected {:?})",
                shapes,
                expected,
            );
        }

        let input_shape = nn.inputs().first().map_or(&[][..], |input| input.shape());
        let Some(layout) = CnnInputShape::detect(input_shape) else {
            bail!("unexpected hand landmark network input shape {input_shape:?}");
        };

        let cnn = Cnn::new(nn, layout, ColorMapper::linear(0.0..=1.0))?;
        Ok(Self { cnn })
    }
}

impl Network for HandLandmarkNetwork {
    type Output = LandmarkResult;

    fn cnn(&self) -> &Cnn {
        &self.cnn
    }

    fn extract(&self, outputs: &Outputs, estimate: &mut Self::Output) -> anyhow::Result<()> {
        extract(outputs, estimate)
    }
}

fn extract(outputs: &Outputs, estimate: &mut LandmarkResult) -> anyhow::Result<()> {
    if outputs.len() != 4 {
        bail!(
            "hand landmark network returned {} outputs, expected 4",
            outputs.len()
        );
    }
    let screen_landmarks = &outputs[0];
    let presence_flag = &outputs[1];
    let handedness = &outputs[2];
    let world_landmarks = &outputs[3];

    estimate.presence = presence_flag.index([0, 0]).as_singular();
    estimate.raw_handedness = handedness.index([0, 0]).as_singular();
    copy_positions(
        screen_landmarks.index([0]).as_slice(),
        &mut estimate.landmarks,
    );
    copy_positions(
        world_landmarks.index([0]).as_slice(),
        &mut estimate.world_landmarks,
    );

    Ok(())
}

fn copy_positions(flat: &[f32], landmarks: &mut Landmarks) {
    for (xyz, out) in zip_exact(flat.chunks_exact(3), landmarks.positions_mut()) {
        out.copy_from_slice(xyz);
    }
}
