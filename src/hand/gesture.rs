//! Simple finger gestures derived from hand landmarks.
//!
//! All checks operate on [`NormalizedLandmark`]s of an upright hand in image space, where `y` grows
//! downwards.

use std::fmt;
use std::str::FromStr;

use anyhow::bail;

use crate::landmark::NormalizedLandmark;

use super::landmark::{LandmarkIdx, NUM_LANDMARKS};

/// The landmarks of one hand.
pub type HandLandmarks = [NormalizedLandmark; NUM_LANDMARKS];

/// Minimum horizontal distance between thumb tip and thumb MCP for the thumb to count as "out".
pub const THUMB_OUT_THRESHOLD: f32 = 0.05;

/// Returns whether the landmark `tip` lies strictly above the landmark `joint`.
pub fn is_finger_up(landmarks: &HandLandmarks, tip: LandmarkIdx, joint: LandmarkIdx) -> bool {
    landmarks[tip as usize].y < landmarks[joint as usize].y
}

/// Returns whether the thumb is spread away from the hand.
pub fn is_thumb_out(landmarks: &HandLandmarks) -> bool {
    let tip = landmarks[LandmarkIdx::ThumbTip as usize];
    let mcp = landmarks[LandmarkIdx::ThumbMcp as usize];
    (tip.x - mcp.x).abs() > THUMB_OUT_THRESHOLD
}

/// Minimum horizontal distance between thumb tip and the center of the knuckles for the thumb to
/// count as spread under [`FingerRules::Strict`].
pub const THUMB_SPREAD_THRESHOLD: f32 = 0.1;

/// Returns whether `finger` is extended: its tip lies above both its knuckle and the wrist.
pub fn is_finger_extended(landmarks: &HandLandmarks, finger: Finger) -> bool {
    let (tip, _) = finger.landmarks();
    let tip = landmarks[tip as usize].y;
    tip < landmarks[finger.mcp() as usize].y && tip < landmarks[LandmarkIdx::Wrist as usize].y
}

/// Returns whether the thumb tip is far from the mean X coordinate of the four finger knuckles.
///
/// Unlike [`is_thumb_out`], this does not depend on how the thumb itself is bent.
pub fn is_thumb_spread(landmarks: &HandLandmarks) -> bool {
    let knuckles = Finger::ALL
        .iter()
        .map(|finger| landmarks[finger.mcp() as usize].x)
        .sum::<f32>()
        / Finger::ALL.len() as f32;
    (landmarks[LandmarkIdx::ThumbTip as usize].x - knuckles).abs() > THUMB_SPREAD_THRESHOLD
}

/// Which set of predicates decides whether fingers are up and the thumb is out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FingerRules {
    /// [`is_finger_up`] against the joint from [`Finger::landmarks`], and [`is_thumb_out`].
    #[default]
    Simple,
    /// [`is_finger_extended`] and [`is_thumb_spread`]. Less sensitive to half-bent fingers.
    Strict,
}

impl FromStr for FingerRules {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "simple" => Self::Simple,
            "strict" => Self::Strict,
            _ => bail!("invalid finger rules '{s}' (expected 'simple' or 'strict')"),
        })
    }
}

/// The four non-thumb fingers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finger {
    Index,
    Middle,
    Ring,
    Pinky,
}

impl Finger {
    pub const ALL: [Finger; 4] = [Finger::Index, Finger::Middle, Finger::Ring, Finger::Pinky];

    /// Returns the `(tip, joint)` landmarks compared by [`is_finger_up`].
    ///
    /// The pinky is compared against its DIP joint, all other fingers against their PIP joint.
    pub fn landmarks(self) -> (LandmarkIdx, LandmarkIdx) {
        use LandmarkIdx::*;
        match self {
            Finger::Index => (IndexFingerTip, IndexFingerPip),
            Finger::Middle => (MiddleFingerTip, MiddleFingerPip),
            Finger::Ring => (RingFingerTip, RingFingerPip),
            Finger::Pinky => (PinkyTip, PinkyDip),
        }
    }

    /// The knuckle at the base of the finger.
    pub fn mcp(self) -> LandmarkIdx {
        match self {
            Finger::Index => LandmarkIdx::IndexFingerMcp,
            Finger::Middle => LandmarkIdx::MiddleFingerMcp,
            Finger::Ring => LandmarkIdx::RingFingerMcp,
            Finger::Pinky => LandmarkIdx::PinkyMcp,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Finger::Index => "Index",
            Finger::Middle => "Middle",
            Finger::Ring => "Ring",
            Finger::Pinky => "Pinky",
        }
    }
}

impl fmt::Display for Finger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Evaluated finger and thumb state of one hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandState {
    up: [bool; 4],
    thumb_out: bool,
}

impl HandState {
    /// Applies `rules` to the landmarks of an upright hand.
    pub fn evaluate(landmarks: &HandLandmarks, rules: FingerRules) -> Self {
        match rules {
            FingerRules::Simple => Self {
                up: Finger::ALL.map(|finger| {
                    let (tip, joint) = finger.landmarks();
                    is_finger_up(landmarks, tip, joint)
                }),
                thumb_out: is_thumb_out(landmarks),
            },
            FingerRules::Strict => Self {
                up: Finger::ALL.map(|finger| is_finger_extended(landmarks, finger)),
                thumb_out: is_thumb_spread(landmarks),
            },
        }
    }

    pub fn is_up(&self, finger: Finger) -> bool {
        self.up[finger as usize]
    }

    pub fn is_down(&self, finger: Finger) -> bool {
        !self.is_up(finger)
    }

    pub fn thumb_out(&self) -> bool {
        self.thumb_out
    }

    /// Returns whether all four fingers (excluding the thumb) are down.
    pub fn all_fingers_down(&self) -> bool {
        Finger::ALL.iter().all(|&finger| self.is_down(finger))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_y(tip: f32, joint: f32) -> HandLandmarks {
        let mut lms = [NormalizedLandmark::default(); NUM_LANDMARKS];
        lms[8].y = tip;
        lms[6].y = joint;
        lms
    }

    #[test]
    fn finger_up_is_strict() {
        use LandmarkIdx::{IndexFingerPip, IndexFingerTip};
        assert!(is_finger_up(&with_y(0.3, 0.5), IndexFingerTip, IndexFingerPip));
        assert!(!is_finger_up(&with_y(0.6, 0.5), IndexFingerTip, IndexFingerPip));
        assert!(!is_finger_up(&with_y(0.5, 0.5), IndexFingerTip, IndexFingerPip));
    }

    #[test]
    fn thumb_out() {
        let mut lms = [NormalizedLandmark::default(); NUM_LANDMARKS];
        lms[4].x = 0.10;
        lms[2].x = 0.02;
        assert!(is_thumb_out(&lms));
        lms[2].x = 0.08;
        assert!(!is_thumb_out(&lms));

        lms[4].x = 0.02;
        lms[2].x = 0.10;
        assert!(is_thumb_out(&lms));
    }

    #[test]
    fn finger_landmark_pairs() {
        let pairs = Finger::ALL.map(|f| {
            let (tip, joint) = f.landmarks();
            (tip as usize, joint as usize)
        });
        assert_eq!(pairs, [(8, 6), (12, 10), (16, 14), (20, 19)]);
    }

    #[test]
    fn all_fingers_down_needs_every_finger() {
        let mut lms = [NormalizedLandmark::default(); NUM_LANDMARKS];
        // Fingertips below their joints.
        for finger in Finger::ALL {
            let (tip, joint) = finger.landmarks();
            lms[tip as usize].y = 0.8;
            lms[joint as usize].y = 0.6;
        }
        let state = HandState::evaluate(&lms, FingerRules::Simple);
        assert!(state.all_fingers_down());
        assert!(!state.thumb_out());

        lms[LandmarkIdx::RingFingerTip as usize].y = 0.4;
        let state = HandState::evaluate(&lms, FingerRules::Simple);
        assert!(state.is_up(Finger::Ring));
        assert!(state.is_down(Finger::Pinky));
        assert!(!state.all_fingers_down());
    }

    #[test]
    fn extended_finger_must_clear_the_wrist() {
        let mut lms = [NormalizedLandmark::default(); NUM_LANDMARKS];
        lms[LandmarkIdx::Wrist as usize].y = 0.5;
        lms[LandmarkIdx::IndexFingerMcp as usize].y = 0.4;
        lms[LandmarkIdx::IndexFingerTip as usize].y = 0.2;
        assert!(is_finger_extended(&lms, Finger::Index));

        // Above the knuckle, but the hand is tilted so the tip dips below the wrist.
        lms[LandmarkIdx::Wrist as usize].y = 0.1;
        assert!(!is_finger_extended(&lms, Finger::Index));

        lms[LandmarkIdx::Wrist as usize].y = 0.5;
        lms[LandmarkIdx::IndexFingerTip as usize].y = 0.4;
        assert!(!is_finger_extended(&lms, Finger::Index));
    }

    #[test]
    fn thumb_spread_uses_knuckle_center() {
        let mut lms = [NormalizedLandmark::default(); NUM_LANDMARKS];
        for (finger, x) in Finger::ALL.into_iter().zip([0.4, 0.5, 0.6, 0.7]) {
            lms[finger.mcp() as usize].x = x;
        }
        // Knuckle center is 0.55.
        lms[LandmarkIdx::ThumbTip as usize].x = 0.4;
        assert!(is_thumb_spread(&lms));
        lms[LandmarkIdx::ThumbTip as usize].x = 0.5;
        assert!(!is_thumb_spread(&lms));
        lms[LandmarkIdx::ThumbTip as usize].x = 0.7;
        assert!(is_thumb_spread(&lms));
    }

    #[test]
    fn rules_can_disagree() {
        // Index tip above its PIP joint but below its knuckle: half bent.
        let mut lms = [NormalizedLandmark::default(); NUM_LANDMARKS];
        lms[LandmarkIdx::Wrist as usize].y = 0.9;
        lms[LandmarkIdx::IndexFingerMcp as usize].y = 0.5;
        lms[LandmarkIdx::IndexFingerPip as usize].y = 0.7;
        lms[LandmarkIdx::IndexFingerTip as usize].y = 0.6;

        let simple = HandState::evaluate(&lms, FingerRules::Simple);
        let strict = HandState::evaluate(&lms, FingerRules::Strict);
        assert!(simple.is_up(Finger::Index));
        assert!(strict.is_down(Finger::Index));
    }

    #[test]
    fn parse_rules() {
        assert_eq!("strict".parse::<FingerRules>().unwrap(), FingerRules::Strict);
        assert_eq!("simple".parse::<FingerRules>().unwrap(), FingerRules::Simple);
        assert!("lenient".parse::<FingerRules>().is_err());
        assert_eq!(FingerRules::default(), FingerRules::Simple);
    }
}
