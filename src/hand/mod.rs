//! Hand detection, landmark estimation and finger gestures.
//!
//! This uses the two networks bundled in MediaPipe's hand landmarker: a palm detector that finds
//! hands in the whole frame, and a landmark network that estimates 21 hand landmarks in a rotated
//! crop around each palm.

pub mod detection;
pub mod gesture;
pub mod landmark;
pub mod landmarker;

pub use gesture::{Finger, FingerRules, HandLandmarks, HandState};
pub use landmark::Handedness;
pub use landmarker::{DetectedHand, HandLandmarker, HandLandmarkerOptions, HandLandmarkerResult};
