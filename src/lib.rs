//! Webcam hand tracking with simple finger gestures.
//!
//! Frames are captured from a webcam, mirrored, and passed through MediaPipe's two-stage hand
//! landmarker (palm detection, then hand landmark estimation). The landmarks are drawn onto the
//! frame, and the state of each finger is printed to stdout. Closing a hand into a fist flips a
//! per-hand switch, which is announced on stdout as well.
//!
//! # Coordinates
//!
//! Image coordinates have their origin in the top left corner, with Y pointing *down*.
//! [`landmark::NormalizedLandmark`]s use the same orientation, divided by the image size.
//!
//! # Environment Variables
//!
//! The application is configured through environment variables (see [`config::Config`]):
//!
//! * `FINGERTRACK_MODEL_PATH`: location of the hand landmarker `.task` bundle. It is downloaded
//!   there if it does not exist. Defaults to `hand_landmarker.task`.
//! * `FINGERTRACK_MODEL_URL`: where to download the bundle from.
//! * `FINGERTRACK_PALM_MODEL` and `FINGERTRACK_LANDMARK_MODEL`: TensorFlow Lite or ONNX networks to
//!   use instead of the ones in the bundle.
//! * `FINGERTRACK_WEBCAM_NAME`: forces the webcam device to use. If unset, the first device that
//!   supports a compatible image format will be used.
//! * `FINGERTRACK_NUM_HANDS`: maximum number of hands to track (default 2).
//! * `FINGERTRACK_REPORT`: `changes` (the default) prints a hand's finger states when they change,
//!   `every-frame` prints them for every frame.
//! * `FINGERTRACK_MESSAGES`: `numbered` (default) names hands by their position in the results
//!   ("Hand 2: Index finger is down!"), `labelled` by handedness ("Hand 2 (Left) index finger is
//!   down").
//! * `FINGERTRACK_FINGER_RULES`: `simple` (default) compares fingertips against the middle finger
//!   joints; `strict` requires fingertips above the knuckles and the wrist, and measures the thumb
//!   against the center of the knuckles.
//! * `FINGERTRACK_JPEG_BACKEND`: the JPEG decoder for webcam frames, `jpeg-decoder` (default) or
//!   `zune-jpeg`.
//! * `RUST_LOG`: overrides the log filter, see [`init_logger!`].

use log::LevelFilter;

pub mod config;
pub mod detection;
pub mod gui;
pub mod hand;
pub mod image;
pub mod iter;
pub mod landmark;
pub mod model;
pub mod nn;
pub mod num;
pub mod rect;
pub mod report;
mod termination;
pub mod timer;
pub mod video;

pub use termination::Termination;

/// macro-use only, not part of public API.
#[doc(hidden)]
pub fn init_logger(calling_crate: &'static str) {
    let log_level = LevelFilter::Debug;
    env_logger::Builder::new()
        .filter(Some(calling_crate), log_level)
        .filter(Some(env!("CARGO_CRATE_NAME")), log_level)
        .filter(Some("wgpu"), LevelFilter::Warn)
        .parse_default_env()
        .try_init()
        .ok();
}

/// Initializes logging to *stderr*.
///
/// The calling crate and this library log at *debug* level, `wgpu` at *warn* level. `RUST_LOG`
/// can override both.
///
/// If a global logger is already registered, this macro will do nothing.
#[macro_export]
macro_rules! init_logger {
    () => {
        $crate::init_logger(env!("CARGO_CRATE_NAME"))
    };
}

/// Runs the application function `app` alongside the GUI event loop.
///
/// This has to be called from the main thread, and never returns: the process exits once `app`
/// does, with a status derived from its return value.
pub fn run<F, R>(app: F) -> !
where
    F: FnOnce() -> R + Send + 'static,
    R: Termination + Send,
{
    gui::run(app)
}
