use std::io::{self, Write};
use std::time::Duration;

use fingertrack::config::CONFIG;
use fingertrack::gui::{self, Key};
use fingertrack::hand::{HandLandmarker, HandLandmarkerOptions, HandState};
use fingertrack::image::Resolution;
use fingertrack::model::{self, ModelBundle};
use fingertrack::nn::NeuralNetwork;
use fingertrack::report::{fist_message, FistToggle, Reporter};
use fingertrack::timer::FpsCounter;
use fingertrack::video::webcam::{ParamPreference, Webcam, WebcamOptions};

const WINDOW_TITLE: &str = "Hand Detection";
const KEY_TIMEOUT: Duration = Duration::from_millis(5);

fn main() {
    fingertrack::init_logger!();
    fingertrack::run(app);
}

fn app() -> anyhow::Result<()> {
    let mut landmarker = load_landmarker()?;

    let mut options = WebcamOptions::default()
        .resolution(Resolution::new(640, 480))
        .fps(30)
        .prefer(ParamPreference::Resolution);
    if let Some(name) = &CONFIG.webcam_name {
        options = options.name(name);
    }
    let mut webcam = Webcam::open(options)?;

    let mut reporter = Reporter::new(CONFIG.report, CONFIG.messages);
    let mut fists = FistToggle::new();
    let mut fps = FpsCounter::new("hand tracking");
    loop {
        let mut frame = match webcam.read() {
            Ok(frame) => frame,
            Err(e) => {
                log::debug!("webcam read failed: {e:#}");
                println!("Failed to grab frame");
                break;
            }
        };
        frame.flip_horizontal_in_place();

        let result = landmarker.detect(&frame)?;
        let hands = result
            .hands()
            .iter()
            .map(|hand| {
                let state = HandState::evaluate(&hand.landmarks, CONFIG.finger_rules);
                (hand.display_handedness(), state)
            })
            .collect::<Vec<_>>();
        let mut stdout = io::stdout().lock();
        reporter.write_to(&mut stdout, &hands)?;
        for (handedness, state) in &hands {
            if let Some(on) = fists.update(*handedness, state) {
                log::debug!("{handedness:?} fist, switch {on}");
                writeln!(stdout, "{}", fist_message(*handedness, on))?;
            }
        }

        if !result.is_empty() {
            result.draw(&mut frame);
        }
        gui::show_image(WINDOW_TITLE, &frame)?;

        fps.tick_with(webcam.timers().chain(landmarker.timers()));

        match gui::wait_key(KEY_TIMEOUT) {
            Some(Key::Char('q')) | Some(Key::Close) => break,
            _ => {}
        }
    }

    Ok(())
}

/// Loads the palm detection and hand landmark networks.
///
/// Networks configured explicitly are loaded from their files; the rest come from the model bundle,
/// which is downloaded first if necessary.
fn load_landmarker() -> anyhow::Result<HandLandmarker> {
    let options = HandLandmarkerOptions {
        num_hands: CONFIG.num_hands,
        ..Default::default()
    };

    if let (Some(palm), Some(landmark)) = (&CONFIG.palm_model, &CONFIG.landmark_model) {
        return HandLandmarker::new(
            NeuralNetwork::from_path(palm)?,
            NeuralNetwork::from_path(landmark)?,
            options,
        );
    }

    let path = model::ensure_model(&CONFIG.model_path, &CONFIG.model_url)?;
    let bundle = ModelBundle::open(&path)?;
    let palm = match &CONFIG.palm_model {
        Some(path) => NeuralNetwork::from_path(path)?,
        None => NeuralNetwork::from_tflite(bundle.palm_detector())?,
    };
    let landmark = match &CONFIG.landmark_model {
        Some(path) => NeuralNetwork::from_path(path)?,
        None => NeuralNetwork::from_tflite(bundle.landmark_detector())?,
    };
    HandLandmarker::new(palm, landmark, options)
}
