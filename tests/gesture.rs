use fingertrack::hand::gesture::{
    is_finger_extended, is_finger_up, is_thumb_out, is_thumb_spread, THUMB_OUT_THRESHOLD,
};
use fingertrack::hand::{Finger, FingerRules, HandLandmarks, HandState, Handedness};
use fingertrack::landmark::NormalizedLandmark;
use fingertrack::report::{messages, FistToggle, MessageStyle, ReportMode, Reporter};

fn random_hand(rng: &mut fastrand::Rng) -> HandLandmarks {
    let mut lms = [NormalizedLandmark::default(); 21];
    for lm in &mut lms {
        lm.x = rng.f32();
        lm.y = rng.f32();
        lm.z = rng.f32() * 0.2 - 0.1;
    }
    lms
}

#[test]
fn state_agrees_with_predicates() {
    let mut rng = fastrand::Rng::with_seed(0x5eed);
    for _ in 0..500 {
        let hand = random_hand(&mut rng);
        let state = HandState::evaluate(&hand, FingerRules::Simple);

        for finger in Finger::ALL {
            let (tip, joint) = finger.landmarks();
            assert_eq!(state.is_up(finger), is_finger_up(&hand, tip, joint));
        }
        assert_eq!(state.thumb_out(), is_thumb_out(&hand));
        assert_eq!(
            state.all_fingers_down(),
            Finger::ALL.iter().all(|&f| state.is_down(f))
        );
    }
}

#[test]
fn strict_state_agrees_with_predicates() {
    let mut rng = fastrand::Rng::with_seed(0xf157);
    for _ in 0..500 {
        let hand = random_hand(&mut rng);
        let state = HandState::evaluate(&hand, FingerRules::Strict);

        for finger in Finger::ALL {
            assert_eq!(state.is_up(finger), is_finger_extended(&hand, finger));
        }
        assert_eq!(state.thumb_out(), is_thumb_spread(&hand));
    }
}

#[test]
fn thumb_is_symmetric() {
    let mut rng = fastrand::Rng::with_seed(7);
    for _ in 0..200 {
        let mut hand = random_hand(&mut rng);
        let out = is_thumb_out(&hand);
        let (a, b) = (hand[4].x, hand[2].x);
        hand[4].x = b;
        hand[2].x = a;
        assert_eq!(is_thumb_out(&hand), out);
        assert_eq!(out, (a - b).abs() > THUMB_OUT_THRESHOLD);
    }
}

#[test]
fn message_counts_match_state() {
    let mut rng = fastrand::Rng::with_seed(42);
    for _ in 0..200 {
        let state = HandState::evaluate(&random_hand(&mut rng), FingerRules::Simple);
        let down = Finger::ALL.iter().filter(|&&f| state.is_down(f)).count();
        let expected =
            down + usize::from(state.all_fingers_down()) + usize::from(!state.thumb_out());
        assert_eq!(messages(1, &state).len(), expected);
    }
}

#[test]
fn reporter_prints_every_change_once() {
    let mut rng = fastrand::Rng::with_seed(3);
    let mut reporter = Reporter::new(ReportMode::Changes, MessageStyle::Numbered);
    let mut previous: Option<HandState> = None;
    for _ in 0..100 {
        // Keep the same hand for a few frames at a time.
        let state = match previous {
            Some(state) if rng.bool() => state,
            _ => HandState::evaluate(&random_hand(&mut rng), FingerRules::Simple),
        };
        let lines = reporter.report(&[(Handedness::Left, state)]);
        if previous == Some(state) {
            assert!(lines.is_empty());
        } else {
            assert_eq!(lines, messages(1, &state));
        }
        previous = Some(state);
    }
}

#[test]
fn fist_toggle_fires_on_closing_edges() {
    let mut rng = fastrand::Rng::with_seed(11);
    let mut toggle = FistToggle::new();
    let (mut was_closed, mut on) = (false, false);
    for _ in 0..300 {
        let state = HandState::evaluate(&random_hand(&mut rng), FingerRules::Simple);
        let closed = state.all_fingers_down();
        let fired = toggle.update(Handedness::Right, &state);
        if closed && !was_closed {
            on = !on;
            assert_eq!(fired, Some(on));
        } else {
            assert_eq!(fired, None);
        }
        was_closed = closed;
    }
}
