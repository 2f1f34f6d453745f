//! Console reporting of finger states and fist gestures.

use std::io::{self, Write};
use std::str::FromStr;

use anyhow::bail;

use crate::hand::{Finger, HandState, Handedness};

/// When finger state messages are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportMode {
    /// Print a hand's messages only when its state changed since the previous frame.
    #[default]
    Changes,
    /// Print the messages of every hand in every frame.
    EveryFrame,
}

impl FromStr for ReportMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "changes" => Self::Changes,
            "every-frame" => Self::EveryFrame,
            _ => bail!("invalid report mode '{s}' (expected 'changes' or 'every-frame')"),
        })
    }
}

/// How hands are named in messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessageStyle {
    /// "Hand 2: Ring finger is down!", numbered by position in the frame's results.
    #[default]
    Numbered,
    /// "Hand 2 (Left) ring finger is down", named after the hand's handedness.
    Labelled,
}

impl FromStr for MessageStyle {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "numbered" => Self::Numbered,
            "labelled" => Self::Labelled,
            _ => bail!("invalid message style '{s}' (expected 'numbered' or 'labelled')"),
        })
    }
}

/// Returns the messages describing the state of hand number `number` (starting at 1).
pub fn messages(number: usize, state: &HandState) -> Vec<String> {
    let mut messages = Finger::ALL
        .iter()
        .filter(|&&finger| state.is_down(finger))
        .map(|finger| format!("Hand {number}: {finger} finger is down!"))
        .collect::<Vec<_>>();
    if state.all_fingers_down() {
        messages.push("All fingers are down!".to_string());
    }
    if !state.thumb_out() {
        messages.push("Thumb is in!".to_string());
    }
    messages
}

/// Names a hand by its (mirror-corrected) handedness.
///
/// The right hand is always "Hand 1", so a hand keeps its name when the other one leaves the frame.
pub fn hand_label(handedness: Handedness) -> &'static str {
    match handedness {
        Handedness::Right => "Hand 1 (Right)",
        Handedness::Left => "Hand 2 (Left)",
    }
}

/// Like [`messages`], but naming the hand with [`hand_label`].
pub fn labelled_messages(handedness: Handedness, state: &HandState) -> Vec<String> {
    let label = hand_label(handedness);
    let mut messages = Vec::new();
    if !state.thumb_out() {
        messages.push(format!("{label} thumb is in"));
    }
    messages.extend(
        Finger::ALL
            .iter()
            .filter(|&&finger| state.is_down(finger))
            .map(|finger| format!("{label} {} finger is down", finger.name().to_lowercase())),
    );
    if state.all_fingers_down() {
        messages.push(format!("{label} all fingers down"));
    }
    messages
}

/// Turns per-frame hand states into console messages.
///
/// In [`ReportMode::Changes`], a hand is compared against the hand with the same handedness in the
/// previous frame. If several hands share a handedness, all of them are compared against the first.
#[derive(Debug, Default)]
pub struct Reporter {
    mode: ReportMode,
    style: MessageStyle,
    previous: Vec<(Handedness, HandState)>,
}

impl Reporter {
    pub fn new(mode: ReportMode, style: MessageStyle) -> Self {
        Self {
            mode,
            style,
            previous: Vec::new(),
        }
    }

    /// Returns the messages to print for a frame with the given hands.
    pub fn report(&mut self, hands: &[(Handedness, HandState)]) -> Vec<String> {
        let mut out = Vec::new();
        for (index, (handedness, state)) in hands.iter().enumerate() {
            let previous = self
                .previous
                .iter()
                .find(|(h, _)| h == handedness)
                .map(|(_, state)| state);
            if self.mode == ReportMode::EveryFrame || previous != Some(state) {
                out.extend(match self.style {
                    MessageStyle::Numbered => messages(index + 1, state),
                    MessageStyle::Labelled => labelled_messages(*handedness, state),
                });
            }
        }

        self.previous.clear();
        self.previous.extend_from_slice(hands);
        out
    }

    /// Writes the messages for a frame to `out`, one per line.
    pub fn write_to<W: Write>(
        &mut self,
        out: &mut W,
        hands: &[(Handedness, HandState)],
    ) -> io::Result<()> {
        for line in self.report(hands) {
            writeln!(out, "{line}")?;
        }
        Ok(())
    }
}

/// Flips a per-hand switch whenever that hand closes into a fist.
///
/// The switch only flips on the frame the fist closes. The hand has to open again before the next
/// fist counts. A hand that leaves the frame keeps its last state, so a fist that disappears and
/// comes back does not flip the switch a second time.
#[derive(Debug, Default)]
pub struct FistToggle {
    closed: [bool; 2],
    on: [bool; 2],
}

impl FistToggle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one hand's state. Returns the new switch position if the hand just closed.
    pub fn update(&mut self, handedness: Handedness, state: &HandState) -> Option<bool> {
        let slot = match handedness {
            Handedness::Right => 0,
            Handedness::Left => 1,
        };
        if !state.all_fingers_down() {
            self.closed[slot] = false;
            return None;
        }
        if self.closed[slot] {
            return None;
        }
        self.closed[slot] = true;
        self.on[slot] = !self.on[slot];
        Some(self.on[slot])
    }
}

/// Announces a switch flipped by [`FistToggle`].
pub fn fist_message(handedness: Handedness, on: bool) -> String {
    let position = if on { "on" } else { "off" };
    format!("{} fist: switched {position}", hand_label(handedness))
}
