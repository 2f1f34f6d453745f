//! Non-Maximum Averaging.
//!
//! SSD networks report each object many times, once for every anchor that overlaps it. This
//! module merges every group of overlapping detections into their confidence-weighted average,
//! which is steadier between frames than keeping only the best detection of a group.

use crate::{iter::zip_exact, num::TotalF32, rect::Rect};

use super::{Detection, Keypoint};

/// Merges overlapping detections.
#[derive(Debug, Default)]
pub struct NonMaxSuppression {
    group: Vec<Detection>,
}

impl NonMaxSuppression {
    /// Intersection-over-union at which two detections are considered the same object.
    pub const IOU_THRESH: f32 = 0.3;

    pub fn new() -> Self {
        Self::default()
    }

    /// Merges overlapping detections in `detections` in place.
    ///
    /// Afterwards, `detections` contains one detection per group of overlapping inputs, sorted by
    /// descending confidence.
    pub fn process(&mut self, detections: &mut Vec<Detection>) {
        // Ascending, so `pop` yields the most confident remaining detection.
        detections.sort_unstable_by_key(|det| TotalF32(det.confidence()));

        let mut remaining = std::mem::take(detections);
        while let Some(seed) = remaining.pop() {
            let seed_rect = seed.bounding_rect();

            self.group.clear();
            let mut i = 0;
            while i < remaining.len() {
                if seed_rect.iou(&remaining[i].bounding_rect()) >= Self::IOU_THRESH {
                    self.group.push(remaining.remove(i));
                } else {
                    i += 1;
                }
            }

            let confidence = seed.confidence();
            self.group.push(seed);
            detections.push(weighted_average(confidence, &self.group));
        }
    }
}

/// Averages the boxes and keypoints of `group`, weighted by confidence.
///
/// The result has the confidence of the group's seed, `confidence`.
fn weighted_average(confidence: f32, group: &[Detection]) -> Detection {
    let keypoint_count = group.first().map_or(0, |det| det.keypoints().len());
    let mut keypoints = vec![Keypoint::new(0.0, 0.0); keypoint_count];
    let [mut x, mut y, mut w, mut h] = [0.0; 4];
    let mut total = 0.0;

    for det in group {
        let weight = det.confidence();
        total += weight;

        let rect = det.bounding_rect();
        x += rect.x_center() * weight;
        y += rect.y_center() * weight;
        w += rect.width() * weight;
        h += rect.height() * weight;
        for (acc, kp) in zip_exact(&mut keypoints, det.keypoints()) {
            acc.x += kp.x * weight;
            acc.y += kp.y * weight;
        }
    }

    for kp in &mut keypoints {
        kp.x /= total;
        kp.y /= total;
    }

    Detection::with_keypoints(
        confidence,
        Rect::from_center(x / total, y / total, w / total, h / total),
        keypoints,
    )
}
