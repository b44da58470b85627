//! Per-frame gesture signals derived from raw landmarks.

use serde::{Deserialize, Serialize};

use crate::landmarks::{Joint, LandmarkSet};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GestureThresholds {
    /// Thumb-tip to index-tip distance below which the hand counts as pinching.
    pub pinch_threshold: f32,
    pub min_hand_size: f32,
    pub max_hand_size: f32,
    /// Landmarks closer than this to any screen edge mark the hand as leaving.
    pub edge_margin: f32,
}

impl Default for GestureThresholds {
    fn default() -> Self {
        Self {
            pinch_threshold: 0.08,
            min_hand_size: 0.05,
            max_hand_size: 0.4,
            edge_margin: 0.02,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GestureSignals {
    pub pinch_distance: f32,
    pub hand_size: f32,
    pub is_valid: bool,
    pub is_out_of_view: bool,
    pub is_pinching: bool,
}

/// What the classifier saw this frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HandObservation {
    Absent,
    Invalid(GestureSignals),
    Valid(GestureSignals),
}

impl HandObservation {
    pub fn signals(&self) -> Option<&GestureSignals> {
        match self {
            HandObservation::Absent => None,
            HandObservation::Invalid(s) | HandObservation::Valid(s) => Some(s),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GestureClassifier {
    th: GestureThresholds,
}

impl GestureClassifier {
    pub fn new(th: GestureThresholds) -> Self {
        Self { th }
    }

    pub fn set_thresholds(&mut self, th: GestureThresholds) {
        self.th = th;
    }

    pub fn classify(&self, hand: Option<&LandmarkSet>) -> HandObservation {
        let Some(hand) = hand else {
            return HandObservation::Absent;
        };
        let signals = self.signals(hand);
        if signals.is_valid {
            HandObservation::Valid(signals)
        } else {
            HandObservation::Invalid(signals)
        }
    }

    pub fn signals(&self, hand: &LandmarkSet) -> GestureSignals {
        let pinch_distance = pinch_distance(hand);
        let hand_size = hand_size(hand);
        GestureSignals {
            pinch_distance,
            hand_size,
            is_valid: (self.th.min_hand_size..=self.th.max_hand_size).contains(&hand_size),
            is_out_of_view: is_out_of_view(hand, self.th.edge_margin),
            is_pinching: pinch_distance < self.th.pinch_threshold,
        }
    }
}

/// 3-D thumb-tip to index-tip distance.
pub fn pinch_distance(hand: &LandmarkSet) -> f32 {
    hand.joint(Joint::ThumbTip)
        .distance_3d(&hand.joint(Joint::IndexTip))
}

/// Wrist to middle-finger base in screen space; a proxy for distance to camera.
pub fn hand_size(hand: &LandmarkSet) -> f32 {
    hand.joint(Joint::Wrist)
        .distance_2d(&hand.joint(Joint::MiddleMcp))
}

pub fn is_out_of_view(hand: &LandmarkSet, margin: f32) -> bool {
    hand.points().iter().any(|p| {
        p.x < margin || p.x > 1.0 - margin || p.y < margin || p.y > 1.0 - margin
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::tests::{hand_with_pinch, open_hand};
    use crate::landmarks::{LANDMARK_COUNT, Landmark};

    fn scaled_hand(size: f32) -> LandmarkSet {
        let mut pts = *open_hand().points();
        pts[Joint::Wrist.index()] = Landmark::new(0.5, 0.5 + size, 0.0);
        LandmarkSet::new(pts)
    }

    #[test]
    fn pinch_uses_depth_too() {
        let mut pts = *hand_with_pinch(0.0).points();
        pts[Joint::IndexTip.index()].z = 0.05;
        let set = LandmarkSet::new(pts);
        assert!((pinch_distance(&set) - 0.05).abs() < 1e-6);
    }

    #[test]
    fn pinch_threshold_is_strict() {
        let c = GestureClassifier::new(GestureThresholds::default());
        assert!(c.signals(&hand_with_pinch(0.05)).is_pinching);
        assert!(!c.signals(&hand_with_pinch(0.15)).is_pinching);
    }

    #[test]
    fn hand_size_outside_bounds_is_invalid() {
        let c = GestureClassifier::new(GestureThresholds::default());
        for size in [0.01, 0.049, 0.41, 0.45] {
            assert!(!c.signals(&scaled_hand(size)).is_valid, "size {size}");
        }
        for size in [0.06, 0.2, 0.39] {
            assert!(c.signals(&scaled_hand(size)).is_valid, "size {size}");
        }
    }

    #[test]
    fn hand_size_bounds_are_inclusive() {
        let c = GestureClassifier::new(GestureThresholds::default());
        // vertical offset from a base at y = 0 keeps the size exact in f32
        let exact = |size: f32| {
            let mut pts = *open_hand().points();
            pts[Joint::MiddleMcp.index()] = Landmark::new(0.5, 0.0, 0.0);
            pts[Joint::Wrist.index()] = Landmark::new(0.5, size, 0.0);
            LandmarkSet::new(pts)
        };
        for size in [0.05, 0.4] {
            let hand = exact(size);
            assert_eq!(hand_size(&hand), size);
            assert!(c.signals(&hand).is_valid, "size {size}");
        }
    }

    #[test]
    fn edge_margin_marks_out_of_view() {
        let mut pts = *open_hand().points();
        assert!(!is_out_of_view(&LandmarkSet::new(pts), 0.02));
        pts[Joint::PinkyTip.index()] = Landmark::new(0.99, 0.5, 0.0);
        assert!(is_out_of_view(&LandmarkSet::new(pts), 0.02));
        pts[Joint::PinkyTip.index()] = Landmark::new(0.5, 0.015, 0.0);
        assert!(is_out_of_view(&LandmarkSet::new(pts), 0.02));
    }

    #[test]
    fn absent_and_invalid_are_distinct_from_valid() {
        let c = GestureClassifier::new(GestureThresholds::default());
        assert_eq!(c.classify(None), HandObservation::Absent);
        assert!(matches!(
            c.classify(Some(&scaled_hand(0.6))),
            HandObservation::Invalid(_)
        ));
        assert!(matches!(
            c.classify(Some(&open_hand())),
            HandObservation::Valid(_)
        ));
        assert_eq!(open_hand().points().len(), LANDMARK_COUNT);
    }
}
