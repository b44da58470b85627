//! Hand landmark sets and the per-frame detection snapshot.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const LANDMARK_COUNT: usize = 21;

/// Anatomical numbering of the 21 hand keypoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Joint {
    Wrist,
    ThumbCmc,
    ThumbMcp,
    ThumbIp,
    ThumbTip,
    IndexMcp,
    IndexPip,
    IndexDip,
    IndexTip,
    MiddleMcp,
    MiddlePip,
    MiddleDip,
    MiddleTip,
    RingMcp,
    RingPip,
    RingDip,
    RingTip,
    PinkyMcp,
    PinkyPip,
    PinkyDip,
    PinkyTip,
}

impl Joint {
    pub const ALL: [Joint; LANDMARK_COUNT] = [
        Joint::Wrist,
        Joint::ThumbCmc,
        Joint::ThumbMcp,
        Joint::ThumbIp,
        Joint::ThumbTip,
        Joint::IndexMcp,
        Joint::IndexPip,
        Joint::IndexDip,
        Joint::IndexTip,
        Joint::MiddleMcp,
        Joint::MiddlePip,
        Joint::MiddleDip,
        Joint::MiddleTip,
        Joint::RingMcp,
        Joint::RingPip,
        Joint::RingDip,
        Joint::RingTip,
        Joint::PinkyMcp,
        Joint::PinkyPip,
        Joint::PinkyDip,
        Joint::PinkyTip,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Joint::Wrist => "wrist",
            Joint::ThumbCmc => "thumb_cmc",
            Joint::ThumbMcp => "thumb_mcp",
            Joint::ThumbIp => "thumb_ip",
            Joint::ThumbTip => "thumb_tip",
            Joint::IndexMcp => "index_mcp",
            Joint::IndexPip => "index_pip",
            Joint::IndexDip => "index_dip",
            Joint::IndexTip => "index_tip",
            Joint::MiddleMcp => "middle_mcp",
            Joint::MiddlePip => "middle_pip",
            Joint::MiddleDip => "middle_dip",
            Joint::MiddleTip => "middle_tip",
            Joint::RingMcp => "ring_mcp",
            Joint::RingPip => "ring_pip",
            Joint::RingDip => "ring_dip",
            Joint::RingTip => "ring_tip",
            Joint::PinkyMcp => "pinky_mcp",
            Joint::PinkyPip => "pinky_pip",
            Joint::PinkyDip => "pinky_dip",
            Joint::PinkyTip => "pinky_tip",
        }
    }
}

// The table above must line up with the detector's numbering.
const _: () = {
    let mut i = 0;
    while i < LANDMARK_COUNT {
        assert!(Joint::ALL[i].index() == i);
        i += 1;
    }
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32, // 0-1 normalized
    pub y: f32, // 0-1 normalized
    #[serde(default)]
    pub z: f32, // relative depth
}

impl Landmark {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn distance_2d(&self, other: &Landmark) -> f32 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    pub fn distance_3d(&self, other: &Landmark) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum LandmarkError {
    #[error("hand landmark set must have {LANDMARK_COUNT} points, got {0}")]
    WrongCount(usize),
}

/// One detected hand. Always exactly [`LANDMARK_COUNT`] points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Landmark>", into = "Vec<Landmark>")]
pub struct LandmarkSet {
    points: [Landmark; LANDMARK_COUNT],
}

impl LandmarkSet {
    pub fn new(points: [Landmark; LANDMARK_COUNT]) -> Self {
        Self { points }
    }

    pub fn joint(&self, joint: Joint) -> Landmark {
        self.points[joint.index()]
    }

    pub fn points(&self) -> &[Landmark; LANDMARK_COUNT] {
        &self.points
    }
}

impl TryFrom<Vec<Landmark>> for LandmarkSet {
    type Error = LandmarkError;

    fn try_from(v: Vec<Landmark>) -> Result<Self, Self::Error> {
        let n = v.len();
        let points: [Landmark; LANDMARK_COUNT] =
            v.try_into().map_err(|_| LandmarkError::WrongCount(n))?;
        Ok(Self { points })
    }
}

impl From<LandmarkSet> for Vec<Landmark> {
    fn from(set: LandmarkSet) -> Self {
        set.points.to_vec()
    }
}

/// Output of one detection cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HandFrame {
    pub timestamp_ms: f64,
    #[serde(default)]
    pub hands: Vec<LandmarkSet>,
}

impl HandFrame {
    pub fn empty(timestamp_ms: f64) -> Self {
        Self {
            timestamp_ms,
            hands: Vec::new(),
        }
    }

    /// Only the first detected hand drives interaction.
    pub fn primary(&self) -> Option<&LandmarkSet> {
        self.hands.first()
    }
}

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("detector is not initialized")]
    NotReady,
    #[error("detector failed: {0}")]
    Failed(String),
    #[error(transparent)]
    Landmarks(#[from] LandmarkError),
}

/// Per-frame hand detector. Called at most once per rendered frame.
pub trait LandmarkSource {
    /// Whether the current video frame has data to run detection on.
    fn frame_ready(&self) -> bool;

    fn detect(&mut self, timestamp_ms: f64) -> Result<HandFrame, DetectError>;
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Open hand centered in frame: hand size 0.15, pinch distance 0.2.
    pub(crate) fn open_hand() -> LandmarkSet {
        let mut pts = [Landmark::new(0.5, 0.5, 0.0); LANDMARK_COUNT];
        pts[Joint::Wrist.index()] = Landmark::new(0.5, 0.65, 0.0);
        pts[Joint::MiddleMcp.index()] = Landmark::new(0.5, 0.5, 0.0);
        pts[Joint::ThumbTip.index()] = Landmark::new(0.4, 0.45, 0.0);
        pts[Joint::IndexTip.index()] = Landmark::new(0.6, 0.45, 0.0);
        LandmarkSet::new(pts)
    }

    /// Same hand with thumb and index tips `pinch` apart along x.
    pub(crate) fn hand_with_pinch(pinch: f32) -> LandmarkSet {
        let mut pts = *open_hand().points();
        pts[Joint::ThumbTip.index()] = Landmark::new(0.5 - pinch / 2.0, 0.45, 0.0);
        pts[Joint::IndexTip.index()] = Landmark::new(0.5 + pinch / 2.0, 0.45, 0.0);
        LandmarkSet::new(pts)
    }

    #[test]
    fn joint_table_matches_numbering() {
        assert_eq!(Joint::Wrist.index(), 0);
        assert_eq!(Joint::ThumbTip.index(), 4);
        assert_eq!(Joint::IndexTip.index(), 8);
        assert_eq!(Joint::MiddleMcp.index(), 9);
        assert_eq!(Joint::PinkyTip.index(), 20);
    }

    #[test]
    fn rejects_wrong_point_count() {
        let short = vec![Landmark::default(); 20];
        assert_eq!(
            LandmarkSet::try_from(short),
            Err(LandmarkError::WrongCount(20))
        );
        let ok = vec![Landmark::default(); LANDMARK_COUNT];
        assert!(LandmarkSet::try_from(ok).is_ok());
    }

    #[test]
    fn frame_json_rejects_partial_hand() {
        let bad = r#"{"timestamp_ms": 1.0, "hands": [[{"x":0.1,"y":0.2}]]}"#;
        assert!(serde_json::from_str::<HandFrame>(bad).is_err());

        let pts: Vec<_> = (0..LANDMARK_COUNT)
            .map(|_| serde_json::json!({"x": 0.5, "y": 0.5}))
            .collect();
        let good = serde_json::json!({"timestamp_ms": 2.0, "hands": [pts]});
        let frame: HandFrame = serde_json::from_value(good).unwrap();
        assert_eq!(frame.primary().unwrap().joint(Joint::Wrist).z, 0.0);
    }

    #[test]
    fn primary_is_first_hand() {
        let mut frame = HandFrame::empty(0.0);
        assert!(frame.primary().is_none());
        frame.hands.push(open_hand());
        frame.hands.push(hand_with_pinch(0.01));
        assert_eq!(frame.primary(), Some(&open_hand()));
    }
}
