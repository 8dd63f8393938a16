//! Per-frame hand observations as delivered by the external detector.

use serde::{Deserialize, Serialize};

use crate::error::FrameError;
use crate::geometry::Point;

pub const LANDMARK_COUNT: usize = 21;

pub const THUMB_TIP: usize = 4;
pub const INDEX_TIP: usize = 8;
pub const MIDDLE_TIP: usize = 12;
pub const RING_TIP: usize = 16;
pub const PINKY_TIP: usize = 20;

const TIP_IDS: [usize; 5] = [THUMB_TIP, INDEX_TIP, MIDDLE_TIP, RING_TIP, PINKY_TIP];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finger {
    Thumb = 0,
    Index = 1,
    Middle = 2,
    Ring = 3,
    Pinky = 4,
}

/// Up/down flags in fixed order [Thumb, Index, Middle, Ring, Pinky].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct FingerState([bool; 5]);

impl FingerState {
    pub const fn new(up: [bool; 5]) -> Self {
        Self(up)
    }

    pub fn is_up(&self, f: Finger) -> bool {
        self.0[f as usize]
    }

    pub fn all_up(&self) -> bool {
        self.0.iter().all(|&u| u)
    }

    pub fn none_up(&self) -> bool {
        !self.0.iter().any(|&u| u)
    }

    /// True when exactly the given fingers are up and every other one is down.
    pub fn exactly(&self, up: &[Finger]) -> bool {
        (0..5).all(|i| self.0[i] == up.iter().any(|f| *f as usize == i))
    }

    pub fn as_array(&self) -> [bool; 5] {
        self.0
    }

    /// Detector-side heuristic for an upright, mirrored hand: the thumb counts
    /// as up when its tip lies left of the joint below it, the other fingers
    /// when the tip lies above the joint two below it.
    pub fn from_landmarks(lms: &LandmarkSet) -> Option<Self> {
        if lms.is_empty() {
            return None;
        }
        let mut up = [false; 5];
        up[0] = lms.point(THUMB_TIP).x < lms.point(THUMB_TIP - 1).x;
        for (i, &tip) in TIP_IDS.iter().enumerate().skip(1) {
            up[i] = lms.point(tip).y < lms.point(tip - 2).y;
        }
        Some(Self(up))
    }
}

impl TryFrom<&[bool]> for FingerState {
    type Error = FrameError;

    fn try_from(v: &[bool]) -> Result<Self, Self::Error> {
        let arr: [bool; 5] = v.try_into().map_err(|_| FrameError::FingerCount(v.len()))?;
        Ok(Self(arr))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub id: u32,
    pub x: f32,
    pub y: f32,
}

/// Either empty (no hand in view) or the full 21-point hand in anatomical order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LandmarkSet(Vec<Landmark>);

impl LandmarkSet {
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn new(points: Vec<Landmark>) -> Result<Self, FrameError> {
        if !points.is_empty() && points.len() != LANDMARK_COUNT {
            return Err(FrameError::LandmarkCount(points.len()));
        }
        for (index, lm) in points.iter().enumerate() {
            if lm.id as usize != index {
                return Err(FrameError::LandmarkOrder { index, id: lm.id });
            }
            if !lm.x.is_finite() || !lm.y.is_finite() {
                return Err(FrameError::NonFinite { id: lm.id });
            }
        }
        Ok(Self(points))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Pixel position of landmark `id`. Panics on an empty set; callers check
    /// `is_empty` first.
    pub fn point(&self, id: usize) -> Point {
        let lm = &self.0[id];
        Point::new(lm.x, lm.y)
    }

    pub fn get(&self, id: usize) -> Option<Point> {
        self.0.get(id).map(|lm| Point::new(lm.x, lm.y))
    }
}

/// One validated detector observation.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub fingers: FingerState,
    pub landmarks: LandmarkSet,
    pub width: u32,
    pub height: u32,
}

impl Frame {
    pub fn index_tip(&self) -> Option<Point> {
        self.landmarks.get(INDEX_TIP)
    }
}

/// A frame as it appears on the wire, one JSON object per line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingers: Option<Vec<bool>>,
    #[serde(default)]
    pub landmarks: Vec<(u32, f32, f32)>,
    pub frame_width: u32,
    pub frame_height: u32,
}

impl TryFrom<WireFrame> for Frame {
    type Error = FrameError;

    fn try_from(w: WireFrame) -> Result<Self, Self::Error> {
        if w.frame_width == 0 || w.frame_height == 0 {
            return Err(FrameError::FrameSize {
                width: w.frame_width,
                height: w.frame_height,
            });
        }
        let landmarks = LandmarkSet::new(
            w.landmarks
                .into_iter()
                .map(|(id, x, y)| Landmark { id, x, y })
                .collect(),
        )?;
        let fingers = match w.fingers {
            Some(v) => FingerState::try_from(v.as_slice())?,
            // with no hand the classifier ignores fingers anyway
            None => FingerState::from_landmarks(&landmarks).unwrap_or_default(),
        };
        Ok(Frame {
            fingers,
            landmarks,
            width: w.frame_width,
            height: w.frame_height,
        })
    }
}
