use serde::{Deserialize, Serialize};

use crate::config::GestureConfig;
use crate::geometry::distance;
use crate::hand::{Finger, FingerState, INDEX_TIP, LandmarkSet, THUMB_TIP};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum GestureLabel {
    None,
    Pause,
    Move,
    Scroll,
    ScrollUp,
    ScrollDown,
    Zoom,
    ZoomIn,
    ZoomOut,
    Click,
}

/// Which rule table the classifier walks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Cascade {
    /// Generic Scroll/Zoom; direction is resolved by the dispatcher.
    #[default]
    Unified,
    /// Fixed-direction gestures, including the "shaka" zoom-out.
    Legacy,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Classification {
    pub label: GestureLabel,
    pub pinch_distance: f32,
}

#[derive(Debug, Clone, Copy)]
struct Pinch {
    distance: f32,
    threshold: f32,
}

impl Pinch {
    fn closed(self) -> bool {
        self.distance < self.threshold
    }
}

struct Rule {
    label: GestureLabel,
    matches: fn(&FingerState, Pinch) -> bool,
}

use Finger::{Index, Middle, Pinky, Ring, Thumb};

const UNIFIED: &[Rule] = &[
    Rule {
        label: GestureLabel::Pause,
        matches: |f, _| f.all_up(),
    },
    Rule {
        label: GestureLabel::Move,
        matches: |f, _| f.exactly(&[Index]),
    },
    Rule {
        label: GestureLabel::Scroll,
        matches: |f, _| f.is_up(Index) && f.is_up(Middle) && !f.is_up(Ring) && !f.is_up(Pinky),
    },
    Rule {
        label: GestureLabel::Zoom,
        matches: |f, p| f.is_up(Thumb) && f.is_up(Index) && p.closed(),
    },
    Rule {
        label: GestureLabel::Click,
        matches: |f, _| f.none_up(),
    },
];

const LEGACY: &[Rule] = &[
    Rule {
        label: GestureLabel::Pause,
        matches: |f, _| f.all_up(),
    },
    Rule {
        label: GestureLabel::Move,
        matches: |f, _| f.exactly(&[Index]),
    },
    Rule {
        label: GestureLabel::ScrollDown,
        matches: |f, _| f.is_up(Index) && f.is_up(Middle) && f.is_up(Ring) && !f.is_up(Pinky),
    },
    Rule {
        label: GestureLabel::ScrollUp,
        matches: |f, _| f.is_up(Index) && f.is_up(Middle) && !f.is_up(Ring) && !f.is_up(Pinky),
    },
    Rule {
        label: GestureLabel::ZoomOut,
        matches: |f, _| f.exactly(&[Thumb, Pinky]),
    },
    Rule {
        label: GestureLabel::ZoomIn,
        matches: |f, _| f.exactly(&[Pinky]),
    },
    Rule {
        label: GestureLabel::Click,
        matches: |f, _| f.none_up(),
    },
];

/// Stateless frame classifier. Same inputs, same output.
#[derive(Debug, Clone)]
pub struct Classifier {
    cfg: GestureConfig,
}

impl Classifier {
    pub fn new(cfg: GestureConfig) -> Self {
        Self { cfg }
    }

    pub fn classify(&self, fingers: &FingerState, landmarks: &LandmarkSet) -> Classification {
        if landmarks.is_empty() {
            return Classification {
                label: GestureLabel::None,
                pinch_distance: 0.0,
            };
        }

        let pinch = Pinch {
            distance: distance(landmarks.point(THUMB_TIP), landmarks.point(INDEX_TIP)),
            threshold: self.cfg.pinch_threshold_px,
        };

        let rules = match self.cfg.cascade {
            Cascade::Unified => UNIFIED,
            Cascade::Legacy => LEGACY,
        };
        let mut label = rules
            .iter()
            .find(|r| (r.matches)(fingers, pinch))
            .map_or(GestureLabel::None, |r| r.label);

        // pinch wins over the bare index pattern
        if self.cfg.cascade == Cascade::Unified && label == GestureLabel::Move && pinch.closed() {
            label = GestureLabel::Zoom;
        }

        Classification {
            label,
            pinch_distance: pinch.distance,
        }
    }
}
