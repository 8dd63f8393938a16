use anyhow::Result;
use serde::Serialize;
use std::time::Instant;

use crate::actions::{InputActuator, MouseButton};
use crate::config::{DispatchConfig, Profile};
use crate::error::ActuatorError;
use crate::gestures::{Classification, GestureLabel};
use crate::hand::Frame;
use crate::motion::MotionController;

/// What the dispatcher sent to the actuator for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionEvent {
    MoveTo { x: f32, y: f32 },
    Click,
    Scroll { steps: i32 },
    Zoom { steps: i32 },
}

/// Turns gesture labels into controller calls and debounces clicks.
pub struct Dispatcher<A: InputActuator> {
    motion: MotionController<A>,
    cfg: DispatchConfig,
    button: MouseButton,
    last_click: Option<Instant>,
}

impl<A: InputActuator> Dispatcher<A> {
    pub fn new(act: A, profile: &Profile) -> Result<Self> {
        let motion = MotionController::new(
            act,
            &profile.screen,
            profile.motion.clone(),
            profile.zoom_modifier()?,
        );
        Ok(Self {
            motion,
            cfg: profile.dispatch.clone(),
            button: profile.click_button()?,
            last_click: None,
        })
    }

    /// Apply a reloaded profile. Cursor state and the click timer survive.
    pub fn reconfigure(&mut self, profile: &Profile) -> Result<()> {
        let button = profile.click_button()?;
        let zoom_key = profile.zoom_modifier()?;
        self.motion.reconfigure(profile.motion.clone(), zoom_key);
        self.cfg = profile.dispatch.clone();
        self.button = button;
        Ok(())
    }

    pub fn motion(&self) -> &MotionController<A> {
        &self.motion
    }

    pub fn dispatch(
        &mut self,
        cls: &Classification,
        frame: &Frame,
        now: Instant,
    ) -> Result<Option<ActionEvent>, ActuatorError> {
        let steps = |magnitude: i32| magnitude * vertical_direction(frame);

        let ev = match cls.label {
            GestureLabel::None | GestureLabel::Pause => None,
            GestureLabel::Move => frame.index_tip().and_then(|tip| {
                self.motion
                    .move_cursor(tip.x, tip.y, frame.width, frame.height)
                    .map(|p| ActionEvent::MoveTo { x: p.x, y: p.y })
            }),
            GestureLabel::Scroll => Some(self.scroll(steps(self.cfg.scroll_steps))?),
            GestureLabel::ScrollUp => Some(self.scroll(self.cfg.scroll_steps)?),
            GestureLabel::ScrollDown => Some(self.scroll(-self.cfg.scroll_steps)?),
            GestureLabel::Zoom => Some(self.zoom(steps(self.cfg.zoom_steps))?),
            GestureLabel::ZoomIn => Some(self.zoom(self.cfg.zoom_steps)?),
            GestureLabel::ZoomOut => Some(self.zoom(-self.cfg.zoom_steps)?),
            GestureLabel::Click => {
                let cooling = self
                    .last_click
                    .is_some_and(|t| now.duration_since(t) < self.cfg.click_cooldown());
                if cooling {
                    None
                } else {
                    self.last_click = Some(now);
                    self.motion.click(self.button)?;
                    Some(ActionEvent::Click)
                }
            }
        };
        Ok(ev)
    }

    fn scroll(&mut self, steps: i32) -> Result<ActionEvent, ActuatorError> {
        self.motion.scroll(steps)?;
        Ok(ActionEvent::Scroll { steps })
    }

    fn zoom(&mut self, steps: i32) -> Result<ActionEvent, ActuatorError> {
        self.motion.zoom(steps)?;
        Ok(ActionEvent::Zoom { steps })
    }
}

/// +1 when the index tip is in the upper half of the frame, -1 otherwise.
fn vertical_direction(frame: &Frame) -> i32 {
    match frame.index_tip() {
        Some(tip) if tip.y >= frame.height as f32 / 2.0 => -1,
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::Modifier;
    use crate::actions::tests::{Call, Recorder};
    use crate::hand::tests::hand_with_tips;
    use crate::hand::{FingerState, LandmarkSet};
    use std::time::Duration;

    fn dispatcher() -> Dispatcher<Recorder> {
        Dispatcher::new(Recorder::default(), &Profile::default()).unwrap()
    }

    fn frame_with_index_at(x: f32, y: f32) -> Frame {
        Frame {
            fingers: FingerState::default(),
            landmarks: hand_with_tips((0.0, 0.0), (x, y)),
            width: 640,
            height: 480,
        }
    }

    fn cls(label: GestureLabel) -> Classification {
        Classification {
            label,
            pinch_distance: 100.0,
        }
    }

    #[test]
    fn click_is_debounced_by_wall_time() {
        let mut d = dispatcher();
        let f = frame_with_index_at(320.0, 240.0);
        let t0 = Instant::now();

        assert_eq!(
            d.dispatch(&cls(GestureLabel::Click), &f, t0).unwrap(),
            Some(ActionEvent::Click)
        );
        // a burst of frames inside the window
        for ms in [1u64, 16, 33, 100, 199] {
            let t = t0 + Duration::from_millis(ms);
            assert_eq!(d.dispatch(&cls(GestureLabel::Click), &f, t).unwrap(), None);
        }
        let after = t0 + Duration::from_millis(200);
        assert_eq!(
            d.dispatch(&cls(GestureLabel::Click), &f, after).unwrap(),
            Some(ActionEvent::Click)
        );
        let clicks = d
            .motion()
            .actuator()
            .calls
            .iter()
            .filter(|c| matches!(c, Call::Click(MouseButton::Left)))
            .count();
        assert_eq!(clicks, 2);
    }

    #[test]
    fn continuous_gestures_fire_every_frame() {
        let mut d = dispatcher();
        let f = frame_with_index_at(320.0, 100.0);
        let t0 = Instant::now();
        for _ in 0..3 {
            assert_eq!(
                d.dispatch(&cls(GestureLabel::Scroll), &f, t0).unwrap(),
                Some(ActionEvent::Scroll { steps: 30 })
            );
        }
        assert_eq!(d.motion().actuator().calls.len(), 3);
    }

    #[test]
    fn generic_direction_follows_fingertip_height() {
        let mut d = dispatcher();
        let now = Instant::now();
        let low = frame_with_index_at(320.0, 400.0);
        assert_eq!(
            d.dispatch(&cls(GestureLabel::Scroll), &low, now).unwrap(),
            Some(ActionEvent::Scroll { steps: -30 })
        );
        assert_eq!(
            d.dispatch(&cls(GestureLabel::Zoom), &low, now).unwrap(),
            Some(ActionEvent::Zoom { steps: -20 })
        );
        let high = frame_with_index_at(320.0, 80.0);
        assert_eq!(
            d.dispatch(&cls(GestureLabel::Zoom), &high, now).unwrap(),
            Some(ActionEvent::Zoom { steps: 20 })
        );
    }

    #[test]
    fn fixed_direction_labels_ignore_position() {
        let mut d = dispatcher();
        let now = Instant::now();
        let low = frame_with_index_at(320.0, 400.0);
        let cases = [
            (GestureLabel::ScrollUp, ActionEvent::Scroll { steps: 30 }),
            (GestureLabel::ScrollDown, ActionEvent::Scroll { steps: -30 }),
            (GestureLabel::ZoomIn, ActionEvent::Zoom { steps: 20 }),
            (GestureLabel::ZoomOut, ActionEvent::Zoom { steps: -20 }),
        ];
        for (label, want) in cases {
            assert_eq!(d.dispatch(&cls(label), &low, now).unwrap(), Some(want));
        }
    }

    #[test]
    fn zoom_wraps_scroll_in_modifier() {
        let mut d = dispatcher();
        let f = frame_with_index_at(320.0, 100.0);
        d.dispatch(&cls(GestureLabel::ZoomIn), &f, Instant::now()).unwrap();
        assert_eq!(
            d.motion().actuator().calls,
            vec![
                Call::Press(Modifier::Ctrl),
                Call::Scroll(20),
                Call::Release(Modifier::Ctrl)
            ]
        );
    }

    #[test]
    fn move_uses_index_tip_and_pause_does_nothing() {
        let mut d = dispatcher();
        let now = Instant::now();
        let f = frame_with_index_at(320.0, 240.0);
        assert_eq!(d.dispatch(&cls(GestureLabel::Pause), &f, now).unwrap(), None);
        assert_eq!(d.dispatch(&cls(GestureLabel::None), &f, now).unwrap(), None);

        // centre of the inset rectangle is the centre of the screen; from the
        // origin that is a long jump, so k = 2.5
        let ev = d.dispatch(&cls(GestureLabel::Move), &f, now).unwrap();
        match ev {
            Some(ActionEvent::MoveTo { x, y }) => {
                assert!((x - 960.0 / 2.5).abs() < 1e-2);
                assert!((y - 540.0 / 2.5).abs() < 1e-2);
            }
            other => panic!("expected a move, got {other:?}"),
        }
    }

    #[test]
    fn move_without_landmarks_is_ignored() {
        let mut d = dispatcher();
        let f = Frame {
            fingers: FingerState::default(),
            landmarks: LandmarkSet::empty(),
            width: 640,
            height: 480,
        };
        assert_eq!(
            d.dispatch(&cls(GestureLabel::Move), &f, Instant::now()).unwrap(),
            None
        );
    }

    #[test]
    fn reconfigure_changes_magnitudes() {
        let mut d = dispatcher();
        let mut p = Profile::default();
        p.dispatch.scroll_steps = 3;
        p.dispatch.click_button = "right".into();
        d.reconfigure(&p).unwrap();
        let f = frame_with_index_at(320.0, 100.0);
        let now = Instant::now();
        assert_eq!(
            d.dispatch(&cls(GestureLabel::Scroll), &f, now).unwrap(),
            Some(ActionEvent::Scroll { steps: 3 })
        );
        d.dispatch(&cls(GestureLabel::Click), &f, now).unwrap();
        assert_eq!(
            d.motion().actuator().calls.last(),
            Some(&Call::Click(MouseButton::Right))
        );
    }
}
