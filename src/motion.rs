//! Fingertip-to-cursor motion control.
//!
//! The controller maps a fingertip inside an inset camera rectangle onto the
//! screen and runs the result through a single-pole exponential filter whose
//! strength adapts to the size of the jump. Jumps below the deadzone are
//! dropped outright so a still hand leaves the cursor alone.

use log::{debug, trace};

use crate::actions::{InputActuator, Modifier, MouseButton};
use crate::config::{MotionConfig, ScreenConfig};
use crate::error::ActuatorError;
use crate::geometry::{Point, distance, map_range};

/// Above this jump (screen px) the filter loosens to catch up.
const FAST_MOTION_PX: f32 = 100.0;
/// Below this jump the filter tightens to steady fine work.
const FINE_MOTION_PX: f32 = 20.0;

pub struct MotionController<A: InputActuator> {
    act: A,
    cfg: MotionConfig,
    screen_w: f32,
    screen_h: f32,
    zoom_key: Modifier,
    prev: Point,
    cur: Point,
}

impl<A: InputActuator> MotionController<A> {
    pub fn new(act: A, screen: &ScreenConfig, cfg: MotionConfig, zoom_key: Modifier) -> Self {
        Self {
            act,
            cfg,
            screen_w: screen.width as f32,
            screen_h: screen.height as f32,
            zoom_key,
            prev: Point::default(),
            cur: Point::default(),
        }
    }

    /// Swap tuning after a profile reload. The cursor position is kept.
    pub fn reconfigure(&mut self, cfg: MotionConfig, zoom_key: Modifier) {
        self.cfg = cfg;
        self.zoom_key = zoom_key;
    }

    /// Current smoothed cursor position in screen pixels.
    pub fn position(&self) -> Point {
        self.cur
    }

    pub fn actuator(&self) -> &A {
        &self.act
    }

    /// Filter strength for a jump of `dist` screen pixels.
    pub fn smoothing_for(&self, dist: f32) -> f32 {
        let base = self.cfg.base_smoothing;
        if dist > FAST_MOTION_PX {
            (base / 2.0).max(1.0)
        } else if dist < FINE_MOTION_PX {
            base * 1.5
        } else {
            base
        }
    }

    /// Feed one fingertip sample in camera pixels. Returns the new cursor
    /// position, or `None` when the sample was absorbed by the deadzone or
    /// the frame is too small to hold the inset rectangle.
    pub fn move_cursor(&mut self, x: f32, y: f32, frame_w: u32, frame_h: u32) -> Option<Point> {
        let r = self.cfg.frame_margin_px;
        let (fw, fh) = (frame_w as f32, frame_h as f32);
        if fw <= 2.0 * r || fh <= 2.0 * r {
            debug!("frame {frame_w}x{frame_h} leaves no room inside a {r}px margin; skipping");
            return None;
        }

        let target = Point::new(
            map_range(x, r, fw - r, 0.0, self.screen_w),
            map_range(y, r, fh - r, 0.0, self.screen_h),
        );
        let dist = distance(target, self.prev);
        if dist < self.cfg.deadzone_px {
            trace!("deadzone: {dist:.2}px");
            return None;
        }

        let k = self.smoothing_for(dist);
        self.cur = Point::new(
            self.prev.x + (target.x - self.prev.x) / k,
            self.prev.y + (target.y - self.prev.y) / k,
        );

        if let Err(e) = self
            .act
            .move_to(self.cur.x.round() as i32, self.cur.y.round() as i32)
        {
            debug!("move rejected: {e}");
        }
        self.prev = self.cur;
        Some(self.cur)
    }

    pub fn scroll(&mut self, steps: i32) -> Result<(), ActuatorError> {
        self.act.scroll(steps)
    }

    /// Scroll with the zoom modifier held; the modifier is always released.
    pub fn zoom(&mut self, steps: i32) -> Result<(), ActuatorError> {
        self.act.key_modifier_scroll(self.zoom_key, steps)
    }

    pub fn click(&mut self, button: MouseButton) -> Result<(), ActuatorError> {
        self.act.click(button)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::tests::{Call, Recorder};
    use proptest::prelude::*;

    // camera pixels map 1:1 onto a screen the size of the frame
    fn identity(act: Recorder, smoothing: f32) -> MotionController<Recorder> {
        MotionController::new(
            act,
            &ScreenConfig {
                width: 640,
                height: 480,
            },
            MotionConfig {
                frame_margin_px: 0.0,
                base_smoothing: smoothing,
                deadzone_px: 2.0,
            },
            Modifier::Ctrl,
        )
    }

    #[test]
    fn starts_at_origin() {
        let mc = identity(Recorder::default(), 5.0);
        assert_eq!(mc.position(), Point::new(0.0, 0.0));
    }

    #[test]
    fn adaptive_factor_bands() {
        let mc = identity(Recorder::default(), 5.0);
        assert_eq!(mc.smoothing_for(150.0), 2.5);
        assert_eq!(mc.smoothing_for(50.0), 5.0);
        assert_eq!(mc.smoothing_for(100.0), 5.0);
        assert_eq!(mc.smoothing_for(20.0), 5.0);
        assert_eq!(mc.smoothing_for(10.0), 7.5);

        let loose = identity(Recorder::default(), 1.5);
        assert_eq!(loose.smoothing_for(500.0), 1.0);
    }

    #[test]
    fn large_jumps_track_faster_than_small_ones() {
        let mut big = identity(Recorder::default(), 5.0);
        let p = big.move_cursor(300.0, 0.0, 640, 480).unwrap();
        let big_frac = p.x / 300.0;

        let mut small = identity(Recorder::default(), 5.0);
        let p = small.move_cursor(10.0, 0.0, 640, 480).unwrap();
        let small_frac = p.x / 10.0;

        assert!((big_frac - 0.4).abs() < 1e-4);
        assert!((small_frac - 1.0 / 7.5).abs() < 1e-4);
        assert!(big_frac > small_frac);
    }

    #[test]
    fn deadzone_leaves_state_and_actuator_alone() {
        let mut mc = identity(Recorder::default(), 1.0);
        let p = mc.move_cursor(200.0, 200.0, 640, 480).unwrap();
        assert_eq!(p, Point::new(200.0, 200.0));
        assert_eq!(mc.actuator().calls.len(), 1);

        assert!(mc.move_cursor(201.0, 201.0, 640, 480).is_none());
        assert!(mc.move_cursor(200.0, 198.5, 640, 480).is_none());
        assert_eq!(mc.position(), Point::new(200.0, 200.0));
        assert_eq!(mc.actuator().calls.len(), 1);
    }

    #[test]
    fn rejected_move_still_advances() {
        let act = Recorder {
            refuse_moves: true,
            ..Recorder::default()
        };
        let mut mc = identity(act, 1.0);
        let p = mc.move_cursor(100.0, 50.0, 640, 480).unwrap();
        assert_eq!(p, Point::new(100.0, 50.0));
        assert_eq!(mc.position(), p);
        assert_eq!(mc.actuator().moves(), vec![(100, 50)]);
    }

    #[test]
    fn maps_the_inset_rectangle_and_extrapolates_past_it() {
        let mut mc = MotionController::new(
            Recorder::default(),
            &ScreenConfig::default(),
            MotionConfig {
                base_smoothing: 1.0,
                ..MotionConfig::default()
            },
            Modifier::Ctrl,
        );
        let p = mc.move_cursor(540.0, 380.0, 640, 480).unwrap();
        assert!((p.x - 1920.0).abs() < 1e-2);
        assert!((p.y - 1080.0).abs() < 1e-2);

        let p = mc.move_cursor(600.0, 430.0, 640, 480).unwrap();
        assert!(p.x > 1920.0);
        assert!(p.y > 1080.0);
    }

    #[test]
    fn frame_smaller_than_margins_is_skipped() {
        let mut mc = MotionController::new(
            Recorder::default(),
            &ScreenConfig::default(),
            MotionConfig::default(),
            Modifier::Ctrl,
        );
        assert!(mc.move_cursor(100.0, 100.0, 200, 480).is_none());
        assert!(mc.actuator().calls.is_empty());
    }

    #[test]
    fn zero_scroll_and_zoom_still_reach_the_actuator() {
        let mut mc = identity(Recorder::default(), 5.0);
        mc.scroll(0).unwrap();
        mc.zoom(0).unwrap();
        assert_eq!(
            mc.actuator().calls,
            vec![
                Call::Scroll(0),
                Call::Press(Modifier::Ctrl),
                Call::Scroll(0),
                Call::Release(Modifier::Ctrl),
            ]
        );
    }

    #[test]
    fn zoom_releases_modifier_when_scroll_fails() {
        let act = Recorder {
            fail_scroll: true,
            ..Recorder::default()
        };
        let mut mc = identity(act, 5.0);
        mc.reconfigure(
            MotionConfig {
                frame_margin_px: 0.0,
                ..MotionConfig::default()
            },
            Modifier::Alt,
        );
        assert!(mc.zoom(-20).is_err());
        assert_eq!(
            mc.actuator().calls.last(),
            Some(&Call::Release(Modifier::Alt))
        );
    }

    #[test]
    fn click_forwards_button() {
        let mut mc = identity(Recorder::default(), 5.0);
        mc.click(MouseButton::Left).unwrap();
        assert_eq!(mc.actuator().calls, vec![Call::Click(MouseButton::Left)]);
    }

    proptest! {
        #[test]
        fn repeated_target_converges_without_overshoot(
            tx in 0.0f32..640.0,
            ty in 0.0f32..480.0,
            smoothing in 1.0f32..12.0,
        ) {
            let mut mc = identity(Recorder::default(), smoothing);
            let target = Point::new(tx, ty);
            let mut last = distance(mc.position(), target);
            for _ in 0..200 {
                mc.move_cursor(tx, ty, 640, 480);
                let p = mc.position();
                let d = distance(p, target);
                prop_assert!(d <= last + 1e-3);
                prop_assert!(p.x <= tx + 1e-3 && p.y <= ty + 1e-3);
                last = d;
            }
            prop_assert!(last < 2.0 + 1e-3);
        }
    }
}
