use anyhow::Result;
use log::{debug, error, info, trace, warn};
use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::Instant,
};

use crate::actions::InputActuator;
use crate::config::{ConfigStore, Profile, ProfileWatcher};
use crate::dispatch::Dispatcher;
use crate::gestures::{Classifier, GestureLabel};
use crate::hand::Frame;
use crate::source::{LandmarkSource, Next};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunStats {
    pub frames: u64,
    pub rejected: u64,
    pub actions: u64,
    pub reloads: u64,
    /// Stale frames the source replaced before they were read.
    pub dropped: u64,
}

struct HotReload {
    store: ConfigStore,
    watcher: ProfileWatcher,
}

/// Frame-synchronous control loop: one frame in, at most one action out.
pub struct Pipeline<S: LandmarkSource, A: InputActuator> {
    source: S,
    classifier: Classifier,
    dispatcher: Dispatcher<A>,
    reload: Option<HotReload>,
    last_label: GestureLabel,
    stats: RunStats,
}

impl<S: LandmarkSource, A: InputActuator> Pipeline<S, A> {
    pub fn new(source: S, act: A, profile: &Profile) -> Result<Self> {
        Ok(Self {
            source,
            classifier: Classifier::new(profile.gestures.clone()),
            dispatcher: Dispatcher::new(act, profile)?,
            reload: None,
            last_label: GestureLabel::None,
            stats: RunStats::default(),
        })
    }

    /// Follow edits to the store's active profile while running.
    pub fn watch(&mut self, store: ConfigStore) -> Result<()> {
        let watcher = ProfileWatcher::new(&store.profiles_dir)?;
        self.reload = Some(HotReload { store, watcher });
        Ok(())
    }

    pub fn dispatcher(&self) -> &Dispatcher<A> {
        &self.dispatcher
    }

    pub fn stats(&self) -> RunStats {
        self.stats
    }

    /// Runs until the source ends or `stop` is raised. The flag is checked
    /// between frames only.
    pub fn run(&mut self, stop: &AtomicBool) -> Result<RunStats> {
        while !stop.load(Ordering::Relaxed) {
            self.maybe_reload();
            match self.source.next_frame()? {
                Next::Frame(frame) => self.step(&frame, Instant::now()),
                Next::Rejected(e) => {
                    self.stats.rejected += 1;
                    error!("rejected frame: {e}");
                }
                Next::Idle => {}
                Next::Eof => {
                    info!("frame source closed");
                    break;
                }
            }
        }
        self.stats.dropped = self.source.dropped();
        Ok(self.stats)
    }

    pub fn step(&mut self, frame: &Frame, now: Instant) {
        self.stats.frames += 1;
        let cls = self.classifier.classify(&frame.fingers, &frame.landmarks);
        if cls.label != self.last_label {
            debug!(
                "gesture {:?} -> {:?} (pinch {:.1}px)",
                self.last_label, cls.label, cls.pinch_distance
            );
            self.last_label = cls.label;
        }
        match self.dispatcher.dispatch(&cls, frame, now) {
            Ok(Some(ev)) => {
                self.stats.actions += 1;
                trace!("{ev:?}");
            }
            Ok(None) => {}
            Err(e) => error!("dispatch failed: {e}"),
        }
    }

    fn maybe_reload(&mut self) {
        let Some(hr) = self.reload.as_mut() else {
            return;
        };
        if !hr.watcher.touched(&hr.store.active_path()) {
            return;
        }
        if let Err(e) = hr.store.reload() {
            warn!("reload failed, keeping previous profile: {e}");
            return;
        }
        let profile = &hr.store.profile;
        if let Err(e) = self.dispatcher.reconfigure(profile) {
            warn!("reload failed, keeping previous profile: {e}");
            return;
        }
        self.classifier = Classifier::new(profile.gestures.clone());
        self.stats.reloads += 1;
        info!("profile '{}' reloaded", hr.store.active_name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::tests::{Call, Recorder};
    use crate::error::FrameError;
    use crate::hand::tests::hand_with_tips;
    use crate::hand::FingerState;
    use crate::source::{JsonLines, LatestFrame};
    use std::collections::VecDeque;
    use std::io::Cursor;
    use std::sync::Arc;
    use std::time::Duration;

    const PALM_LINE: &str =
        r#"{"fingers":[true,true,true,true,true],"frame_width":640,"frame_height":480}"#;

    struct Script(VecDeque<Next>);

    impl LandmarkSource for Script {
        fn next_frame(&mut self) -> Result<Next> {
            Ok(self.0.pop_front().unwrap_or(Next::Eof))
        }
    }

    fn frame(bits: [bool; 5], index: (f32, f32)) -> Frame {
        Frame {
            fingers: FingerState::new(bits),
            landmarks: hand_with_tips((0.0, 0.0), index),
            width: 640,
            height: 480,
        }
    }

    const FIST: [bool; 5] = [false; 5];
    const POINT: [bool; 5] = [false, true, false, false, false];
    const PALM: [bool; 5] = [true; 5];

    #[test]
    fn runs_a_script_to_the_end() {
        let script = Script(VecDeque::from(vec![
            Next::Frame(frame(POINT, (320.0, 240.0))),
            Next::Idle,
            Next::Rejected(FrameError::LandmarkCount(3)),
            Next::Frame(frame(PALM, (320.0, 240.0))),
            Next::Frame(frame(FIST, (320.0, 240.0))),
            Next::Frame(frame(FIST, (320.0, 240.0))),
        ]));
        let mut p = Pipeline::new(script, Recorder::default(), &Profile::default()).unwrap();
        let stats = p.run(&AtomicBool::new(false)).unwrap();

        assert_eq!(stats.frames, 4);
        assert_eq!(stats.rejected, 1);
        // one move, one click; the second fist lands inside the cooldown
        assert_eq!(stats.actions, 2);
        let calls = &p.dispatcher().motion().actuator().calls;
        assert!(matches!(calls[0], Call::Move(..)));
        assert_eq!(calls.len(), 2);
    }

    #[test]
    fn undecodable_bytes_do_not_end_the_run() {
        let mut input = b"\xff\xfe\n".to_vec();
        input.extend_from_slice(PALM_LINE.as_bytes());
        input.push(b'\n');
        let mut p = Pipeline::new(
            JsonLines::new(Cursor::new(input)),
            Recorder::default(),
            &Profile::default(),
        )
        .unwrap();
        let stats = p.run(&AtomicBool::new(false)).unwrap();
        assert_eq!(stats.frames, 1);
        assert_eq!(stats.rejected, 1);
    }

    #[test]
    fn rejections_survive_the_latest_frame_reader() {
        let input = format!("{{\"fingers\":[true],\"frame_width\":640,\"frame_height\":480}}\n{PALM_LINE}\n");
        let stop = Arc::new(AtomicBool::new(false));
        let src = LatestFrame::spawn(
            JsonLines::new(Cursor::new(input)),
            Arc::clone(&stop),
            Duration::from_millis(50),
        );
        let mut p = Pipeline::new(src, Recorder::default(), &Profile::default()).unwrap();
        let stats = p.run(&stop).unwrap();
        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.frames, 1);
        assert_eq!(stats.dropped, 0);
    }

    #[test]
    fn stop_flag_halts_before_the_next_frame() {
        let script = Script(VecDeque::from(vec![Next::Frame(frame(FIST, (1.0, 1.0)))]));
        let mut p = Pipeline::new(script, Recorder::default(), &Profile::default()).unwrap();
        let stats = p.run(&AtomicBool::new(true)).unwrap();
        assert_eq!(stats.frames, 0);
        assert!(p.dispatcher().motion().actuator().calls.is_empty());
    }

    #[test]
    fn steps_honour_the_click_cooldown_clock() {
        let mut p = Pipeline::new(
            Script(VecDeque::new()),
            Recorder::default(),
            &Profile::default(),
        )
        .unwrap();
        let t0 = Instant::now();
        let fist = frame(FIST, (10.0, 10.0));
        p.step(&fist, t0);
        p.step(&fist, t0 + Duration::from_millis(50));
        p.step(&fist, t0 + Duration::from_millis(250));
        assert_eq!(p.stats().actions, 2);
    }

    #[test]
    fn pinch_while_pointing_zooms_instead_of_moving() {
        let mut p = Pipeline::new(
            Script(VecDeque::new()),
            Recorder::default(),
            &Profile::default(),
        )
        .unwrap();
        // index tip 10px from the thumb tip at the origin, upper half
        p.step(&frame(POINT, (6.0, 8.0)), Instant::now());
        let calls = &p.dispatcher().motion().actuator().calls;
        assert!(calls.contains(&Call::Scroll(20)));
        assert!(!calls.iter().any(|c| matches!(c, Call::Move(..))));
    }
}
