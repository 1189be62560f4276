use thiserror::Error;

use super::{
    camera::{CaptureError, FrameSource},
    detector::{DetectorError, HandDetector, HandLocation},
    fps::FpsCounter,
    landmarks::LandmarkProvider,
};
use crate::types::{Frame, HandLandmark};

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Detector(#[from] DetectorError),
}

/// Per-iteration settings of the tracking loop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackerConfig {
    pub hand_index: usize,
    pub draw_overlay: bool,
    pub diagnostic_landmark: Option<HandLandmark>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            hand_index: 0,
            draw_overlay: true,
            diagnostic_landmark: Some(HandLandmark::ThumbTip),
        }
    }
}

/// Output of one loop iteration, ready to be presented.
#[derive(Debug)]
pub struct TrackedFrame {
    pub frame: Frame,
    pub location: HandLocation,
    pub fps: f64,
}

/// Pulls frames from a source, runs hand detection on them and measures the
/// loop rate. Dropping the tracker drops (and so releases) the source.
pub struct Tracker<S, P> {
    source: S,
    detector: HandDetector<P>,
    fps: FpsCounter,
    config: TrackerConfig,
}

impl<S: FrameSource, P: LandmarkProvider> Tracker<S, P> {
    pub fn new(source: S, detector: HandDetector<P>, config: TrackerConfig) -> Self {
        Self {
            source,
            detector,
            fps: FpsCounter::new(),
            config,
        }
    }

    /// Acquires one frame, detects hands on it and locates the configured hand.
    /// Any error is terminal for the caller's loop.
    pub fn step(&mut self) -> Result<TrackedFrame, TrackerError> {
        let mut frame = self.source.read_frame()?;
        let draw = self.config.draw_overlay;

        let count = self.detector.detect_hands(&mut frame, draw)?;
        log::debug!("{count} hand(s) detected");
        let location = self
            .detector
            .locate_landmarks(&mut frame, self.config.hand_index, draw)?;

        if !location.is_empty() {
            if let Some(line) = self.diagnostic_line(&location) {
                log::info!("{line}");
            }
        }

        let fps = self.fps.tick(frame.timestamp);
        Ok(TrackedFrame {
            frame,
            location,
            fps,
        })
    }

    /// Position of the configured diagnostic landmark plus the hand it belongs to.
    fn diagnostic_line(&self, location: &HandLocation) -> Option<String> {
        let which = self.config.diagnostic_landmark?;
        let point = location.landmark(which.id())?;
        let hand = self.detector.hands().get(self.config.hand_index)?;
        let (w, h) = location
            .bbox
            .map(|b| (b.width(), b.height()))
            .unwrap_or_default();
        Some(format!(
            "{which:?} at ({}, {}) on {} hand, score {:.2}, box {w}x{h}",
            point.x,
            point.y,
            hand.handedness.label(),
            hand.score
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::{
        cell::Cell,
        collections::VecDeque,
        rc::Rc,
        time::{Duration, Instant},
    };

    use super::*;
    use crate::{
        pipeline::landmarks::HandsConfig,
        types::{ChannelOrder, HandInstance, Handedness, Landmark},
    };

    /// Replays pre-built frames, then reports the end of the stream.
    struct ScriptedSource {
        frames: VecDeque<Frame>,
        released: Rc<Cell<bool>>,
    }

    impl FrameSource for ScriptedSource {
        fn read_frame(&mut self) -> Result<Frame, CaptureError> {
            self.frames.pop_front().ok_or(CaptureError::EndOfStream)
        }
    }

    impl Drop for ScriptedSource {
        fn drop(&mut self) {
            self.released.set(true);
        }
    }

    struct FixedHand;

    impl LandmarkProvider for FixedHand {
        fn detect(&mut self, _frame: &Frame, _config: &HandsConfig) -> anyhow::Result<Vec<HandInstance>> {
            Ok(vec![HandInstance {
                landmarks: vec![
                    Landmark { id: 0, x: 0.25, y: 0.75 },
                    Landmark { id: 4, x: 0.5, y: 0.5 },
                ],
                score: 0.9,
                handedness: Handedness::Right,
            }])
        }
    }

    fn frames(start: Instant, count: u32) -> VecDeque<Frame> {
        (0..count)
            .map(|i| {
                let mut frame = Frame::blank(640, 480, ChannelOrder::Rgba);
                frame.timestamp = start + Duration::from_millis(50 * i as u64);
                frame
            })
            .collect()
    }

    fn tracker(count: u32, released: Rc<Cell<bool>>) -> Tracker<ScriptedSource, FixedHand> {
        let source = ScriptedSource {
            frames: frames(Instant::now(), count),
            released,
        };
        let detector = HandDetector::new(FixedHand, HandsConfig::default()).unwrap();
        Tracker::new(source, detector, TrackerConfig::default())
    }

    #[test]
    fn steps_until_the_source_runs_dry() {
        let released = Rc::new(Cell::new(false));
        let mut tracker = tracker(3, released.clone());

        let first = tracker.step().unwrap();
        assert_eq!(first.fps, 0.0);
        assert_eq!(first.location.landmark(4).map(|p| (p.x, p.y)), Some((320, 240)));
        assert_eq!(first.location.landmark(0).map(|p| (p.x, p.y)), Some((160, 360)));

        let second = tracker.step().unwrap();
        assert!((second.fps - 20.0).abs() < 1e-6);
        tracker.step().unwrap();
        assert_eq!(tracker.detector.hands().len(), 1);

        let err = tracker.step().unwrap_err();
        assert!(matches!(err, TrackerError::Capture(CaptureError::EndOfStream)));
        assert!(!released.get());

        drop(tracker);
        assert!(released.get());
    }

    #[test]
    fn overlay_is_drawn_only_when_enabled() {
        let released = Rc::new(Cell::new(false));
        let mut tracker = tracker(2, released);

        let drawn = tracker.step().unwrap();
        assert_ne!(drawn.frame.rgb_at(320, 240), Some([0, 0, 0]));

        tracker.config.draw_overlay = false;
        let plain = tracker.step().unwrap();
        assert!(plain.frame.data.chunks_exact(4).all(|px| px[..3] == [0, 0, 0]));
        assert_eq!(plain.frame.rgb_at(320, 240), Some([0, 0, 0]));
        assert_eq!(plain.location.bbox.map(|b| (b.width(), b.height())), Some((160, 120)));
    }

    #[test]
    fn diagnostic_line_describes_the_located_hand() {
        let released = Rc::new(Cell::new(false));
        let mut tracker = tracker(1, released);
        let tracked = tracker.step().unwrap();

        assert_eq!(
            tracker.diagnostic_line(&tracked.location).as_deref(),
            Some("ThumbTip at (320, 240) on right hand, score 0.90, box 160x120")
        );

        tracker.config.diagnostic_landmark = Some(HandLandmark::IndexTip);
        assert_eq!(tracker.diagnostic_line(&tracked.location), None);
        tracker.config.diagnostic_landmark = None;
        assert_eq!(tracker.diagnostic_line(&tracked.location), None);
    }

    #[test]
    fn bad_hand_index_surfaces_as_detector_error() {
        let released = Rc::new(Cell::new(false));
        let mut tracker = tracker(1, released);
        tracker.config.hand_index = 5;

        let err = tracker.step().unwrap_err();
        assert!(matches!(
            err,
            TrackerError::Detector(DetectorError::HandIndexOutOfRange { index: 5, count: 1 })
        ));
    }
}
